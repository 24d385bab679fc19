#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use instance_migration::Key;
use instance_migration::runtime::Engine;
use instance_migration::runtime::definition::BpmnElementType;
use instance_migration::runtime::records::{Intent, ProcessInstanceIntent, Record, RecordType};

pub fn fixed_clock() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap()
}

/// Events with the intent, in log order
pub fn events<'a>(records: &'a [Record], intent: impl Into<Intent>) -> Vec<&'a Record> {
    of_type(records, RecordType::Event, intent)
}

pub fn commands<'a>(records: &'a [Record], intent: impl Into<Intent>) -> Vec<&'a Record> {
    of_type(records, RecordType::Command, intent)
}

fn of_type<'a>(records: &'a [Record], record_type: RecordType, intent: impl Into<Intent>) -> Vec<&'a Record> {
    let intent = intent.into();
    records
        .iter()
        .filter(|r| r.record_type == record_type && r.intent == intent)
        .collect()
}

/// Position of the first record with the intent
pub fn position_of(records: &[Record], record_type: RecordType, intent: impl Into<Intent>) -> Option<usize> {
    let intent = intent.into();
    records
        .iter()
        .position(|r| r.record_type == record_type && r.intent == intent)
}

pub fn last_rejection(engine: &Engine) -> &Record {
    engine
        .records()
        .rejections()
        .last()
        .copied()
        .expect("no rejection written")
}

/// Key of the latest process instance of the given bpmn process id
pub fn process_instance_of(engine: &Engine, bpmn_process_id: &str) -> Key {
    engine
        .records()
        .with_intent(ProcessInstanceIntent::ElementActivated)
        .into_iter()
        .filter_map(|r| r.value.as_process_instance().map(|v| (r.key, v)))
        .filter(|(_, v)| v.bpmn_element_type == BpmnElementType::Process && v.bpmn_process_id == bpmn_process_id)
        .map(|(key, _)| key)
        .last()
        .expect("no process instance created")
}

/// Element ids of the ELEMENT_MIGRATED events, in log order
pub fn migrated_element_ids(records: &[Record]) -> Vec<String> {
    events(records, ProcessInstanceIntent::ElementMigrated)
        .into_iter()
        .filter_map(|r| r.value.as_process_instance())
        .map(|v| v.element_id.clone())
        .collect()
}
