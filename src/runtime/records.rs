//! Record protocol: every state change is an event record appended to the log, every request is
//! a command record. Rejected commands are answered with a `CommandRejection` record.

use std::fmt;
use serde::{Serialize, Deserialize};
use serde_json::Value;
use crate::Key;
use crate::runtime::definition::{BpmnElementType, BpmnEventType};

pub const DEFAULT_TENANT: &str = "<default>";

/// Key used when the owning entity does not exist (for example the flow scope of a process)
pub const NO_KEY: Key = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordType {
    Event,
    Command,
    CommandRejection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionType {
    NotFound,
    InvalidArgument,
    InvalidState,
    Forbidden,
    ProcessingError,
}

impl fmt::Display for RejectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RejectionType::NotFound => "NOT_FOUND",
            RejectionType::InvalidArgument => "INVALID_ARGUMENT",
            RejectionType::InvalidState => "INVALID_STATE",
            RejectionType::Forbidden => "FORBIDDEN",
            RejectionType::ProcessingError => "PROCESSING_ERROR",
        };
        f.write_str(name)
    }
}

// --- intents ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessInstanceIntent {
    ElementActivating,
    ElementActivated,
    ElementCompleting,
    ElementCompleted,
    ElementTerminating,
    ElementTerminated,
    ElementMigrated,
    AncestorMigrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessInstanceMigrationIntent {
    Migrate,
    Migrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessIntent {
    Created,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobIntent {
    Created,
    Completed,
    Failed,
    Canceled,
    Migrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserTaskIntent {
    Created,
    Completed,
    Canceled,
    Migrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableIntent {
    Created,
    Updated,
    Migrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentIntent {
    Created,
    Resolved,
    Migrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerIntent {
    Created,
    Triggered,
    Canceled,
    Migrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessMessageSubscriptionIntent {
    Created,
    Correlated,
    Deleted,
    Migrated,
}

/// Message side of a subscription. Commands are written by the process side and processed
/// after the batch that wrote them is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageSubscriptionIntent {
    Create,
    Created,
    Migrate,
    Migrated,
    Delete,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageIntent {
    Published,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStartReservationIntent {
    Reserved,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalIntent {
    Broadcasted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalSubscriptionIntent {
    Created,
    Deleted,
    Migrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompensationSubscriptionIntent {
    Created,
    Deleted,
    Migrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "valueType", content = "intent", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Process(ProcessIntent),
    ProcessInstance(ProcessInstanceIntent),
    ProcessInstanceMigration(ProcessInstanceMigrationIntent),
    Job(JobIntent),
    UserTask(UserTaskIntent),
    Variable(VariableIntent),
    Incident(IncidentIntent),
    Timer(TimerIntent),
    ProcessMessageSubscription(ProcessMessageSubscriptionIntent),
    MessageSubscription(MessageSubscriptionIntent),
    Message(MessageIntent),
    MessageStartReservation(MessageStartReservationIntent),
    Signal(SignalIntent),
    SignalSubscription(SignalSubscriptionIntent),
    CompensationSubscription(CompensationSubscriptionIntent),
}

macro_rules! intent_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Intent {
                fn from(intent: $ty) -> Self {
                    Intent::$variant(intent)
                }
            }
        )*
    };
}

intent_from!(
    Process(ProcessIntent),
    ProcessInstance(ProcessInstanceIntent),
    ProcessInstanceMigration(ProcessInstanceMigrationIntent),
    Job(JobIntent),
    UserTask(UserTaskIntent),
    Variable(VariableIntent),
    Incident(IncidentIntent),
    Timer(TimerIntent),
    ProcessMessageSubscription(ProcessMessageSubscriptionIntent),
    MessageSubscription(MessageSubscriptionIntent),
    Message(MessageIntent),
    MessageStartReservation(MessageStartReservationIntent),
    Signal(SignalIntent),
    SignalSubscription(SignalSubscriptionIntent),
    CompensationSubscription(CompensationSubscriptionIntent),
);

// --- record values ---

/// Metadata written when a definition is deployed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMetadataRecord {
    pub process_definition_key: Key,
    pub bpmn_process_id: String,
    pub version: i32,
    pub tenant_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInstanceRecord {
    pub bpmn_process_id: String,
    pub version: i32,
    pub process_definition_key: Key,
    pub process_instance_key: Key,
    pub element_id: String,
    pub flow_scope_key: Key,
    pub bpmn_element_type: BpmnElementType,
    pub bpmn_event_type: Option<BpmnEventType>,
    pub parent_process_instance_key: Key,
    pub parent_element_instance_key: Key,
    pub tenant_id: String,
    /// Definition keys from the root process instance down to this instance
    pub process_definition_path: Vec<Key>,
    /// Call activity ids from the root process instance down to this instance
    pub calling_element_path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInstanceMigrationRecord {
    pub process_instance_key: Key,
    pub target_process_definition_key: Key,
    pub mapping_instructions: Vec<MappingInstructionValue>,
    pub root_process_instance_key: Key,
    pub tenant_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingInstructionValue {
    pub source_element_id: String,
    pub target_element_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_type: String,
    pub retries: i32,
    pub worker: String,
    pub error_message: String,
    pub custom_headers: serde_json::Map<String, Value>,
    pub element_instance_key: Key,
    pub element_id: String,
    pub process_instance_key: Key,
    pub process_definition_key: Key,
    pub process_definition_version: i32,
    pub bpmn_process_id: String,
    pub tenant_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTaskRecord {
    pub user_task_key: Key,
    pub assignee: String,
    pub candidate_groups: Vec<String>,
    pub due_date: String,
    pub follow_up_date: String,
    pub form_key: Key,
    pub variables: Value,
    pub element_instance_key: Key,
    pub element_id: String,
    pub process_instance_key: Key,
    pub process_definition_key: Key,
    pub process_definition_version: i32,
    pub bpmn_process_id: String,
    pub tenant_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableRecord {
    pub name: String,
    pub value: Value,
    pub scope_key: Key,
    pub process_instance_key: Key,
    pub process_definition_key: Key,
    pub bpmn_process_id: String,
    pub tenant_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentRecord {
    pub error_type: String,
    pub error_message: String,
    pub bpmn_process_id: String,
    pub process_definition_key: Key,
    pub process_instance_key: Key,
    pub element_id: String,
    pub element_instance_key: Key,
    /// `NO_KEY` unless the incident was raised for a job
    pub job_key: Key,
    pub variable_scope_key: Key,
    pub tenant_id: String,
    pub process_definition_path: Vec<Key>,
    pub calling_element_path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerRecord {
    pub element_instance_key: Key,
    pub process_instance_key: Key,
    pub process_definition_key: Key,
    /// Catch event that is triggered when the timer fires
    pub target_element_id: String,
    /// Epoch milliseconds
    pub due_date: i64,
    pub repetitions: i32,
    pub tenant_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMessageSubscriptionRecord {
    pub subscription_key: Key,
    pub process_instance_key: Key,
    pub element_instance_key: Key,
    pub element_id: String,
    pub process_definition_key: Key,
    pub bpmn_process_id: String,
    pub message_name: String,
    pub correlation_key: String,
    pub interrupting: bool,
    pub tenant_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSubscriptionRecord {
    pub process_instance_key: Key,
    pub element_instance_key: Key,
    pub bpmn_process_id: String,
    pub message_name: String,
    pub correlation_key: String,
    pub interrupting: bool,
    pub tenant_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub name: String,
    pub correlation_key: String,
    /// Milliseconds the message stays buffered. `0` correlates only at publication.
    pub time_to_live: i64,
    /// Epoch milliseconds after which the message is no longer buffered
    pub deadline: i64,
    pub variables: serde_json::Map<String, Value>,
    pub tenant_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStartReservationRecord {
    pub process_instance_key: Key,
    pub bpmn_process_id: String,
    pub correlation_key: String,
    pub tenant_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRecord {
    pub signal_name: String,
    pub variables: serde_json::Map<String, Value>,
    pub tenant_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalSubscriptionRecord {
    pub signal_name: String,
    pub catch_event_id: String,
    pub catch_event_instance_key: Key,
    pub process_definition_key: Key,
    pub bpmn_process_id: String,
    pub tenant_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationSubscriptionRecord {
    pub tenant_id: String,
    pub process_instance_key: Key,
    pub process_definition_key: Key,
    pub compensable_activity_id: String,
    pub compensable_activity_instance_key: Key,
    pub compensable_activity_scope_key: Key,
    pub compensation_handler_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "valueType", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordValue {
    Process(ProcessMetadataRecord),
    ProcessInstance(ProcessInstanceRecord),
    ProcessInstanceMigration(ProcessInstanceMigrationRecord),
    Job(JobRecord),
    UserTask(UserTaskRecord),
    Variable(VariableRecord),
    Incident(IncidentRecord),
    Timer(TimerRecord),
    ProcessMessageSubscription(ProcessMessageSubscriptionRecord),
    MessageSubscription(MessageSubscriptionRecord),
    Message(MessageRecord),
    MessageStartReservation(MessageStartReservationRecord),
    Signal(SignalRecord),
    SignalSubscription(SignalSubscriptionRecord),
    CompensationSubscription(CompensationSubscriptionRecord),
}

macro_rules! value_accessors {
    ($($fn_name:ident => $variant:ident($ty:ty)),* $(,)?) => {
        impl RecordValue {
            $(
                pub fn $fn_name(&self) -> Option<&$ty> {
                    match self {
                        RecordValue::$variant(value) => Some(value),
                        _ => None,
                    }
                }
            )*
        }
    };
}

value_accessors!(
    as_process_instance => ProcessInstance(ProcessInstanceRecord),
    as_migration => ProcessInstanceMigration(ProcessInstanceMigrationRecord),
    as_job => Job(JobRecord),
    as_user_task => UserTask(UserTaskRecord),
    as_variable => Variable(VariableRecord),
    as_incident => Incident(IncidentRecord),
    as_timer => Timer(TimerRecord),
    as_process_message_subscription => ProcessMessageSubscription(ProcessMessageSubscriptionRecord),
    as_message_subscription => MessageSubscription(MessageSubscriptionRecord),
    as_reservation => MessageStartReservation(MessageStartReservationRecord),
    as_signal_subscription => SignalSubscription(SignalSubscriptionRecord),
    as_compensation_subscription => CompensationSubscription(CompensationSubscriptionRecord),
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub position: u64,
    pub key: Key,
    pub record_type: RecordType,
    pub intent: Intent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_type: Option<RejectionType>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub rejection_reason: String,
    pub value: RecordValue,
}

impl Record {
    pub fn is_event(&self) -> bool {
        self.record_type == RecordType::Event
    }
}

/// Append-only list of committed records
#[derive(Debug, Clone, Default)]
pub struct RecordLog {
    records: Vec<Record>,
}

impl RecordLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns positions and appends a committed batch
    pub fn append_batch(&mut self, batch: Vec<Record>) {
        for mut record in batch {
            record.position = self.records.len() as u64 + 1;
            self.records.push(record);
        }
    }

    pub fn all(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn with_intent(&self, intent: impl Into<Intent>) -> Vec<&Record> {
        let intent = intent.into();
        self.records.iter().filter(|r| r.intent == intent).collect()
    }

    /// Records written after the given position
    pub fn since(&self, position: u64) -> &[Record] {
        let start = (position as usize).min(self.records.len());
        &self.records[start..]
    }

    pub fn last_position(&self) -> u64 {
        self.records.len() as u64
    }

    pub fn rejections(&self) -> Vec<&Record> {
        self.records
            .iter()
            .filter(|r| r.record_type == RecordType::CommandRejection)
            .collect()
    }
}
