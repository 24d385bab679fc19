use std::collections::{BTreeMap, BTreeSet};
use crate::Key;
use crate::runtime::records::MessageRecord;

/// (tenant, bpmn process id, correlation key)
pub type ReservationKey = (String, String, String);

/// Message-start correlation reservations and buffered messages.
///
/// A process with a message start event allows at most one active instance per correlation key.
/// The reservation is held from the creation of the instance until it completes; messages
/// published meanwhile stay buffered until the reservation is released or their time-to-live
/// passes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageState {
    reservations: BTreeMap<ReservationKey, Key>,
    correlation_keys: BTreeMap<Key, String>,
    messages: BTreeMap<Key, MessageRecord>,
    /// Message key → bpmn process ids the message already started an instance of
    started_processes: BTreeMap<Key, BTreeSet<String>>,
}

impl MessageState {
    pub fn reserve(&mut self, tenant_id: &str, bpmn_process_id: &str, correlation_key: &str, process_instance_key: Key) {
        self.reservations.insert(
            (tenant_id.to_string(), bpmn_process_id.to_string(), correlation_key.to_string()),
            process_instance_key,
        );
        self.correlation_keys
            .insert(process_instance_key, correlation_key.to_string());
    }

    pub fn release(&mut self, tenant_id: &str, bpmn_process_id: &str, correlation_key: &str) {
        self.reservations.remove(&(
            tenant_id.to_string(),
            bpmn_process_id.to_string(),
            correlation_key.to_string(),
        ));
    }

    pub fn forget_instance(&mut self, process_instance_key: Key) {
        self.correlation_keys.remove(&process_instance_key);
    }

    pub fn exist_active_process_instance(&self, tenant_id: &str, bpmn_process_id: &str, correlation_key: &str) -> bool {
        self.reservations.contains_key(&(
            tenant_id.to_string(),
            bpmn_process_id.to_string(),
            correlation_key.to_string(),
        ))
    }

    pub fn reservation_holder(&self, tenant_id: &str, bpmn_process_id: &str, correlation_key: &str) -> Option<Key> {
        self.reservations
            .get(&(
                tenant_id.to_string(),
                bpmn_process_id.to_string(),
                correlation_key.to_string(),
            ))
            .copied()
    }

    /// Correlation key the process instance was started with, if any
    pub fn process_instance_correlation_key(&self, process_instance_key: Key) -> Option<&str> {
        self.correlation_keys
            .get(&process_instance_key)
            .map(String::as_str)
    }

    /// All reservations held by the process instance
    pub fn reservations_of(&self, process_instance_key: Key) -> Vec<ReservationKey> {
        self.reservations
            .iter()
            .filter(|(_, holder)| **holder == process_instance_key)
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn put_message(&mut self, key: Key, message: MessageRecord) {
        self.messages.insert(key, message);
    }

    pub fn message(&self, key: Key) -> Option<&MessageRecord> {
        self.messages.get(&key)
    }

    pub fn remove_message(&mut self, key: Key) {
        self.messages.remove(&key);
        self.started_processes.remove(&key);
    }

    pub fn mark_started(&mut self, message_key: Key, bpmn_process_id: &str) {
        self.started_processes
            .entry(message_key)
            .or_default()
            .insert(bpmn_process_id.to_string());
    }

    pub fn has_started(&self, message_key: Key, bpmn_process_id: &str) -> bool {
        self.started_processes
            .get(&message_key)
            .is_some_and(|ids| ids.contains(bpmn_process_id))
    }

    /// Buffered messages that are still alive at `now`, oldest first
    pub fn buffered(&self, name: &str, correlation_key: &str, tenant_id: &str, now: i64) -> Vec<(Key, &MessageRecord)> {
        self.messages
            .iter()
            .filter(|(_, m)| {
                m.name == name
                    && m.correlation_key == correlation_key
                    && m.tenant_id == tenant_id
                    && m.deadline > now
            })
            .map(|(key, m)| (*key, m))
            .collect()
    }

    pub fn expired(&self, now: i64) -> Vec<Key> {
        self.messages
            .iter()
            .filter(|(_, m)| m.deadline <= now)
            .map(|(key, _)| *key)
            .collect()
    }
}
