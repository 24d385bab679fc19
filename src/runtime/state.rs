use std::collections::{BTreeMap, BTreeSet};
use serde_json::Value;
use crate::Key;
use crate::runtime::message::MessageState;
use crate::runtime::records::{
    CompensationSubscriptionRecord, IncidentRecord, JobRecord, MessageSubscriptionRecord, NO_KEY,
    ProcessInstanceRecord, ProcessMessageSubscriptionRecord, SignalSubscriptionRecord, TimerRecord,
    UserTaskRecord, VariableRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Activating,
    Activated,
    Completing,
    Terminating,
}

/// A live element instance in the runtime tree
#[derive(Debug, Clone, PartialEq)]
pub struct ElementInstance {
    pub key: Key,
    /// Key of the flow scope instance. `None` for a process instance.
    pub parent_key: Option<Key>,
    pub state: ElementState,
    pub record: ProcessInstanceRecord,
    pub job_key: Option<Key>,
    pub user_task_key: Option<Key>,
    pub called_child_instance_key: Option<Key>,
    /// Sequence flows taken inside this scope whose target has not been activated yet
    pub active_sequence_flows: u32,
    /// An event (job completion, correlated message, fired timer) waiting to be processed
    pub pending_event_trigger: bool,
    /// Set on a scope once an interrupting event sub-process was triggered inside it
    pub interrupted: bool,
    /// Incoming flows that reached a joining gateway so far
    pub join_arrivals: u32,
}

impl ElementInstance {
    pub fn is_active(&self) -> bool {
        matches!(self.state, ElementState::Activating | ElementState::Activated)
    }
}

/// Runtime state of one partition: the element instance arena and every side entity.
///
/// Only the event applier mutates it. Keys are handed out by the state itself so that a staged
/// copy (see `Writers`) can be discarded together with the keys it allocated.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingState {
    next_key: Key,
    instances: BTreeMap<Key, ElementInstance>,
    /// flow scope key → child instance keys in activation order
    children: BTreeMap<Key, Vec<Key>>,
    pub jobs: BTreeMap<Key, JobRecord>,
    pub user_tasks: BTreeMap<Key, UserTaskRecord>,
    pub variables: BTreeMap<Key, VariableRecord>,
    pub incidents: BTreeMap<Key, IncidentRecord>,
    pub timers: BTreeMap<Key, TimerRecord>,
    pub process_message_subscriptions: BTreeMap<Key, ProcessMessageSubscriptionRecord>,
    pub message_subscriptions: BTreeMap<Key, MessageSubscriptionRecord>,
    pub signal_subscriptions: BTreeMap<Key, SignalSubscriptionRecord>,
    pub compensation_subscriptions: BTreeMap<Key, CompensationSubscriptionRecord>,
    pub messages: MessageState,
    /// Process instance keys that were migrated at least once
    pub migrated_instances: BTreeSet<Key>,
}

impl Default for ProcessingState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingState {
    pub fn new() -> Self {
        Self {
            next_key: 2_251_799_813_685_249,
            instances: BTreeMap::new(),
            children: BTreeMap::new(),
            jobs: BTreeMap::new(),
            user_tasks: BTreeMap::new(),
            variables: BTreeMap::new(),
            incidents: BTreeMap::new(),
            timers: BTreeMap::new(),
            process_message_subscriptions: BTreeMap::new(),
            message_subscriptions: BTreeMap::new(),
            signal_subscriptions: BTreeMap::new(),
            compensation_subscriptions: BTreeMap::new(),
            messages: MessageState::default(),
            migrated_instances: BTreeSet::new(),
        }
    }

    pub fn next_key(&mut self) -> Key {
        let key = self.next_key;
        self.next_key += 1;
        key
    }

    // --- element instances ---

    pub fn instance(&self, key: Key) -> Option<&ElementInstance> {
        self.instances.get(&key)
    }

    pub fn instance_mut(&mut self, key: Key) -> Option<&mut ElementInstance> {
        self.instances.get_mut(&key)
    }

    pub fn children(&self, key: Key) -> Vec<&ElementInstance> {
        self.children
            .get(&key)
            .map(|keys| keys.iter().filter_map(|k| self.instances.get(k)).collect())
            .unwrap_or_default()
    }

    pub fn child_keys(&self, key: Key) -> Vec<Key> {
        self.children.get(&key).cloned().unwrap_or_default()
    }

    pub fn active_children(&self, key: Key) -> usize {
        self.children(key).iter().filter(|c| c.is_active()).count()
    }

    pub fn put_instance(&mut self, instance: ElementInstance) {
        if let Some(parent) = instance.parent_key {
            let siblings = self.children.entry(parent).or_default();
            if !siblings.contains(&instance.key) {
                siblings.push(instance.key);
            }
        }
        self.instances.insert(instance.key, instance);
    }

    pub fn remove_instance(&mut self, key: Key) -> Option<ElementInstance> {
        let removed = self.instances.remove(&key)?;
        if let Some(parent) = removed.parent_key {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.retain(|k| *k != key);
            }
        }
        self.children.remove(&key);
        Some(removed)
    }

    /// Element instances of the given process instance, parents before children
    pub fn instance_tree(&self, process_instance_key: Key) -> Vec<Key> {
        let mut ordered = Vec::new();
        let mut queue = std::collections::VecDeque::from([process_instance_key]);
        while let Some(key) = queue.pop_front() {
            if !self.instances.contains_key(&key) {
                continue;
            }
            ordered.push(key);
            queue.extend(self.child_keys(key));
        }
        ordered
    }

    /// First live instance of the element inside the process instance (called children excluded)
    pub fn find_instance(&self, process_instance_key: Key, element_id: &str) -> Option<&ElementInstance> {
        self.instance_tree(process_instance_key)
            .into_iter()
            .filter_map(|key| self.instances.get(&key))
            .find(|i| i.record.element_id == element_id)
    }

    /// Key of the top-most process instance in the call hierarchy
    pub fn root_process_instance_key(&self, process_instance_key: Key) -> Key {
        let mut current = process_instance_key;
        while let Some(instance) = self.instances.get(&current) {
            let parent = instance.record.parent_process_instance_key;
            if parent == NO_KEY || !self.instances.contains_key(&parent) {
                break;
            }
            current = parent;
        }
        current
    }

    /// Definition path and calling element path of a record, recomputed from its call ancestry.
    ///
    /// The last definition key is the record's own, so a record carrying a new definition key
    /// yields the migrated path before it is applied.
    pub fn tree_path(&self, record: &ProcessInstanceRecord) -> (Vec<Key>, Vec<String>) {
        let mut definitions = vec![record.process_definition_key];
        let mut calling_elements = Vec::new();

        // every record of a called instance carries the key of the calling call activity
        let mut parent_element = record.parent_element_instance_key;
        while let Some(call_activity) = self.instances.get(&parent_element) {
            calling_elements.push(call_activity.record.element_id.clone());
            definitions.push(call_activity.record.process_definition_key);
            parent_element = self
                .instances
                .get(&call_activity.record.process_instance_key)
                .map(|pi| pi.record.parent_element_instance_key)
                .unwrap_or(NO_KEY);
        }

        definitions.reverse();
        calling_elements.reverse();
        (definitions, calling_elements)
    }

    // --- side entities ---

    pub fn variables_local(&self, scope_key: Key) -> Vec<(Key, &VariableRecord)> {
        self.variables
            .iter()
            .filter(|(_, v)| v.scope_key == scope_key)
            .map(|(key, v)| (*key, v))
            .collect()
    }

    pub fn variable_local(&self, scope_key: Key, name: &str) -> Option<(Key, &VariableRecord)> {
        self.variables
            .iter()
            .find(|(_, v)| v.scope_key == scope_key && v.name == name)
            .map(|(key, v)| (*key, v))
    }

    /// Looks a variable up in the scope and then in its flow scopes
    pub fn variable(&self, scope_key: Key, name: &str) -> Option<&Value> {
        let mut current = Some(scope_key);
        while let Some(key) = current {
            if let Some((_, variable)) = self.variable_local(key, name) {
                return Some(&variable.value);
            }
            current = self.instances.get(&key).and_then(|i| i.parent_key);
        }
        None
    }

    pub fn process_incident_key(&self, element_instance_key: Key) -> Option<Key> {
        self.incidents
            .iter()
            .find(|(_, i)| i.element_instance_key == element_instance_key && i.job_key == NO_KEY)
            .map(|(key, _)| *key)
    }

    pub fn job_incident_key(&self, job_key: Key) -> Option<Key> {
        self.incidents
            .iter()
            .find(|(_, i)| i.job_key == job_key)
            .map(|(key, _)| *key)
    }

    pub fn timers_of(&self, element_instance_key: Key) -> Vec<Key> {
        self.timers
            .iter()
            .filter(|(_, t)| t.element_instance_key == element_instance_key)
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn message_subscriptions_of(&self, element_instance_key: Key) -> Vec<Key> {
        self.process_message_subscriptions
            .iter()
            .filter(|(_, s)| s.element_instance_key == element_instance_key)
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn signal_subscriptions_of(&self, element_instance_key: Key) -> Vec<Key> {
        self.signal_subscriptions
            .iter()
            .filter(|(_, s)| s.catch_event_instance_key == element_instance_key)
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn compensation_subscriptions_of(&self, process_instance_key: Key) -> Vec<Key> {
        self.compensation_subscriptions
            .iter()
            .filter(|(_, s)| s.process_instance_key == process_instance_key)
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn exist_subscription_for_message(&self, element_instance_key: Key, message_name: &str, tenant_id: &str) -> bool {
        self.process_message_subscriptions.values().any(|s| {
            s.element_instance_key == element_instance_key
                && s.message_name == message_name
                && s.tenant_id == tenant_id
        })
    }
}
