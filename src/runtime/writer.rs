use crate::Key;
use crate::runtime::applier;
use crate::runtime::records::{Intent, Record, RecordType, RecordValue, RejectionType};
use crate::runtime::state::ProcessingState;

/// Writes the records of one processing step.
///
/// Events are applied to the (staged) state as soon as they are appended. Nothing reaches the
/// log before the caller takes the batch with [`Writers::finish`]; dropping the writers together
/// with the staged state abandons the whole step.
pub struct Writers<'a> {
    state: &'a mut ProcessingState,
    batch: Vec<Record>,
    post_commit: Vec<Record>,
}

impl<'a> Writers<'a> {
    pub fn new(state: &'a mut ProcessingState) -> Self {
        Self {
            state,
            batch: Vec::new(),
            post_commit: Vec::new(),
        }
    }

    pub fn state(&self) -> &ProcessingState {
        &*self.state
    }

    /// Direct access for transient scheduling flags that have no record of their own
    pub fn state_mut(&mut self) -> &mut ProcessingState {
        &mut *self.state
    }

    pub fn next_key(&mut self) -> Key {
        self.state.next_key()
    }

    pub fn append_event(&mut self, key: Key, intent: impl Into<Intent>, value: RecordValue) {
        let intent = intent.into();
        applier::apply(self.state, key, intent, &value);
        self.batch.push(record(key, RecordType::Event, intent, value));
    }

    pub fn append_command(&mut self, key: Key, intent: impl Into<Intent>, value: RecordValue) {
        self.batch.push(command(key, intent, value));
    }

    /// A command that is processed only after this batch is committed
    pub fn append_post_commit_command(&mut self, key: Key, intent: impl Into<Intent>, value: RecordValue) {
        self.post_commit
            .push(record(key, RecordType::Command, intent.into(), value));
    }

    pub fn batch(&self) -> &[Record] {
        &self.batch
    }

    /// Hands out the written batch and the commands to process after it
    pub fn finish(self) -> (Vec<Record>, Vec<Record>) {
        (self.batch, self.post_commit)
    }
}

fn record(key: Key, record_type: RecordType, intent: Intent, value: RecordValue) -> Record {
    Record {
        position: 0,
        key,
        record_type,
        intent,
        rejection_type: None,
        rejection_reason: String::new(),
        value,
    }
}

pub fn command(key: Key, intent: impl Into<Intent>, value: RecordValue) -> Record {
    record(key, RecordType::Command, intent.into(), value)
}

pub fn rejection(key: Key, intent: impl Into<Intent>, value: RecordValue, rejection_type: RejectionType, reason: &str) -> Record {
    Record {
        position: 0,
        key,
        record_type: RecordType::CommandRejection,
        intent: intent.into(),
        rejection_type: Some(rejection_type),
        rejection_reason: reason.to_string(),
        value,
    }
}
