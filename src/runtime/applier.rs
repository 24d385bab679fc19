use crate::Key;
use crate::runtime::definition::BpmnElementType;
use crate::runtime::records::{
    CompensationSubscriptionIntent, Intent, IncidentIntent, JobIntent, MessageIntent,
    MessageStartReservationIntent, MessageSubscriptionIntent, NO_KEY, ProcessInstanceIntent,
    ProcessMessageSubscriptionIntent, RecordValue, SignalSubscriptionIntent, TimerIntent,
    UserTaskIntent, VariableIntent,
};
use crate::runtime::state::{ElementInstance, ElementState, ProcessingState};

/// Applies an event to the state. Events are the only way state changes.
pub fn apply(state: &mut ProcessingState, key: Key, intent: Intent, value: &RecordValue) {
    match (intent, value) {
        (Intent::ProcessInstance(intent), RecordValue::ProcessInstance(record)) => match intent {
            ProcessInstanceIntent::ElementActivating => {
                let parent_key = (record.flow_scope_key != NO_KEY).then_some(record.flow_scope_key);
                state.put_instance(ElementInstance {
                    key,
                    parent_key,
                    state: ElementState::Activating,
                    record: record.clone(),
                    job_key: None,
                    user_task_key: None,
                    called_child_instance_key: None,
                    active_sequence_flows: 0,
                    pending_event_trigger: false,
                    interrupted: false,
                    join_arrivals: 0,
                });
                if record.bpmn_element_type == BpmnElementType::Process
                    && record.parent_element_instance_key != NO_KEY
                {
                    if let Some(call_activity) = state.instance_mut(record.parent_element_instance_key) {
                        call_activity.called_child_instance_key = Some(key);
                    }
                }
            }
            ProcessInstanceIntent::ElementActivated => set_state(state, key, ElementState::Activated),
            ProcessInstanceIntent::ElementCompleting => set_state(state, key, ElementState::Completing),
            ProcessInstanceIntent::ElementTerminating => set_state(state, key, ElementState::Terminating),
            ProcessInstanceIntent::ElementCompleted | ProcessInstanceIntent::ElementTerminated => {
                state.remove_instance(key);
                state.variables.retain(|_, v| v.scope_key != key);
                if record.bpmn_element_type == BpmnElementType::Process
                    && record.parent_element_instance_key != NO_KEY
                {
                    if let Some(call_activity) = state.instance_mut(record.parent_element_instance_key) {
                        call_activity.called_child_instance_key = None;
                    }
                }
            }
            ProcessInstanceIntent::ElementMigrated => {
                if let Some(instance) = state.instance_mut(key) {
                    instance.record = record.clone();
                }
                if record.bpmn_element_type == BpmnElementType::Process {
                    state.migrated_instances.insert(key);
                }
            }
            ProcessInstanceIntent::AncestorMigrated => {
                if let Some(instance) = state.instance_mut(key) {
                    instance.record.process_definition_path = record.process_definition_path.clone();
                    instance.record.calling_element_path = record.calling_element_path.clone();
                }
            }
        },

        (Intent::Job(intent), RecordValue::Job(record)) => match intent {
            JobIntent::Created => {
                state.jobs.insert(key, record.clone());
                if let Some(instance) = state.instance_mut(record.element_instance_key) {
                    instance.job_key = Some(key);
                }
            }
            JobIntent::Completed | JobIntent::Canceled => {
                state.jobs.remove(&key);
                if let Some(instance) = state.instance_mut(record.element_instance_key) {
                    instance.job_key = None;
                }
            }
            JobIntent::Failed | JobIntent::Migrated => {
                state.jobs.insert(key, record.clone());
            }
        },

        (Intent::UserTask(intent), RecordValue::UserTask(record)) => match intent {
            UserTaskIntent::Created => {
                state.user_tasks.insert(key, record.clone());
                if let Some(instance) = state.instance_mut(record.element_instance_key) {
                    instance.user_task_key = Some(key);
                }
            }
            UserTaskIntent::Completed | UserTaskIntent::Canceled => {
                state.user_tasks.remove(&key);
                if let Some(instance) = state.instance_mut(record.element_instance_key) {
                    instance.user_task_key = None;
                }
            }
            UserTaskIntent::Migrated => {
                // the record carries no variables, the stored task keeps its own
                if let Some(task) = state.user_tasks.get_mut(&key) {
                    let variables = std::mem::take(&mut task.variables);
                    *task = record.clone();
                    task.variables = variables;
                }
            }
        },

        (Intent::Variable(intent), RecordValue::Variable(record)) => match intent {
            VariableIntent::Created | VariableIntent::Updated => {
                state.variables.insert(key, record.clone());
            }
            VariableIntent::Migrated => {
                // the record value is blanked, only identity fields are taken over
                if let Some(variable) = state.variables.get_mut(&key) {
                    variable.process_definition_key = record.process_definition_key;
                    variable.bpmn_process_id = record.bpmn_process_id.clone();
                }
            }
        },

        (Intent::Incident(intent), RecordValue::Incident(record)) => match intent {
            IncidentIntent::Created | IncidentIntent::Migrated => {
                state.incidents.insert(key, record.clone());
            }
            IncidentIntent::Resolved => {
                state.incidents.remove(&key);
            }
        },

        (Intent::Timer(intent), RecordValue::Timer(record)) => match intent {
            TimerIntent::Created | TimerIntent::Migrated => {
                state.timers.insert(key, record.clone());
            }
            TimerIntent::Triggered | TimerIntent::Canceled => {
                state.timers.remove(&key);
            }
        },

        (Intent::ProcessMessageSubscription(intent), RecordValue::ProcessMessageSubscription(record)) => match intent {
            ProcessMessageSubscriptionIntent::Created | ProcessMessageSubscriptionIntent::Migrated => {
                state.process_message_subscriptions.insert(key, record.clone());
            }
            ProcessMessageSubscriptionIntent::Correlated => {}
            ProcessMessageSubscriptionIntent::Deleted => {
                state.process_message_subscriptions.remove(&key);
            }
        },

        (Intent::MessageSubscription(intent), RecordValue::MessageSubscription(record)) => match intent {
            MessageSubscriptionIntent::Created | MessageSubscriptionIntent::Migrated => {
                state.message_subscriptions.insert(key, record.clone());
            }
            MessageSubscriptionIntent::Deleted => {
                state.message_subscriptions.remove(&key);
            }
            MessageSubscriptionIntent::Create
            | MessageSubscriptionIntent::Migrate
            | MessageSubscriptionIntent::Delete => {}
        },

        (Intent::Message(intent), RecordValue::Message(record)) => match intent {
            MessageIntent::Published => {
                if record.time_to_live > 0 {
                    state.messages.put_message(key, record.clone());
                }
            }
            MessageIntent::Expired => state.messages.remove_message(key),
        },

        (Intent::MessageStartReservation(intent), RecordValue::MessageStartReservation(record)) => match intent {
            MessageStartReservationIntent::Reserved => state.messages.reserve(
                &record.tenant_id,
                &record.bpmn_process_id,
                &record.correlation_key,
                record.process_instance_key,
            ),
            MessageStartReservationIntent::Released => {
                state.messages.release(&record.tenant_id, &record.bpmn_process_id, &record.correlation_key);
                if state.messages.reservations_of(record.process_instance_key).is_empty() {
                    state.messages.forget_instance(record.process_instance_key);
                }
            }
        },

        (Intent::SignalSubscription(intent), RecordValue::SignalSubscription(record)) => match intent {
            SignalSubscriptionIntent::Created | SignalSubscriptionIntent::Migrated => {
                state.signal_subscriptions.insert(key, record.clone());
            }
            SignalSubscriptionIntent::Deleted => {
                state.signal_subscriptions.remove(&key);
            }
        },

        (Intent::CompensationSubscription(intent), RecordValue::CompensationSubscription(record)) => match intent {
            CompensationSubscriptionIntent::Created | CompensationSubscriptionIntent::Migrated => {
                state.compensation_subscriptions.insert(key, record.clone());
            }
            CompensationSubscriptionIntent::Deleted => {
                state.compensation_subscriptions.remove(&key);
            }
        },

        // no state attached
        _ => {}
    }
}

fn set_state(state: &mut ProcessingState, key: Key, element_state: ElementState) {
    if let Some(instance) = state.instance_mut(key) {
        instance.state = element_state;
    }
}
