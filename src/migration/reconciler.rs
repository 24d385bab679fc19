//! Reconciliation of catch-event subscriptions (message, signal, timer) and compensation
//! subscriptions of a migrated element instance.
//!
//! All kinds share the same three outcomes: migrate an existing subscription to a target catch
//! event, delete a subscription whose catch event is not mapped, or create a subscription for a
//! catch event the target element has in addition.

use tracing::debug;
use crate::Key;
use crate::migration::preconditions::{MigrationError, missing_entity};
use crate::runtime::behavior::{message_subscription_value, write_message_subscription, write_signal_subscription, write_timer};
use crate::runtime::records::{
    CompensationSubscriptionIntent, MessageSubscriptionIntent, ProcessInstanceRecord,
    ProcessMessageSubscriptionIntent, RecordValue, SignalSubscriptionIntent, TimerIntent,
};
use crate::runtime::writer::Writers;

/// Kind-specific payload of a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatchEventKind {
    Message { message_name: String, correlation_key: String },
    Signal { signal_name: String },
    /// Due date in epoch milliseconds
    Timer { due_date: i64, repetitions: i32 },
    Compensation { handler_id: Option<String> },
}

impl CatchEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            CatchEventKind::Message { .. } => "message subscription",
            CatchEventKind::Signal { .. } => "signal subscription",
            CatchEventKind::Timer { .. } => "timer",
            CatchEventKind::Compensation { .. } => "compensation subscription",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatchEventAction {
    /// Retarget the subscription with `key` to `target_catch_event_id`
    Migrate {
        key: Key,
        target_catch_event_id: String,
        interrupting: bool,
        kind: CatchEventKind,
    },
    Delete { key: Key, kind: CatchEventKind },
    Create {
        catch_event_id: String,
        interrupting: bool,
        kind: CatchEventKind,
    },
}

/// A message subscription opened only after the migration itself is written
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredSubscription {
    pub element_instance_key: Key,
    pub owner: ProcessInstanceRecord,
    pub catch_event_id: String,
    pub message_name: String,
    pub correlation_key: String,
    pub interrupting: bool,
}

/// Applies one action for the (already migrated) element instance `owner_key`.
///
/// Message subscription creations are collected in `deferred` instead of being written.
pub fn reconcile(
    w: &mut Writers,
    owner_key: Key,
    owner: &ProcessInstanceRecord,
    action: &CatchEventAction,
    deferred: &mut Vec<DeferredSubscription>,
) -> Result<(), MigrationError> {
    let process_instance_key = owner.process_instance_key;
    match action {
        CatchEventAction::Migrate { key, target_catch_event_id, interrupting, kind } => {
            debug!(element_instance_key = owner_key, subscription_key = key, target_catch_event_id = %target_catch_event_id, "Migrating {}", kind.name());
            migrate(w, *key, owner, target_catch_event_id, *interrupting, kind)
                .ok_or_else(|| missing_entity(kind.name(), process_instance_key, *key))
        }
        CatchEventAction::Delete { key, kind } => {
            debug!(element_instance_key = owner_key, subscription_key = key, "Deleting {}", kind.name());
            delete(w, *key, kind).ok_or_else(|| missing_entity(kind.name(), process_instance_key, *key))
        }
        CatchEventAction::Create { catch_event_id, interrupting, kind } => {
            debug!(element_instance_key = owner_key, catch_event_id = %catch_event_id, "Creating {}", kind.name());
            match kind {
                CatchEventKind::Message { message_name, correlation_key } => {
                    deferred.push(DeferredSubscription {
                        element_instance_key: owner_key,
                        owner: owner.clone(),
                        catch_event_id: catch_event_id.clone(),
                        message_name: message_name.clone(),
                        correlation_key: correlation_key.clone(),
                        interrupting: *interrupting,
                    });
                }
                CatchEventKind::Signal { signal_name } => {
                    write_signal_subscription(w, owner_key, owner, catch_event_id, signal_name);
                }
                CatchEventKind::Timer { due_date, repetitions } => {
                    write_timer(w, owner_key, owner, catch_event_id, *due_date, *repetitions);
                }
                CatchEventKind::Compensation { .. } => {
                    return Err(MigrationError::SafetyCheckFailed(format!(
                        "Expected to migrate process instance '{}' without creating compensation subscriptions, but one was planned for catch event '{}'. Please report this as a bug",
                        process_instance_key, catch_event_id
                    )));
                }
            }
            Ok(())
        }
    }
}

fn migrate(
    w: &mut Writers,
    key: Key,
    owner: &ProcessInstanceRecord,
    target_catch_event_id: &str,
    interrupting: bool,
    kind: &CatchEventKind,
) -> Option<()> {
    match kind {
        CatchEventKind::Message { .. } => {
            let mut subscription = w.state().process_message_subscriptions.get(&key).cloned()?;
            subscription.element_id = target_catch_event_id.to_string();
            subscription.process_definition_key = owner.process_definition_key;
            subscription.bpmn_process_id = owner.bpmn_process_id.clone();
            subscription.interrupting = interrupting;
            let message_side = message_subscription_value(&subscription);
            w.append_event(key, ProcessMessageSubscriptionIntent::Migrated, RecordValue::ProcessMessageSubscription(subscription));
            w.append_post_commit_command(key, MessageSubscriptionIntent::Migrate, RecordValue::MessageSubscription(message_side));
        }
        CatchEventKind::Signal { .. } => {
            let mut subscription = w.state().signal_subscriptions.get(&key).cloned()?;
            subscription.catch_event_id = target_catch_event_id.to_string();
            subscription.process_definition_key = owner.process_definition_key;
            subscription.bpmn_process_id = owner.bpmn_process_id.clone();
            w.append_event(key, SignalSubscriptionIntent::Migrated, RecordValue::SignalSubscription(subscription));
        }
        CatchEventKind::Timer { .. } => {
            // the due date stays as it was scheduled
            let mut timer = w.state().timers.get(&key).cloned()?;
            timer.target_element_id = target_catch_event_id.to_string();
            timer.process_definition_key = owner.process_definition_key;
            w.append_event(key, TimerIntent::Migrated, RecordValue::Timer(timer));
        }
        CatchEventKind::Compensation { handler_id } => {
            let mut subscription = w.state().compensation_subscriptions.get(&key).cloned()?;
            subscription.process_definition_key = owner.process_definition_key;
            subscription.compensable_activity_id = target_catch_event_id.to_string();
            subscription.compensation_handler_id = handler_id.clone();
            w.append_event(key, CompensationSubscriptionIntent::Migrated, RecordValue::CompensationSubscription(subscription));
        }
    }
    Some(())
}

fn delete(w: &mut Writers, key: Key, kind: &CatchEventKind) -> Option<()> {
    match kind {
        CatchEventKind::Message { .. } => {
            let subscription = w.state().process_message_subscriptions.get(&key).cloned()?;
            let message_side = message_subscription_value(&subscription);
            w.append_event(key, ProcessMessageSubscriptionIntent::Deleted, RecordValue::ProcessMessageSubscription(subscription));
            w.append_post_commit_command(key, MessageSubscriptionIntent::Delete, RecordValue::MessageSubscription(message_side));
        }
        CatchEventKind::Signal { .. } => {
            let subscription = w.state().signal_subscriptions.get(&key).cloned()?;
            w.append_event(key, SignalSubscriptionIntent::Deleted, RecordValue::SignalSubscription(subscription));
        }
        CatchEventKind::Timer { .. } => {
            let timer = w.state().timers.get(&key).cloned()?;
            w.append_event(key, TimerIntent::Canceled, RecordValue::Timer(timer));
        }
        CatchEventKind::Compensation { .. } => {
            let subscription = w.state().compensation_subscriptions.get(&key).cloned()?;
            w.append_event(key, CompensationSubscriptionIntent::Deleted, RecordValue::CompensationSubscription(subscription));
        }
    }
    Some(())
}

/// Opens a message subscription collected during reconciliation
pub fn create_deferred(w: &mut Writers, subscription: &DeferredSubscription) -> Key {
    write_message_subscription(
        w,
        subscription.element_instance_key,
        &subscription.owner,
        &subscription.catch_event_id,
        &subscription.message_name,
        &subscription.correlation_key,
        subscription.interrupting,
    )
}
