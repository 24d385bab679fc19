use serde_json::Value;
use tracing::debug;
use crate::Key;
use crate::migration::preconditions::{MigrationError, missing_entity};
use crate::migration::reconciler::{self, DeferredSubscription};
use crate::migration::validator::{ElementPlan, MigrationPlan};
use crate::runtime::definition::BpmnElementType;
use crate::runtime::records::{
    IncidentIntent, JobIntent, MessageStartReservationIntent, MessageStartReservationRecord,
    ProcessInstanceIntent, ProcessInstanceRecord, RecordValue, UserTaskIntent, VariableIntent,
};
use crate::runtime::writer::Writers;

/// Applies an accepted plan. Returns the message subscriptions to open once the migration
/// itself is written.
///
/// Any entity the plan refers to is expected to exist; a missing one aborts the whole unit of
/// work with [`MigrationError::SafetyCheckFailed`].
pub fn execute(plan: &MigrationPlan, w: &mut Writers) -> Result<Vec<DeferredSubscription>, MigrationError> {
    let mut deferred = Vec::new();
    for element in &plan.elements {
        let record = migrate_element(plan, element, w)?;

        if !element.activating {
            for action in &element.catch_events {
                reconciler::reconcile(w, element.element_instance_key, &record, action, &mut deferred)?;
            }
        }

        if element.element_type == BpmnElementType::Process {
            for action in &plan.compensation {
                reconciler::reconcile(w, element.element_instance_key, &record, action, &mut deferred)?;
            }
            if let Some(reservation) = &plan.reservation {
                // the source id keeps its reservation until the instance completes
                w.append_event(
                    plan.process_instance_key,
                    MessageStartReservationIntent::Reserved,
                    RecordValue::MessageStartReservation(MessageStartReservationRecord {
                        process_instance_key: plan.process_instance_key,
                        bpmn_process_id: reservation.bpmn_process_id.clone(),
                        correlation_key: reservation.correlation_key.clone(),
                        tenant_id: plan.tenant_id.clone(),
                    }),
                );
            }
        }
    }
    Ok(deferred)
}

/// Rewrites the element instance and everything it owns directly: job, incidents, user task
/// and local variables
fn migrate_element(plan: &MigrationPlan, element: &ElementPlan, w: &mut Writers) -> Result<ProcessInstanceRecord, MigrationError> {
    let key = element.element_instance_key;
    let process_instance_key = plan.process_instance_key;
    let instance = w
        .state()
        .instance(key)
        .cloned()
        .ok_or_else(|| missing_entity("element instance", process_instance_key, key))?;

    let target = &plan.target;
    let mut record = instance.record.clone();
    record.process_definition_key = target.key;
    record.bpmn_process_id = target.bpmn_process_id.clone();
    record.version = target.version;
    record.element_id = element.target_element_id.clone();
    let (definitions, calling_elements) = w.state().tree_path(&record);
    record.process_definition_path = definitions;
    record.calling_element_path = calling_elements;

    debug!(
        element_instance_key = key,
        source_element_id = %element.source_element_id,
        target_element_id = %element.target_element_id,
        "Migrating element instance"
    );
    w.append_event(key, ProcessInstanceIntent::ElementMigrated, RecordValue::ProcessInstance(record.clone()));

    if let Some(job_key) = instance.job_key {
        let mut job = w
            .state()
            .jobs
            .get(&job_key)
            .cloned()
            .ok_or_else(|| missing_entity("job", process_instance_key, job_key))?;
        job.process_definition_key = target.key;
        job.process_definition_version = target.version;
        job.bpmn_process_id = target.bpmn_process_id.clone();
        job.element_id = element.target_element_id.clone();
        w.append_event(job_key, JobIntent::Migrated, RecordValue::Job(job));

        if let Some(incident_key) = w.state().job_incident_key(job_key) {
            migrate_incident(w, incident_key, &record, process_instance_key)?;
        }
    }

    if let Some(incident_key) = w.state().process_incident_key(key) {
        migrate_incident(w, incident_key, &record, process_instance_key)?;
    }

    if let Some(user_task_key) = instance.user_task_key {
        let mut task = w
            .state()
            .user_tasks
            .get(&user_task_key)
            .cloned()
            .ok_or_else(|| missing_entity("user task", process_instance_key, user_task_key))?;
        task.process_definition_key = target.key;
        task.process_definition_version = target.version;
        task.bpmn_process_id = target.bpmn_process_id.clone();
        task.element_id = element.target_element_id.clone();
        task.variables = Value::Null;
        w.append_event(user_task_key, UserTaskIntent::Migrated, RecordValue::UserTask(task));
    }

    let variables: Vec<(Key, _)> = w
        .state()
        .variables_local(key)
        .into_iter()
        .map(|(variable_key, variable)| (variable_key, variable.clone()))
        .collect();
    for (variable_key, mut variable) in variables {
        variable.value = Value::Null;
        variable.process_definition_key = target.key;
        variable.bpmn_process_id = target.bpmn_process_id.clone();
        w.append_event(variable_key, VariableIntent::Migrated, RecordValue::Variable(variable));
    }

    if let Some(child_key) = instance.called_child_instance_key {
        migrate_ancestor_paths(w, child_key);
    }
    Ok(record)
}

fn migrate_incident(
    w: &mut Writers,
    incident_key: Key,
    record: &ProcessInstanceRecord,
    process_instance_key: Key,
) -> Result<(), MigrationError> {
    let mut incident = w
        .state()
        .incidents
        .get(&incident_key)
        .cloned()
        .ok_or_else(|| missing_entity("incident", process_instance_key, incident_key))?;
    incident.bpmn_process_id = record.bpmn_process_id.clone();
    incident.process_definition_key = record.process_definition_key;
    incident.element_id = record.element_id.clone();
    incident.process_definition_path = record.process_definition_path.clone();
    incident.calling_element_path = record.calling_element_path.clone();
    w.append_event(incident_key, IncidentIntent::Migrated, RecordValue::Incident(incident));
    Ok(())
}

/// Every element of a called instance (and of the instances it calls in turn) learns the new
/// ancestor path. Its own definition is unchanged.
fn migrate_ancestor_paths(w: &mut Writers, called_process_instance_key: Key) {
    for key in w.state().instance_tree(called_process_instance_key) {
        let Some(instance) = w.state().instance(key).cloned() else {
            continue;
        };
        let mut record = instance.record;
        let (definitions, calling_elements) = w.state().tree_path(&record);
        record.process_definition_path = definitions;
        record.calling_element_path = calling_elements;
        w.append_event(key, ProcessInstanceIntent::AncestorMigrated, RecordValue::ProcessInstance(record));

        if let Some(grandchild) = instance.called_child_instance_key {
            migrate_ancestor_paths(w, grandchild);
        }
    }
}
