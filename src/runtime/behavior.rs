//! Minimal BPMN execution: enough stepping to bring instances into the runtime states a
//! migration has to deal with (waiting tasks, open subscriptions, called children, incidents,
//! compensation subscriptions) and to continue them afterwards.

use std::collections::BTreeSet;
use std::sync::Arc;
use anyhow::{Result, anyhow, bail};
use chrono::TimeDelta;
use serde_json::{Map, Value};
use tracing::debug;
use crate::Key;
use crate::runtime::catalog::{DeployedProcess, ProcessCatalog};
use crate::runtime::definition::{BpmnElementType, BpmnEventType, ExecutableElement};
use crate::runtime::records::{
    CompensationSubscriptionIntent, CompensationSubscriptionRecord, IncidentIntent, IncidentRecord,
    JobIntent, JobRecord, MessageIntent, MessageRecord, MessageStartReservationIntent,
    MessageStartReservationRecord, MessageSubscriptionIntent, MessageSubscriptionRecord, NO_KEY,
    ProcessInstanceIntent, ProcessInstanceRecord, ProcessMessageSubscriptionIntent,
    ProcessMessageSubscriptionRecord, RecordValue, SignalIntent, SignalRecord,
    SignalSubscriptionIntent, SignalSubscriptionRecord, TimerIntent, TimerRecord, UserTaskIntent,
    UserTaskRecord, VariableIntent, VariableRecord,
};
use crate::runtime::state::{ElementState, ProcessingState};
use crate::runtime::writer::Writers;

pub const USER_TASK_JOB_TYPE: &str = "io.camunda.zeebe:userTask";
pub const ASSIGNEE_HEADER: &str = "io.camunda.zeebe:assignee";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activation {
    /// Run the element: open subscriptions, create jobs, continue the flow
    Normal,
    /// Activate a scope without starting its content
    ScopeOnly,
    /// The element's event already occurred, complete it right away
    Triggered,
}

/// How a new process instance starts
pub enum StartAt<'s> {
    NoneStartEvent,
    /// A message start event, with the correlation key to reserve (may be empty)
    MessageStartEvent { element_id: &'s str, correlation_key: &'s str },
    /// Start instructions: activate these elements and their enclosing scopes
    Elements(&'s [String]),
}

pub struct BpmnBehavior<'a> {
    catalog: &'a ProcessCatalog,
    /// Epoch milliseconds
    now: i64,
}

impl<'a> BpmnBehavior<'a> {
    pub fn new(catalog: &'a ProcessCatalog, now: i64) -> Self {
        Self { catalog, now }
    }

    fn process_of(&self, state: &ProcessingState, element_instance_key: Key) -> Result<Arc<DeployedProcess>> {
        let instance = state
            .instance(element_instance_key)
            .ok_or_else(|| anyhow!("No element instance found with key {}", element_instance_key))?;
        self.catalog
            .by_key(instance.record.process_definition_key)
            .ok_or_else(|| anyhow!("No process definition found with key {}", instance.record.process_definition_key))
    }

    fn new_record(&self, state: &ProcessingState, flow_scope_key: Key, element: &ExecutableElement) -> Result<ProcessInstanceRecord> {
        let scope = state
            .instance(flow_scope_key)
            .ok_or_else(|| anyhow!("No flow scope instance found with key {}", flow_scope_key))?;
        let process_instance = state
            .instance(scope.record.process_instance_key)
            .ok_or_else(|| anyhow!("No process instance found with key {}", scope.record.process_instance_key))?;
        let pi = &process_instance.record;

        let mut record = ProcessInstanceRecord {
            bpmn_process_id: pi.bpmn_process_id.clone(),
            version: pi.version,
            process_definition_key: pi.process_definition_key,
            process_instance_key: process_instance.key,
            element_id: element.id.clone(),
            flow_scope_key,
            bpmn_element_type: element.element_type,
            bpmn_event_type: element.event_type,
            parent_process_instance_key: pi.parent_process_instance_key,
            parent_element_instance_key: pi.parent_element_instance_key,
            tenant_id: pi.tenant_id.clone(),
            process_definition_path: Vec::new(),
            calling_element_path: Vec::new(),
        };
        let (definitions, calling_elements) = state.tree_path(&record);
        record.process_definition_path = definitions;
        record.calling_element_path = calling_elements;
        Ok(record)
    }

    // --- process instances ---

    pub fn create_process_instance(
        &self,
        w: &mut Writers,
        process: &Arc<DeployedProcess>,
        variables: &Map<String, Value>,
        start: StartAt,
        call_activity_key: Option<Key>,
    ) -> Result<Key> {
        let key = w.next_key();
        let (parent_process_instance_key, parent_element_instance_key) = match call_activity_key {
            Some(call_activity_key) => {
                let call_activity = w
                    .state()
                    .instance(call_activity_key)
                    .ok_or_else(|| anyhow!("No call activity instance found with key {}", call_activity_key))?;
                (call_activity.record.process_instance_key, call_activity_key)
            }
            None => (NO_KEY, NO_KEY),
        };

        let mut record = ProcessInstanceRecord {
            bpmn_process_id: process.bpmn_process_id.clone(),
            version: process.version,
            process_definition_key: process.key,
            process_instance_key: key,
            element_id: process.bpmn_process_id.clone(),
            flow_scope_key: NO_KEY,
            bpmn_element_type: BpmnElementType::Process,
            bpmn_event_type: None,
            parent_process_instance_key,
            parent_element_instance_key,
            tenant_id: process.tenant_id.clone(),
            process_definition_path: Vec::new(),
            calling_element_path: Vec::new(),
        };
        let (definitions, calling_elements) = w.state().tree_path(&record);
        record.process_definition_path = definitions;
        record.calling_element_path = calling_elements;

        w.append_event(key, ProcessInstanceIntent::ElementActivating, RecordValue::ProcessInstance(record.clone()));
        if let StartAt::MessageStartEvent { correlation_key, .. } = &start {
            if !correlation_key.is_empty() {
                w.append_event(
                    key,
                    MessageStartReservationIntent::Reserved,
                    RecordValue::MessageStartReservation(MessageStartReservationRecord {
                        process_instance_key: key,
                        bpmn_process_id: process.bpmn_process_id.clone(),
                        correlation_key: correlation_key.to_string(),
                        tenant_id: process.tenant_id.clone(),
                    }),
                );
            }
        }
        self.set_variables(w, key, variables);
        self.subscribe_to_events(w, key, &process.process.catch_events(&process.bpmn_process_id))?;
        w.append_event(key, ProcessInstanceIntent::ElementActivated, RecordValue::ProcessInstance(record));
        debug!(process_instance_key = key, bpmn_process_id = %process.bpmn_process_id, "Created process instance");

        match start {
            StartAt::NoneStartEvent => {
                let start_event = process
                    .process
                    .none_start_event(&process.bpmn_process_id)
                    .ok_or_else(|| anyhow!("Process '{}' has no none start event", process.bpmn_process_id))?;
                self.activate(w, key, &start_event.id, Activation::Normal)?;
            }
            StartAt::MessageStartEvent { element_id, .. } => {
                self.activate(w, key, element_id, Activation::Triggered)?;
            }
            StartAt::Elements(element_ids) => {
                for element_id in element_ids {
                    self.activate_with_scopes(w, key, process, element_id)?;
                }
            }
        }
        Ok(key)
    }

    fn activate_with_scopes(&self, w: &mut Writers, process_instance_key: Key, process: &DeployedProcess, element_id: &str) -> Result<Key> {
        let element = process
            .process
            .element(element_id)
            .ok_or_else(|| anyhow!("Element '{}' not found in process '{}'", element_id, process.bpmn_process_id))?;

        let mut scopes = Vec::new();
        let mut current = element.flow_scope.clone();
        while let Some(scope_id) = current {
            if scope_id == process.bpmn_process_id {
                break;
            }
            current = process.process.element(&scope_id).and_then(|e| e.flow_scope.clone());
            scopes.push(scope_id);
        }

        let mut scope_key = process_instance_key;
        for scope_id in scopes.iter().rev() {
            let existing = w
                .state()
                .children(scope_key)
                .into_iter()
                .find(|c| c.is_active() && c.record.element_id == *scope_id)
                .map(|c| c.key);
            scope_key = match existing {
                Some(key) => key,
                None => self.activate(w, scope_key, scope_id, Activation::ScopeOnly)?,
            };
        }
        self.activate(w, scope_key, element_id, Activation::Normal)
    }

    /// Activates elements inside an ad-hoc sub-process, each in a fresh inner instance
    pub fn activate_ad_hoc_elements(&self, w: &mut Writers, ad_hoc_key: Key, element_ids: &[String]) -> Result<()> {
        let ad_hoc = w
            .state()
            .instance(ad_hoc_key)
            .ok_or_else(|| anyhow!("No element instance found with key {}", ad_hoc_key))?;
        if ad_hoc.record.bpmn_element_type != BpmnElementType::AdHocSubProcess {
            bail!("Element instance {} is not an ad-hoc sub-process", ad_hoc_key);
        }
        let inner_id = crate::runtime::definition::inner_instance_id(&ad_hoc.record.element_id);
        for element_id in element_ids {
            let inner_key = self.activate(w, ad_hoc_key, &inner_id, Activation::ScopeOnly)?;
            self.activate(w, inner_key, element_id, Activation::Normal)?;
        }
        Ok(())
    }

    // --- element lifecycle ---

    fn activate(&self, w: &mut Writers, flow_scope_key: Key, element_id: &str, mode: Activation) -> Result<Key> {
        let process = self.process_of(w.state(), flow_scope_key)?;
        let element = process
            .process
            .element(element_id)
            .ok_or_else(|| anyhow!("Element '{}' not found in process '{}'", element_id, process.bpmn_process_id))?;

        let joining = matches!(element.element_type, BpmnElementType::ParallelGateway | BpmnElementType::InclusiveGateway)
            && element.incoming.len() > 1;
        if joining && mode == Activation::Normal {
            let waiting = w
                .state()
                .children(flow_scope_key)
                .into_iter()
                .find(|c| c.is_active() && c.record.element_id == element_id)
                .map(|c| c.key);
            if let Some(gateway_key) = waiting {
                let arrivals = match w.state_mut().instance_mut(gateway_key) {
                    Some(gateway) => {
                        gateway.join_arrivals += 1;
                        gateway.join_arrivals
                    }
                    None => 0,
                };
                if arrivals as usize >= element.incoming.len() {
                    self.complete_element(w, gateway_key)?;
                }
                return Ok(gateway_key);
            }
        }

        let key = w.next_key();
        let record = self.new_record(w.state(), flow_scope_key, element)?;
        w.append_event(key, ProcessInstanceIntent::ElementActivating, RecordValue::ProcessInstance(record.clone()));

        match mode {
            Activation::ScopeOnly => {
                self.subscribe_to_events(w, key, &process.process.catch_events(element_id))?;
                w.append_event(key, ProcessInstanceIntent::ElementActivated, RecordValue::ProcessInstance(record));
            }
            Activation::Triggered => {
                w.append_event(key, ProcessInstanceIntent::ElementActivated, RecordValue::ProcessInstance(record));
                self.complete_element(w, key)?;
            }
            Activation::Normal => self.run(w, &process, element, key, record)?,
        }
        Ok(key)
    }

    fn run(&self, w: &mut Writers, process: &DeployedProcess, element: &ExecutableElement, key: Key, record: ProcessInstanceRecord) -> Result<()> {
        let activated = RecordValue::ProcessInstance(record.clone());
        match element.element_type {
            BpmnElementType::StartEvent
            | BpmnElementType::EndEvent
            | BpmnElementType::IntermediateThrowEvent
            | BpmnElementType::BoundaryEvent
            | BpmnElementType::ManualTask
            | BpmnElementType::ExclusiveGateway => {
                w.append_event(key, ProcessInstanceIntent::ElementActivated, activated);
                self.complete_element(w, key)?;
            }
            BpmnElementType::ParallelGateway | BpmnElementType::InclusiveGateway => {
                w.append_event(key, ProcessInstanceIntent::ElementActivated, activated);
                if element.incoming.len() > 1 {
                    if let Some(gateway) = w.state_mut().instance_mut(key) {
                        gateway.join_arrivals = 1;
                    }
                } else {
                    self.complete_element(w, key)?;
                }
            }
            BpmnElementType::ServiceTask
            | BpmnElementType::SendTask
            | BpmnElementType::ScriptTask
            | BpmnElementType::BusinessRuleTask => {
                self.subscribe_to_events(w, key, &process.process.catch_events(&element.id))?;
                self.create_job(w, key, &record, element);
                w.append_event(key, ProcessInstanceIntent::ElementActivated, activated);
            }
            BpmnElementType::UserTask => {
                self.subscribe_to_events(w, key, &process.process.catch_events(&element.id))?;
                if element.native_user_task {
                    self.create_user_task(w, key, &record, element);
                } else {
                    self.create_job(w, key, &record, element);
                }
                w.append_event(key, ProcessInstanceIntent::ElementActivated, activated);
            }
            BpmnElementType::ReceiveTask
            | BpmnElementType::IntermediateCatchEvent
            | BpmnElementType::EventBasedGateway
            | BpmnElementType::AdHocSubProcess
            | BpmnElementType::AdHocSubProcessInnerInstance
            | BpmnElementType::EventSubProcess => {
                self.subscribe_to_events(w, key, &process.process.catch_events(&element.id))?;
                w.append_event(key, ProcessInstanceIntent::ElementActivated, activated);
            }
            BpmnElementType::SubProcess => {
                self.subscribe_to_events(w, key, &process.process.catch_events(&element.id))?;
                w.append_event(key, ProcessInstanceIntent::ElementActivated, activated);
                let start = process
                    .process
                    .none_start_event(&element.id)
                    .ok_or_else(|| anyhow!("Sub-process '{}' has no none start event", element.id))?;
                self.activate(w, key, &start.id, Activation::Normal)?;
            }
            BpmnElementType::CallActivity => {
                self.subscribe_to_events(w, key, &process.process.catch_events(&element.id))?;
                w.append_event(key, ProcessInstanceIntent::ElementActivated, activated);
                let called_id = element
                    .called_process_id
                    .as_deref()
                    .ok_or_else(|| anyhow!("Call activity '{}' has no called process", element.id))?;
                let called = self
                    .catalog
                    .latest(called_id, &process.tenant_id)
                    .ok_or_else(|| anyhow!("Call activity '{}' calls unknown process '{}'", element.id, called_id))?;
                let variables = visible_variables(w.state(), key);
                self.create_process_instance(w, &called, &variables, StartAt::NoneStartEvent, Some(key))?;
            }
            BpmnElementType::Process => bail!("A process cannot be activated as an element"),
        }
        Ok(())
    }

    pub fn complete_element(&self, w: &mut Writers, key: Key) -> Result<()> {
        self.complete(w, key, true)
    }

    fn complete(&self, w: &mut Writers, key: Key, continue_flow: bool) -> Result<()> {
        let instance = w
            .state()
            .instance(key)
            .cloned()
            .ok_or_else(|| anyhow!("No element instance found with key {}", key))?;
        let process = self.process_of(w.state(), key)?;
        let element = process
            .process
            .element(&instance.record.element_id)
            .ok_or_else(|| anyhow!("Element '{}' not found in process '{}'", instance.record.element_id, process.bpmn_process_id))?;

        w.append_event(key, ProcessInstanceIntent::ElementCompleting, RecordValue::ProcessInstance(instance.record.clone()));
        self.unsubscribe(w, key);
        if element.element_type.is_activity() {
            self.subscribe_to_compensation(w, &process, element, key, &instance.record, instance.parent_key);
        }
        w.append_event(key, ProcessInstanceIntent::ElementCompleted, RecordValue::ProcessInstance(instance.record.clone()));

        if element.element_type == BpmnElementType::Process {
            self.close_process_instance(w, key)?;
            let parent = instance.record.parent_element_instance_key;
            if parent != NO_KEY && w.state().instance(parent).is_some() {
                self.complete_element(w, parent)?;
            }
            return Ok(());
        }
        if !continue_flow || element.element_type == BpmnElementType::EventBasedGateway {
            return Ok(());
        }

        let Some(flow_scope_key) = instance.parent_key else {
            return Ok(());
        };
        for target in &element.outgoing {
            if w.state().instance(flow_scope_key).is_none() {
                break;
            }
            self.activate(w, flow_scope_key, target, Activation::Normal)?;
        }
        self.complete_scope_if_done(w, flow_scope_key)
    }

    fn complete_scope_if_done(&self, w: &mut Writers, scope_key: Key) -> Result<()> {
        let Some(scope) = w.state().instance(scope_key) else {
            return Ok(());
        };
        if scope.state != ElementState::Activated || w.state().active_children(scope_key) > 0 {
            return Ok(());
        }
        match scope.record.bpmn_element_type {
            BpmnElementType::Process
            | BpmnElementType::SubProcess
            | BpmnElementType::EventSubProcess
            | BpmnElementType::AdHocSubProcess
            | BpmnElementType::AdHocSubProcessInnerInstance => self.complete_element(w, scope_key),
            _ => Ok(()),
        }
    }

    pub fn terminate_element(&self, w: &mut Writers, key: Key) -> Result<()> {
        let Some(instance) = w.state().instance(key).cloned() else {
            return Ok(());
        };
        w.append_event(key, ProcessInstanceIntent::ElementTerminating, RecordValue::ProcessInstance(instance.record.clone()));
        for child in w.state().child_keys(key).into_iter().rev() {
            self.terminate_element(w, child)?;
        }
        if let Some(child) = instance.called_child_instance_key {
            self.terminate_element(w, child)?;
        }
        self.unsubscribe(w, key);
        if let Some(job_key) = instance.job_key {
            if let Some(job) = w.state().jobs.get(&job_key).cloned() {
                w.append_event(job_key, JobIntent::Canceled, RecordValue::Job(job));
            }
        }
        if let Some(user_task_key) = instance.user_task_key {
            if let Some(task) = w.state().user_tasks.get(&user_task_key).cloned() {
                w.append_event(user_task_key, UserTaskIntent::Canceled, RecordValue::UserTask(task));
            }
        }
        w.append_event(key, ProcessInstanceIntent::ElementTerminated, RecordValue::ProcessInstance(instance.record.clone()));
        if instance.record.bpmn_element_type == BpmnElementType::Process {
            self.close_process_instance(w, key)?;
        }
        Ok(())
    }

    /// Releases message start reservations and drops compensation subscriptions of an ended instance
    fn close_process_instance(&self, w: &mut Writers, process_instance_key: Key) -> Result<()> {
        for subscription_key in w.state().compensation_subscriptions_of(process_instance_key) {
            if let Some(subscription) = w.state().compensation_subscriptions.get(&subscription_key).cloned() {
                w.append_event(subscription_key, CompensationSubscriptionIntent::Deleted, RecordValue::CompensationSubscription(subscription));
            }
        }

        let reservations = w.state().messages.reservations_of(process_instance_key);
        for (tenant_id, bpmn_process_id, correlation_key) in &reservations {
            w.append_event(
                process_instance_key,
                MessageStartReservationIntent::Released,
                RecordValue::MessageStartReservation(MessageStartReservationRecord {
                    process_instance_key,
                    bpmn_process_id: bpmn_process_id.clone(),
                    correlation_key: correlation_key.clone(),
                    tenant_id: tenant_id.clone(),
                }),
            );
        }
        // buffered messages become correlatable once every reservation is gone
        for (tenant_id, bpmn_process_id, correlation_key) in reservations {
            self.correlate_buffered_messages(w, &tenant_id, &bpmn_process_id, &correlation_key)?;
        }
        Ok(())
    }

    fn correlate_buffered_messages(&self, w: &mut Writers, tenant_id: &str, bpmn_process_id: &str, correlation_key: &str) -> Result<()> {
        let Some(process) = self.catalog.latest(bpmn_process_id, tenant_id) else {
            return Ok(());
        };
        for start_event in process.process.message_start_events() {
            let Some(message) = start_event.message() else {
                continue;
            };
            let buffered: Vec<(Key, MessageRecord)> = w
                .state()
                .messages
                .buffered(&message.name, correlation_key, tenant_id, self.now)
                .into_iter()
                .map(|(key, m)| (key, m.clone()))
                .collect();
            for (message_key, message) in buffered {
                if w.state().messages.has_started(message_key, bpmn_process_id) {
                    continue;
                }
                debug!(message_key, bpmn_process_id, correlation_key, "Correlating buffered message to message start event");
                self.start_by_message(w, &process, &start_event.id, message_key, &message)?;
                return Ok(());
            }
        }
        Ok(())
    }

    fn start_by_message(&self, w: &mut Writers, process: &Arc<DeployedProcess>, start_event_id: &str, message_key: Key, message: &MessageRecord) -> Result<Key> {
        w.state_mut()
            .messages
            .mark_started(message_key, &process.bpmn_process_id);
        self.create_process_instance(
            w,
            process,
            &message.variables,
            StartAt::MessageStartEvent {
                element_id: start_event_id,
                correlation_key: &message.correlation_key,
            },
            None,
        )
    }

    // --- side entities ---

    fn create_job(&self, w: &mut Writers, element_instance_key: Key, record: &ProcessInstanceRecord, element: &ExecutableElement) {
        let job_type = match element.element_type {
            BpmnElementType::UserTask => USER_TASK_JOB_TYPE.to_string(),
            _ => element.job_type.clone().unwrap_or_else(|| element.id.clone()),
        };
        let mut custom_headers = Map::new();
        if let Some(assignee) = &element.assignee {
            custom_headers.insert(ASSIGNEE_HEADER.to_string(), Value::String(assignee.clone()));
        }
        let job_key = w.next_key();
        w.append_event(
            job_key,
            JobIntent::Created,
            RecordValue::Job(JobRecord {
                job_type,
                retries: 3,
                worker: String::new(),
                error_message: String::new(),
                custom_headers,
                element_instance_key,
                element_id: record.element_id.clone(),
                process_instance_key: record.process_instance_key,
                process_definition_key: record.process_definition_key,
                process_definition_version: record.version,
                bpmn_process_id: record.bpmn_process_id.clone(),
                tenant_id: record.tenant_id.clone(),
            }),
        );
    }

    fn create_user_task(&self, w: &mut Writers, element_instance_key: Key, record: &ProcessInstanceRecord, element: &ExecutableElement) {
        let user_task_key = w.next_key();
        let variables = Value::Object(visible_variables(w.state(), element_instance_key));
        w.append_event(
            user_task_key,
            UserTaskIntent::Created,
            RecordValue::UserTask(UserTaskRecord {
                user_task_key,
                assignee: element.assignee.clone().unwrap_or_default(),
                candidate_groups: Vec::new(),
                due_date: String::new(),
                follow_up_date: String::new(),
                form_key: NO_KEY,
                variables,
                element_instance_key,
                element_id: record.element_id.clone(),
                process_instance_key: record.process_instance_key,
                process_definition_key: record.process_definition_key,
                process_definition_version: record.version,
                bpmn_process_id: record.bpmn_process_id.clone(),
                tenant_id: record.tenant_id.clone(),
            }),
        );
    }

    fn subscribe_to_compensation(
        &self,
        w: &mut Writers,
        process: &DeployedProcess,
        element: &ExecutableElement,
        key: Key,
        record: &ProcessInstanceRecord,
        flow_scope_key: Option<Key>,
    ) {
        let boundary = process
            .process
            .boundary_events(&element.id)
            .into_iter()
            .find(|b| b.event_type == Some(BpmnEventType::Compensation));
        let has_compensable_children = w
            .state()
            .compensation_subscriptions
            .values()
            .any(|s| s.compensable_activity_scope_key == key);
        if boundary.is_none() && !has_compensable_children {
            return;
        }

        let subscription_key = w.next_key();
        w.append_event(
            subscription_key,
            CompensationSubscriptionIntent::Created,
            RecordValue::CompensationSubscription(CompensationSubscriptionRecord {
                tenant_id: record.tenant_id.clone(),
                process_instance_key: record.process_instance_key,
                process_definition_key: record.process_definition_key,
                compensable_activity_id: element.id.clone(),
                compensable_activity_instance_key: key,
                compensable_activity_scope_key: flow_scope_key.unwrap_or(NO_KEY),
                compensation_handler_id: boundary.and_then(|b| b.compensation_handler().map(str::to_string)),
            }),
        );
    }

    pub fn set_variables(&self, w: &mut Writers, scope_key: Key, variables: &Map<String, Value>) {
        for (name, value) in variables {
            set_variable(w, scope_key, name, value.clone());
        }
    }

    pub fn fail_job(&self, w: &mut Writers, job_key: Key, error_message: &str) -> Result<Key> {
        let mut job = w
            .state()
            .jobs
            .get(&job_key)
            .cloned()
            .ok_or_else(|| anyhow!("No job found with key {}", job_key))?;
        job.retries = 0;
        job.error_message = error_message.to_string();
        w.append_event(job_key, JobIntent::Failed, RecordValue::Job(job.clone()));
        self.create_incident(w, job.element_instance_key, job_key, "JOB_NO_RETRIES", error_message)
    }

    pub fn create_incident(&self, w: &mut Writers, element_instance_key: Key, job_key: Key, error_type: &str, error_message: &str) -> Result<Key> {
        let instance = w
            .state()
            .instance(element_instance_key)
            .ok_or_else(|| anyhow!("No element instance found with key {}", element_instance_key))?;
        let record = &instance.record;
        let incident = IncidentRecord {
            error_type: error_type.to_string(),
            error_message: error_message.to_string(),
            bpmn_process_id: record.bpmn_process_id.clone(),
            process_definition_key: record.process_definition_key,
            process_instance_key: record.process_instance_key,
            element_id: record.element_id.clone(),
            element_instance_key,
            job_key,
            variable_scope_key: element_instance_key,
            tenant_id: record.tenant_id.clone(),
            process_definition_path: record.process_definition_path.clone(),
            calling_element_path: record.calling_element_path.clone(),
        };
        let incident_key = w.next_key();
        w.append_event(incident_key, IncidentIntent::Created, RecordValue::Incident(incident));
        Ok(incident_key)
    }

    pub fn resolve_incident(&self, w: &mut Writers, incident_key: Key) -> Result<()> {
        let incident = w
            .state()
            .incidents
            .get(&incident_key)
            .cloned()
            .ok_or_else(|| anyhow!("No incident found with key {}", incident_key))?;
        w.append_event(incident_key, IncidentIntent::Resolved, RecordValue::Incident(incident));
        Ok(())
    }

    pub fn complete_job(&self, w: &mut Writers, job_key: Key, variables: &Map<String, Value>) -> Result<()> {
        let job = w
            .state()
            .jobs
            .get(&job_key)
            .cloned()
            .ok_or_else(|| anyhow!("No job found with key {}", job_key))?;
        w.append_event(job_key, JobIntent::Completed, RecordValue::Job(job.clone()));
        self.set_variables(w, job.process_instance_key, variables);
        self.complete_element(w, job.element_instance_key)
    }

    pub fn complete_user_task(&self, w: &mut Writers, user_task_key: Key) -> Result<()> {
        let task = w
            .state()
            .user_tasks
            .get(&user_task_key)
            .cloned()
            .ok_or_else(|| anyhow!("No user task found with key {}", user_task_key))?;
        w.append_event(user_task_key, UserTaskIntent::Completed, RecordValue::UserTask(task.clone()));
        self.complete_element(w, task.element_instance_key)
    }

    // --- catch events ---

    fn subscribe_to_events(&self, w: &mut Writers, owner_key: Key, events: &[&ExecutableElement]) -> Result<()> {
        let owner = w
            .state()
            .instance(owner_key)
            .map(|i| i.record.clone())
            .ok_or_else(|| anyhow!("No element instance found with key {}", owner_key))?;

        for event in events {
            match event.event_type {
                Some(BpmnEventType::Message) => {
                    let Some(message) = event.message() else {
                        continue;
                    };
                    let correlation_key = resolve_correlation_key(w.state(), owner_key, &message.correlation_key)
                        .ok_or_else(|| {
                            anyhow!(
                                "Failed to extract the correlation key for '{}': The value must be either a string or a number, but was missing",
                                message.correlation_key
                            )
                        })?;
                    write_message_subscription(w, owner_key, &owner, &event.id, &message.name, &correlation_key, event.interrupting);
                }
                Some(BpmnEventType::Timer) => {
                    if let Some(timer) = event.timer {
                        let due_date = due_date_after(self.now, timer.interval)
                            .ok_or_else(|| anyhow!("Due date of timer '{}' is out of range", event.id))?;
                        write_timer(w, owner_key, &owner, &event.id, due_date, timer.repetitions);
                    }
                }
                Some(BpmnEventType::Signal) => {
                    if let Some(signal_name) = event.signal_name() {
                        write_signal_subscription(w, owner_key, &owner, &event.id, signal_name);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn unsubscribe(&self, w: &mut Writers, element_instance_key: Key) {
        for subscription_key in w.state().message_subscriptions_of(element_instance_key) {
            if let Some(subscription) = w.state().process_message_subscriptions.get(&subscription_key).cloned() {
                let message_side = message_subscription_value(&subscription);
                w.append_event(subscription_key, ProcessMessageSubscriptionIntent::Deleted, RecordValue::ProcessMessageSubscription(subscription));
                w.append_post_commit_command(subscription_key, MessageSubscriptionIntent::Delete, RecordValue::MessageSubscription(message_side));
            }
        }
        for timer_key in w.state().timers_of(element_instance_key) {
            if let Some(timer) = w.state().timers.get(&timer_key).cloned() {
                w.append_event(timer_key, TimerIntent::Canceled, RecordValue::Timer(timer));
            }
        }
        for subscription_key in w.state().signal_subscriptions_of(element_instance_key) {
            if let Some(subscription) = w.state().signal_subscriptions.get(&subscription_key).cloned() {
                w.append_event(subscription_key, SignalSubscriptionIntent::Deleted, RecordValue::SignalSubscription(subscription));
            }
        }
    }

    /// Continues the instance after the catch event `catch_event_id` owned by `owner_key` occurred
    pub fn trigger_catch_event(&self, w: &mut Writers, owner_key: Key, catch_event_id: &str, variables: &Map<String, Value>) -> Result<()> {
        let owner = w
            .state()
            .instance(owner_key)
            .cloned()
            .ok_or_else(|| anyhow!("No element instance found with key {}", owner_key))?;
        let process = self.process_of(w.state(), owner_key)?;
        let catch_event = process
            .process
            .element(catch_event_id)
            .ok_or_else(|| anyhow!("Catch event '{}' not found in process '{}'", catch_event_id, process.bpmn_process_id))?;

        self.set_variables(w, owner.record.process_instance_key, variables);
        debug!(element_instance_key = owner_key, catch_event_id, "Triggering catch event");

        match catch_event.element_type {
            BpmnElementType::BoundaryEvent => {
                let flow_scope_key = owner
                    .parent_key
                    .ok_or_else(|| anyhow!("Boundary event '{}' has no flow scope instance", catch_event_id))?;
                if catch_event.interrupting {
                    self.terminate_element(w, owner_key)?;
                }
                self.activate(w, flow_scope_key, catch_event_id, Activation::Triggered)?;
            }
            BpmnElementType::IntermediateCatchEvent | BpmnElementType::ReceiveTask
                if owner.record.element_id == catch_event_id =>
            {
                self.complete_element(w, owner_key)?;
            }
            BpmnElementType::IntermediateCatchEvent => {
                // owner is the event-based gateway in front of the event
                let flow_scope_key = owner
                    .parent_key
                    .ok_or_else(|| anyhow!("Event-based gateway '{}' has no flow scope instance", owner.record.element_id))?;
                self.complete(w, owner_key, false)?;
                self.activate(w, flow_scope_key, catch_event_id, Activation::Triggered)?;
            }
            BpmnElementType::StartEvent => {
                let event_sub_process_id = catch_event
                    .flow_scope
                    .clone()
                    .ok_or_else(|| anyhow!("Start event '{}' has no event sub-process", catch_event_id))?;
                if catch_event.interrupting {
                    if let Some(scope) = w.state_mut().instance_mut(owner_key) {
                        scope.interrupted = true;
                    }
                    self.unsubscribe(w, owner_key);
                    for child in w.state().child_keys(owner_key).into_iter().rev() {
                        self.terminate_element(w, child)?;
                    }
                }
                let sub_process_key = self.activate(w, owner_key, &event_sub_process_id, Activation::ScopeOnly)?;
                self.activate(w, sub_process_key, catch_event_id, Activation::Triggered)?;
            }
            other => bail!("Element '{}' of type {} cannot be triggered", catch_event_id, other),
        }
        Ok(())
    }

    pub fn publish_message(&self, w: &mut Writers, message: MessageRecord) -> Result<Key> {
        let message_key = w.next_key();
        w.append_event(message_key, MessageIntent::Published, RecordValue::Message(message.clone()));

        let waiting: Vec<(Key, MessageSubscriptionRecord)> = w
            .state()
            .message_subscriptions
            .iter()
            .filter(|(_, s)| {
                s.message_name == message.name
                    && s.correlation_key == message.correlation_key
                    && s.tenant_id == message.tenant_id
            })
            .map(|(key, s)| (*key, s.clone()))
            .collect();

        let mut correlated_instances = BTreeSet::new();
        for (subscription_key, subscription) in waiting {
            if correlated_instances.contains(&subscription.process_instance_key) {
                continue;
            }
            let Some(process_subscription) = w.state().process_message_subscriptions.get(&subscription_key).cloned() else {
                continue;
            };
            correlated_instances.insert(subscription.process_instance_key);
            w.append_event(
                subscription_key,
                ProcessMessageSubscriptionIntent::Correlated,
                RecordValue::ProcessMessageSubscription(process_subscription.clone()),
            );
            self.trigger_catch_event(
                w,
                process_subscription.element_instance_key,
                &process_subscription.element_id,
                &message.variables,
            )?;
        }

        for process in self.catalog.latest_versions() {
            if process.tenant_id != message.tenant_id {
                continue;
            }
            let start_event = process
                .process
                .message_start_events()
                .into_iter()
                .find(|s| s.message().is_some_and(|m| m.name == message.name))
                .map(|s| s.id.clone());
            let Some(start_event_id) = start_event else {
                continue;
            };
            if !message.correlation_key.is_empty()
                && w.state().messages.exist_active_process_instance(
                    &message.tenant_id,
                    &process.bpmn_process_id,
                    &message.correlation_key,
                )
            {
                debug!(bpmn_process_id = %process.bpmn_process_id, correlation_key = %message.correlation_key, "Message start is reserved, message stays buffered");
                continue;
            }
            self.start_by_message(w, &process, &start_event_id, message_key, &message)?;
        }
        Ok(message_key)
    }

    pub fn broadcast_signal(&self, w: &mut Writers, signal: SignalRecord) -> Result<Key> {
        let signal_key = w.next_key();
        w.append_event(signal_key, SignalIntent::Broadcasted, RecordValue::Signal(signal.clone()));

        let subscriptions: Vec<(Key, SignalSubscriptionRecord)> = w
            .state()
            .signal_subscriptions
            .iter()
            .filter(|(_, s)| s.signal_name == signal.signal_name && s.tenant_id == signal.tenant_id)
            .map(|(key, s)| (*key, s.clone()))
            .collect();
        for (subscription_key, subscription) in subscriptions {
            // an earlier trigger may have closed the subscription
            if !w.state().signal_subscriptions.contains_key(&subscription_key) {
                continue;
            }
            self.trigger_catch_event(w, subscription.catch_event_instance_key, &subscription.catch_event_id, &signal.variables)?;
        }
        Ok(signal_key)
    }

    pub fn trigger_timer(&self, w: &mut Writers, timer_key: Key) -> Result<()> {
        let timer = w
            .state()
            .timers
            .get(&timer_key)
            .cloned()
            .ok_or_else(|| anyhow!("No timer found with key {}", timer_key))?;
        w.append_event(timer_key, TimerIntent::Triggered, RecordValue::Timer(timer.clone()));

        let process = self.process_of(w.state(), timer.element_instance_key)?;
        let cycle = process
            .process
            .element(&timer.target_element_id)
            .filter(|e| !e.interrupting && (timer.repetitions > 1 || timer.repetitions < 0))
            .and_then(|e| e.timer);
        let owner = w
            .state()
            .instance(timer.element_instance_key)
            .map(|i| i.record.clone());
        if let (Some(spec), Some(owner)) = (cycle, owner) {
            let repetitions = if timer.repetitions > 0 { timer.repetitions - 1 } else { -1 };
            let due_date = due_date_after(timer.due_date, spec.interval)
                .ok_or_else(|| anyhow!("Due date of timer '{}' is out of range", timer.target_element_id))?;
            write_timer(w, timer.element_instance_key, &owner, &timer.target_element_id, due_date, repetitions);
        }
        self.trigger_catch_event(w, timer.element_instance_key, &timer.target_element_id, &Map::new())
    }

    pub fn expire_messages(&self, w: &mut Writers) {
        for message_key in w.state().messages.expired(self.now) {
            if let Some(message) = w.state().messages.message(message_key).cloned() {
                w.append_event(message_key, MessageIntent::Expired, RecordValue::Message(message));
            }
        }
    }
}

// --- record helpers shared with the migration reconciler ---

pub fn write_message_subscription(
    w: &mut Writers,
    element_instance_key: Key,
    owner: &ProcessInstanceRecord,
    catch_event_id: &str,
    message_name: &str,
    correlation_key: &str,
    interrupting: bool,
) -> Key {
    let subscription_key = w.next_key();
    let subscription = ProcessMessageSubscriptionRecord {
        subscription_key,
        process_instance_key: owner.process_instance_key,
        element_instance_key,
        element_id: catch_event_id.to_string(),
        process_definition_key: owner.process_definition_key,
        bpmn_process_id: owner.bpmn_process_id.clone(),
        message_name: message_name.to_string(),
        correlation_key: correlation_key.to_string(),
        interrupting,
        tenant_id: owner.tenant_id.clone(),
    };
    let message_side = message_subscription_value(&subscription);
    w.append_event(subscription_key, ProcessMessageSubscriptionIntent::Created, RecordValue::ProcessMessageSubscription(subscription));
    w.append_post_commit_command(subscription_key, MessageSubscriptionIntent::Create, RecordValue::MessageSubscription(message_side));
    subscription_key
}

/// `now + interval` in epoch millis, `None` past the representable range
pub fn due_date_after(now: i64, interval: TimeDelta) -> Option<i64> {
    now.checked_add(interval.num_milliseconds())
}

pub fn write_timer(
    w: &mut Writers,
    element_instance_key: Key,
    owner: &ProcessInstanceRecord,
    catch_event_id: &str,
    due_date: i64,
    repetitions: i32,
) -> Key {
    let timer_key = w.next_key();
    w.append_event(
        timer_key,
        TimerIntent::Created,
        RecordValue::Timer(TimerRecord {
            element_instance_key,
            process_instance_key: owner.process_instance_key,
            process_definition_key: owner.process_definition_key,
            target_element_id: catch_event_id.to_string(),
            due_date,
            repetitions,
            tenant_id: owner.tenant_id.clone(),
        }),
    );
    timer_key
}

pub fn write_signal_subscription(
    w: &mut Writers,
    element_instance_key: Key,
    owner: &ProcessInstanceRecord,
    catch_event_id: &str,
    signal_name: &str,
) -> Key {
    let subscription_key = w.next_key();
    w.append_event(
        subscription_key,
        SignalSubscriptionIntent::Created,
        RecordValue::SignalSubscription(SignalSubscriptionRecord {
            signal_name: signal_name.to_string(),
            catch_event_id: catch_event_id.to_string(),
            catch_event_instance_key: element_instance_key,
            process_definition_key: owner.process_definition_key,
            bpmn_process_id: owner.bpmn_process_id.clone(),
            tenant_id: owner.tenant_id.clone(),
        }),
    );
    subscription_key
}

pub fn message_subscription_value(subscription: &ProcessMessageSubscriptionRecord) -> MessageSubscriptionRecord {
    MessageSubscriptionRecord {
        process_instance_key: subscription.process_instance_key,
        element_instance_key: subscription.element_instance_key,
        bpmn_process_id: subscription.bpmn_process_id.clone(),
        message_name: subscription.message_name.clone(),
        correlation_key: subscription.correlation_key.clone(),
        interrupting: subscription.interrupting,
        tenant_id: subscription.tenant_id.clone(),
    }
}

pub fn set_variable(w: &mut Writers, scope_key: Key, name: &str, value: Value) {
    let Some(scope) = w.state().instance(scope_key).map(|i| i.record.clone()) else {
        return;
    };
    let existing = w.state().variable_local(scope_key, name).map(|(key, _)| key);
    let record = VariableRecord {
        name: name.to_string(),
        value,
        scope_key,
        process_instance_key: scope.process_instance_key,
        process_definition_key: scope.process_definition_key,
        bpmn_process_id: scope.bpmn_process_id.clone(),
        tenant_id: scope.tenant_id.clone(),
    };
    match existing {
        Some(variable_key) => w.append_event(variable_key, VariableIntent::Updated, RecordValue::Variable(record)),
        None => {
            let variable_key = w.next_key();
            w.append_event(variable_key, VariableIntent::Created, RecordValue::Variable(record));
        }
    }
}

/// Variables visible from the scope, inner scopes shadowing outer ones
pub fn visible_variables(state: &ProcessingState, scope_key: Key) -> Map<String, Value> {
    let mut scopes = Vec::new();
    let mut current = Some(scope_key);
    while let Some(key) = current {
        scopes.push(key);
        current = state.instance(key).and_then(|i| i.parent_key);
    }
    let mut variables = Map::new();
    for key in scopes.into_iter().rev() {
        for (_, variable) in state.variables_local(key) {
            variables.insert(variable.name.clone(), variable.value.clone());
        }
    }
    variables
}

/// Correlation keys are taken verbatim from a string or number variable
pub fn resolve_correlation_key(state: &ProcessingState, scope_key: Key, variable_name: &str) -> Option<String> {
    match state.variable(scope_key, variable_name)? {
        Value::String(value) => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}
