use std::collections::VecDeque;
use std::sync::Arc;
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info};
use crate::Key;
use crate::compiler::Compiler;
use crate::dsl::ProcessModel;
use crate::migration::{
    AllowAll, Authorizer, MigrateProcessor, MigrationCommand, MigrationError, MigrationPlan,
    MigrationValidator, Rejection,
};
use crate::runtime::behavior::{BpmnBehavior, StartAt, due_date_after};
use crate::runtime::catalog::{DeployedProcess, ProcessCatalog};
use crate::runtime::records::{
    DEFAULT_TENANT, Intent, MessageRecord, MessageSubscriptionIntent, ProcessIntent,
    ProcessMetadataRecord, Record, RecordLog, RecordValue, SignalRecord,
};
use crate::runtime::state::ProcessingState;
use crate::runtime::writer::Writers;

/// Single-partition engine: one writer, one log.
///
/// Every operation runs as one processing step against a staged copy of the state. The copy
/// replaces the state and the step's records are committed only when the step succeeds.
pub struct Engine {
    // Deployed definitions
    catalog: ProcessCatalog,
    state: ProcessingState,
    log: RecordLog,
    clock: DateTime<Utc>,
    authorizer: Box<dyn Authorizer>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_clock(Utc::now())
    }

    pub fn with_clock(clock: DateTime<Utc>) -> Self {
        Self {
            catalog: ProcessCatalog::new(),
            state: ProcessingState::new(),
            log: RecordLog::new(),
            clock,
            authorizer: Box::new(AllowAll),
        }
    }

    pub fn set_authorizer(&mut self, authorizer: impl Authorizer + 'static) {
        self.authorizer = Box::new(authorizer);
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock
    }

    fn now_millis(&self) -> i64 {
        self.clock.timestamp_millis()
    }

    pub fn catalog(&self) -> &ProcessCatalog {
        &self.catalog
    }

    pub fn state(&self) -> &ProcessingState {
        &self.state
    }

    /// Raw state access, for staging runtime conditions no command produces (e.g. an event
    /// trigger that is still in flight)
    pub fn state_mut(&mut self) -> &mut ProcessingState {
        &mut self.state
    }

    pub fn records(&self) -> &RecordLog {
        &self.log
    }

    // --- deployment ---

    pub fn deploy(&mut self, model: ProcessModel) -> Result<Arc<DeployedProcess>> {
        self.deploy_for_tenant(model, DEFAULT_TENANT)
    }

    pub fn deploy_for_tenant(&mut self, model: ProcessModel, tenant_id: &str) -> Result<Arc<DeployedProcess>> {
        let model_id = model.id.clone();
        let process = Compiler::new()
            .compile(model)
            .with_context(|| format!("Failed to compile process '{}'", model_id))?;

        let key = self.state.next_key();
        let deployed = self.catalog.deploy(key, tenant_id, process);
        let metadata = ProcessMetadataRecord {
            process_definition_key: key,
            bpmn_process_id: deployed.bpmn_process_id.clone(),
            version: deployed.version,
            tenant_id: tenant_id.to_string(),
        };
        self.step(|_, w| {
            w.append_event(key, ProcessIntent::Created, RecordValue::Process(metadata));
            Ok(())
        })?;
        info!(process_definition_key = key, bpmn_process_id = %deployed.bpmn_process_id, version = deployed.version, "Deployed process");
        Ok(deployed)
    }

    // --- instance lifecycle ---

    pub fn create_process_instance(&mut self, bpmn_process_id: &str, variables: Value) -> Result<Key> {
        self.create_process_instance_for_tenant(DEFAULT_TENANT, bpmn_process_id, variables, &[])
    }

    /// Starts the instance at the given elements instead of the none start event
    pub fn create_process_instance_with_start_instructions(
        &mut self,
        bpmn_process_id: &str,
        variables: Value,
        start_elements: &[&str],
    ) -> Result<Key> {
        let start_elements: Vec<String> = start_elements.iter().map(|s| s.to_string()).collect();
        self.create_process_instance_for_tenant(DEFAULT_TENANT, bpmn_process_id, variables, &start_elements)
    }

    pub fn create_process_instance_for_tenant(
        &mut self,
        tenant_id: &str,
        bpmn_process_id: &str,
        variables: Value,
        start_elements: &[String],
    ) -> Result<Key> {
        let process = self
            .catalog
            .latest(bpmn_process_id, tenant_id)
            .ok_or_else(|| anyhow!("No process deployed with id '{}' for tenant '{}'", bpmn_process_id, tenant_id))?;
        let variables = variables_map(variables)?;
        let start = if start_elements.is_empty() {
            StartAt::NoneStartEvent
        } else {
            StartAt::Elements(start_elements)
        };
        self.step(|behavior, w| behavior.create_process_instance(w, &process, &variables, start, None))
    }

    pub fn activate_ad_hoc_elements(&mut self, ad_hoc_key: Key, element_ids: &[&str]) -> Result<()> {
        let element_ids: Vec<String> = element_ids.iter().map(|s| s.to_string()).collect();
        self.step(|behavior, w| behavior.activate_ad_hoc_elements(w, ad_hoc_key, &element_ids))
    }

    pub fn complete_job(&mut self, job_key: Key, variables: Value) -> Result<()> {
        let variables = variables_map(variables)?;
        self.step(|behavior, w| behavior.complete_job(w, job_key, &variables))
    }

    /// Fails the job without retries, which raises an incident. Returns the incident key.
    pub fn fail_job(&mut self, job_key: Key, error_message: &str) -> Result<Key> {
        self.step(|behavior, w| behavior.fail_job(w, job_key, error_message))
    }

    pub fn raise_incident(&mut self, element_instance_key: Key, error_type: &str, error_message: &str) -> Result<Key> {
        self.step(|behavior, w| {
            behavior.create_incident(w, element_instance_key, crate::runtime::records::NO_KEY, error_type, error_message)
        })
    }

    pub fn resolve_incident(&mut self, incident_key: Key) -> Result<()> {
        self.step(|behavior, w| behavior.resolve_incident(w, incident_key))
    }

    pub fn complete_user_task(&mut self, user_task_key: Key) -> Result<()> {
        self.step(|behavior, w| behavior.complete_user_task(w, user_task_key))
    }

    pub fn set_variables(&mut self, scope_key: Key, variables: Value) -> Result<()> {
        let variables = variables_map(variables)?;
        if self.state.instance(scope_key).is_none() {
            return Err(anyhow!("No element instance found with key {}", scope_key));
        }
        self.step(|behavior, w| {
            behavior.set_variables(w, scope_key, &variables);
            Ok(())
        })
    }

    // --- events ---

    pub fn publish_message(&mut self, name: &str, correlation_key: &str, time_to_live: TimeDelta, variables: Value) -> Result<Key> {
        self.publish_message_for_tenant(DEFAULT_TENANT, name, correlation_key, time_to_live, variables)
    }

    pub fn publish_message_for_tenant(
        &mut self,
        tenant_id: &str,
        name: &str,
        correlation_key: &str,
        time_to_live: TimeDelta,
        variables: Value,
    ) -> Result<Key> {
        let deadline = due_date_after(self.now_millis(), time_to_live)
            .ok_or_else(|| anyhow!("Time to live of message '{}' is out of range", name))?;
        let message = MessageRecord {
            name: name.to_string(),
            correlation_key: correlation_key.to_string(),
            time_to_live: time_to_live.num_milliseconds(),
            deadline,
            variables: variables_map(variables)?,
            tenant_id: tenant_id.to_string(),
        };
        self.step(|behavior, w| behavior.publish_message(w, message))
    }

    pub fn broadcast_signal(&mut self, signal_name: &str, variables: Value) -> Result<Key> {
        let signal = SignalRecord {
            signal_name: signal_name.to_string(),
            variables: variables_map(variables)?,
            tenant_id: DEFAULT_TENANT.to_string(),
        };
        self.step(|behavior, w| behavior.broadcast_signal(w, signal))
    }

    /// Moves the clock forward, triggering due timers in due-date order and expiring buffered
    /// messages
    pub fn advance_clock(&mut self, duration: TimeDelta) -> Result<()> {
        self.clock = self
            .clock
            .checked_add_signed(duration)
            .ok_or_else(|| anyhow!("Cannot advance the clock by {}", duration))?;
        let now = self.now_millis();
        loop {
            let due = self
                .state
                .timers
                .iter()
                .filter(|(_, timer)| timer.due_date <= now)
                .min_by_key(|(key, timer)| (timer.due_date, **key))
                .map(|(key, _)| *key);
            let Some(timer_key) = due else {
                break;
            };
            debug!(timer_key, "Triggering due timer");
            self.step(|behavior, w| behavior.trigger_timer(w, timer_key))?;
        }
        if !self.state.messages.expired(now).is_empty() {
            self.step(|behavior, w| {
                behavior.expire_messages(w);
                Ok(())
            })?;
        }
        Ok(())
    }

    // --- migration ---

    pub fn migrate(&mut self, command: MigrationCommand) -> Result<(), MigrationError> {
        let now = self.now_millis();
        let processor = MigrateProcessor::new(&self.catalog, self.authorizer.as_ref(), now);
        let result = processor.process(&mut self.state, &command);
        self.log.append_batch(result.batch);
        self.process_post_commit(result.post_commit);
        result.outcome
    }

    /// Validates the command against the current state without writing anything
    pub fn validate_migration(&self, command: &MigrationCommand) -> Result<MigrationPlan, Rejection> {
        MigrationValidator::new(&self.catalog, &self.state, self.now_millis()).validate(command)
    }

    // --- queries ---

    /// Key of the first live instance of the element in the process instance
    pub fn element_instance_key(&self, process_instance_key: Key, element_id: &str) -> Option<Key> {
        self.state
            .find_instance(process_instance_key, element_id)
            .map(|i| i.key)
    }

    pub fn job_key(&self, process_instance_key: Key, element_id: &str) -> Option<Key> {
        self.state
            .find_instance(process_instance_key, element_id)
            .and_then(|i| i.job_key)
    }

    pub fn is_active(&self, process_instance_key: Key) -> bool {
        self.state.instance(process_instance_key).is_some()
    }

    // --- processing ---

    fn step<T>(&mut self, run: impl FnOnce(&BpmnBehavior, &mut Writers) -> Result<T>) -> Result<T> {
        let mut staged = self.state.clone();
        let behavior = BpmnBehavior::new(&self.catalog, self.now_millis());
        let mut w = Writers::new(&mut staged);
        let value = run(&behavior, &mut w)?;
        let (batch, post_commit) = w.finish();

        self.state = staged;
        self.log.append_batch(batch);
        self.process_post_commit(post_commit);
        Ok(value)
    }

    /// Message-side subscription commands, each processed in its own batch
    fn process_post_commit(&mut self, commands: Vec<Record>) {
        let mut queue: VecDeque<Record> = commands.into();
        while let Some(command) = queue.pop_front() {
            let (Intent::MessageSubscription(intent), RecordValue::MessageSubscription(_)) = (command.intent, &command.value) else {
                continue;
            };
            let exists = self.state.message_subscriptions.contains_key(&command.key);
            let event = match intent {
                MessageSubscriptionIntent::Create => Some(MessageSubscriptionIntent::Created),
                MessageSubscriptionIntent::Migrate if exists => Some(MessageSubscriptionIntent::Migrated),
                MessageSubscriptionIntent::Delete if exists => Some(MessageSubscriptionIntent::Deleted),
                _ => None,
            };

            let mut w = Writers::new(&mut self.state);
            w.append_command(command.key, intent, command.value.clone());
            match event {
                Some(event) => w.append_event(command.key, event, command.value),
                None => debug!(subscription_key = command.key, ?intent, "Message subscription is gone, command ignored"),
            }
            let (batch, _) = w.finish();
            self.log.append_batch(batch);
        }
    }
}

fn variables_map(variables: Value) -> Result<Map<String, Value>> {
    match variables {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(anyhow!("Variables must be a JSON object, got {}", other)),
    }
}
