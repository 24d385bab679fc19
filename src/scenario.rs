//! YAML migration scenarios: deploy definitions, drive one instance into a runtime state, then
//! migrate it.
//!
//! ```yaml
//! processes:
//!   - id: source
//!     elements: [...]
//!     flows: [...]
//! instance:
//!   process_id: source
//!   variables: { orderId: "o-1" }
//! steps:
//!   - complete_job: { element: A }
//! migrate:
//!   target: target
//!   mappings:
//!     - { source: B, target: B2 }
//! ```

use std::fs;
use std::path::Path;
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Serialize, Deserialize};
use serde_json::Value;
use tracing::info;
use crate::Key;
use crate::dsl::ProcessModel;
use crate::migration::{MigrationCommand, MigrationError, MigrationPlan, Rejection};
use crate::runtime::Engine;
use crate::runtime::records::{DEFAULT_TENANT, Record, RejectionType};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    /// Engine clock at the start of the scenario. Defaults to the current time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock: Option<DateTime<Utc>>,
    #[serde(default = "default_tenant")]
    pub tenant: String,
    /// Deployed in order; a later model with the same id becomes a new version
    pub processes: Vec<ProcessModel>,
    pub instance: InstanceStart,
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub steps: Vec<Step>,
    pub migrate: MigrateSection,
    /// Driven after a successful migration
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub after: Vec<Step>,
}

fn default_tenant() -> String {
    DEFAULT_TENANT.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceStart {
    pub process_id: String,
    #[serde(default)]
    pub variables: Value,
    /// Elements to start at instead of the none start event
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub start_at: Vec<String>,
}

/// One interaction with the running instance. Elements are addressed by id and written as a
/// single-key map, `- complete_job: { element: A }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    CompleteJob {
        element: String,
        #[serde(default)]
        variables: Value,
    },
    FailJob {
        element: String,
        #[serde(default)]
        message: String,
    },
    CompleteUserTask {
        element: String,
    },
    ActivateAdHoc {
        ad_hoc: String,
        elements: Vec<String>,
    },
    SetVariables {
        #[serde(default)]
        element: Option<String>,
        variables: Value,
    },
    BroadcastSignal {
        name: String,
        #[serde(default)]
        variables: Value,
    },
    PublishMessage {
        name: String,
        correlation_key: String,
        #[serde(default)]
        ttl_seconds: i64,
        #[serde(default)]
        variables: Value,
    },
    AdvanceClock {
        seconds: i64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrateSection {
    /// bpmn process id of the target; its latest version is used
    pub target: String,
    #[serde(default)]
    pub mappings: Vec<Mapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mapping {
    pub source: String,
    pub target: String,
}

/// Result of running a scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub process_instance_key: Key,
    pub migrated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_type: Option<RejectionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Whether the instance is still running at the end
    pub active: bool,
    pub records: Vec<Record>,
}

impl Scenario {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to deserialize scenario")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid scenario in {}", path.display()))
    }

    /// Deploys the models and drives the instance up to the migration
    pub fn prepare(&self) -> Result<(Engine, Key, MigrationCommand)> {
        let mut engine = match self.clock {
            Some(clock) => Engine::with_clock(clock),
            None => Engine::new(),
        };
        for model in &self.processes {
            engine.deploy_for_tenant(model.clone(), &self.tenant)?;
        }

        let process_instance_key = engine.create_process_instance_for_tenant(
            &self.tenant,
            &self.instance.process_id,
            self.instance.variables.clone(),
            &self.instance.start_at,
        )?;
        info!(process_instance_key, process_id = %self.instance.process_id, "Started scenario instance");
        for step in &self.steps {
            apply_step(&mut engine, process_instance_key, step)?;
        }

        let target = engine
            .catalog()
            .latest(&self.migrate.target, &self.tenant)
            .ok_or_else(|| anyhow!("Target process '{}' is not deployed", self.migrate.target))?;
        let command = self
            .migrate
            .mappings
            .iter()
            .fold(MigrationCommand::new(process_instance_key, target.key), |command, m| {
                command.map(&m.source, &m.target)
            });
        Ok((engine, process_instance_key, command))
    }

    pub fn run(&self) -> Result<ScenarioReport> {
        let (mut engine, process_instance_key, command) = self.prepare()?;
        let outcome = engine.migrate(command);

        let (rejection_type, reason) = match &outcome {
            Ok(()) => {
                for step in &self.after {
                    apply_step(&mut engine, process_instance_key, step)?;
                }
                (None, None)
            }
            Err(MigrationError::Rejected(rejection)) => {
                (Some(rejection.rejection_type), Some(rejection.reason.clone()))
            }
            Err(e @ MigrationError::SafetyCheckFailed(_)) => {
                (Some(RejectionType::ProcessingError), Some(e.to_string()))
            }
        };

        Ok(ScenarioReport {
            process_instance_key,
            migrated: outcome.is_ok(),
            rejection_type,
            reason,
            active: engine.is_active(process_instance_key),
            records: engine.records().all().to_vec(),
        })
    }

    /// Dry run: validates the migration against the prepared instance
    pub fn validate(&self) -> Result<Result<MigrationPlan, Rejection>> {
        let (engine, _, command) = self.prepare()?;
        Ok(engine.validate_migration(&command))
    }
}

fn apply_step(engine: &mut Engine, process_instance_key: Key, step: &Step) -> Result<()> {
    match step {
        Step::CompleteJob { element, variables } => {
            let job_key = engine
                .job_key(process_instance_key, element)
                .ok_or_else(|| anyhow!("No job for element '{}'", element))?;
            engine.complete_job(job_key, variables.clone())
        }
        Step::FailJob { element, message } => {
            let job_key = engine
                .job_key(process_instance_key, element)
                .ok_or_else(|| anyhow!("No job for element '{}'", element))?;
            engine.fail_job(job_key, message).map(|_| ())
        }
        Step::CompleteUserTask { element } => {
            let user_task_key = engine
                .state()
                .find_instance(process_instance_key, element)
                .and_then(|i| i.user_task_key)
                .ok_or_else(|| anyhow!("No user task for element '{}'", element))?;
            engine.complete_user_task(user_task_key)
        }
        Step::ActivateAdHoc { ad_hoc, elements } => {
            let ad_hoc_key = engine
                .element_instance_key(process_instance_key, ad_hoc)
                .ok_or_else(|| anyhow!("Ad-hoc sub-process '{}' is not active", ad_hoc))?;
            let elements: Vec<&str> = elements.iter().map(String::as_str).collect();
            engine.activate_ad_hoc_elements(ad_hoc_key, &elements)
        }
        Step::SetVariables { element, variables } => {
            let scope_key = match element {
                Some(element) => engine
                    .element_instance_key(process_instance_key, element)
                    .ok_or_else(|| anyhow!("Element '{}' is not active", element))?,
                None => process_instance_key,
            };
            engine.set_variables(scope_key, variables.clone())
        }
        Step::BroadcastSignal { name, variables } => engine.broadcast_signal(name, variables.clone()).map(|_| ()),
        Step::PublishMessage { name, correlation_key, ttl_seconds, variables } => engine
            .publish_message(name, correlation_key, TimeDelta::seconds(*ttl_seconds), variables.clone())
            .map(|_| ()),
        Step::AdvanceClock { seconds } => engine.advance_clock(TimeDelta::seconds(*seconds)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
processes:
  - id: source
    elements:
      - { id: start, type: StartEvent }
      - { id: A, type: ServiceTask, job_type: a }
      - { id: end, type: EndEvent }
    flows:
      - { source: start, target: A }
      - { source: A, target: end }
  - id: target
    elements:
      - { id: start, type: StartEvent }
      - { id: B, type: ServiceTask, job_type: b }
      - { id: end, type: EndEvent }
    flows:
      - { source: start, target: B }
      - { source: B, target: end }
instance:
  process_id: source
migrate:
  target: target
  mappings:
    - { source: A, target: B }
after:
  - complete_job: { element: B }
"#;

    #[test]
    fn parses_steps_and_mappings() {
        let scenario = Scenario::from_yaml(SCENARIO).unwrap();
        assert_eq!(scenario.processes.len(), 2);
        assert_eq!(scenario.tenant, DEFAULT_TENANT);
        assert_eq!(scenario.migrate.mappings[0].target, "B");
        assert_eq!(scenario.after, vec![Step::CompleteJob { element: "B".into(), variables: Value::Null }]);
    }

    #[test]
    fn runs_migration_and_completes_instance() {
        let report = Scenario::from_yaml(SCENARIO).unwrap().run().unwrap();
        assert!(report.migrated);
        assert!(report.rejection_type.is_none());
        assert!(!report.active);
    }

    #[test]
    fn validate_reports_rejection_without_writing() {
        let mut scenario = Scenario::from_yaml(SCENARIO).unwrap();
        scenario.migrate.mappings.clear();
        let rejection = scenario.validate().unwrap().unwrap_err();
        assert_eq!(rejection.rejection_type, RejectionType::InvalidState);
        assert!(rejection.reason.contains("'A'"));
    }
}
