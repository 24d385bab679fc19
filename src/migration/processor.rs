use tracing::{error, info, warn};
use crate::Key;
use crate::migration::executor;
use crate::migration::instructions::MigrationCommand;
use crate::migration::preconditions::{
    self as reason, Authorization, AuthorizationRequest, Authorizer, MigrationError,
    PERMISSION_UPDATE_PROCESS_INSTANCE, RESOURCE_PROCESS_DEFINITION, Rejection,
};
use crate::migration::reconciler;
use crate::migration::validator::MigrationValidator;
use crate::runtime::catalog::ProcessCatalog;
use crate::runtime::definition::BpmnElementType;
use crate::runtime::records::{
    DEFAULT_TENANT, NO_KEY, ProcessInstanceMigrationIntent, ProcessInstanceMigrationRecord, Record,
    RecordValue, RejectionType,
};
use crate::runtime::state::ProcessingState;
use crate::runtime::writer::{self, Writers};

/// Records produced by one migrate command
pub struct ProcessingResult {
    /// Written to the log in one batch
    pub batch: Vec<Record>,
    /// Processed after the batch is committed
    pub post_commit: Vec<Record>,
    pub outcome: Result<(), MigrationError>,
}

/// Processes the migrate command as one unit of work: either every record of the migration is
/// written and the state replaced, or only a rejection is written and the state is untouched.
pub struct MigrateProcessor<'a> {
    catalog: &'a ProcessCatalog,
    authorizer: &'a dyn Authorizer,
    now: i64,
}

impl<'a> MigrateProcessor<'a> {
    pub fn new(catalog: &'a ProcessCatalog, authorizer: &'a dyn Authorizer, now: i64) -> Self {
        Self { catalog, authorizer, now }
    }

    pub fn process(&self, state: &mut ProcessingState, command: &MigrationCommand) -> ProcessingResult {
        let key = command.process_instance_key;
        let Some(instance) = state
            .instance(key)
            .filter(|i| i.record.bpmn_element_type == BpmnElementType::Process)
        else {
            return self.reject(command, NO_KEY, DEFAULT_TENANT, reason::instance_not_found(key));
        };
        let tenant_id = instance.record.tenant_id.clone();
        let root_process_instance_key = state.root_process_instance_key(key);

        let request = AuthorizationRequest {
            resource_type: RESOURCE_PROCESS_DEFINITION,
            permission: PERMISSION_UPDATE_PROCESS_INSTANCE,
            resource_id: &instance.record.bpmn_process_id,
            tenant_id: &tenant_id,
        };
        match self.authorizer.authorize(&request) {
            Authorization::Granted => {}
            Authorization::Forbidden => {
                let forbidden = reason::forbidden(&request);
                return self.reject(command, root_process_instance_key, &tenant_id, forbidden);
            }
            Authorization::TenantNotAssigned => {
                return self.reject(command, NO_KEY, DEFAULT_TENANT, reason::instance_not_found(key));
            }
        }

        let validator = MigrationValidator::new(self.catalog, state, self.now);
        let plan = match validator.validate(command) {
            Ok(plan) => plan,
            Err(rejected) => return self.reject(command, root_process_instance_key, &tenant_id, rejected),
        };

        let value = migration_value(command, root_process_instance_key, &tenant_id);
        let mut staged = state.clone();
        let mut w = Writers::new(&mut staged);
        w.append_command(key, ProcessInstanceMigrationIntent::Migrate, value.clone());
        let executed = executor::execute(&plan, &mut w).map(|deferred| {
            w.append_event(key, ProcessInstanceMigrationIntent::Migrated, value.clone());
            for subscription in &deferred {
                reconciler::create_deferred(&mut w, subscription);
            }
        });
        let (batch, post_commit) = w.finish();

        match executed {
            Ok(()) => {
                *state = staged;
                info!(
                    process_instance_key = key,
                    target_process_definition_key = command.target_process_definition_key,
                    records = batch.len(),
                    "Migrated process instance"
                );
                ProcessingResult {
                    batch,
                    post_commit,
                    outcome: Ok(()),
                }
            }
            Err(e) => {
                // the staged state is dropped, nothing of the migration is written
                error!(process_instance_key = key, error = %e, "Migration aborted");
                let batch = vec![
                    writer::command(key, ProcessInstanceMigrationIntent::Migrate, value.clone()),
                    writer::rejection(key, ProcessInstanceMigrationIntent::Migrate, value, RejectionType::ProcessingError, &e.to_string()),
                ];
                ProcessingResult {
                    batch,
                    post_commit: Vec::new(),
                    outcome: Err(e),
                }
            }
        }
    }

    fn reject(&self, command: &MigrationCommand, root_process_instance_key: Key, tenant_id: &str, rejected: Rejection) -> ProcessingResult {
        warn!(
            process_instance_key = command.process_instance_key,
            root_process_instance_key,
            rejection_type = %rejected.rejection_type,
            reason = %rejected.reason,
            "Rejected migration"
        );
        let value = migration_value(command, root_process_instance_key, tenant_id);
        let key = command.process_instance_key;
        let batch = vec![
            writer::command(key, ProcessInstanceMigrationIntent::Migrate, value.clone()),
            writer::rejection(key, ProcessInstanceMigrationIntent::Migrate, value, rejected.rejection_type, &rejected.reason),
        ];
        ProcessingResult {
            batch,
            post_commit: Vec::new(),
            outcome: Err(MigrationError::Rejected(rejected)),
        }
    }
}

fn migration_value(command: &MigrationCommand, root_process_instance_key: Key, tenant_id: &str) -> RecordValue {
    RecordValue::ProcessInstanceMigration(ProcessInstanceMigrationRecord {
        process_instance_key: command.process_instance_key,
        target_process_definition_key: command.target_process_definition_key,
        mapping_instructions: command.mapping_instructions.iter().map(Into::into).collect(),
        root_process_instance_key,
        tenant_id: tenant_id.to_string(),
    })
}
