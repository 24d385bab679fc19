//! Rejections of the migrate command and the reasons they carry.
//!
//! Every reason names the process instance and the offending ids so a client can correct the
//! mapping instructions and retry.

use thiserror::Error;
use crate::Key;
use crate::runtime::records::RejectionType;

pub const RESOURCE_PROCESS_DEFINITION: &str = "PROCESS_DEFINITION";
pub const PERMISSION_UPDATE_PROCESS_INSTANCE: &str = "UPDATE_PROCESS_INSTANCE";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{rejection_type}: {reason}")]
pub struct Rejection {
    pub rejection_type: RejectionType,
    pub reason: String,
}

impl Rejection {
    pub fn new(rejection_type: RejectionType, reason: String) -> Self {
        Self { rejection_type, reason }
    }

    fn not_found(reason: String) -> Self {
        Self::new(RejectionType::NotFound, reason)
    }

    fn invalid_argument(reason: String) -> Self {
        Self::new(RejectionType::InvalidArgument, reason)
    }

    fn invalid_state(reason: String) -> Self {
        Self::new(RejectionType::InvalidState, reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    #[error("Migration rejected: {0}")]
    Rejected(Rejection),
    /// An entity vanished between validation and execution. Nothing was applied.
    #[error("{0}")]
    SafetyCheckFailed(String),
}

impl From<Rejection> for MigrationError {
    fn from(rejection: Rejection) -> Self {
        MigrationError::Rejected(rejection)
    }
}

impl MigrationError {
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            MigrationError::Rejected(rejection) => Some(rejection),
            MigrationError::SafetyCheckFailed(_) => None,
        }
    }
}

// --- authorization ---

pub struct AuthorizationRequest<'a> {
    pub resource_type: &'static str,
    pub permission: &'static str,
    pub resource_id: &'a str,
    pub tenant_id: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Granted,
    Forbidden,
    /// The caller has no access to the tenant; answered as if the instance did not exist
    TenantNotAssigned,
}

pub trait Authorizer {
    fn authorize(&self, request: &AuthorizationRequest) -> Authorization;
}

/// Grants every request
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _request: &AuthorizationRequest) -> Authorization {
        Authorization::Granted
    }
}

// --- reasons ---

pub fn instance_not_found(process_instance_key: Key) -> Rejection {
    Rejection::not_found(format!(
        "Expected to migrate process instance but no process instance found with key '{}'",
        process_instance_key
    ))
}

pub fn forbidden(request: &AuthorizationRequest) -> Rejection {
    Rejection::new(
        RejectionType::Forbidden,
        format!(
            "Insufficient permissions to perform operation '{}' on resource '{}', required resource identifiers are one of '[*, {}]'",
            request.permission, request.resource_type, request.resource_id
        ),
    )
}

pub fn source_definition_not_found(process_instance_key: Key, process_definition_key: Key) -> Rejection {
    Rejection::not_found(format!(
        "Expected to migrate process instance '{}' but no process definition found with key '{}' for the process instance",
        process_instance_key, process_definition_key
    ))
}

pub fn target_not_found(target_process_definition_key: Key) -> Rejection {
    Rejection::not_found(format!(
        "Expected to migrate process instance to process definition but no process definition found with key '{}'",
        target_process_definition_key
    ))
}

pub fn unknown_source_element(process_instance_key: Key, element_id: &str) -> Rejection {
    Rejection::invalid_argument(format!(
        "Expected to migrate process instance '{}' but mapping instructions contain a non-existing source element id '{}'. \
         Elements provided in mapping instructions must exist in the source process definition.",
        process_instance_key, element_id
    ))
}

pub fn unknown_target_element(process_instance_key: Key, element_id: &str) -> Rejection {
    Rejection::invalid_argument(format!(
        "Expected to migrate process instance '{}' but mapping instructions contain a non-existing target element id '{}'. \
         Elements provided in mapping instructions must exist in the target process definition.",
        process_instance_key, element_id
    ))
}

pub fn duplicate_source_ids(process_instance_key: Key, element_ids: &[String]) -> Rejection {
    Rejection::invalid_argument(format!(
        "Expected to migrate process instance '{}' but the mapping instructions contain duplicate source element ids '{}'.",
        process_instance_key,
        element_ids.join(", ")
    ))
}

pub fn active_message_start_instance(
    process_instance_key: Key,
    target_bpmn_process_id: &str,
    correlation_key: &str,
) -> Rejection {
    Rejection::invalid_state(format!(
        "Expected to migrate process instance '{}' but target process definition '{}' has an active instance triggered by a message start event \
         with correlation key '{}'. Only one instance per correlation key is allowed for message start events.",
        process_instance_key, target_bpmn_process_id, correlation_key
    ))
}

pub fn catch_event_kind_changed(
    process_instance_key: Key,
    source_element_id: &str,
    source_kind: &str,
    target_element_id: &str,
    target_kind: &str,
) -> Rejection {
    Rejection::invalid_argument(format!(
        "Expected to migrate process instance '{}' but mapping instructions map catch event with id '{}' of kind '{}' \
         to element with id '{}' of kind '{}'. Catch events must be mapped to catch events of the same element type and event type.",
        process_instance_key, source_element_id, source_kind, target_element_id, target_kind
    ))
}

pub fn unsupported_element_type(process_instance_key: Key, element_id: &str, element_type: &str) -> Rejection {
    Rejection::invalid_state(format!(
        "Expected to migrate process instance '{}' but active element with id '{}' has an unsupported type. \
         The migration of a {} is not supported.",
        process_instance_key, element_id, element_type
    ))
}

pub fn unsupported_intermediate_catch_event(process_instance_key: Key, element_id: &str, event_type: &str) -> Rejection {
    Rejection::invalid_state(format!(
        "Expected to migrate process instance '{}' but active element with id '{}' is intermediate catch event of type '{}'. \
         Migrating active intermediate catch event of this type is not possible yet.",
        process_instance_key, element_id, event_type
    ))
}

pub fn catch_event_after_event_based_gateway(process_instance_key: Key, element_id: &str) -> Rejection {
    Rejection::invalid_state(format!(
        "Expected to migrate process instance '{}' but active element with id '{}' is an intermediate catch event attached to an event-based gateway. \
         Migrating active events attached to an event-based gateway is not possible yet.",
        process_instance_key, element_id
    ))
}

pub fn unmapped_element(process_instance_key: Key, element_id: &str) -> Rejection {
    Rejection::invalid_state(format!(
        "Expected to migrate process instance '{}' but no mapping instruction defined for active element with id '{}'. \
         Elements cannot be migrated without a mapping.",
        process_instance_key, element_id
    ))
}

pub fn element_type_changed(
    process_instance_key: Key,
    element_id: &str,
    element_type: &str,
    target_element_id: &str,
    target_element_type: &str,
) -> Rejection {
    Rejection::invalid_state(format!(
        "Expected to migrate process instance '{}' but active element with id '{}' and type '{}' is mapped to an element with id '{}' \
         and different type '{}'. Elements must be mapped to elements of the same type.",
        process_instance_key, element_id, element_type, target_element_id, target_element_type
    ))
}

pub fn user_task_implementation_changed(
    process_instance_key: Key,
    element_id: &str,
    implementation: &str,
    target_element_id: &str,
    target_implementation: &str,
) -> Rejection {
    Rejection::invalid_state(format!(
        "Expected to migrate process instance '{}' but active user task with id '{}' and implementation '{}' is mapped to an user task \
         with id '{}' and different implementation '{}'. Elements must be mapped to elements of the same implementation.",
        process_instance_key, element_id, implementation, target_element_id, target_implementation
    ))
}

pub fn flow_scope_changed(process_instance_key: Key, element_id: &str, expected: &str, actual: &str) -> Rejection {
    Rejection::invalid_state(format!(
        "Expected to migrate process instance '{}' but the flow scope of active element with id '{}' is changed. \
         The flow scope of the active element is expected to be '{}' but was '{}'. \
         The flow scope of an element cannot be changed during migration yet.",
        process_instance_key, element_id, expected, actual
    ))
}

pub fn event_sub_process_start_types(
    process_instance_key: Key,
    scope_id: &str,
    event_types: &[String],
    in_target: bool,
) -> Rejection {
    let side = if in_target { "target" } else { "active" };
    Rejection::invalid_state(format!(
        "Expected to migrate process instance '{}' but {} process with id '{}' has one or more event subprocesses with start events \
         of types '{}'. Migrating event subprocesses with start events of these types is not possible yet.",
        process_instance_key,
        side,
        scope_id,
        event_types.join(", ")
    ))
}

pub fn boundary_event_types(
    process_instance_key: Key,
    element_id: &str,
    event_types: &[String],
    in_target: bool,
) -> Rejection {
    let side = if in_target { "target" } else { "active" };
    Rejection::invalid_state(format!(
        "Expected to migrate process instance '{}' but {} element with id '{}' has one or more boundary events of types '{}'. \
         Migrating {} elements with boundary events of these types is not possible yet.",
        process_instance_key,
        side,
        element_id,
        event_types.join(", "),
        side
    ))
}

pub fn catch_event_detached(
    process_instance_key: Key,
    element_id: &str,
    target_element_id: &str,
    catch_event_id: &str,
    target_catch_event_id: &str,
) -> Rejection {
    Rejection::invalid_state(format!(
        "Expected to migrate process instance '{}' but active element with id '{}' is mapped to an element with id '{}' and has a catch event \
         with id '{}' that is mapped to a catch event with id '{}'. These mappings detach the catch event from the element in the target process. \
         Catch events must stay attached to the same element instance.",
        process_instance_key, element_id, target_element_id, catch_event_id, target_catch_event_id
    ))
}

pub fn catch_events_merged(
    process_instance_key: Key,
    element_id: &str,
    target_catch_event_id: &str,
    source_catch_event_ids: &[String],
) -> Rejection {
    Rejection::invalid_state(format!(
        "Expected to migrate process instance '{}' but active element with id '{}' has a catch event attached that is mapped to a catch event \
         with id '{}'. There are multiple mapping instructions that target this catch event: '{}'. \
         Catch events cannot be merged by process instance migration. \
         Please ensure the mapping instructions target a catch event only once.",
        process_instance_key,
        element_id,
        target_catch_event_id,
        source_catch_event_ids.join("', '")
    ))
}

pub fn concurrent_command(process_instance_key: Key) -> Rejection {
    Rejection::invalid_state(format!(
        "Expected to migrate process instance '{}' but a concurrent command was executed on the process instance. Please retry the migration.",
        process_instance_key
    ))
}

pub fn correlation_key_not_resolvable(
    process_instance_key: Key,
    element_id: &str,
    catch_event_id: &str,
    variable_name: &str,
) -> Rejection {
    Rejection::invalid_state(format!(
        "Expected to migrate process instance '{}' but active element with id '{}' must be subscribed to a catch event with id '{}' \
         and the correlation key could not be resolved: expected variable '{}' to be a string or a number.",
        process_instance_key, element_id, catch_event_id, variable_name
    ))
}

pub fn timer_due_date_out_of_range(process_instance_key: Key, element_id: &str, catch_event_id: &str) -> Rejection {
    Rejection::invalid_state(format!(
        "Expected to migrate process instance '{}' but active element with id '{}' must be subscribed to a timer catch event with id '{}' \
         and its due date is out of range.",
        process_instance_key, element_id, catch_event_id
    ))
}

pub fn already_subscribed_to_message(
    process_instance_key: Key,
    element_id: &str,
    message_name: &str,
    catch_event_id: &str,
) -> Rejection {
    Rejection::invalid_state(format!(
        "Expected to migrate process instance '{}' but active element with id '{}' attempts to subscribe to a message it is already subscribed to \
         with name '{}'. Migrating active elements that subscribe to a message they are already subscribed to is not possible yet. \
         Please provide a mapping instruction to message catch event with id '{}' to migrate the respective message subscription.",
        process_instance_key, element_id, message_name, catch_event_id
    ))
}

pub fn compensation_scope_depth_changed(process_instance_key: Key, source_scope_id: &str, target_scope_id: &str) -> Rejection {
    Rejection::invalid_state(format!(
        "Expected to migrate process instance with id '{}' but the flow scope of compensation boundary event is changed. \
         Flow scope '{}' is not in the same level as '{}'. \
         The flow scope of a compensation boundary event cannot be changed during migration yet.",
        process_instance_key, source_scope_id, target_scope_id
    ))
}

/// A runtime entity referenced by the accepted plan no longer exists
pub fn missing_entity(entity: &str, process_instance_key: Key, entity_key: Key) -> MigrationError {
    MigrationError::SafetyCheckFailed(format!(
        "Expected to migrate a {} for process instance with key '{}', but could not find {} with key '{}'. Please report this as a bug",
        entity, process_instance_key, entity, entity_key
    ))
}
