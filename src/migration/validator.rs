use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;
use crate::Key;
use crate::migration::instructions::{MappingInstruction, MigrationCommand, inject_ad_hoc_inner_instances};
use crate::migration::preconditions::{self as reason, Rejection};
use crate::migration::reconciler::{CatchEventAction, CatchEventKind};
use crate::runtime::behavior::{due_date_after, resolve_correlation_key};
use crate::runtime::catalog::{DeployedProcess, ProcessCatalog};
use crate::runtime::definition::{BpmnElementType, BpmnEventType, ExecutableElement, ExecutableProcess};
use crate::runtime::state::{ElementInstance, ElementState, ProcessingState};

/// Element types an active element instance may have
const SUPPORTED_ELEMENT_TYPES: &[BpmnElementType] = &[
    BpmnElementType::Process,
    BpmnElementType::ServiceTask,
    BpmnElementType::UserTask,
    BpmnElementType::ScriptTask,
    BpmnElementType::SendTask,
    BpmnElementType::BusinessRuleTask,
    BpmnElementType::ReceiveTask,
    BpmnElementType::SubProcess,
    BpmnElementType::EventSubProcess,
    BpmnElementType::AdHocSubProcess,
    BpmnElementType::AdHocSubProcessInnerInstance,
    BpmnElementType::CallActivity,
    BpmnElementType::IntermediateCatchEvent,
    BpmnElementType::ExclusiveGateway,
    BpmnElementType::EventBasedGateway,
];

const INTERMEDIATE_CATCH_EVENT_TYPES: &[BpmnEventType] = &[
    BpmnEventType::Message,
    BpmnEventType::Timer,
    BpmnEventType::Signal,
];

const EVENT_SUB_PROCESS_START_TYPES: &[BpmnEventType] = &[
    BpmnEventType::Message,
    BpmnEventType::Timer,
    BpmnEventType::Signal,
    BpmnEventType::Error,
    BpmnEventType::Escalation,
];

const BOUNDARY_EVENT_TYPES: &[BpmnEventType] = &[
    BpmnEventType::Message,
    BpmnEventType::Timer,
    BpmnEventType::Signal,
    BpmnEventType::Error,
    BpmnEventType::Escalation,
    BpmnEventType::Compensation,
];

/// What happens to one active element instance
#[derive(Debug, Clone, PartialEq)]
pub struct ElementPlan {
    pub element_instance_key: Key,
    pub source_element_id: String,
    pub target_element_id: String,
    pub element_type: BpmnElementType,
    /// Still activating: identity is migrated, subscriptions are not there yet
    pub activating: bool,
    pub catch_events: Vec<CatchEventAction>,
}

/// Message start reservation the target process id takes over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationTransfer {
    pub bpmn_process_id: String,
    pub correlation_key: String,
}

/// An accepted migration, ready to be executed
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationPlan {
    pub process_instance_key: Key,
    pub tenant_id: String,
    pub source: Arc<DeployedProcess>,
    pub target: Arc<DeployedProcess>,
    /// The requested instructions plus the injected ad-hoc inner instance mappings
    pub instructions: Vec<MappingInstruction>,
    /// Active element instances, flow scopes before their children
    pub elements: Vec<ElementPlan>,
    pub compensation: Vec<CatchEventAction>,
    pub reservation: Option<ReservationTransfer>,
}

type Mappings<'m> = BTreeMap<&'m str, &'m str>;

/// Decides whether a migrate command can be applied to the current runtime state.
///
/// Validation only reads; running it twice on the same state yields the same outcome.
pub struct MigrationValidator<'a> {
    catalog: &'a ProcessCatalog,
    state: &'a ProcessingState,
    /// Epoch milliseconds, used for due dates of new timers
    now: i64,
}

impl<'a> MigrationValidator<'a> {
    pub fn new(catalog: &'a ProcessCatalog, state: &'a ProcessingState, now: i64) -> Self {
        Self { catalog, state, now }
    }

    pub fn validate(&self, command: &MigrationCommand) -> Result<MigrationPlan, Rejection> {
        let key = command.process_instance_key;
        let instance = self
            .state
            .instance(key)
            .filter(|i| i.record.bpmn_element_type == BpmnElementType::Process)
            .ok_or_else(|| reason::instance_not_found(key))?;
        let tenant_id = instance.record.tenant_id.as_str();
        let source = self
            .catalog
            .by_key(instance.record.process_definition_key)
            .ok_or_else(|| reason::source_definition_not_found(key, instance.record.process_definition_key))?;
        let target = self
            .catalog
            .by_key_and_tenant(command.target_process_definition_key, tenant_id)
            .ok_or_else(|| reason::target_not_found(command.target_process_definition_key))?;

        check_element_ids(key, &command.mapping_instructions, &source.process, &target.process)?;
        check_duplicate_sources(key, &command.mapping_instructions)?;
        self.check_message_start_cardinality(key, tenant_id, &source, &target)?;
        check_catch_event_kinds(key, &command.mapping_instructions, &source.process, &target.process)?;

        let instructions = inject_ad_hoc_inner_instances(&command.mapping_instructions, &source.process, &target.process);
        let mappings: Mappings = instructions
            .iter()
            .map(|i| (i.source_element_id.as_str(), i.target_element_id.as_str()))
            .collect();

        // flow scopes come first, so a child can compare its target scope with the migrated parent
        let mut target_ids: BTreeMap<Key, String> = BTreeMap::new();
        let mut elements = Vec::new();
        for element_instance_key in self.state.instance_tree(key) {
            let Some(element_instance) = self.state.instance(element_instance_key) else {
                continue;
            };
            let element_plan = self.plan_element(key, element_instance, &source, &target, &mappings, &target_ids)?;
            target_ids.insert(element_instance_key, element_plan.target_element_id.clone());
            elements.push(element_plan);
        }

        let compensation = self.plan_compensation(key, &source.process, &target.process, &mappings)?;
        let reservation = if source.bpmn_process_id != target.bpmn_process_id {
            self.state
                .messages
                .process_instance_correlation_key(key)
                .map(|correlation_key| ReservationTransfer {
                    bpmn_process_id: target.bpmn_process_id.clone(),
                    correlation_key: correlation_key.to_string(),
                })
        } else {
            None
        };

        debug!(
            process_instance_key = key,
            target_process_definition_key = target.key,
            elements = elements.len(),
            "Migration plan accepted"
        );
        Ok(MigrationPlan {
            process_instance_key: key,
            tenant_id: tenant_id.to_string(),
            source,
            target,
            instructions,
            elements,
            compensation,
            reservation,
        })
    }

    fn check_message_start_cardinality(
        &self,
        process_instance_key: Key,
        tenant_id: &str,
        source: &DeployedProcess,
        target: &DeployedProcess,
    ) -> Result<(), Rejection> {
        if source.bpmn_process_id == target.bpmn_process_id || !target.process.has_message_start_event() {
            return Ok(());
        }
        let Some(correlation_key) = self.state.messages.process_instance_correlation_key(process_instance_key) else {
            return Ok(());
        };
        match self
            .state
            .messages
            .reservation_holder(tenant_id, &target.bpmn_process_id, correlation_key)
        {
            Some(holder) if holder != process_instance_key => Err(reason::active_message_start_instance(
                process_instance_key,
                &target.bpmn_process_id,
                correlation_key,
            )),
            _ => Ok(()),
        }
    }

    fn plan_element(
        &self,
        process_instance_key: Key,
        instance: &ElementInstance,
        source: &DeployedProcess,
        target: &DeployedProcess,
        mappings: &Mappings,
        target_ids: &BTreeMap<Key, String>,
    ) -> Result<ElementPlan, Rejection> {
        let element_id = instance.record.element_id.as_str();
        let element_type = instance.record.bpmn_element_type;

        if element_type == BpmnElementType::Process {
            check_event_sub_processes(process_instance_key, &source.process, &source.bpmn_process_id, false)?;
            check_event_sub_processes(process_instance_key, &target.process, &target.bpmn_process_id, true)?;
            check_concurrent_command(process_instance_key, instance)?;
            let (Some(source_element), Some(target_element)) = (
                source.process.element(element_id),
                target.process.element(&target.bpmn_process_id),
            ) else {
                return Err(reason::unmapped_element(process_instance_key, element_id));
            };
            let catch_events = self.plan_catch_events(process_instance_key, instance, source_element, target_element, &target.process, mappings)?;
            return Ok(ElementPlan {
                element_instance_key: instance.key,
                source_element_id: element_id.to_string(),
                target_element_id: target.bpmn_process_id.clone(),
                element_type,
                activating: instance.state == ElementState::Activating,
                catch_events,
            });
        }

        if !SUPPORTED_ELEMENT_TYPES.contains(&element_type) {
            return Err(reason::unsupported_element_type(process_instance_key, element_id, element_type.as_str()));
        }
        let source_element = source
            .process
            .element(element_id)
            .ok_or_else(|| reason::unmapped_element(process_instance_key, element_id))?;

        if element_type == BpmnElementType::IntermediateCatchEvent {
            let event_type = source_element.event_type;
            if !event_type.is_some_and(|t| INTERMEDIATE_CATCH_EVENT_TYPES.contains(&t)) {
                let name = event_type.map(|t| t.as_str()).unwrap_or("NONE");
                return Err(reason::unsupported_intermediate_catch_event(process_instance_key, element_id, name));
            }
            if source_element.connected_to_event_based_gateway {
                return Err(reason::catch_event_after_event_based_gateway(process_instance_key, element_id));
            }
        }

        let target_element_id = *mappings
            .get(element_id)
            .ok_or_else(|| reason::unmapped_element(process_instance_key, element_id))?;
        let target_element = target
            .process
            .element(target_element_id)
            .ok_or_else(|| reason::unknown_target_element(process_instance_key, target_element_id))?;

        if source_element.element_type != target_element.element_type {
            return Err(reason::element_type_changed(
                process_instance_key,
                element_id,
                source_element.element_type.as_str(),
                target_element_id,
                target_element.element_type.as_str(),
            ));
        }

        if element_type == BpmnElementType::UserTask {
            let implementation = user_task_implementation(instance.user_task_key.is_some());
            let target_implementation = user_task_implementation(target_element.native_user_task);
            if implementation != target_implementation {
                return Err(reason::user_task_implementation_changed(
                    process_instance_key,
                    element_id,
                    implementation,
                    target_element_id,
                    target_implementation,
                ));
            }
        }

        let expected_scope = instance.parent_key.and_then(|p| target_ids.get(&p)).map(String::as_str);
        let actual_scope = target_element.flow_scope.as_deref();
        if expected_scope != actual_scope {
            return Err(reason::flow_scope_changed(
                process_instance_key,
                element_id,
                expected_scope.unwrap_or_default(),
                actual_scope.unwrap_or_default(),
            ));
        }

        if source_element.element_type.is_scope() {
            check_event_sub_processes(process_instance_key, &source.process, element_id, false)?;
            check_event_sub_processes(process_instance_key, &target.process, target_element_id, true)?;
        }
        if source_element.element_type.is_activity() {
            check_boundary_events(process_instance_key, &source.process, element_id, false)?;
            check_boundary_events(process_instance_key, &target.process, target_element_id, true)?;
        }
        check_attached_catch_events(process_instance_key, source_element, target_element, &source.process, &target.process, mappings)?;
        check_concurrent_command(process_instance_key, instance)?;

        let activating = instance.state == ElementState::Activating;
        let catch_events = if activating {
            Vec::new()
        } else {
            self.plan_catch_events(process_instance_key, instance, source_element, target_element, &target.process, mappings)?
        };

        Ok(ElementPlan {
            element_instance_key: instance.key,
            source_element_id: element_id.to_string(),
            target_element_id: target_element_id.to_string(),
            element_type,
            activating,
            catch_events,
        })
    }

    /// Subscriptions to delete, create and migrate, in that order. Existing subscriptions are
    /// handled in the order they were opened.
    fn plan_catch_events(
        &self,
        process_instance_key: Key,
        instance: &ElementInstance,
        source_element: &ExecutableElement,
        target_element: &ExecutableElement,
        target_process: &ExecutableProcess,
        mappings: &Mappings,
    ) -> Result<Vec<CatchEventAction>, Rejection> {
        let target_catch_events = target_process.catch_events(&target_element.id);
        let find_target = |id: &str| target_catch_events.iter().find(|c| c.id == id).copied();

        let mut existing: Vec<(Key, &str, CatchEventKind)> = Vec::new();
        for key in self.state.message_subscriptions_of(instance.key) {
            if let Some(subscription) = self.state.process_message_subscriptions.get(&key) {
                existing.push((
                    key,
                    subscription.element_id.as_str(),
                    CatchEventKind::Message {
                        message_name: subscription.message_name.clone(),
                        correlation_key: subscription.correlation_key.clone(),
                    },
                ));
            }
        }
        for key in self.state.timers_of(instance.key) {
            if let Some(timer) = self.state.timers.get(&key) {
                existing.push((
                    key,
                    timer.target_element_id.as_str(),
                    CatchEventKind::Timer {
                        due_date: timer.due_date,
                        repetitions: timer.repetitions,
                    },
                ));
            }
        }
        for key in self.state.signal_subscriptions_of(instance.key) {
            if let Some(subscription) = self.state.signal_subscriptions.get(&key) {
                existing.push((
                    key,
                    subscription.catch_event_id.as_str(),
                    CatchEventKind::Signal {
                        signal_name: subscription.signal_name.clone(),
                    },
                ));
            }
        }
        existing.sort_by_key(|(key, _, _)| *key);

        let mut deletions = Vec::new();
        let mut migrations = Vec::new();
        let mut migrated_targets = BTreeSet::new();
        let mut subscribed_messages = BTreeSet::new();
        for (key, catch_event_id, kind) in existing {
            match mappings.get(catch_event_id).and_then(|&id| find_target(id)) {
                Some(target_event) => {
                    if let CatchEventKind::Message { message_name, .. } = &kind {
                        subscribed_messages.insert(message_name.clone());
                    }
                    migrated_targets.insert(target_event.id.clone());
                    migrations.push(CatchEventAction::Migrate {
                        key,
                        target_catch_event_id: target_event.id.clone(),
                        interrupting: target_event.interrupting,
                        kind,
                    });
                }
                None => deletions.push(CatchEventAction::Delete { key, kind }),
            }
        }

        let mut creations = Vec::new();
        if !instance.interrupted {
            for target_event in &target_catch_events {
                if migrated_targets.contains(&target_event.id) {
                    continue;
                }
                let kind = match target_event.event_type {
                    Some(BpmnEventType::Message) => {
                        let Some(message) = target_event.message() else {
                            continue;
                        };
                        let correlation_key = resolve_correlation_key(self.state, instance.key, &message.correlation_key)
                            .ok_or_else(|| {
                                reason::correlation_key_not_resolvable(
                                    process_instance_key,
                                    &source_element.id,
                                    &target_event.id,
                                    &message.correlation_key,
                                )
                            })?;
                        if !subscribed_messages.insert(message.name.clone()) {
                            return Err(reason::already_subscribed_to_message(
                                process_instance_key,
                                &source_element.id,
                                &message.name,
                                &target_event.id,
                            ));
                        }
                        CatchEventKind::Message {
                            message_name: message.name,
                            correlation_key,
                        }
                    }
                    Some(BpmnEventType::Timer) => {
                        let Some(timer) = target_event.timer else {
                            continue;
                        };
                        let due_date = due_date_after(self.now, timer.interval).ok_or_else(|| {
                            reason::timer_due_date_out_of_range(process_instance_key, &source_element.id, &target_event.id)
                        })?;
                        CatchEventKind::Timer {
                            due_date,
                            repetitions: timer.repetitions,
                        }
                    }
                    Some(BpmnEventType::Signal) => {
                        let Some(signal_name) = target_event.signal_name() else {
                            continue;
                        };
                        CatchEventKind::Signal {
                            signal_name: signal_name.to_string(),
                        }
                    }
                    _ => continue,
                };
                creations.push(CatchEventAction::Create {
                    catch_event_id: target_event.id.clone(),
                    interrupting: target_event.interrupting,
                    kind,
                });
            }
        }

        let mut actions = deletions;
        actions.extend(creations);
        actions.extend(migrations);
        Ok(actions)
    }

    /// Compensation subscriptions of the process instance. A mapped compensation boundary
    /// migrates the subscription of its activity and of every enclosing flow scope; all others
    /// are deleted.
    fn plan_compensation(
        &self,
        process_instance_key: Key,
        source: &ExecutableProcess,
        target: &ExecutableProcess,
        mappings: &Mappings,
    ) -> Result<Vec<CatchEventAction>, Rejection> {
        let subscriptions: Vec<_> = self
            .state
            .compensation_subscriptions_of(process_instance_key)
            .into_iter()
            .filter_map(|key| self.state.compensation_subscriptions.get(&key).map(|s| (key, s)))
            .collect();

        let mut compensable: BTreeMap<String, String> = BTreeMap::new();
        for (_, subscription) in &subscriptions {
            let Some(activity) = source
                .element(&subscription.compensable_activity_id)
                .filter(|a| a.element_type != BpmnElementType::SubProcess)
            else {
                continue;
            };
            let target_activity_id = compensation_boundary(source, &activity.id)
                .and_then(|b| mappings.get(b.id.as_str()))
                .and_then(|&id| target.element(id))
                .and_then(|b| b.attached_to.as_deref());
            if let Some(target_activity_id) = target_activity_id {
                pair_flow_scopes(process_instance_key, source, target, &activity.id, target_activity_id, &mut compensable)?;
            }
        }

        let mut actions = Vec::new();
        for (key, subscription) in subscriptions {
            match compensable.get(&subscription.compensable_activity_id) {
                Some(target_activity_id) => {
                    let handler_id = compensation_boundary(target, target_activity_id)
                        .and_then(|b| b.compensation_handler())
                        .map(str::to_string);
                    actions.push(CatchEventAction::Migrate {
                        key,
                        target_catch_event_id: target_activity_id.clone(),
                        interrupting: false,
                        kind: CatchEventKind::Compensation { handler_id },
                    });
                }
                None => actions.push(CatchEventAction::Delete {
                    key,
                    kind: CatchEventKind::Compensation {
                        handler_id: subscription.compensation_handler_id.clone(),
                    },
                }),
            }
        }
        Ok(actions)
    }
}

/// Pairs a compensable activity and its target with their flow scopes up to the process roots.
/// Both chains must reach the root at the same level.
fn pair_flow_scopes(
    process_instance_key: Key,
    source: &ExecutableProcess,
    target: &ExecutableProcess,
    source_activity_id: &str,
    target_activity_id: &str,
    pairs: &mut BTreeMap<String, String>,
) -> Result<(), Rejection> {
    let mut source_id = source_activity_id.to_string();
    let mut target_id = target_activity_id.to_string();
    loop {
        let source_scope = source.element(&source_id).and_then(|e| e.flow_scope.clone());
        let target_scope = target.element(&target_id).and_then(|e| e.flow_scope.clone());
        pairs.insert(source_id.clone(), target_id.clone());
        match (source_scope, target_scope) {
            (Some(source_scope), Some(target_scope)) => {
                source_id = source_scope;
                target_id = target_scope;
            }
            (None, None) => return Ok(()),
            _ => {
                return Err(reason::compensation_scope_depth_changed(process_instance_key, &source_id, &target_id));
            }
        }
    }
}

fn check_element_ids(
    process_instance_key: Key,
    instructions: &[MappingInstruction],
    source: &ExecutableProcess,
    target: &ExecutableProcess,
) -> Result<(), Rejection> {
    for instruction in instructions {
        if !source.contains(&instruction.source_element_id) {
            return Err(reason::unknown_source_element(process_instance_key, &instruction.source_element_id));
        }
    }
    for instruction in instructions {
        if !target.contains(&instruction.target_element_id) {
            return Err(reason::unknown_target_element(process_instance_key, &instruction.target_element_id));
        }
    }
    Ok(())
}

fn check_duplicate_sources(process_instance_key: Key, instructions: &[MappingInstruction]) -> Result<(), Rejection> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for instruction in instructions {
        *counts.entry(instruction.source_element_id.as_str()).or_default() += 1;
    }
    let duplicates: Vec<String> = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(id, _)| id.to_string())
        .collect();
    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(reason::duplicate_source_ids(process_instance_key, &duplicates))
    }
}

/// A catch event must be mapped to a catch event of the same element type and event type,
/// whatever the runtime state of the instance is
fn check_catch_event_kinds(
    process_instance_key: Key,
    instructions: &[MappingInstruction],
    source: &ExecutableProcess,
    target: &ExecutableProcess,
) -> Result<(), Rejection> {
    for instruction in instructions {
        let (Some(source_event), Some(target_element)) = (
            source.element(&instruction.source_element_id),
            target.element(&instruction.target_element_id),
        ) else {
            continue;
        };
        if !source_event.is_catch_event() || source_event.element_type == BpmnElementType::ReceiveTask {
            continue;
        }
        if source_event.element_type != target_element.element_type || source_event.event_type != target_element.event_type {
            return Err(reason::catch_event_kind_changed(
                process_instance_key,
                &source_event.id,
                &catch_event_kind(source_event),
                &target_element.id,
                &catch_event_kind(target_element),
            ));
        }
    }
    Ok(())
}

fn catch_event_kind(element: &ExecutableElement) -> String {
    match element.event_type {
        Some(event_type) => format!("{} {}", event_type, element.element_type),
        None => element.element_type.to_string(),
    }
}

fn check_event_sub_processes(
    process_instance_key: Key,
    process: &ExecutableProcess,
    scope_id: &str,
    in_target: bool,
) -> Result<(), Rejection> {
    let unsupported = unsupported_types(
        process.event_sub_process_start_events(scope_id),
        EVENT_SUB_PROCESS_START_TYPES,
    );
    if unsupported.is_empty() {
        Ok(())
    } else {
        Err(reason::event_sub_process_start_types(process_instance_key, scope_id, &unsupported, in_target))
    }
}

fn check_boundary_events(
    process_instance_key: Key,
    process: &ExecutableProcess,
    element_id: &str,
    in_target: bool,
) -> Result<(), Rejection> {
    let unsupported = unsupported_types(process.boundary_events(element_id), BOUNDARY_EVENT_TYPES);
    if unsupported.is_empty() {
        Ok(())
    } else {
        Err(reason::boundary_event_types(process_instance_key, element_id, &unsupported, in_target))
    }
}

fn unsupported_types(events: Vec<&ExecutableElement>, supported: &[BpmnEventType]) -> Vec<String> {
    let mut unsupported: Vec<String> = Vec::new();
    for event in events {
        let name = match event.event_type {
            Some(event_type) if supported.contains(&event_type) => continue,
            Some(event_type) => event_type.as_str(),
            None => "NONE",
        };
        if !unsupported.iter().any(|u| u == name) {
            unsupported.push(name.to_string());
        }
    }
    unsupported
}

/// Catch events of the element must be mapped to catch events of the mapped target element,
/// and no two of them to the same one
fn check_attached_catch_events(
    process_instance_key: Key,
    source_element: &ExecutableElement,
    target_element: &ExecutableElement,
    source: &ExecutableProcess,
    target: &ExecutableProcess,
    mappings: &Mappings,
) -> Result<(), Rejection> {
    let target_catch_events: BTreeSet<&str> = target
        .catch_events(&target_element.id)
        .into_iter()
        .map(|c| c.id.as_str())
        .collect();

    let mut sources_by_target: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for catch_event in source.catch_events(&source_element.id) {
        if catch_event.id == source_element.id {
            continue;
        }
        let Some(&target_catch_event_id) = mappings.get(catch_event.id.as_str()) else {
            continue;
        };
        if !target_catch_events.contains(target_catch_event_id) {
            return Err(reason::catch_event_detached(
                process_instance_key,
                &source_element.id,
                &target_element.id,
                &catch_event.id,
                target_catch_event_id,
            ));
        }
        sources_by_target
            .entry(target_catch_event_id)
            .or_default()
            .push(catch_event.id.clone());
    }

    for (target_catch_event_id, mut source_ids) in sources_by_target {
        if source_ids.len() > 1 {
            source_ids.sort();
            return Err(reason::catch_events_merged(
                process_instance_key,
                &source_element.id,
                target_catch_event_id,
                &source_ids,
            ));
        }
    }
    Ok(())
}

fn check_concurrent_command(process_instance_key: Key, instance: &ElementInstance) -> Result<(), Rejection> {
    if instance.pending_event_trigger || instance.active_sequence_flows > 0 {
        Err(reason::concurrent_command(process_instance_key))
    } else {
        Ok(())
    }
}

fn user_task_implementation(native: bool) -> &'static str {
    if native { "zeebe user task" } else { "job worker" }
}

fn compensation_boundary<'p>(process: &'p ExecutableProcess, activity_id: &str) -> Option<&'p ExecutableElement> {
    process
        .boundary_events(activity_id)
        .into_iter()
        .find(|b| b.event_type == Some(BpmnEventType::Compensation))
}
