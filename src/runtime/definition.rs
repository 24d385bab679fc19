use std::collections::HashMap;
use std::fmt;
use chrono::TimeDelta;
use serde::{Serialize, Deserialize};
use crate::dsl::{EventDefinition, MessageDefinition};

/// Suffix of the hidden scope element every ad-hoc sub-process owns
pub const INNER_INSTANCE_SUFFIX: &str = "#innerInstance";

pub fn inner_instance_id(ad_hoc_id: &str) -> String {
    format!("{}{}", ad_hoc_id, INNER_INSTANCE_SUFFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BpmnElementType {
    Process,
    StartEvent,
    EndEvent,
    IntermediateCatchEvent,
    IntermediateThrowEvent,
    BoundaryEvent,
    ServiceTask,
    UserTask,
    ScriptTask,
    SendTask,
    BusinessRuleTask,
    ManualTask,
    ReceiveTask,
    SubProcess,
    EventSubProcess,
    AdHocSubProcess,
    AdHocSubProcessInnerInstance,
    CallActivity,
    ExclusiveGateway,
    ParallelGateway,
    InclusiveGateway,
    EventBasedGateway,
}

impl BpmnElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BpmnElementType::Process => "PROCESS",
            BpmnElementType::StartEvent => "START_EVENT",
            BpmnElementType::EndEvent => "END_EVENT",
            BpmnElementType::IntermediateCatchEvent => "INTERMEDIATE_CATCH_EVENT",
            BpmnElementType::IntermediateThrowEvent => "INTERMEDIATE_THROW_EVENT",
            BpmnElementType::BoundaryEvent => "BOUNDARY_EVENT",
            BpmnElementType::ServiceTask => "SERVICE_TASK",
            BpmnElementType::UserTask => "USER_TASK",
            BpmnElementType::ScriptTask => "SCRIPT_TASK",
            BpmnElementType::SendTask => "SEND_TASK",
            BpmnElementType::BusinessRuleTask => "BUSINESS_RULE_TASK",
            BpmnElementType::ManualTask => "MANUAL_TASK",
            BpmnElementType::ReceiveTask => "RECEIVE_TASK",
            BpmnElementType::SubProcess => "SUB_PROCESS",
            BpmnElementType::EventSubProcess => "EVENT_SUB_PROCESS",
            BpmnElementType::AdHocSubProcess => "AD_HOC_SUB_PROCESS",
            BpmnElementType::AdHocSubProcessInnerInstance => "AD_HOC_SUB_PROCESS_INNER_INSTANCE",
            BpmnElementType::CallActivity => "CALL_ACTIVITY",
            BpmnElementType::ExclusiveGateway => "EXCLUSIVE_GATEWAY",
            BpmnElementType::ParallelGateway => "PARALLEL_GATEWAY",
            BpmnElementType::InclusiveGateway => "INCLUSIVE_GATEWAY",
            BpmnElementType::EventBasedGateway => "EVENT_BASED_GATEWAY",
        }
    }

    /// Elements that can own boundary events
    pub fn is_activity(&self) -> bool {
        matches!(
            self,
            BpmnElementType::ServiceTask
                | BpmnElementType::UserTask
                | BpmnElementType::ScriptTask
                | BpmnElementType::SendTask
                | BpmnElementType::BusinessRuleTask
                | BpmnElementType::ManualTask
                | BpmnElementType::ReceiveTask
                | BpmnElementType::SubProcess
                | BpmnElementType::AdHocSubProcess
                | BpmnElementType::CallActivity
        )
    }

    /// Elements that contain other elements
    pub fn is_scope(&self) -> bool {
        matches!(
            self,
            BpmnElementType::Process
                | BpmnElementType::SubProcess
                | BpmnElementType::EventSubProcess
                | BpmnElementType::AdHocSubProcess
                | BpmnElementType::AdHocSubProcessInnerInstance
        )
    }
}

impl fmt::Display for BpmnElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BpmnEventType {
    Message,
    Signal,
    Timer,
    Error,
    Escalation,
    Compensation,
    Conditional,
}

impl BpmnEventType {
    pub fn of(event: &EventDefinition) -> Self {
        match event {
            EventDefinition::Message { .. } => BpmnEventType::Message,
            EventDefinition::Signal { .. } => BpmnEventType::Signal,
            EventDefinition::Timer { .. } => BpmnEventType::Timer,
            EventDefinition::Error { .. } => BpmnEventType::Error,
            EventDefinition::Escalation { .. } => BpmnEventType::Escalation,
            EventDefinition::Compensation { .. } => BpmnEventType::Compensation,
            EventDefinition::Conditional { .. } => BpmnEventType::Conditional,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BpmnEventType::Message => "MESSAGE",
            BpmnEventType::Signal => "SIGNAL",
            BpmnEventType::Timer => "TIMER",
            BpmnEventType::Error => "ERROR",
            BpmnEventType::Escalation => "ESCALATION",
            BpmnEventType::Compensation => "COMPENSATION",
            BpmnEventType::Conditional => "CONDITIONAL",
        }
    }

    /// Whether an element waiting for this event holds a subscription
    pub fn is_subscribable(&self) -> bool {
        matches!(self, BpmnEventType::Message | BpmnEventType::Signal | BpmnEventType::Timer)
    }
}

impl fmt::Display for BpmnEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed timer expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSpec {
    pub interval: TimeDelta,
    /// `-1` repeats forever
    pub repetitions: i32,
}

/// 编译后的流程元素
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutableElement {
    pub id: String,
    pub element_type: BpmnElementType,
    pub event_type: Option<BpmnEventType>,
    /// `None` only for the process element itself
    pub flow_scope: Option<String>,
    pub attached_to: Option<String>,
    pub interrupting: bool,
    pub event: Option<EventDefinition>,
    pub timer: Option<TimerSpec>,
    pub job_type: Option<String>,
    pub native_user_task: bool,
    pub assignee: Option<String>,
    pub called_process_id: Option<String>,
    pub connected_to_event_based_gateway: bool,
    pub incoming: Vec<String>,
    pub outgoing: Vec<String>,
}

impl ExecutableElement {
    pub fn message(&self) -> Option<MessageDefinition> {
        match &self.event {
            Some(EventDefinition::Message { name, correlation_key }) => Some(MessageDefinition {
                name: name.clone(),
                correlation_key: correlation_key.clone(),
            }),
            _ => None,
        }
    }

    pub fn signal_name(&self) -> Option<&str> {
        match &self.event {
            Some(EventDefinition::Signal { name }) => Some(name),
            _ => None,
        }
    }

    pub fn compensation_handler(&self) -> Option<&str> {
        match &self.event {
            Some(EventDefinition::Compensation { handler }) => handler.as_deref(),
            _ => None,
        }
    }

    /// Catch events are the elements subscriptions are opened for: boundary events,
    /// intermediate catch events, receive tasks and start events of event sub-processes
    pub fn is_catch_event(&self) -> bool {
        match self.element_type {
            BpmnElementType::BoundaryEvent | BpmnElementType::IntermediateCatchEvent => true,
            BpmnElementType::ReceiveTask => true,
            BpmnElementType::StartEvent => self.event.is_some(),
            _ => false,
        }
    }
}

/// Compiled process: the element graph of one deployed definition
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutableProcess {
    pub bpmn_process_id: String,
    pub name: String,
    elements: Vec<ExecutableElement>,
    index: HashMap<String, usize>,
}

impl ExecutableProcess {
    pub fn new(bpmn_process_id: String, name: String, elements: Vec<ExecutableElement>) -> Self {
        let index = elements
            .iter()
            .enumerate()
            .map(|(idx, element)| (element.id.clone(), idx))
            .collect();
        Self {
            bpmn_process_id,
            name,
            elements,
            index,
        }
    }

    pub fn element(&self, id: &str) -> Option<&ExecutableElement> {
        self.index.get(id).map(|&idx| &self.elements[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn elements(&self) -> &[ExecutableElement] {
        &self.elements
    }

    pub fn children_of(&self, scope_id: &str) -> Vec<&ExecutableElement> {
        self.elements
            .iter()
            .filter(|e| e.flow_scope.as_deref() == Some(scope_id))
            .collect()
    }

    pub fn boundary_events(&self, activity_id: &str) -> Vec<&ExecutableElement> {
        self.elements
            .iter()
            .filter(|e| e.attached_to.as_deref() == Some(activity_id))
            .collect()
    }

    /// Start events of the event sub-processes directly inside the given scope
    pub fn event_sub_process_start_events(&self, scope_id: &str) -> Vec<&ExecutableElement> {
        self.children_of(scope_id)
            .into_iter()
            .filter(|e| e.element_type == BpmnElementType::EventSubProcess)
            .flat_map(|sub| self.children_of(&sub.id))
            .filter(|s| s.element_type == BpmnElementType::StartEvent)
            .collect()
    }

    /// The none start event of a process or sub-process
    pub fn none_start_event(&self, scope_id: &str) -> Option<&ExecutableElement> {
        self.children_of(scope_id)
            .into_iter()
            .find(|e| e.element_type == BpmnElementType::StartEvent && e.event.is_none())
    }

    pub fn message_start_events(&self) -> Vec<&ExecutableElement> {
        self.children_of(&self.bpmn_process_id)
            .into_iter()
            .filter(|e| {
                e.element_type == BpmnElementType::StartEvent
                    && e.event_type == Some(BpmnEventType::Message)
            })
            .collect()
    }

    pub fn has_message_start_event(&self) -> bool {
        !self.message_start_events().is_empty()
    }

    /// The catch events an instance of the given element waits for.
    ///
    /// Activities supply their boundary events (a receive task additionally itself), an
    /// intermediate catch event itself, an event-based gateway the catch events following it,
    /// and scopes the start events of their event sub-processes.
    pub fn catch_events(&self, element_id: &str) -> Vec<&ExecutableElement> {
        let Some(element) = self.element(element_id) else {
            return Vec::new();
        };

        let mut events = Vec::new();
        match element.element_type {
            BpmnElementType::IntermediateCatchEvent => events.push(element),
            BpmnElementType::ReceiveTask => events.push(element),
            BpmnElementType::EventBasedGateway => {
                for target in &element.outgoing {
                    if let Some(event) = self.element(target) {
                        events.push(event);
                    }
                }
            }
            _ => {}
        }
        if element.element_type.is_activity() {
            events.extend(self.boundary_events(element_id));
        }
        if element.element_type.is_scope() {
            events.extend(self.event_sub_process_start_events(element_id));
        }
        events
    }

    /// Number of flow scopes between the element and the process root
    pub fn depth(&self, element_id: &str) -> usize {
        let mut depth = 0;
        let mut current = self.element(element_id).and_then(|e| e.flow_scope.clone());
        while let Some(scope) = current {
            depth += 1;
            current = self.element(&scope).and_then(|e| e.flow_scope.clone());
        }
        depth
    }
}
