pub mod builder;

use serde::{Serialize, Deserialize};

/// 原始流程模型 (source form of a BPMN process, as written in YAML or built in code)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessModel {
    /// The bpmn process id. The process element itself carries this id.
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub elements: Vec<Element>,
    #[serde(default)]
    pub flows: Vec<SequenceFlow>,
}

/// A flow element of the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Element {
    pub id: String,
    /// Id of the enclosing sub-process. `None` places the element directly in the process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub kind: ElementKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ElementKind {
    StartEvent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event: Option<EventDefinition>,
        #[serde(default = "default_interrupting")]
        interrupting: bool,
    },
    EndEvent,
    IntermediateCatchEvent {
        event: EventDefinition,
    },
    IntermediateThrowEvent,
    BoundaryEvent {
        attached_to: String,
        event: EventDefinition,
        #[serde(default = "default_interrupting")]
        interrupting: bool,
    },
    ServiceTask {
        job_type: String,
    },
    UserTask {
        /// Native (engine managed) user task instead of a job-worker based one
        #[serde(default)]
        native: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assignee: Option<String>,
    },
    ScriptTask,
    SendTask {
        job_type: String,
    },
    BusinessRuleTask,
    ManualTask,
    ReceiveTask {
        message: MessageDefinition,
    },
    SubProcess,
    EventSubProcess,
    AdHocSubProcess,
    CallActivity {
        process_id: String,
    },
    ExclusiveGateway,
    ParallelGateway,
    InclusiveGateway,
    EventBasedGateway,

    // --- 内部 IR 节点 (由 Expander 生成，不应在 YAML 中直接使用) ---
    /// Hidden scope owned by every ad-hoc sub-process, id `<ad-hoc id>#innerInstance`
    AdHocSubProcessInnerInstance,
}

fn default_interrupting() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageDefinition {
    pub name: String,
    /// Name of the variable holding the correlation key
    pub correlation_key: String,
}

/// Event definition of a catch or start event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum EventDefinition {
    Message {
        name: String,
        correlation_key: String,
    },
    Signal {
        name: String,
    },
    /// ISO-8601 duration (`PT10M`) or cycle (`R3/PT1H`)
    Timer {
        duration: String,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    Escalation {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    Compensation {
        /// Activity invoked when the compensation is thrown
        #[serde(default, skip_serializing_if = "Option::is_none")]
        handler: Option<String>,
    },
    Conditional {
        condition: String,
    },
}

impl EventDefinition {
    pub fn message(name: &str, correlation_key: &str) -> Self {
        EventDefinition::Message {
            name: name.to_string(),
            correlation_key: correlation_key.to_string(),
        }
    }

    pub fn signal(name: &str) -> Self {
        EventDefinition::Signal { name: name.to_string() }
    }

    pub fn timer(duration: &str) -> Self {
        EventDefinition::Timer { duration: duration.to_string() }
    }

    pub fn error() -> Self {
        EventDefinition::Error { code: None }
    }

    pub fn escalation() -> Self {
        EventDefinition::Escalation { code: None }
    }

    pub fn compensation(handler: Option<&str>) -> Self {
        EventDefinition::Compensation { handler: handler.map(str::to_string) }
    }
}

/// DSL 中的连线
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SequenceFlow {
    pub source: String,
    pub target: String,
}
