use crate::dsl::{ProcessModel, Element, ElementKind, EventDefinition, MessageDefinition, SequenceFlow};

/// Fluent builder for [`ProcessModel`].
///
/// Elements are added to the current scope. `enter("sub")` moves into a sub-process (or
/// event/ad-hoc sub-process) so that following elements are placed inside it, `exit()` moves
/// back out.
pub struct ProcessBuilder {
    id: String,
    name: String,
    pub elements: Vec<Element>, // public for manual manipulation in tests
    flows: Vec<SequenceFlow>,
    scopes: Vec<String>,
}

impl ProcessBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            elements: Vec::new(),
            flows: Vec::new(),
            scopes: Vec::new(),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn element(mut self, id: &str, kind: ElementKind) -> Self {
        self.elements.push(Element {
            id: id.to_string(),
            scope: self.scopes.last().cloned(),
            kind,
        });
        self
    }

    pub fn enter(mut self, scope: &str) -> Self {
        self.scopes.push(scope.to_string());
        self
    }

    pub fn exit(mut self) -> Self {
        self.scopes.pop();
        self
    }

    pub fn start_event(self, id: &str) -> Self {
        self.element(id, ElementKind::StartEvent { event: None, interrupting: true })
    }

    pub fn message_start_event(self, id: &str, message_name: &str) -> Self {
        // correlation of a message start happens on the published message, not a variable
        self.element(id, ElementKind::StartEvent {
            event: Some(EventDefinition::message(message_name, "")),
            interrupting: true,
        })
    }

    /// Start event of an event sub-process
    pub fn event_start(self, id: &str, event: EventDefinition, interrupting: bool) -> Self {
        self.element(id, ElementKind::StartEvent { event: Some(event), interrupting })
    }

    pub fn end_event(self, id: &str) -> Self {
        self.element(id, ElementKind::EndEvent)
    }

    pub fn service_task(self, id: &str, job_type: &str) -> Self {
        self.element(id, ElementKind::ServiceTask { job_type: job_type.to_string() })
    }

    pub fn script_task(self, id: &str) -> Self {
        self.element(id, ElementKind::ScriptTask)
    }

    pub fn user_task(self, id: &str) -> UserTaskBuilder {
        UserTaskBuilder {
            process_builder: self,
            id: id.to_string(),
            native: false,
            assignee: None,
        }
    }

    pub fn receive_task(self, id: &str, message_name: &str, correlation_key: &str) -> Self {
        self.element(id, ElementKind::ReceiveTask {
            message: MessageDefinition {
                name: message_name.to_string(),
                correlation_key: correlation_key.to_string(),
            },
        })
    }

    pub fn sub_process(self, id: &str) -> Self {
        self.element(id, ElementKind::SubProcess)
    }

    pub fn event_sub_process(self, id: &str) -> Self {
        self.element(id, ElementKind::EventSubProcess)
    }

    pub fn ad_hoc_sub_process(self, id: &str) -> Self {
        self.element(id, ElementKind::AdHocSubProcess)
    }

    pub fn call_activity(self, id: &str, process_id: &str) -> Self {
        self.element(id, ElementKind::CallActivity { process_id: process_id.to_string() })
    }

    pub fn intermediate_catch_event(self, id: &str, event: EventDefinition) -> Self {
        self.element(id, ElementKind::IntermediateCatchEvent { event })
    }

    pub fn boundary_event(self, id: &str, attached_to: &str, event: EventDefinition) -> Self {
        self.element(id, ElementKind::BoundaryEvent {
            attached_to: attached_to.to_string(),
            event,
            interrupting: true,
        })
    }

    pub fn non_interrupting_boundary_event(self, id: &str, attached_to: &str, event: EventDefinition) -> Self {
        self.element(id, ElementKind::BoundaryEvent {
            attached_to: attached_to.to_string(),
            event,
            interrupting: false,
        })
    }

    pub fn exclusive_gateway(self, id: &str) -> Self {
        self.element(id, ElementKind::ExclusiveGateway)
    }

    pub fn parallel_gateway(self, id: &str) -> Self {
        self.element(id, ElementKind::ParallelGateway)
    }

    pub fn inclusive_gateway(self, id: &str) -> Self {
        self.element(id, ElementKind::InclusiveGateway)
    }

    pub fn event_based_gateway(self, id: &str) -> Self {
        self.element(id, ElementKind::EventBasedGateway)
    }

    pub fn connect(mut self, source: &str, target: &str) -> Self {
        self.flows.push(SequenceFlow {
            source: source.to_string(),
            target: target.to_string(),
        });
        self
    }

    /// Connects the given elements one after another
    pub fn sequence(mut self, ids: &[&str]) -> Self {
        for pair in ids.windows(2) {
            self = self.connect(pair[0], pair[1]);
        }
        self
    }

    pub fn build(self) -> ProcessModel {
        ProcessModel {
            id: self.id,
            name: self.name,
            elements: self.elements,
            flows: self.flows,
        }
    }
}

pub struct UserTaskBuilder {
    process_builder: ProcessBuilder,
    id: String,
    native: bool,
    assignee: Option<String>,
}

impl UserTaskBuilder {
    pub fn native(mut self) -> Self {
        self.native = true;
        self
    }

    pub fn assignee(mut self, assignee: &str) -> Self {
        self.assignee = Some(assignee.to_string());
        self
    }

    pub fn build(self) -> ProcessBuilder {
        let kind = ElementKind::UserTask {
            native: self.native,
            assignee: self.assignee,
        };
        self.process_builder.element(&self.id, kind)
    }
}
