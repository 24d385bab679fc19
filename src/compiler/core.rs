use crate::dsl::{ProcessModel, Element, ElementKind, EventDefinition};
use crate::runtime::definition::{
    BpmnElementType, BpmnEventType, ExecutableElement, ExecutableProcess, TimerSpec,
};
use crate::compiler::expander::Expander;
use std::collections::HashMap;
use anyhow::{Result, anyhow, bail};
use chrono::TimeDelta;

pub struct Compiler {
    id_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            id_map: HashMap::new(),
        }
    }

    pub fn compile(&mut self, raw_model: ProcessModel) -> Result<ExecutableProcess> {
        // 0. Pass 0: Expand
        let expander = Expander::new();
        let model = expander.expand(raw_model)?;

        // 1. Pass 1: Indexing. The process element owns the model id.
        self.id_map.clear();
        self.id_map.insert(model.id.clone(), usize::MAX);
        for (idx, element) in model.elements.iter().enumerate() {
            if self.id_map.insert(element.id.clone(), idx).is_some() {
                return Err(anyhow!("Duplicate element ID: {}", element.id));
            }
        }

        let mut incoming: HashMap<&str, Vec<String>> = HashMap::new();
        let mut outgoing: HashMap<&str, Vec<String>> = HashMap::new();
        for flow in &model.flows {
            for end in [&flow.source, &flow.target] {
                if !self.id_map.contains_key(end) || *end == model.id {
                    bail!("Sequence flow {} -> {} references unknown element '{}'", flow.source, flow.target, end);
                }
            }
            outgoing.entry(flow.source.as_str()).or_default().push(flow.target.clone());
            incoming.entry(flow.target.as_str()).or_default().push(flow.source.clone());
        }

        // 2. Pass 2: Transform
        let mut elements = Vec::with_capacity(model.elements.len() + 1);
        elements.push(ExecutableElement {
            id: model.id.clone(),
            element_type: BpmnElementType::Process,
            event_type: None,
            flow_scope: None,
            attached_to: None,
            interrupting: true,
            event: None,
            timer: None,
            job_type: None,
            native_user_task: false,
            assignee: None,
            called_process_id: None,
            connected_to_event_based_gateway: false,
            incoming: Vec::new(),
            outgoing: Vec::new(),
        });

        for element in &model.elements {
            let mut compiled = self.transform_element(&model, element)?;
            compiled.incoming = incoming.get(element.id.as_str()).cloned().unwrap_or_default();
            compiled.outgoing = outgoing.get(element.id.as_str()).cloned().unwrap_or_default();
            compiled.connected_to_event_based_gateway = compiled.incoming.iter().any(|source| {
                matches!(
                    self.lookup(&model, source).map(|e| &e.kind),
                    Some(ElementKind::EventBasedGateway)
                )
            });
            elements.push(compiled);
        }

        // 3. Start Node
        let has_start = elements.iter().any(|e| {
            e.element_type == BpmnElementType::StartEvent && e.flow_scope.as_deref() == Some(model.id.as_str())
        });
        if !has_start {
            bail!("Process '{}' has no start event", model.id);
        }

        Ok(ExecutableProcess::new(model.id, model.name, elements))
    }

    fn lookup<'a>(&self, model: &'a ProcessModel, id: &str) -> Option<&'a Element> {
        self.id_map
            .get(id)
            .and_then(|&idx| model.elements.get(idx))
    }

    fn resolve_scope(&self, model: &ProcessModel, element: &Element) -> Result<String> {
        let Some(scope) = &element.scope else {
            return Ok(model.id.clone());
        };
        let scope_element = self
            .lookup(model, scope)
            .ok_or_else(|| anyhow!("Element '{}' is placed in unknown scope '{}'", element.id, scope))?;
        match scope_element.kind {
            ElementKind::SubProcess
            | ElementKind::EventSubProcess
            | ElementKind::AdHocSubProcess
            | ElementKind::AdHocSubProcessInnerInstance => Ok(scope.clone()),
            _ => Err(anyhow!(
                "Element '{}' is placed in '{}' which is not a sub-process",
                element.id,
                scope
            )),
        }
    }

    fn transform_element(&self, model: &ProcessModel, element: &Element) -> Result<ExecutableElement> {
        let mut compiled = ExecutableElement {
            id: element.id.clone(),
            element_type: BpmnElementType::Process,
            event_type: None,
            flow_scope: Some(self.resolve_scope(model, element)?),
            attached_to: None,
            interrupting: true,
            event: None,
            timer: None,
            job_type: None,
            native_user_task: false,
            assignee: None,
            called_process_id: None,
            connected_to_event_based_gateway: false,
            incoming: Vec::new(),
            outgoing: Vec::new(),
        };

        compiled.element_type = match &element.kind {
            ElementKind::StartEvent { event, interrupting } => {
                let in_event_sub_process = matches!(
                    element.scope.as_deref().and_then(|s| self.lookup(model, s)).map(|e| &e.kind),
                    Some(ElementKind::EventSubProcess)
                );
                if in_event_sub_process && event.is_none() {
                    bail!("Start event '{}' of an event sub-process needs an event definition", element.id);
                }
                compiled.interrupting = *interrupting;
                self.attach_event(&mut compiled, event.clone())?;
                BpmnElementType::StartEvent
            }
            ElementKind::EndEvent => BpmnElementType::EndEvent,
            ElementKind::IntermediateCatchEvent { event } => {
                self.attach_event(&mut compiled, Some(event.clone()))?;
                BpmnElementType::IntermediateCatchEvent
            }
            ElementKind::IntermediateThrowEvent => BpmnElementType::IntermediateThrowEvent,
            ElementKind::BoundaryEvent { attached_to, event, interrupting } => {
                let activity = self
                    .lookup(model, attached_to)
                    .ok_or_else(|| anyhow!("Boundary event '{}' is attached to unknown element '{}'", element.id, attached_to))?;
                if !is_activity(&activity.kind) {
                    bail!("Boundary event '{}' is attached to '{}' which is not an activity", element.id, attached_to);
                }
                compiled.flow_scope = Some(self.resolve_scope(model, activity)?);
                compiled.attached_to = Some(attached_to.clone());
                compiled.interrupting = *interrupting;
                self.attach_event(&mut compiled, Some(event.clone()))?;
                BpmnElementType::BoundaryEvent
            }
            ElementKind::ServiceTask { job_type } => {
                compiled.job_type = Some(job_type.clone());
                BpmnElementType::ServiceTask
            }
            ElementKind::UserTask { native, assignee } => {
                compiled.native_user_task = *native;
                compiled.assignee = assignee.clone();
                if !native {
                    compiled.job_type = Some("io.camunda.zeebe:userTask".to_string());
                }
                BpmnElementType::UserTask
            }
            ElementKind::ScriptTask => BpmnElementType::ScriptTask,
            ElementKind::SendTask { job_type } => {
                compiled.job_type = Some(job_type.clone());
                BpmnElementType::SendTask
            }
            ElementKind::BusinessRuleTask => BpmnElementType::BusinessRuleTask,
            ElementKind::ManualTask => BpmnElementType::ManualTask,
            ElementKind::ReceiveTask { message } => {
                self.attach_event(
                    &mut compiled,
                    Some(EventDefinition::Message {
                        name: message.name.clone(),
                        correlation_key: message.correlation_key.clone(),
                    }),
                )?;
                BpmnElementType::ReceiveTask
            }
            ElementKind::SubProcess => BpmnElementType::SubProcess,
            ElementKind::EventSubProcess => BpmnElementType::EventSubProcess,
            ElementKind::AdHocSubProcess => BpmnElementType::AdHocSubProcess,
            ElementKind::AdHocSubProcessInnerInstance => BpmnElementType::AdHocSubProcessInnerInstance,
            ElementKind::CallActivity { process_id } => {
                compiled.called_process_id = Some(process_id.clone());
                BpmnElementType::CallActivity
            }
            ElementKind::ExclusiveGateway => BpmnElementType::ExclusiveGateway,
            ElementKind::ParallelGateway => BpmnElementType::ParallelGateway,
            ElementKind::InclusiveGateway => BpmnElementType::InclusiveGateway,
            ElementKind::EventBasedGateway => BpmnElementType::EventBasedGateway,
        };

        Ok(compiled)
    }

    fn attach_event(&self, compiled: &mut ExecutableElement, event: Option<EventDefinition>) -> Result<()> {
        let Some(event) = event else {
            return Ok(());
        };
        if let EventDefinition::Timer { duration } = &event {
            let timer = parse_timer(duration)
                .map_err(|e| anyhow!("Invalid timer on element '{}': {}", compiled.id, e))?;
            compiled.timer = Some(timer);
        }
        compiled.event_type = Some(BpmnEventType::of(&event));
        compiled.event = Some(event);
        Ok(())
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

fn is_activity(kind: &ElementKind) -> bool {
    matches!(
        kind,
        ElementKind::ServiceTask { .. }
            | ElementKind::UserTask { .. }
            | ElementKind::ScriptTask
            | ElementKind::SendTask { .. }
            | ElementKind::BusinessRuleTask
            | ElementKind::ManualTask
            | ElementKind::ReceiveTask { .. }
            | ElementKind::SubProcess
            | ElementKind::AdHocSubProcess
            | ElementKind::CallActivity { .. }
    )
}

/// Parses an ISO-8601 duration (`PT1H30M`, `P2D`) or a repeating cycle (`R3/PT10S`, `R/PT1M`).
pub fn parse_timer(expression: &str) -> Result<TimerSpec> {
    let expression = expression.trim();
    if let Some(cycle) = expression.strip_prefix('R') {
        let (count, duration) = cycle
            .split_once('/')
            .ok_or_else(|| anyhow!("cycle '{}' is missing its interval", expression))?;
        let repetitions = if count.is_empty() {
            -1
        } else {
            count
                .parse::<i32>()
                .map_err(|_| anyhow!("cycle '{}' has an invalid repetition count", expression))?
        };
        let interval = parse_duration(duration)?;
        if interval <= TimeDelta::zero() {
            bail!("cycle '{}' needs a positive interval", expression);
        }
        return Ok(TimerSpec { interval, repetitions });
    }
    Ok(TimerSpec {
        interval: parse_duration(expression)?,
        repetitions: 1,
    })
}

fn parse_duration(text: &str) -> Result<TimeDelta> {
    let body = text
        .strip_prefix('P')
        .ok_or_else(|| anyhow!("duration '{}' must start with 'P'", text))?;
    if body.is_empty() {
        bail!("duration '{}' is empty", text);
    }

    let mut total = TimeDelta::zero();
    let mut in_time = false;
    let mut number = String::new();
    for c in body.chars() {
        match c {
            'T' => {
                if in_time || !number.is_empty() {
                    bail!("duration '{}' is malformed", text);
                }
                in_time = true;
            }
            '0'..='9' => number.push(c),
            unit => {
                let value: i64 = number
                    .parse()
                    .map_err(|_| anyhow!("duration '{}' is missing a value before '{}'", text, unit))?;
                number.clear();
                let part = match (in_time, unit) {
                    (false, 'W') => TimeDelta::try_weeks(value),
                    (false, 'D') => TimeDelta::try_days(value),
                    (true, 'H') => TimeDelta::try_hours(value),
                    (true, 'M') => TimeDelta::try_minutes(value),
                    (true, 'S') => TimeDelta::try_seconds(value),
                    _ => bail!("duration '{}' has unsupported unit '{}'", text, unit),
                };
                let part = part.ok_or_else(|| anyhow!("duration '{}' is out of range", text))?;
                total = total
                    .checked_add(&part)
                    .ok_or_else(|| anyhow!("duration '{}' is out of range", text))?;
            }
        }
    }
    if !number.is_empty() {
        bail!("duration '{}' ends without a unit", text);
    }
    Ok(total)
}
