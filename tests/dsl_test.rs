use instance_migration::dsl::builder::ProcessBuilder;
use instance_migration::dsl::{ElementKind, EventDefinition, ProcessModel};

#[test]
fn test_builder_places_elements_in_scopes() {
    let model = ProcessBuilder::new("order")
        .name("Order Process")
        .start_event("start")
        .sub_process("sub")
        .enter("sub")
        .start_event("subStart")
        .service_task("A", "reserve")
        .exit()
        .end_event("end")
        .sequence(&["start", "sub", "end"])
        .connect("subStart", "A")
        .build();

    assert_eq!(model.id, "order");
    assert_eq!(model.name, "Order Process");
    assert_eq!(model.elements.len(), 5);

    let a = model.elements.iter().find(|e| e.id == "A").unwrap();
    assert_eq!(a.scope.as_deref(), Some("sub"));
    assert_eq!(a.kind, ElementKind::ServiceTask { job_type: "reserve".into() });

    let end = model.elements.iter().find(|e| e.id == "end").unwrap();
    assert_eq!(end.scope, None);

    // sequence() connects neighbours only
    assert_eq!(model.flows.len(), 3);
    assert_eq!(model.flows[0].source, "start");
    assert_eq!(model.flows[1].target, "end");
}

#[test]
fn test_user_task_builder() {
    let model = ProcessBuilder::new("approval")
        .start_event("start")
        .user_task("review")
            .native()
            .assignee("demo")
            .build()
        .build();

    let review = model.elements.iter().find(|e| e.id == "review").unwrap();
    assert_eq!(
        review.kind,
        ElementKind::UserTask { native: true, assignee: Some("demo".into()) }
    );
}

#[test]
fn test_boundary_events_default_to_interrupting() {
    let model = ProcessBuilder::new("p")
        .start_event("start")
        .service_task("A", "a")
        .boundary_event("b1", "A", EventDefinition::signal("cancel"))
        .non_interrupting_boundary_event("b2", "A", EventDefinition::timer("PT1H"))
        .build();

    match &model.elements[2].kind {
        ElementKind::BoundaryEvent { attached_to, interrupting, .. } => {
            assert_eq!(attached_to, "A");
            assert!(interrupting);
        }
        other => panic!("unexpected kind {:?}", other),
    }
    match &model.elements[3].kind {
        ElementKind::BoundaryEvent { interrupting, event, .. } => {
            assert!(!interrupting);
            assert_eq!(event, &EventDefinition::timer("PT1H"));
        }
        other => panic!("unexpected kind {:?}", other),
    }
}

#[test]
fn test_model_deserializes_from_yaml() {
    let yaml = r#"
id: payment
elements:
  - { id: start, type: StartEvent }
  - { id: pay, type: ServiceTask, job_type: charge }
  - id: timeout
    type: BoundaryEvent
    attached_to: pay
    event: { kind: Timer, duration: PT10M }
  - id: wait
    type: IntermediateCatchEvent
    event: { kind: Message, name: paid, correlation_key: orderId }
  - { id: end, type: EndEvent }
flows:
  - { source: start, target: pay }
  - { source: pay, target: wait }
  - { source: wait, target: end }
"#;
    let model: ProcessModel = serde_yaml::from_str(yaml).expect("Failed to parse model");

    let expected = ProcessBuilder::new("payment")
        .name("")
        .start_event("start")
        .service_task("pay", "charge")
        .boundary_event("timeout", "pay", EventDefinition::timer("PT10M"))
        .intermediate_catch_event("wait", EventDefinition::message("paid", "orderId"))
        .end_event("end")
        .sequence(&["start", "pay", "wait", "end"])
        .build();
    assert_eq!(model, expected);
}
