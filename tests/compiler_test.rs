use instance_migration::compiler::Compiler;
use instance_migration::dsl::builder::ProcessBuilder;
use instance_migration::dsl::EventDefinition;
use instance_migration::runtime::definition::{BpmnElementType, BpmnEventType};

#[test]
fn test_compile_linear_process() {
    // 1. Build DSL
    let model = ProcessBuilder::new("linear")
        .start_event("start")
        .service_task("A", "a")
        .end_event("end")
        .sequence(&["start", "A", "end"])
        .build();

    // 2. Compile
    let mut compiler = Compiler::new();
    let process = compiler.compile(model).expect("Compilation failed");

    // 3. The process element comes first and owns the top-level elements
    assert_eq!(process.bpmn_process_id, "linear");
    assert_eq!(process.elements().len(), 4);
    let root = process.element("linear").unwrap();
    assert_eq!(root.element_type, BpmnElementType::Process);
    assert_eq!(root.flow_scope, None);

    let task = process.element("A").unwrap();
    assert_eq!(task.element_type, BpmnElementType::ServiceTask);
    assert_eq!(task.flow_scope.as_deref(), Some("linear"));
    assert_eq!(task.job_type.as_deref(), Some("a"));
    assert_eq!(task.incoming, vec!["start".to_string()]);
    assert_eq!(task.outgoing, vec!["end".to_string()]);

    assert_eq!(process.none_start_event("linear").map(|s| s.id.as_str()), Some("start"));
}

#[test]
fn test_boundary_event_shares_scope_of_activity() {
    let model = ProcessBuilder::new("p")
        .start_event("start")
        .sub_process("sub")
        .enter("sub")
        .start_event("subStart")
        .service_task("A", "a")
        .boundary_event("timer", "A", EventDefinition::timer("PT5M"))
        .exit()
        .build();
    let process = Compiler::new().compile(model).expect("Compilation failed");

    let timer = process.element("timer").unwrap();
    assert_eq!(timer.flow_scope.as_deref(), Some("sub"));
    assert_eq!(timer.attached_to.as_deref(), Some("A"));
    assert_eq!(timer.event_type, Some(BpmnEventType::Timer));
    assert_eq!(timer.timer.unwrap().interval.num_minutes(), 5);
    assert_eq!(process.depth("A"), 2);

    let catch_events: Vec<&str> = process.catch_events("A").iter().map(|e| e.id.as_str()).collect();
    assert_eq!(catch_events, vec!["timer"]);
}

#[test]
fn test_catch_events_of_scopes_and_gateways() {
    let model = ProcessBuilder::new("p")
        .start_event("start")
        .event_based_gateway("gw")
        .intermediate_catch_event("signal", EventDefinition::signal("go"))
        .intermediate_catch_event("timer", EventDefinition::timer("PT1H"))
        .event_sub_process("esp")
        .enter("esp")
        .event_start("espStart", EventDefinition::message("cancel", "orderId"), true)
        .exit()
        .connect("start", "gw")
        .connect("gw", "signal")
        .connect("gw", "timer")
        .build();
    let process = Compiler::new().compile(model).expect("Compilation failed");

    let gateway_events: Vec<&str> = process.catch_events("gw").iter().map(|e| e.id.as_str()).collect();
    assert_eq!(gateway_events, vec!["signal", "timer"]);
    assert!(process.element("signal").unwrap().connected_to_event_based_gateway);

    let process_events: Vec<&str> = process.catch_events("p").iter().map(|e| e.id.as_str()).collect();
    assert_eq!(process_events, vec!["espStart"]);
    // the none start event of the process is not an event sub-process start
    assert!(!process.element("start").unwrap().is_catch_event());
}

#[test]
fn test_duplicate_ids_are_rejected() {
    let model = ProcessBuilder::new("p")
        .start_event("start")
        .service_task("A", "a")
        .service_task("A", "b")
        .build();
    let err = Compiler::new().compile(model).unwrap_err();
    assert!(err.to_string().contains("Duplicate element ID: A"));
}

#[test]
fn test_unknown_flow_target_is_rejected() {
    let model = ProcessBuilder::new("p")
        .start_event("start")
        .connect("start", "nowhere")
        .build();
    let err = Compiler::new().compile(model).unwrap_err();
    assert!(err.to_string().contains("unknown element 'nowhere'"));
}

#[test]
fn test_process_without_start_event_is_rejected() {
    let model = ProcessBuilder::new("p").service_task("A", "a").build();
    assert!(Compiler::new().compile(model).is_err());
}

#[test]
fn test_boundary_event_needs_an_activity() {
    let model = ProcessBuilder::new("p")
        .start_event("start")
        .boundary_event("b", "start", EventDefinition::signal("s"))
        .build();
    let err = Compiler::new().compile(model).unwrap_err();
    assert!(err.to_string().contains("not an activity"));
}

#[test]
fn test_invalid_timer_is_rejected() {
    let model = ProcessBuilder::new("p")
        .start_event("start")
        .intermediate_catch_event("wait", EventDefinition::timer("soon"))
        .build();
    let err = Compiler::new().compile(model).unwrap_err();
    assert!(err.to_string().contains("Invalid timer on element 'wait'"));
}

#[test]
fn test_user_task_job_type() {
    let model = ProcessBuilder::new("p")
        .start_event("start")
        .user_task("worker").build()
        .user_task("native").native().build()
        .build();
    let process = Compiler::new().compile(model).expect("Compilation failed");

    assert_eq!(process.element("worker").unwrap().job_type.as_deref(), Some("io.camunda.zeebe:userTask"));
    let native = process.element("native").unwrap();
    assert!(native.native_user_task);
    assert_eq!(native.job_type, None);
}

#[test]
fn test_scope_queries_outlive_the_scope_id() {
    let model = ProcessBuilder::new("p")
        .start_event("start")
        .sub_process("sub")
        .enter("sub")
        .start_event("subStart")
        .event_sub_process("esp")
        .enter("esp")
        .event_start("espStart", EventDefinition::signal("stop"), true)
        .exit()
        .exit()
        .build();
    let process = Compiler::new().compile(model).expect("Compilation failed");

    // the returned elements borrow the process only
    let (start, esp_starts) = {
        let scope_id = String::from("sub");
        (process.none_start_event(&scope_id), process.event_sub_process_start_events(&scope_id))
    };

    assert_eq!(start.map(|s| s.id.as_str()), Some("subStart"));
    let esp_starts: Vec<&str> = esp_starts.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(esp_starts, vec!["espStart"]);
    assert_eq!(process.children_of("sub").len(), 2);
}
