use instance_migration::compiler::expander::Expander;
use instance_migration::compiler::Compiler;
use instance_migration::dsl::builder::ProcessBuilder;
use instance_migration::dsl::ElementKind;
use instance_migration::runtime::definition::BpmnElementType;

#[test]
fn test_expand_ad_hoc_sub_process() {
    let model = ProcessBuilder::new("p")
        .start_event("start")
        .ad_hoc_sub_process("adHoc")
        .enter("adHoc")
        .service_task("A", "a")
        .service_task("B", "b")
        .exit()
        .end_event("end")
        .sequence(&["start", "adHoc", "end"])
        .build();

    let expanded = Expander::new().expand(model).expect("Expansion failed");

    // the inner instance follows its ad-hoc sub-process
    let ids: Vec<&str> = expanded.elements.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["start", "adHoc", "adHoc#innerInstance", "A", "B", "end"]);

    let inner = &expanded.elements[2];
    assert_eq!(inner.scope.as_deref(), Some("adHoc"));
    assert_eq!(inner.kind, ElementKind::AdHocSubProcessInnerInstance);

    for id in ["A", "B"] {
        let element = expanded.elements.iter().find(|e| e.id == id).unwrap();
        assert_eq!(element.scope.as_deref(), Some("adHoc#innerInstance"));
    }
    assert_eq!(expanded.flows.len(), 2);
}

#[test]
fn test_expanded_model_compiles_to_nested_scopes() {
    let model = ProcessBuilder::new("p")
        .start_event("start")
        .ad_hoc_sub_process("adHoc")
        .enter("adHoc")
        .service_task("A", "a")
        .exit()
        .build();

    let process = Compiler::new().compile(model).expect("Compilation failed");

    let inner = process.element("adHoc#innerInstance").unwrap();
    assert_eq!(inner.element_type, BpmnElementType::AdHocSubProcessInnerInstance);
    assert_eq!(inner.flow_scope.as_deref(), Some("adHoc"));
    assert_eq!(process.element("A").unwrap().flow_scope.as_deref(), Some("adHoc#innerInstance"));
    assert_eq!(process.depth("A"), 3);
}

#[test]
fn test_inner_instance_cannot_be_declared() {
    let model = ProcessBuilder::new("p")
        .start_event("start")
        .element("hidden", ElementKind::AdHocSubProcessInnerInstance)
        .build();

    let err = Expander::new().expand(model).unwrap_err();
    assert!(err.to_string().contains("internal element type"));
}

#[test]
fn test_models_without_ad_hoc_are_unchanged() {
    let model = ProcessBuilder::new("p")
        .start_event("start")
        .service_task("A", "a")
        .sequence(&["start", "A"])
        .build();

    let expanded = Expander::new().expand(model.clone()).expect("Expansion failed");
    assert_eq!(expanded, model);
}
