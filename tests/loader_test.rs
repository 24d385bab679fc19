use instance_migration::compiler::loader;
use instance_migration::dsl::builder::ProcessBuilder;
use instance_migration::dsl::EventDefinition;
use std::fs;

#[test]
fn test_load_process_from_yaml() {
    let yaml_content = r#"
id: "shipping"
name: "Shipping"
elements:
  - id: "start"
    type: "StartEvent"
  - id: "ship"
    type: "ServiceTask"
    job_type: "ship-parcel"
  - id: "cancel"
    type: "BoundaryEvent"
    attached_to: "ship"
    event:
      kind: "Signal"
      name: "cancel-order"
  - id: "end"
    type: "EndEvent"
flows:
  - source: "start"
    target: "ship"
  - source: "ship"
    target: "end"
"#;

    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("shipping.yaml");
    fs::write(&file_path, yaml_content).expect("Failed to write temp file");

    let loaded = loader::load_process_from_yaml(&file_path.to_string_lossy())
        .expect("Failed to load process from YAML");

    let expected = ProcessBuilder::new("shipping")
        .name("Shipping")
        .start_event("start")
        .service_task("ship", "ship-parcel")
        .boundary_event("cancel", "ship", EventDefinition::signal("cancel-order"))
        .end_event("end")
        .sequence(&["start", "ship", "end"])
        .build();

    assert_eq!(loaded, expected);

    // Cleanup
    temp_dir.close().expect("Failed to close temp dir");
}

#[test]
fn test_load_missing_file_fails_with_path() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("missing.yaml");

    let err = loader::load_process_from_yaml(&file_path.to_string_lossy()).unwrap_err();
    assert!(err.to_string().contains("missing.yaml"));
}

#[test]
fn test_load_rejects_unknown_element_type() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("broken.yaml");
    fs::write(&file_path, "id: p\nelements:\n  - { id: x, type: Teleporter }\n").expect("Failed to write temp file");

    assert!(loader::load_process_from_yaml(&file_path.to_string_lossy()).is_err());
}
