use instance_migration::runtime::records::RejectionType;
use instance_migration::scenario::{Scenario, Step};
use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

#[test]
fn test_scenario_file_with_steps_before_and_after() {
    let yaml_content = r#"
clock: 2026-01-01T00:00:00Z
processes:
  - id: order
    elements:
      - { id: start, type: StartEvent }
      - { id: A, type: ServiceTask, job_type: pick }
      - { id: B, type: ServiceTask, job_type: pack }
      - { id: end, type: EndEvent }
    flows:
      - { source: start, target: A }
      - { source: A, target: B }
      - { source: B, target: end }
  - id: order-v2
    elements:
      - { id: start, type: StartEvent }
      - { id: B2, type: ServiceTask, job_type: pack }
      - { id: end, type: EndEvent }
    flows:
      - { source: start, target: B2 }
      - { source: B2, target: end }
instance:
  process_id: order
steps:
  - set_variables: { variables: { weight: 3 } }
  - complete_job: { element: A }
migrate:
  target: order-v2
  mappings:
    - { source: B, target: B2 }
after:
  - advance_clock: { seconds: 60 }
  - complete_job: { element: B2, variables: { packed: true } }
"#;

    // 1. Write the scenario to disk and load it back
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("order.yaml");
    fs::write(&file_path, yaml_content).expect("Failed to write temp file");
    let scenario = Scenario::load(&file_path).expect("Failed to load scenario");

    // 2. Steps on both sides of the migration are parsed
    assert_eq!(
        scenario.steps,
        vec![
            Step::SetVariables { element: None, variables: json!({"weight": 3}) },
            Step::CompleteJob { element: "A".into(), variables: Value::Null },
        ]
    );
    assert_eq!(
        scenario.after,
        vec![
            Step::AdvanceClock { seconds: 60 },
            Step::CompleteJob { element: "B2".into(), variables: json!({"packed": true}) },
        ]
    );

    // 3. Running it migrates and finishes the instance
    let report = scenario.run().expect("Failed to run scenario");
    assert!(report.migrated);
    assert!(report.rejection_type.is_none());
    assert!(!report.active);
}

#[test]
fn test_demo_scenarios_run() {
    let report = Scenario::load(demo("service_task.yaml"))
        .expect("load service_task demo")
        .run()
        .expect("run service_task demo");
    assert!(report.migrated);
    // the instance moved on to C of the new definition
    assert!(report.active);

    let report = Scenario::load(demo("signal_boundary.yaml"))
        .expect("load signal_boundary demo")
        .run()
        .expect("run signal_boundary demo");
    assert!(report.migrated);
    assert!(!report.active);

    let report = Scenario::load(demo("unmapped_user_task.yaml"))
        .expect("load unmapped_user_task demo")
        .run()
        .expect("run unmapped_user_task demo");
    assert!(!report.migrated);
    assert_eq!(report.rejection_type, Some(RejectionType::InvalidState));
    assert!(report.reason.unwrap().contains("'review'"));
}
