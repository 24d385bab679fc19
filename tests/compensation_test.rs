mod common;

use common::events;
use instance_migration::Key;
use instance_migration::dsl::builder::ProcessBuilder;
use instance_migration::dsl::{EventDefinition, ProcessModel};
use instance_migration::migration::MigrationCommand;
use instance_migration::runtime::Engine;
use instance_migration::runtime::records::{CompensationSubscriptionIntent, RejectionType};
use serde_json::json;

/// `activity` has a compensation boundary invoking `handler`; the instance waits at `next`
fn compensable(process_id: &str, activity: &str, boundary: &str, handler: &str, next: &str) -> ProcessModel {
    ProcessBuilder::new(process_id)
        .start_event("start")
        .service_task(activity, "book")
        .boundary_event(boundary, activity, EventDefinition::compensation(Some(handler)))
        .service_task(handler, "cancel-booking")
        .service_task(next, "pay")
        .end_event("end")
        .sequence(&["start", activity, next, "end"])
        .build()
}

/// Completes the compensable activity so the instance holds a compensation subscription
fn start_and_complete_activity(engine: &mut Engine) -> Key {
    let pi = engine.create_process_instance("process", json!({})).expect("create instance");
    let job_key = engine.job_key(pi, "A").unwrap();
    engine.complete_job(job_key, json!({})).expect("complete A");
    assert_eq!(engine.state().compensation_subscriptions_of(pi).len(), 1);
    pi
}

#[test]
fn test_compensation_subscription_is_migrated() {
    let mut engine = Engine::new();
    engine.deploy(compensable("process", "A", "compensate", "undo", "C")).expect("deploy source");
    let target = engine
        .deploy(compensable("process2", "A2", "compensate2", "undo2", "C2"))
        .expect("deploy target");
    let pi = start_and_complete_activity(&mut engine);
    let position = engine.records().last_position();

    engine
        .migrate(
            MigrationCommand::new(pi, target.key)
                .map("C", "C2")
                .map("A", "A2")
                .map("compensate", "compensate2"),
        )
        .expect("migration should be accepted");

    let migrated = events(engine.records().since(position), CompensationSubscriptionIntent::Migrated);
    assert_eq!(migrated.len(), 1);
    let subscription = migrated[0].value.as_compensation_subscription().unwrap();
    assert_eq!(subscription.compensable_activity_id, "A2");
    assert_eq!(subscription.compensation_handler_id.as_deref(), Some("undo2"));
    assert_eq!(subscription.process_definition_key, target.key);

    let stored = engine.state().compensation_subscriptions.values().next().unwrap();
    assert_eq!(stored.compensable_activity_id, "A2");
}

#[test]
fn test_mapped_boundary_migrates_completed_activity() {
    let mut engine = Engine::new();
    engine.deploy(compensable("process", "A", "compensate", "undo", "C")).expect("deploy source");
    let target = engine
        .deploy(compensable("process2", "A2", "compensate2", "undo2", "C2"))
        .expect("deploy target");
    let pi = start_and_complete_activity(&mut engine);
    let position = engine.records().last_position();

    // A is completed, only its boundary is mapped
    engine
        .migrate(MigrationCommand::new(pi, target.key).map("C", "C2").map("compensate", "compensate2"))
        .expect("migration should be accepted");
    let records = engine.records().since(position);

    assert!(events(records, CompensationSubscriptionIntent::Deleted).is_empty());
    let migrated = events(records, CompensationSubscriptionIntent::Migrated);
    assert_eq!(migrated.len(), 1);
    let subscription = migrated[0].value.as_compensation_subscription().unwrap();
    assert_eq!(subscription.compensable_activity_id, "A2");
    assert_eq!(subscription.compensation_handler_id.as_deref(), Some("undo2"));
    assert_eq!(engine.state().compensation_subscriptions_of(pi).len(), 1);
}

#[test]
fn test_enclosing_sub_process_subscription_follows_boundary() {
    fn nested(process_id: &str, sub: &str, activity: &str, boundary: &str, handler: &str, next: &str) -> ProcessModel {
        ProcessBuilder::new(process_id)
            .start_event("start")
            .sub_process(sub)
            .enter(sub)
            .start_event("subStart")
            .service_task(activity, "book")
            .boundary_event(boundary, activity, EventDefinition::compensation(Some(handler)))
            .service_task(handler, "cancel-booking")
            .sequence(&["subStart", activity])
            .exit()
            .service_task(next, "pay")
            .end_event("end")
            .sequence(&["start", sub, next, "end"])
            .build()
    }

    // 1. Complete A, which also completes the sub-process around it
    let mut engine = Engine::new();
    engine.deploy(nested("process", "sub", "A", "compensate", "undo", "C")).expect("deploy source");
    let target = engine
        .deploy(nested("process2", "sub2", "A2", "compensate2", "undo2", "C2"))
        .expect("deploy target");
    let pi = engine.create_process_instance("process", json!({})).expect("create instance");
    let job_key = engine.job_key(pi, "A").unwrap();
    engine.complete_job(job_key, json!({})).expect("complete A");
    assert!(engine.element_instance_key(pi, "C").is_some());
    assert_eq!(engine.state().compensation_subscriptions_of(pi).len(), 2);
    let position = engine.records().last_position();

    // 2. Map the waiting task and the boundary only
    engine
        .migrate(MigrationCommand::new(pi, target.key).map("C", "C2").map("compensate", "compensate2"))
        .expect("migration should be accepted");
    let records = engine.records().since(position);

    assert!(events(records, CompensationSubscriptionIntent::Deleted).is_empty());
    let mut migrated: Vec<_> = events(records, CompensationSubscriptionIntent::Migrated)
        .into_iter()
        .filter_map(|r| r.value.as_compensation_subscription())
        .map(|s| (s.compensable_activity_id.clone(), s.compensation_handler_id.clone()))
        .collect();
    migrated.sort();
    assert_eq!(
        migrated,
        vec![("A2".to_string(), Some("undo2".to_string())), ("sub2".to_string(), None)]
    );
}

#[test]
fn test_unmapped_compensation_subscription_is_deleted() {
    let mut engine = Engine::new();
    engine.deploy(compensable("process", "A", "compensate", "undo", "C")).expect("deploy source");
    let target = engine
        .deploy(compensable("process2", "A2", "compensate2", "undo2", "C2"))
        .expect("deploy target");
    let pi = start_and_complete_activity(&mut engine);
    let position = engine.records().last_position();

    engine
        .migrate(MigrationCommand::new(pi, target.key).map("C", "C2"))
        .expect("migration should be accepted");

    assert_eq!(events(engine.records().since(position), CompensationSubscriptionIntent::Deleted).len(), 1);
    assert!(engine.state().compensation_subscriptions_of(pi).is_empty());
}

#[test]
fn test_compensation_boundary_cannot_change_depth() {
    let mut engine = Engine::new();
    engine.deploy(compensable("process", "A", "compensate", "undo", "C")).expect("deploy source");
    let target = engine
        .deploy(
            ProcessBuilder::new("process2")
                .start_event("start")
                .sub_process("sub")
                .enter("sub")
                .start_event("subStart")
                .service_task("A2", "book")
                .boundary_event("compensate2", "A2", EventDefinition::compensation(Some("undo2")))
                .service_task("undo2", "cancel-booking")
                .sequence(&["subStart", "A2"])
                .exit()
                .service_task("C2", "pay")
                .end_event("end")
                .sequence(&["start", "sub", "C2", "end"])
                .build(),
        )
        .expect("deploy target");
    let pi = start_and_complete_activity(&mut engine);
    let before = engine.state().clone();

    let err = engine
        .migrate(
            MigrationCommand::new(pi, target.key)
                .map("C", "C2")
                .map("compensate", "compensate2"),
        )
        .expect_err("migration should be rejected");
    let rejection = err.rejection().unwrap();

    assert_eq!(rejection.rejection_type, RejectionType::InvalidState);
    assert!(rejection.reason.contains("Flow scope 'process' is not in the same level as 'sub'"));
    assert_eq!(engine.state(), &before);
}
