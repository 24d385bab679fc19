mod common;

use chrono::TimeDelta;
use common::{commands, events, fixed_clock, position_of};
use instance_migration::dsl::EventDefinition;
use instance_migration::dsl::builder::ProcessBuilder;
use instance_migration::migration::MigrationCommand;
use instance_migration::runtime::Engine;
use instance_migration::runtime::records::{
    MessageSubscriptionIntent, ProcessInstanceMigrationIntent, ProcessMessageSubscriptionIntent,
    RecordType, RejectionType, SignalSubscriptionIntent, TimerIntent,
};
use instance_migration::runtime::state::ElementState;
use serde_json::json;

/// Service task `task_id` with the given boundary events, each leading to its own end event
fn task_with_boundaries(process_id: &str, task_id: &str, boundaries: &[(&str, EventDefinition)]) -> ProcessBuilder {
    let mut builder = ProcessBuilder::new(process_id)
        .start_event("start")
        .service_task(task_id, "work")
        .end_event("end")
        .sequence(&["start", task_id, "end"]);
    for (id, event) in boundaries {
        let end_id = format!("{}End", id);
        builder = builder
            .boundary_event(id, task_id, event.clone())
            .end_event(&end_id)
            .connect(id, &end_id);
    }
    builder
}

#[test]
fn test_signal_subscriptions_are_migrated_and_deleted() {
    let mut engine = Engine::new();
    engine
        .deploy(
            task_with_boundaries(
                "process",
                "A",
                &[("s1", EventDefinition::signal("cancel")), ("s2", EventDefinition::signal("abort"))],
            )
            .build(),
        )
        .expect("deploy source");
    let target = engine
        .deploy(task_with_boundaries("process2", "B", &[("t1", EventDefinition::signal("cancel"))]).build())
        .expect("deploy target");
    let pi = engine.create_process_instance("process", json!({})).expect("create instance");
    let position = engine.records().last_position();

    engine
        .migrate(MigrationCommand::new(pi, target.key).map("A", "B").map("s1", "t1"))
        .expect("migration should be accepted");
    let records = engine.records().since(position);

    let deleted = events(records, SignalSubscriptionIntent::Deleted);
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].value.as_signal_subscription().unwrap().catch_event_id, "s2");

    let migrated = events(records, SignalSubscriptionIntent::Migrated);
    assert_eq!(migrated.len(), 1);
    let subscription = migrated[0].value.as_signal_subscription().unwrap();
    assert_eq!(subscription.catch_event_id, "t1");
    assert_eq!(subscription.signal_name, "cancel");
    assert_eq!(subscription.bpmn_process_id, "process2");

    // deletions come before migrations
    assert!(
        position_of(records, RecordType::Event, SignalSubscriptionIntent::Deleted)
            < position_of(records, RecordType::Event, SignalSubscriptionIntent::Migrated)
    );

    // the dropped signal no longer reaches the instance
    engine.broadcast_signal("abort", json!({})).expect("broadcast abort");
    assert!(engine.is_active(pi));

    engine.broadcast_signal("cancel", json!({})).expect("broadcast cancel");
    assert!(!engine.is_active(pi));
    assert_eq!(engine.state().signal_subscriptions.len(), 0);
}

#[test]
fn test_new_signal_boundary_is_subscribed() {
    let mut engine = Engine::new();
    engine.deploy(task_with_boundaries("process", "A", &[]).build()).expect("deploy source");
    let target = engine
        .deploy(task_with_boundaries("process2", "B", &[("stop", EventDefinition::signal("stop"))]).build())
        .expect("deploy target");
    let pi = engine.create_process_instance("process", json!({})).expect("create instance");
    let task_key = engine.element_instance_key(pi, "A").unwrap();
    let position = engine.records().last_position();

    engine
        .migrate(MigrationCommand::new(pi, target.key).map("A", "B"))
        .expect("migration should be accepted");

    let created = events(engine.records().since(position), SignalSubscriptionIntent::Created);
    assert_eq!(created.len(), 1);
    let subscription = created[0].value.as_signal_subscription().unwrap();
    assert_eq!(subscription.catch_event_id, "stop");
    assert_eq!(subscription.catch_event_instance_key, task_key);
    assert_eq!(subscription.process_definition_key, target.key);

    engine.broadcast_signal("stop", json!({})).expect("broadcast stop");
    assert!(!engine.is_active(pi));
}

#[test]
fn test_message_subscription_is_migrated_on_both_sides() {
    let mut engine = Engine::new();
    engine
        .deploy(task_with_boundaries("process", "A", &[("m1", EventDefinition::message("msg", "key"))]).build())
        .expect("deploy source");
    let target = engine
        .deploy(task_with_boundaries("process2", "B", &[("m2", EventDefinition::message("msg", "key"))]).build())
        .expect("deploy target");
    let pi = engine.create_process_instance("process", json!({"key": "k1"})).expect("create instance");
    let position = engine.records().last_position();

    engine
        .migrate(MigrationCommand::new(pi, target.key).map("A", "B").map("m1", "m2"))
        .expect("migration should be accepted");
    let records = engine.records().since(position);

    let migrated = events(records, ProcessMessageSubscriptionIntent::Migrated);
    assert_eq!(migrated.len(), 1);
    let subscription = migrated[0].value.as_process_message_subscription().unwrap();
    assert_eq!(subscription.element_id, "m2");
    assert_eq!(subscription.correlation_key, "k1");
    assert_eq!(subscription.bpmn_process_id, "process2");
    assert_eq!(subscription.process_definition_key, target.key);

    // the message side follows after the migration is written
    let migration_done = position_of(records, RecordType::Event, ProcessInstanceMigrationIntent::Migrated).unwrap();
    let migrate_command = position_of(records, RecordType::Command, MessageSubscriptionIntent::Migrate).unwrap();
    let message_side = position_of(records, RecordType::Event, MessageSubscriptionIntent::Migrated).unwrap();
    assert!(migration_done < migrate_command);
    assert!(migrate_command < message_side);
    let message_subscription = engine.state().message_subscriptions.values().next().unwrap();
    assert_eq!(message_subscription.bpmn_process_id, "process2");

    engine
        .publish_message("msg", "k1", TimeDelta::zero(), json!({}))
        .expect("publish message");
    assert!(!engine.is_active(pi));
}

#[test]
fn test_unmapped_message_subscription_is_deleted_on_both_sides() {
    let mut engine = Engine::new();
    engine
        .deploy(task_with_boundaries("process", "A", &[("m1", EventDefinition::message("msg", "key"))]).build())
        .expect("deploy source");
    let target = engine.deploy(task_with_boundaries("process2", "B", &[]).build()).expect("deploy target");
    let pi = engine.create_process_instance("process", json!({"key": "k1"})).expect("create instance");
    let position = engine.records().last_position();

    engine
        .migrate(MigrationCommand::new(pi, target.key).map("A", "B"))
        .expect("migration should be accepted");
    let records = engine.records().since(position);

    assert_eq!(events(records, ProcessMessageSubscriptionIntent::Deleted).len(), 1);
    assert_eq!(commands(records, MessageSubscriptionIntent::Delete).len(), 1);
    assert_eq!(events(records, MessageSubscriptionIntent::Deleted).len(), 1);
    assert!(engine.state().process_message_subscriptions.is_empty());
    assert!(engine.state().message_subscriptions.is_empty());

    // nothing waits for the message any more
    engine
        .publish_message("msg", "k1", TimeDelta::zero(), json!({}))
        .expect("publish message");
    assert!(engine.is_active(pi));
}

#[test]
fn test_new_message_subscription_is_opened_after_migration() {
    let mut engine = Engine::new();
    engine.deploy(task_with_boundaries("process", "A", &[]).build()).expect("deploy source");
    let target = engine
        .deploy(task_with_boundaries("process2", "B", &[("m2", EventDefinition::message("msg", "key"))]).build())
        .expect("deploy target");
    let pi = engine.create_process_instance("process", json!({"key": 7})).expect("create instance");
    let position = engine.records().last_position();

    engine
        .migrate(MigrationCommand::new(pi, target.key).map("A", "B"))
        .expect("migration should be accepted");
    let records = engine.records().since(position);

    let migration_done = position_of(records, RecordType::Event, ProcessInstanceMigrationIntent::Migrated).unwrap();
    let created = position_of(records, RecordType::Event, ProcessMessageSubscriptionIntent::Created).unwrap();
    let create_command = position_of(records, RecordType::Command, MessageSubscriptionIntent::Create).unwrap();
    let message_side = position_of(records, RecordType::Event, MessageSubscriptionIntent::Created).unwrap();
    assert!(migration_done < created);
    assert!(created < create_command);
    assert!(create_command < message_side);

    // numbers are correlation keys too
    let subscription = records[created].value.as_process_message_subscription().unwrap();
    assert_eq!(subscription.correlation_key, "7");

    engine
        .publish_message("msg", "7", TimeDelta::zero(), json!({}))
        .expect("publish message");
    assert!(!engine.is_active(pi));
}

#[test]
fn test_unresolvable_correlation_key_is_rejected() {
    let mut engine = Engine::new();
    engine.deploy(task_with_boundaries("process", "A", &[]).build()).expect("deploy source");
    let target = engine
        .deploy(task_with_boundaries("process2", "B", &[("m2", EventDefinition::message("msg", "orderId"))]).build())
        .expect("deploy target");
    let pi = engine.create_process_instance("process", json!({})).expect("create instance");

    let err = engine
        .migrate(MigrationCommand::new(pi, target.key).map("A", "B"))
        .expect_err("migration should be rejected");
    let rejection = err.rejection().unwrap();

    assert_eq!(rejection.rejection_type, RejectionType::InvalidState);
    assert!(rejection.reason.contains("must be subscribed to a catch event with id 'm2'"));
    assert!(rejection.reason.contains("expected variable 'orderId' to be a string or a number"));
}

#[test]
fn test_second_subscription_to_same_message_is_rejected() {
    let mut engine = Engine::new();
    engine
        .deploy(task_with_boundaries("process", "A", &[("m1", EventDefinition::message("msg", "key"))]).build())
        .expect("deploy source");
    let target = engine
        .deploy(
            task_with_boundaries(
                "process2",
                "B",
                &[("m2", EventDefinition::message("msg", "key")), ("m3", EventDefinition::message("msg", "key"))],
            )
            .build(),
        )
        .expect("deploy target");
    let pi = engine.create_process_instance("process", json!({"key": "k1"})).expect("create instance");

    let err = engine
        .migrate(MigrationCommand::new(pi, target.key).map("A", "B").map("m1", "m2"))
        .expect_err("migration should be rejected");
    let rejection = err.rejection().unwrap();

    assert_eq!(rejection.rejection_type, RejectionType::InvalidState);
    assert!(rejection.reason.contains("already subscribed to with name 'msg'"));
    assert!(rejection.reason.contains("message catch event with id 'm3'"));
}

#[test]
fn test_migrated_timer_keeps_its_due_date() {
    let mut engine = Engine::with_clock(fixed_clock());
    engine
        .deploy(task_with_boundaries("process", "A", &[("t1", EventDefinition::timer("PT1H"))]).build())
        .expect("deploy source");
    let target = engine
        .deploy(task_with_boundaries("process2", "B", &[("t2", EventDefinition::timer("PT10M"))]).build())
        .expect("deploy target");
    let pi = engine.create_process_instance("process", json!({})).expect("create instance");
    let due_date = (fixed_clock() + TimeDelta::hours(1)).timestamp_millis();

    engine.advance_clock(TimeDelta::minutes(20)).expect("advance clock");
    let position = engine.records().last_position();
    engine
        .migrate(MigrationCommand::new(pi, target.key).map("A", "B").map("t1", "t2"))
        .expect("migration should be accepted");

    let migrated = events(engine.records().since(position), TimerIntent::Migrated);
    assert_eq!(migrated.len(), 1);
    let timer = migrated[0].value.as_timer().unwrap();
    assert_eq!(timer.target_element_id, "t2");
    assert_eq!(timer.due_date, due_date);
    assert_eq!(timer.process_definition_key, target.key);

    // the target's shorter interval does not apply
    engine.advance_clock(TimeDelta::minutes(20)).expect("advance clock");
    assert!(engine.is_active(pi));

    engine.advance_clock(TimeDelta::minutes(20)).expect("advance clock");
    assert!(!engine.is_active(pi));
    assert!(engine.state().find_instance(pi, "B").is_none());
}

#[test]
fn test_new_timer_is_due_from_migration_time() {
    let mut engine = Engine::with_clock(fixed_clock());
    engine.deploy(task_with_boundaries("process", "A", &[]).build()).expect("deploy source");
    let target = engine
        .deploy(task_with_boundaries("process2", "B", &[("t2", EventDefinition::timer("PT10M"))]).build())
        .expect("deploy target");
    let pi = engine.create_process_instance("process", json!({})).expect("create instance");

    engine.advance_clock(TimeDelta::minutes(5)).expect("advance clock");
    let position = engine.records().last_position();
    engine
        .migrate(MigrationCommand::new(pi, target.key).map("A", "B"))
        .expect("migration should be accepted");

    let created = events(engine.records().since(position), TimerIntent::Created);
    assert_eq!(created.len(), 1);
    let timer = created[0].value.as_timer().unwrap();
    assert_eq!(timer.due_date, (fixed_clock() + TimeDelta::minutes(15)).timestamp_millis());
    assert_eq!(timer.repetitions, 1);
}

#[test]
fn test_timer_due_out_of_range_is_rejected() {
    let mut engine = Engine::with_clock(fixed_clock());
    engine.deploy(task_with_boundaries("process", "A", &[]).build()).expect("deploy source");
    let target = engine
        .deploy(
            task_with_boundaries("process2", "B", &[("t2", EventDefinition::timer("PT9223372036854775S"))]).build(),
        )
        .expect("deploy target");
    let pi = engine.create_process_instance("process", json!({})).expect("create instance");
    let before = engine.state().clone();

    let err = engine
        .migrate(MigrationCommand::new(pi, target.key).map("A", "B"))
        .expect_err("migration should be rejected");
    let rejection = err.rejection().unwrap();

    assert_eq!(rejection.rejection_type, RejectionType::InvalidState);
    assert!(rejection.reason.contains("timer catch event with id 't2' and its due date is out of range"));
    assert_eq!(engine.state(), &before);
}

#[test]
fn test_message_time_to_live_out_of_range_is_an_error() {
    let mut engine = Engine::with_clock(fixed_clock());
    let log_length = engine.records().len();

    let result = engine.publish_message("msg", "k1", TimeDelta::milliseconds(i64::MAX), json!({}));

    assert!(result.is_err());
    assert_eq!(engine.records().len(), log_length);
}

#[test]
fn test_interrupted_scope_gets_no_new_subscriptions() {
    let model = |process_id: &str, esp: &str, task: &str| {
        ProcessBuilder::new(process_id)
            .start_event("start")
            .service_task("A", "work")
            .sequence(&["start", "A"])
            .event_sub_process(esp)
            .enter(esp)
            .event_start("espStart", EventDefinition::signal("interrupt"), true)
            .service_task(task, "cleanup")
            .end_event("espEnd")
            .sequence(&["espStart", task, "espEnd"])
            .exit()
            .build()
    };
    let mut engine = Engine::new();
    engine.deploy(model("process", "esp", "E")).expect("deploy source");
    let target = engine.deploy(model("process2", "esp2", "E2")).expect("deploy target");
    let pi = engine.create_process_instance("process", json!({})).expect("create instance");

    engine.broadcast_signal("interrupt", json!({})).expect("broadcast interrupt");
    assert!(engine.state().instance(pi).unwrap().interrupted);
    assert!(engine.element_instance_key(pi, "E").is_some());
    let position = engine.records().last_position();

    engine
        .migrate(MigrationCommand::new(pi, target.key).map("esp", "esp2").map("E", "E2"))
        .expect("migration should be accepted");
    let records = engine.records().since(position);

    assert!(events(records, SignalSubscriptionIntent::Created).is_empty());
    assert!(engine.state().signal_subscriptions.is_empty());
    assert_eq!(common::migrated_element_ids(records), vec!["process2", "esp2", "E2"]);
}

#[test]
fn test_activating_element_keeps_subscriptions_untouched() {
    let mut engine = Engine::new();
    engine
        .deploy(task_with_boundaries("process", "A", &[("s1", EventDefinition::signal("cancel"))]).build())
        .expect("deploy source");
    let target = engine
        .deploy(task_with_boundaries("process2", "B", &[("t1", EventDefinition::timer("PT1H"))]).build())
        .expect("deploy target");
    let pi = engine.create_process_instance("process", json!({})).expect("create instance");
    let task_key = engine.element_instance_key(pi, "A").unwrap();
    engine.state_mut().instance_mut(task_key).unwrap().state = ElementState::Activating;
    let position = engine.records().last_position();

    let plan = engine
        .validate_migration(&MigrationCommand::new(pi, target.key).map("A", "B"))
        .expect("plan");
    let task_plan = plan.elements.iter().find(|e| e.element_instance_key == task_key).unwrap();
    assert!(task_plan.activating);
    assert!(task_plan.catch_events.is_empty());

    engine
        .migrate(MigrationCommand::new(pi, target.key).map("A", "B"))
        .expect("migration should be accepted");
    let records = engine.records().since(position);

    assert!(events(records, SignalSubscriptionIntent::Deleted).is_empty());
    assert!(events(records, TimerIntent::Created).is_empty());
    assert_eq!(engine.state().signal_subscriptions.len(), 1);
}
