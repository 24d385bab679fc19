mod common;

use instance_migration::Key;
use instance_migration::dsl::EventDefinition;
use instance_migration::dsl::builder::ProcessBuilder;
use instance_migration::migration::{MigrationCommand, MigrationError};
use instance_migration::runtime::Engine;
use instance_migration::runtime::records::RejectionType;
use proptest::prelude::*;
use serde_json::json;

const SOURCE_IDS: &[&str] = &["A", "B", "s1", "t1", "X"];
const TARGET_IDS: &[&str] = &["A2", "B2", "s2", "U", "Y"];

/// An instance waiting at two parallel tasks, one of them with a signal and a timer boundary
fn running_instance() -> (Engine, Key, Key) {
    let mut engine = Engine::with_clock(common::fixed_clock());
    engine
        .deploy(
            ProcessBuilder::new("process")
                .start_event("start")
                .parallel_gateway("fork")
                .service_task("A", "a")
                .boundary_event("s1", "A", EventDefinition::signal("cancel"))
                .non_interrupting_boundary_event("t1", "A", EventDefinition::timer("PT1H"))
                .service_task("B", "b")
                .connect("start", "fork")
                .connect("fork", "A")
                .connect("fork", "B")
                .build(),
        )
        .expect("deploy source");
    let target = engine
        .deploy(
            ProcessBuilder::new("process2")
                .start_event("start")
                .parallel_gateway("fork")
                .service_task("A2", "a")
                .boundary_event("s2", "A2", EventDefinition::signal("cancel"))
                .service_task("B2", "b")
                .user_task("U").build()
                .connect("start", "fork")
                .connect("fork", "A2")
                .connect("fork", "B2")
                .build(),
        )
        .expect("deploy target");
    let pi = engine.create_process_instance("process", json!({})).expect("create instance");
    (engine, pi, target.key)
}

fn command(pi: Key, target_key: Key, pairs: &[(usize, usize)]) -> MigrationCommand {
    pairs.iter().fold(MigrationCommand::new(pi, target_key), |command, (source, target)| {
        command.map(SOURCE_IDS[*source], TARGET_IDS[*target])
    })
}

/// A task with an error boundary and a target task with a timer boundary
fn error_and_timer_boundaries() -> (Engine, Key, Key) {
    let mut engine = Engine::new();
    engine
        .deploy(
            ProcessBuilder::new("process")
                .start_event("start")
                .service_task("A", "a")
                .boundary_event("error", "A", EventDefinition::error())
                .sequence(&["start", "A"])
                .build(),
        )
        .expect("deploy source");
    let target = engine
        .deploy(
            ProcessBuilder::new("process2")
                .start_event("start")
                .service_task("A2", "a")
                .boundary_event("timer", "A2", EventDefinition::timer("PT1H"))
                .sequence(&["start", "A2"])
                .build(),
        )
        .expect("deploy target");
    let pi = engine.create_process_instance("process", json!({})).expect("create instance");
    (engine, pi, target.key)
}

fn mapping_pairs() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0..SOURCE_IDS.len(), 0..TARGET_IDS.len()), 0..6)
}

proptest! {
    #[test]
    fn prop_validation_is_repeatable(pairs in mapping_pairs()) {
        let (engine, pi, target_key) = running_instance();
        let command = command(pi, target_key, &pairs);

        let first = engine.validate_migration(&command);
        let second = engine.validate_migration(&command);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_error_boundary_never_maps_to_timer_boundary(
        extra in prop::collection::vec(
            (prop_oneof![Just("A"), Just("start"), Just("error")], prop_oneof![Just("A2"), Just("start"), Just("timer")]),
            0..4,
        ),
        first in any::<bool>(),
    ) {
        let (engine, pi, target_key) = error_and_timer_boundaries();
        let mut command = MigrationCommand::new(pi, target_key);
        if first {
            command = command.map("error", "timer");
        }
        for (source, target) in &extra {
            command = command.map(source, target);
        }
        if !first {
            command = command.map("error", "timer");
        }

        let rejection = engine.validate_migration(&command).unwrap_err();
        prop_assert_eq!(rejection.rejection_type, RejectionType::InvalidArgument);
    }

    #[test]
    fn prop_migration_is_all_or_nothing(pairs in mapping_pairs()) {
        let (mut engine, pi, target_key) = running_instance();
        let before = engine.state().clone();
        let log_length = engine.records().len();

        match engine.migrate(command(pi, target_key, &pairs)) {
            Ok(()) => {
                for key in engine.state().instance_tree(pi) {
                    let instance = engine.state().instance(key).unwrap();
                    prop_assert_eq!(instance.record.process_definition_key, target_key);
                }
                prop_assert!(engine.records().len() > log_length + 2);
            }
            Err(MigrationError::Rejected(_)) => {
                prop_assert_eq!(engine.state(), &before);
                prop_assert_eq!(engine.records().len(), log_length + 2);
            }
            Err(MigrationError::SafetyCheckFailed(reason)) => {
                prop_assert!(false, "unexpected safety check failure: {}", reason);
            }
        }
    }
}

#[test]
fn test_full_mapping_is_accepted() {
    let (mut engine, pi, target_key) = running_instance();
    let command = MigrationCommand::new(pi, target_key)
        .map("A", "A2")
        .map("B", "B2")
        .map("s1", "s2");

    engine.migrate(command).expect("migration should be accepted");
    // the timer of the dropped boundary is canceled
    assert!(engine.state().timers.is_empty());
    assert_eq!(engine.state().signal_subscriptions.len(), 1);
}
