use super::common::*;
use chrono::Duration;
use std::sync::Arc;
use std::thread;

use crate::assignment::domain::MeetingType;
use crate::assignment::policy::{
    AssignmentPolicy, MeetingTypePriorities, PolicyError, PolicyMode, PolicyStore, PolicyUpdate,
    PolicyWeights, PriorityUpdate,
};

fn custom_store() -> PolicyStore {
    let store = PolicyStore::default();
    store
        .update(
            &PolicyUpdate {
                mode: Some(PolicyMode::Custom),
                fairness_window_days: Some(45),
                max_gap_hours: Some(7.5),
                w_fair: Some(3.3),
                w_urgency: Some(0.1),
                w_lrs: Some(4.0),
                dr_consecutive_penalty: Some(-1.9),
                ..PolicyUpdate::default()
            },
            now(),
        )
        .expect("custom weights accepted");
    store
}

#[test]
fn named_modes_always_yield_their_exact_preset() {
    let expected = [
        (
            PolicyMode::Balance,
            PolicyWeights {
                fairness_window_days: 60,
                max_gap_hours: 2.0,
                w_fair: 2.0,
                w_urgency: 0.6,
                w_lrs: 0.6,
                dr_consecutive_penalty: -0.8,
            },
        ),
        (
            PolicyMode::Urgent,
            PolicyWeights {
                fairness_window_days: 14,
                max_gap_hours: 10.0,
                w_fair: 0.5,
                w_urgency: 2.5,
                w_lrs: 0.2,
                dr_consecutive_penalty: -0.1,
            },
        ),
        (
            PolicyMode::Normal,
            PolicyWeights {
                fairness_window_days: 30,
                max_gap_hours: 5.0,
                w_fair: 1.2,
                w_urgency: 0.8,
                w_lrs: 0.3,
                dr_consecutive_penalty: -0.5,
            },
        ),
    ];

    for (mode, weights) in expected {
        let store = custom_store();
        let policy = store
            .update(&PolicyUpdate::mode(mode), now())
            .expect("mode switch accepted");
        assert_eq!(policy.mode, mode);
        assert_eq!(policy.weights, weights, "{mode} preset");
    }
}

#[test]
fn switching_custom_to_urgent_resets_every_weight_in_one_update() {
    let store = custom_store();

    store
        .update(&PolicyUpdate::mode(PolicyMode::Urgent), now())
        .expect("switch accepted");

    let loaded = store.load();
    assert_eq!(loaded.mode, PolicyMode::Urgent);
    assert_eq!(Some(loaded.weights), PolicyMode::Urgent.preset());
}

#[test]
fn preset_overrides_weights_sent_with_the_mode_change() {
    let store = custom_store();
    let policy = store
        .update(
            &PolicyUpdate {
                mode: Some(PolicyMode::Balance),
                w_fair: Some(0.1),
                max_gap_hours: Some(50.0),
                ..PolicyUpdate::default()
            },
            now(),
        )
        .expect("mode change accepted");

    assert_eq!(Some(policy.weights), PolicyMode::Balance.preset());
}

#[test]
fn weight_edits_are_rejected_while_a_preset_is_active() {
    let store = PolicyStore::default();
    let before = store.load();

    let err = store
        .update(
            &PolicyUpdate {
                w_fair: Some(1.0),
                ..PolicyUpdate::default()
            },
            now(),
        )
        .expect_err("locked mode");

    assert_eq!(
        err,
        PolicyError::ModeLocked {
            mode: PolicyMode::Normal
        }
    );
    assert_eq!(*store.load(), *before);
}

#[test]
fn custom_mode_updates_fields_independently() {
    let store = custom_store();
    let before = store.load();

    let after = store
        .update(
            &PolicyUpdate {
                w_lrs: Some(0.9),
                ..PolicyUpdate::default()
            },
            now(),
        )
        .expect("custom edit accepted");

    assert_eq!(after.weights.w_lrs, 0.9);
    assert_eq!(
        PolicyWeights {
            w_lrs: before.weights.w_lrs,
            ..after.weights
        },
        before.weights
    );
}

#[test]
fn out_of_range_update_is_not_partially_applied() {
    let store = custom_store();
    let before = store.load();

    let err = store
        .update(
            &PolicyUpdate {
                w_fair: Some(1.5),
                dr_consecutive_penalty: Some(0.5),
                ..PolicyUpdate::default()
            },
            now(),
        )
        .expect_err("positive penalty rejected");

    assert!(matches!(
        err,
        PolicyError::OutOfRange {
            field: "dr_consecutive_penalty",
            ..
        }
    ));
    let after = store.load();
    assert_eq!(after.weights.w_fair, before.weights.w_fair);
    assert_eq!(after.version, before.version);
}

#[test]
fn successful_updates_bump_version_and_timestamp() {
    let store = PolicyStore::default();
    assert_eq!(store.load().version, 1);

    let later = now() + Duration::hours(2);
    let policy = store
        .update(
            &PolicyUpdate {
                auto_assign_enabled: Some(false),
                ..PolicyUpdate::default()
            },
            later,
        )
        .expect("toggle accepted");

    assert_eq!(policy.version, 2);
    assert_eq!(policy.updated_at, Some(later));
    assert!(!store.load().auto_assign_enabled);
}

#[test]
fn readers_never_observe_a_half_written_policy() {
    let store = Arc::new(PolicyStore::new(
        AssignmentPolicy::from_mode(PolicyMode::Balance),
        MeetingTypePriorities::standard(),
    ));
    let presets = [
        PolicyMode::Balance.preset().expect("preset"),
        PolicyMode::Urgent.preset().expect("preset"),
    ];

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for round in 0..500 {
                let mode = if round % 2 == 0 {
                    PolicyMode::Urgent
                } else {
                    PolicyMode::Balance
                };
                store
                    .update(&PolicyUpdate::mode(mode), now())
                    .expect("switch accepted");
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..500 {
                    let policy = store.load();
                    assert!(presets.contains(&policy.weights), "torn read: {policy:?}");
                    assert_eq!(Some(policy.weights), policy.mode.preset());
                }
            })
        })
        .collect();

    writer.join().expect("writer finished");
    for reader in readers {
        reader.join().expect("reader finished");
    }
}

#[test]
fn priority_thresholds_must_stay_ordered() {
    let store = PolicyStore::default();

    let err = store
        .update_priority(
            MeetingType::General,
            PriorityUpdate {
                urgent_threshold_days: Some(30),
                ..PriorityUpdate::default()
            },
        )
        .expect_err("urgent must stay below general");

    assert!(matches!(
        err,
        PolicyError::InconsistentThresholds {
            meeting_type: MeetingType::General,
            urgent_threshold_days: 30,
            general_threshold_days: 30,
        }
    ));
    assert_eq!(
        store.priorities().get(MeetingType::General).urgent_threshold_days,
        10
    );
}

#[test]
fn priority_update_replaces_only_the_named_row() {
    let store = PolicyStore::default();

    let row = store
        .update_priority(
            MeetingType::Weekly,
            PriorityUpdate {
                priority_value: Some(6),
                general_threshold_days: Some(21),
                ..PriorityUpdate::default()
            },
        )
        .expect("valid update");

    assert_eq!(row.priority_value, 6);
    assert_eq!(row.urgent_threshold_days, 3);
    assert_eq!(row.general_threshold_days, 21);
    let table = store.priorities();
    assert_eq!(table.get(MeetingType::Weekly), row);
    assert_eq!(
        table.get(MeetingType::Dr),
        MeetingTypePriorities::standard().get(MeetingType::Dr)
    );
}
