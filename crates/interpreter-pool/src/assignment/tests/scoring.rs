use super::common::*;
use chrono::Duration;

use crate::assignment::domain::{AssignmentRecord, BookingId, Interpreter, InterpreterId, MeetingType};
use crate::assignment::policy::{AssignmentPolicy, MeetingTypePriorities, PolicyMode};
use crate::assignment::scoring::{
    rank_candidates, score, CandidateScore, ExclusionReason, ScoringContext, WorkloadHistory,
};

fn history(policy: &AssignmentPolicy, records: Vec<AssignmentRecord>) -> WorkloadHistory {
    WorkloadHistory::from_assignments(
        records,
        &interpreters(),
        WorkloadHistory::window_start(now(), policy),
    )
}

fn ranked_ids(ranked: &[CandidateScore]) -> Vec<&str> {
    ranked
        .iter()
        .map(|candidate| candidate.interpreter_id.0.as_str())
        .collect()
}

fn find<'a>(ranked: &'a [CandidateScore], id: &str) -> &'a CandidateScore {
    ranked
        .iter()
        .find(|candidate| candidate.interpreter_id.0 == id)
        .expect("candidate scored")
}

#[test]
fn total_combines_weighted_terms() {
    let policy = AssignmentPolicy::from_mode(PolicyMode::Normal);
    let history = history(
        &policy,
        vec![
            past_assignment("int-a", MeetingType::General, 10, 4),
            past_assignment("int-c", MeetingType::General, 20, 2),
        ],
    );
    let booking = booking("b-1", MeetingType::General, 20.0, 2);
    let priority = MeetingTypePriorities::standard().get(MeetingType::General);
    let context = ScoringContext {
        booking: &booking,
        priority: &priority,
        policy: &policy,
        history: &history,
        now: now(),
    };

    let ranked = rank_candidates(&context, &interpreters());

    let idle = find(&ranked, "int-b");
    assert_close(idle.fairness, 0.4);
    assert_close(idle.urgency, 0.5);
    assert_close(idle.rotation, 1.0);
    assert_close(idle.total, 1.2 * 0.4 + 0.8 * 0.5 + 0.3);

    let busiest = find(&ranked, "int-a");
    assert_close(busiest.fairness, -0.4);
    assert_close(busiest.rotation, 1.0);
    assert_close(busiest.total, -0.48 + 0.4 + 0.3);

    assert_eq!(ranked_ids(&ranked), vec!["int-b", "int-c", "int-a"]);
}

#[test]
fn gap_rule_excludes_candidates_that_would_outrun_the_least_loaded_peer() {
    let policy = AssignmentPolicy::from_mode(PolicyMode::Balance);
    let history = history(
        &policy,
        vec![
            past_assignment("int-a", MeetingType::General, 5, 6),
            past_assignment("int-b", MeetingType::General, 6, 1),
        ],
    );
    let booking = booking("b-1", MeetingType::General, 5.0, 2);
    let priority = MeetingTypePriorities::standard().get(MeetingType::General);
    let context = ScoringContext {
        booking: &booking,
        priority: &priority,
        policy: &policy,
        history: &history,
        now: now(),
    };

    let ranked = rank_candidates(&context, &interpreters());

    assert_eq!(
        find(&ranked, "int-a").exclusion,
        Some(ExclusionReason::GapExceeded {
            projected_gap: 8.0,
            max_gap: 2.0,
        })
    );
    assert_eq!(
        find(&ranked, "int-b").exclusion,
        Some(ExclusionReason::GapExceeded {
            projected_gap: 3.0,
            max_gap: 2.0,
        })
    );
    assert!(find(&ranked, "int-c").is_eligible());
    assert_eq!(ranked[0].interpreter_id, InterpreterId("int-c".to_string()));
}

#[test]
fn inactive_and_double_booked_interpreters_are_excluded() {
    let policy = AssignmentPolicy::from_mode(PolicyMode::Normal);
    let booking = booking("b-1", MeetingType::General, 5.0, 2);
    let overlapping = AssignmentRecord {
        booking_id: BookingId("b-other".to_string()),
        interpreter_id: InterpreterId("int-b".to_string()),
        meeting_type: MeetingType::Weekly,
        time_start: booking.time_start + Duration::minutes(30),
        time_end: booking.time_end + Duration::minutes(30),
    };
    let history = history(&policy, vec![overlapping]);
    let mut pool = interpreters();
    pool[0].active = false;
    let priority = MeetingTypePriorities::standard().get(MeetingType::General);
    let context = ScoringContext {
        booking: &booking,
        priority: &priority,
        policy: &policy,
        history: &history,
        now: now(),
    };

    let ranked = rank_candidates(&context, &pool);

    assert_eq!(find(&ranked, "int-a").exclusion, Some(ExclusionReason::Inactive));
    assert_eq!(find(&ranked, "int-b").exclusion, Some(ExclusionReason::Conflict));
    assert_eq!(ranked_ids(&ranked)[0], "int-c");
}

#[test]
fn consecutive_high_intensity_meetings_are_penalised() {
    let policy = AssignmentPolicy::from_mode(PolicyMode::Normal);
    let history = history(
        &policy,
        vec![
            past_assignment("int-a", MeetingType::Dr, 3, 2),
            past_assignment("int-b", MeetingType::General, 3, 2),
        ],
    );
    let booking = booking("b-dr", MeetingType::Dr, 3.0, 2);
    let priority = MeetingTypePriorities::standard().get(MeetingType::Dr);
    let context = ScoringContext {
        booking: &booking,
        priority: &priority,
        policy: &policy,
        history: &history,
        now: now(),
    };
    let pool = interpreters();

    let after_dr = score(&context, &pool[0], &pool);
    let after_general = score(&context, &pool[1], &pool);

    assert_close(after_dr.dr_penalty, -0.5);
    assert_close(after_general.dr_penalty, 0.0);
    assert_close(after_general.total - after_dr.total, 0.5);
}

#[test]
fn ranking_is_deterministic_and_ties_break_by_interpreter_id() {
    let policy = AssignmentPolicy::from_mode(PolicyMode::Balance);
    let history = history(&policy, Vec::new());
    let booking = booking("b-1", MeetingType::Vip, 8.0, 1);
    let priority = MeetingTypePriorities::standard().get(MeetingType::Vip);
    let context = ScoringContext {
        booking: &booking,
        priority: &priority,
        policy: &policy,
        history: &history,
        now: now(),
    };
    let mut reversed: Vec<Interpreter> = interpreters();
    reversed.reverse();

    let first = rank_candidates(&context, &interpreters());
    let second = rank_candidates(&context, &reversed);

    assert_eq!(first, second);
    assert_eq!(ranked_ids(&first), vec!["int-a", "int-b", "int-c"]);
}
