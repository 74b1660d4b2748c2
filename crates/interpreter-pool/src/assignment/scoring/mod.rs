//! Candidate scoring.
//!
//! `score` is pure: the same booking, policy, priority row, workload snapshot, and `now`
//! always produce the same result. Ranking is total and deterministic.

mod rules;
mod workload;

pub use workload::WorkloadHistory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{days_between, Booking, Interpreter, InterpreterId};
use super::policy::{AssignmentPolicy, MeetingTypePriority, PolicyWeights};

/// Weighted urgency at which a waiting entry joins the ready batch ahead of its deadline.
pub const EARLY_PROCESSING_PRESSURE: f64 = 1.0;

/// `w_urgency` times the urgency term for a meeting starting at `time_start`.
pub fn urgency_pressure(
    time_start: DateTime<Utc>,
    now: DateTime<Utc>,
    priority: &MeetingTypePriority,
    weights: &PolicyWeights,
) -> f64 {
    weights.w_urgency * rules::urgency_term(days_between(now, time_start), priority)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExclusionReason {
    Inactive,
    Conflict,
    GapExceeded { projected_gap: f64, max_gap: f64 },
}

impl ExclusionReason {
    pub fn summary(&self) -> String {
        match self {
            ExclusionReason::Inactive => "interpreter inactive".to_string(),
            ExclusionReason::Conflict => "overlapping assignment".to_string(),
            ExclusionReason::GapExceeded {
                projected_gap,
                max_gap,
            } => format!("workload gap {projected_gap:.1}h exceeds {max_gap:.1}h"),
        }
    }
}

/// Score with its terms, so a decision can be audited after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub interpreter_id: InterpreterId,
    pub hours_in_window: f64,
    pub fairness: f64,
    pub urgency: f64,
    pub rotation: f64,
    pub dr_penalty: f64,
    pub total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusion: Option<ExclusionReason>,
}

impl CandidateScore {
    pub fn is_eligible(&self) -> bool {
        self.exclusion.is_none()
    }
}

/// Inputs shared by every candidate for one booking.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext<'a> {
    pub booking: &'a Booking,
    pub priority: &'a MeetingTypePriority,
    pub policy: &'a AssignmentPolicy,
    pub history: &'a WorkloadHistory,
    pub now: DateTime<Utc>,
}

pub fn score(
    context: &ScoringContext<'_>,
    candidate: &Interpreter,
    peers: &[Interpreter],
) -> CandidateScore {
    let weights = &context.policy.weights;
    let booking = context.booking;
    let history = context.history;

    let hours = history.hours_for(&candidate.id);
    let active_hours: Vec<f64> = peers
        .iter()
        .filter(|peer| peer.active)
        .map(|peer| history.hours_for(&peer.id))
        .collect();
    let group_average = if active_hours.is_empty() {
        hours
    } else {
        active_hours.iter().sum::<f64>() / active_hours.len() as f64
    };
    let least_loaded_peer = peers
        .iter()
        .filter(|peer| peer.active && peer.id != candidate.id)
        .map(|peer| history.hours_for(&peer.id))
        .min_by(f64::total_cmp);

    let fairness = rules::fairness_term(hours, group_average, weights);
    let urgency = rules::urgency_term(days_between(context.now, booking.time_start), context.priority);

    let last = history.last_assignment_before(&candidate.id, booking.time_start);
    let rotation = rules::rotation_term(
        last.map(|record| days_between(record.time_start, booking.time_start)),
        weights,
    );
    let dr_penalty = match last {
        Some(record)
            if booking.meeting_type.is_high_intensity() && record.meeting_type.is_high_intensity() =>
        {
            weights.dr_consecutive_penalty
        }
        _ => 0.0,
    };

    let total = weights.w_fair * fairness
        + weights.w_urgency * urgency
        + weights.w_lrs * rotation
        + dr_penalty;

    let exclusion = if !candidate.active {
        Some(ExclusionReason::Inactive)
    } else if history.has_conflict(&candidate.id, booking.time_start, booking.time_end) {
        Some(ExclusionReason::Conflict)
    } else {
        rules::gap_violation(hours, booking.duration_hours(), least_loaded_peer, weights).map(
            |projected_gap| ExclusionReason::GapExceeded {
                projected_gap,
                max_gap: weights.max_gap_hours,
            },
        )
    };

    CandidateScore {
        interpreter_id: candidate.id.clone(),
        hours_in_window: hours,
        fairness,
        urgency,
        rotation,
        dr_penalty,
        total,
        exclusion,
    }
}

/// Eligible candidates first by descending score, then interpreter id; excluded ones last.
pub fn rank_candidates(
    context: &ScoringContext<'_>,
    interpreters: &[Interpreter],
) -> Vec<CandidateScore> {
    let mut ranked: Vec<CandidateScore> = interpreters
        .iter()
        .map(|candidate| score(context, candidate, interpreters))
        .collect();

    ranked.sort_by(|a, b| {
        b.is_eligible()
            .cmp(&a.is_eligible())
            .then_with(|| b.total.total_cmp(&a.total))
            .then_with(|| a.interpreter_id.cmp(&b.interpreter_id))
    });
    ranked
}
