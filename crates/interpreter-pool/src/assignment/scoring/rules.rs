//! Individual score terms. Each is a pure function of already-extracted numbers.

use crate::assignment::policy::{MeetingTypePriority, PolicyWeights};

/// Positive when the candidate is below the group average, scaled by the tolerated gap.
pub(crate) fn fairness_term(hours: f64, group_average: f64, weights: &PolicyWeights) -> f64 {
    ((group_average - hours) / weights.max_gap_hours).clamp(-1.0, 1.0)
}

/// 1.0 inside the urgent threshold, 0.0 at or beyond the general threshold, linear between.
pub(crate) fn urgency_term(days_until_start: f64, priority: &MeetingTypePriority) -> f64 {
    let urgent = f64::from(priority.urgent_threshold_days);
    let general = f64::from(priority.general_threshold_days);

    if days_until_start <= urgent {
        1.0
    } else if days_until_start >= general || general <= urgent {
        0.0
    } else {
        (general - days_until_start) / (general - urgent)
    }
}

/// Least-recently-served: grows with the idle time since the last assignment, capped at 1.0.
pub(crate) fn rotation_term(days_since_last: Option<f64>, weights: &PolicyWeights) -> f64 {
    match days_since_last {
        None => 1.0,
        Some(days) => (days.max(0.0) / f64::from(weights.fairness_window_days)).min(1.0),
    }
}

/// Gap to the least-loaded peer after this booking, when that gap breaks the hard limit.
///
/// Applies to every candidate, the least loaded included. A booking longer than the limit
/// therefore excludes everyone while any other active interpreter exists.
pub(crate) fn gap_violation(
    hours: f64,
    booking_hours: f64,
    least_loaded_peer: Option<f64>,
    weights: &PolicyWeights,
) -> Option<f64> {
    let peer = least_loaded_peer?;
    let projected_gap = hours + booking_hours - peer;
    (projected_gap > weights.max_gap_hours).then_some(projected_gap)
}
