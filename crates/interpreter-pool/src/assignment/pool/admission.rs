use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::assignment::domain::{days_between, Booking};
use crate::assignment::policy::MeetingTypePriority;

/// Whether a new booking is assigned on the spot or deferred to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AdmissionDecision {
    AssignImmediately,
    Pool {
        deadline: DateTime<Utc>,
        /// The meeting is further out than `general_threshold_days`.
        beyond_horizon: bool,
    },
}

/// Meetings inside the urgent threshold bypass the pool; everything else waits until
/// `time_start - urgent_threshold_days`.
pub fn decide_admission(
    booking: &Booking,
    priority: &MeetingTypePriority,
    now: DateTime<Utc>,
) -> AdmissionDecision {
    let days_until_start = days_between(now, booking.time_start);
    let urgent_days = f64::from(priority.urgent_threshold_days);

    if days_until_start <= urgent_days {
        return AdmissionDecision::AssignImmediately;
    }

    AdmissionDecision::Pool {
        deadline: booking.time_start - Duration::days(i64::from(priority.urgent_threshold_days)),
        beyond_horizon: days_until_start > f64::from(priority.general_threshold_days),
    }
}
