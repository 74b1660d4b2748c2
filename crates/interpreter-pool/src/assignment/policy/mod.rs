//! Active assignment policy and meeting type priorities.
//!
//! The store hands out immutable `Arc` snapshots. Updates are validated against a copy and
//! swapped in under the write lock, so a reader sees either the old policy or the new one.

mod config;
mod priority;

pub use config::{AssignmentPolicy, PolicyMode, PolicyUpdate, PolicyWeights};
pub use priority::{MeetingTypePriorities, MeetingTypePriority, PriorityUpdate};

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::info;

use super::domain::MeetingType;

/// Validation failures raised at the policy boundary. Nothing is applied when one is returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("{field} must be within [{min}, {max}] (got {value})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("weights are locked while the policy mode is {mode}; switch to CUSTOM first")]
    ModeLocked { mode: PolicyMode },
    #[error(
        "{meeting_type} urgent threshold ({urgent_threshold_days}d) must be below the general threshold ({general_threshold_days}d)"
    )]
    InconsistentThresholds {
        meeting_type: MeetingType,
        urgent_threshold_days: u16,
        general_threshold_days: u16,
    },
}

/// Policy and priority table read together by one processing step.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    pub policy: Arc<AssignmentPolicy>,
    pub priorities: Arc<MeetingTypePriorities>,
}

/// Injected configuration service shared by the engine, scheduler, and admin surface.
#[derive(Debug)]
pub struct PolicyStore {
    policy: RwLock<Arc<AssignmentPolicy>>,
    priorities: RwLock<Arc<MeetingTypePriorities>>,
}

impl PolicyStore {
    pub fn new(policy: AssignmentPolicy, priorities: MeetingTypePriorities) -> Self {
        Self {
            policy: RwLock::new(Arc::new(policy)),
            priorities: RwLock::new(Arc::new(priorities)),
        }
    }

    pub fn load(&self) -> Arc<AssignmentPolicy> {
        // The guarded value is only ever replaced whole, so a poisoned lock still holds a valid policy.
        let guard = self.policy.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn priorities(&self) -> Arc<MeetingTypePriorities> {
        let guard = self
            .priorities
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn snapshot(&self) -> PolicySnapshot {
        PolicySnapshot {
            policy: self.load(),
            priorities: self.priorities(),
        }
    }

    pub fn update(
        &self,
        update: &PolicyUpdate,
        now: DateTime<Utc>,
    ) -> Result<Arc<AssignmentPolicy>, PolicyError> {
        let mut guard = self.policy.write().unwrap_or_else(PoisonError::into_inner);

        let mut next = guard.apply(update)?;
        next.version = guard.version.saturating_add(1);
        next.updated_at = Some(now);

        let next = Arc::new(next);
        *guard = Arc::clone(&next);

        info!(
            mode = %next.mode,
            version = next.version,
            auto_assign = next.auto_assign_enabled,
            "assignment policy updated"
        );
        Ok(next)
    }

    pub fn update_priority(
        &self,
        meeting_type: MeetingType,
        update: PriorityUpdate,
    ) -> Result<MeetingTypePriority, PolicyError> {
        let mut guard = self
            .priorities
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let (next, row) = guard.with_update(meeting_type, update)?;
        *guard = Arc::new(next);

        info!(
            meeting_type = %meeting_type,
            priority = row.priority_value,
            urgent_days = row.urgent_threshold_days,
            general_days = row.general_threshold_days,
            "meeting type priority updated"
        );
        Ok(row)
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new(AssignmentPolicy::default(), MeetingTypePriorities::standard())
    }
}
