//! Booking pool: the queue of bookings whose interpreter decision has been deferred.
//!
//! All writes go through [`BookingStore::transition_pool`], so the status check and the update
//! are one atomic step. `mark_as_processing` is the only way to acquire an entry.

mod admission;
mod state;
mod store;

pub use admission::{decide_admission, AdmissionDecision};
pub use state::{
    PoolEntry, PoolEntryView, PoolInconsistency, PoolRow, PoolState, PoolStatus, PoolTransition,
    StoredPoolStatus,
};
pub use store::{BookingRecord, BookingStore, InMemoryBookingStore, StoreError, TransitionOutcome};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::domain::{days_between, BookingId};
use super::policy::{MeetingTypePriorities, PolicyWeights};
use super::recovery::RetryPolicy;
use super::scoring::{urgency_pressure, EARLY_PROCESSING_PRESSURE};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("booking {0} is already in the pool")]
    AlreadyPooled(BookingId),
    #[error("booking {booking_id} cannot be claimed while {status}")]
    NotClaimable {
        booking_id: BookingId,
        status: PoolStatus,
    },
    #[error("booking {0} is not in the pool")]
    NotPooled(BookingId),
    #[error("booking {0} was claimed again after this claim was read")]
    ClaimSuperseded(BookingId),
    #[error("cannot {transition} booking {booking_id} while {status}")]
    InvalidTransition {
        booking_id: BookingId,
        transition: &'static str,
        status: PoolStatus,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Inconsistent(#[from] PoolInconsistency),
}

impl PoolError {
    /// Contention is expected: another worker holds the entry or already finished it.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            PoolError::NotClaimable { .. }
                | PoolError::ClaimSuperseded(_)
                | PoolError::AlreadyPooled(_)
                | PoolError::NotPooled(_)
        )
    }
}

/// Counts by observable status. `total_in_pool` counts every row with a non-null status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolStats {
    pub total_in_pool: usize,
    pub waiting: usize,
    pub ready: usize,
    pub processing: usize,
    pub failed: usize,
    pub inconsistent: usize,
    pub oldest_entry_time: Option<DateTime<Utc>>,
    pub next_deadline: Option<DateTime<Utc>>,
}

pub struct BookingPool<S> {
    store: Arc<S>,
}

impl<S> BookingPool<S>
where
    S: BookingStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn add_to_pool(
        &self,
        booking_id: &BookingId,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<PoolEntry, PoolError> {
        let entry = self.transition(
            booking_id,
            PoolTransition::Admit { deadline, now },
            |_| PoolError::AlreadyPooled(booking_id.clone()),
        )?;
        debug!(booking = %booking_id, %deadline, "booking admitted to pool");
        Ok(entry)
    }

    /// Clears the pool columns. Returns `false` when the booking was not pooled.
    pub fn remove_from_pool(&self, booking_id: &BookingId) -> Result<bool, PoolError> {
        let removed = match self.store.transition_pool(booking_id, &PoolTransition::Clear)? {
            TransitionOutcome::Applied { previous, .. } => previous.is_some(),
            TransitionOutcome::Rejected { .. } => false,
            TransitionOutcome::Inconsistent(issue) => return Err(issue.into()),
        };
        if removed {
            debug!(booking = %booking_id, "booking removed from pool");
        }
        Ok(removed)
    }

    pub fn mark_as_processing(
        &self,
        booking_id: &BookingId,
        now: DateTime<Utc>,
    ) -> Result<PoolEntry, PoolError> {
        self.transition(booking_id, PoolTransition::Claim { now }, |status| {
            if status == PoolStatus::None {
                PoolError::NotPooled(booking_id.clone())
            } else {
                PoolError::NotClaimable {
                    booking_id: booking_id.clone(),
                    status,
                }
            }
        })
    }

    /// Returns the claim `claimed` was read under to `waiting`, without touching the attempt
    /// counter. Fails with `ClaimSuperseded` when the entry has been claimed again since.
    pub fn reset_processing_status(&self, claimed: &PoolEntry) -> Result<PoolEntry, PoolError> {
        let booking_id = &claimed.booking_id;
        let rejected = |status: PoolStatus| PoolError::InvalidTransition {
            booking_id: booking_id.clone(),
            transition: "reset",
            status,
        };
        let Some(release) = claimed.release() else {
            return Err(rejected(match claimed.state {
                PoolState::Failed { .. } => PoolStatus::Failed,
                _ => PoolStatus::Waiting,
            }));
        };
        self.transition(booking_id, release, |status| {
            if status == PoolStatus::Processing {
                PoolError::ClaimSuperseded(booking_id.clone())
            } else {
                rejected(status)
            }
        })
    }

    pub fn mark_as_failed(
        &self,
        booking_id: &BookingId,
        reason: impl Into<String>,
    ) -> Result<PoolEntry, PoolError> {
        let reason = reason.into();
        let entry = self.transition(
            booking_id,
            PoolTransition::Fail {
                reason: reason.clone(),
            },
            |status| PoolError::InvalidTransition {
                booking_id: booking_id.clone(),
                transition: "fail",
                status,
            },
        )?;
        warn!(booking = %booking_id, attempts = entry.processing_attempts, %reason, "pool entry failed");
        Ok(entry)
    }

    /// Requeues `failed` entries that the retry policy allows. Entries that lost a race to
    /// another caller are skipped.
    pub fn retry_failed_entries(
        &self,
        retry: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<BookingId>, PoolError> {
        let mut requeued = Vec::new();
        for entry in self.get_failed_entries()? {
            if !retry.allows(&entry, now) {
                continue;
            }
            match self
                .store
                .transition_pool(&entry.booking_id, &PoolTransition::Requeue)?
            {
                TransitionOutcome::Applied { .. } => requeued.push(entry.booking_id),
                TransitionOutcome::Rejected { .. } => {
                    debug!(booking = %entry.booking_id, "failed entry changed before requeue");
                }
                TransitionOutcome::Inconsistent(issue) => {
                    warn!(booking = %entry.booking_id, error = %issue, "failed entry not requeued");
                }
            }
        }
        Ok(requeued)
    }

    /// Operator retry of a single `failed` entry, ignoring the retry policy.
    pub fn requeue_failed(&self, booking_id: &BookingId) -> Result<PoolEntry, PoolError> {
        self.transition(booking_id, PoolTransition::Requeue, |status| {
            PoolError::InvalidTransition {
                booking_id: booking_id.clone(),
                transition: "requeue",
                status,
            }
        })
    }

    pub fn entry(&self, booking_id: &BookingId) -> Result<Option<PoolEntry>, PoolError> {
        let record = self
            .store
            .fetch(booking_id)?
            .ok_or_else(|| StoreError::NotFound(booking_id.clone()))?;
        Ok(PoolEntry::from_record(&record)?)
    }

    /// Raw pooled rows, including ones that cannot be read as a [`PoolEntry`].
    pub fn records(&self) -> Result<Vec<BookingRecord>, PoolError> {
        Ok(self.store.pooled()?)
    }

    pub fn get_pool_stats(&self, now: DateTime<Utc>) -> Result<PoolStats, PoolError> {
        let records = self.store.pooled()?;
        let mut stats = PoolStats {
            total_in_pool: records.len(),
            ..PoolStats::default()
        };

        for record in &records {
            match record.pool.status_at(now) {
                PoolStatus::Waiting => stats.waiting += 1,
                PoolStatus::Ready => stats.ready += 1,
                PoolStatus::Processing => stats.processing += 1,
                PoolStatus::Failed => stats.failed += 1,
                PoolStatus::None => {}
            }

            if PoolEntry::from_record(record).is_err() {
                stats.inconsistent += 1;
            }
            if let Some(entry_time) = record.pool.entry_time {
                stats.oldest_entry_time = Some(
                    stats
                        .oldest_entry_time
                        .map_or(entry_time, |oldest| oldest.min(entry_time)),
                );
            }
            if record.pool.status == Some(StoredPoolStatus::Waiting) {
                if let Some(deadline) = record.pool.deadline_time {
                    stats.next_deadline = Some(
                        stats
                            .next_deadline
                            .map_or(deadline, |next| next.min(deadline)),
                    );
                }
            }
        }

        Ok(stats)
    }

    /// Every readable pool entry. Inconsistent rows are left to the health check.
    pub fn get_all_pool_entries(&self) -> Result<Vec<PoolEntry>, PoolError> {
        let records = self.store.pooled()?;
        Ok(records
            .iter()
            .filter_map(|record| match PoolEntry::from_record(record) {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(error = %err, "skipping inconsistent pool row");
                    None
                }
            })
            .collect())
    }

    /// Waiting entries past their deadline, plus entries whose meeting has moved inside the
    /// current urgent threshold since they were admitted.
    /// Waiting entries that are past their deadline, inside the current urgent threshold, or
    /// pressing enough under `weights` to be processed early.
    pub fn get_ready_for_assignment(
        &self,
        now: DateTime<Utc>,
        priorities: &MeetingTypePriorities,
        weights: &PolicyWeights,
    ) -> Result<Vec<PoolEntry>, PoolError> {
        Ok(self
            .get_all_pool_entries()?
            .into_iter()
            .filter(|entry| entry.is_waiting())
            .filter(|entry| {
                let priority = priorities.get(entry.meeting_type);
                entry.is_deadline_passed(now)
                    || days_between(now, entry.time_start) <= f64::from(priority.urgent_threshold_days)
                    || urgency_pressure(entry.time_start, now, &priority, weights)
                        >= EARLY_PROCESSING_PRESSURE
            })
            .collect())
    }

    /// Waiting entries whose stored deadline has passed.
    pub fn get_deadline_entries(&self, now: DateTime<Utc>) -> Result<Vec<PoolEntry>, PoolError> {
        Ok(self
            .get_all_pool_entries()?
            .into_iter()
            .filter(|entry| entry.is_waiting() && entry.is_deadline_passed(now))
            .collect())
    }

    pub fn get_failed_entries(&self) -> Result<Vec<PoolEntry>, PoolError> {
        Ok(self
            .get_all_pool_entries()?
            .into_iter()
            .filter(|entry| matches!(entry.state, PoolState::Failed { .. }))
            .collect())
    }

    pub fn get_processing_entries(&self) -> Result<Vec<PoolEntry>, PoolError> {
        Ok(self
            .get_all_pool_entries()?
            .into_iter()
            .filter(|entry| matches!(entry.state, PoolState::Processing { .. }))
            .collect())
    }

    fn transition(
        &self,
        booking_id: &BookingId,
        transition: PoolTransition,
        rejected: impl FnOnce(PoolStatus) -> PoolError,
    ) -> Result<PoolEntry, PoolError> {
        match self.store.transition_pool(booking_id, &transition)? {
            TransitionOutcome::Applied { record, .. } => PoolEntry::from_record(&record)?
                .ok_or_else(|| PoolError::NotPooled(booking_id.clone())),
            TransitionOutcome::Inconsistent(issue) => Err(issue.into()),
            TransitionOutcome::Rejected { current } => {
                let status = match current {
                    None => PoolStatus::None,
                    Some(StoredPoolStatus::Waiting) => PoolStatus::Waiting,
                    Some(StoredPoolStatus::Processing) => PoolStatus::Processing,
                    Some(StoredPoolStatus::Failed) => PoolStatus::Failed,
                };
                Err(rejected(status))
            }
        }
    }
}
