//! Pool health checks and repair.
//!
//! Stuck `processing` entries are only detected here, asynchronously; the worker that claimed
//! them may have crashed and will never release them itself.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::domain::BookingId;
use super::engine::{EntryResult, PoolProcessingEngine};
use super::pool::{BookingPool, BookingStore, PoolEntry, PoolError, PoolState};

/// Bounded-retry policy for failed entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Minimum time since the last attempt before a failed entry is retried automatically.
    pub backoff: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Option<Duration>) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Operator override: retries every failed entry regardless of attempts or backoff.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: u32::MAX,
            backoff: None,
        }
    }

    pub fn allows(&self, entry: &PoolEntry, now: DateTime<Utc>) -> bool {
        if entry.processing_attempts >= self.max_attempts {
            return false;
        }
        match self.backoff {
            Some(backoff) => entry.last_attempt_at.map_or(true, |last| now - last >= backoff),
            None => true,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Some(Duration::minutes(30)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthIssue {
    pub booking_id: BookingId,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub is_healthy: bool,
    pub checked_at: DateTime<Utc>,
    pub warnings: Vec<HealthIssue>,
    pub errors: Vec<HealthIssue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    Assigned,
    Recovered,
    StillFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryOutcome {
    pub booking_id: BookingId,
    pub status: RecoveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

pub struct ErrorRecoveryManager<S> {
    pool: Arc<BookingPool<S>>,
    engine: Arc<PoolProcessingEngine<S>>,
    retry: RetryPolicy,
    stuck_threshold: Duration,
}

impl<S> ErrorRecoveryManager<S>
where
    S: BookingStore + 'static,
{
    pub fn new(
        pool: Arc<BookingPool<S>>,
        engine: Arc<PoolProcessingEngine<S>>,
        retry: RetryPolicy,
        stuck_threshold: Duration,
    ) -> Self {
        Self {
            pool,
            engine,
            retry,
            stuck_threshold,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn perform_health_check(&self, now: DateTime<Utc>) -> Result<HealthReport, PoolError> {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        for record in self.pool.records()? {
            let entry = match PoolEntry::from_record(&record) {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(inconsistency) => {
                    errors.push(HealthIssue {
                        booking_id: inconsistency.booking_id().clone(),
                        detail: inconsistency.to_string(),
                    });
                    continue;
                }
            };

            match &entry.state {
                PoolState::Processing { since } if now - *since > self.stuck_threshold => {
                    warnings.push(HealthIssue {
                        booking_id: entry.booking_id.clone(),
                        detail: format!(
                            "processing for {} minutes (threshold {})",
                            (now - *since).num_minutes(),
                            self.stuck_threshold.num_minutes()
                        ),
                    });
                }
                PoolState::Failed { reason } => {
                    let detail = if entry.processing_attempts >= self.retry.max_attempts {
                        format!(
                            "failed after {} attempts, awaiting operator retry: {reason}",
                            entry.processing_attempts
                        )
                    } else {
                        format!("failed after {} attempts: {reason}", entry.processing_attempts)
                    };
                    warnings.push(HealthIssue {
                        booking_id: entry.booking_id.clone(),
                        detail,
                    });
                }
                PoolState::Waiting if entry.time_start <= now => {
                    warnings.push(HealthIssue {
                        booking_id: entry.booking_id.clone(),
                        detail: "meeting has started while the entry is still waiting".to_string(),
                    });
                }
                _ => {}
            }
        }

        let report = HealthReport {
            is_healthy: errors.is_empty(),
            checked_at: now,
            warnings,
            errors,
        };
        if !report.is_healthy {
            warn!(
                errors = report.errors.len(),
                warnings = report.warnings.len(),
                "pool health check found inconsistent entries"
            );
        }
        Ok(report)
    }

    /// Resets entries stuck in `processing` back to `waiting`.
    pub fn recover_stuck_entries(&self, now: DateTime<Utc>) -> Result<Vec<BookingId>, PoolError> {
        let mut recovered = Vec::new();
        for entry in self.pool.get_processing_entries()? {
            let PoolState::Processing { since } = entry.state else {
                continue;
            };
            if now - since <= self.stuck_threshold {
                continue;
            }
            match self.pool.reset_processing_status(&entry) {
                Ok(_) => {
                    info!(booking = %entry.booking_id, "stuck pool entry reset to waiting");
                    recovered.push(entry.booking_id);
                }
                // Finished or re-claimed since the snapshot was read.
                Err(PoolError::InvalidTransition { .. } | PoolError::ClaimSuperseded(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(recovered)
    }

    /// Forces a fresh processing pass for each booking, repairing its pool state first.
    pub fn process_with_error_recovery(
        &self,
        booking_ids: &[BookingId],
        now: DateTime<Utc>,
    ) -> Vec<RecoveryOutcome> {
        booking_ids
            .iter()
            .map(|booking_id| self.recover_one(booking_id, now))
            .collect()
    }

    fn recover_one(&self, booking_id: &BookingId, now: DateTime<Utc>) -> RecoveryOutcome {
        let still_failed = |detail: String| RecoveryOutcome {
            booking_id: booking_id.clone(),
            status: RecoveryStatus::StillFailed,
            detail: Some(detail),
        };

        let entry = match self.pool.entry(booking_id) {
            Ok(Some(entry)) => entry,
            Ok(None) => return still_failed("booking is not in the pool".to_string()),
            Err(err) => return still_failed(err.to_string()),
        };

        let repaired = match &entry.state {
            PoolState::Waiting => Ok(false),
            PoolState::Processing { since } if now - *since > self.stuck_threshold => self
                .pool
                .reset_processing_status(&entry)
                .map(|_| true),
            PoolState::Processing { .. } => {
                return still_failed("entry is being processed by another worker".to_string())
            }
            PoolState::Failed { .. } => self.pool.requeue_failed(booking_id).map(|_| true),
        };
        let repaired = match repaired {
            Ok(repaired) => repaired,
            Err(err) => return still_failed(err.to_string()),
        };

        match self.engine.process_entry(booking_id, now).result {
            EntryResult::Assigned { interpreter_id, .. }
            | EntryResult::AlreadyAssigned { interpreter_id } => RecoveryOutcome {
                booking_id: booking_id.clone(),
                status: if repaired {
                    RecoveryStatus::Recovered
                } else {
                    RecoveryStatus::Assigned
                },
                detail: Some(format!("assigned to {interpreter_id}")),
            },
            EntryResult::Failed { reason } => still_failed(reason),
            EntryResult::Released { error } | EntryResult::Error { error } => still_failed(error),
            EntryResult::Cancelled => still_failed("booking was cancelled".to_string()),
            EntryResult::Contended => still_failed("entry claimed by another worker".to_string()),
            EntryResult::Skipped { reason } => still_failed(reason),
        }
    }
}
