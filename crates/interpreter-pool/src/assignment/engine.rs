//! Pool processing engine: claims due entries, ranks interpreters, and commits the winner.
//!
//! Every entry is processed independently. A failure while handling one entry is recorded in
//! its outcome and the batch moves on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::domain::{BookingId, BookingStatus, InterpreterId};
use super::policy::{MeetingTypePriorities, PolicySnapshot, PolicyStore};
use super::pool::{
    decide_admission, AdmissionDecision, BookingPool, BookingRecord, BookingStore, PoolEntry,
    PoolError, StoreError,
};
use super::recovery::RetryPolicy;
use super::scoring::{rank_candidates, CandidateScore, ScoringContext, WorkloadHistory};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Upper bound on entries taken by one ready batch. Deadline batches are never capped.
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Ready,
    Deadline,
    Single,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum EntryResult {
    Assigned {
        interpreter_id: InterpreterId,
        score: f64,
    },
    /// The booking already had an interpreter; the stale pool entry was cleared.
    AlreadyAssigned { interpreter_id: InterpreterId },
    /// The booking was cancelled while pooled; the entry was cleared.
    Cancelled,
    Failed { reason: String },
    /// A transient error; the entry went back to `waiting` for the next cycle.
    Released { error: String },
    /// Another worker holds or already finished the entry.
    Contended,
    Skipped { reason: String },
    /// The entry could not be claimed or settled; its state is unchanged.
    Error { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryOutcome {
    pub booking_id: BookingId,
    #[serde(flatten)]
    pub result: EntryResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingReport {
    pub kind: BatchKind,
    pub started_at: DateTime<Utc>,
    pub considered: usize,
    pub outcomes: Vec<EntryOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
}

impl ProcessingReport {
    fn skipped(kind: BatchKind, now: DateTime<Utc>, considered: usize, reason: &str) -> Self {
        Self {
            kind,
            started_at: now,
            considered,
            outcomes: Vec::new(),
            skipped_reason: Some(reason.to_string()),
        }
    }

    pub fn assigned(&self) -> usize {
        self.count(|result| matches!(result, EntryResult::Assigned { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|result| matches!(result, EntryResult::Failed { .. }))
    }

    pub fn released(&self) -> usize {
        self.count(|result| matches!(result, EntryResult::Released { .. }))
    }

    pub fn contended(&self) -> usize {
        self.count(|result| matches!(result, EntryResult::Contended))
    }

    pub fn errors(&self) -> usize {
        self.count(|result| matches!(result, EntryResult::Error { .. }))
    }

    pub fn booking_ids(&self) -> Vec<&BookingId> {
        self.outcomes.iter().map(|outcome| &outcome.booking_id).collect()
    }

    fn count(&self, predicate: impl Fn(&EntryResult) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| predicate(&outcome.result))
            .count()
    }
}

/// Observability snapshot; never used as a control input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingStatus {
    pub pool_size: usize,
    pub ready_for_processing: usize,
    pub deadline_passed: usize,
    pub failed: usize,
    pub auto_assign_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdmissionOutcome {
    Assigned {
        interpreter_id: InterpreterId,
        score: f64,
    },
    Pooled {
        deadline: DateTime<Utc>,
        beyond_horizon: bool,
    },
    /// Urgent booking that could not be assigned right away; pooled as immediately due.
    Deferred { reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

enum Resolution {
    Assigned(CandidateScore),
    AlreadyAssigned(InterpreterId),
    Cancelled,
    NoCandidate(String),
}

pub struct PoolProcessingEngine<S> {
    pool: Arc<BookingPool<S>>,
    policies: Arc<PolicyStore>,
    settings: EngineSettings,
}

impl<S> PoolProcessingEngine<S>
where
    S: BookingStore + 'static,
{
    pub fn new(pool: Arc<BookingPool<S>>, policies: Arc<PolicyStore>, settings: EngineSettings) -> Self {
        Self {
            pool,
            policies,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Entries that are due by deadline, by the current urgent threshold, or by weighted
    /// urgency, most pressing first, capped at the configured batch size.
    pub fn process_ready_entries(&self, now: DateTime<Utc>) -> Result<ProcessingReport, EngineError> {
        let snapshot = self.policies.snapshot();
        let mut entries = self
            .pool
            .get_ready_for_assignment(now, &snapshot.priorities, &snapshot.policy.weights)?;
        order_entries(&mut entries, &snapshot.priorities);
        entries.truncate(self.settings.batch_size);
        Ok(self.run_batch(BatchKind::Ready, entries, &snapshot, now))
    }

    /// Every waiting entry whose stored deadline has passed, without a batch cap.
    pub fn process_deadline_entries(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ProcessingReport, EngineError> {
        let snapshot = self.policies.snapshot();
        let mut entries = self.pool.get_deadline_entries(now)?;
        order_entries(&mut entries, &snapshot.priorities);
        Ok(self.run_batch(BatchKind::Deadline, entries, &snapshot, now))
    }

    /// Claims and resolves one entry regardless of its deadline.
    pub fn process_entry(&self, booking_id: &BookingId, now: DateTime<Utc>) -> EntryOutcome {
        let snapshot = self.policies.snapshot();
        EntryOutcome {
            booking_id: booking_id.clone(),
            result: self.process_one(booking_id, &snapshot, now),
        }
    }

    pub fn get_processing_status(&self, now: DateTime<Utc>) -> Result<ProcessingStatus, EngineError> {
        let snapshot = self.policies.snapshot();
        let stats = self.pool.get_pool_stats(now)?;
        let ready = self
            .pool
            .get_ready_for_assignment(now, &snapshot.priorities, &snapshot.policy.weights)?;
        Ok(ProcessingStatus {
            pool_size: stats.total_in_pool,
            ready_for_processing: ready.len(),
            deadline_passed: stats.ready,
            failed: stats.failed,
            auto_assign_enabled: snapshot.policy.auto_assign_enabled,
        })
    }

    /// Routes a new booking: urgent ones are assigned now, the rest are pooled with a deadline.
    pub fn admit_booking(
        &self,
        booking_id: &BookingId,
        now: DateTime<Utc>,
    ) -> Result<AdmissionOutcome, EngineError> {
        let snapshot = self.policies.snapshot();
        let record = self.fetch(booking_id)?;
        let priority = snapshot.priorities.get(record.booking.meeting_type);

        match decide_admission(&record.booking, &priority, now) {
            AdmissionDecision::Pool {
                deadline,
                beyond_horizon,
            } => {
                self.pool.add_to_pool(booking_id, deadline, now)?;
                Ok(AdmissionOutcome::Pooled {
                    deadline,
                    beyond_horizon,
                })
            }
            AdmissionDecision::AssignImmediately => {
                let reason = if snapshot.policy.auto_assign_enabled {
                    let ranked = self.rank(&record, &snapshot, now)?;
                    match ranked.iter().find(|candidate| candidate.is_eligible()) {
                        Some(best) => {
                            self.pool
                                .store()
                                .commit_assignment(booking_id, &best.interpreter_id)?;
                            info!(
                                booking = %booking_id,
                                interpreter = %best.interpreter_id,
                                score = best.total,
                                "urgent booking assigned on admission"
                            );
                            return Ok(AdmissionOutcome::Assigned {
                                interpreter_id: best.interpreter_id.clone(),
                                score: best.total,
                            });
                        }
                        None => no_candidate_reason(&ranked),
                    }
                } else {
                    "auto-assignment disabled".to_string()
                };

                self.pool.add_to_pool(booking_id, now, now)?;
                warn!(booking = %booking_id, %reason, "urgent booking deferred to pool");
                Ok(AdmissionOutcome::Deferred { reason })
            }
        }
    }

    /// Current ranking for a booking, for audit screens. Does not claim or commit anything.
    pub fn preview_candidates(
        &self,
        booking_id: &BookingId,
        now: DateTime<Utc>,
    ) -> Result<Vec<CandidateScore>, EngineError> {
        let snapshot = self.policies.snapshot();
        let record = self.fetch(booking_id)?;
        self.rank(&record, &snapshot, now)
    }

    fn run_batch(
        &self,
        kind: BatchKind,
        entries: Vec<PoolEntry>,
        snapshot: &PolicySnapshot,
        now: DateTime<Utc>,
    ) -> ProcessingReport {
        if !snapshot.policy.auto_assign_enabled {
            debug!(?kind, entries = entries.len(), "auto-assignment disabled; batch skipped");
            return ProcessingReport::skipped(kind, now, entries.len(), "auto-assignment disabled");
        }

        let considered = entries.len();
        let outcomes: Vec<EntryOutcome> = entries
            .into_iter()
            .map(|entry| EntryOutcome {
                result: self.process_one(&entry.booking_id, snapshot, now),
                booking_id: entry.booking_id,
            })
            .collect();

        let report = ProcessingReport {
            kind,
            started_at: now,
            considered,
            outcomes,
            skipped_reason: None,
        };
        if considered > 0 {
            info!(
                ?kind,
                considered,
                assigned = report.assigned(),
                failed = report.failed(),
                released = report.released(),
                contended = report.contended(),
                "pool batch processed"
            );
        }
        report
    }

    fn process_one(
        &self,
        booking_id: &BookingId,
        snapshot: &PolicySnapshot,
        now: DateTime<Utc>,
    ) -> EntryResult {
        if !snapshot.policy.auto_assign_enabled {
            return EntryResult::Skipped {
                reason: "auto-assignment disabled".to_string(),
            };
        }

        let entry = match self.pool.mark_as_processing(booking_id, now) {
            Ok(entry) => entry,
            Err(err) if err.is_contention() => {
                debug!(booking = %booking_id, error = %err, "entry not claimable");
                return EntryResult::Contended;
            }
            Err(err) => {
                return EntryResult::Error {
                    error: err.to_string(),
                }
            }
        };

        match self.resolve(booking_id, snapshot, now) {
            Ok(Resolution::Assigned(best)) => {
                self.clear(booking_id);
                info!(
                    booking = %booking_id,
                    interpreter = %best.interpreter_id,
                    score = best.total,
                    attempts = entry.processing_attempts,
                    "pooled booking assigned"
                );
                EntryResult::Assigned {
                    interpreter_id: best.interpreter_id,
                    score: best.total,
                }
            }
            Ok(Resolution::AlreadyAssigned(interpreter_id)) => {
                self.clear(booking_id);
                EntryResult::AlreadyAssigned { interpreter_id }
            }
            Ok(Resolution::Cancelled) => {
                self.clear(booking_id);
                EntryResult::Cancelled
            }
            Ok(Resolution::NoCandidate(reason)) => self.fail(booking_id, reason),
            Err(err) if entry.processing_attempts >= self.settings.retry.max_attempts => self.fail(
                booking_id,
                format!(
                    "gave up after {} attempts: {err}",
                    entry.processing_attempts
                ),
            ),
            Err(err) => {
                warn!(booking = %booking_id, error = %err, "processing attempt failed; releasing entry");
                match self.pool.reset_processing_status(&entry) {
                    Ok(_) => EntryResult::Released {
                        error: err.to_string(),
                    },
                    Err(reset_err) => EntryResult::Error {
                        error: format!("{err}; release failed: {reset_err}"),
                    },
                }
            }
        }
    }

    fn resolve(
        &self,
        booking_id: &BookingId,
        snapshot: &PolicySnapshot,
        now: DateTime<Utc>,
    ) -> Result<Resolution, EngineError> {
        let record = self.fetch(booking_id)?;

        if let Some(interpreter_id) = &record.booking.interpreter_id {
            return Ok(Resolution::AlreadyAssigned(interpreter_id.clone()));
        }
        if record.booking.status == BookingStatus::Cancelled {
            return Ok(Resolution::Cancelled);
        }
        if record.booking.time_start <= now {
            return Ok(Resolution::NoCandidate(
                "meeting started before an interpreter was assigned".to_string(),
            ));
        }

        let ranked = self.rank(&record, snapshot, now)?;
        let Some(best) = ranked.iter().find(|candidate| candidate.is_eligible()) else {
            return Ok(Resolution::NoCandidate(no_candidate_reason(&ranked)));
        };

        self.pool
            .store()
            .commit_assignment(booking_id, &best.interpreter_id)?;
        Ok(Resolution::Assigned(best.clone()))
    }

    fn rank(
        &self,
        record: &BookingRecord,
        snapshot: &PolicySnapshot,
        now: DateTime<Utc>,
    ) -> Result<Vec<CandidateScore>, EngineError> {
        let store = self.pool.store();
        let interpreters = store.interpreters()?;
        let window_start = WorkloadHistory::window_start(now, &snapshot.policy);
        let history = WorkloadHistory::from_assignments(
            store.assignments_since(window_start)?,
            &interpreters,
            window_start,
        );
        let priority = snapshot.priorities.get(record.booking.meeting_type);

        let context = ScoringContext {
            booking: &record.booking,
            priority: &priority,
            policy: &snapshot.policy,
            history: &history,
            now,
        };
        Ok(rank_candidates(&context, &interpreters))
    }

    fn fetch(&self, booking_id: &BookingId) -> Result<BookingRecord, EngineError> {
        self.pool
            .store()
            .fetch(booking_id)?
            .ok_or_else(|| StoreError::NotFound(booking_id.clone()).into())
    }

    fn fail(&self, booking_id: &BookingId, reason: String) -> EntryResult {
        match self.pool.mark_as_failed(booking_id, reason.clone()) {
            Ok(_) => EntryResult::Failed { reason },
            Err(err) => EntryResult::Error {
                error: format!("{reason}; marking failed: {err}"),
            },
        }
    }

    fn clear(&self, booking_id: &BookingId) {
        // A leftover `processing` row is picked up by the stuck-entry detector and cleared on
        // the next pass as `AlreadyAssigned`.
        if let Err(err) = self.pool.remove_from_pool(booking_id) {
            warn!(booking = %booking_id, error = %err, "assignment committed but pool entry not cleared");
        }
    }
}

/// Earliest deadline first, then higher meeting priority, then booking id.
fn order_entries(entries: &mut [PoolEntry], priorities: &MeetingTypePriorities) {
    entries.sort_by(|a, b| {
        a.deadline_time
            .cmp(&b.deadline_time)
            .then_with(|| {
                priorities
                    .get(b.meeting_type)
                    .priority_value
                    .cmp(&priorities.get(a.meeting_type).priority_value)
            })
            .then_with(|| a.booking_id.cmp(&b.booking_id))
    });
}

fn no_candidate_reason(ranked: &[CandidateScore]) -> String {
    if ranked.is_empty() {
        return "no interpreters available".to_string();
    }
    let details: Vec<String> = ranked
        .iter()
        .filter_map(|candidate| {
            candidate
                .exclusion
                .as_ref()
                .map(|reason| format!("{}: {}", candidate.interpreter_id, reason.summary()))
        })
        .collect();
    format!("no eligible interpreter ({})", details.join("; "))
}
