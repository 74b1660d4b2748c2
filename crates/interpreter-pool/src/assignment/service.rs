use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::domain::{BookingId, MeetingType};
use super::engine::{AdmissionOutcome, EngineError, PoolProcessingEngine, ProcessingStatus};
use super::policy::{
    AssignmentPolicy, MeetingTypePriorities, MeetingTypePriority, PolicyError, PolicyStore,
    PolicyUpdate, PriorityUpdate,
};
use super::pool::{BookingPool, BookingStore, PoolEntryView, PoolError, PoolStats};
use super::recovery::{ErrorRecoveryManager, HealthReport, RecoveryOutcome, RetryPolicy};
use super::scheduler::{DailyPoolProcessor, DailyRunSummary, SchedulerError};
use super::scoring::CandidateScore;
use crate::config::PoolConfig;

/// Service wiring the policy store, pool, engine, recovery manager, and scheduler over one store.
pub struct AssignmentService<S> {
    store: Arc<S>,
    policies: Arc<PolicyStore>,
    pool: Arc<BookingPool<S>>,
    engine: Arc<PoolProcessingEngine<S>>,
    recovery: Arc<ErrorRecoveryManager<S>>,
    scheduler: Arc<DailyPoolProcessor<S>>,
}

impl<S> AssignmentService<S>
where
    S: BookingStore + 'static,
{
    pub fn new(store: Arc<S>, config: &PoolConfig) -> Self {
        let policy = AssignmentPolicy {
            auto_assign_enabled: config.auto_assign,
            ..AssignmentPolicy::from_mode(config.policy_mode)
        };
        let policies = Arc::new(PolicyStore::new(policy, MeetingTypePriorities::standard()));
        Self::with_policies(store, policies, config)
    }

    pub fn with_policies(store: Arc<S>, policies: Arc<PolicyStore>, config: &PoolConfig) -> Self {
        let pool = Arc::new(BookingPool::new(Arc::clone(&store)));
        let engine = Arc::new(PoolProcessingEngine::new(
            Arc::clone(&pool),
            Arc::clone(&policies),
            config.engine_settings(),
        ));
        let recovery = Arc::new(ErrorRecoveryManager::new(
            Arc::clone(&pool),
            Arc::clone(&engine),
            config.retry_policy(),
            config.stuck_threshold(),
        ));
        let scheduler = Arc::new(DailyPoolProcessor::new(
            Arc::clone(&pool),
            Arc::clone(&engine),
            Arc::clone(&recovery),
            config.processing_interval(),
        ));

        Self {
            store,
            policies,
            pool,
            engine,
            recovery,
            scheduler,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn policies(&self) -> &Arc<PolicyStore> {
        &self.policies
    }

    pub fn pool(&self) -> &Arc<BookingPool<S>> {
        &self.pool
    }

    pub fn engine(&self) -> &Arc<PoolProcessingEngine<S>> {
        &self.engine
    }

    pub fn recovery(&self) -> &Arc<ErrorRecoveryManager<S>> {
        &self.recovery
    }

    pub fn scheduler(&self) -> &Arc<DailyPoolProcessor<S>> {
        &self.scheduler
    }

    pub fn load_policy(&self) -> Arc<AssignmentPolicy> {
        self.policies.load()
    }

    pub fn update_policy(
        &self,
        update: &PolicyUpdate,
        now: DateTime<Utc>,
    ) -> Result<Arc<AssignmentPolicy>, PolicyError> {
        self.policies.update(update, now)
    }

    pub fn priorities(&self) -> Vec<MeetingTypePriority> {
        self.policies.priorities().rows()
    }

    pub fn update_priority(
        &self,
        meeting_type: MeetingType,
        update: PriorityUpdate,
    ) -> Result<MeetingTypePriority, PolicyError> {
        self.policies.update_priority(meeting_type, update)
    }

    pub fn admit_booking(
        &self,
        booking_id: &BookingId,
        now: DateTime<Utc>,
    ) -> Result<AdmissionOutcome, EngineError> {
        self.engine.admit_booking(booking_id, now)
    }

    pub fn remove_from_pool(&self, booking_id: &BookingId) -> Result<bool, PoolError> {
        self.pool.remove_from_pool(booking_id)
    }

    pub fn pool_stats(&self, now: DateTime<Utc>) -> Result<PoolStats, PoolError> {
        self.pool.get_pool_stats(now)
    }

    /// Entry views ordered by deadline.
    pub fn pool_entries(&self, now: DateTime<Utc>) -> Result<Vec<PoolEntryView>, PoolError> {
        let mut entries = self.pool.get_all_pool_entries()?;
        entries.sort_by(|a, b| {
            a.deadline_time
                .cmp(&b.deadline_time)
                .then_with(|| a.booking_id.cmp(&b.booking_id))
        });
        Ok(entries.iter().map(|entry| entry.view(now)).collect())
    }

    pub fn processing_status(&self, now: DateTime<Utc>) -> Result<ProcessingStatus, EngineError> {
        self.engine.get_processing_status(now)
    }

    pub fn health_check(&self, now: DateTime<Utc>) -> Result<HealthReport, PoolError> {
        self.recovery.perform_health_check(now)
    }

    pub fn process_now(&self, now: DateTime<Utc>) -> Result<DailyRunSummary, SchedulerError> {
        self.scheduler.process_daily_pool_now(now)
    }

    pub fn process_bookings(
        &self,
        booking_ids: &[BookingId],
        now: DateTime<Utc>,
    ) -> Vec<RecoveryOutcome> {
        self.recovery.process_with_error_recovery(booking_ids, now)
    }

    /// Requeues failed entries. `operator_override` ignores the attempt ceiling and backoff.
    pub fn retry_failed(
        &self,
        operator_override: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<BookingId>, PoolError> {
        let retry = if operator_override {
            RetryPolicy::unbounded()
        } else {
            *self.recovery.retry_policy()
        };
        self.pool.retry_failed_entries(&retry, now)
    }

    pub fn preview_candidates(
        &self,
        booking_id: &BookingId,
        now: DateTime<Utc>,
    ) -> Result<Vec<CandidateScore>, EngineError> {
        self.engine.preview_candidates(booking_id, now)
    }
}
