//! Scheduled trigger for the pool: recovery, bounded retry, then the ready and deadline batches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::domain::BookingId;
use super::engine::{EngineError, PoolProcessingEngine, ProcessingReport, ProcessingStatus};
use super::pool::{BookingPool, BookingStore, PoolError};
use super::recovery::ErrorRecoveryManager;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("a pool processing run is already in progress")]
    AlreadyRunning,
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRunSummary {
    pub started_at: DateTime<Utc>,
    pub recovered: Vec<BookingId>,
    pub requeued: Vec<BookingId>,
    pub ready: ProcessingReport,
    pub deadline: ProcessingReport,
}

impl DailyRunSummary {
    pub fn assigned(&self) -> usize {
        self.ready.assigned() + self.deadline.assigned()
    }

    pub fn failed(&self) -> usize {
        self.ready.failed() + self.deadline.failed()
    }

    pub fn processed(&self) -> usize {
        self.ready.outcomes.len() + self.deadline.outcomes.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailyStatistics {
    pub runs: u64,
    pub assigned: u64,
    pub failed: u64,
    pub recovered: u64,
    pub requeued: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_summary: Option<DailyRunSummary>,
}

impl DailyStatistics {
    fn record(&mut self, summary: &DailyRunSummary) {
        self.runs += 1;
        self.assigned += summary.assigned() as u64;
        self.failed += summary.failed() as u64;
        self.recovered += summary.recovered.len() as u64;
        self.requeued += summary.requeued.len() as u64;
        self.last_run = Some(summary.started_at);
        self.last_summary = Some(summary.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub interval_hours: i64,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub processing: ProcessingStatus,
}

pub struct DailyPoolProcessor<S> {
    pool: Arc<BookingPool<S>>,
    engine: Arc<PoolProcessingEngine<S>>,
    recovery: Arc<ErrorRecoveryManager<S>>,
    interval: Duration,
    running: AtomicBool,
    statistics: Mutex<DailyStatistics>,
}

impl<S> DailyPoolProcessor<S>
where
    S: BookingStore + 'static,
{
    pub fn new(
        pool: Arc<BookingPool<S>>,
        engine: Arc<PoolProcessingEngine<S>>,
        recovery: Arc<ErrorRecoveryManager<S>>,
        interval: Duration,
    ) -> Self {
        Self {
            pool,
            engine,
            recovery,
            interval,
            running: AtomicBool::new(false),
            statistics: Mutex::new(DailyStatistics::default()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// True when entries are due or the interval since the last run has elapsed.
    pub fn is_processing_needed(&self, now: DateTime<Utc>) -> Result<bool, SchedulerError> {
        let status = self.engine.get_processing_status(now)?;
        if status.ready_for_processing > 0 || status.deadline_passed > 0 {
            return Ok(true);
        }
        Ok(match self.last_run() {
            Some(last_run) => now - last_run >= self.interval,
            None => true,
        })
    }

    pub fn process_daily_pool_now(
        &self,
        now: DateTime<Utc>,
    ) -> Result<DailyRunSummary, SchedulerError> {
        let _guard = RunGuard::acquire(&self.running).ok_or(SchedulerError::AlreadyRunning)?;

        let recovered = self.recovery.recover_stuck_entries(now)?;
        let requeued = self
            .pool
            .retry_failed_entries(self.recovery.retry_policy(), now)?;
        let ready = self.engine.process_ready_entries(now)?;
        let deadline = self.engine.process_deadline_entries(now)?;

        let summary = DailyRunSummary {
            started_at: now,
            recovered,
            requeued,
            ready,
            deadline,
        };
        self.statistics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(&summary);

        info!(
            processed = summary.processed(),
            assigned = summary.assigned(),
            failed = summary.failed(),
            recovered = summary.recovered.len(),
            requeued = summary.requeued.len(),
            "daily pool run completed"
        );
        Ok(summary)
    }

    pub fn get_status(&self, now: DateTime<Utc>) -> Result<SchedulerStatus, SchedulerError> {
        let last_run = self.last_run();
        Ok(SchedulerStatus {
            is_running: self.is_running(),
            interval_hours: self.interval.num_hours(),
            last_run,
            next_run: last_run.map(|last| last + self.interval),
            processing: self.engine.get_processing_status(now)?,
        })
    }

    pub fn get_daily_processing_statistics(&self) -> DailyStatistics {
        self.statistics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ticks every `tick`, running the pool whenever processing is needed, until `cancel` fires.
    pub async fn run(self: Arc<Self>, tick: std::time::Duration, cancel: CancellationToken) {
        info!(
            tick_secs = tick.as_secs(),
            interval_hours = self.interval.num_hours(),
            "pool scheduler started"
        );
        let mut interval = tokio::time::interval(tick);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("pool scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    let processor = Arc::clone(&self);
                    let result = tokio::task::spawn_blocking(move || processor.tick(Utc::now())).await;
                    if let Err(err) = result {
                        error!(error = %err, "pool scheduler tick panicked");
                    }
                }
            }
        }
    }

    fn tick(&self, now: DateTime<Utc>) {
        match self.is_processing_needed(now) {
            Ok(false) => debug!("pool processing not needed"),
            Ok(true) => match self.process_daily_pool_now(now) {
                Ok(_) => {}
                Err(SchedulerError::AlreadyRunning) => {
                    debug!("pool run already in progress; tick skipped");
                }
                Err(err) => error!(error = %err, "scheduled pool run failed"),
            },
            Err(err) => warn!(error = %err, "could not check pool processing status"),
        }
    }

    fn last_run(&self) -> Option<DateTime<Utc>> {
        self.statistics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_run
    }
}

struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
