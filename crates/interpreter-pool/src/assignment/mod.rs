//! Deferred interpreter assignment.
//!
//! Bookings that do not need an interpreter right away wait in the pool until their deadline.
//! The engine then claims each due entry, ranks the active interpreters under the current
//! policy, and commits the best one. The recovery manager and the daily processor keep entries
//! from being stranded.

pub mod domain;
pub mod engine;
pub mod policy;
pub mod pool;
pub mod recovery;
pub mod router;
pub mod scheduler;
pub mod scoring;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    AssignmentRecord, Booking, BookingId, BookingStatus, Interpreter, InterpreterId, MeetingType,
    UnknownMeetingType,
};
pub use engine::{
    AdmissionOutcome, BatchKind, EngineError, EngineSettings, EntryOutcome, EntryResult,
    PoolProcessingEngine, ProcessingReport, ProcessingStatus,
};
pub use policy::{
    AssignmentPolicy, MeetingTypePriorities, MeetingTypePriority, PolicyError, PolicyMode,
    PolicySnapshot, PolicyStore, PolicyUpdate, PolicyWeights, PriorityUpdate,
};
pub use pool::{
    AdmissionDecision, BookingPool, BookingRecord, BookingStore, InMemoryBookingStore, PoolEntry,
    PoolEntryView, PoolError, PoolInconsistency, PoolRow, PoolState, PoolStats, PoolStatus,
    PoolTransition, StoreError, StoredPoolStatus, TransitionOutcome,
};
pub use recovery::{
    ErrorRecoveryManager, HealthIssue, HealthReport, RecoveryOutcome, RecoveryStatus, RetryPolicy,
};
pub use router::pool_router;
pub use scheduler::{
    DailyPoolProcessor, DailyRunSummary, DailyStatistics, SchedulerError, SchedulerStatus,
};
pub use scoring::{CandidateScore, ExclusionReason, ScoringContext, WorkloadHistory};
pub use service::AssignmentService;
