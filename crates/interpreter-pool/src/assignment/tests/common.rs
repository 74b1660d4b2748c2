use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::assignment::domain::{
    AssignmentRecord, Booking, BookingId, Interpreter, InterpreterId, MeetingType,
};
use crate::assignment::pool::{
    decide_admission, AdmissionDecision, BookingPool, BookingRecord, BookingStore,
    InMemoryBookingStore, PoolTransition, StoreError, TransitionOutcome,
};
use crate::assignment::policy::MeetingTypePriorities;
use crate::assignment::{pool_router, AssignmentService};
use crate::config::PoolConfig;

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
        .single()
        .expect("valid instant")
}

pub(super) fn interpreters() -> Vec<Interpreter> {
    vec![
        Interpreter::new("int-a", "Araya"),
        Interpreter::new("int-b", "Boonmee"),
        Interpreter::new("int-c", "Chanida"),
    ]
}

pub(super) fn memory_store() -> Arc<InMemoryBookingStore> {
    Arc::new(InMemoryBookingStore::with_interpreters(interpreters()))
}

/// A booking starting `days` after [`now`], lasting `hours`.
pub(super) fn booking(id: &str, meeting_type: MeetingType, days: f64, hours: i64) -> Booking {
    let start = now() + Duration::minutes((days * 24.0 * 60.0) as i64);
    Booking::new(id, meeting_type, start, start + Duration::hours(hours))
}

pub(super) fn insert(store: &InMemoryBookingStore, booking: Booking) -> BookingId {
    store
        .insert_booking(booking)
        .expect("booking inserted")
        .booking
        .id
}

/// Inserts the booking and pools it the way admission would, returning its deadline.
pub(super) fn pooled<S: BookingStore + 'static>(
    pool: &BookingPool<S>,
    booking: Booking,
) -> (BookingId, DateTime<Utc>) {
    let priority = MeetingTypePriorities::standard().get(booking.meeting_type);
    let deadline = match decide_admission(&booking, &priority, now()) {
        AdmissionDecision::Pool { deadline, .. } => deadline,
        AdmissionDecision::AssignImmediately => now(),
    };
    let id = pool
        .store()
        .insert_booking(booking)
        .expect("booking inserted")
        .booking
        .id;
    pool.add_to_pool(&id, deadline, now()).expect("booking pooled");
    (id, deadline)
}

pub(super) fn past_assignment(
    interpreter: &str,
    meeting_type: MeetingType,
    days_ago: i64,
    hours: i64,
) -> AssignmentRecord {
    let start = now() - Duration::days(days_ago);
    AssignmentRecord {
        booking_id: BookingId(format!("hist-{interpreter}-{days_ago}")),
        interpreter_id: InterpreterId(interpreter.to_string()),
        meeting_type,
        time_start: start,
        time_end: start + Duration::hours(hours),
    }
}

pub(super) fn config() -> PoolConfig {
    PoolConfig::default()
}

pub(super) fn build_service() -> (
    AssignmentService<InMemoryBookingStore>,
    Arc<InMemoryBookingStore>,
) {
    let store = memory_store();
    let service = AssignmentService::new(store.clone(), &config());
    (service, store)
}

pub(super) fn router_with_service(service: AssignmentService<InMemoryBookingStore>) -> axum::Router {
    pool_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

/// Delegates to the in-memory store but fails every commit, as a flaky database would.
pub(super) struct FlakyCommitStore {
    pub(super) inner: InMemoryBookingStore,
}

impl FlakyCommitStore {
    pub(super) fn new() -> Self {
        Self {
            inner: InMemoryBookingStore::with_interpreters(interpreters()),
        }
    }
}

impl BookingStore for FlakyCommitStore {
    fn insert_booking(&self, booking: Booking) -> Result<BookingRecord, StoreError> {
        self.inner.insert_booking(booking)
    }

    fn fetch(&self, id: &BookingId) -> Result<Option<BookingRecord>, StoreError> {
        self.inner.fetch(id)
    }

    fn pooled(&self) -> Result<Vec<BookingRecord>, StoreError> {
        self.inner.pooled()
    }

    fn transition_pool(
        &self,
        id: &BookingId,
        transition: &PoolTransition,
    ) -> Result<TransitionOutcome, StoreError> {
        self.inner.transition_pool(id, transition)
    }

    fn commit_assignment(
        &self,
        _id: &BookingId,
        _interpreter_id: &InterpreterId,
    ) -> Result<AssignmentRecord, StoreError> {
        Err(StoreError::Unavailable("connection reset".to_string()))
    }

    fn interpreters(&self) -> Result<Vec<Interpreter>, StoreError> {
        self.inner.interpreters()
    }

    fn assignments_since(&self, since: DateTime<Utc>) -> Result<Vec<AssignmentRecord>, StoreError> {
        self.inner.assignments_since(since)
    }
}

/// Blocks the first armed `pooled()` call until the test releases it.
pub(super) struct GatedStore {
    pub(super) inner: InMemoryBookingStore,
    armed: AtomicBool,
    pub(super) entered: Barrier,
    pub(super) release: Barrier,
}

impl GatedStore {
    pub(super) fn new() -> Self {
        Self {
            inner: InMemoryBookingStore::with_interpreters(interpreters()),
            armed: AtomicBool::new(false),
            entered: Barrier::new(2),
            release: Barrier::new(2),
        }
    }

    pub(super) fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

impl BookingStore for GatedStore {
    fn insert_booking(&self, booking: Booking) -> Result<BookingRecord, StoreError> {
        self.inner.insert_booking(booking)
    }

    fn fetch(&self, id: &BookingId) -> Result<Option<BookingRecord>, StoreError> {
        self.inner.fetch(id)
    }

    fn pooled(&self) -> Result<Vec<BookingRecord>, StoreError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.wait();
            self.release.wait();
        }
        self.inner.pooled()
    }

    fn transition_pool(
        &self,
        id: &BookingId,
        transition: &PoolTransition,
    ) -> Result<TransitionOutcome, StoreError> {
        self.inner.transition_pool(id, transition)
    }

    fn commit_assignment(
        &self,
        id: &BookingId,
        interpreter_id: &InterpreterId,
    ) -> Result<AssignmentRecord, StoreError> {
        self.inner.commit_assignment(id, interpreter_id)
    }

    fn interpreters(&self) -> Result<Vec<Interpreter>, StoreError> {
        self.inner.interpreters()
    }

    fn assignments_since(&self, since: DateTime<Utc>) -> Result<Vec<AssignmentRecord>, StoreError> {
        self.inner.assignments_since(since)
    }
}

/// Lets another worker release and re-claim the entry right before the first `Release` lands.
pub(super) struct InterleavingStore {
    pub(super) inner: InMemoryBookingStore,
    pending: AtomicBool,
    reclaim_at: DateTime<Utc>,
}

impl InterleavingStore {
    pub(super) fn new(reclaim_at: DateTime<Utc>) -> Self {
        Self {
            inner: InMemoryBookingStore::with_interpreters(interpreters()),
            pending: AtomicBool::new(true),
            reclaim_at,
        }
    }
}

impl BookingStore for InterleavingStore {
    fn insert_booking(&self, booking: Booking) -> Result<BookingRecord, StoreError> {
        self.inner.insert_booking(booking)
    }

    fn fetch(&self, id: &BookingId) -> Result<Option<BookingRecord>, StoreError> {
        self.inner.fetch(id)
    }

    fn pooled(&self) -> Result<Vec<BookingRecord>, StoreError> {
        self.inner.pooled()
    }

    fn transition_pool(
        &self,
        id: &BookingId,
        transition: &PoolTransition,
    ) -> Result<TransitionOutcome, StoreError> {
        if matches!(transition, PoolTransition::Release { .. })
            && self.pending.swap(false, Ordering::SeqCst)
        {
            self.inner.transition_pool(id, transition)?;
            self.inner.transition_pool(
                id,
                &PoolTransition::Claim {
                    now: self.reclaim_at,
                },
            )?;
        }
        self.inner.transition_pool(id, transition)
    }

    fn commit_assignment(
        &self,
        id: &BookingId,
        interpreter_id: &InterpreterId,
    ) -> Result<AssignmentRecord, StoreError> {
        self.inner.commit_assignment(id, interpreter_id)
    }

    fn interpreters(&self) -> Result<Vec<Interpreter>, StoreError> {
        self.inner.interpreters()
    }

    fn assignments_since(&self, since: DateTime<Utc>) -> Result<Vec<AssignmentRecord>, StoreError> {
        self.inner.assignments_since(since)
    }
}

/// Every call fails as if the database were down.
pub(super) struct UnavailableStore;

impl UnavailableStore {
    fn down<T>() -> Result<T, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}

impl BookingStore for UnavailableStore {
    fn insert_booking(&self, _booking: Booking) -> Result<BookingRecord, StoreError> {
        Self::down()
    }

    fn fetch(&self, _id: &BookingId) -> Result<Option<BookingRecord>, StoreError> {
        Self::down()
    }

    fn pooled(&self) -> Result<Vec<BookingRecord>, StoreError> {
        Self::down()
    }

    fn transition_pool(
        &self,
        _id: &BookingId,
        _transition: &PoolTransition,
    ) -> Result<TransitionOutcome, StoreError> {
        Self::down()
    }

    fn commit_assignment(
        &self,
        _id: &BookingId,
        _interpreter_id: &InterpreterId,
    ) -> Result<AssignmentRecord, StoreError> {
        Self::down()
    }

    fn interpreters(&self) -> Result<Vec<Interpreter>, StoreError> {
        Self::down()
    }

    fn assignments_since(&self, _since: DateTime<Utc>) -> Result<Vec<AssignmentRecord>, StoreError> {
        Self::down()
    }
}
