use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{PoolInconsistency, PoolRow, PoolTransition, StoredPoolStatus};
use crate::assignment::domain::{
    AssignmentRecord, Booking, BookingId, BookingStatus, Interpreter, InterpreterId,
};

/// Booking row as persisted: the booking itself plus its pool columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub booking: Booking,
    pub pool: PoolRow,
}

impl BookingRecord {
    pub fn new(booking: Booking) -> Self {
        Self {
            booking,
            pool: PoolRow::default(),
        }
    }
}

/// Result of a conditional pool update.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Applied {
        record: BookingRecord,
        previous: Option<StoredPoolStatus>,
    },
    Rejected { current: Option<StoredPoolStatus> },
    /// The transition would have written a row missing required columns; nothing changed.
    Inconsistent(PoolInconsistency),
}

/// Storage collaborator owning booking rows, interpreters, and committed assignments.
///
/// `transition_pool` is the only write path for pool columns. Implementations must check
/// `PoolTransition::permits` against the stored row, refuse a result that fails
/// `PoolRow::check`, and write the new row in one atomic step (a conditional
/// `UPDATE ... WHERE pool_status = ? AND processing_attempts = ?` in a SQL backend).
pub trait BookingStore: Send + Sync {
    fn insert_booking(&self, booking: Booking) -> Result<BookingRecord, StoreError>;
    fn fetch(&self, id: &BookingId) -> Result<Option<BookingRecord>, StoreError>;
    /// Consistent snapshot of every booking with a non-null pool status.
    fn pooled(&self) -> Result<Vec<BookingRecord>, StoreError>;
    fn transition_pool(
        &self,
        id: &BookingId,
        transition: &PoolTransition,
    ) -> Result<TransitionOutcome, StoreError>;
    /// Records the interpreter on the booking and appends to the workload history.
    fn commit_assignment(
        &self,
        id: &BookingId,
        interpreter_id: &InterpreterId,
    ) -> Result<AssignmentRecord, StoreError>;
    fn interpreters(&self) -> Result<Vec<Interpreter>, StoreError>;
    /// Assignments whose meeting starts at or after `since`.
    fn assignments_since(&self, since: DateTime<Utc>) -> Result<Vec<AssignmentRecord>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("booking {0} not found")]
    NotFound(BookingId),
    #[error("booking {0} already exists")]
    Conflict(BookingId),
    #[error("booking {booking_id} is already assigned to {interpreter_id}")]
    AlreadyAssigned {
        booking_id: BookingId,
        interpreter_id: InterpreterId,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Default)]
struct StoreState {
    bookings: BTreeMap<BookingId, BookingRecord>,
    interpreters: BTreeMap<InterpreterId, Interpreter>,
    assignments: Vec<AssignmentRecord>,
}

/// Process-local store. One lock guards all three tables so snapshots never tear.
#[derive(Debug, Default)]
pub struct InMemoryBookingStore {
    state: RwLock<StoreState>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interpreters(interpreters: impl IntoIterator<Item = Interpreter>) -> Self {
        let store = Self::default();
        {
            let mut state = store.state.write().unwrap_or_else(PoisonError::into_inner);
            for interpreter in interpreters {
                state
                    .interpreters
                    .insert(interpreter.id.clone(), interpreter);
            }
        }
        store
    }

    pub fn upsert_interpreter(&self, interpreter: Interpreter) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state
            .interpreters
            .insert(interpreter.id.clone(), interpreter);
        Ok(())
    }

    /// Seeds workload history, e.g. assignments made before the pool existed.
    pub fn record_assignment(&self, record: AssignmentRecord) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.assignments.push(record);
        Ok(())
    }

    /// Marks a booking cancelled without touching its pool columns, as the booking lifecycle does
    /// before it gets around to removing the entry.
    pub fn cancel_booking(&self, id: &BookingId) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let record = state
            .bookings
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        record.booking.status = BookingStatus::Cancelled;
        Ok(())
    }

    /// Overwrites the pool columns without any state check. Only for seeding and repair tooling.
    pub fn overwrite_pool_row(&self, id: &BookingId, row: PoolRow) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let record = state
            .bookings
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        record.pool = row;
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }
}

impl BookingStore for InMemoryBookingStore {
    fn insert_booking(&self, booking: Booking) -> Result<BookingRecord, StoreError> {
        let mut state = self.write()?;
        if state.bookings.contains_key(&booking.id) {
            return Err(StoreError::Conflict(booking.id));
        }
        let record = BookingRecord::new(booking);
        state
            .bookings
            .insert(record.booking.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &BookingId) -> Result<Option<BookingRecord>, StoreError> {
        let state = self.read()?;
        Ok(state.bookings.get(id).cloned())
    }

    fn pooled(&self) -> Result<Vec<BookingRecord>, StoreError> {
        let state = self.read()?;
        Ok(state
            .bookings
            .values()
            .filter(|record| record.pool.is_pooled())
            .cloned()
            .collect())
    }

    fn transition_pool(
        &self,
        id: &BookingId,
        transition: &PoolTransition,
    ) -> Result<TransitionOutcome, StoreError> {
        let mut state = self.write()?;
        let record = state
            .bookings
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if !transition.permits(&record.pool) {
            return Ok(TransitionOutcome::Rejected {
                current: record.pool.status,
            });
        }
        let next = transition.apply(&record.pool);
        if let Err(issue) = next.check(id) {
            return Ok(TransitionOutcome::Inconsistent(issue));
        }

        let previous = record.pool.status;
        record.pool = next;
        Ok(TransitionOutcome::Applied {
            record: record.clone(),
            previous,
        })
    }

    fn commit_assignment(
        &self,
        id: &BookingId,
        interpreter_id: &InterpreterId,
    ) -> Result<AssignmentRecord, StoreError> {
        let mut guard = self.write()?;
        let state = &mut *guard;
        let record = state
            .bookings
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if let Some(existing) = &record.booking.interpreter_id {
            return Err(StoreError::AlreadyAssigned {
                booking_id: id.clone(),
                interpreter_id: existing.clone(),
            });
        }

        record.booking.interpreter_id = Some(interpreter_id.clone());
        record.booking.status = BookingStatus::Approved;

        let assignment = AssignmentRecord {
            booking_id: id.clone(),
            interpreter_id: interpreter_id.clone(),
            meeting_type: record.booking.meeting_type,
            time_start: record.booking.time_start,
            time_end: record.booking.time_end,
        };
        state.assignments.push(assignment.clone());
        Ok(assignment)
    }

    fn interpreters(&self) -> Result<Vec<Interpreter>, StoreError> {
        let state = self.read()?;
        Ok(state.interpreters.values().cloned().collect())
    }

    fn assignments_since(&self, since: DateTime<Utc>) -> Result<Vec<AssignmentRecord>, StoreError> {
        let state = self.read()?;
        Ok(state
            .assignments
            .iter()
            .filter(|record| record.time_start >= since)
            .cloned()
            .collect())
    }
}
