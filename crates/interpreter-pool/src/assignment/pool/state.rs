use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::store::BookingRecord;
use crate::assignment::domain::{BookingId, MeetingType};

/// Observable pool status. `Ready` is derived from the deadline at read time and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    None,
    Waiting,
    Ready,
    Processing,
    Failed,
}

impl PoolStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Waiting => "waiting",
            Self::Ready => "ready",
            Self::Processing => "processing",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Status as persisted on the booking row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoredPoolStatus {
    Waiting,
    Processing,
    Failed,
}

/// Pool columns of a booking row, in the loose shape the storage layer keeps them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolRow {
    pub status: Option<StoredPoolStatus>,
    pub entry_time: Option<DateTime<Utc>>,
    pub deadline_time: Option<DateTime<Utc>>,
    pub processing_attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl PoolRow {
    pub fn is_pooled(&self) -> bool {
        self.status.is_some()
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> PoolStatus {
        match self.status {
            None => PoolStatus::None,
            Some(StoredPoolStatus::Waiting) => match self.deadline_time {
                Some(deadline) if now >= deadline => PoolStatus::Ready,
                _ => PoolStatus::Waiting,
            },
            Some(StoredPoolStatus::Processing) => PoolStatus::Processing,
            Some(StoredPoolStatus::Failed) => PoolStatus::Failed,
        }
    }

    /// Columns a pooled row cannot do without. Unpooled rows always pass.
    pub fn check(&self, booking_id: &BookingId) -> Result<(), PoolInconsistency> {
        let Some(status) = self.status else {
            return Ok(());
        };
        if self.entry_time.is_none() {
            return Err(PoolInconsistency::MissingEntryTime(booking_id.clone()));
        }
        if self.deadline_time.is_none() {
            return Err(PoolInconsistency::MissingDeadline(booking_id.clone()));
        }
        if status == StoredPoolStatus::Processing && self.last_attempt_at.is_none() {
            return Err(PoolInconsistency::MissingProcessingStart(booking_id.clone()));
        }
        Ok(())
    }
}

/// Every legal edge of the pool state machine.
///
/// The store applies a transition only when `permits` accepts the row it currently holds,
/// inside a single atomic update.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolTransition {
    Admit {
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    },
    Claim {
        now: DateTime<Utc>,
    },
    /// Returns one specific claim to `waiting`. A row claimed again since is left alone.
    Release {
        attempt: u32,
        since: DateTime<Utc>,
    },
    Fail {
        reason: String,
    },
    Requeue,
    Clear,
}

impl PoolTransition {
    pub fn permits(&self, row: &PoolRow) -> bool {
        use StoredPoolStatus::{Failed, Processing, Waiting};

        let current = row.status;
        match self {
            Self::Admit { .. } => current.is_none(),
            Self::Claim { .. } => current == Some(Waiting),
            Self::Release { attempt, since } => {
                current == Some(Processing)
                    && row.processing_attempts == *attempt
                    && row.last_attempt_at == Some(*since)
            }
            Self::Fail { .. } => matches!(current, Some(Waiting | Processing)),
            Self::Requeue => current == Some(Failed),
            Self::Clear => true,
        }
    }

    pub fn apply(&self, row: &PoolRow) -> PoolRow {
        match self {
            Self::Admit { deadline, now } => PoolRow {
                status: Some(StoredPoolStatus::Waiting),
                entry_time: Some(*now),
                deadline_time: Some(*deadline),
                processing_attempts: 0,
                last_attempt_at: None,
                failure_reason: None,
            },
            Self::Claim { now } => PoolRow {
                status: Some(StoredPoolStatus::Processing),
                processing_attempts: row.processing_attempts.saturating_add(1),
                last_attempt_at: Some(*now),
                failure_reason: None,
                ..row.clone()
            },
            Self::Release { .. } | Self::Requeue => PoolRow {
                status: Some(StoredPoolStatus::Waiting),
                failure_reason: None,
                ..row.clone()
            },
            Self::Fail { reason } => PoolRow {
                status: Some(StoredPoolStatus::Failed),
                failure_reason: Some(reason.clone()),
                ..row.clone()
            },
            Self::Clear => PoolRow::default(),
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Admit { .. } => "admit",
            Self::Claim { .. } => "claim",
            Self::Release { .. } => "release",
            Self::Fail { .. } => "fail",
            Self::Requeue => "requeue",
            Self::Clear => "clear",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PoolState {
    Waiting,
    Processing { since: DateTime<Utc> },
    Failed { reason: String },
}

/// Typed view of a pooled booking. Rows that cannot be read into this shape are inconsistent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolEntry {
    pub booking_id: BookingId,
    pub meeting_type: MeetingType,
    pub time_start: DateTime<Utc>,
    pub entry_time: DateTime<Utc>,
    pub deadline_time: DateTime<Utc>,
    pub processing_attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub state: PoolState,
}

impl PoolEntry {
    /// `Ok(None)` for bookings outside the pool.
    pub fn from_record(record: &BookingRecord) -> Result<Option<Self>, PoolInconsistency> {
        let row = &record.pool;
        let Some(status) = row.status else {
            return Ok(None);
        };
        let booking_id = record.booking.id.clone();

        let entry_time = row
            .entry_time
            .ok_or_else(|| PoolInconsistency::MissingEntryTime(booking_id.clone()))?;
        let deadline_time = row
            .deadline_time
            .ok_or_else(|| PoolInconsistency::MissingDeadline(booking_id.clone()))?;

        let state = match status {
            StoredPoolStatus::Waiting => PoolState::Waiting,
            StoredPoolStatus::Processing => PoolState::Processing {
                since: row
                    .last_attempt_at
                    .ok_or_else(|| PoolInconsistency::MissingProcessingStart(booking_id.clone()))?,
            },
            StoredPoolStatus::Failed => PoolState::Failed {
                reason: row
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "unknown failure".to_string()),
            },
        };

        Ok(Some(Self {
            booking_id,
            meeting_type: record.booking.meeting_type,
            time_start: record.booking.time_start,
            entry_time,
            deadline_time,
            processing_attempts: row.processing_attempts,
            last_attempt_at: row.last_attempt_at,
            state,
        }))
    }

    pub fn status(&self, now: DateTime<Utc>) -> PoolStatus {
        match self.state {
            PoolState::Waiting if self.is_deadline_passed(now) => PoolStatus::Ready,
            PoolState::Waiting => PoolStatus::Waiting,
            PoolState::Processing { .. } => PoolStatus::Processing,
            PoolState::Failed { .. } => PoolStatus::Failed,
        }
    }

    pub fn is_deadline_passed(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline_time
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.state, PoolState::Waiting)
    }

    /// The release edge for the claim this entry was read under.
    pub fn release(&self) -> Option<PoolTransition> {
        match self.state {
            PoolState::Processing { since } => Some(PoolTransition::Release {
                attempt: self.processing_attempts,
                since,
            }),
            _ => None,
        }
    }

    pub fn time_in_pool(&self, now: DateTime<Utc>) -> Duration {
        now - self.entry_time
    }

    pub fn view(&self, now: DateTime<Utc>) -> PoolEntryView {
        PoolEntryView {
            booking_id: self.booking_id.clone(),
            meeting_type: self.meeting_type,
            status: self.status(now),
            time_start: self.time_start,
            entry_time: self.entry_time,
            deadline_time: self.deadline_time,
            processing_attempts: self.processing_attempts,
            hours_in_pool: self.time_in_pool(now).num_minutes() as f64 / 60.0,
            failure_reason: match &self.state {
                PoolState::Failed { reason } => Some(reason.clone()),
                _ => None,
            },
        }
    }
}

/// Flattened entry representation for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolEntryView {
    pub booking_id: BookingId,
    pub meeting_type: MeetingType,
    pub status: PoolStatus,
    pub time_start: DateTime<Utc>,
    pub entry_time: DateTime<Utc>,
    pub deadline_time: DateTime<Utc>,
    pub processing_attempts: u32,
    pub hours_in_pool: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolInconsistency {
    #[error("booking {0} is pooled without an entry time")]
    MissingEntryTime(BookingId),
    #[error("booking {0} is pooled without a deadline")]
    MissingDeadline(BookingId),
    #[error("booking {0} is processing without an attempt timestamp")]
    MissingProcessingStart(BookingId),
}

impl PoolInconsistency {
    pub fn booking_id(&self) -> &BookingId {
        match self {
            Self::MissingEntryTime(id)
            | Self::MissingDeadline(id)
            | Self::MissingProcessingStart(id) => id,
        }
    }
}
