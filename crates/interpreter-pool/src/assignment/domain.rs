use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for room bookings that require an interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookingId(pub String);

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for interpreters. Ordering is the final tie-break when scores are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterpreterId(pub String);

impl fmt::Display for InterpreterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingType {
    Dr,
    Vip,
    President,
    Urgent,
    Weekly,
    General,
    Other,
}

impl MeetingType {
    pub const fn ordered() -> [Self; 7] {
        [
            Self::Dr,
            Self::Vip,
            Self::President,
            Self::Urgent,
            Self::Weekly,
            Self::General,
            Self::Other,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Dr => "DR",
            Self::Vip => "VIP",
            Self::President => "President",
            Self::Urgent => "Urgent",
            Self::Weekly => "Weekly",
            Self::General => "General",
            Self::Other => "Other",
        }
    }

    /// DR meetings are high-intensity; back-to-back DR assignments are penalised.
    pub const fn is_high_intensity(self) -> bool {
        matches!(self, Self::Dr)
    }
}

impl fmt::Display for MeetingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown meeting type '{0}'")]
pub struct UnknownMeetingType(pub String);

impl FromStr for MeetingType {
    type Err = UnknownMeetingType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dr" => Ok(Self::Dr),
            "vip" => Ok(Self::Vip),
            "president" => Ok(Self::President),
            "urgent" => Ok(Self::Urgent),
            "weekly" => Ok(Self::Weekly),
            "general" => Ok(Self::General),
            "other" => Ok(Self::Other),
            _ => Err(UnknownMeetingType(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Waiting,
    Approved,
    Cancelled,
}

impl BookingStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Waiting => "Waiting",
            Self::Approved => "Approved",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// Room booking as seen by the assignment core. Pool fields live beside it in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub meeting_type: MeetingType,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    pub interpreter_id: Option<InterpreterId>,
    pub status: BookingStatus,
}

impl Booking {
    pub fn new(
        id: impl Into<String>,
        meeting_type: MeetingType,
        time_start: DateTime<Utc>,
        time_end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BookingId(id.into()),
            meeting_type,
            time_start,
            time_end,
            interpreter_id: None,
            status: BookingStatus::Waiting,
        }
    }

    pub fn duration_hours(&self) -> f64 {
        hours_between(self.time_start, self.time_end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpreter {
    pub id: InterpreterId,
    pub name: String,
    pub active: bool,
}

impl Interpreter {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: InterpreterId(id.into()),
            name: name.into(),
            active: true,
        }
    }
}

/// Committed interpreter assignment; the workload history is built from these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub booking_id: BookingId,
    pub interpreter_id: InterpreterId,
    pub meeting_type: MeetingType,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
}

impl AssignmentRecord {
    pub fn hours(&self) -> f64 {
        hours_between(self.time_start, self.time_end)
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.time_start < end && start < self.time_end
    }
}

pub(crate) fn hours_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    ((end - start).num_seconds() as f64 / 3600.0).max(0.0)
}

pub(crate) fn days_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_seconds() as f64 / 86_400.0
}
