use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::PolicyError;
use crate::assignment::domain::MeetingType;

pub const PRIORITY_VALUE_RANGE: (u8, u8) = (1, 10);
pub const URGENT_THRESHOLD_RANGE: (u16, u16) = (0, 365);
pub const GENERAL_THRESHOLD_RANGE: (u16, u16) = (1, 1000);

/// Per meeting type ordering and pooling horizons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingTypePriority {
    pub meeting_type: MeetingType,
    pub priority_value: u8,
    pub urgent_threshold_days: u16,
    pub general_threshold_days: u16,
}

impl MeetingTypePriority {
    pub const fn new(
        meeting_type: MeetingType,
        priority_value: u8,
        urgent_threshold_days: u16,
        general_threshold_days: u16,
    ) -> Self {
        Self {
            meeting_type,
            priority_value,
            urgent_threshold_days,
            general_threshold_days,
        }
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        check_range(
            "priority_value",
            u16::from(self.priority_value),
            (
                u16::from(PRIORITY_VALUE_RANGE.0),
                u16::from(PRIORITY_VALUE_RANGE.1),
            ),
        )?;
        check_range(
            "urgent_threshold_days",
            self.urgent_threshold_days,
            URGENT_THRESHOLD_RANGE,
        )?;
        check_range(
            "general_threshold_days",
            self.general_threshold_days,
            GENERAL_THRESHOLD_RANGE,
        )?;

        if self.urgent_threshold_days >= self.general_threshold_days {
            return Err(PolicyError::InconsistentThresholds {
                meeting_type: self.meeting_type,
                urgent_threshold_days: self.urgent_threshold_days,
                general_threshold_days: self.general_threshold_days,
            });
        }

        Ok(())
    }
}

fn check_range(field: &'static str, value: u16, (min, max): (u16, u16)) -> Result<(), PolicyError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(PolicyError::OutOfRange {
            field,
            value: f64::from(value),
            min: f64::from(min),
            max: f64::from(max),
        })
    }
}

/// Partial update for a single meeting type row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityUpdate {
    pub priority_value: Option<u8>,
    pub urgent_threshold_days: Option<u16>,
    pub general_threshold_days: Option<u16>,
}

/// The full meeting type table. Lookups for a missing type fall back to `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingTypePriorities {
    entries: BTreeMap<MeetingType, MeetingTypePriority>,
}

impl MeetingTypePriorities {
    pub fn standard() -> Self {
        let rows = [
            MeetingTypePriority::new(MeetingType::Dr, 8, 1, 7),
            MeetingTypePriority::new(MeetingType::Vip, 7, 2, 14),
            MeetingTypePriority::new(MeetingType::President, 9, 2, 14),
            MeetingTypePriority::new(MeetingType::Urgent, 10, 1, 3),
            MeetingTypePriority::new(MeetingType::Weekly, 3, 3, 30),
            MeetingTypePriority::new(MeetingType::General, 5, 10, 30),
            MeetingTypePriority::new(MeetingType::Other, 1, 5, 60),
        ];
        Self {
            entries: rows.into_iter().map(|row| (row.meeting_type, row)).collect(),
        }
    }

    pub fn get(&self, meeting_type: MeetingType) -> MeetingTypePriority {
        self.entries
            .get(&meeting_type)
            .or_else(|| self.entries.get(&MeetingType::Other))
            .copied()
            .unwrap_or(MeetingTypePriority::new(meeting_type, 1, 5, 60))
    }

    pub fn rows(&self) -> Vec<MeetingTypePriority> {
        self.entries.values().copied().collect()
    }

    /// Returns a copy of the table with one row updated, or the validation error.
    pub(crate) fn with_update(
        &self,
        meeting_type: MeetingType,
        update: PriorityUpdate,
    ) -> Result<(Self, MeetingTypePriority), PolicyError> {
        let mut row = self.get(meeting_type);
        row.meeting_type = meeting_type;
        if let Some(value) = update.priority_value {
            row.priority_value = value;
        }
        if let Some(days) = update.urgent_threshold_days {
            row.urgent_threshold_days = days;
        }
        if let Some(days) = update.general_threshold_days {
            row.general_threshold_days = days;
        }
        row.validate()?;

        let mut next = self.clone();
        next.entries.insert(meeting_type, row);
        Ok((next, row))
    }
}

impl Default for MeetingTypePriorities {
    fn default() -> Self {
        Self::standard()
    }
}
