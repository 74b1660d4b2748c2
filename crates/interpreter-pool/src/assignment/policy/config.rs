use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PolicyError;

pub const FAIRNESS_WINDOW_DAYS_RANGE: (u16, u16) = (7, 90);
pub const MAX_GAP_HOURS_RANGE: (f64, f64) = (1.0, 100.0);
pub const WEIGHT_RANGE: (f64, f64) = (0.0, 5.0);
pub const DR_PENALTY_RANGE: (f64, f64) = (-2.0, 0.0);

const BALANCE_WEIGHTS: PolicyWeights = PolicyWeights {
    fairness_window_days: 60,
    max_gap_hours: 2.0,
    w_fair: 2.0,
    w_urgency: 0.6,
    w_lrs: 0.6,
    dr_consecutive_penalty: -0.8,
};

const URGENT_WEIGHTS: PolicyWeights = PolicyWeights {
    fairness_window_days: 14,
    max_gap_hours: 10.0,
    w_fair: 0.5,
    w_urgency: 2.5,
    w_lrs: 0.2,
    dr_consecutive_penalty: -0.1,
};

const NORMAL_WEIGHTS: PolicyWeights = PolicyWeights {
    fairness_window_days: 30,
    max_gap_hours: 5.0,
    w_fair: 1.2,
    w_urgency: 0.8,
    w_lrs: 0.3,
    dr_consecutive_penalty: -0.5,
};

/// Selects a locked weight preset, or unlocks manual tuning with `Custom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyMode {
    Balance,
    Urgent,
    Normal,
    Custom,
}

impl PolicyMode {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Balance => "BALANCE",
            Self::Urgent => "URGENT",
            Self::Normal => "NORMAL",
            Self::Custom => "CUSTOM",
        }
    }

    /// Fixed weights for the named modes; `Custom` has none.
    pub const fn preset(self) -> Option<PolicyWeights> {
        match self {
            Self::Balance => Some(BALANCE_WEIGHTS),
            Self::Urgent => Some(URGENT_WEIGHTS),
            Self::Normal => Some(NORMAL_WEIGHTS),
            Self::Custom => None,
        }
    }
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PolicyMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "balance" => Ok(Self::Balance),
            "urgent" => Ok(Self::Urgent),
            "normal" => Ok(Self::Normal),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown policy mode '{other}'")),
        }
    }
}

/// Numeric knobs of the scoring function. Fully determined by the mode unless it is `Custom`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyWeights {
    pub fairness_window_days: u16,
    pub max_gap_hours: f64,
    pub w_fair: f64,
    pub w_urgency: f64,
    pub w_lrs: f64,
    pub dr_consecutive_penalty: f64,
}

impl PolicyWeights {
    pub fn validate(&self) -> Result<(), PolicyError> {
        let (min_days, max_days) = FAIRNESS_WINDOW_DAYS_RANGE;
        if !(min_days..=max_days).contains(&self.fairness_window_days) {
            return Err(PolicyError::OutOfRange {
                field: "fairness_window_days",
                value: f64::from(self.fairness_window_days),
                min: f64::from(min_days),
                max: f64::from(max_days),
            });
        }

        check_range("max_gap_hours", self.max_gap_hours, MAX_GAP_HOURS_RANGE)?;
        check_range("w_fair", self.w_fair, WEIGHT_RANGE)?;
        check_range("w_urgency", self.w_urgency, WEIGHT_RANGE)?;
        check_range("w_lrs", self.w_lrs, WEIGHT_RANGE)?;
        check_range(
            "dr_consecutive_penalty",
            self.dr_consecutive_penalty,
            DR_PENALTY_RANGE,
        )
    }
}

fn check_range(field: &'static str, value: f64, (min, max): (f64, f64)) -> Result<(), PolicyError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(PolicyError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentPolicy {
    pub auto_assign_enabled: bool,
    pub mode: PolicyMode,
    #[serde(flatten)]
    pub weights: PolicyWeights,
    pub version: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AssignmentPolicy {
    /// Builds a policy from a preset mode. `Custom` starts from the `Normal` weights.
    pub fn from_mode(mode: PolicyMode) -> Self {
        let weights = mode.preset().unwrap_or(NORMAL_WEIGHTS);
        Self {
            auto_assign_enabled: true,
            mode,
            weights,
            version: 1,
            updated_at: None,
        }
    }

    /// Computes the policy that results from `update` without touching `self`.
    ///
    /// A mode change to a preset applies the preset unconditionally, discarding any weight
    /// fields in the same update. Weight edits are only accepted while the policy is (or
    /// becomes) `Custom`. The result is fully validated before it is returned.
    pub fn apply(&self, update: &PolicyUpdate) -> Result<Self, PolicyError> {
        let mut next = self.clone();

        if let Some(enabled) = update.auto_assign_enabled {
            next.auto_assign_enabled = enabled;
        }

        let target_mode = update.mode.unwrap_or(self.mode);
        match target_mode.preset() {
            Some(preset) => {
                if update.mode.is_none() && update.has_weight_fields() {
                    return Err(PolicyError::ModeLocked { mode: self.mode });
                }
                next.mode = target_mode;
                next.weights = preset;
            }
            None => {
                next.mode = PolicyMode::Custom;
                update.merge_weights(&mut next.weights);
            }
        }

        next.weights.validate()?;
        Ok(next)
    }
}

impl Default for AssignmentPolicy {
    fn default() -> Self {
        Self::from_mode(PolicyMode::Normal)
    }
}

/// Partial policy update as submitted by the admin configuration screens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyUpdate {
    pub auto_assign_enabled: Option<bool>,
    pub mode: Option<PolicyMode>,
    pub fairness_window_days: Option<u16>,
    pub max_gap_hours: Option<f64>,
    pub w_fair: Option<f64>,
    pub w_urgency: Option<f64>,
    pub w_lrs: Option<f64>,
    pub dr_consecutive_penalty: Option<f64>,
}

impl PolicyUpdate {
    pub fn mode(mode: PolicyMode) -> Self {
        Self {
            mode: Some(mode),
            ..Self::default()
        }
    }

    pub fn has_weight_fields(&self) -> bool {
        self.fairness_window_days.is_some()
            || self.max_gap_hours.is_some()
            || self.w_fair.is_some()
            || self.w_urgency.is_some()
            || self.w_lrs.is_some()
            || self.dr_consecutive_penalty.is_some()
    }

    fn merge_weights(&self, weights: &mut PolicyWeights) {
        if let Some(days) = self.fairness_window_days {
            weights.fairness_window_days = days;
        }
        if let Some(gap) = self.max_gap_hours {
            weights.max_gap_hours = gap;
        }
        if let Some(value) = self.w_fair {
            weights.w_fair = value;
        }
        if let Some(value) = self.w_urgency {
            weights.w_urgency = value;
        }
        if let Some(value) = self.w_lrs {
            weights.w_lrs = value;
        }
        if let Some(value) = self.dr_consecutive_penalty {
            weights.dr_consecutive_penalty = value;
        }
    }
}
