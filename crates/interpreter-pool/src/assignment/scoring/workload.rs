use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::assignment::domain::{AssignmentRecord, Interpreter, InterpreterId};
use crate::assignment::policy::AssignmentPolicy;

/// Workload snapshot over the fairness window, keyed by interpreter.
///
/// Built once per decision from committed assignments. It may be slightly stale relative to
/// concurrent commits; the hard gap rule is evaluated against this snapshot.
#[derive(Debug, Clone, Default)]
pub struct WorkloadHistory {
    assignments: BTreeMap<InterpreterId, Vec<AssignmentRecord>>,
}

impl WorkloadHistory {
    pub fn window_start(now: DateTime<Utc>, policy: &AssignmentPolicy) -> DateTime<Utc> {
        now - Duration::days(i64::from(policy.weights.fairness_window_days))
    }

    /// Every interpreter gets an entry, so idle interpreters count as zero hours.
    pub fn from_assignments(
        records: impl IntoIterator<Item = AssignmentRecord>,
        interpreters: &[Interpreter],
        window_start: DateTime<Utc>,
    ) -> Self {
        let mut assignments: BTreeMap<InterpreterId, Vec<AssignmentRecord>> = interpreters
            .iter()
            .map(|interpreter| (interpreter.id.clone(), Vec::new()))
            .collect();

        for record in records {
            if record.time_start < window_start {
                continue;
            }
            assignments
                .entry(record.interpreter_id.clone())
                .or_default()
                .push(record);
        }
        for records in assignments.values_mut() {
            records.sort_by_key(|record| record.time_start);
        }

        Self { assignments }
    }

    pub fn hours_for(&self, interpreter_id: &InterpreterId) -> f64 {
        self.assignments
            .get(interpreter_id)
            .map(|records| records.iter().map(AssignmentRecord::hours).sum())
            .unwrap_or(0.0)
    }

    /// Most recent assignment that starts no later than `reference`.
    pub fn last_assignment_before(
        &self,
        interpreter_id: &InterpreterId,
        reference: DateTime<Utc>,
    ) -> Option<&AssignmentRecord> {
        self.assignments
            .get(interpreter_id)?
            .iter()
            .rev()
            .find(|record| record.time_start <= reference)
    }

    pub fn has_conflict(
        &self,
        interpreter_id: &InterpreterId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> bool {
        self.assignments
            .get(interpreter_id)
            .is_some_and(|records| records.iter().any(|record| record.overlaps(start, end)))
    }
}
