use crate::infra::{morning_of, parse_date, parse_policy_mode, seed_demo};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::Args;
use interpreter_pool::assignment::{
    AdmissionOutcome, AssignmentService, BookingId, BookingStore, DailyRunSummary, EntryResult,
    InMemoryBookingStore, PolicyMode,
};
use interpreter_pool::config::PoolConfig;
use interpreter_pool::error::AppError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// First simulated day (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) start: Option<NaiveDate>,
    /// Number of daily pool runs to simulate.
    #[arg(long, default_value_t = 30)]
    pub(crate) days: u32,
    /// Policy mode used for scoring (balance, urgent, normal, custom).
    #[arg(long, value_parser = parse_policy_mode, default_value = "normal")]
    pub(crate) mode: PolicyMode,
    /// Print the candidate ranking for the first pooled booking before any run.
    #[arg(long)]
    pub(crate) show_candidates: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ScenarioArgs {
    /// Day the demo roster is admitted (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) start: Option<NaiveDate>,
    /// Days between admission and the evaluated instant.
    #[arg(long, default_value_t = 0)]
    pub(crate) after_days: u32,
    /// Policy mode used for scoring (balance, urgent, normal, custom).
    #[arg(long, value_parser = parse_policy_mode, default_value = "normal")]
    pub(crate) mode: PolicyMode,
}

impl ScenarioArgs {
    fn prepare(self) -> Result<(Scenario, DateTime<Utc>), AppError> {
        let start = self.start.unwrap_or_else(|| Utc::now().date_naive());
        let scenario = Scenario::seed(start, self.mode)?;
        let at = scenario.now + Duration::days(i64::from(self.after_days));
        Ok((scenario, at))
    }
}

/// The demo roster admitted into a fresh in-memory store.
struct Scenario {
    service: AssignmentService<InMemoryBookingStore>,
    store: Arc<InMemoryBookingStore>,
    now: DateTime<Utc>,
    admitted: Vec<(BookingId, AdmissionOutcome)>,
}

impl Scenario {
    fn seed(start: NaiveDate, mode: PolicyMode) -> Result<Self, AppError> {
        let config = PoolConfig {
            policy_mode: mode,
            ..PoolConfig::default()
        };
        let store = Arc::new(InMemoryBookingStore::new());
        let service = AssignmentService::new(Arc::clone(&store), &config);
        let now = morning_of(start);
        let admitted = seed_demo(&service, &store, now)?;
        Ok(Self {
            service,
            store,
            now,
            admitted,
        })
    }
}

/// One daily run over the demo roster, printed as JSON.
pub(crate) fn run_process(args: ScenarioArgs) -> Result<(), AppError> {
    let (scenario, at) = args.prepare()?;
    let summary = scenario.service.process_now(at)?;
    print_json("Daily run summary", &summary);
    Ok(())
}

/// Health check of the demo pool at the requested instant, printed as JSON.
pub(crate) fn run_health(args: ScenarioArgs) -> Result<(), AppError> {
    let (scenario, at) = args.prepare()?;
    let report = scenario.service.health_check(at)?;
    print_json("Pool health", &report);
    Ok(())
}

fn print_json(title: &str, payload: &impl Serialize) {
    match serde_json::to_string_pretty(payload) {
        Ok(json) => println!("{title}:\n{json}"),
        Err(err) => println!("{title} unavailable: {err}"),
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        start,
        days,
        mode,
        show_candidates,
    } = args;

    let start = start.unwrap_or_else(|| Utc::now().date_naive());
    println!("Interpreter pool demo ({} mode, starting {})", mode.label(), start);
    let Scenario {
        service,
        store,
        now,
        admitted,
    } = Scenario::seed(start, mode)?;
    println!("\nAdmissions");
    for (booking_id, outcome) in &admitted {
        match outcome {
            AdmissionOutcome::Assigned {
                interpreter_id,
                score,
            } => println!("- {booking_id}: assigned to {interpreter_id} on admission (score {score:.3})"),
            AdmissionOutcome::Pooled {
                deadline,
                beyond_horizon,
            } => println!(
                "- {booking_id}: pooled until {}{}",
                deadline.format("%Y-%m-%d %H:%M"),
                if *beyond_horizon { " (beyond planning horizon)" } else { "" }
            ),
            AdmissionOutcome::Deferred { reason } => {
                println!("- {booking_id}: deferred to pool ({reason})")
            }
        }
    }

    if show_candidates {
        let pooled = admitted
            .iter()
            .find(|(_, outcome)| matches!(outcome, AdmissionOutcome::Pooled { .. }));
        if let Some((booking_id, _)) = pooled {
            println!("\nCandidate ranking for {booking_id}");
            for candidate in service.preview_candidates(booking_id, now)? {
                let note = candidate
                    .exclusion
                    .as_ref()
                    .map(|reason| format!(" [excluded: {}]", reason.summary()))
                    .unwrap_or_default();
                println!(
                    "  - {}: total {:.3} | fair {:.3} | urgency {:.3} | rotation {:.3}{}",
                    candidate.interpreter_id,
                    candidate.total,
                    candidate.fairness,
                    candidate.urgency,
                    candidate.rotation,
                    note
                );
            }
        }
    }

    println!("\nDaily runs");
    for day in 0..days {
        let at = now + Duration::days(i64::from(day));
        let summary = service.process_now(at)?;
        render_run(at, &summary);
    }

    let end = now + Duration::days(i64::from(days));
    let stats = service.pool_stats(end)?;
    println!(
        "\nPool after {days} days: {} entries ({} waiting, {} ready, {} failed)",
        stats.total_in_pool, stats.waiting, stats.ready, stats.failed
    );
    let status = service.processing_status(end)?;
    println!(
        "Due now: {} ready | {} past deadline | auto-assign {}",
        status.ready_for_processing,
        status.deadline_passed,
        if status.auto_assign_enabled { "on" } else { "off" }
    );

    let workload = store
        .assignments_since(now - Duration::days(1))
        .map_err(interpreter_pool::assignment::PoolError::from)?
        .into_iter()
        .fold(BTreeMap::new(), |mut totals, record| {
            *totals.entry(record.interpreter_id.clone()).or_insert(0.0) += record.hours();
            totals
        });
    println!("Assigned hours by interpreter:");
    for interpreter in store
        .interpreters()
        .map_err(interpreter_pool::assignment::PoolError::from)?
    {
        let hours = workload.get(&interpreter.id).copied().unwrap_or(0.0);
        println!("  - {} ({}): {hours:.1}h", interpreter.id, interpreter.name);
    }

    let totals = service.scheduler().get_daily_processing_statistics();
    println!(
        "Scheduler totals: {} runs | {} assigned | {} failed | {} recovered | {} requeued",
        totals.runs, totals.assigned, totals.failed, totals.recovered, totals.requeued
    );
    Ok(())
}

fn render_run(at: DateTime<Utc>, summary: &DailyRunSummary) {
    if summary.processed() == 0 && summary.recovered.is_empty() && summary.requeued.is_empty() {
        return;
    }
    println!(
        "- {}: {} assigned, {} failed",
        at.format("%Y-%m-%d"),
        summary.assigned(),
        summary.failed()
    );
    for outcome in summary.ready.outcomes.iter().chain(&summary.deadline.outcomes) {
        match &outcome.result {
            EntryResult::Assigned {
                interpreter_id,
                score,
            } => println!("    {} -> {interpreter_id} ({score:.3})", outcome.booking_id),
            EntryResult::Failed { reason } => {
                println!("    {} failed: {reason}", outcome.booking_id)
            }
            other => println!("    {}: {other:?}", outcome.booking_id),
        }
    }
}

pub(crate) fn run_presets() {
    println!("Policy presets");
    for mode in [PolicyMode::Balance, PolicyMode::Normal, PolicyMode::Urgent] {
        if let Some(weights) = mode.preset() {
            println!(
                "- {}: window {}d | max gap {}h | w_fair {} | w_urgency {} | w_lrs {} | DR penalty {}",
                mode.label(),
                weights.fairness_window_days,
                weights.max_gap_hours,
                weights.w_fair,
                weights.w_urgency,
                weights.w_lrs,
                weights.dr_consecutive_penalty
            );
        }
    }
    println!(
        "- {}: starts from the {} weights; every field is editable",
        PolicyMode::Custom.label(),
        PolicyMode::Normal.label()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_run_assigns_bookings_due_by_then() {
        let args = ScenarioArgs {
            start: Some(parse_date("2025-06-02").expect("valid date")),
            after_days: 3,
            mode: PolicyMode::Normal,
        };
        let (scenario, at) = args.prepare().expect("scenario seeded");

        let summary = scenario.service.process_now(at).expect("daily run");

        assert_eq!(summary.assigned(), 3);
        assert_eq!(summary.failed(), 0);
        let health = scenario.service.health_check(at).expect("health");
        assert!(health.is_healthy);
    }
}
