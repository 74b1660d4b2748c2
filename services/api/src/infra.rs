use chrono::{DateTime, Duration, NaiveDate, Utc};
use interpreter_pool::assignment::{
    AdmissionOutcome, AssignmentService, Booking, BookingId, BookingStore, InMemoryBookingStore,
    Interpreter, MeetingType, PolicyMode,
};
use interpreter_pool::error::AppError;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

const DEMO_INTERPRETERS: [(&str, &str); 5] = [
    ("int-001", "Araya Srisuk"),
    ("int-002", "Boonmee Chaiyo"),
    ("int-003", "Chanida Wong"),
    ("int-004", "Darin Petch"),
    ("int-005", "Ekkachai Rattana"),
];

/// (meeting type, days ahead, start hour, duration hours)
const DEMO_BOOKINGS: [(MeetingType, i64, u32, i64); 14] = [
    (MeetingType::President, 1, 9, 2),
    (MeetingType::Dr, 3, 13, 3),
    (MeetingType::Dr, 9, 9, 3),
    (MeetingType::Vip, 6, 10, 2),
    (MeetingType::Vip, 16, 14, 1),
    (MeetingType::Weekly, 5, 9, 1),
    (MeetingType::Weekly, 12, 9, 1),
    (MeetingType::Weekly, 19, 9, 1),
    (MeetingType::General, 11, 13, 2),
    (MeetingType::General, 14, 10, 4),
    (MeetingType::General, 21, 15, 2),
    (MeetingType::General, 45, 9, 2),
    (MeetingType::Other, 8, 16, 1),
    (MeetingType::Other, 30, 11, 3),
];

/// Loads the demo interpreters and bookings into `store`, admitting each booking at `now`.
pub(crate) fn seed_demo(
    service: &AssignmentService<InMemoryBookingStore>,
    store: &InMemoryBookingStore,
    now: DateTime<Utc>,
) -> Result<Vec<(BookingId, AdmissionOutcome)>, AppError> {
    for (id, name) in DEMO_INTERPRETERS {
        store
            .upsert_interpreter(Interpreter::new(id, name))
            .map_err(interpreter_pool::assignment::PoolError::from)?;
    }

    let today = now.date_naive();
    let mut admitted = Vec::with_capacity(DEMO_BOOKINGS.len());
    for (index, (meeting_type, days_ahead, hour, hours)) in DEMO_BOOKINGS.into_iter().enumerate() {
        let start = at_hour(today + Duration::days(days_ahead), hour);
        let booking = Booking::new(
            format!("bk-{:03}", index + 1),
            meeting_type,
            start,
            start + Duration::hours(hours),
        );
        let record = store
            .insert_booking(booking)
            .map_err(interpreter_pool::assignment::PoolError::from)?;
        let outcome = service.admit_booking(&record.booking.id, now)?;
        admitted.push((record.booking.id, outcome));
    }
    Ok(admitted)
}

fn at_hour(day: NaiveDate, hour: u32) -> DateTime<Utc> {
    day.and_hms_opt(hour, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or_else(|| day.and_time(chrono::NaiveTime::MIN).and_utc())
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_policy_mode(raw: &str) -> Result<PolicyMode, String> {
    raw.parse::<PolicyMode>()
}

/// Start of the given day at 08:00 UTC, the hour the demo treats as its daily run.
pub(crate) fn morning_of(day: NaiveDate) -> DateTime<Utc> {
    at_hour(day, 8)
}
