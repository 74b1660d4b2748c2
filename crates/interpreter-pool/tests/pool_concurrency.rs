//! Concurrency scenarios for the shared pool.
//!
//! Several workers race over the same entries through the public engine and pool handles.
//! Every booking must end up with exactly one interpreter and leave the pool exactly once.

mod common {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use interpreter_pool::assignment::{
        AssignmentService, Booking, BookingStore, InMemoryBookingStore, Interpreter, MeetingType,
    };
    use interpreter_pool::config::PoolConfig;

    pub(super) const WORKERS: usize = 6;
    pub(super) const BOOKINGS: usize = 24;

    pub(super) fn admitted_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 7, 30, 0)
            .single()
            .expect("valid instant")
    }

    /// Bookings become due one hour apart starting four days after admission.
    pub(super) fn seeded_service() -> (
        Arc<AssignmentService<InMemoryBookingStore>>,
        Arc<InMemoryBookingStore>,
    ) {
        let store = Arc::new(InMemoryBookingStore::with_interpreters(
            (1..=8).map(|n| Interpreter::new(format!("int-{n}"), format!("Interpreter {n}"))),
        ));
        let service = Arc::new(AssignmentService::new(
            Arc::clone(&store),
            &PoolConfig::default(),
        ));

        for n in 0..BOOKINGS {
            let start = admitted_at() + Duration::days(7) + Duration::hours(n as i64);
            let booking = Booking::new(
                format!("b-{n:02}"),
                MeetingType::Weekly,
                start,
                start + Duration::minutes(45),
            );
            let id = store.insert_booking(booking).expect("stored").booking.id;
            service
                .admit_booking(&id, admitted_at())
                .expect("admitted");
        }
        (service, store)
    }
}

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Duration;
use common::*;
use interpreter_pool::assignment::{BookingStore, EntryResult};

#[test]
fn racing_batches_assign_each_booking_once() {
    let (service, store) = seeded_service();
    let run_at = admitted_at() + Duration::days(5);
    let barrier = Arc::new(Barrier::new(WORKERS));

    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let engine = Arc::clone(service.engine());
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.process_ready_entries(run_at).expect("batch runs")
            })
        })
        .collect();

    let reports: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("worker finished"))
        .collect();

    let assigned: usize = reports.iter().map(|report| report.assigned()).sum();
    assert_eq!(assigned, BOOKINGS);
    for report in &reports {
        for outcome in &report.outcomes {
            assert!(
                matches!(
                    outcome.result,
                    EntryResult::Assigned { .. }
                        | EntryResult::Contended
                        | EntryResult::AlreadyAssigned { .. }
                ),
                "unexpected outcome {:?}",
                outcome.result
            );
        }
    }

    let history = store
        .assignments_since(admitted_at())
        .expect("history");
    assert_eq!(history.len(), BOOKINGS);
    assert_eq!(
        service.pool_stats(run_at).expect("stats").total_in_pool,
        0
    );
}

#[test]
fn concurrent_removals_report_a_single_winner() {
    let (service, _store) = seeded_service();
    let entries = service.pool_entries(admitted_at()).expect("entries");
    assert_eq!(entries.len(), BOOKINGS);

    let target = entries[0].booking_id.clone();
    let barrier = Arc::new(Barrier::new(WORKERS));
    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            let target = target.clone();
            thread::spawn(move || {
                barrier.wait();
                service.remove_from_pool(&target).expect("removal")
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|handle| handle.join().expect("worker finished"))
        .filter(|removed| *removed)
        .count();

    assert_eq!(winners, 1);
    let stats = service.pool_stats(admitted_at()).expect("stats");
    assert_eq!(stats.total_in_pool, BOOKINGS - 1);
    assert_eq!(stats.waiting, BOOKINGS - 1);
}
