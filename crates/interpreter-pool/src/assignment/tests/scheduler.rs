use super::common::*;
use chrono::Duration;
use std::sync::Arc;
use std::thread;
use tokio_util::sync::CancellationToken;

use crate::assignment::domain::MeetingType;
use crate::assignment::scheduler::SchedulerError;
use crate::assignment::AssignmentService;

#[test]
fn daily_run_recovers_retries_and_processes_due_entries() {
    let (service, _) = build_service();
    let pool = service.pool();
    let (stuck, _) = pooled(pool, booking("b-stuck", MeetingType::General, 20.0, 1));
    let (failed, _) = pooled(pool, booking("b-failed", MeetingType::General, 20.5, 1));
    pooled(pool, booking("b-due", MeetingType::General, 21.0, 1));
    pooled(pool, booking("b-later", MeetingType::General, 40.0, 1));
    pool.mark_as_processing(&stuck, now()).expect("claimed");
    pool.mark_as_processing(&failed, now()).expect("claimed");
    pool.mark_as_failed(&failed, "store timeout").expect("failed");

    let at = now() + Duration::days(11) + Duration::hours(12);
    let summary = service.process_now(at).expect("daily run");

    assert_eq!(summary.recovered, vec![stuck]);
    assert_eq!(summary.requeued, vec![failed]);
    assert_eq!(summary.ready.assigned(), 3);
    assert_eq!(summary.deadline.considered, 0);
    assert_eq!(summary.assigned(), 3);

    let stats = service.scheduler().get_daily_processing_statistics();
    assert_eq!(stats.runs, 1);
    assert_eq!(stats.assigned, 3);
    assert_eq!(stats.recovered, 1);
    assert_eq!(stats.requeued, 1);
    assert_eq!(stats.last_run, Some(at));
    assert_eq!(stats.last_summary, Some(summary));

    let remaining = service.pool_stats(at).expect("stats");
    assert_eq!(remaining.total_in_pool, 1);
    assert_eq!(remaining.waiting, 1);
}

#[test]
fn processing_is_needed_on_first_run_on_due_entries_and_after_the_interval() {
    let (service, store) = build_service();
    let scheduler = service.scheduler();

    assert!(scheduler.is_processing_needed(now()).expect("check"));
    scheduler.process_daily_pool_now(now()).expect("first run");
    assert!(!scheduler
        .is_processing_needed(now() + Duration::hours(1))
        .expect("check"));
    assert!(scheduler
        .is_processing_needed(now() + Duration::hours(24))
        .expect("check"));

    let id = insert(&store, booking("b-1", MeetingType::General, 20.0, 1));
    service
        .pool()
        .add_to_pool(&id, now() + Duration::minutes(30), now())
        .expect("pooled");
    assert!(scheduler
        .is_processing_needed(now() + Duration::hours(1))
        .expect("check"));

    let status = scheduler.get_status(now() + Duration::hours(1)).expect("status");
    assert!(!status.is_running);
    assert_eq!(status.last_run, Some(now()));
    assert_eq!(status.next_run, Some(now() + Duration::hours(24)));
    assert_eq!(status.processing.pool_size, 1);
}

#[test]
fn overlapping_daily_runs_are_rejected() {
    let store = Arc::new(GatedStore::new());
    let service = Arc::new(AssignmentService::new(Arc::clone(&store), &config()));
    store.arm();

    let background = {
        let service = Arc::clone(&service);
        thread::spawn(move || service.process_now(now()))
    };
    store.entered.wait();

    assert!(service.scheduler().is_running());
    assert!(matches!(
        service.process_now(now()),
        Err(SchedulerError::AlreadyRunning)
    ));

    store.release.wait();
    background
        .join()
        .expect("background run finished")
        .expect("background run succeeded");
    assert!(!service.scheduler().is_running());
    service.process_now(now()).expect("flag released after the run");
    assert_eq!(service.scheduler().get_daily_processing_statistics().runs, 2);
}

#[tokio::test]
async fn scheduled_loop_runs_until_cancelled() {
    let (service, _) = build_service();
    let scheduler = Arc::clone(service.scheduler());
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(
        Arc::clone(&scheduler).run(std::time::Duration::from_millis(10), cancel.clone()),
    );
    tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    cancel.cancel();
    handle.await.expect("loop exits cleanly");

    let stats = scheduler.get_daily_processing_statistics();
    assert!(stats.runs >= 1);
    assert!(!scheduler.is_running());
}
