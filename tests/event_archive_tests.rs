//! Event archive job driven by the scheduler against a real SQLite calendar.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{wait_until, StalledEventStore, TestCalendar};
use event_calendar_server::background_jobs::jobs::EventArchiveJob;
use event_calendar_server::background_jobs::{
    create_scheduler, JobContext, JobError, JobScheduler, SchedulerHandle,
};
use event_calendar_server::calendar_store::EventStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Seed two past, one current and one future event.
fn seed(calendar: &TestCalendar) {
    let user_id = calendar.add_user("owner@example.com");
    let today = Utc::now().date_naive();
    for offset in [-7, -1, 0, 3] {
        let date = today + ChronoDuration::days(offset);
        calendar.add_event(user_id, date, &format!("day {}", offset), None);
    }
}

async fn start_scheduler(
    event_store: Arc<dyn EventStore>,
    job: EventArchiveJob,
) -> (SchedulerHandle, JoinHandle<()>) {
    let job_context = JobContext::new(CancellationToken::new(), event_store);
    let (mut scheduler, handle): (JobScheduler, SchedulerHandle) =
        create_scheduler(CancellationToken::new(), job_context);
    scheduler.register_job(Arc::new(job)).await;
    let task = tokio::spawn(async move { scheduler.run().await });
    (handle, task)
}

async fn last_status(handle: &SchedulerHandle) -> Option<String> {
    handle
        .get_job("event_archive")
        .await
        .and_then(|job| job.last_run)
        .filter(|run| run.finished_at.is_some())
        .map(|run| run.status)
}

async fn wait_for_status(handle: &SchedulerHandle, expected: &str) {
    for _ in 0..500 {
        if last_status(handle).await.as_deref() == Some(expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("event_archive never reached status {}", expected);
}

#[tokio::test]
async fn test_aligned_tick_archives_past_events() {
    let calendar = TestCalendar::new();
    seed(&calendar);
    let store = calendar.store.clone();

    // One second period: the first boundary is at most a second away
    let job = EventArchiveJob::new(Duration::from_secs(1), Duration::from_secs(20));
    let (handle, task) = start_scheduler(calendar.store.clone(), job).await;

    wait_until(Duration::from_secs(3), || store.count_events().unwrap() == 2).await;
    wait_for_status(&handle, "completed").await;

    let last_run = handle.get_job("event_archive").await.unwrap().last_run.unwrap();
    assert_eq!(last_run.triggered_by, "schedule");

    handle.stop().await;
    task.await.unwrap();

    let today = Utc::now().date_naive();
    let archived = store.get_archived_events().unwrap();
    assert_eq!(archived.len(), 2);
    assert!(archived.iter().all(|e| e.event_date < today));
    assert_eq!(store.count_events().unwrap(), 2);
}

#[tokio::test]
async fn test_repeated_runs_are_idempotent() {
    let calendar = TestCalendar::new();
    seed(&calendar);

    let job = EventArchiveJob::new(Duration::from_secs(24 * 60 * 60), Duration::from_secs(20));
    let (handle, task) = start_scheduler(calendar.store.clone(), job).await;

    for _ in 0..3 {
        handle.trigger_job("event_archive").await.unwrap();
        wait_for_status(&handle, "completed").await;
        while handle.is_job_running("event_archive").await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    handle.stop().await;
    task.await.unwrap();

    assert_eq!(calendar.store.count_events().unwrap(), 2);
    assert_eq!(calendar.store.get_archived_events().unwrap().len(), 2);
}

#[tokio::test]
async fn test_stalled_run_times_out_and_scheduler_keeps_running() {
    let calendar = TestCalendar::new();
    seed(&calendar);
    let stalled = Arc::new(StalledEventStore {
        inner: calendar.store.clone(),
        stall: Duration::from_millis(5),
    });

    let job = EventArchiveJob::new(Duration::from_secs(24 * 60 * 60), Duration::from_millis(1));
    let (handle, task) = start_scheduler(stalled, job).await;

    handle.trigger_job("event_archive").await.unwrap();
    wait_for_status(&handle, "timed_out").await;

    // Nothing partially archived
    assert_eq!(calendar.store.count_events().unwrap(), 4);
    assert!(calendar.store.get_archived_events().unwrap().is_empty());

    // Still accepting work
    while handle.is_job_running("event_archive").await {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.trigger_job("event_archive").await.unwrap();
    assert!(!handle.is_stopped());

    handle.stop().await;
    task.await.unwrap();
    assert_eq!(calendar.store.count_events().unwrap(), 4);
}

#[tokio::test]
async fn test_stop_waits_for_running_archive() {
    let calendar = TestCalendar::new();
    seed(&calendar);
    let stalled = Arc::new(StalledEventStore {
        inner: calendar.store.clone(),
        stall: Duration::from_millis(300),
    });

    let job = EventArchiveJob::new(Duration::from_secs(24 * 60 * 60), Duration::from_secs(20));
    let (handle, task) = start_scheduler(stalled, job).await;

    handle.trigger_job("event_archive").await.unwrap();
    assert!(handle.is_job_running("event_archive").await);

    handle.stop().await;

    // The run finished and committed before stop returned
    assert_eq!(calendar.store.count_events().unwrap(), 2);
    assert_eq!(last_status(&handle).await.as_deref(), Some("completed"));
    assert!(!handle.is_job_running("event_archive").await);
    task.await.unwrap();

    assert!(matches!(
        handle.trigger_job("event_archive").await,
        Err(JobError::SchedulerUnavailable)
    ));
}
