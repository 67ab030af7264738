//! Host-level wiring: events created through the service reach the running
//! dispatcher, the archive job is registered, shutdown honors the grace period.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{wait_until, RecordingSender, TestCalendar};
use event_calendar_server::calendar_store::NewEvent;
use event_calendar_server::config::{EventArchiveSettings, ReminderSettings};
use event_calendar_server::BackgroundWorkers;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn reminder_settings(grace: Duration) -> ReminderSettings {
    ReminderSettings {
        queue_capacity: 16,
        shutdown_grace: grace,
    }
}

fn daily_archive() -> EventArchiveSettings {
    EventArchiveSettings {
        interval: Duration::from_secs(24 * 60 * 60),
        timeout: Duration::from_secs(20),
    }
}

#[tokio::test]
async fn test_created_event_reminder_is_delivered() {
    let calendar = TestCalendar::new();
    let sender = Arc::new(RecordingSender::default());
    let workers = BackgroundWorkers::start(
        calendar.store.clone(),
        sender.clone(),
        &reminder_settings(Duration::from_secs(5)),
        &daily_archive(),
        &CancellationToken::new(),
    )
    .await;

    let user_id = calendar.add_user("host@example.com");
    let event_id = workers
        .events()
        .create_event(NewEvent {
            user_id,
            event_date: Utc::now().date_naive() + ChronoDuration::days(2),
            description: "Offsite".to_string(),
            remind_at: Some(Utc::now() + ChronoDuration::milliseconds(50)),
        })
        .await
        .unwrap();

    wait_until(Duration::from_secs(3), || calendar.reminder_sent(&event_id)).await;
    assert_eq!(sender.recipients(), vec!["host@example.com"]);

    workers.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_archive_job_is_registered_and_runs_on_trigger() {
    let calendar = TestCalendar::new();
    let sender = Arc::new(RecordingSender::default());
    let workers = BackgroundWorkers::start(
        calendar.store.clone(),
        sender,
        &reminder_settings(Duration::from_secs(5)),
        &daily_archive(),
        &CancellationToken::new(),
    )
    .await;

    let user_id = calendar.add_user("past@example.com");
    calendar.add_event(
        user_id,
        Utc::now().date_naive() - ChronoDuration::days(1),
        "Yesterday",
        None,
    );

    let jobs = workers.scheduler().list_jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, "event_archive");

    workers.scheduler().trigger_job("event_archive").await.unwrap();
    let store = calendar.store.clone();
    wait_until(Duration::from_secs(3), || {
        store.get_archived_events().unwrap().len() == 1
    })
    .await;

    workers.shutdown().await.unwrap();
    assert_eq!(calendar.store.count_events().unwrap(), 0);
}

#[tokio::test]
async fn test_shutdown_abandons_reminders_after_grace() {
    let calendar = TestCalendar::new();
    let sender = Arc::new(RecordingSender::default());
    let workers = BackgroundWorkers::start(
        calendar.store.clone(),
        sender.clone(),
        &reminder_settings(Duration::from_millis(100)),
        &daily_archive(),
        &CancellationToken::new(),
    )
    .await;

    let user_id = calendar.add_user("later@example.com");
    let event_id = workers
        .events()
        .create_event(NewEvent {
            user_id,
            event_date: Utc::now().date_naive() + ChronoDuration::days(1),
            description: "Tomorrow".to_string(),
            remind_at: Some(Utc::now() + ChronoDuration::minutes(10)),
        })
        .await
        .unwrap();
    let reminders = workers.reminders().clone();

    let start = Instant::now();
    tokio::time::timeout(Duration::from_secs(2), workers.shutdown())
        .await
        .expect("shutdown should finish after the grace period")
        .unwrap();

    assert!(start.elapsed() >= Duration::from_millis(90));
    assert!(reminders.is_finished());
    assert!(sender.sent().is_empty());
    assert!(!calendar.reminder_sent(&event_id));
}
