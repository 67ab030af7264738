use chrono::{DateTime, NaiveDate, Utc};
use event_calendar_server::calendar_store::{
    ArchiveError, ArchiveStats, Event, EventStore, NewEvent, SqliteCalendarStore, UserStore,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use uuid::Uuid;

/// File-backed calendar database living as long as the fixture.
pub struct TestCalendar {
    pub store: Arc<SqliteCalendarStore>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestCalendar {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = SqliteCalendarStore::new(temp_dir.path().join("calendar.db"))
            .expect("Failed to open calendar store");
        Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
        }
    }

    pub fn add_user(&self, email: &str) -> Uuid {
        self.store
            .create_user(email, "test-password-hash")
            .expect("Failed to create user")
    }

    pub fn add_event(
        &self,
        user_id: Uuid,
        event_date: NaiveDate,
        description: &str,
        remind_at: Option<DateTime<Utc>>,
    ) -> Uuid {
        self.store
            .create_event(&NewEvent {
                user_id,
                event_date,
                description: description.to_string(),
                remind_at,
            })
            .expect("Failed to create event")
    }

    pub fn reminder_sent(&self, event_id: &Uuid) -> bool {
        self.store
            .get_event(event_id)
            .expect("Failed to read event")
            .map(|e| e.reminder_sent)
            .unwrap_or(false)
    }
}

/// Delegates to a real store but sleeps before every archive run.
pub struct StalledEventStore {
    pub inner: Arc<SqliteCalendarStore>,
    pub stall: Duration,
}

impl EventStore for StalledEventStore {
    fn create_event(&self, event: &NewEvent) -> anyhow::Result<Uuid> {
        self.inner.create_event(event)
    }

    fn get_event(&self, event_id: &Uuid) -> anyhow::Result<Option<Event>> {
        self.inner.get_event(event_id)
    }

    fn get_events_for_user(&self, user_id: &Uuid) -> anyhow::Result<Vec<Event>> {
        self.inner.get_events_for_user(user_id)
    }

    fn delete_event(&self, event_id: &Uuid, user_id: &Uuid) -> anyhow::Result<bool> {
        self.inner.delete_event(event_id, user_id)
    }

    fn mark_reminder_sent(&self, event_id: &Uuid) -> anyhow::Result<()> {
        self.inner.mark_reminder_sent(event_id)
    }

    fn archive_events_before(
        &self,
        cutoff: NaiveDate,
        deadline: Option<Instant>,
    ) -> Result<ArchiveStats, ArchiveError> {
        std::thread::sleep(self.stall);
        self.inner.archive_events_before(cutoff, deadline)
    }
}
