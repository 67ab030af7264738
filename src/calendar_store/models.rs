use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// An account able to receive reminders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A calendar event in the live table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Day the event takes place. Events dated before today are archived.
    pub event_date: NaiveDate,
    pub description: String,
    pub remind_at: Option<DateTime<Utc>>,
    pub reminder_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert a new event.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub user_id: Uuid,
    pub event_date: NaiveDate,
    pub description: String,
    pub remind_at: Option<DateTime<Utc>>,
}

/// An event moved out of the live table by the archive sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_date: NaiveDate,
    pub description: String,
    pub archived_at: DateTime<Utc>,
    pub original_created_at: DateTime<Utc>,
    pub original_updated_at: DateTime<Utc>,
}

/// Row counts produced by one archive transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub archived: usize,
    pub deleted: usize,
}

impl ArchiveStats {
    pub fn is_empty(&self) -> bool {
        self.archived == 0 && self.deleted == 0
    }
}
