//! Persistence for users, calendar events and the events archive.

mod models;
mod schema;
mod sqlite_calendar_store;

pub use models::{ArchiveStats, ArchivedEvent, Event, NewEvent, User};
pub use schema::CALENDAR_VERSIONED_SCHEMAS;
pub use sqlite_calendar_store::SqliteCalendarStore;

use anyhow::Result;
use chrono::NaiveDate;
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

/// Errors from the archive-and-delete transaction.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The deadline passed before the transaction committed; nothing was applied.
    #[error("archive deadline exceeded, transaction rolled back")]
    DeadlineExceeded,
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub trait UserStore: Send + Sync {
    fn create_user(&self, email: &str, password_hash: &str) -> Result<Uuid>;
    fn get_user(&self, user_id: &Uuid) -> Result<Option<User>>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
}

pub trait EventStore: Send + Sync {
    fn create_event(&self, event: &NewEvent) -> Result<Uuid>;
    fn get_event(&self, event_id: &Uuid) -> Result<Option<Event>>;
    fn get_events_for_user(&self, user_id: &Uuid) -> Result<Vec<Event>>;
    /// Returns false when no event with this id belongs to `user_id`.
    fn delete_event(&self, event_id: &Uuid, user_id: &Uuid) -> Result<bool>;

    /// Marking an already-marked event is a no-op.
    fn mark_reminder_sent(&self, event_id: &Uuid) -> Result<()>;

    /// Moves every event dated strictly before `cutoff` into the archive and
    /// removes it from the live table, as a single transaction.
    ///
    /// A statement still running when `deadline` passes is interrupted, and the
    /// deadline is checked again before commit. In both cases the transaction
    /// is rolled back and `ArchiveError::DeadlineExceeded` returned.
    fn archive_events_before(
        &self,
        cutoff: NaiveDate,
        deadline: Option<Instant>,
    ) -> Result<ArchiveStats, ArchiveError>;
}
