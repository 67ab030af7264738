//! Event Calendar Server Library
//!
//! Background time-based execution for the calendar service: delayed event
//! reminders and the periodic archive of past events.
//!
//! [`BackgroundWorkers`] starts both and hands out the [`EventService`] that
//! request handling uses to create events and queue their reminders.

pub mod background_jobs;
pub mod calendar_store;
pub mod config;
pub mod events;
pub mod notifications;
pub mod reminders;
pub mod sqlite_persistence;
pub mod workers;

// Re-export commonly used types for convenience
pub use calendar_store::{EventStore, SqliteCalendarStore, UserStore};
pub use events::EventService;
pub use reminders::{create_dispatcher, ReminderHandle, ReminderTask};
pub use workers::BackgroundWorkers;
