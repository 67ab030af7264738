use crate::calendar_store::{Event, EventStore, NewEvent};
use crate::reminders::{ReminderHandle, ReminderTask, SubmitError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EventServiceError {
    #[error("event description must not be empty")]
    EmptyDescription,
    #[error("event {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Creates and removes events, feeding reminders to the dispatcher.
#[derive(Clone)]
pub struct EventService {
    event_store: Arc<dyn EventStore>,
    reminders: ReminderHandle,
}

impl EventService {
    pub fn new(event_store: Arc<dyn EventStore>, reminders: ReminderHandle) -> Self {
        Self {
            event_store,
            reminders,
        }
    }

    /// Persist an event and, when it has a `remind_at`, queue its reminder.
    ///
    /// Waits while the reminder intake is full. A reminder refused because the
    /// dispatcher is shutting down is logged; the event itself stays stored.
    pub async fn create_event(&self, event: NewEvent) -> Result<Uuid, EventServiceError> {
        if event.description.trim().is_empty() {
            return Err(EventServiceError::EmptyDescription);
        }

        let event_id = self.event_store.create_event(&event)?;
        debug!(%event_id, user_id = %event.user_id, "Created event");

        if let Some(remind_at) = event.remind_at {
            let task = ReminderTask::new(event_id, event.user_id, remind_at);
            if let Err(SubmitError::Closed(task)) = self.reminders.submit(task).await {
                warn!(
                    event_id = %task.event_id(),
                    remind_at = %task.remind_at(),
                    "Reminder not scheduled, dispatcher is shutting down"
                );
            }
        }

        Ok(event_id)
    }

    /// Delete an event owned by `user_id`.
    pub fn delete_event(&self, event_id: &Uuid, user_id: &Uuid) -> Result<(), EventServiceError> {
        if self.event_store.delete_event(event_id, user_id)? {
            Ok(())
        } else {
            Err(EventServiceError::NotFound(*event_id))
        }
    }

    pub fn events_for_user(&self, user_id: &Uuid) -> Result<Vec<Event>, EventServiceError> {
        Ok(self.event_store.get_events_for_user(user_id)?)
    }
}
