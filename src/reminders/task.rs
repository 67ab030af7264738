use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// One pending reminder: notify the owner of `event_id` at `remind_at`.
///
/// Fields are private so a task cannot change after it has been submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderTask {
    event_id: Uuid,
    user_id: Uuid,
    remind_at: DateTime<Utc>,
}

impl ReminderTask {
    pub fn new(event_id: Uuid, user_id: Uuid, remind_at: DateTime<Utc>) -> Self {
        Self {
            event_id,
            user_id,
            remind_at,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn remind_at(&self) -> DateTime<Utc> {
        self.remind_at
    }

    /// Time left until the task is due, zero when it already is.
    pub fn delay_from(&self, now: DateTime<Utc>) -> Duration {
        (self.remind_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}
