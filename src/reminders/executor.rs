use super::task::ReminderTask;
use crate::calendar_store::{EventStore, UserStore};
use crate::notifications::{NotificationSender, SendError};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use uuid::Uuid;

pub const REMINDER_SUBJECT: &str = "Event reminder";

pub fn reminder_body(description: &str) -> String {
    format!("Event \"{}\" is coming up soon. 🔔", description)
}

/// Terminal state of a reminder that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderOutcome {
    /// Sent and marked as sent.
    Delivered,
    /// Sent, but marking the event failed.
    DeliveredUnmarked,
    /// Cancelled while waiting for its due time. Nothing was sent.
    Abandoned,
}

/// Why a single reminder was dropped. Never affects other reminders.
#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("failed to look up user {user_id}: {source}")]
    UserLookup {
        user_id: Uuid,
        #[source]
        source: anyhow::Error,
    },
    #[error("user {0} not found")]
    UserNotFound(Uuid),
    #[error("failed to look up event {event_id}: {source}")]
    EventLookup {
        event_id: Uuid,
        #[source]
        source: anyhow::Error,
    },
    #[error("event {0} not found")]
    EventNotFound(Uuid),
    #[error("failed to send reminder: {0}")]
    Send(#[from] SendError),
}

/// Runs one reminder from its wait through delivery.
pub struct ReminderExecutor {
    user_store: Arc<dyn UserStore>,
    event_store: Arc<dyn EventStore>,
    sender: Arc<dyn NotificationSender>,
}

impl ReminderExecutor {
    pub fn new(
        user_store: Arc<dyn UserStore>,
        event_store: Arc<dyn EventStore>,
        sender: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            user_store,
            event_store,
            sender,
        }
    }

    /// Wait until the task is due, then look up the owner and the event,
    /// send the notification and mark the event.
    ///
    /// Only the wait observes `cancellation`. Once the task is due it runs to
    /// a terminal state, so a reminder is never sent without being marked
    /// because of a shutdown.
    pub async fn execute(
        &self,
        task: ReminderTask,
        cancellation: &CancellationToken,
    ) -> Result<ReminderOutcome, ReminderError> {
        let delay = task.delay_from(Utc::now());
        if !delay.is_zero() {
            debug!(
                event_id = %task.event_id(),
                "Reminder waiting {:?} until {}",
                delay,
                task.remind_at()
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancellation.cancelled() => return Ok(ReminderOutcome::Abandoned),
            }
        }

        let user_store = Arc::clone(&self.user_store);
        let user_id = task.user_id();
        let user = run_blocking(move || user_store.get_user(&user_id))
            .await
            .map_err(|source| ReminderError::UserLookup { user_id, source })?
            .ok_or(ReminderError::UserNotFound(user_id))?;

        let event_store = Arc::clone(&self.event_store);
        let event_id = task.event_id();
        let event = run_blocking(move || event_store.get_event(&event_id))
            .await
            .map_err(|source| ReminderError::EventLookup { event_id, source })?
            .ok_or(ReminderError::EventNotFound(event_id))?;

        self.sender
            .send(
                REMINDER_SUBJECT,
                &reminder_body(&event.description),
                &user.email,
            )
            .await?;

        let event_store = Arc::clone(&self.event_store);
        match run_blocking(move || event_store.mark_reminder_sent(&event_id)).await {
            Ok(()) => Ok(ReminderOutcome::Delivered),
            Err(e) => {
                error!(%event_id, "Failed to mark reminder sent: {:#}", e);
                Ok(ReminderOutcome::DeliveredUnmarked)
            }
        }
    }
}

/// Store calls block on the SQLite connection lock; keep them off the
/// runtime workers.
async fn run_blocking<T, F>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
