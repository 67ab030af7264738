use super::executor::{ReminderExecutor, ReminderOutcome};
use super::task::ReminderTask;
use crate::calendar_store::{EventStore, UserStore};
use crate::notifications::NotificationSender;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum SubmitError {
    /// The dispatcher was asked to stop. The rejected task is handed back.
    #[error("reminder intake is closed")]
    Closed(ReminderTask),
}

/// Owns the intake queue and spawns one tokio task per dequeued reminder.
pub struct ReminderDispatcher {
    intake: mpsc::Receiver<ReminderTask>,
    executor: Arc<ReminderExecutor>,
    /// Set by `ReminderHandle::stop` to close the intake.
    close_requested: CancellationToken,
    /// Set by the loop once it has terminated.
    finished: CancellationToken,
    in_flight: TaskTracker,
    capacity: usize,
}

/// Cloneable producer side of the dispatcher.
#[derive(Clone)]
pub struct ReminderHandle {
    intake: mpsc::Sender<ReminderTask>,
    close_requested: CancellationToken,
    finished: CancellationToken,
    in_flight: TaskTracker,
}

impl ReminderDispatcher {
    /// Main loop. Dequeues reminders in submission order and runs each one
    /// concurrently until either the intake is closed and drained, or
    /// `cancellation` fires.
    ///
    /// `cancellation` is also handed to every spawned reminder, which abandons
    /// its wait when it fires.
    pub async fn run(mut self, cancellation: CancellationToken) {
        info!(
            "Starting reminder dispatcher (queue capacity {})",
            self.capacity
        );

        let mut closing = false;
        loop {
            tokio::select! {
                maybe_task = self.intake.recv() => match maybe_task {
                    Some(task) => self.dispatch(task, &cancellation),
                    None => {
                        info!("Reminder dispatcher stopped, intake closed and drained");
                        break;
                    }
                },
                _ = self.close_requested.cancelled(), if !closing => {
                    debug!("Closing reminder intake, draining queued reminders");
                    // Buffered reminders are still received after close
                    self.intake.close();
                    closing = true;
                }
                _ = cancellation.cancelled() => {
                    let dropped = self.intake.len();
                    if dropped > 0 {
                        warn!("Reminder dispatcher cancelled with {} reminders still queued", dropped);
                    }
                    info!("Reminder dispatcher stopped by cancellation");
                    break;
                }
            }
        }

        self.in_flight.close();
        self.finished.cancel();
    }

    fn dispatch(&self, task: ReminderTask, cancellation: &CancellationToken) {
        let executor = Arc::clone(&self.executor);
        let cancellation = cancellation.clone();

        debug!(
            event_id = %task.event_id(),
            user_id = %task.user_id(),
            remind_at = %task.remind_at(),
            "Dispatching reminder"
        );

        self.in_flight.spawn(async move {
            let event_id = task.event_id();
            let user_id = task.user_id();

            match executor.execute(task, &cancellation).await {
                Ok(ReminderOutcome::Delivered) => {
                    info!(%event_id, %user_id, "Reminder sent");
                }
                Ok(ReminderOutcome::DeliveredUnmarked) => {
                    warn!(%event_id, %user_id, "Reminder sent but not marked as sent");
                }
                Ok(ReminderOutcome::Abandoned) => {
                    info!(%event_id, %user_id, "Reminder abandoned, dispatcher cancelled before it was due");
                }
                Err(e) => {
                    error!(%event_id, %user_id, "Reminder dropped: {}", e);
                }
            }
        });
    }
}

impl ReminderHandle {
    /// Queue a reminder. Waits while the intake is full.
    ///
    /// After `stop` has been called the task is returned in
    /// `SubmitError::Closed` instead of being queued.
    pub async fn submit(&self, task: ReminderTask) -> Result<(), SubmitError> {
        if self.close_requested.is_cancelled() {
            return Err(SubmitError::Closed(task));
        }
        self.intake
            .send(task)
            .await
            .map_err(|mpsc::error::SendError(task)| SubmitError::Closed(task))
    }

    /// Close the intake and wait until every queued reminder has been
    /// dispatched and every dispatched reminder reached a terminal state.
    ///
    /// Reminders still waiting for their due time keep waiting unless the
    /// cancellation token given to `run` fires. Requires `run` to be polled.
    pub async fn stop(&self) {
        self.close_requested.cancel();
        self.finished.cancelled().await;
        self.in_flight.wait().await;
        info!("Reminder dispatcher fully stopped");
    }

    /// Whether the dispatcher loop has terminated.
    pub fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }

    /// Number of reminders currently being waited on or executed.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

/// Create a dispatcher and its handle. A `capacity` of zero is treated as one.
pub fn create_dispatcher(
    user_store: Arc<dyn UserStore>,
    event_store: Arc<dyn EventStore>,
    sender: Arc<dyn NotificationSender>,
    capacity: usize,
) -> (ReminderDispatcher, ReminderHandle) {
    let capacity = capacity.max(1);
    let (intake_tx, intake_rx) = mpsc::channel(capacity);
    let close_requested = CancellationToken::new();
    let finished = CancellationToken::new();
    let in_flight = TaskTracker::new();

    let dispatcher = ReminderDispatcher {
        intake: intake_rx,
        executor: Arc::new(ReminderExecutor::new(user_store, event_store, sender)),
        close_requested: close_requested.clone(),
        finished: finished.clone(),
        in_flight: in_flight.clone(),
        capacity,
    };

    let handle = ReminderHandle {
        intake: intake_tx,
        close_requested,
        finished,
        in_flight,
    };

    (dispatcher, handle)
}
