use crate::calendar_store::EventStore;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
///
/// Contains references to shared resources, a cancellation token
/// for graceful shutdown handling and the deadline of the current run.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Access to calendar events and their archive.
    pub event_store: Arc<dyn EventStore>,

    /// Set per run from `BackgroundJob::timeout`.
    pub deadline: Option<Instant>,
}

impl JobContext {
    pub fn new(cancellation_token: CancellationToken, event_store: Arc<dyn EventStore>) -> Self {
        Self {
            cancellation_token,
            event_store,
            deadline: None,
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
