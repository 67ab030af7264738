use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("failed to build message: {0}")]
    Message(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Delivers a single plain-text notification. Implementations do not retry.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, subject: &str, body: &str, to: &str) -> Result<(), SendError>;
}

/// Sender used when no SMTP relay is configured: it only logs the message.
#[derive(Debug, Default, Clone)]
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    async fn send(&self, subject: &str, body: &str, to: &str) -> Result<(), SendError> {
        info!(to = %to, subject = %subject, "Notification (not delivered): {}", body);
        Ok(())
    }
}
