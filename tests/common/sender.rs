use async_trait::async_trait;
use event_calendar_server::notifications::{NotificationSender, SendError};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub subject: String,
    pub body: String,
    pub to: String,
    pub at: Instant,
}

/// Records every delivered message instead of sending it.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<SentMessage>>,
    failing_recipients: Mutex<HashSet<String>>,
}

#[allow(dead_code)]
impl RecordingSender {
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.to).collect()
    }

    pub fn fail_for(&self, to: &str) {
        self.failing_recipients
            .lock()
            .unwrap()
            .insert(to.to_string());
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, subject: &str, body: &str, to: &str) -> Result<(), SendError> {
        if self.failing_recipients.lock().unwrap().contains(to) {
            return Err(SendError::Transport("connection reset".to_string()));
        }
        self.sent.lock().unwrap().push(SentMessage {
            subject: subject.to_string(),
            body: body.to_string(),
            to: to.to_string(),
            at: Instant::now(),
        });
        Ok(())
    }
}
