//! SMTP delivery through an authenticated STARTTLS relay.

use super::sender::{NotificationSender, SendError};
use crate::config::SmtpSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpSender {
    pub fn new(settings: &SmtpSettings) -> Result<Self> {
        let from: Mailbox = settings
            .from
            .parse()
            .with_context(|| format!("Invalid SMTP from address: {}", settings.from))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .with_context(|| format!("Invalid SMTP relay host: {}", settings.host))?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .build();

        Ok(Self { transport, from })
    }

    fn build_message(&self, subject: &str, body: &str, to: &str) -> Result<Message, SendError> {
        let to: Mailbox = to.parse().map_err(|e: lettre::address::AddressError| {
            SendError::InvalidAddress {
                address: to.to_string(),
                reason: e.to_string(),
            }
        })?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| SendError::Message(e.to_string()))
    }
}

#[async_trait]
impl NotificationSender for SmtpSender {
    async fn send(&self, subject: &str, body: &str, to: &str) -> Result<(), SendError> {
        let message = self.build_message(subject, body, to)?;
        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;
        debug!(to = %to, code = %response.code(), "SMTP relay accepted message");
        Ok(())
    }
}
