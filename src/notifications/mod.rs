//! Outgoing user notifications

mod sender;
mod smtp;

pub use sender::{LogSender, NotificationSender, SendError};
pub use smtp::SmtpSender;
