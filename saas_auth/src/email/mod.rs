//! Outgoing email collaborator.
//!
//! The session lifecycle only needs `send_email`; transports live behind the
//! [`EmailSender`] trait so tests can record messages instead of sending them.

use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;

pub mod smtp;
pub mod templates;

pub use smtp::{SmtpConfig, SmtpEmailSender};

/// A rendered message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub html: String,
}

/// Email delivery errors
#[derive(Debug, Error)]
pub enum EmailError {
    /// Sender or recipient did not parse as a mailbox
    #[error("Invalid address {0}")]
    InvalidAddress(String),

    /// Message could not be assembled
    #[error("Failed to build message: {0}")]
    Build(String),

    /// Transport refused or failed to deliver
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Something that can deliver an [`EmailMessage`]
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, message: EmailMessage) -> Result<(), EmailError>;
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Default, Clone)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_email(&self, message: EmailMessage) -> Result<(), EmailError> {
        log::info!(
            "Email to {} from {}: {}",
            message.to,
            message.from,
            message.subject
        );
        log::debug!("{}", message.html);
        Ok(())
    }
}

/// Keeps every message in memory. Can be switched to fail on demand.
#[derive(Debug, Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
    fail: Mutex<bool>,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every message accepted so far
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Messages addressed to `to`
    pub fn sent_to(&self, to: &str) -> Vec<EmailMessage> {
        self.sent().into_iter().filter(|m| m.to == to).collect()
    }

    /// Make subsequent sends fail with a transport error
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send_email(&self, message: EmailMessage) -> Result<(), EmailError> {
        if *self.fail.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(EmailError::Transport("recording sender set to fail".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &str) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            from: "no-reply@example.com".to_string(),
            subject: "Hello".to_string(),
            html: "<p>Hi</p>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_recording_sender_keeps_messages() {
        let sender = RecordingEmailSender::new();
        sender.send_email(message("a@example.com")).await.unwrap();
        sender.send_email(message("b@example.com")).await.unwrap();

        assert_eq!(sender.sent().len(), 2);
        assert_eq!(sender.sent_to("b@example.com").len(), 1);
    }

    #[tokio::test]
    async fn test_recording_sender_can_fail() {
        let sender = RecordingEmailSender::new();
        sender.set_failing(true);
        let err = sender.send_email(message("a@example.com")).await.unwrap_err();
        assert!(matches!(err, EmailError::Transport(_)));
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_log_sender_accepts_everything() {
        assert!(LogEmailSender.send_email(message("a@example.com")).await.is_ok());
    }
}
