//! Outgoing mail.
//!
//! The identity provider sends verification and recovery links through a
//! [`Mailer`]. The in-process [`OutboxMailer`] keeps sent messages so they
//! can be inspected, and logs each one.

use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::Email;

/// Mail delivery failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Failed to deliver mail to {recipient}: {reason}")]
pub struct MailError {
    pub recipient: String,
    pub reason: String,
}

/// Kind of message sent by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailKind {
    Verification,
    PasswordReset,
}

/// A message handed to the mailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub recipient: Email,
    pub kind: MailKind,
    /// Callback link including the one-time code.
    pub link: String,
}

/// Delivers mail.
pub trait Mailer: Send + Sync {
    fn send(&self, mail: OutgoingMail) -> BoxFuture<'static, Result<(), MailError>>;
}

/// Mailer that records messages instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct OutboxMailer {
    sent: Arc<RwLock<Vec<OutgoingMail>>>,
}

impl OutboxMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every message sent so far, oldest first.
    pub async fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.read().await.clone()
    }

    /// Returns the most recent message for `recipient`.
    pub async fn last_for(&self, recipient: &Email) -> Option<OutgoingMail> {
        self.sent
            .read()
            .await
            .iter()
            .rev()
            .find(|mail| &mail.recipient == recipient)
            .cloned()
    }
}

impl Mailer for OutboxMailer {
    fn send(&self, mail: OutgoingMail) -> BoxFuture<'static, Result<(), MailError>> {
        let sent = Arc::clone(&self.sent);
        Box::pin(async move {
            tracing::info!(recipient = %mail.recipient, kind = ?mail.kind, link = %mail.link, "Mail queued");
            sent.write().await.push(mail);
            Ok(())
        })
    }
}
