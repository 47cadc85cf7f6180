//! Account and session model.
//!
//! These mirror what the identity provider hands back: an account keyed by
//! email, and an opaque session artifact with an expiry.

use serde::{Deserialize, Serialize};

use super::todo::{Timestamp, UserId};

/// A normalized email address (trimmed, lowercased).
///
/// Format checking lives in `validation::validate_email`; this type only
/// normalizes so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Email(String);

impl Email {
    /// Creates a normalized email.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        let address: String = address.into();
        Self(address.trim().to_lowercase())
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Email {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// A registered account.
#[derive(Debug, Clone)]
pub struct Account {
    /// Account identifier; owner of todos.
    pub user_id: UserId,
    /// Sign-in email.
    pub email: Email,
    /// Salted digest of the password.
    pub password_digest: [u8; 32],
    /// Per-account salt.
    pub salt: [u8; 32],
    /// Whether the email has been confirmed through the callback link.
    pub email_verified: bool,
    /// Creation time.
    pub created_at: Timestamp,
}

/// Opaque session token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wraps a raw token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer token.
    pub token: SessionToken,
    /// The authenticated actor.
    pub user_id: UserId,
    /// Email of the authenticated actor.
    pub email: Email,
    /// Issue time.
    pub issued_at: Timestamp,
    /// Expiry; the session is rejected at or after this instant.
    pub expires_at: Timestamp,
}

impl Session {
    /// Returns `true` if the session is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}
