//! Collaborator contracts.
//!
//! The record store and the identity provider are external services. These
//! traits describe what the rest of the crate needs from them; every method
//! returns a boxed, lazily-run future so implementations can be chosen at
//! runtime behind `Arc<dyn ...>`.

use futures::future::BoxFuture;
use thiserror::Error;

use crate::classify::{ClassifiedError, ErrorCategory, sanitize_error_message};
use crate::domain::{Email, Session, SessionToken, Timestamp, Todo, TodoId, TodoPatch, UserId};

/// Future returned by record store operations.
pub type StoreFuture<T> = BoxFuture<'static, Result<T, RepositoryError>>;

/// Future returned by identity provider operations.
pub type IdentityFuture<T> = BoxFuture<'static, Result<T, IdentityError>>;

// =============================================================================
// Repository Error
// =============================================================================

/// Errors that can occur during record store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// No record with this id is visible to the caller.
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// A record with this id already exists.
    #[error("Duplicate entity: {0}")]
    Duplicate(String),

    /// The store failed.
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<RepositoryError> for ClassifiedError {
    fn from(error: RepositoryError) -> Self {
        let code = match &error {
            RepositoryError::NotFound(_) => "NOT_FOUND",
            RepositoryError::Duplicate(_) => "DUPLICATE",
            RepositoryError::DatabaseError(_) => "DATABASE",
        };
        Self::new(ErrorCategory::RemoteStore, error.to_string())
            .with_code(code)
            .with_cause(error)
    }
}

// =============================================================================
// Todo Repository
// =============================================================================

/// Owner-scoped record store for todos.
///
/// Every read and write takes the owner; a todo owned by someone else is
/// reported exactly like one that does not exist.
pub trait TodoRepository: Send + Sync {
    /// Lists the owner's todos, newest first.
    fn list_for_owner(&self, owner: &UserId) -> StoreFuture<Vec<Todo>>;

    /// Finds one of the owner's todos.
    fn find(&self, owner: &UserId, id: &TodoId) -> StoreFuture<Option<Todo>>;

    /// Inserts a new todo. Its `owner` field scopes it.
    fn insert(&self, todo: &Todo) -> StoreFuture<()>;

    /// Applies `patch` to one of the owner's todos and returns the result.
    ///
    /// Fails with [`RepositoryError::NotFound`] if the owner has no such todo.
    fn update(
        &self,
        owner: &UserId,
        id: &TodoId,
        patch: TodoPatch,
        now: Timestamp,
    ) -> StoreFuture<Todo>;

    /// Deletes one of the owner's todos.
    ///
    /// Returns `Ok(true)` if it was deleted, `Ok(false)` if there was nothing
    /// to delete.
    fn delete(&self, owner: &UserId, id: &TodoId) -> StoreFuture<bool>;
}

// =============================================================================
// Identity Error
// =============================================================================

/// Errors reported by the identity provider.
///
/// Display strings follow the provider's own wording so that
/// [`sanitize_error_message`] can translate them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("User already registered")]
    AlreadyRegistered,

    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("Email not confirmed")]
    EmailNotConfirmed,

    #[error("Auth session missing")]
    SessionMissing,

    #[error("JWT expired")]
    SessionExpired,

    #[error("Invalid or expired code")]
    InvalidCode,

    #[error("Too many sign-in attempts for {email}")]
    RateLimited { email: String },

    #[error("Email delivery failed: {0}")]
    Delivery(String),

    #[error("Identity service unavailable: {0}")]
    Unavailable(String),
}

impl From<IdentityError> for ClassifiedError {
    fn from(error: IdentityError) -> Self {
        match &error {
            // Caused by what the user typed; the sanitized text is meant for them.
            IdentityError::AlreadyRegistered
            | IdentityError::InvalidCredentials
            | IdentityError::EmailNotConfirmed
            | IdentityError::InvalidCode => {
                Self::validation(sanitize_error_message(&error.to_string())).with_cause(error)
            }
            IdentityError::SessionMissing | IdentityError::SessionExpired => {
                Self::new(ErrorCategory::Authentication, error.to_string()).with_cause(error)
            }
            IdentityError::RateLimited { .. } => {
                Self::new(ErrorCategory::RateLimited, error.to_string()).with_cause(error)
            }
            IdentityError::Delivery(_) | IdentityError::Unavailable(_) => {
                Self::new(ErrorCategory::ExternalDependency, error.to_string()).with_cause(error)
            }
        }
    }
}

// =============================================================================
// Identity Provider
// =============================================================================

/// What a one-time callback code was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodePurpose {
    /// Confirms the email address after sign-up.
    Verification,
    /// Signs the user in so they can set a new password.
    Recovery,
}

/// Result of exchanging a callback code.
#[derive(Debug, Clone)]
pub struct CodeExchange {
    /// The new session.
    pub session: Session,
    /// What the code was for.
    pub purpose: CodePurpose,
}

/// Issues and validates sessions; owns credentials.
pub trait IdentityProvider: Send + Sync {
    /// Registers an account and sends a verification link.
    ///
    /// `callback_url` is the link target; the provider appends `code`.
    fn sign_up(&self, email: Email, password: String, callback_url: String)
    -> IdentityFuture<UserId>;

    /// Checks credentials and issues a session.
    fn sign_in(&self, email: Email, password: String) -> IdentityFuture<Session>;

    /// Revokes a session. Unknown tokens are ignored.
    fn sign_out(&self, token: &SessionToken) -> IdentityFuture<()>;

    /// Looks up the session for a token, refreshing its expiry when due.
    fn current_session(&self, token: &SessionToken) -> IdentityFuture<Session>;

    /// Sends a recovery link. Unknown addresses succeed silently.
    fn send_password_reset(&self, email: Email, callback_url: String) -> IdentityFuture<()>;

    /// Replaces the password of the session's account.
    fn update_password(&self, token: &SessionToken, password: String) -> IdentityFuture<()>;

    /// Exchanges a one-time callback code for a session.
    fn exchange_code(&self, code: &str) -> IdentityFuture<CodeExchange>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classification;
    use rstest::rstest;

    #[rstest]
    fn test_repository_error_display() {
        let error = RepositoryError::NotFound("todo-123".to_string());
        assert_eq!(format!("{error}"), "Entity not found: todo-123");

        let error = RepositoryError::DatabaseError("connection refused".to_string());
        assert_eq!(format!("{error}"), "Database error: connection refused");
    }

    #[rstest]
    fn test_repository_error_is_remote_store() {
        let classified = ClassifiedError::from(RepositoryError::NotFound("x".to_string()));
        assert_eq!(classified.category(), ErrorCategory::RemoteStore);
        assert_eq!(classified.code(), Some("NOT_FOUND"));
    }

    #[rstest]
    #[case(IdentityError::InvalidCredentials, ErrorCategory::Validation, "Incorrect email or password")]
    #[case(
        IdentityError::AlreadyRegistered,
        ErrorCategory::Validation,
        "An account with this email already exists"
    )]
    #[case(
        IdentityError::SessionExpired,
        ErrorCategory::Authentication,
        "Authentication failed. Please sign in again."
    )]
    #[case(
        IdentityError::RateLimited { email: "a@b.c".to_string() },
        ErrorCategory::RateLimited,
        "Too many requests. Please try again later."
    )]
    #[case(
        IdentityError::Delivery("smtp down".to_string()),
        ErrorCategory::ExternalDependency,
        "Unable to connect to an external service. Please try again later."
    )]
    fn test_identity_error_classification(
        #[case] error: IdentityError,
        #[case] category: ErrorCategory,
        #[case] message: &str,
    ) {
        let classification = Classification::of(&ClassifiedError::from(error));
        assert_eq!(classification.category, category);
        assert_eq!(classification.user_message, message);
    }
}
