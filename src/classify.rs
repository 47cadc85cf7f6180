//! Error classification.
//!
//! Any failure caught at a request or mutation boundary is turned into a
//! [`Failure`] and mapped to one of a closed set of [`ErrorCategory`]
//! values plus a message that is safe to show to the end user. Only
//! validation failures keep their own text; every other category gets a
//! fixed message so internal detail never leaks.
//!
//! Classification also writes one diagnostic log event. Logging is best
//! effort and never fails the caller.

use std::any::Any;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Free-form diagnostic context attached to a [`ClassifiedError`].
pub type ErrorContext = BTreeMap<String, serde_json::Value>;

/// Generic message for anything that is not validation-category.
pub const GENERIC_MESSAGE: &str = "An unexpected error occurred. Please try again later.";

// =============================================================================
// Error Category
// =============================================================================

/// Closed set of failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Bad user input; the message is meant for the user.
    Validation,
    /// Missing, invalid or expired session; bad credentials.
    Authentication,
    /// Authenticated but not allowed.
    Authorization,
    /// The record store failed.
    RemoteStore,
    /// Some other collaborator (mail, identity backend) failed.
    ExternalDependency,
    /// Too many requests.
    RateLimited,
    /// Anything without a recognized category.
    Unclassified,
}

impl ErrorCategory {
    /// All categories, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Validation,
        Self::Authentication,
        Self::Authorization,
        Self::RemoteStore,
        Self::ExternalDependency,
        Self::RateLimited,
        Self::Unclassified,
    ];

    /// Stable wire code used in API error bodies.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::Authentication => "AUTHENTICATION",
            Self::Authorization => "AUTHORIZATION",
            Self::RemoteStore => "REMOTE_STORE",
            Self::ExternalDependency => "EXTERNAL_DEPENDENCY",
            Self::RateLimited => "RATE_LIMITED",
            Self::Unclassified => "UNCLASSIFIED",
        }
    }

    /// Parses a wire code back into a category.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.code() == code)
    }

    /// Fixed user-facing message for this category.
    ///
    /// Validation failures do not use this; they pass their own message
    /// through.
    #[must_use]
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::Validation | Self::Unclassified => GENERIC_MESSAGE,
            Self::Authentication => "Authentication failed. Please sign in again.",
            Self::Authorization => "You don't have permission to perform this action.",
            Self::RemoteStore => "A database error occurred. Please try again later.",
            Self::ExternalDependency => {
                "Unable to connect to an external service. Please try again later."
            }
            Self::RateLimited => "Too many requests. Please try again later.",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.code())
    }
}

// =============================================================================
// Classified Error
// =============================================================================

/// A failure that already knows its category.
///
/// Built once where the failure is caught and not modified afterwards,
/// except by [`log_auth_error`] which merges auth context in before logging.
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    category: ErrorCategory,
    message: String,
    code: Option<String>,
    context: ErrorContext,
    cause: Option<Arc<dyn Error + Send + Sync>>,
}

impl ClassifiedError {
    /// Creates a classified error with the given category and message.
    #[must_use]
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            code: None,
            context: ErrorContext::new(),
            cause: None,
        }
    }

    /// Shorthand for a validation-category error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, message)
    }

    /// Attaches a machine-readable code.
    #[must_use]
    pub fn with_code(self, code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..self
        }
    }

    /// Adds one context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Wraps the underlying cause.
    #[must_use]
    pub fn with_cause(self, cause: impl Error + Send + Sync + 'static) -> Self {
        Self {
            cause: Some(Arc::new(cause)),
            ..self
        }
    }

    /// Returns the category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.category
    }

    /// Returns the internal message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the optional machine code.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Returns the context map.
    #[must_use]
    pub const fn context(&self) -> &ErrorContext {
        &self.context
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "[{}]", self.category)?;
        if let Some(code) = &self.code {
            write!(formatter, " ({code})")?;
        }
        write!(formatter, ": {}", self.message)
    }
}

impl Error for ClassifiedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn Error + 'static))
    }
}

// =============================================================================
// Failure
// =============================================================================

/// A caught failure of unknown shape.
pub enum Failure {
    /// Carries a recognized category.
    Classified(ClassifiedError),
    /// An ordinary error value with no category.
    Error(Box<dyn Error + Send + Sync>),
    /// Something that is not an error at all, such as a panic payload.
    /// Its contents are never inspected.
    Opaque(Box<dyn Any + Send>),
}

impl Failure {
    /// Wraps a plain error value.
    #[must_use]
    pub fn from_error(error: impl Error + Send + Sync + 'static) -> Self {
        Self::Error(Box::new(error))
    }

    /// Returns the category tag if the failure carries one.
    #[must_use]
    pub const fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Classified(error) => Some(error.category),
            Self::Error(_) | Self::Opaque(_) => None,
        }
    }
}

impl std::fmt::Debug for Failure {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Classified(error) => formatter.debug_tuple("Classified").field(error).finish(),
            Self::Error(error) => formatter.debug_tuple("Error").field(error).finish(),
            Self::Opaque(_) => formatter.write_str("Opaque(..)"),
        }
    }
}

impl From<ClassifiedError> for Failure {
    fn from(error: ClassifiedError) -> Self {
        Self::Classified(error)
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Result of classifying a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// The category.
    pub category: ErrorCategory,
    /// Message safe to show to the user.
    pub user_message: String,
}

impl Classification {
    /// Maps a classified error to its user-facing form.
    #[must_use]
    pub fn of(error: &ClassifiedError) -> Self {
        let user_message = match error.category {
            ErrorCategory::Validation => error.message.clone(),
            category => category.user_message().to_string(),
        };
        Self {
            category: error.category,
            user_message,
        }
    }

    fn unclassified() -> Self {
        Self {
            category: ErrorCategory::Unclassified,
            user_message: GENERIC_MESSAGE.to_string(),
        }
    }
}

/// Maps a failure to its category and user message without logging.
#[must_use]
pub fn categorize(failure: &Failure) -> Classification {
    match failure {
        Failure::Classified(error) => Classification::of(error),
        Failure::Error(_) | Failure::Opaque(_) => Classification::unclassified(),
    }
}

/// Maps a failure to its category and user message, logging it.
pub fn classify(failure: &Failure) -> Classification {
    log_failure(failure, None);
    categorize(failure)
}

/// Classifies a failure raised inside an authentication flow.
///
/// Same mapping as [`classify`]; the log event also carries `action`.
pub fn classify_auth(failure: &Failure, action: &str) -> Classification {
    log_failure(failure, Some(action));
    categorize(failure)
}

/// Logs an authentication failure with auth-specific context and returns
/// the enriched error.
///
/// The context gains `authAction` (taken from its `action` entry, or
/// `"unknown"`) and an RFC 3339 `timestamp`. Failures without a category
/// are wrapped as [`ErrorCategory::Authentication`].
pub fn log_auth_error(failure: Failure, context: ErrorContext) -> ClassifiedError {
    let action = context
        .get("action")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    let mut auth_context = context;
    auth_context.insert("authAction".to_string(), action.into());
    auth_context.insert("timestamp".to_string(), Utc::now().to_rfc3339().into());

    let mut error = match failure {
        Failure::Classified(error) => error,
        Failure::Error(source) => ClassifiedError {
            category: ErrorCategory::Authentication,
            message: source.to_string(),
            code: None,
            context: ErrorContext::new(),
            cause: Some(Arc::from(source)),
        },
        Failure::Opaque(_) => {
            ClassifiedError::new(ErrorCategory::Authentication, "Authentication error")
        }
    };
    error.context.extend(auth_context);

    log_classified(&error, None);
    error
}

// =============================================================================
// Logging
// =============================================================================

fn log_failure(failure: &Failure, action: Option<&str>) {
    match failure {
        Failure::Classified(error) => log_classified(error, action),
        Failure::Error(error) => {
            tracing::error!(
                category = %ErrorCategory::Unclassified,
                action = action.unwrap_or("-"),
                timestamp = %Utc::now().to_rfc3339(),
                "[UNHANDLED]: {error}"
            );
        }
        Failure::Opaque(_) => {
            tracing::error!(
                category = %ErrorCategory::Unclassified,
                action = action.unwrap_or("-"),
                timestamp = %Utc::now().to_rfc3339(),
                "Unknown error type"
            );
        }
    }
}

fn log_classified(error: &ClassifiedError, action: Option<&str>) {
    let mut context = error.context.clone();
    context
        .entry("timestamp".to_string())
        .or_insert_with(|| Utc::now().to_rfc3339().into());
    if let Some(action) = action {
        context.insert("action".to_string(), action.into());
    }
    // Empty on a rendering failure; the event is still emitted.
    let rendered = serde_json::to_string(&context).unwrap_or_default();
    let cause = error.cause.as_ref().map(ToString::to_string);

    tracing::error!(
        category = %error.category,
        code = error.code.as_deref().unwrap_or("-"),
        context = %rendered,
        cause = ?cause,
        "{}",
        error.message
    );
}

// =============================================================================
// Message Sanitizing
// =============================================================================

/// Maps raw identity-provider messages to user-friendly text.
///
/// Known messages are translated; messages that look like storage internals
/// are replaced with [`GENERIC_MESSAGE`]; anything else passes through.
#[must_use]
pub fn sanitize_error_message(message: &str) -> String {
    let known = match message {
        "User already registered" => Some("An account with this email already exists"),
        "Invalid login credentials" => Some("Incorrect email or password"),
        "Email not confirmed" => Some("Please verify your email before logging in"),
        "JWT expired" => Some("Your session has expired, please login again"),
        _ => None,
    };
    if let Some(known) = known {
        return known.to_string();
    }

    if message.contains("database") || message.contains("SQL") || message.contains("constraint") {
        return GENERIC_MESSAGE.to_string();
    }

    message.to_string()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Debug, thiserror::Error)]
    #[error("connection reset by peer at 10.0.0.3:5432")]
    struct InternalError;

    #[rstest]
    fn test_validation_message_passes_through() {
        let failure = Failure::from(ClassifiedError::validation("Todo title cannot be empty"));
        let classification = classify(&failure);
        assert_eq!(classification.category, ErrorCategory::Validation);
        assert_eq!(classification.user_message, "Todo title cannot be empty");
    }

    #[rstest]
    #[case(ErrorCategory::Authentication, "Authentication failed. Please sign in again.")]
    #[case(ErrorCategory::Authorization, "You don't have permission to perform this action.")]
    #[case(ErrorCategory::RemoteStore, "A database error occurred. Please try again later.")]
    #[case(
        ErrorCategory::ExternalDependency,
        "Unable to connect to an external service. Please try again later."
    )]
    #[case(ErrorCategory::RateLimited, "Too many requests. Please try again later.")]
    #[case(ErrorCategory::Unclassified, GENERIC_MESSAGE)]
    fn test_non_validation_categories_use_fixed_message(
        #[case] category: ErrorCategory,
        #[case] expected: &str,
    ) {
        let failure = Failure::from(
            ClassifiedError::new(category, "relation \"todos\" does not exist").with_code("42P01"),
        );
        let classification = classify(&failure);
        assert_eq!(classification.category, category);
        assert_eq!(classification.user_message, expected);
    }

    #[rstest]
    fn test_plain_error_is_unclassified_and_hidden() {
        let failure = Failure::from_error(InternalError);
        let classification = classify(&failure);
        assert_eq!(classification.category, ErrorCategory::Unclassified);
        assert_eq!(classification.user_message, GENERIC_MESSAGE);
        assert!(!classification.user_message.contains("10.0.0.3"));
    }

    #[rstest]
    fn test_opaque_value_is_unclassified() {
        let failure = Failure::Opaque(Box::new(42_u32));
        let classification = classify(&failure);
        assert_eq!(classification.category, ErrorCategory::Unclassified);
        assert_eq!(classification.user_message, GENERIC_MESSAGE);
        assert_eq!(format!("{failure:?}"), "Opaque(..)");
    }

    #[rstest]
    fn test_category_codes_round_trip() {
        for category in ErrorCategory::ALL {
            assert_eq!(ErrorCategory::from_code(category.code()), Some(category));
        }
        assert_eq!(ErrorCategory::from_code("NOPE"), None);
    }

    #[rstest]
    fn test_classified_error_display_and_source() {
        let error = ClassifiedError::new(ErrorCategory::RemoteStore, "Failed to create todo")
            .with_code("insert")
            .with_cause(InternalError);
        assert_eq!(error.to_string(), "[REMOTE_STORE] (insert): Failed to create todo");
        assert!(error.source().is_some());
    }

    #[rstest]
    fn test_log_auth_error_merges_context() {
        let mut context = ErrorContext::new();
        context.insert("action".to_string(), "signin".into());
        context.insert("email".to_string(), "a@b.c".into());

        let error = log_auth_error(Failure::from_error(InternalError), context);

        assert_eq!(error.category(), ErrorCategory::Authentication);
        assert_eq!(error.context()["authAction"], "signin");
        assert_eq!(error.context()["email"], "a@b.c");
        assert!(error.context().contains_key("timestamp"));
        assert!(error.source().is_some());
    }

    #[rstest]
    fn test_log_auth_error_keeps_existing_category() {
        let failure = Failure::from(
            ClassifiedError::new(ErrorCategory::RateLimited, "slow down").with_context("attempts", 6),
        );
        let error = log_auth_error(failure, ErrorContext::new());

        assert_eq!(error.category(), ErrorCategory::RateLimited);
        assert_eq!(error.context()["authAction"], "unknown");
        assert_eq!(error.context()["attempts"], 6);
    }

    #[rstest]
    fn test_log_auth_error_opaque_gets_default_message() {
        let error = log_auth_error(Failure::Opaque(Box::new("boom")), ErrorContext::new());
        assert_eq!(error.message(), "Authentication error");
    }

    #[rstest]
    #[case("Invalid login credentials", "Incorrect email or password")]
    #[case("User already registered", "An account with this email already exists")]
    #[case("duplicate key violates unique constraint", GENERIC_MESSAGE)]
    #[case("Password is too short", "Password is too short")]
    fn test_sanitize_error_message(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(sanitize_error_message(raw), expected);
    }
}
