//! API error handling.
//!
//! Every failure leaving a handler goes through the classifier, so the body
//! always carries a category code and a user-safe message.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::classify::{ClassifiedError, ErrorCategory, Failure, classify};
use crate::infrastructure::{IdentityError, RepositoryError};
use crate::validation::{FieldError, ValidationError, format_validation_errors};

/// Code attached to store errors for a missing or foreign record.
pub const NOT_FOUND_CODE: &str = "NOT_FOUND";

// =============================================================================
// API Error
// =============================================================================

/// API error structure for JSON responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Category wire code for programmatic handling.
    pub code: String,
    /// User-safe message.
    pub message: String,
    /// Optional field-level errors for validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

impl ApiError {
    /// Creates a new API error.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }
}

// =============================================================================
// API Error Response
// =============================================================================

/// API error response containing status code and error details.
#[derive(Debug, Clone)]
pub struct ApiErrorResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Error details.
    pub error: ApiError,
}

impl ApiErrorResponse {
    /// Creates a new API error response.
    #[must_use]
    pub const fn new(status: StatusCode, error: ApiError) -> Self {
        Self { status, error }
    }

    /// Creates a 400 response for a malformed path or query parameter.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ApiError::new(ErrorCategory::Validation.code(), message),
        )
    }

    /// Creates a 401 response without consulting the identity provider.
    #[must_use]
    pub fn unauthenticated() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            ApiError::new(
                ErrorCategory::Authentication.code(),
                ErrorCategory::Authentication.user_message(),
            ),
        )
    }

    /// Creates a 404 response for a todo the caller cannot see.
    #[must_use]
    pub fn todo_not_found() -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            ApiError::new(ErrorCategory::RemoteStore.code(), "Todo not found"),
        )
    }
}

/// HTTP status for a classified error.
#[must_use]
pub fn status_for(error: &ClassifiedError) -> StatusCode {
    match error.category() {
        ErrorCategory::Validation => StatusCode::BAD_REQUEST,
        ErrorCategory::Authentication => StatusCode::UNAUTHORIZED,
        ErrorCategory::Authorization => StatusCode::FORBIDDEN,
        ErrorCategory::RemoteStore if error.code() == Some(NOT_FOUND_CODE) => {
            StatusCode::NOT_FOUND
        }
        ErrorCategory::RemoteStore | ErrorCategory::Unclassified => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ErrorCategory::ExternalDependency => StatusCode::BAD_GATEWAY,
        ErrorCategory::RateLimited => StatusCode::TOO_MANY_REQUESTS,
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

impl From<ClassifiedError> for ApiErrorResponse {
    fn from(error: ClassifiedError) -> Self {
        if error.code() == Some(NOT_FOUND_CODE) {
            tracing::debug!(%error, "Todo not visible to caller");
            return Self::todo_not_found();
        }
        let status = status_for(&error);
        let classification = classify(&Failure::from(error));
        Self::new(
            status,
            ApiError::new(classification.category.code(), classification.user_message),
        )
    }
}

impl From<Failure> for ApiErrorResponse {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Classified(error) => Self::from(error),
            other => {
                let classification = classify(&other);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new(classification.category.code(), classification.user_message),
                )
            }
        }
    }
}

impl From<RepositoryError> for ApiErrorResponse {
    fn from(error: RepositoryError) -> Self {
        Self::from(ClassifiedError::from(error))
    }
}

impl From<IdentityError> for ApiErrorResponse {
    fn from(error: IdentityError) -> Self {
        Self::from(ClassifiedError::from(error))
    }
}

impl From<ValidationError> for ApiErrorResponse {
    fn from(error: ValidationError) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ApiError {
                code: ErrorCategory::Validation.code().to_string(),
                message: format_validation_errors(&error.errors),
                details: Some(error.errors),
            },
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
