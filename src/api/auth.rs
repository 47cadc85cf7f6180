//! Authentication handlers.
//!
//! # Endpoints
//!
//! - `POST /auth/signup` - Register and send a verification link
//! - `POST /auth/signin` - Issue a session and set the session cookie
//! - `POST /auth/signout` - Revoke the session and clear the cookie
//! - `POST /auth/reset-password` - Send a recovery link
//! - `POST /auth/update-password` - Change the signed-in user's password
//! - `GET /auth/callback` - Exchange a one-time code from a mailed link
//! - `GET /auth/session` - Report whether the caller is signed in
//!
//! Identity failures are logged through [`log_auth_error`] with the action
//! name before being turned into a response.

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Redirect, Response},
};

use super::dto::{
    CallbackQuery, ResetPasswordRequest, SessionInfo, SessionStatusResponse, SignInRequest,
    SignInResponse, SignOutResponse, SignUpRequest, SuccessResponse, UpdatePasswordRequest,
};
use super::error::{ApiError, ApiErrorResponse, status_for};
use super::handlers::AppState;
use super::session::{CurrentSession, clear_session_cookie, session_cookie, session_token};
use crate::classify::{Classification, ClassifiedError, ErrorContext, Failure, log_auth_error};
use crate::domain::Email;
use crate::infrastructure::CodePurpose;
use crate::validation::{
    AuthForm, FieldError, MIN_PASSWORD_LENGTH, ValidationError, validate_auth_form,
    validate_email,
};

/// Where a signed-in user lands by default.
pub const DEFAULT_REDIRECT: &str = "/todos";

// =============================================================================
// POST /auth/signup Handler
// =============================================================================

/// Registers an account.
///
/// The account cannot sign in until the emailed verification link is
/// followed.
///
/// # Errors
///
/// - 400 for missing or malformed fields, or an already registered email
/// - 502 if the verification mail cannot be sent
pub async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<SuccessResponse>), ApiErrorResponse> {
    validate_new_credentials(
        &request.email,
        &request.password,
        request.confirm_password.as_deref(),
    )?;
    let email = Email::new(request.email);

    state
        .identity
        .sign_up(email.clone(), request.password, state.config.callback_url(None))
        .await
        .map_err(|error| auth_failure(error, "signup", Some(&email)))?;

    Ok((StatusCode::CREATED, Json(SuccessResponse::OK)))
}

// =============================================================================
// POST /auth/signin Handler
// =============================================================================

/// Signs in with email and password.
///
/// On success the session token is returned in the body and set as the
/// `session` cookie.
///
/// # Errors
///
/// - 400 for missing fields, bad credentials, or an unverified email
/// - 429 after too many failed attempts for the same email
pub async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> Result<Response, ApiErrorResponse> {
    require_fields(&request.email, &request.password)?;
    let email = Email::new(request.email);
    if request.remember_me {
        // Session lifetime is fixed by the identity provider.
        tracing::debug!(%email, "Remember-me requested; session lifetime unchanged");
    }

    let session = state
        .identity
        .sign_in(email.clone(), request.password)
        .await
        .map_err(|error| auth_failure(error, "signin", Some(&email)))?;

    let body = SignInResponse {
        expires_at: session.expires_at,
        redirect_to: safe_redirect(request.redirect_to.as_deref()),
        session: session.token.clone(),
    };
    let mut response = Json(body).into_response();
    response
        .headers_mut()
        .insert(SET_COOKIE, session_cookie(&session.token));
    Ok(response)
}

// =============================================================================
// POST /auth/signout Handler
// =============================================================================

/// Signs out. Succeeds even without a session.
///
/// # Errors
///
/// - 502 if the identity provider is unreachable
pub async fn sign_out(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiErrorResponse> {
    if let Some(token) = session_token(&headers) {
        state
            .identity
            .sign_out(&token)
            .await
            .map_err(|error| auth_failure(error, "signout", None))?;
    }

    let mut response = Json(SignOutResponse {
        redirect_to: "/".to_string(),
    })
    .into_response();
    response
        .headers_mut()
        .insert(SET_COOKIE, clear_session_cookie());
    Ok(response)
}

// =============================================================================
// POST /auth/reset-password Handler
// =============================================================================

/// Sends a password recovery link.
///
/// Unknown addresses get the same response as known ones.
///
/// # Errors
///
/// - 400 for a missing or malformed email
/// - 502 if the mail cannot be sent
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<SuccessResponse>, ApiErrorResponse> {
    validate_auth_form(&AuthForm {
        email: Some(request.email.as_str()),
        ..AuthForm::default()
    })?;
    let email = Email::new(request.email);

    state
        .identity
        .send_password_reset(
            email.clone(),
            state.config.callback_url(Some("/auth/reset-password")),
        )
        .await
        .map_err(|error| auth_failure(error, "reset-password", Some(&email)))?;

    Ok(Json(SuccessResponse::OK))
}

// =============================================================================
// POST /auth/update-password Handler
// =============================================================================

/// Replaces the signed-in user's password.
///
/// # Errors
///
/// - 400 if the new password is too short or the confirmation differs
/// - 401 if there is no valid session
pub async fn update_password(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Json(request): Json<UpdatePasswordRequest>,
) -> Result<Json<SuccessResponse>, ApiErrorResponse> {
    let mut errors = Vec::new();
    if request.password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(FieldError::new(
            "password",
            format!("New password must be at least {MIN_PASSWORD_LENGTH} characters long"),
        ));
    }
    if let Some(confirm) = request.confirm_password.as_deref()
        && confirm != request.password
    {
        errors.push(FieldError::new("confirmPassword", "Passwords do not match"));
    }
    if !errors.is_empty() {
        return Err(ValidationError::new(errors).into());
    }

    state
        .identity
        .update_password(&session.token, request.password)
        .await
        .map_err(|error| auth_failure(error, "update-password", Some(&session.email)))?;

    Ok(Json(SuccessResponse::OK))
}

// =============================================================================
// GET /auth/callback Handler
// =============================================================================

/// Exchanges a one-time code from a mailed link for a session.
///
/// Redirects to `next` (default `/todos`) with the session cookie set. A
/// request without a code goes to `/`; an invalid or used code goes to
/// `/signin`.
pub async fn auth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(code) = query.code.filter(|code| !code.is_empty()) else {
        return Redirect::to("/").into_response();
    };

    match state.identity.exchange_code(&code).await {
        Ok(exchange) => {
            let next = match (query.next.as_deref(), exchange.purpose) {
                (Some(next), _) => safe_redirect(Some(next)),
                (None, CodePurpose::Recovery) => "/auth/reset-password".to_string(),
                (None, CodePurpose::Verification) => DEFAULT_REDIRECT.to_string(),
            };
            tracing::info!(user_id = %exchange.session.user_id, purpose = ?exchange.purpose, "Callback code exchanged");
            let mut response = Redirect::to(&next).into_response();
            response
                .headers_mut()
                .insert(SET_COOKIE, session_cookie(&exchange.session.token));
            response
        }
        Err(error) => {
            let _ = auth_failure(error, "callback", None);
            Redirect::to("/signin").into_response()
        }
    }
}

// =============================================================================
// GET /auth/session Handler
// =============================================================================

/// Reports the caller's session, if any.
pub async fn session_status(session: Option<CurrentSession>) -> Json<SessionStatusResponse> {
    let session = session.map(|CurrentSession(session)| SessionInfo::from(&session));
    Json(SessionStatusResponse {
        is_authenticated: session.is_some(),
        session,
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Logs an identity failure with auth context and renders it.
fn auth_failure(
    error: impl Into<ClassifiedError>,
    action: &str,
    email: Option<&Email>,
) -> ApiErrorResponse {
    let mut context = ErrorContext::new();
    context.insert("action".to_string(), action.into());
    if let Some(email) = email {
        context.insert("email".to_string(), email.as_str().into());
    }

    let error = log_auth_error(Failure::from(error.into()), context);
    let status = status_for(&error);
    let classification = Classification::of(&error);
    ApiErrorResponse::new(
        status,
        ApiError::new(classification.category.code(), classification.user_message),
    )
}

fn require_fields(email: &str, password: &str) -> Result<(), ValidationError> {
    let mut errors = Vec::new();
    if email.trim().is_empty() {
        errors.push(FieldError::new("email", "Email is required"));
    }
    if password.is_empty() {
        errors.push(FieldError::new("password", "Password is required"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(errors))
    }
}

/// Server-side check for sign-up: presence, email format, minimum length,
/// and confirmation.
///
/// Character-class rules only feed the strength meter on the form; the
/// server does not enforce them.
fn validate_new_credentials(
    email: &str,
    password: &str,
    confirm_password: Option<&str>,
) -> Result<(), ValidationError> {
    require_fields(email, password)?;

    let mut errors = Vec::new();
    if !validate_email(email.trim()) {
        errors.push(FieldError::new("email", "Please enter a valid email address"));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(FieldError::new(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LENGTH} characters long"),
        ));
    }
    if let Some(confirm) = confirm_password
        && confirm != password
    {
        errors.push(FieldError::new("confirmPassword", "Passwords do not match"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(errors))
    }
}

/// Accepts only same-site absolute paths as redirect targets.
fn safe_redirect(target: Option<&str>) -> String {
    match target {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path.to_string(),
        _ => DEFAULT_REDIRECT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, "/todos")]
    #[case(Some("/todos?page=2"), "/todos?page=2")]
    #[case(Some("//evil.example.com"), "/todos")]
    #[case(Some("https://evil.example.com"), "/todos")]
    fn test_safe_redirect(#[case] target: Option<&str>, #[case] expected: &str) {
        assert_eq!(safe_redirect(target), expected);
    }

    #[rstest]
    fn test_new_credentials_only_enforce_length() {
        assert!(validate_new_credentials("user@example.com", "lowercase", None).is_ok());
        let error = validate_new_credentials("user@example.com", "short", None).unwrap_err();
        assert_eq!(error.messages_for("password").count(), 1);
    }

    #[rstest]
    fn test_new_credentials_require_both_fields() {
        let error = validate_new_credentials("", "", None).unwrap_err();
        assert_eq!(error.errors.len(), 2);
    }

    #[rstest]
    fn test_auth_failure_keeps_provider_message_for_validation() {
        let response = auth_failure(
            crate::infrastructure::IdentityError::EmailNotConfirmed,
            "signin",
            None,
        );
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.error.message,
            "Please verify your email before logging in"
        );
    }
}
