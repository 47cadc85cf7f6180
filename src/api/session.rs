//! Session transport.
//!
//! A session token travels either as `Authorization: Bearer <token>` or in
//! the `session` cookie. The bearer header wins when both are present.

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::{HeaderMap, HeaderValue, request::Parts};

use super::error::{ApiError, ApiErrorResponse, status_for};
use super::handlers::AppState;
use crate::classify::{ClassifiedError, Failure, classify_auth};
use crate::domain::{Session, SessionToken};
use crate::infrastructure::IdentityError;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "session";

/// Reads the session token from the request headers.
#[must_use]
pub fn session_token(headers: &HeaderMap) -> Option<SessionToken> {
    bearer_token(headers).or_else(|| cookie_token(headers))
}

fn bearer_token(headers: &HeaderMap) -> Option<SessionToken> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| SessionToken::new(token))
}

fn cookie_token(headers: &HeaderMap) -> Option<SessionToken> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| SessionToken::new(value))
}

/// `Set-Cookie` value carrying a session token.
#[must_use]
pub fn session_cookie(token: &SessionToken) -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={}; HttpOnly; Path=/; SameSite=Lax",
        token.as_str()
    ))
    .unwrap_or_else(|_| clear_session_cookie())
}

/// `Set-Cookie` value that removes the session cookie.
#[must_use]
pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("session=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0")
}

/// Resolves the request's session against the identity provider.
///
/// A session already placed in the request extensions by the session gate
/// is not consulted here; see the extractors.
///
/// # Errors
///
/// Returns [`IdentityError::SessionMissing`] when no token is present, or
/// whatever the provider reports for the token.
pub async fn resolve_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Session, IdentityError> {
    let token = session_token(headers).ok_or(IdentityError::SessionMissing)?;
    state.identity.current_session(&token).await
}

// =============================================================================
// Extractors
// =============================================================================

/// The authenticated session of the current request.
///
/// Rejects with 401 when the session is missing or expired.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = ApiErrorResponse;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<Session>() {
            return Ok(Self(session.clone()));
        }
        match resolve_session(state, &parts.headers).await {
            Ok(session) => Ok(Self(session)),
            Err(IdentityError::SessionMissing) => Err(ApiErrorResponse::unauthenticated()),
            Err(error) => {
                let error = ClassifiedError::from(error);
                let status = status_for(&error);
                let classification = classify_auth(&Failure::from(error), "session");
                Err(ApiErrorResponse::new(
                    status,
                    ApiError::new(classification.category.code(), classification.user_message),
                ))
            }
        }
    }
}

impl OptionalFromRequestParts<AppState> for CurrentSession {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<Session>() {
            return Ok(Some(Self(session.clone())));
        }
        Ok(resolve_session(state, &parts.headers).await.ok().map(Self))
    }
}
