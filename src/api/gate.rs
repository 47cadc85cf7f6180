//! Session gate.
//!
//! Runs before routing. Protected paths need a session; sign-in pages are
//! skipped when the caller already has one. The resolved session is stored
//! in the request extensions so handlers do not look it up again.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use super::error::ApiErrorResponse;
use super::handlers::AppState;
use super::session::resolve_session;

/// Path prefixes that require a session.
pub const PROTECTED_PREFIXES: [&str; 1] = ["/todos"];

/// Path prefixes that a signed-in user is sent away from.
pub const AUTH_PAGE_PREFIXES: [&str; 3] = ["/signin", "/signup", "/forgot-password"];

/// Characters left as-is in a query value, as a form-encoded search
/// parameter leaves them.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'*')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_');

/// What the gate does with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Pass through to the router.
    Allow,
    /// Protected path without a session, JSON client: 401.
    Unauthorized,
    /// Protected path without a session, browser: redirect to sign-in.
    RedirectToSignIn { redirect_to: String },
    /// Sign-in page with a session: redirect to the list.
    RedirectToTodos,
}

/// Decides how to handle a request.
#[must_use]
pub fn route_decision(path: &str, authenticated: bool, wants_json: bool) -> GateDecision {
    let protected = PROTECTED_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix));
    let auth_page = AUTH_PAGE_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix));

    match (protected, auth_page, authenticated) {
        (true, _, false) if wants_json => GateDecision::Unauthorized,
        (true, _, false) => GateDecision::RedirectToSignIn {
            redirect_to: path.to_string(),
        },
        (_, true, true) => GateDecision::RedirectToTodos,
        _ => GateDecision::Allow,
    }
}

/// Sign-in page URL that returns to `path` afterwards.
#[must_use]
pub fn sign_in_location(path: &str) -> String {
    format!(
        "/signin?redirectTo={}",
        utf8_percent_encode(path, QUERY_VALUE)
    )
}

/// Returns `true` for API clients rather than page navigations.
fn wants_json(headers: &HeaderMap) -> bool {
    let header_mentions_json = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("application/json"))
    };
    headers.contains_key(AUTHORIZATION)
        || header_mentions_json(ACCEPT)
        || header_mentions_json(CONTENT_TYPE)
}

/// Middleware applying [`route_decision`].
pub async fn session_gate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let lookup = resolve_session(&state, request.headers());
    let session = lookup.await.ok();
    let path = request.uri().path().to_string();
    let decision = route_decision(&path, session.is_some(), wants_json(request.headers()));

    match decision {
        GateDecision::Allow => {
            if let Some(session) = session {
                request.extensions_mut().insert(session);
            }
            next.run(request).await
        }
        GateDecision::Unauthorized => {
            tracing::debug!(%path, "Rejected unauthenticated API request");
            ApiErrorResponse::unauthenticated().into_response()
        }
        GateDecision::RedirectToSignIn { redirect_to } => {
            tracing::debug!(%path, "Redirecting to sign-in");
            Redirect::to(&sign_in_location(&redirect_to)).into_response()
        }
        GateDecision::RedirectToTodos => Redirect::to("/todos").into_response(),
    }
}
