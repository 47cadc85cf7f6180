//! Shared application state and the health endpoint.

use std::sync::Arc;

use axum::Json;

use crate::infrastructure::{IdentityProvider, TodoRepository};

// =============================================================================
// Application Configuration
// =============================================================================

/// Application configuration for runtime settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    /// Public base URL; callback links in mail point here.
    pub site_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            site_url: "http://localhost:3000".to_string(),
        }
    }
}

impl AppConfig {
    /// Absolute URL of the auth callback, with an optional `next` target.
    #[must_use]
    pub fn callback_url(&self, next: Option<&str>) -> String {
        let base = self.site_url.trim_end_matches('/');
        match next {
            Some(next) => format!("{base}/auth/callback?next={next}"),
            None => format!("{base}/auth/callback"),
        }
    }
}

// =============================================================================
// Application State
// =============================================================================

/// Shared application dependencies.
///
/// Collaborators are trait objects so the binary and the tests can choose
/// implementations at runtime.
#[derive(Clone)]
pub struct AppState {
    /// Owner-scoped record store.
    pub todo_repository: Arc<dyn TodoRepository>,
    /// Identity and session provider.
    pub identity: Arc<dyn IdentityProvider>,
    /// Application configuration.
    pub config: AppConfig,
}

impl AppState {
    /// Creates a new `AppState`.
    #[must_use]
    pub fn new(
        todo_repository: Arc<dyn TodoRepository>,
        identity: Arc<dyn IdentityProvider>,
        config: AppConfig,
    ) -> Self {
        Self {
            todo_repository,
            identity,
            config,
        }
    }
}

// =============================================================================
// GET /health Handler
// =============================================================================

/// Health check response body.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
}

/// Health check endpoint.
///
/// # Response
///
/// - **200 OK**: Service is healthy
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}
