//! Route table.

use axum::Router;
use axum::middleware;
use axum::routing::{get, patch, post};
use tower_http::trace::TraceLayer;

use super::auth::{
    auth_callback, reset_password, session_status, sign_in, sign_out, sign_up, update_password,
};
use super::gate::session_gate;
use super::handlers::{AppState, health_check};
use super::todos::{create_todo, delete_todo, list_todos, toggle_todo, update_todo};

/// Builds the application router with the session gate and request tracing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Authentication
        .route("/auth/signup", post(sign_up))
        .route("/auth/signin", post(sign_in))
        .route("/auth/signout", post(sign_out))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/update-password", post(update_password))
        .route("/auth/callback", get(auth_callback))
        .route("/auth/session", get(session_status))
        // Todos
        .route("/todos", get(list_todos).post(create_todo))
        .route("/todos/{id}", patch(update_todo).delete(delete_todo))
        .route("/todos/{id}/toggle", post(toggle_todo))
        .layer(middleware::from_fn_with_state(state.clone(), session_gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
