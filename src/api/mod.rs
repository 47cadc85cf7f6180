//! API module for HTTP handlers.
//!
//! This module contains route definitions and request/response handlers.

pub mod auth;
pub mod dto;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod router;
pub mod session;
pub mod todos;

pub use dto::{
    CreateTodoRequest, SessionStatusResponse, SignInRequest, SignInResponse, SuccessResponse,
    TodoResponse, ToggleTodoRequest, UpdateTodoRequest,
};
pub use error::{ApiError, ApiErrorResponse};
pub use gate::{GateDecision, route_decision};
pub use handlers::{AppConfig, AppState, HealthResponse, health_check};
pub use router::build_router;
pub use session::{CurrentSession, SESSION_COOKIE};
