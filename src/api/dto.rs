//! Data Transfer Objects for API requests and responses.
//!
//! These are shared with the HTTP client so both sides agree on the wire
//! shape.

use serde::{Deserialize, Serialize};

use crate::domain::{Email, Session, SessionToken, Timestamp, Todo, TodoId, UserId};

// =============================================================================
// Todo DTOs
// =============================================================================

/// Request DTO for creating a todo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTodoRequest {
    /// Title of the todo.
    pub title: String,
}

/// Request DTO for updating a todo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTodoRequest {
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New completion flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<bool>,
}

/// Request DTO for `POST /todos/{id}/toggle`.
///
/// Carries the completion flag the caller currently sees; the stored value
/// becomes its negation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ToggleTodoRequest {
    /// Completion flag before the toggle.
    pub is_complete: bool,
}

/// Response DTO for a todo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoResponse {
    /// Todo ID.
    pub id: TodoId,
    /// Title.
    pub title: String,
    /// Completion flag.
    pub is_complete: bool,
    /// Owning account.
    pub user_id: UserId,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last update timestamp.
    pub updated_at: Timestamp,
}

impl From<&Todo> for TodoResponse {
    fn from(todo: &Todo) -> Self {
        Self {
            id: todo.id,
            title: todo.title.clone(),
            is_complete: todo.is_complete,
            user_id: todo.owner,
            created_at: todo.created_at,
            updated_at: todo.updated_at,
        }
    }
}

impl From<Todo> for TodoResponse {
    fn from(todo: Todo) -> Self {
        Self::from(&todo)
    }
}

impl From<TodoResponse> for Todo {
    fn from(response: TodoResponse) -> Self {
        Self {
            id: response.id,
            title: response.title,
            is_complete: response.is_complete,
            owner: response.user_id,
            created_at: response.created_at,
            updated_at: response.updated_at,
        }
    }
}

/// Generic acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub const OK: Self = Self { success: true };
}

// =============================================================================
// Auth DTOs
// =============================================================================

/// Request DTO for `POST /auth/signup`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub confirm_password: Option<String>,
}

/// Request DTO for `POST /auth/signin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
    /// Accepted for form compatibility; does not extend the session.
    #[serde(default)]
    pub remember_me: bool,
    /// Where to send the user afterwards.
    #[serde(default)]
    pub redirect_to: Option<String>,
}

/// Response DTO for a successful sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInResponse {
    /// Bearer token; also set as the `session` cookie.
    pub session: SessionToken,
    /// When the session lapses unless refreshed.
    pub expires_at: Timestamp,
    /// Post sign-in destination.
    pub redirect_to: String,
}

/// Response DTO for `POST /auth/signout`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignOutResponse {
    pub redirect_to: String,
}

/// Request DTO for `POST /auth/reset-password`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
}

/// Request DTO for `POST /auth/update-password`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePasswordRequest {
    pub password: String,
    #[serde(default)]
    pub confirm_password: Option<String>,
}

/// Query string of `GET /auth/callback`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
}

/// Public view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub user_id: UserId,
    pub email: Email,
    pub expires_at: Timestamp,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            user_id: session.user_id,
            email: session.email.clone(),
            expires_at: session.expires_at,
        }
    }
}

/// Response DTO for `GET /auth/session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatusResponse {
    pub is_authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionInfo>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_todo_response_wire_shape() {
        let todo = Todo::new(TodoId::generate(), UserId::generate(), "Ship it", Timestamp::now());
        let body = serde_json::to_value(TodoResponse::from(&todo)).unwrap();

        assert_eq!(body["title"], "Ship it");
        assert_eq!(body["is_complete"], false);
        assert_eq!(body["id"], todo.id.to_string());
        assert_eq!(body["user_id"], todo.owner.to_string());
    }

    #[rstest]
    fn test_todo_response_converts_back() {
        let todo = Todo::new(TodoId::generate(), UserId::generate(), "Back", Timestamp::now())
            .with_completion(true);
        assert_eq!(Todo::from(TodoResponse::from(&todo)), todo);
    }

    #[rstest]
    fn test_update_request_fields_are_optional() {
        let request: UpdateTodoRequest = serde_json::from_str(r#"{"is_complete":true}"#).unwrap();
        assert_eq!(request.title, None);
        assert_eq!(request.is_complete, Some(true));
    }

    #[rstest]
    fn test_sign_in_request_defaults() {
        let request: SignInRequest =
            serde_json::from_str(r#"{"email":"a@b.c","password":"x"}"#).unwrap();
        assert!(!request.remember_me);
        assert!(request.redirect_to.is_none());
    }
}
