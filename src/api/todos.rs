//! Todo handlers.
//!
//! # Endpoints
//!
//! - `GET /todos` - List the caller's todos, newest first
//! - `POST /todos` - Create a todo
//! - `PATCH /todos/{id}` - Update title and/or completion
//! - `POST /todos/{id}/toggle` - Flip completion
//! - `DELETE /todos/{id}` - Delete a todo
//!
//! Every handler requires a session and passes its user id to the store as
//! the owner, so a todo owned by someone else is reported as not found.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use super::dto::{
    CreateTodoRequest, SuccessResponse, TodoResponse, ToggleTodoRequest, UpdateTodoRequest,
};
use super::error::ApiErrorResponse;
use super::handlers::AppState;
use super::session::CurrentSession;
use crate::domain::{Timestamp, Todo, TodoId, TodoPatch};
use crate::validation::{ValidationError, validate_title};

// =============================================================================
// GET /todos Handler
// =============================================================================

/// Lists the caller's todos.
///
/// # Errors
///
/// - 401 if there is no valid session
/// - 500 if the store fails
pub async fn list_todos(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<Json<Vec<TodoResponse>>, ApiErrorResponse> {
    let todos = state
        .todo_repository
        .list_for_owner(&session.user_id)
        .await?;

    Ok(Json(todos.iter().map(TodoResponse::from).collect()))
}

// =============================================================================
// POST /todos Handler
// =============================================================================

/// Creates a todo.
///
/// # Request Body
///
/// ```json
/// { "title": "Buy milk" }
/// ```
///
/// # Errors
///
/// - 400 if the title is blank or too long
/// - 401 if there is no valid session
/// - 500 if the store fails
pub async fn create_todo(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Json(request): Json<CreateTodoRequest>,
) -> Result<(StatusCode, Json<TodoResponse>), ApiErrorResponse> {
    let title = validate_title(&request.title)?;
    let todo = Todo::new(TodoId::generate(), session.user_id, title, Timestamp::now());

    state.todo_repository.insert(&todo).await?;
    tracing::info!(todo_id = %todo.id, user_id = %session.user_id, "Todo created");

    Ok((StatusCode::CREATED, Json(TodoResponse::from(&todo))))
}

// =============================================================================
// PATCH /todos/{id} Handler
// =============================================================================

/// Updates a todo's title and/or completion flag.
///
/// # Errors
///
/// - 400 if the id is malformed, the title is invalid, or nothing is set
/// - 401 if there is no valid session
/// - 404 if the caller has no such todo
pub async fn update_todo(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(todo_id): Path<String>,
    Json(request): Json<UpdateTodoRequest>,
) -> Result<Json<TodoResponse>, ApiErrorResponse> {
    let todo_id = parse_todo_id(&todo_id)?;
    let patch = build_patch(request)?;

    let updated = state
        .todo_repository
        .update(&session.user_id, &todo_id, patch, Timestamp::now())
        .await?;
    tracing::info!(%todo_id, "Todo updated");

    Ok(Json(TodoResponse::from(&updated)))
}

// =============================================================================
// POST /todos/{id}/toggle Handler
// =============================================================================

/// Stores the negation of the completion flag the caller sent.
///
/// # Errors
///
/// - 400 if the id is malformed
/// - 401 if there is no valid session
/// - 404 if the caller has no such todo
pub async fn toggle_todo(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(todo_id): Path<String>,
    Json(request): Json<ToggleTodoRequest>,
) -> Result<Json<TodoResponse>, ApiErrorResponse> {
    let todo_id = parse_todo_id(&todo_id)?;

    let updated = state
        .todo_repository
        .update(
            &session.user_id,
            &todo_id,
            TodoPatch::completion(!request.is_complete),
            Timestamp::now(),
        )
        .await?;
    tracing::info!(%todo_id, is_complete = updated.is_complete, "Todo toggled");

    Ok(Json(TodoResponse::from(&updated)))
}

// =============================================================================
// DELETE /todos/{id} Handler
// =============================================================================

/// Deletes a todo.
///
/// # Errors
///
/// - 400 if the id is malformed
/// - 401 if there is no valid session
/// - 404 if the caller has no such todo
pub async fn delete_todo(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(todo_id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiErrorResponse> {
    let todo_id = parse_todo_id(&todo_id)?;

    let deleted = state
        .todo_repository
        .delete(&session.user_id, &todo_id)
        .await?;
    if !deleted {
        return Err(ApiErrorResponse::todo_not_found());
    }
    tracing::info!(%todo_id, "Todo deleted");

    Ok(Json(SuccessResponse::OK))
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_todo_id(id: &str) -> Result<TodoId, ApiErrorResponse> {
    Uuid::parse_str(id)
        .map(TodoId::from_uuid)
        .map_err(|_| ApiErrorResponse::bad_request("Invalid todo ID format"))
}

fn build_patch(request: UpdateTodoRequest) -> Result<TodoPatch, ValidationError> {
    let title = request.title.as_deref().map(validate_title).transpose()?;
    let patch = TodoPatch {
        title,
        is_complete: request.is_complete,
    };
    if patch.is_empty() {
        return Err(ValidationError::single(
            "body",
            "Provide a title or a completion flag to update",
        ));
    }
    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_parse_todo_id_rejects_garbage() {
        let error = parse_todo_id("not-a-uuid").unwrap_err();
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
    }

    #[rstest]
    fn test_build_patch_trims_title() {
        let patch = build_patch(UpdateTodoRequest {
            title: Some("  Renamed ".to_string()),
            is_complete: None,
        })
        .unwrap();
        assert_eq!(patch.title.as_deref(), Some("Renamed"));
    }

    #[rstest]
    #[case(UpdateTodoRequest::default())]
    #[case(UpdateTodoRequest { title: Some("   ".to_string()), is_complete: Some(true) })]
    fn test_build_patch_rejects(#[case] request: UpdateTodoRequest) {
        assert!(build_patch(request).is_err());
    }
}
