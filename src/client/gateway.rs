//! Remote todo access for the client.
//!
//! [`TodoGateway`] is what the board talks to. [`HttpGateway`] calls the
//! service over HTTP; [`LocalGateway`] goes straight to a repository and is
//! used in tests and when running in-process.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::api::ApiError;
use crate::api::dto::{
    CreateTodoRequest, SignInRequest, SignInResponse, TodoResponse, ToggleTodoRequest,
    UpdateTodoRequest,
};
use crate::classify::{ClassifiedError, ErrorCategory, Failure};
use crate::domain::{SessionToken, Timestamp, Todo, TodoId, TodoPatch, UserId};
use crate::infrastructure::{RepositoryError, TodoRepository};

/// Future returned by gateway calls.
pub type GatewayFuture<T> = BoxFuture<'static, Result<T, Failure>>;

/// Request timeout for [`HttpGateway`].
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Todo Gateway
// =============================================================================

/// Todo operations as seen from the client.
pub trait TodoGateway: Send + Sync {
    /// Lists the signed-in user's todos, newest first.
    fn list(&self) -> GatewayFuture<Vec<Todo>>;

    /// Creates a todo with an already validated title.
    fn create(&self, title: String) -> GatewayFuture<Todo>;

    /// Replaces a todo's title.
    fn rename(&self, id: TodoId, title: String) -> GatewayFuture<Todo>;

    /// Flips completion. `current` is the flag the caller sees now.
    fn toggle(&self, id: TodoId, current: bool) -> GatewayFuture<Todo>;

    /// Deletes a todo.
    fn delete(&self, id: TodoId) -> GatewayFuture<()>;
}

// =============================================================================
// Gateway Error
// =============================================================================

/// Failures talking to the service that carry no category of their own.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl From<GatewayError> for ClassifiedError {
    fn from(error: GatewayError) -> Self {
        let category = match &error {
            GatewayError::Transport(_) => ErrorCategory::ExternalDependency,
            GatewayError::Status { .. } | GatewayError::Decode(_) => ErrorCategory::Unclassified,
        };
        Self::new(category, error.to_string()).with_cause(error)
    }
}

impl From<GatewayError> for Failure {
    fn from(error: GatewayError) -> Self {
        Self::Classified(error.into())
    }
}

// =============================================================================
// HTTP Gateway
// =============================================================================

/// Gateway over the service's JSON API.
///
/// Clones share the session token.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    token: Arc<RwLock<Option<SessionToken>>>,
}

impl HttpGateway {
    /// Creates a gateway for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Uses an existing session token.
    #[must_use]
    pub fn with_token(self, token: SessionToken) -> Self {
        *self.token.write() = Some(token);
        self
    }

    /// The session token in use, if signed in.
    #[must_use]
    pub fn token(&self) -> Option<SessionToken> {
        self.token.read().clone()
    }

    /// Signs in and keeps the session token for later calls.
    ///
    /// # Errors
    ///
    /// Returns the classified failure reported by the service.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SignInResponse, Failure> {
        let request = SignInRequest {
            email: email.to_string(),
            password: password.to_string(),
            remember_me: false,
            redirect_to: None,
        };
        let response: SignInResponse =
            send_json(self.request(reqwest::Method::POST, "/auth/signin").json(&request)).await?;
        *self.token.write() = Some(response.session.clone());
        Ok(response)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .header(reqwest::header::ACCEPT, "application/json");
        match self.token.read().as_ref() {
            Some(token) => builder.bearer_auth(token.as_str()),
            None => builder,
        }
    }
}

async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, Failure> {
    let response = builder.send().await.map_err(GatewayError::from)?;
    let response = check_status(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|error| GatewayError::Decode(error.to_string()).into())
}

/// Turns a non-2xx response into the failure it describes.
async fn check_status(response: Response) -> Result<Response, Failure> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.map_err(GatewayError::from)?;
    let failure = match serde_json::from_str::<ApiError>(&body) {
        Ok(error) => {
            let category =
                ErrorCategory::from_code(&error.code).unwrap_or(ErrorCategory::Unclassified);
            tracing::debug!(%status, code = %error.code, "Service rejected request");
            ClassifiedError::new(category, error.message).into()
        }
        Err(_) => GatewayError::Status { status, body }.into(),
    };
    Err(failure)
}

impl TodoGateway for HttpGateway {
    fn list(&self) -> GatewayFuture<Vec<Todo>> {
        let request = self.request(reqwest::Method::GET, "/todos");
        async move {
            let todos: Vec<TodoResponse> = send_json(request).await?;
            Ok(todos.into_iter().map(Todo::from).collect())
        }
        .boxed()
    }

    fn create(&self, title: String) -> GatewayFuture<Todo> {
        let request = self
            .request(reqwest::Method::POST, "/todos")
            .json(&CreateTodoRequest { title });
        async move { send_json::<TodoResponse>(request).await.map(Todo::from) }.boxed()
    }

    fn rename(&self, id: TodoId, title: String) -> GatewayFuture<Todo> {
        let body = UpdateTodoRequest {
            title: Some(title),
            is_complete: None,
        };
        let request = self
            .request(reqwest::Method::PATCH, &format!("/todos/{id}"))
            .json(&body);
        async move { send_json::<TodoResponse>(request).await.map(Todo::from) }.boxed()
    }

    fn toggle(&self, id: TodoId, current: bool) -> GatewayFuture<Todo> {
        let request = self
            .request(reqwest::Method::POST, &format!("/todos/{id}/toggle"))
            .json(&ToggleTodoRequest {
                is_complete: current,
            });
        async move { send_json::<TodoResponse>(request).await.map(Todo::from) }.boxed()
    }

    fn delete(&self, id: TodoId) -> GatewayFuture<()> {
        let request = self.request(reqwest::Method::DELETE, &format!("/todos/{id}"));
        async move {
            let response = request.send().await.map_err(GatewayError::from)?;
            check_status(response).await.map(drop)
        }
        .boxed()
    }
}

// =============================================================================
// Local Gateway
// =============================================================================

/// Gateway that calls a repository directly on behalf of one owner.
#[derive(Clone)]
pub struct LocalGateway {
    repository: Arc<dyn TodoRepository>,
    owner: UserId,
}

impl std::fmt::Debug for LocalGateway {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("LocalGateway")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

impl LocalGateway {
    #[must_use]
    pub fn new(repository: Arc<dyn TodoRepository>, owner: UserId) -> Self {
        Self { repository, owner }
    }

    fn update(&self, id: TodoId, patch: TodoPatch) -> GatewayFuture<Todo> {
        self.repository
            .update(&self.owner, &id, patch, Timestamp::now())
            .map(|result| result.map_err(store_failure))
            .boxed()
    }
}

fn store_failure(error: RepositoryError) -> Failure {
    Failure::Classified(error.into())
}

impl TodoGateway for LocalGateway {
    fn list(&self) -> GatewayFuture<Vec<Todo>> {
        self.repository
            .list_for_owner(&self.owner)
            .map(|result| result.map_err(store_failure))
            .boxed()
    }

    fn create(&self, title: String) -> GatewayFuture<Todo> {
        let todo = Todo::new(TodoId::generate(), self.owner, title, Timestamp::now());
        let insert = self.repository.insert(&todo);
        async move {
            insert.await.map_err(store_failure)?;
            Ok(todo)
        }
        .boxed()
    }

    fn rename(&self, id: TodoId, title: String) -> GatewayFuture<Todo> {
        self.update(id, TodoPatch::title(title))
    }

    fn toggle(&self, id: TodoId, current: bool) -> GatewayFuture<Todo> {
        self.update(id, TodoPatch::completion(!current))
    }

    fn delete(&self, id: TodoId) -> GatewayFuture<()> {
        let delete = self.repository.delete(&self.owner, &id);
        async move {
            if delete.await.map_err(store_failure)? {
                Ok(())
            } else {
                Err(store_failure(RepositoryError::NotFound(id.to_string())))
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::categorize;
    use crate::infrastructure::InMemoryTodoRepository;
    use rstest::rstest;

    fn local() -> LocalGateway {
        LocalGateway::new(Arc::new(InMemoryTodoRepository::new()), UserId::generate())
    }

    #[rstest]
    #[tokio::test]
    async fn test_local_gateway_create_toggle_rename() {
        let gateway = local();
        let created = gateway.create("Plan trip".to_string()).await.unwrap();

        let toggled = gateway.toggle(created.id, false).await.unwrap();
        assert!(toggled.is_complete);

        let renamed = gateway.rename(created.id, "Plan holiday".to_string()).await.unwrap();
        assert_eq!(renamed.title, "Plan holiday");
        assert!(renamed.is_complete);

        assert_eq!(gateway.list().await.unwrap(), vec![renamed]);
    }

    #[rstest]
    #[tokio::test]
    async fn test_local_gateway_delete_missing_is_remote_store() {
        let gateway = local();
        let failure = gateway.delete(TodoId::generate()).await.unwrap_err();
        assert_eq!(categorize(&failure).category, ErrorCategory::RemoteStore);
    }

    #[rstest]
    fn test_gateway_error_categories() {
        let decode = ClassifiedError::from(GatewayError::Decode("bad json".to_string()));
        assert_eq!(decode.category(), ErrorCategory::Unclassified);

        let status = ClassifiedError::from(GatewayError::Status {
            status: StatusCode::BAD_GATEWAY,
            body: "<html>".to_string(),
        });
        assert_eq!(status.category(), ErrorCategory::Unclassified);
    }

    #[rstest]
    fn test_http_gateway_trims_base_url() {
        let gateway = HttpGateway::new("http://localhost:3000/").unwrap();
        assert_eq!(gateway.base_url, "http://localhost:3000");
        assert!(gateway.token().is_none());

        let gateway = gateway.with_token(SessionToken::new("abc"));
        assert_eq!(gateway.token().map(|token| token.as_str().to_string()).as_deref(), Some("abc"));
    }
}
