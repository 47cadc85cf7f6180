//! Common test helpers for integration tests.
//!
//! Builds the full router over in-memory collaborators and drives it with
//! `tower::ServiceExt::oneshot`.
//!
//! # Note
//!
//! The `#![allow(dead_code)]` attribute is necessary because Rust compiles each
//! integration test file as a separate crate, and not every file uses every
//! helper.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use todo_service::api::{AppConfig, AppState, build_router};
use todo_service::domain::Email;
use todo_service::infrastructure::{
    FailInjectionConfig, FlakyTodoRepository, IdentitySettings, InMemoryIdentityProvider,
    InMemoryTodoRepository, MailKind, OutboxMailer, TodoRepository,
};

pub const PASSWORD: &str = "Passw0rd!";

// =============================================================================
// Test Application
// =============================================================================

/// Router plus handles on its collaborators.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub mailer: OutboxMailer,
    pub identity: Arc<InMemoryIdentityProvider>,
    pub store: FlakyTodoRepository,
}

/// A parsed response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
    }

    pub fn set_cookie(&self) -> Option<&str> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
    }

    /// The error code of an error body.
    pub fn error_code(&self) -> &str {
        self.body["code"].as_str().unwrap_or_default()
    }

    pub fn error_message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(IdentitySettings::default())
    }

    pub fn with_settings(settings: IdentitySettings) -> Self {
        let mailer = OutboxMailer::new();
        let identity = Arc::new(InMemoryIdentityProvider::new(
            Arc::new(mailer.clone()),
            settings,
        ));
        let store = FlakyTodoRepository::new(
            Arc::new(InMemoryTodoRepository::new()),
            FailInjectionConfig::default(),
        )
        .expect("default fail injection config is valid");
        let repository: Arc<dyn TodoRepository> = Arc::new(store.clone());
        let state = AppState::new(repository, identity.clone(), AppConfig::default());

        Self {
            router: build_router(state.clone()),
            state,
            mailer,
            identity,
            store,
        }
    }

    /// Sends a JSON API request.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::ACCEPT, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request builds");

        self.dispatch(request).await
    }

    /// Sends a browser-style navigation, optionally carrying a session cookie.
    pub async fn navigate(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.dispatch(builder.body(Body::empty()).expect("request builds"))
            .await
    }

    pub async fn dispatch(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body collects")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    // =========================================================================
    // Account Helpers
    // =========================================================================

    pub async fn sign_up(&self, email: &str) -> TestResponse {
        self.send(
            Method::POST,
            "/auth/signup",
            None,
            Some(json!({ "email": email, "password": PASSWORD, "confirm_password": PASSWORD })),
        )
        .await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> TestResponse {
        self.send(
            Method::POST,
            "/auth/signin",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    /// Path and query of the last mailed link of `kind` for `email`.
    pub async fn mailed_path(&self, email: &str, kind: MailKind) -> String {
        let mail = self
            .mailer
            .sent()
            .await
            .into_iter()
            .rev()
            .find(|mail| mail.recipient == Email::new(email) && mail.kind == kind)
            .expect("mail was sent");
        mail.link
            .strip_prefix(&self.state.config.site_url)
            .expect("link points at the site")
            .to_string()
    }

    /// Signs up, follows the verification link and signs in.
    ///
    /// Returns the session token.
    pub async fn registered_user(&self, email: &str) -> String {
        assert_eq!(self.sign_up(email).await.status, StatusCode::CREATED);
        let callback = self.mailed_path(email, MailKind::Verification).await;
        assert_eq!(
            self.navigate(&callback, None).await.status,
            StatusCode::SEE_OTHER
        );

        let response = self.sign_in(email, PASSWORD).await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
        response.body["session"]
            .as_str()
            .expect("session token in body")
            .to_string()
    }

    // =========================================================================
    // Todo Helpers
    // =========================================================================

    pub async fn create_todo(&self, token: &str, title: &str) -> Value {
        let response = self
            .send(
                Method::POST,
                "/todos",
                Some(token),
                Some(json!({ "title": title })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body
    }

    pub async fn list_todos(&self, token: &str) -> Vec<Value> {
        let response = self.send(Method::GET, "/todos", Some(token), None).await;
        assert_eq!(response.status, StatusCode::OK);
        response.body.as_array().cloned().unwrap_or_default()
    }
}
