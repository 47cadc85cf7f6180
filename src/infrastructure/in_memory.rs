//! In-memory implementations of the collaborator contracts.
//!
//! These stand in for the hosted record store and identity service when
//! running locally and in tests.
//!
//! # Features
//!
//! - Thread-safe with `Arc<RwLock<...>>`
//! - Owner scoping enforced on every todo operation
//! - Sessions with sliding expiry, one-time callback codes, and sign-in
//!   throttling per email

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use rand::Rng;
use rand::distr::Alphanumeric;
use tokio::sync::RwLock;

use super::mailer::{MailKind, Mailer, OutgoingMail};
use super::repository::{
    CodeExchange, CodePurpose, IdentityError, IdentityFuture, IdentityProvider, RepositoryError,
    StoreFuture, TodoRepository,
};
use crate::domain::{
    Account, Email, Session, SessionToken, Timestamp, Todo, TodoId, TodoPatch, UserId,
};

// =============================================================================
// In-Memory Todo Repository
// =============================================================================

/// In-memory implementation of `TodoRepository`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTodoRepository {
    todos: Arc<RwLock<HashMap<TodoId, Todo>>>,
}

impl InMemoryTodoRepository {
    /// Creates a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TodoRepository for InMemoryTodoRepository {
    fn list_for_owner(&self, owner: &UserId) -> StoreFuture<Vec<Todo>> {
        let todos = Arc::clone(&self.todos);
        let owner = *owner;
        Box::pin(async move {
            let guard = todos.read().await;
            let mut owned: Vec<Todo> = guard
                .values()
                .filter(|todo| todo.is_owned_by(&owner))
                .cloned()
                .collect();
            drop(guard);

            // Newest first; ids are time-ordered so they break ties.
            owned.sort_by(|left, right| {
                right
                    .created_at
                    .cmp(&left.created_at)
                    .then_with(|| right.id.cmp(&left.id))
            });
            Ok(owned)
        })
    }

    fn find(&self, owner: &UserId, id: &TodoId) -> StoreFuture<Option<Todo>> {
        let todos = Arc::clone(&self.todos);
        let owner = *owner;
        let id = *id;
        Box::pin(async move {
            let guard = todos.read().await;
            Ok(guard.get(&id).filter(|todo| todo.is_owned_by(&owner)).cloned())
        })
    }

    fn insert(&self, todo: &Todo) -> StoreFuture<()> {
        let todos = Arc::clone(&self.todos);
        let todo = todo.clone();
        Box::pin(async move {
            let mut guard = todos.write().await;
            if guard.contains_key(&todo.id) {
                return Err(RepositoryError::Duplicate(todo.id.to_string()));
            }
            guard.insert(todo.id, todo);
            Ok(())
        })
    }

    fn update(
        &self,
        owner: &UserId,
        id: &TodoId,
        patch: TodoPatch,
        now: Timestamp,
    ) -> StoreFuture<Todo> {
        let todos = Arc::clone(&self.todos);
        let owner = *owner;
        let id = *id;
        Box::pin(async move {
            let mut guard = todos.write().await;
            let Some(existing) = guard.get(&id).filter(|todo| todo.is_owned_by(&owner)) else {
                return Err(RepositoryError::NotFound(id.to_string()));
            };
            let updated = patch.apply(existing.clone(), now);
            guard.insert(id, updated.clone());
            Ok(updated)
        })
    }

    fn delete(&self, owner: &UserId, id: &TodoId) -> StoreFuture<bool> {
        let todos = Arc::clone(&self.todos);
        let owner = *owner;
        let id = *id;
        Box::pin(async move {
            let mut guard = todos.write().await;
            let owned = guard.get(&id).is_some_and(|todo| todo.is_owned_by(&owner));
            if owned {
                guard.remove(&id);
            }
            Ok(owned)
        })
    }
}

// =============================================================================
// In-Memory Identity Provider
// =============================================================================

/// Tunables for [`InMemoryIdentityProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySettings {
    /// Lifetime of a freshly issued or refreshed session.
    pub session_ttl: Duration,
    /// A session looked up with less than this left is extended.
    pub refresh_window: Duration,
    /// Lifetime of verification and recovery codes.
    pub code_ttl: Duration,
    /// Failed sign-ins tolerated per email inside `failure_window`.
    pub max_failed_signins: u32,
    /// Window over which failed sign-ins are counted.
    pub failure_window: Duration,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            session_ttl: Duration::hours(1),
            refresh_window: Duration::minutes(30),
            code_ttl: Duration::hours(24),
            max_failed_signins: 5,
            failure_window: Duration::minutes(15),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingCode {
    user_id: UserId,
    purpose: CodePurpose,
    expires_at: Timestamp,
}

#[derive(Debug, Clone, Copy)]
struct FailedSignins {
    count: u32,
    first_at: Timestamp,
}

#[derive(Debug, Default)]
struct IdentityState {
    accounts: HashMap<Email, Account>,
    sessions: HashMap<SessionToken, Session>,
    codes: HashMap<String, PendingCode>,
    failures: HashMap<Email, FailedSignins>,
}

impl IdentityState {
    fn account_by_id(&self, user_id: &UserId) -> Option<&Account> {
        self.accounts
            .values()
            .find(|account| account.user_id == *user_id)
    }

    fn issue_session(&mut self, account: &Account, ttl: Duration) -> Session {
        let issued_at = Timestamp::now();
        let session = Session {
            token: SessionToken::new(random_token(48)),
            user_id: account.user_id,
            email: account.email.clone(),
            issued_at,
            expires_at: Timestamp::from_datetime(*issued_at.as_datetime() + ttl),
        };
        self.sessions.insert(session.token.clone(), session.clone());
        session
    }

    fn issue_code(&mut self, user_id: UserId, purpose: CodePurpose, ttl: Duration) -> String {
        let code = random_token(32);
        let expires_at = Timestamp::from_datetime(*Timestamp::now().as_datetime() + ttl);
        self.codes.insert(
            code.clone(),
            PendingCode {
                user_id,
                purpose,
                expires_at,
            },
        );
        code
    }
}

/// In-memory identity provider.
///
/// Passwords are stored as a BLAKE3 keyed digest with a random per-account
/// salt. Links are delivered through the injected [`Mailer`].
#[derive(Clone)]
pub struct InMemoryIdentityProvider {
    state: Arc<RwLock<IdentityState>>,
    mailer: Arc<dyn Mailer>,
    settings: IdentitySettings,
}

impl InMemoryIdentityProvider {
    /// Creates a provider with the given mailer and settings.
    #[must_use]
    pub fn new(mailer: Arc<dyn Mailer>, settings: IdentitySettings) -> Self {
        Self {
            state: Arc::new(RwLock::new(IdentityState::default())),
            mailer,
            settings,
        }
    }

    /// Marks an account's email as verified without going through a link.
    ///
    /// Returns `false` if no such account exists.
    pub async fn confirm_email(&self, email: &Email) -> bool {
        let mut guard = self.state.write().await;
        guard
            .accounts
            .get_mut(email)
            .map(|account| account.email_verified = true)
            .is_some()
    }
}

impl std::fmt::Debug for InMemoryIdentityProvider {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("InMemoryIdentityProvider")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn random_token(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

fn digest_password(salt: &[u8; 32], password: &str) -> blake3::Hash {
    blake3::keyed_hash(salt, password.as_bytes())
}

fn append_code(callback_url: &str, code: &str) -> String {
    let separator = if callback_url.contains('?') { '&' } else { '?' };
    format!("{callback_url}{separator}code={code}")
}

impl IdentityProvider for InMemoryIdentityProvider {
    fn sign_up(
        &self,
        email: Email,
        password: String,
        callback_url: String,
    ) -> IdentityFuture<UserId> {
        let state = Arc::clone(&self.state);
        let mailer = Arc::clone(&self.mailer);
        let code_ttl = self.settings.code_ttl;
        Box::pin(async move {
            let (user_id, code) = {
                let mut guard = state.write().await;
                if guard.accounts.contains_key(&email) {
                    return Err(IdentityError::AlreadyRegistered);
                }
                let salt: [u8; 32] = rand::rng().random();
                let account = Account {
                    user_id: UserId::generate(),
                    email: email.clone(),
                    password_digest: *digest_password(&salt, &password).as_bytes(),
                    salt,
                    email_verified: false,
                    created_at: Timestamp::now(),
                };
                let user_id = account.user_id;
                guard.accounts.insert(email.clone(), account);
                let code = guard.issue_code(user_id, CodePurpose::Verification, code_ttl);
                (user_id, code)
            };

            tracing::info!(%user_id, "Account registered");
            mailer
                .send(OutgoingMail {
                    recipient: email,
                    kind: MailKind::Verification,
                    link: append_code(&callback_url, &code),
                })
                .await
                .map_err(|error| IdentityError::Delivery(error.to_string()))?;
            Ok(user_id)
        })
    }

    fn sign_in(&self, email: Email, password: String) -> IdentityFuture<Session> {
        let state = Arc::clone(&self.state);
        let settings = self.settings.clone();
        Box::pin(async move {
            let mut guard = state.write().await;
            let now = Timestamp::now();

            if let Some(failures) = guard.failures.get(&email).copied() {
                let window_end =
                    Timestamp::from_datetime(*failures.first_at.as_datetime() + settings.failure_window);
                if now >= window_end {
                    guard.failures.remove(&email);
                } else if failures.count >= settings.max_failed_signins {
                    tracing::warn!(%email, attempts = failures.count, "Sign-in throttled");
                    return Err(IdentityError::RateLimited {
                        email: email.to_string(),
                    });
                }
            }

            let account = guard.accounts.get(&email).cloned().filter(|account| {
                blake3::Hash::from(account.password_digest)
                    == digest_password(&account.salt, &password)
            });
            let Some(account) = account else {
                let entry = guard.failures.entry(email).or_insert(FailedSignins {
                    count: 0,
                    first_at: now,
                });
                entry.count += 1;
                return Err(IdentityError::InvalidCredentials);
            };

            if !account.email_verified {
                return Err(IdentityError::EmailNotConfirmed);
            }

            guard.failures.remove(&email);
            let session = guard.issue_session(&account, settings.session_ttl);
            tracing::info!(user_id = %session.user_id, "Session issued");
            Ok(session)
        })
    }

    fn sign_out(&self, token: &SessionToken) -> IdentityFuture<()> {
        let state = Arc::clone(&self.state);
        let token = token.clone();
        Box::pin(async move {
            if let Some(session) = state.write().await.sessions.remove(&token) {
                tracing::info!(user_id = %session.user_id, "Session revoked");
            }
            Ok(())
        })
    }

    fn current_session(&self, token: &SessionToken) -> IdentityFuture<Session> {
        let state = Arc::clone(&self.state);
        let token = token.clone();
        let settings = self.settings.clone();
        Box::pin(async move {
            let mut guard = state.write().await;
            let now = Timestamp::now();
            let Some(session) = guard.sessions.get_mut(&token) else {
                return Err(IdentityError::SessionMissing);
            };

            if session.is_expired_at(now) {
                guard.sessions.remove(&token);
                return Err(IdentityError::SessionExpired);
            }

            let refresh_at =
                Timestamp::from_datetime(*session.expires_at.as_datetime() - settings.refresh_window);
            if now >= refresh_at {
                session.expires_at =
                    Timestamp::from_datetime(*now.as_datetime() + settings.session_ttl);
                tracing::debug!(user_id = %session.user_id, "Session refreshed");
            }
            Ok(session.clone())
        })
    }

    fn send_password_reset(&self, email: Email, callback_url: String) -> IdentityFuture<()> {
        let state = Arc::clone(&self.state);
        let mailer = Arc::clone(&self.mailer);
        let code_ttl = self.settings.code_ttl;
        Box::pin(async move {
            let code = {
                let mut guard = state.write().await;
                let Some(user_id) = guard.accounts.get(&email).map(|account| account.user_id)
                else {
                    tracing::debug!("Password reset requested for unknown email");
                    return Ok(());
                };
                guard.issue_code(user_id, CodePurpose::Recovery, code_ttl)
            };

            mailer
                .send(OutgoingMail {
                    recipient: email,
                    kind: MailKind::PasswordReset,
                    link: append_code(&callback_url, &code),
                })
                .await
                .map_err(|error| IdentityError::Delivery(error.to_string()))
        })
    }

    fn update_password(&self, token: &SessionToken, password: String) -> IdentityFuture<()> {
        let state = Arc::clone(&self.state);
        let token = token.clone();
        Box::pin(async move {
            let mut guard = state.write().await;
            let now = Timestamp::now();
            let email = match guard.sessions.get(&token) {
                None => return Err(IdentityError::SessionMissing),
                Some(session) if session.is_expired_at(now) => {
                    return Err(IdentityError::SessionExpired);
                }
                Some(session) => session.email.clone(),
            };
            let Some(account) = guard.accounts.get_mut(&email) else {
                return Err(IdentityError::SessionMissing);
            };
            let salt: [u8; 32] = rand::rng().random();
            account.salt = salt;
            account.password_digest = *digest_password(&salt, &password).as_bytes();
            tracing::info!(user_id = %account.user_id, "Password updated");
            Ok(())
        })
    }

    fn exchange_code(&self, code: &str) -> IdentityFuture<CodeExchange> {
        let state = Arc::clone(&self.state);
        let code = code.to_string();
        let session_ttl = self.settings.session_ttl;
        Box::pin(async move {
            let mut guard = state.write().await;
            let pending = guard
                .codes
                .remove(&code)
                .filter(|pending| Timestamp::now() < pending.expires_at)
                .ok_or(IdentityError::InvalidCode)?;

            let Some(mut account) = guard.account_by_id(&pending.user_id).cloned() else {
                return Err(IdentityError::InvalidCode);
            };
            if pending.purpose == CodePurpose::Verification {
                account.email_verified = true;
                guard.accounts.insert(account.email.clone(), account.clone());
            }
            let session = guard.issue_session(&account, session_ttl);
            Ok(CodeExchange {
                session,
                purpose: pending.purpose,
            })
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
