//! Fail injection for the record store.
//!
//! [`FlakyTodoRepository`] wraps any [`TodoRepository`] and may delay a
//! call or fail it before it reaches the wrapped store. This lets the optimistic client be exercised against a slow or
//! unreliable backend locally.
//!
//! Two triggers exist:
//!
//! - **Scripted**: [`FlakyTodoRepository::fail_next`] makes the next `n`
//!   calls fail regardless of the rate.
//! - **Random**: each call fails with probability `failure_rate`, drawn from
//!   a seedable RNG so runs can be reproduced.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use super::repository::{RepositoryError, StoreFuture, TodoRepository};
use crate::domain::{Timestamp, Todo, TodoId, TodoPatch, UserId};

// =============================================================================
// Fail Injection Config
// =============================================================================

/// Configuration for fail injection.
#[derive(Debug, Clone, PartialEq)]
pub struct FailInjectionConfig {
    /// Probability of injecting a failure (0.0 - 1.0).
    pub failure_rate: f64,
    /// Delay added to every call, in milliseconds.
    pub delay_ms: u64,
    /// Seed for the failure RNG. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for FailInjectionConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.0,
            delay_ms: 0,
            seed: None,
        }
    }
}

impl FailInjectionConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if `failure_rate` is not in range `0.0..=1.0`.
    pub fn validate(&self) -> Result<(), FailInjectionError> {
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(FailInjectionError::InvalidFailureRate(self.failure_rate));
        }
        Ok(())
    }

    /// Returns whether fail injection does anything.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.failure_rate > 0.0 || self.delay_ms > 0
    }
}

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum FailInjectionError {
    /// Failure rate out of range.
    #[error("Invalid failure rate: must be 0.0-1.0, got {0}")]
    InvalidFailureRate(f64),
}

// =============================================================================
// Flaky Todo Repository
// =============================================================================

/// A [`TodoRepository`] that injects latency and failures.
#[derive(Clone)]
pub struct FlakyTodoRepository {
    inner: Arc<dyn TodoRepository>,
    config: FailInjectionConfig,
    rng: Arc<Mutex<StdRng>>,
    scripted_failures: Arc<AtomicU32>,
}

impl FlakyTodoRepository {
    /// Wraps `inner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        inner: Arc<dyn TodoRepository>,
        config: FailInjectionConfig,
    ) -> Result<Self, FailInjectionError> {
        config.validate()?;
        let rng = config
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        Ok(Self {
            inner,
            config,
            rng: Arc::new(Mutex::new(rng)),
            scripted_failures: Arc::new(AtomicU32::new(0)),
        })
    }

    /// Makes the next `count` calls fail.
    pub fn fail_next(&self, count: u32) {
        self.scripted_failures.fetch_add(count, Ordering::SeqCst);
    }

    fn take_scripted_failure(&self) -> bool {
        self.scripted_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }

    fn should_fail(&self) -> bool {
        if self.take_scripted_failure() {
            return true;
        }
        self.config.failure_rate > 0.0 && self.rng.lock().random::<f64>() < self.config.failure_rate
    }

    /// Runs `operation` unless a failure is injected.
    ///
    /// An injected failure drops `call` unpolled, so the wrapped store never
    /// sees the request and a failed write leaves nothing behind. The delay
    /// applies to both outcomes.
    fn inject<T: Send + 'static>(
        &self,
        operation: &'static str,
        call: StoreFuture<T>,
    ) -> StoreFuture<T> {
        let fail = self.should_fail();
        let delay = Duration::from_millis(self.config.delay_ms);
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if fail {
                drop(call);
                tracing::warn!(operation, "Injected store failure");
                return Err(RepositoryError::DatabaseError(format!(
                    "Injected failure during {operation}"
                )));
            }
            call.await
        })
    }
}

impl std::fmt::Debug for FlakyTodoRepository {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("FlakyTodoRepository")
            .field("config", &self.config)
            .field(
                "scripted_failures",
                &self.scripted_failures.load(Ordering::SeqCst),
            )
            .finish_non_exhaustive()
    }
}

impl TodoRepository for FlakyTodoRepository {
    fn list_for_owner(&self, owner: &UserId) -> StoreFuture<Vec<Todo>> {
        self.inject("list", self.inner.list_for_owner(owner))
    }

    fn find(&self, owner: &UserId, id: &TodoId) -> StoreFuture<Option<Todo>> {
        self.inject("find", self.inner.find(owner, id))
    }

    fn insert(&self, todo: &Todo) -> StoreFuture<()> {
        self.inject("insert", self.inner.insert(todo))
    }

    fn update(
        &self,
        owner: &UserId,
        id: &TodoId,
        patch: TodoPatch,
        now: Timestamp,
    ) -> StoreFuture<Todo> {
        self.inject("update", self.inner.update(owner, id, patch, now))
    }

    fn delete(&self, owner: &UserId, id: &TodoId) -> StoreFuture<bool> {
        self.inject("delete", self.inner.delete(owner, id))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryTodoRepository;
    use rstest::rstest;

    fn flaky(config: FailInjectionConfig) -> FlakyTodoRepository {
        FlakyTodoRepository::new(Arc::new(InMemoryTodoRepository::new()), config).unwrap()
    }

    #[rstest]
    #[case(-0.1)]
    #[case(1.5)]
    fn test_rejects_out_of_range_rate(#[case] failure_rate: f64) {
        let config = FailInjectionConfig {
            failure_rate,
            ..FailInjectionConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(FailInjectionError::InvalidFailureRate(failure_rate))
        );
    }

    #[rstest]
    fn test_default_is_disabled() {
        assert!(!FailInjectionConfig::default().is_enabled());
    }

    #[rstest]
    #[tokio::test]
    async fn test_scripted_failures_are_consumed() {
        let repository = flaky(FailInjectionConfig::default());
        let owner = UserId::generate();
        repository.fail_next(2);

        assert!(repository.list_for_owner(&owner).await.is_err());
        assert!(repository.list_for_owner(&owner).await.is_err());
        assert!(repository.list_for_owner(&owner).await.is_ok());
    }

    #[rstest]
    #[tokio::test]
    async fn test_failed_write_never_reaches_store() {
        let inner = Arc::new(InMemoryTodoRepository::new());
        let repository =
            FlakyTodoRepository::new(inner.clone(), FailInjectionConfig::default()).unwrap();
        let owner = UserId::generate();
        let todo = Todo::new(TodoId::generate(), owner, "kept", Timestamp::now());
        repository.insert(&todo).await.unwrap();

        repository.fail_next(3);
        let fresh = Todo::new(TodoId::generate(), owner, "lost", Timestamp::now());
        assert!(matches!(
            repository.insert(&fresh).await,
            Err(RepositoryError::DatabaseError(_))
        ));
        assert!(
            repository
                .update(&owner, &todo.id, TodoPatch::title("renamed"), Timestamp::now())
                .await
                .is_err()
        );
        assert!(repository.delete(&owner, &todo.id).await.is_err());

        let stored = inner.list_for_owner(&owner).await.unwrap();
        assert_eq!(stored, vec![todo]);
    }

    #[rstest]
    #[tokio::test]
    async fn test_full_rate_always_fails() {
        let repository = flaky(FailInjectionConfig {
            failure_rate: 1.0,
            seed: Some(7),
            ..FailInjectionConfig::default()
        });
        let owner = UserId::generate();
        for _ in 0..5 {
            assert!(repository.list_for_owner(&owner).await.is_err());
        }
    }
}
