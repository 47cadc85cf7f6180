//! Optimistic mutation lifecycle for a single todo.
//!
//! Each displayed todo has an [`ItemController`]. A mutation goes through
//!
//! ```text
//! Idle -> Speculative -> Confirmed
//!                     -> RolledBack -> (retry) -> Speculative -> ...
//! ```
//!
//! On entry to `Speculative` the new value is shown immediately and the
//! item's control is disabled. The caller's operation is then awaited
//! exactly once. Success keeps the new value and clears any pending retry;
//! failure restores the value captured before the change and stores the
//! mutation so [`ItemController::retry`] can run it again.
//!
//! Controller state sits behind a shared mutex that is never held across an
//! await, so clones observe the disabled control and the speculative value
//! while the operation is suspended.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;

use super::notify::NotificationSink;
use crate::classify::{Classification, Failure, classify};
use crate::domain::{Todo, TodoId};
use crate::validation::{ValidationError, validate_title};

/// Future returned by a mutation operation.
pub type MutationFuture = BoxFuture<'static, Result<(), Failure>>;

/// A re-runnable remote mutation.
pub type MutationOp = Arc<dyn Fn() -> MutationFuture + Send + Sync>;

/// Wraps a closure producing a future as a [`MutationOp`].
pub fn mutation<F, Fut>(operation: F) -> MutationOp
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Failure>> + Send + 'static,
{
    Arc::new(move || operation().boxed())
}

// =============================================================================
// Overlay
// =============================================================================

/// A confirmed value with an optional speculative value on top.
///
/// # Examples
///
/// ```
/// use todo_service::client::optimistic::Overlay;
///
/// let mut overlay = Overlay::new(1);
/// overlay.speculate(2);
/// assert_eq!(*overlay.visible(), 2);
/// overlay.rollback();
/// assert_eq!(*overlay.visible(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay<T> {
    confirmed: T,
    speculative: Option<T>,
}

impl<T> Overlay<T> {
    /// Creates an overlay with no speculation.
    pub const fn new(confirmed: T) -> Self {
        Self {
            confirmed,
            speculative: None,
        }
    }

    /// The value to display.
    pub fn visible(&self) -> &T {
        self.speculative.as_ref().unwrap_or(&self.confirmed)
    }

    /// The last confirmed value.
    pub const fn confirmed(&self) -> &T {
        &self.confirmed
    }

    /// Returns `true` while a speculative value is shown.
    pub const fn is_speculative(&self) -> bool {
        self.speculative.is_some()
    }

    /// Shows `value` until confirmed or rolled back.
    pub fn speculate(&mut self, value: T) {
        self.speculative = Some(value);
    }

    /// Promotes the speculative value, if any.
    pub fn confirm(&mut self) {
        if let Some(value) = self.speculative.take() {
            self.confirmed = value;
        }
    }

    /// Drops the speculative value.
    pub fn rollback(&mut self) {
        self.speculative = None;
    }
}

// =============================================================================
// Item State
// =============================================================================

/// What the list shows for one todo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView {
    pub todo: Todo,
    /// Set while a delete is speculative or confirmed.
    pub hidden: bool,
}

impl ItemView {
    const fn shown(todo: Todo) -> Self {
        Self {
            todo,
            hidden: false,
        }
    }
}

/// Lifecycle phase of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Speculative,
    Confirmed,
    RolledBack,
}

/// Kind of mutation, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ToggleCompletion,
    Rename,
    Delete,
}

/// A failed mutation kept for manual retry.
#[derive(Clone)]
pub struct PendingMutation {
    /// Todo the mutation targets.
    pub todo_id: TodoId,
    pub kind: MutationKind,
    /// Value shown before the change; restored on failure.
    pub previous: ItemView,
    /// Value shown while the operation runs.
    pub target: ItemView,
    /// The remote call.
    pub operation: MutationOp,
    /// Shown on success.
    pub success_message: String,
}

impl fmt::Debug for PendingMutation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PendingMutation")
            .field("todo_id", &self.todo_id)
            .field("kind", &self.kind)
            .field("success_message", &self.success_message)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct ItemState {
    overlay: Overlay<ItemView>,
    phase: Phase,
    busy: bool,
    pending: Option<PendingMutation>,
    field_error: Option<String>,
}

/// Result of asking the controller to mutate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The operation succeeded.
    Confirmed,
    /// The operation failed and the previous value was restored.
    RolledBack(Classification),
    /// The new value equals the current one; nothing was called.
    Unchanged,
    /// Input failed validation; nothing was called.
    Invalid(ValidationError),
    /// The user dismissed the confirmation; nothing was called.
    Cancelled,
    /// Another mutation on this item is in flight; nothing was called.
    Busy,
    /// [`ItemController::retry`] without a pending mutation.
    NothingToRetry,
}

// =============================================================================
// Item Controller
// =============================================================================

/// Runs mutations for one displayed todo.
#[derive(Clone)]
pub struct ItemController {
    id: TodoId,
    state: Arc<Mutex<ItemState>>,
    sink: Arc<dyn NotificationSink>,
}

impl fmt::Debug for ItemController {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ItemController")
            .field("id", &self.id)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl ItemController {
    /// Creates a controller showing `todo`.
    #[must_use]
    pub fn new(todo: Todo, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            id: todo.id,
            state: Arc::new(Mutex::new(ItemState {
                overlay: Overlay::new(ItemView::shown(todo)),
                phase: Phase::Idle,
                busy: false,
                pending: None,
                field_error: None,
            })),
            sink,
        }
    }

    #[must_use]
    pub const fn id(&self) -> TodoId {
        self.id
    }

    /// What the list currently shows.
    #[must_use]
    pub fn view(&self) -> ItemView {
        self.state.lock().overlay.visible().clone()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Returns `true` while the item's control is disabled.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.state.lock().busy
    }

    /// Returns `true` if a failed mutation can be retried.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    /// The stored failed mutation, if any.
    #[must_use]
    pub fn pending(&self) -> Option<PendingMutation> {
        self.state.lock().pending.clone()
    }

    /// Inline message for the title field.
    #[must_use]
    pub fn field_error(&self) -> Option<String> {
        self.state.lock().field_error.clone()
    }

    /// Replaces the confirmed todo with a fresh copy from the store.
    ///
    /// Ignored while a mutation is in flight.
    pub fn sync(&self, todo: Todo) {
        let mut state = self.state.lock();
        if !state.busy {
            state.overlay = Overlay::new(ItemView::shown(todo));
        }
    }

    /// Flips the completion flag.
    pub async fn toggle_completion(&self, operation: MutationOp) -> Outcome {
        let previous = self.view();
        let is_complete = !previous.todo.is_complete;
        let target = ItemView {
            todo: previous.todo.clone().with_completion(is_complete),
            hidden: previous.hidden,
        };
        let success_message = if is_complete {
            "Todo marked as complete"
        } else {
            "Todo marked as incomplete"
        };

        self.run(PendingMutation {
            todo_id: self.id,
            kind: MutationKind::ToggleCompletion,
            previous,
            target,
            operation,
            success_message: success_message.to_string(),
        })
        .await
    }

    /// Changes the title.
    ///
    /// The title is validated first; a blank or overlong title sets the
    /// field error and returns [`Outcome::Invalid`]. A title equal to the
    /// current one returns [`Outcome::Unchanged`].
    pub async fn rename(&self, title: &str, operation: MutationOp) -> Outcome {
        let title = match validate_title(title) {
            Ok(title) => title,
            Err(error) => {
                self.state.lock().field_error = error.messages_for("title").next().map(str::to_string);
                return Outcome::Invalid(error);
            }
        };

        let previous = self.view();
        if previous.todo.title == title {
            self.state.lock().field_error = None;
            return Outcome::Unchanged;
        }
        let target = ItemView {
            todo: previous.todo.clone().with_title(title),
            hidden: previous.hidden,
        };

        self.run(PendingMutation {
            todo_id: self.id,
            kind: MutationKind::Rename,
            previous,
            target,
            operation,
            success_message: "Todo updated successfully".to_string(),
        })
        .await
    }

    /// Deletes the todo.
    ///
    /// `confirmed` is the answer to the confirmation prompt; `false` does
    /// nothing. While the delete runs the item is hidden.
    pub async fn delete(&self, confirmed: bool, operation: MutationOp) -> Outcome {
        if !confirmed {
            return Outcome::Cancelled;
        }

        let previous = self.view();
        let target = ItemView {
            todo: previous.todo.clone(),
            hidden: true,
        };

        self.run(PendingMutation {
            todo_id: self.id,
            kind: MutationKind::Delete,
            previous,
            target,
            operation,
            success_message: "Todo deleted successfully".to_string(),
        })
        .await
    }

    /// Re-runs the stored failed mutation.
    ///
    /// The same captured previous value and the same operation are used, so
    /// retrying a toggle after a failure flips from the original value
    /// again.
    pub async fn retry(&self) -> Outcome {
        let pending = {
            let state = self.state.lock();
            if state.busy {
                return Outcome::Busy;
            }
            match &state.pending {
                Some(pending) => pending.clone(),
                None => return Outcome::NothingToRetry,
            }
        };
        tracing::debug!(todo_id = %self.id, kind = ?pending.kind, "Retrying mutation");
        self.run(pending).await
    }

    async fn run(&self, mutation: PendingMutation) -> Outcome {
        {
            let mut state = self.state.lock();
            if state.busy {
                return Outcome::Busy;
            }
            state.busy = true;
            state.phase = Phase::Speculative;
            state.field_error = None;
            state.overlay.speculate(mutation.target.clone());
        }

        let operation = Arc::clone(&mutation.operation);
        let result = AssertUnwindSafe(async move { operation().await })
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(Failure::Opaque(payload)));

        match result {
            Ok(()) => {
                {
                    let mut state = self.state.lock();
                    state.overlay.confirm();
                    state.pending = None;
                    state.phase = Phase::Confirmed;
                    state.busy = false;
                }
                tracing::info!(todo_id = %self.id, kind = ?mutation.kind, "Mutation confirmed");
                self.sink.success(&mutation.success_message);
                Outcome::Confirmed
            }
            Err(failure) => {
                let classification = classify(&failure);
                {
                    let mut state = self.state.lock();
                    state.overlay = Overlay::new(mutation.previous.clone());
                    state.phase = Phase::RolledBack;
                    state.busy = false;
                    state.pending = Some(mutation);
                }
                tracing::warn!(
                    todo_id = %self.id,
                    category = %classification.category,
                    "Mutation rolled back"
                );
                self.sink.error(&classification.user_message);
                Outcome::RolledBack(classification)
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ClassifiedError, ErrorCategory};
    use crate::client::notify::{Severity, ToastQueue};
    use crate::domain::{Timestamp, UserId};
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    fn todo(title: &str) -> Todo {
        Todo::new(TodoId::generate(), UserId::generate(), title, Timestamp::now())
    }

    fn controller(title: &str) -> (ItemController, ToastQueue) {
        let toasts = ToastQueue::new();
        (ItemController::new(todo(title), Arc::new(toasts.clone())), toasts)
    }

    /// Operation that counts calls and fails the first `failures` of them.
    fn counting_op(failures: usize) -> (MutationOp, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let operation = mutation(move || {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if call < failures {
                    Err(Failure::from(ClassifiedError::new(
                        ErrorCategory::RemoteStore,
                        "update failed",
                    )))
                } else {
                    Ok(())
                }
            }
        });
        (operation, calls)
    }

    #[rstest]
    #[tokio::test]
    async fn test_successful_toggle_confirms() {
        let (item, toasts) = controller("Walk dog");
        let (operation, calls) = counting_op(0);

        assert_eq!(item.toggle_completion(operation).await, Outcome::Confirmed);
        assert!(item.view().todo.is_complete);
        assert_eq!(item.phase(), Phase::Confirmed);
        assert!(!item.can_retry());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(toasts.messages(Severity::Success), vec!["Todo marked as complete"]);
    }

    #[rstest]
    #[tokio::test]
    async fn test_failed_rename_restores_title_and_stores_retry() {
        let (item, toasts) = controller("Old");
        let before = item.view();
        let (operation, _) = counting_op(1);

        let outcome = item.rename("New", operation).await;

        assert!(matches!(outcome, Outcome::RolledBack(ref c) if c.category == ErrorCategory::RemoteStore));
        assert_eq!(item.view(), before);
        assert_eq!(item.pending().map(|pending| pending.kind), Some(MutationKind::Rename));
        assert_eq!(
            toasts.messages(Severity::Error),
            vec!["A database error occurred. Please try again later."]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_retry_reuses_operation_until_success() {
        let (item, _toasts) = controller("Retry me");
        let (operation, calls) = counting_op(2);

        assert!(matches!(item.toggle_completion(operation).await, Outcome::RolledBack(_)));
        assert!(matches!(item.retry().await, Outcome::RolledBack(_)));
        assert!(!item.view().todo.is_complete);
        assert_eq!(item.retry().await, Outcome::Confirmed);

        assert!(item.view().todo.is_complete);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(item.retry().await, Outcome::NothingToRetry);
    }

    #[rstest]
    #[case("Same")]
    #[case("  Same  ")]
    #[tokio::test]
    async fn test_same_title_is_no_op(#[case] title: &str) {
        let (item, toasts) = controller("Same");
        let (operation, calls) = counting_op(0);

        assert_eq!(item.rename(title, operation).await, Outcome::Unchanged);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(item.phase(), Phase::Idle);
        assert!(toasts.visible().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn test_blank_title_sets_field_error() {
        let (item, _toasts) = controller("Keep");
        let (operation, calls) = counting_op(0);

        assert!(matches!(item.rename("   ", operation).await, Outcome::Invalid(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(item.field_error().as_deref(), Some("Todo title cannot be empty"));
        assert_eq!(item.view().todo.title, "Keep");
    }

    #[rstest]
    #[tokio::test]
    async fn test_dismissed_delete_does_nothing() {
        let (item, _toasts) = controller("Stay");
        let (operation, calls) = counting_op(0);

        assert_eq!(item.delete(false, operation).await, Outcome::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!item.view().hidden);
    }

    #[rstest]
    #[tokio::test]
    async fn test_failed_delete_unhides() {
        let (item, _toasts) = controller("Back again");
        let (operation, _) = counting_op(1);

        assert!(matches!(item.delete(true, operation).await, Outcome::RolledBack(_)));
        assert!(!item.view().hidden);
    }

    #[rstest]
    #[tokio::test]
    async fn test_control_disabled_while_suspended() {
        let (item, _toasts) = controller("Slow");
        let (release, released) = oneshot::channel::<()>();
        let released = Arc::new(Mutex::new(Some(released)));
        let operation = mutation(move || {
            let released = released.lock().take();
            async move {
                if let Some(released) = released {
                    let _ = released.await;
                }
                Ok(())
            }
        });

        let running = {
            let item = item.clone();
            let operation = Arc::clone(&operation);
            tokio::spawn(async move { item.toggle_completion(operation).await })
        };
        while !item.is_busy() {
            tokio::task::yield_now().await;
        }

        assert_eq!(item.phase(), Phase::Speculative);
        assert!(item.view().todo.is_complete);
        assert_eq!(item.toggle_completion(operation).await, Outcome::Busy);

        release.send(()).unwrap();
        assert_eq!(running.await.unwrap(), Outcome::Confirmed);
        assert!(!item.is_busy());
    }

    #[rstest]
    #[tokio::test]
    async fn test_panicking_operation_is_unclassified() {
        let (item, toasts) = controller("Boom");
        async fn explode() -> Result<(), Failure> {
            panic!("exploded")
        }
        let operation = mutation(explode);

        let outcome = item.toggle_completion(operation).await;

        assert!(matches!(outcome, Outcome::RolledBack(ref c) if c.category == ErrorCategory::Unclassified));
        assert!(!item.view().todo.is_complete);
        assert_eq!(
            toasts.messages(Severity::Error),
            vec!["An unexpected error occurred. Please try again later."]
        );
    }

    #[rstest]
    fn test_overlay_confirm_promotes() {
        let mut overlay = Overlay::new("a");
        overlay.speculate("b");
        assert!(overlay.is_speculative());
        overlay.confirm();
        assert_eq!(*overlay.confirmed(), "b");
        assert!(!overlay.is_speculative());
    }
}
