//! The todo list as the client sees it.
//!
//! [`TodoBoard`] loads the list through a [`TodoGateway`], keeps one
//! [`ItemController`] per todo and routes user actions to it. Creation is
//! not optimistic: the new todo appears after a refetch.

use std::sync::Arc;

use futures::TryFutureExt;

use super::gateway::TodoGateway;
use super::notify::NotificationSink;
use super::optimistic::{ItemController, ItemView, Outcome, mutation};
use crate::classify::{Classification, Failure, classify};
use crate::domain::{Todo, TodoId};
use crate::validation::{ValidationError, validate_title};

/// Result of submitting the new-todo form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Created(Todo),
    Invalid(ValidationError),
    Failed(Classification),
}

/// Client-side todo list.
pub struct TodoBoard<G: TodoGateway + 'static> {
    gateway: Arc<G>,
    sink: Arc<dyn NotificationSink>,
    items: Vec<ItemController>,
    new_todo_error: Option<ValidationError>,
}

impl<G: TodoGateway + 'static> std::fmt::Debug for TodoBoard<G> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TodoBoard")
            .field("items", &self.items)
            .field("new_todo_error", &self.new_todo_error)
            .finish_non_exhaustive()
    }
}

impl<G: TodoGateway + 'static> TodoBoard<G> {
    /// Creates an empty board. Call [`TodoBoard::load`] to fill it.
    #[must_use]
    pub fn new(gateway: Arc<G>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            gateway,
            sink,
            items: Vec::new(),
            new_todo_error: None,
        }
    }

    /// Fetches the list, keeping controllers (and their retry state) for
    /// todos that are still present.
    ///
    /// # Errors
    ///
    /// Returns the classification of the fetch failure, which is also shown
    /// as an error notification.
    pub async fn load(&mut self) -> Result<(), Classification> {
        let todos = match self.gateway.list().await {
            Ok(todos) => todos,
            Err(failure) => return Err(self.report(&failure)),
        };

        let mut previous = std::mem::take(&mut self.items);
        self.items = todos
            .into_iter()
            .map(|todo| match previous.iter().position(|item| item.id() == todo.id) {
                Some(index) => {
                    let item = previous.swap_remove(index);
                    item.sync(todo);
                    item
                }
                None => ItemController::new(todo, Arc::clone(&self.sink)),
            })
            .collect();
        Ok(())
    }

    /// Submits the new-todo form.
    ///
    /// A blank title is rejected without calling the gateway.
    pub async fn submit_new(&mut self, title: &str) -> SubmitOutcome {
        let title = match validate_title(title) {
            Ok(title) => title,
            Err(error) => {
                self.new_todo_error = Some(error.clone());
                return SubmitOutcome::Invalid(error);
            }
        };
        self.new_todo_error = None;

        match self.gateway.create(title).await {
            Ok(todo) => {
                self.sink.success("Todo added successfully!");
                // A failed refetch is already reported; the todo was created.
                let _ = self.load().await;
                SubmitOutcome::Created(todo)
            }
            Err(failure) => SubmitOutcome::Failed(self.report(&failure)),
        }
    }

    /// Flips a todo's completion flag optimistically.
    pub async fn toggle(&self, id: TodoId) -> Option<Outcome> {
        let item = self.item(id)?;
        let current = item.view().todo.is_complete;
        let gateway = Arc::clone(&self.gateway);
        let operation = mutation(move || gateway.toggle(id, current).map_ok(drop));
        Some(item.toggle_completion(operation).await)
    }

    /// Renames a todo optimistically.
    pub async fn rename(&self, id: TodoId, title: &str) -> Option<Outcome> {
        let item = self.item(id)?;
        let gateway = Arc::clone(&self.gateway);
        let new_title = title.trim().to_string();
        let operation = mutation(move || gateway.rename(id, new_title.clone()).map_ok(drop));
        Some(item.rename(title, operation).await)
    }

    /// Deletes a todo after the user answered the confirmation prompt.
    ///
    /// A confirmed delete refetches the list.
    pub async fn request_delete(&mut self, id: TodoId, confirmed: bool) -> Option<Outcome> {
        let item = self.item(id)?.clone();
        let gateway = Arc::clone(&self.gateway);
        let operation = mutation(move || gateway.delete(id));
        let outcome = item.delete(confirmed, operation).await;
        if outcome == Outcome::Confirmed {
            let _ = self.load().await;
        }
        Some(outcome)
    }

    /// Retries the last failed mutation on a todo.
    pub async fn retry(&mut self, id: TodoId) -> Option<Outcome> {
        let item = self.item(id)?.clone();
        let deleting = item
            .pending()
            .is_some_and(|pending| pending.target.hidden);
        let outcome = item.retry().await;
        if deleting && outcome == Outcome::Confirmed {
            let _ = self.load().await;
        }
        Some(outcome)
    }

    /// The controller for a todo, if it is on the board.
    #[must_use]
    pub fn item(&self, id: TodoId) -> Option<&ItemController> {
        self.items.iter().find(|item| item.id() == id)
    }

    /// Every item as currently displayed, including hidden ones.
    #[must_use]
    pub fn views(&self) -> Vec<ItemView> {
        self.items.iter().map(ItemController::view).collect()
    }

    /// Todos currently shown, in list order.
    #[must_use]
    pub fn visible_todos(&self) -> Vec<Todo> {
        self.views()
            .into_iter()
            .filter(|view| !view.hidden)
            .map(|view| view.todo)
            .collect()
    }

    /// Inline error under the new-todo field.
    #[must_use]
    pub fn new_todo_error(&self) -> Option<&str> {
        self.new_todo_error
            .as_ref()
            .and_then(|error| error.messages_for("title").next())
    }

    fn report(&self, failure: &Failure) -> Classification {
        let classification = classify(failure);
        self.sink.error(&classification.user_message);
        classification
    }
}
