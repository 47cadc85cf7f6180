//! Todo domain model.
//!
//! A todo is owned by exactly one account. Its owner and creation time are
//! fixed at construction; title and completion are updated in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Value Objects - Newtypes
// =============================================================================

/// Unique identifier for a todo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TodoId(Uuid);

impl TodoId {
    /// Creates a `TodoId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Generates a new time-ordered `TodoId` (UUID v7).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl std::fmt::Display for TodoId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Unique identifier for an account, used as the owner of todos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a `UserId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Generates a new random `UserId` (UUID v4).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// A timestamp wrapper for `DateTime<Utc>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a `Timestamp` from a `DateTime<Utc>`.
    #[must_use]
    pub const fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Returns the inner `DateTime<Utc>`.
    #[must_use]
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Returns the current time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0.to_rfc3339())
    }
}

// =============================================================================
// Todo
// =============================================================================

/// A single task item.
///
/// # Examples
///
/// ```
/// use todo_service::domain::{Timestamp, Todo, TodoId, UserId};
///
/// let owner = UserId::generate();
/// let todo = Todo::new(TodoId::generate(), owner, "Buy milk", Timestamp::now());
/// assert!(!todo.is_complete);
/// assert!(todo.is_owned_by(&owner));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    /// Unique identifier, stable for the todo's lifetime.
    pub id: TodoId,
    /// Title text; never empty once validated.
    pub title: String,
    /// Completion flag.
    pub is_complete: bool,
    /// Owning account. Never changes after creation.
    pub owner: UserId,
    /// Creation time. Never changes after creation.
    pub created_at: Timestamp,
    /// Time of the last title or completion change.
    pub updated_at: Timestamp,
}

impl Todo {
    /// Creates a new, incomplete todo.
    #[must_use]
    pub fn new(id: TodoId, owner: UserId, title: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            id,
            title: title.into(),
            is_complete: false,
            owner,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Returns a copy with the given title.
    #[must_use]
    pub fn with_title(self, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..self
        }
    }

    /// Returns a copy with the given completion flag.
    #[must_use]
    pub fn with_completion(self, is_complete: bool) -> Self {
        Self {
            is_complete,
            ..self
        }
    }

    /// Returns a copy with `updated_at` set to the given time.
    #[must_use]
    pub fn with_updated_at(self, timestamp: Timestamp) -> Self {
        Self {
            updated_at: timestamp,
            ..self
        }
    }

    /// Returns `true` if `user` owns this todo.
    #[must_use]
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        self.owner == *user
    }
}

/// Partial update applied to an existing todo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoPatch {
    /// New title, already validated.
    pub title: Option<String>,
    /// New completion flag.
    pub is_complete: Option<bool>,
}

impl TodoPatch {
    /// A patch that only sets the title.
    #[must_use]
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            is_complete: None,
        }
    }

    /// A patch that only sets the completion flag.
    #[must_use]
    pub const fn completion(is_complete: bool) -> Self {
        Self {
            title: None,
            is_complete: Some(is_complete),
        }
    }

    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none() && self.is_complete.is_none()
    }

    /// Applies the patch, stamping `updated_at` with `now`.
    #[must_use]
    pub fn apply(self, todo: Todo, now: Timestamp) -> Todo {
        let todo = match self.title {
            Some(title) => todo.with_title(title),
            None => todo,
        };
        let todo = match self.is_complete {
            Some(is_complete) => todo.with_completion(is_complete),
            None => todo,
        };
        todo.with_updated_at(now)
    }
}

// =============================================================================
// Tests
// =============================================================================
