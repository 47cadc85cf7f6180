//! Domain module.
//!
//! Todos, accounts and sessions.

pub mod account;
pub mod todo;

pub use account::{Account, Email, Session, SessionToken};
pub use todo::{Timestamp, Todo, TodoId, TodoPatch, UserId};
