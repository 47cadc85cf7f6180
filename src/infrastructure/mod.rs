//! Infrastructure module for external services.
//!
//! This module contains the record store and identity provider contracts,
//! their in-memory implementations, outgoing mail, and fail injection.

pub mod fail_injection;
pub mod in_memory;
pub mod mailer;
pub mod repository;

pub use fail_injection::{FailInjectionConfig, FailInjectionError, FlakyTodoRepository};
pub use in_memory::{IdentitySettings, InMemoryIdentityProvider, InMemoryTodoRepository};
pub use mailer::{MailError, MailKind, Mailer, OutboxMailer, OutgoingMail};
pub use repository::{
    CodeExchange, CodePurpose, IdentityError, IdentityProvider, RepositoryError, TodoRepository,
};
