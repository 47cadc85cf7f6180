//! Todo Service Library
//!
//! A multi-user todo service: session-gated CRUD over an owner-scoped
//! record store, email/password accounts with verification and recovery
//! links, a single error classifier shared by server and client, and a
//! client-side board that applies mutations optimistically with rollback
//! and retry.

pub mod api;
pub mod classify;
pub mod client;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod validation;
