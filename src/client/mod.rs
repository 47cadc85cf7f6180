//! Client-side state for the todo list.
//!
//! The board applies changes optimistically: the user sees the new value at
//! once, and a failed remote call rolls it back with an error notification
//! and a retry affordance.

pub mod board;
pub mod gateway;
pub mod notify;
pub mod optimistic;

pub use board::{SubmitOutcome, TodoBoard};
pub use gateway::{GatewayError, GatewayFuture, HttpGateway, LocalGateway, TodoGateway};
pub use notify::{DisplayDuration, NotificationSink, Severity, Toast, ToastId, ToastQueue};
pub use optimistic::{
    ItemController, ItemView, MutationOp, Outcome, Overlay, PendingMutation, Phase, mutation,
};
