//! Transient user notifications.
//!
//! A [`NotificationSink`] accepts a message with a [`Severity`] and shows it
//! for a while. [`ToastQueue`] keeps notifications in insertion order; new
//! ones stack below older ones instead of replacing them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// How long a notification stays up when no duration is given.
pub const DEFAULT_DISPLAY: Duration = Duration::from_millis(5000);

/// Notification severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Info,
    Warning,
}

/// How long to display a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayDuration {
    /// Auto-dismiss after this long. `Duration::ZERO` never auto-dismisses.
    For(Duration),
    /// Stay until dismissed.
    Infinite,
}

impl Default for DisplayDuration {
    fn default() -> Self {
        Self::For(DEFAULT_DISPLAY)
    }
}

impl DisplayDuration {
    /// When a notification shown at `shown_at` should disappear, if ever.
    #[must_use]
    pub fn expires_at(self, shown_at: Instant) -> Option<Instant> {
        match self {
            Self::For(duration) if !duration.is_zero() => shown_at.checked_add(duration),
            Self::For(_) | Self::Infinite => None,
        }
    }
}

/// Identifier of a shown notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToastId(u64);

/// Receives user notifications.
pub trait NotificationSink: Send + Sync {
    /// Shows `message` for `duration`.
    fn notify(&self, message: &str, severity: Severity, duration: DisplayDuration) -> ToastId;

    /// Shows a success notification for the default duration.
    fn success(&self, message: &str) -> ToastId {
        self.notify(message, Severity::Success, DisplayDuration::default())
    }

    /// Shows an error notification for the default duration.
    fn error(&self, message: &str) -> ToastId {
        self.notify(message, Severity::Error, DisplayDuration::default())
    }
}

/// A shown notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: ToastId,
    pub message: String,
    pub severity: Severity,
    pub shown_at: Instant,
    /// `None` means the toast stays until dismissed.
    pub expires_at: Option<Instant>,
}

impl Toast {
    /// Returns `true` if the toast should no longer be shown at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// In-memory notification queue.
///
/// Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct ToastQueue {
    toasts: Arc<Mutex<Vec<Toast>>>,
    next_id: Arc<AtomicU64>,
}

impl ToastQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes a toast. Returns `false` if it was already gone.
    pub fn dismiss(&self, id: ToastId) -> bool {
        let mut toasts = self.toasts.lock();
        let before = toasts.len();
        toasts.retain(|toast| toast.id != id);
        toasts.len() != before
    }

    /// Drops every toast whose display time has passed at `now`.
    pub fn prune_expired(&self, now: Instant) {
        self.toasts.lock().retain(|toast| !toast.is_expired_at(now));
    }

    /// Toasts still visible at `now`, oldest first.
    #[must_use]
    pub fn visible_at(&self, now: Instant) -> Vec<Toast> {
        self.toasts
            .lock()
            .iter()
            .filter(|toast| !toast.is_expired_at(now))
            .cloned()
            .collect()
    }

    /// Toasts visible right now, oldest first.
    #[must_use]
    pub fn visible(&self) -> Vec<Toast> {
        self.visible_at(Instant::now())
    }

    /// Messages of visible toasts with the given severity.
    #[must_use]
    pub fn messages(&self, severity: Severity) -> Vec<String> {
        self.visible()
            .into_iter()
            .filter(|toast| toast.severity == severity)
            .map(|toast| toast.message)
            .collect()
    }
}

impl NotificationSink for ToastQueue {
    fn notify(&self, message: &str, severity: Severity, duration: DisplayDuration) -> ToastId {
        let id = ToastId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let shown_at = Instant::now();
        tracing::debug!(?severity, text = message, "Notification shown");
        let mut toasts = self.toasts.lock();
        toasts.retain(|toast| !toast.is_expired_at(shown_at));
        toasts.push(Toast {
            id,
            message: message.to_string(),
            severity,
            shown_at,
            expires_at: duration.expires_at(shown_at),
        });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_toasts_stack_in_order() {
        let queue = ToastQueue::new();
        queue.success("first");
        queue.error("second");
        queue.notify("third", Severity::Info, DisplayDuration::Infinite);

        let messages: Vec<String> = queue.visible().into_iter().map(|toast| toast.message).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }

    #[rstest]
    fn test_default_duration_auto_dismisses() {
        let queue = ToastQueue::new();
        let id = queue.success("saved");
        let toast = queue.visible().into_iter().find(|toast| toast.id == id).unwrap();

        let just_before = toast.shown_at + DEFAULT_DISPLAY - Duration::from_millis(1);
        assert_eq!(queue.visible_at(just_before).len(), 1);
        assert!(queue.visible_at(toast.shown_at + DEFAULT_DISPLAY).is_empty());
    }

    #[rstest]
    #[case(DisplayDuration::For(Duration::ZERO))]
    #[case(DisplayDuration::Infinite)]
    fn test_zero_and_infinite_never_expire(#[case] duration: DisplayDuration) {
        let queue = ToastQueue::new();
        queue.notify("sticky", Severity::Warning, duration);

        let far_future = Instant::now() + Duration::from_secs(24 * 60 * 60);
        queue.prune_expired(far_future);
        assert_eq!(queue.visible_at(far_future).len(), 1);
    }

    #[rstest]
    fn test_prune_and_dismiss() {
        let queue = ToastQueue::new();
        let short = queue.notify("short", Severity::Info, DisplayDuration::For(Duration::from_millis(10)));
        let sticky = queue.notify("sticky", Severity::Error, DisplayDuration::Infinite);

        queue.prune_expired(Instant::now() + Duration::from_secs(1));
        assert!(!queue.dismiss(short));
        assert!(queue.dismiss(sticky));
        assert!(queue.visible().is_empty());
    }

    #[rstest]
    fn test_notify_drops_expired_toasts() {
        let queue = ToastQueue::new();
        queue.notify("brief", Severity::Info, DisplayDuration::For(Duration::from_millis(1)));
        let brief_shown_at = queue.toasts.lock()[0].shown_at;
        std::thread::sleep(Duration::from_millis(5));

        queue.error("later");

        let remaining: Vec<String> = queue
            .visible_at(brief_shown_at)
            .into_iter()
            .map(|toast| toast.message)
            .collect();
        assert_eq!(remaining, vec!["later"]);
    }
}
