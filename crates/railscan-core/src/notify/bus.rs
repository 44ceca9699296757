//! Notification bus: fan-out of short-lived user-facing messages.
//!
//! Fire-and-forget. A message published while nobody is subscribed is lost;
//! there is no queue and no replay.

use std::time::Duration;

use crate::domain::{DEFAULT_TOAST_DURATION, NotificationMessage, Severity};
use crate::observer::{ObserverSet, Subscription};

/// Process-wide notification channel.
///
/// Construct once at startup and hand clones to whoever needs it; clones
/// share the same observers.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    observers: ObserverSet<NotificationMessage>,
    default_duration: Duration,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::with_default_duration(DEFAULT_TOAST_DURATION)
    }

    /// A bus whose `show` uses `duration` instead of the 4 s default.
    pub fn with_default_duration(duration: Duration) -> Self {
        Self {
            observers: ObserverSet::new(),
            default_duration: duration,
        }
    }

    pub fn default_duration(&self) -> Duration {
        self.default_duration
    }

    /// Receive every message published from now until `unsubscribe`.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&NotificationMessage) + Send + Sync + 'static,
    {
        self.observers.subscribe(observer)
    }

    /// Deliver `message` to every current observer. Returns how many got it.
    pub fn publish(&self, message: NotificationMessage) -> usize {
        let delivered = self.observers.emit(&message);
        if delivered == 0 {
            tracing::debug!(severity = %message.severity, text = %message.text, "notification dropped, no observers");
        }
        delivered
    }

    /// Publish with the bus default duration.
    pub fn show(&self, text: impl Into<String>, severity: Severity) -> usize {
        self.show_for(text, severity, self.default_duration)
    }

    pub fn show_for(&self, text: impl Into<String>, severity: Severity, duration: Duration) -> usize {
        self.publish(NotificationMessage::new(text, severity).with_duration(duration))
    }

    pub fn success(&self, text: impl Into<String>) -> usize {
        self.show(text, Severity::Success)
    }

    pub fn error(&self, text: impl Into<String>) -> usize {
        self.show(text, Severity::Error)
    }

    pub fn warning(&self, text: impl Into<String>) -> usize {
        self.show(text, Severity::Warning)
    }

    pub fn info(&self, text: impl Into<String>) -> usize {
        self.show(text, Severity::Info)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}
