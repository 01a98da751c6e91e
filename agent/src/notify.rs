//! User-facing notifications.
//!
//! Every notification is logged and broadcast to subscribers (the PWA shell
//! polls or streams them). The most recent one is kept for `/status`.

use std::sync::{Arc, Mutex};

use fieldsync_engine::{Notification, Severity};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Fan-out point for notifications.
#[derive(Debug)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
    last: Mutex<Option<Notification>>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            last: Mutex::new(None),
        }
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Publish a notification.
    pub fn notify(&self, notification: Notification) {
        let text = notification.text();
        match notification.severity() {
            Severity::Info => tracing::info!(notification = %text, "Notify"),
            Severity::Warning => tracing::warn!(notification = %text, "Notify"),
            Severity::Error => tracing::error!(notification = %text, "Notify"),
        }

        *self
            .last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(notification.clone());

        // No subscribers is fine
        let _ = self.sender.send(notification);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// The most recent notification, if any.
    pub fn last(&self) -> Option<Notification> {
        self.last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_and_retains() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();

        notifier.notify(Notification::SyncSucceeded { count: 2 });

        assert_eq!(
            rx.recv().await.unwrap(),
            Notification::SyncSucceeded { count: 2 }
        );
        assert_eq!(
            notifier.last(),
            Some(Notification::SyncSucceeded { count: 2 })
        );
    }

    #[test]
    fn notify_without_subscribers() {
        let notifier = Notifier::new();
        notifier.notify(Notification::SavedOffline { action_id: 1 });
        assert!(notifier.last().is_some());
    }
}
