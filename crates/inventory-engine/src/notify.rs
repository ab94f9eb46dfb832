//! Delivery of committed notifications

use parking_lot::Mutex;

use inventory_core::model::{Notification, Subject};

/// Receiver of the notifications of successfully committed transactions
///
/// Called once per commit with the final list, after the backend commit
/// succeeded. Never called for failed or retried attempts.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notifications: &[Notification]);
}

/// Writes every notification to the log at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn deliver(&self, notifications: &[Notification]) {
        for notification in notifications {
            match &notification.subject {
                Subject::Entity(entity) => tracing::debug!(
                    action = ?notification.action,
                    path = %entity.path,
                    identity_hash = entity.identity_hash.as_deref().unwrap_or("-"),
                    "entity notification"
                ),
                Subject::Relationship(rel) => tracing::debug!(
                    action = ?notification.action,
                    relationship = %rel,
                    "relationship notification"
                ),
            }
        }
    }
}

/// Keeps everything it receives, in delivery order
#[derive(Debug, Default)]
pub struct RecordingSink {
    received: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.received.lock().clone()
    }

    /// Drain what was received so far
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.received.lock())
    }

    pub fn len(&self) -> usize {
        self.received.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.received.lock().is_empty()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&self, notifications: &[Notification]) {
        self.received.lock().extend_from_slice(notifications);
    }
}
