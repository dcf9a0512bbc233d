//! Queue-backed audit and notification delivery.
//!
//! The engine hands audit entries and notifications over synchronously after each commit.
//! These decorators put them on a bounded channel and return at once; a tokio task drains the
//! channel into the wrapped sink. A full or closed queue is reported back as a dispatch error,
//! which the engine logs and drops.

use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use ward_core::audit::AuditError;
use ward_core::notify::{Notification, NotificationDispatch, NotifyError};
use ward_core::{AuditEntry, AuditSink, UserId};

/// Queue depth used by the REST binaries.
pub const DISPATCH_QUEUE_CAPACITY: usize = 1024;

fn queue_error<T>(e: TrySendError<T>) -> String {
    match e {
        TrySendError::Full(_) => "queue full".into(),
        TrySendError::Closed(_) => "queue closed".into(),
    }
}

pub struct QueuedAuditSink {
    tx: mpsc::Sender<AuditEntry>,
}

impl QueuedAuditSink {
    /// Start the delivery task for `inner`. Must be called inside a tokio runtime.
    pub fn spawn(inner: Arc<dyn AuditSink>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<AuditEntry>(capacity);
        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                let action = entry.action;
                if let Err(e) = inner.record(entry) {
                    tracing::warn!(action, "audit record dropped: {}", e);
                }
            }
        });
        Self { tx }
    }
}

impl AuditSink for QueuedAuditSink {
    fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.tx
            .try_send(entry)
            .map_err(|e| AuditError(queue_error(e)))
    }
}

pub struct QueuedNotifier {
    tx: mpsc::Sender<(Vec<UserId>, Notification)>,
}

impl QueuedNotifier {
    /// Start the delivery task for `inner`. Must be called inside a tokio runtime.
    pub fn spawn(inner: Arc<dyn NotificationDispatch>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<(Vec<UserId>, Notification)>(capacity);
        tokio::spawn(async move {
            while let Some((recipients, notification)) = rx.recv().await {
                if let Err(e) = inner.notify(&recipients, &notification) {
                    tracing::warn!(kind = ?notification.kind, "notification dropped: {}", e);
                }
            }
        });
        Self { tx }
    }
}

impl NotificationDispatch for QueuedNotifier {
    fn notify(
        &self,
        recipients: &[UserId],
        notification: &Notification,
    ) -> Result<(), NotifyError> {
        self.tx
            .try_send((recipients.to_vec(), notification.clone()))
            .map_err(|e| NotifyError(queue_error(e)))
    }
}
