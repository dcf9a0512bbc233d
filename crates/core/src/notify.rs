//! Notification dispatch (pager, ward display, messaging) is an external collaborator.
//!
//! The engine only decides *who* should hear about an emergency or an abnormal observation;
//! delivery is best-effort and a failed dispatch never fails the triggering operation.

use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use ward_uuid::{AdmissionId, CanonicalUuid, PatientId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    EmergencyRaised,
    EmergencyEscalated,
    AbnormalVitals,
    VitalsReported,
}

#[derive(Clone, Debug, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub subject_id: CanonicalUuid,
    pub patient_id: PatientId,
    pub admission_id: Option<AdmissionId>,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
#[error("notification dispatch failed: {0}")]
pub struct NotifyError(pub String);

pub trait NotificationDispatch: Send + Sync {
    fn notify(&self, recipients: &[UserId], notification: &Notification)
        -> Result<(), NotifyError>;
}

/// Logs notifications instead of delivering them.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl NotificationDispatch for TracingNotifier {
    fn notify(
        &self,
        recipients: &[UserId],
        notification: &Notification,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            target: "ward::notify",
            kind = ?notification.kind,
            subject = %notification.subject_id,
            recipients = recipients.len(),
            "{}",
            notification.message
        );
        Ok(())
    }
}

/// Collects notifications in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<(Vec<UserId>, Notification)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(Vec<UserId>, Notification)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl NotificationDispatch for MemoryNotifier {
    fn notify(
        &self,
        recipients: &[UserId],
        notification: &Notification,
    ) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((recipients.to_vec(), notification.clone()));
        Ok(())
    }
}
