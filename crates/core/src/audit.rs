//! Audit trail hand-off.
//!
//! Audit persistence is an external collaborator. The engine describes each state-changing
//! operation with a static [`OperationDescriptor`] (entity type, action, how to extract the
//! entity id from the result) and passes the committed result through the
//! [`AuditInterceptor`], which builds an [`AuditEntry`] and hands it to the [`AuditSink`].
//!
//! Sink failures are logged and swallowed: they never turn a committed transition into an
//! error, and a failed operation is never audited.

use crate::error::{EngineResult, EntityKind};
use crate::policy::Actor;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use ward_uuid::{CanonicalUuid, UserId};

/// One audited state change.
#[derive(Clone, Debug, Serialize)]
pub struct AuditEntry {
    pub actor_id: UserId,
    pub entity_type: EntityKind,
    pub entity_id: CanonicalUuid,
    pub action: &'static str,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
#[error("audit sink unavailable: {0}")]
pub struct AuditError(pub String);

pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;
}

/// Declarative description of an audited operation.
pub struct OperationDescriptor<T> {
    pub entity: EntityKind,
    pub action: &'static str,
    pub id_of: fn(&T) -> CanonicalUuid,
}

/// The before/after images of an operation's primary entity.
pub(crate) struct Change<T> {
    pub before: Option<T>,
    pub after: T,
    pub note: Option<String>,
}

impl<T> Change<T> {
    pub fn created(after: T) -> Self {
        Self {
            before: None,
            after,
            note: None,
        }
    }

    pub fn updated(before: T, after: T) -> Self {
        Self {
            before: Some(before),
            after,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[derive(Clone)]
pub(crate) struct AuditInterceptor {
    sink: Arc<dyn AuditSink>,
}

impl AuditInterceptor {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Records a committed change and unwraps it; errors pass through unaudited.
    pub fn after<T: Serialize>(
        &self,
        actor: &Actor,
        op: &OperationDescriptor<T>,
        at: DateTime<Utc>,
        result: EngineResult<Change<T>>,
    ) -> EngineResult<T> {
        let change = result?;

        let entry = AuditEntry {
            actor_id: actor.id,
            entity_type: op.entity,
            entity_id: (op.id_of)(&change.after),
            action: op.action,
            old_values: change
                .before
                .as_ref()
                .and_then(|b| serde_json::to_value(b).ok()),
            new_values: serde_json::to_value(&change.after).ok(),
            note: change.note,
            recorded_at: at,
        };

        if let Err(e) = self.sink.record(entry) {
            tracing::warn!(
                action = op.action,
                entity = %op.entity,
                "audit record dropped: {}",
                e
            );
        }

        Ok(change.after)
    }
}

/// Writes audit entries to the `ward::audit` tracing target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        tracing::info!(
            target: "ward::audit",
            actor = %entry.actor_id,
            entity = %entry.entity_type,
            id = %entry.entity_id,
            action = entry.action,
            note = entry.note.as_deref().unwrap_or(""),
            "audit"
        );
        Ok(())
    }
}

/// Keeps entries in memory. Useful for tests and for embedding callers that forward
/// entries in batches.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn actions(&self) -> Vec<&'static str> {
        self.entries().iter().map(|e| e.action).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        Ok(())
    }
}
