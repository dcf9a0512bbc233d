//! Canonical identifier utilities.
//!
//! Every entity in the ward engine is keyed by an opaque UUID. To keep identifiers stable across
//! the REST surface, the CLI, audit entries and log lines, the engine uses a *canonical* textual
//! form: **32 lowercase hexadecimal characters** (no hyphens).
//!
//! This crate provides:
//! - [`CanonicalUuid`], a wrapper that guarantees the canonical format once constructed.
//! - Typed identifier newtypes ([`WardId`], [`BedId`], [`AdmissionId`], ...) so a bed id can
//!   never be passed where an admission id is expected.
//!
//! ## Canonical UUID form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! Canonical form is *required* for externally supplied identifiers. Non-canonical values
//! (uppercase, hyphenated, wrong length, non-hex) are rejected.

mod ids;
mod service;

// Re-export public types
pub use ids::{
    AdministrationId, AdmissionId, BedId, EventId, OrderId, PatientId, RoomCategoryId,
    ScheduleId, UserId, VitalsId, WardId,
};
pub use service::{CanonicalUuid, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
