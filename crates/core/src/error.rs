use serde::Serialize;
use std::fmt;
use ward_uuid::{BedId, CanonicalUuid};

/// The entity types managed (or referenced) by the engine.
///
/// Used in error messages and audit entries so callers can render precise messages without
/// re-querying state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Ward,
    RoomCategory,
    Bed,
    Admission,
    DoctorOrder,
    MedicationSchedule,
    MedicationAdministration,
    VitalsRecord,
    EmergencyEvent,
    Patient,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Ward => "ward",
            EntityKind::RoomCategory => "room category",
            EntityKind::Bed => "bed",
            EntityKind::Admission => "admission",
            EntityKind::DoctorOrder => "doctor order",
            EntityKind::MedicationSchedule => "medication schedule",
            EntityKind::MedicationAdministration => "medication administration",
            EntityKind::VitalsRecord => "vitals record",
            EntityKind::EmergencyEvent => "emergency event",
            EntityKind::Patient => "patient",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse error taxonomy exposed to callers (HTTP status mapping, CLI exit codes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    Forbidden,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: EntityKind,
        id: CanonicalUuid,
    },
    #[error("{entity} {id} is {current}; cannot {attempted}")]
    InvalidTransition {
        entity: EntityKind,
        id: CanonicalUuid,
        current: String,
        attempted: String,
    },
    #[error("bed {bed_id} is not available (status: {status})")]
    BedUnavailable { bed_id: BedId, status: String },
    #[error("bed {bed_id} was modified concurrently (expected version {expected}, found {found})")]
    StaleBed {
        bed_id: BedId,
        expected: u64,
        found: u64,
    },
    #[error("{entity} already exists: {key}")]
    DuplicateKey { entity: EntityKind, key: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("role {role} is not permitted to {operation}")]
    Forbidden { role: String, operation: String },

    #[error("invalid text: {0}")]
    Text(#[from] ward_types::TextError),
    #[error("invalid identifier: {0}")]
    Identifier(#[from] ward_uuid::UuidError),
    #[error("invalid frequency: {0}")]
    Frequency(#[from] crate::medication::FrequencyError),

    #[error("failed to read seed file: {0}")]
    SeedRead(std::io::Error),
    #[error("seed file schema mismatch at {path}: {message}")]
    SeedSchema { path: String, message: String },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::InvalidTransition { .. }
            | EngineError::BedUnavailable { .. }
            | EngineError::StaleBed { .. }
            | EngineError::DuplicateKey { .. } => ErrorKind::Conflict,
            EngineError::InvalidInput(_)
            | EngineError::Text(_)
            | EngineError::Identifier(_)
            | EngineError::Frequency(_)
            | EngineError::SeedSchema { .. } => ErrorKind::Validation,
            EngineError::Forbidden { .. } => ErrorKind::Forbidden,
            EngineError::SeedRead(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn not_found(entity: EntityKind, id: impl Into<CanonicalUuid>) -> Self {
        EngineError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn transition(
        entity: EntityKind,
        id: impl Into<CanonicalUuid>,
        current: impl fmt::Display,
        attempted: impl Into<String>,
    ) -> Self {
        EngineError::InvalidTransition {
            entity,
            id: id.into(),
            current: current.to_string(),
            attempted: attempted.into(),
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
