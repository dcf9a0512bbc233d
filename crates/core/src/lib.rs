//! # Ward Core
//!
//! Core business logic for the inpatient care orchestration engine.
//!
//! This crate owns the coordinated lifecycle of a hospital stay:
//! - Bed and ward registry, with occupancy kept consistent with active admissions
//! - Admission, transfer, discharge and death, claiming and releasing beds atomically
//! - Doctor orders and the medication schedules derived from them
//! - Materialization of medication due instants into administration tasks, and their
//!   execution, omission and verification
//! - Vitals observations and emergency events with a forward-only escalation lattice
//!
//! **No API concerns**: HTTP routing, authentication and process wiring belong in `api-rest`
//! and the runtime binaries. Identity, audit persistence, notification delivery and patient
//! demographics are injected collaborators (see [`policy`], [`audit`], [`notify`] and
//! [`patients`]).
//!
//! Start from [`Engine`]: every component is reached through one of its service accessors.

pub mod admissions;
pub mod audit;
pub mod clock;
pub mod config;
pub mod constants;
pub mod emergency;
mod engine;
pub mod error;
pub mod medication;
pub mod notify;
pub mod orders;
pub mod patients;
pub mod policy;
pub mod registry;
pub mod seed;
mod store;
pub mod vitals;

#[cfg(test)]
pub(crate) mod test_support;

pub use audit::{AuditEntry, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, EngineResult, EntityKind, ErrorKind};
pub use patients::{InMemoryPatientDirectory, PatientDirectory};
pub use policy::{AccessPolicy, Actor, AllowAll, Operation, ResourceContext, Role, RoleMatrix};
pub use seed::{SeedFile, SeedSummary};

pub use ward_types::{Code, NonEmptyText};
pub use ward_uuid::{
    AdministrationId, AdmissionId, BedId, CanonicalUuid, EventId, OrderId, PatientId,
    RoomCategoryId, ScheduleId, UserId, VitalsId, WardId,
};
