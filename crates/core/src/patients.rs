//! Patient directory lookup.
//!
//! Patient demographics live elsewhere; the engine only needs to know that a patient id
//! refers to someone real before admitting them or raising an event about them.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};
use ward_uuid::PatientId;

pub trait PatientDirectory: Send + Sync {
    fn contains(&self, patient_id: PatientId) -> bool;
}

/// A directory backed by an in-memory set, populated from seed files or by the host.
#[derive(Debug, Default)]
pub struct InMemoryPatientDirectory {
    known: RwLock<HashSet<PatientId>>,
}

impl InMemoryPatientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, patient_id: PatientId) {
        self.known
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(patient_id);
    }

    pub fn len(&self) -> usize {
        self.known
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PatientDirectory for InMemoryPatientDirectory {
    fn contains(&self, patient_id: PatientId) -> bool {
        self.known
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&patient_id)
    }
}
