//! Registry seed files.
//!
//! A seed file describes the physical estate (room categories, wards and beds) plus the
//! patient ids the host already knows about, so a fresh engine can be brought up with a
//! usable registry:
//!
//! ```yaml
//! room_categories:
//!   - code: GEN
//!     name: General bay
//! wards:
//!   - code: MED
//!     name: Medical
//!     floor: 2
//! beds:
//!   - code: B201
//!     ward: MED
//!     category: GEN
//! patients:
//!   - 550e8400e29b41d4a716446655440000
//! ```
//!
//! Seeding goes through the registry operations, so every record is validated and audited
//! like any other registry change.

use crate::patients::InMemoryPatientDirectory;
use crate::policy::Actor;
use crate::registry::{BedStatus, NewBed, NewRoomCategory, NewWard};
use crate::{Engine, EngineError, EngineResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use ward_types::Code;
use ward_uuid::{PatientId, RoomCategoryId, WardId};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedFile {
    #[serde(default)]
    pub room_categories: Vec<SeedCategory>,
    #[serde(default)]
    pub wards: Vec<SeedWard>,
    #[serde(default)]
    pub beds: Vec<SeedBed>,
    #[serde(default)]
    pub patients: Vec<PatientId>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedCategory {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedWard {
    pub code: String,
    pub name: String,
    pub floor: i32,
    #[serde(default)]
    pub building: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedBed {
    pub code: String,
    /// Ward code.
    pub ward: String,
    /// Room category code.
    pub category: String,
    /// Initial operational status; `occupied` is not accepted.
    #[serde(default)]
    pub status: Option<BedStatus>,
    #[serde(default)]
    pub special_requirements: Option<String>,
}

/// What a seed run created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub room_categories: usize,
    pub wards: usize,
    pub beds: usize,
    pub patients: usize,
}

impl SeedFile {
    /// Parse a seed file from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SeedSchema`] naming the path of the first field that does not
    /// match the schema (unknown keys included).
    pub fn parse(yaml_text: &str) -> EngineResult<Self> {
        let deserializer = serde_yaml::Deserializer::from_str(yaml_text);

        match serde_path_to_error::deserialize::<_, SeedFile>(deserializer) {
            Ok(seed) => Ok(seed),
            Err(err) => {
                let path = err.path().to_string();
                let path = if path.is_empty() || path == "." {
                    "<root>".to_string()
                } else {
                    path
                };
                Err(EngineError::SeedSchema {
                    path,
                    message: err.into_inner().to_string(),
                })
            }
        }
    }

    /// Read and parse a seed file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SeedRead`] if the file cannot be read, otherwise as
    /// [`SeedFile::parse`].
    pub fn load(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(EngineError::SeedRead)?;
        Self::parse(&text)
    }

    /// Register everything in the file with `engine`, acting as `actor`.
    ///
    /// Patients are added to `patients`, which should be the directory the engine was built
    /// with. Records are created in dependency order (categories, wards, beds); the first
    /// failure stops the run and is returned, leaving earlier records in place.
    pub fn apply(
        &self,
        engine: &Engine,
        actor: &Actor,
        patients: &InMemoryPatientDirectory,
    ) -> EngineResult<SeedSummary> {
        let registry = engine.registry();
        let mut summary = SeedSummary::default();

        let mut categories: HashMap<Code, RoomCategoryId> = registry
            .list_room_categories(actor)?
            .into_iter()
            .map(|c| (c.code, c.id))
            .collect();
        for category in &self.room_categories {
            let created = registry.register_room_category(
                actor,
                NewRoomCategory {
                    code: category.code.clone(),
                    name: category.name.clone(),
                    description: category.description.clone(),
                },
            )?;
            categories.insert(created.code, created.id);
            summary.room_categories += 1;
        }

        let mut wards: HashMap<Code, WardId> = registry
            .list_wards(actor)?
            .into_iter()
            .map(|w| (w.code, w.id))
            .collect();
        for ward in &self.wards {
            let created = registry.register_ward(
                actor,
                NewWard {
                    code: ward.code.clone(),
                    name: ward.name.clone(),
                    floor: ward.floor,
                    building: ward.building.clone(),
                },
            )?;
            wards.insert(created.code, created.id);
            summary.wards += 1;
        }

        for bed in &self.beds {
            let ward_id = *wards
                .get(&Code::new(&bed.ward)?)
                .ok_or_else(|| unknown_reference("ward", &bed.ward, &bed.code))?;
            let category_id = *categories
                .get(&Code::new(&bed.category)?)
                .ok_or_else(|| unknown_reference("room category", &bed.category, &bed.code))?;

            let created = registry.register_bed(
                actor,
                NewBed {
                    code: bed.code.clone(),
                    ward_id,
                    category_id,
                    special_requirements: bed.special_requirements.clone(),
                },
            )?;
            if let Some(status) = bed.status.filter(|s| *s != BedStatus::Vacant) {
                registry.set_bed_operational_status(actor, created.id, status)?;
            }
            summary.beds += 1;
        }

        for patient_id in &self.patients {
            patients.register(*patient_id);
        }
        summary.patients = self.patients.len();

        tracing::info!(
            categories = summary.room_categories,
            wards = summary.wards,
            beds = summary.beds,
            patients = summary.patients,
            "registry seeded"
        );
        Ok(summary)
    }
}

fn unknown_reference(what: &str, code: &str, bed: &str) -> EngineError {
    EngineError::InvalidInput(format!("bed {bed} references unknown {what} '{code}'"))
}
