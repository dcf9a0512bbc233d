//! Bed & Ward Registry.
//!
//! The single source of truth for bed availability. Wards and room categories are created by
//! administrative action and never deleted. Beds move between `vacant`, `maintenance` and
//! `reserved` through [`RegistryService::set_bed_operational_status`]; the `occupied`
//! transition belongs to the admission manager and goes through [`claim_bed`] /
//! [`release_bed`], which check the bed's row version before writing.

use crate::audit::{Change, OperationDescriptor};
use crate::engine::EngineContext;
use crate::error::{EngineError, EngineResult, EntityKind};
use crate::policy::{Actor, Operation, ResourceContext};
use crate::store::{Tables, Transaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use ward_types::{Code, NonEmptyText};
use ward_uuid::{AdmissionId, BedId, CanonicalUuid, PatientId, RoomCategoryId, WardId};

// ============================================================================
// RECORDS
// ============================================================================

#[derive(Clone, Debug, Serialize)]
pub struct Ward {
    pub id: WardId,
    pub code: Code,
    pub name: NonEmptyText,
    pub floor: i32,
    pub building: Option<String>,
    pub active: bool,
    /// Denormalized count of beds registered to this ward.
    pub total_beds: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct RoomCategory {
    pub id: RoomCategoryId,
    pub code: Code,
    pub name: NonEmptyText,
    pub description: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BedStatus {
    Vacant,
    Occupied,
    Maintenance,
    Reserved,
}

impl BedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BedStatus::Vacant => "vacant",
            BedStatus::Occupied => "occupied",
            BedStatus::Maintenance => "maintenance",
            BedStatus::Reserved => "reserved",
        }
    }

    /// Whether an admission may claim a bed in this state.
    pub fn is_claimable(&self) -> bool {
        matches!(self, BedStatus::Vacant | BedStatus::Reserved)
    }
}

impl fmt::Display for BedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Bed {
    pub id: BedId,
    pub code: Code,
    pub ward_id: WardId,
    pub category_id: RoomCategoryId,
    pub status: BedStatus,
    pub current_patient: Option<PatientId>,
    pub current_admission: Option<AdmissionId>,
    pub admission_date: Option<DateTime<Utc>>,
    pub discharge_date: Option<DateTime<Utc>>,
    pub special_requirements: Option<String>,
    /// Row version, bumped on every write.
    pub version: u64,
}

// ============================================================================
// INPUTS AND READ MODELS
// ============================================================================

#[derive(Clone, Debug, Deserialize)]
pub struct NewWard {
    pub code: String,
    pub name: String,
    pub floor: i32,
    #[serde(default)]
    pub building: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WardUpdate {
    pub name: Option<String>,
    pub floor: Option<i32>,
    pub building: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewRoomCategory {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewBed {
    pub code: String,
    pub ward_id: WardId,
    pub category_id: RoomCategoryId,
    #[serde(default)]
    pub special_requirements: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct BedFilter {
    pub ward_id: Option<WardId>,
    pub category_id: Option<RoomCategoryId>,
    pub status: Option<BedStatus>,
}

impl BedFilter {
    fn matches(&self, bed: &Bed) -> bool {
        self.ward_id.is_none_or(|w| bed.ward_id == w)
            && self.category_id.is_none_or(|c| bed.category_id == c)
            && self.status.is_none_or(|s| bed.status == s)
    }
}

/// Bed counts per status for one ward or one room category.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OccupancySummary {
    pub id: CanonicalUuid,
    pub code: String,
    pub total: u32,
    pub vacant: u32,
    pub occupied: u32,
    pub maintenance: u32,
    pub reserved: u32,
}

impl OccupancySummary {
    fn count(&mut self, status: BedStatus) {
        self.total += 1;
        match status {
            BedStatus::Vacant => self.vacant += 1,
            BedStatus::Occupied => self.occupied += 1,
            BedStatus::Maintenance => self.maintenance += 1,
            BedStatus::Reserved => self.reserved += 1,
        }
    }
}

// ============================================================================
// AUDIT DESCRIPTORS
// ============================================================================

fn ward_id_of(w: &Ward) -> CanonicalUuid {
    w.id.into()
}
fn category_id_of(c: &RoomCategory) -> CanonicalUuid {
    c.id.into()
}
fn bed_id_of(b: &Bed) -> CanonicalUuid {
    b.id.into()
}

const REGISTER_WARD: OperationDescriptor<Ward> = OperationDescriptor {
    entity: EntityKind::Ward,
    action: "register_ward",
    id_of: ward_id_of,
};
const UPDATE_WARD: OperationDescriptor<Ward> = OperationDescriptor {
    entity: EntityKind::Ward,
    action: "update_ward",
    id_of: ward_id_of,
};
const DEACTIVATE_WARD: OperationDescriptor<Ward> = OperationDescriptor {
    entity: EntityKind::Ward,
    action: "deactivate_ward",
    id_of: ward_id_of,
};
const REGISTER_CATEGORY: OperationDescriptor<RoomCategory> = OperationDescriptor {
    entity: EntityKind::RoomCategory,
    action: "register_room_category",
    id_of: category_id_of,
};
const REGISTER_BED: OperationDescriptor<Bed> = OperationDescriptor {
    entity: EntityKind::Bed,
    action: "register_bed",
    id_of: bed_id_of,
};
const SET_BED_STATUS: OperationDescriptor<Bed> = OperationDescriptor {
    entity: EntityKind::Bed,
    action: "set_bed_status",
    id_of: bed_id_of,
};

// ============================================================================
// REGISTRY SERVICE
// ============================================================================

#[derive(Clone)]
pub struct RegistryService {
    ctx: Arc<EngineContext>,
}

impl RegistryService {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Registers a ward.
    ///
    /// # Errors
    ///
    /// - [`EngineError::DuplicateKey`] if another ward already uses the code.
    /// - Validation errors for an empty name or malformed code.
    pub fn register_ward(&self, actor: &Actor, new: NewWard) -> EngineResult<Ward> {
        self.ctx
            .authorize(actor, Operation::ManageRegistry, ResourceContext::none())?;

        let code = Code::new(&new.code)?;
        let name = NonEmptyText::new(&new.name)?;

        let result = self.ctx.store.transaction(|tx| {
            if tx.tables().ward_codes.contains_key(&code) {
                return Err(EngineError::DuplicateKey {
                    entity: EntityKind::Ward,
                    key: code.to_string(),
                });
            }

            let ward = Ward {
                id: WardId::new(),
                code: code.clone(),
                name,
                floor: new.floor,
                building: normalise(new.building),
                active: true,
                total_beds: 0,
            };
            tx.index_ward_code(code.clone(), ward.id);
            tx.put_ward(ward.clone());
            Ok(Change::created(ward))
        });

        let ward = self
            .ctx
            .audit
            .after(actor, &REGISTER_WARD, self.ctx.now(), result)?;
        tracing::info!(ward = %ward.id, code = %ward.code, "registered ward");
        Ok(ward)
    }

    pub fn update_ward(
        &self,
        actor: &Actor,
        ward_id: WardId,
        update: WardUpdate,
    ) -> EngineResult<Ward> {
        self.ctx
            .authorize(actor, Operation::ManageRegistry, ResourceContext::ward(ward_id))?;

        let name = update.name.as_deref().map(NonEmptyText::new).transpose()?;

        let result = self.ctx.store.transaction(|tx| {
            let before = ward_in(tx.tables(), ward_id)?.clone();
            let mut after = before.clone();
            if let Some(name) = name {
                after.name = name;
            }
            if let Some(floor) = update.floor {
                after.floor = floor;
            }
            if update.building.is_some() {
                after.building = normalise(update.building);
            }
            tx.put_ward(after.clone());
            Ok(Change::updated(before, after))
        });

        self.ctx
            .audit
            .after(actor, &UPDATE_WARD, self.ctx.now(), result)
    }

    /// Soft-deactivates a ward. Rejected while any of its beds is occupied.
    pub fn deactivate_ward(&self, actor: &Actor, ward_id: WardId) -> EngineResult<Ward> {
        self.ctx
            .authorize(actor, Operation::ManageRegistry, ResourceContext::ward(ward_id))?;

        let result = self.ctx.store.transaction(|tx| {
            let before = ward_in(tx.tables(), ward_id)?.clone();
            if !before.active {
                return Err(EngineError::transition(
                    EntityKind::Ward,
                    ward_id,
                    "inactive",
                    "deactivate",
                ));
            }
            let occupied = tx
                .tables()
                .beds
                .values()
                .filter(|b| b.ward_id == ward_id && b.status == BedStatus::Occupied)
                .count();
            if occupied > 0 {
                return Err(EngineError::transition(
                    EntityKind::Ward,
                    ward_id,
                    format!("holding {occupied} occupied bed(s)"),
                    "deactivate",
                ));
            }

            let mut after = before.clone();
            after.active = false;
            tx.put_ward(after.clone());
            Ok(Change::updated(before, after))
        });

        let ward = self
            .ctx
            .audit
            .after(actor, &DEACTIVATE_WARD, self.ctx.now(), result)?;
        tracing::info!(ward = %ward.id, "deactivated ward");
        Ok(ward)
    }

    pub fn register_room_category(
        &self,
        actor: &Actor,
        new: NewRoomCategory,
    ) -> EngineResult<RoomCategory> {
        self.ctx
            .authorize(actor, Operation::ManageRegistry, ResourceContext::none())?;

        let code = Code::new(&new.code)?;
        let name = NonEmptyText::new(&new.name)?;

        let result = self.ctx.store.transaction(|tx| {
            if tx.tables().category_codes.contains_key(&code) {
                return Err(EngineError::DuplicateKey {
                    entity: EntityKind::RoomCategory,
                    key: code.to_string(),
                });
            }
            let category = RoomCategory {
                id: RoomCategoryId::new(),
                code: code.clone(),
                name,
                description: normalise(new.description),
            };
            tx.index_category_code(code.clone(), category.id);
            tx.put_category(category.clone());
            Ok(Change::created(category))
        });

        self.ctx
            .audit
            .after(actor, &REGISTER_CATEGORY, self.ctx.now(), result)
    }

    /// Registers a bed in a ward under a room category, starting `vacant`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if the ward or category does not exist.
    /// - [`EngineError::DuplicateKey`] if the bed code is taken.
    /// - [`EngineError::InvalidTransition`] if the ward is inactive.
    pub fn register_bed(&self, actor: &Actor, new: NewBed) -> EngineResult<Bed> {
        self.ctx.authorize(
            actor,
            Operation::ManageRegistry,
            ResourceContext::ward(new.ward_id),
        )?;

        let code = Code::new(&new.code)?;

        let result = self.ctx.store.transaction(|tx| {
            let ward = ward_in(tx.tables(), new.ward_id)?.clone();
            if !tx.tables().categories.contains_key(&new.category_id) {
                return Err(EngineError::not_found(
                    EntityKind::RoomCategory,
                    new.category_id,
                ));
            }
            if !ward.active {
                return Err(EngineError::transition(
                    EntityKind::Ward,
                    ward.id,
                    "inactive",
                    "register bed",
                ));
            }
            if tx.tables().bed_codes.contains_key(&code) {
                return Err(EngineError::DuplicateKey {
                    entity: EntityKind::Bed,
                    key: code.to_string(),
                });
            }

            let bed = Bed {
                id: BedId::new(),
                code: code.clone(),
                ward_id: ward.id,
                category_id: new.category_id,
                status: BedStatus::Vacant,
                current_patient: None,
                current_admission: None,
                admission_date: None,
                discharge_date: None,
                special_requirements: normalise(new.special_requirements),
                version: 0,
            };

            let mut ward = ward;
            ward.total_beds += 1;
            tx.put_ward(ward);
            tx.index_bed_code(code.clone(), bed.id);
            tx.put_bed(bed.clone());
            Ok(Change::created(bed))
        });

        let bed = self
            .ctx
            .audit
            .after(actor, &REGISTER_BED, self.ctx.now(), result)?;
        tracing::info!(bed = %bed.id, code = %bed.code, ward = %bed.ward_id, "registered bed");
        Ok(bed)
    }

    /// Moves a bed between `vacant`, `maintenance` and `reserved`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidInput`] if `status` is `occupied` (owned by admissions).
    /// - [`EngineError::InvalidTransition`] if the bed is currently occupied.
    pub fn set_bed_operational_status(
        &self,
        actor: &Actor,
        bed_id: BedId,
        status: BedStatus,
    ) -> EngineResult<Bed> {
        self.ctx
            .authorize(actor, Operation::ManageRegistry, ResourceContext::none())?;

        if status == BedStatus::Occupied {
            return Err(EngineError::InvalidInput(
                "beds become occupied only through an admission".into(),
            ));
        }

        let result = self.ctx.store.transaction(|tx| {
            let before = bed_in(tx.tables(), bed_id)?.clone();
            if before.status == BedStatus::Occupied {
                return Err(EngineError::transition(
                    EntityKind::Bed,
                    bed_id,
                    before.status,
                    format!("set status to {status}"),
                ));
            }

            let mut after = before.clone();
            after.status = status;
            after.version += 1;
            tx.put_bed(after.clone());
            Ok(Change::updated(before, after))
        });

        self.ctx
            .audit
            .after(actor, &SET_BED_STATUS, self.ctx.now(), result)
    }

    pub fn get_ward(&self, actor: &Actor, ward_id: WardId) -> EngineResult<Ward> {
        self.ctx
            .authorize(actor, Operation::ViewRegistry, ResourceContext::ward(ward_id))?;
        self.ctx
            .store
            .read(|t| ward_in(t, ward_id).cloned())
    }

    pub fn list_wards(&self, actor: &Actor) -> EngineResult<Vec<Ward>> {
        self.ctx
            .authorize(actor, Operation::ViewRegistry, ResourceContext::none())?;
        Ok(self
            .ctx
            .store
            .read(|t| t.wards.values().cloned().collect()))
    }

    pub fn list_room_categories(&self, actor: &Actor) -> EngineResult<Vec<RoomCategory>> {
        self.ctx
            .authorize(actor, Operation::ViewRegistry, ResourceContext::none())?;
        Ok(self
            .ctx
            .store
            .read(|t| t.categories.values().cloned().collect()))
    }

    pub fn get_bed(&self, actor: &Actor, bed_id: BedId) -> EngineResult<Bed> {
        self.ctx
            .authorize(actor, Operation::ViewRegistry, ResourceContext::none())?;
        self.ctx.store.read(|t| bed_in(t, bed_id).cloned())
    }

    /// Beds matching every supplied filter, ordered by bed code.
    pub fn query_beds(&self, actor: &Actor, filter: BedFilter) -> EngineResult<Vec<Bed>> {
        let context = filter
            .ward_id
            .map(ResourceContext::ward)
            .unwrap_or_default();
        self.ctx
            .authorize(actor, Operation::ViewRegistry, context)?;

        Ok(self.ctx.store.read(|t| {
            t.bed_codes
                .values()
                .filter_map(|id| t.beds.get(id))
                .filter(|b| filter.matches(b))
                .cloned()
                .collect()
        }))
    }

    /// Bed counts per status for every ward, including wards with no beds.
    pub fn ward_occupancy(&self, actor: &Actor) -> EngineResult<Vec<OccupancySummary>> {
        self.ctx
            .authorize(actor, Operation::ViewRegistry, ResourceContext::none())?;

        Ok(self.ctx.store.read(|t| {
            let mut summaries: BTreeMap<WardId, OccupancySummary> = t
                .wards
                .values()
                .map(|w| {
                    (
                        w.id,
                        OccupancySummary {
                            id: w.id.into(),
                            code: w.code.to_string(),
                            ..Default::default()
                        },
                    )
                })
                .collect();
            for bed in t.beds.values() {
                if let Some(summary) = summaries.get_mut(&bed.ward_id) {
                    summary.count(bed.status);
                }
            }
            let mut out: Vec<_> = summaries.into_values().collect();
            out.sort_by(|a, b| a.code.cmp(&b.code));
            out
        }))
    }

    /// Bed counts per status for every room category.
    pub fn category_occupancy(&self, actor: &Actor) -> EngineResult<Vec<OccupancySummary>> {
        self.ctx
            .authorize(actor, Operation::ViewRegistry, ResourceContext::none())?;

        Ok(self.ctx.store.read(|t| {
            let mut summaries: BTreeMap<RoomCategoryId, OccupancySummary> = t
                .categories
                .values()
                .map(|c| {
                    (
                        c.id,
                        OccupancySummary {
                            id: c.id.into(),
                            code: c.code.to_string(),
                            ..Default::default()
                        },
                    )
                })
                .collect();
            for bed in t.beds.values() {
                if let Some(summary) = summaries.get_mut(&bed.category_id) {
                    summary.count(bed.status);
                }
            }
            let mut out: Vec<_> = summaries.into_values().collect();
            out.sort_by(|a, b| a.code.cmp(&b.code));
            out
        }))
    }
}

// ============================================================================
// BED OCCUPANCY TRANSITIONS (admission manager only)
// ============================================================================

/// Marks a bed occupied by `admission_id`, provided it is still claimable and at
/// `expected_version`.
pub(crate) fn claim_bed(
    tx: &mut Transaction<'_>,
    bed_id: BedId,
    expected_version: u64,
    patient_id: PatientId,
    admission_id: AdmissionId,
    at: DateTime<Utc>,
) -> EngineResult<Bed> {
    let bed = bed_in(tx.tables(), bed_id)?.clone();

    if !bed.status.is_claimable() {
        return Err(EngineError::BedUnavailable {
            bed_id,
            status: bed.status.to_string(),
        });
    }
    if bed.version != expected_version {
        return Err(EngineError::StaleBed {
            bed_id,
            expected: expected_version,
            found: bed.version,
        });
    }

    let mut claimed = bed;
    claimed.status = BedStatus::Occupied;
    claimed.current_patient = Some(patient_id);
    claimed.current_admission = Some(admission_id);
    claimed.admission_date = Some(at);
    claimed.discharge_date = None;
    claimed.version += 1;
    tx.put_bed(claimed.clone());
    Ok(claimed)
}

/// Returns a bed held by `admission_id` to `vacant`.
pub(crate) fn release_bed(
    tx: &mut Transaction<'_>,
    bed_id: BedId,
    admission_id: AdmissionId,
    at: DateTime<Utc>,
) -> EngineResult<Bed> {
    let bed = bed_in(tx.tables(), bed_id)?.clone();

    if bed.status != BedStatus::Occupied || bed.current_admission != Some(admission_id) {
        return Err(EngineError::transition(
            EntityKind::Bed,
            bed_id,
            bed.status,
            format!("release for admission {admission_id}"),
        ));
    }

    let mut released = bed;
    released.status = BedStatus::Vacant;
    released.current_patient = None;
    released.current_admission = None;
    released.admission_date = None;
    released.discharge_date = Some(at);
    released.version += 1;
    tx.put_bed(released.clone());
    Ok(released)
}

pub(crate) fn ward_in(tables: &Tables, ward_id: WardId) -> EngineResult<&Ward> {
    tables
        .wards
        .get(&ward_id)
        .ok_or_else(|| EngineError::not_found(EntityKind::Ward, ward_id))
}

pub(crate) fn bed_in(tables: &Tables, bed_id: BedId) -> EngineResult<&Bed> {
    tables
        .beds
        .get(&bed_id)
        .ok_or_else(|| EngineError::not_found(EntityKind::Bed, bed_id))
}

fn normalise(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::TestEnv;

    #[test]
    fn test_register_bed_increments_ward_counter() {
        let env = TestEnv::new();
        let registry = env.engine.registry();
        let ward = env.ward("MED");
        let category = env.category("GEN");

        env.bed(&ward, &category, "B201");
        env.bed(&ward, &category, "B202");

        let ward = registry.get_ward(&env.admin, ward.id).unwrap();
        assert_eq!(ward.total_beds, 2);
    }

    #[test]
    fn test_register_bed_rejects_duplicate_code() {
        let env = TestEnv::new();
        let ward = env.ward("MED");
        let category = env.category("GEN");
        env.bed(&ward, &category, "B201");

        let err = env
            .engine
            .registry()
            .register_bed(
                &env.admin,
                NewBed {
                    code: "b201".into(),
                    ward_id: ward.id,
                    category_id: category.id,
                    special_requirements: None,
                },
            )
            .unwrap_err();

        assert!(matches!(err, EngineError::DuplicateKey { .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let ward = env.engine.registry().get_ward(&env.admin, ward.id).unwrap();
        assert_eq!(ward.total_beds, 1);
    }

    #[test]
    fn test_register_bed_requires_existing_category() {
        let env = TestEnv::new();
        let ward = env.ward("MED");

        let err = env
            .engine
            .registry()
            .register_bed(
                &env.admin,
                NewBed {
                    code: "B1".into(),
                    ward_id: ward.id,
                    category_id: RoomCategoryId::new(),
                    special_requirements: None,
                },
            )
            .unwrap_err();

        assert!(matches!(
            err,
            EngineError::NotFound {
                entity: EntityKind::RoomCategory,
                ..
            }
        ));
    }

    #[test]
    fn test_register_ward_rejects_duplicate_code() {
        let env = TestEnv::new();
        env.ward("ICU");

        let err = env
            .engine
            .registry()
            .register_ward(
                &env.admin,
                NewWard {
                    code: "icu".into(),
                    name: "Intensive care".into(),
                    floor: 2,
                    building: None,
                },
            )
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_set_bed_status_rejects_occupied_target() {
        let env = TestEnv::new();
        let (_, _, bed) = env.ward_with_bed("B201");

        let err = env
            .engine
            .registry()
            .set_bed_operational_status(&env.admin, bed.id, BedStatus::Occupied)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_set_bed_status_rejects_occupied_bed() {
        let env = TestEnv::new();
        let (ward, _, bed) = env.ward_with_bed("B201");
        env.admit(&ward, &bed);

        let err = env
            .engine
            .registry()
            .set_bed_operational_status(&env.admin, bed.id, BedStatus::Maintenance)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        let bed = env.engine.registry().get_bed(&env.admin, bed.id).unwrap();
        assert_eq!(bed.status, BedStatus::Occupied);
    }

    #[test]
    fn test_query_beds_filters_by_status_and_ward() {
        let env = TestEnv::new();
        let registry = env.engine.registry();
        let ward = env.ward("MED");
        let other = env.ward("SUR");
        let category = env.category("GEN");
        let b1 = env.bed(&ward, &category, "B1");
        env.bed(&ward, &category, "B2");
        env.bed(&other, &category, "S1");

        registry
            .set_bed_operational_status(&env.admin, b1.id, BedStatus::Maintenance)
            .unwrap();

        let vacant_in_med = registry
            .query_beds(
                &env.admin,
                BedFilter {
                    ward_id: Some(ward.id),
                    status: Some(BedStatus::Vacant),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(vacant_in_med.len(), 1);
        assert_eq!(vacant_in_med[0].code.as_str(), "B2");
        assert_eq!(
            registry
                .query_beds(&env.admin, BedFilter::default())
                .unwrap()
                .len(),
            3
        );
    }

    #[test]
    fn test_occupancy_summaries_count_each_status() {
        let env = TestEnv::new();
        let registry = env.engine.registry();
        let ward = env.ward("MED");
        let category = env.category("GEN");
        let b1 = env.bed(&ward, &category, "B1");
        let b2 = env.bed(&ward, &category, "B2");
        env.bed(&ward, &category, "B3");
        env.ward("EMPTY");

        env.admit(&ward, &b1);
        registry
            .set_bed_operational_status(&env.admin, b2.id, BedStatus::Reserved)
            .unwrap();

        let wards = registry.ward_occupancy(&env.admin).unwrap();
        assert_eq!(wards.len(), 2);
        let med = wards.iter().find(|s| s.code == "MED").unwrap();
        assert_eq!(
            (med.total, med.occupied, med.reserved, med.vacant),
            (3, 1, 1, 1)
        );
        let empty = wards.iter().find(|s| s.code == "EMPTY").unwrap();
        assert_eq!(empty.total, 0);

        let categories = registry.category_occupancy(&env.admin).unwrap();
        assert_eq!(categories[0].total, 3);
    }

    #[test]
    fn test_deactivate_ward_rejected_while_beds_occupied() {
        let env = TestEnv::new();
        let (ward, _, bed) = env.ward_with_bed("B201");
        let admission = env.admit(&ward, &bed);

        let err = env
            .engine
            .registry()
            .deactivate_ward(&env.admin, ward.id)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        env.engine
            .admissions()
            .discharge(&env.doctor, admission.id, "Recovered".into())
            .unwrap();
        let ward = env
            .engine
            .registry()
            .deactivate_ward(&env.admin, ward.id)
            .unwrap();
        assert!(!ward.active);
    }

    #[test]
    fn test_registry_changes_require_admin_role() {
        let env = TestEnv::new();
        let err = env
            .engine
            .registry()
            .register_ward(
                &env.nurse,
                NewWard {
                    code: "X".into(),
                    name: "X".into(),
                    floor: 0,
                    building: None,
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn test_register_ward_is_audited() {
        let env = TestEnv::new();
        env.ward("MED");
        assert!(env.audit.actions().contains(&"register_ward"));
    }
}
