//! Admission Manager.
//!
//! An admission links a patient to a bed for one continuous stay. Creating an admission and
//! claiming its bed commit together, as do terminating a stay (discharge, transfer, death) and
//! releasing the bed. Validation happens against a read snapshot; the bed is then claimed
//! under a version check so that a concurrent writer loses with a conflict instead of
//! overwriting the winner.

use crate::audit::{Change, OperationDescriptor};
use crate::engine::EngineContext;
use crate::error::{EngineError, EngineResult, EntityKind};
use crate::medication;
use crate::policy::{Actor, Operation, ResourceContext};
use crate::registry::{self, BedStatus};
use crate::store::{Tables, Transaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use ward_types::NonEmptyText;
use ward_uuid::{AdmissionId, BedId, CanonicalUuid, PatientId, UserId, WardId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionType {
    Emergency,
    Scheduled,
    Transfer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionStatus {
    Active,
    Discharged,
    Transferred,
    Deceased,
}

impl AdmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionStatus::Active => "active",
            AdmissionStatus::Discharged => "discharged",
            AdmissionStatus::Transferred => "transferred",
            AdmissionStatus::Deceased => "deceased",
        }
    }
}

impl fmt::Display for AdmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Admission {
    pub id: AdmissionId,
    pub patient_id: PatientId,
    pub bed_id: BedId,
    pub ward_id: WardId,
    pub admitted_at: DateTime<Utc>,
    pub discharged_at: Option<DateTime<Utc>>,
    pub admission_type: AdmissionType,
    pub attending_doctor: UserId,
    pub chief_complaint: NonEmptyText,
    pub admission_notes: Option<String>,
    pub discharge_notes: Option<String>,
    pub discharge_summary: Option<String>,
    pub status: AdmissionStatus,
    pub icu: bool,
    pub nicu: bool,
    pub transferred_from: Option<AdmissionId>,
    pub transferred_to: Option<AdmissionId>,
}

impl Admission {
    pub fn is_active(&self) -> bool {
        self.status == AdmissionStatus::Active
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AdmitRequest {
    pub patient_id: PatientId,
    pub bed_id: BedId,
    pub ward_id: WardId,
    pub attending_doctor: UserId,
    pub admission_type: AdmissionType,
    pub chief_complaint: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub icu: bool,
    #[serde(default)]
    pub nicu: bool,
    /// Bed version the caller last saw. When absent, the version read during validation is
    /// used.
    #[serde(default)]
    pub expected_bed_version: Option<u64>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TransferRequest {
    pub to_bed_id: BedId,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct AdmissionFilter {
    pub ward_id: Option<WardId>,
    pub patient_id: Option<PatientId>,
    pub status: Option<AdmissionStatus>,
}

impl AdmissionFilter {
    fn matches(&self, a: &Admission) -> bool {
        self.ward_id.is_none_or(|w| a.ward_id == w)
            && self.patient_id.is_none_or(|p| a.patient_id == p)
            && self.status.is_none_or(|s| a.status == s)
    }
}

fn admission_id_of(a: &Admission) -> CanonicalUuid {
    a.id.into()
}

const ADMIT: OperationDescriptor<Admission> = OperationDescriptor {
    entity: EntityKind::Admission,
    action: "admit",
    id_of: admission_id_of,
};
const DISCHARGE: OperationDescriptor<Admission> = OperationDescriptor {
    entity: EntityKind::Admission,
    action: "discharge",
    id_of: admission_id_of,
};
const TRANSFER_OUT: OperationDescriptor<Admission> = OperationDescriptor {
    entity: EntityKind::Admission,
    action: "transfer_out",
    id_of: admission_id_of,
};
const TRANSFER_IN: OperationDescriptor<Admission> = OperationDescriptor {
    entity: EntityKind::Admission,
    action: "transfer_in",
    id_of: admission_id_of,
};
const RECORD_DEATH: OperationDescriptor<Admission> = OperationDescriptor {
    entity: EntityKind::Admission,
    action: "record_death",
    id_of: admission_id_of,
};
const ANNOTATE_SUMMARY: OperationDescriptor<Admission> = OperationDescriptor {
    entity: EntityKind::Admission,
    action: "annotate_discharge_summary",
    id_of: admission_id_of,
};

#[derive(Clone)]
pub struct AdmissionService {
    ctx: Arc<EngineContext>,
}

impl AdmissionService {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Admits a patient to a bed.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if the patient, ward or bed does not exist.
    /// - [`EngineError::InvalidInput`] if the bed is not in the given ward.
    /// - [`EngineError::BedUnavailable`] if the bed is neither vacant nor reserved.
    /// - [`EngineError::StaleBed`] if the bed changed after it was validated.
    /// - [`EngineError::InvalidTransition`] if the ward is inactive or the patient is
    ///   already admitted elsewhere.
    pub fn admit(&self, actor: &Actor, request: AdmitRequest) -> EngineResult<Admission> {
        self.ctx.authorize(
            actor,
            Operation::Admit,
            ResourceContext::ward(request.ward_id),
        )?;

        let complaint = NonEmptyText::new(&request.chief_complaint)?;
        if !self.ctx.patients.contains(request.patient_id) {
            return Err(EngineError::not_found(
                EntityKind::Patient,
                request.patient_id,
            ));
        }

        let seen_version = self.ctx.store.read(|t| -> EngineResult<u64> {
            let ward = registry::ward_in(t, request.ward_id)?;
            let bed = registry::bed_in(t, request.bed_id)?;
            if bed.ward_id != ward.id {
                return Err(EngineError::InvalidInput(format!(
                    "bed {} does not belong to ward {}",
                    bed.code, ward.code
                )));
            }
            if !bed.status.is_claimable() {
                return Err(EngineError::BedUnavailable {
                    bed_id: bed.id,
                    status: bed.status.to_string(),
                });
            }
            Ok(bed.version)
        })?;
        let expected_version = request.expected_bed_version.unwrap_or(seen_version);

        let now = self.ctx.now();
        let result = self.ctx.store.transaction(|tx| {
            // Ward deactivation does not bump bed versions, so the claim cannot see it.
            let ward = registry::ward_in(tx.tables(), request.ward_id)?;
            if !ward.active {
                return Err(EngineError::transition(
                    EntityKind::Ward,
                    ward.id,
                    "inactive",
                    "admit patients",
                ));
            }
            if let Some(existing) = active_for_patient(tx.tables(), request.patient_id) {
                return Err(EngineError::transition(
                    EntityKind::Patient,
                    request.patient_id,
                    format!("already admitted under {}", existing.id),
                    "admit",
                ));
            }

            let admission = Admission {
                id: AdmissionId::new(),
                patient_id: request.patient_id,
                bed_id: request.bed_id,
                ward_id: request.ward_id,
                admitted_at: now,
                discharged_at: None,
                admission_type: request.admission_type,
                attending_doctor: request.attending_doctor,
                chief_complaint: complaint,
                admission_notes: normalise(request.notes),
                discharge_notes: None,
                discharge_summary: None,
                status: AdmissionStatus::Active,
                icu: request.icu,
                nicu: request.nicu,
                transferred_from: None,
                transferred_to: None,
            };
            tx.put_admission(admission.clone());
            registry::claim_bed(
                tx,
                request.bed_id,
                expected_version,
                request.patient_id,
                admission.id,
                now,
            )?;
            Ok(Change::created(admission))
        });

        let admission = self.ctx.audit.after(actor, &ADMIT, now, result)?;
        tracing::info!(
            admission = %admission.id,
            patient = %admission.patient_id,
            bed = %admission.bed_id,
            "admitted patient"
        );
        Ok(admission)
    }

    /// Discharges an active admission and releases its bed.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if the admission does not exist.
    /// - [`EngineError::InvalidTransition`] if the admission is no longer active.
    pub fn discharge(
        &self,
        actor: &Actor,
        admission_id: AdmissionId,
        summary: String,
    ) -> EngineResult<Admission> {
        self.ctx.authorize(
            actor,
            Operation::Discharge,
            ResourceContext::admission(admission_id),
        )?;

        let now = self.ctx.now();
        let result = self.ctx.store.transaction(|tx| {
            let (before, mut after) =
                terminate(tx, admission_id, AdmissionStatus::Discharged, "discharge", now)?;
            after.discharge_summary = normalise(Some(summary));
            tx.put_admission(after.clone());
            Ok(Change::updated(before, after))
        });

        let admission = self.ctx.audit.after(actor, &DISCHARGE, now, result)?;
        tracing::info!(admission = %admission.id, bed = %admission.bed_id, "discharged patient");
        Ok(admission)
    }

    /// Moves a patient to another bed.
    ///
    /// The current admission is closed as `transferred` and a new `transfer` admission is
    /// opened on the target bed. Returns the new admission.
    pub fn transfer(
        &self,
        actor: &Actor,
        admission_id: AdmissionId,
        request: TransferRequest,
    ) -> EngineResult<Admission> {
        self.ctx.authorize(
            actor,
            Operation::Transfer,
            ResourceContext::admission(admission_id),
        )?;

        let (target_ward, seen_version) =
            self.ctx.store.read(|t| -> EngineResult<(WardId, u64)> {
                let current = require_active(t, admission_id, "transfer")?;
                let bed = registry::bed_in(t, request.to_bed_id)?;
                if bed.id == current.bed_id {
                    return Err(EngineError::InvalidInput(
                        "transfer target is the patient's current bed".into(),
                    ));
                }
                let ward = registry::ward_in(t, bed.ward_id)?;
                if !ward.active {
                    return Err(EngineError::transition(
                        EntityKind::Ward,
                        ward.id,
                        "inactive",
                        "receive transfers",
                    ));
                }
                Ok((ward.id, bed.version))
            })?;

        let now = self.ctx.now();
        let notes = normalise(request.notes);
        let (closed, opened) = self.ctx.store.transaction(|tx| {
            let (before, mut after) =
                terminate(tx, admission_id, AdmissionStatus::Transferred, "transfer", now)?;

            let opened = Admission {
                id: AdmissionId::new(),
                bed_id: request.to_bed_id,
                ward_id: target_ward,
                admitted_at: now,
                discharged_at: None,
                admission_type: AdmissionType::Transfer,
                admission_notes: notes.clone(),
                discharge_notes: None,
                discharge_summary: None,
                status: AdmissionStatus::Active,
                transferred_from: Some(before.id),
                transferred_to: None,
                ..before.clone()
            };
            after.transferred_to = Some(opened.id);
            after.discharge_notes = notes.clone();
            tx.put_admission(after.clone());
            tx.put_admission(opened.clone());
            registry::claim_bed(
                tx,
                request.to_bed_id,
                seen_version,
                opened.patient_id,
                opened.id,
                now,
            )?;

            Ok((
                Change::updated(before, after),
                Change::created(opened).with_note(format!("transferred from {admission_id}")),
            ))
        })?;

        self.ctx.audit.after(actor, &TRANSFER_OUT, now, Ok(closed))?;
        let admission = self.ctx.audit.after(actor, &TRANSFER_IN, now, Ok(opened))?;
        tracing::info!(
            from = %admission_id,
            to = %admission.id,
            bed = %admission.bed_id,
            "transferred patient"
        );
        Ok(admission)
    }

    pub fn record_death(
        &self,
        actor: &Actor,
        admission_id: AdmissionId,
        notes: String,
    ) -> EngineResult<Admission> {
        self.ctx.authorize(
            actor,
            Operation::RecordDeath,
            ResourceContext::admission(admission_id),
        )?;

        let now = self.ctx.now();
        let result = self.ctx.store.transaction(|tx| {
            let (before, mut after) =
                terminate(tx, admission_id, AdmissionStatus::Deceased, "record death", now)?;
            after.discharge_notes = normalise(Some(notes));
            tx.put_admission(after.clone());
            Ok(Change::updated(before, after))
        });

        let admission = self.ctx.audit.after(actor, &RECORD_DEATH, now, result)?;
        tracing::info!(admission = %admission.id, "recorded death");
        Ok(admission)
    }

    /// Sets the discharge summary of a terminated admission. This is the only change a
    /// terminated admission accepts.
    pub fn annotate_discharge_summary(
        &self,
        actor: &Actor,
        admission_id: AdmissionId,
        summary: String,
    ) -> EngineResult<Admission> {
        self.ctx.authorize(
            actor,
            Operation::Discharge,
            ResourceContext::admission(admission_id),
        )?;

        let summary = NonEmptyText::new(summary)?;
        let now = self.ctx.now();
        let result = self.ctx.store.transaction(|tx| {
            let before = admission_in(tx.tables(), admission_id)?.clone();
            if before.is_active() {
                return Err(EngineError::transition(
                    EntityKind::Admission,
                    admission_id,
                    before.status,
                    "annotate discharge summary",
                ));
            }
            let mut after = before.clone();
            after.discharge_summary = Some(summary.into_string());
            tx.put_admission(after.clone());
            Ok(Change::updated(before, after))
        });

        self.ctx.audit.after(actor, &ANNOTATE_SUMMARY, now, result)
    }

    pub fn get(&self, actor: &Actor, admission_id: AdmissionId) -> EngineResult<Admission> {
        self.ctx.authorize(
            actor,
            Operation::ViewAdmissions,
            ResourceContext::admission(admission_id),
        )?;
        self.ctx
            .store
            .read(|t| admission_in(t, admission_id).cloned())
    }

    /// Admissions matching the filter, most recent first.
    pub fn list(&self, actor: &Actor, filter: AdmissionFilter) -> EngineResult<Vec<Admission>> {
        let context = filter
            .ward_id
            .map(ResourceContext::ward)
            .unwrap_or_default();
        self.ctx
            .authorize(actor, Operation::ViewAdmissions, context)?;

        let mut out: Vec<Admission> = self.ctx.store.read(|t| {
            t.admissions
                .values()
                .filter(|a| filter.matches(a))
                .cloned()
                .collect()
        });
        out.sort_by(|a, b| b.admitted_at.cmp(&a.admitted_at));
        Ok(out)
    }

    /// The active admission occupying `bed_id`, if any.
    pub fn active_admission_for_bed(
        &self,
        actor: &Actor,
        bed_id: BedId,
    ) -> EngineResult<Option<Admission>> {
        self.ctx
            .authorize(actor, Operation::ViewAdmissions, ResourceContext::none())?;

        self.ctx.store.read(|t| {
            let bed = registry::bed_in(t, bed_id)?;
            Ok(bed
                .current_admission
                .and_then(|id| t.admissions.get(&id))
                .filter(|a| a.is_active())
                .cloned())
        })
    }
}

/// Closes an active admission with `status`, releases its bed and completes its medication
/// schedules. Returns the before and after images; the after image is already written.
fn terminate(
    tx: &mut Transaction<'_>,
    admission_id: AdmissionId,
    status: AdmissionStatus,
    attempted: &str,
    at: DateTime<Utc>,
) -> EngineResult<(Admission, Admission)> {
    let before = require_active(tx.tables(), admission_id, attempted)?.clone();

    let mut after = before.clone();
    after.status = status;
    after.discharged_at = Some(at);
    tx.put_admission(after.clone());

    registry::release_bed(tx, before.bed_id, admission_id, at)?;
    let completed = medication::complete_schedules_for_admission(tx, admission_id)?;
    if completed > 0 {
        tracing::debug!(admission = %admission_id, completed, "completed medication schedules");
    }
    Ok((before, after))
}

pub(crate) fn admission_in(tables: &Tables, admission_id: AdmissionId) -> EngineResult<&Admission> {
    tables
        .admissions
        .get(&admission_id)
        .ok_or_else(|| EngineError::not_found(EntityKind::Admission, admission_id))
}

/// Looks up an admission that must still be active for `attempted` to proceed.
pub(crate) fn require_active<'t>(
    tables: &'t Tables,
    admission_id: AdmissionId,
    attempted: &str,
) -> EngineResult<&'t Admission> {
    let admission = admission_in(tables, admission_id)?;
    if !admission.is_active() {
        return Err(EngineError::transition(
            EntityKind::Admission,
            admission_id,
            admission.status,
            attempted,
        ));
    }
    Ok(admission)
}

fn active_for_patient(tables: &Tables, patient_id: PatientId) -> Option<&Admission> {
    tables
        .admissions
        .values()
        .find(|a| a.patient_id == patient_id && a.is_active())
}

/// Checks that every occupied bed is held by exactly one active admission and vice versa.
#[cfg(test)]
pub(crate) fn occupancy_is_consistent(tables: &Tables) -> bool {
    tables.beds.values().all(|bed| {
        let active: Vec<_> = tables
            .admissions
            .values()
            .filter(|a| a.bed_id == bed.id && a.is_active())
            .collect();
        match bed.status {
            BedStatus::Occupied => {
                active.len() == 1
                    && bed.current_patient == Some(active[0].patient_id)
                    && bed.current_admission == Some(active[0].id)
            }
            _ => active.is_empty() && bed.current_patient.is_none(),
        }
    })
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
    fn test_admit_occupies_bed() {
        let env = TestEnv::new();
        let (ward, _, bed) = env.ward_with_bed("B201");

        let admission = env.admit(&ward, &bed);

        assert!(admission.is_active());
        let bed = env.engine.registry().get_bed(&env.admin, bed.id).unwrap();
        assert_eq!(bed.status, BedStatus::Occupied);
        assert_eq!(bed.current_patient, Some(admission.patient_id));
        assert_eq!(bed.admission_date, Some(admission.admitted_at));
        assert!(env.occupancy_is_consistent());
    }

    #[test]
    fn test_admit_rejects_unknown_patient() {
        let env = TestEnv::new();
        let (ward, _, bed) = env.ward_with_bed("B201");

        let err = env
            .engine
            .admissions()
            .admit(&env.admin, env.admit_request(PatientId::new(), &ward, &bed))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_admit_rejects_bed_from_other_ward() {
        let env = TestEnv::new();
        let (_, _, bed) = env.ward_with_bed("B201");
        let other = env.ward("SUR");
        let patient = env.patient();

        let err = env
            .engine
            .admissions()
            .admit(&env.admin, env.admit_request(patient, &other, &bed))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_admit_rejects_bed_under_maintenance() {
        let env = TestEnv::new();
        let (ward, _, bed) = env.ward_with_bed("B201");
        env.engine
            .registry()
            .set_bed_operational_status(&env.admin, bed.id, BedStatus::Maintenance)
            .unwrap();
        let patient = env.patient();

        let err = env
            .engine
            .admissions()
            .admit(&env.admin, env.admit_request(patient, &ward, &bed))
            .unwrap_err();

        assert!(matches!(err, EngineError::BedUnavailable { .. }));
        let admissions = env
            .engine
            .admissions()
            .list(&env.admin, AdmissionFilter::default())
            .unwrap();
        assert!(admissions.is_empty());
    }

    #[test]
    fn test_admit_accepts_reserved_bed() {
        let env = TestEnv::new();
        let (ward, _, bed) = env.ward_with_bed("B201");
        env.engine
            .registry()
            .set_bed_operational_status(&env.admin, bed.id, BedStatus::Reserved)
            .unwrap();

        env.admit(&ward, &bed);

        assert!(env.occupancy_is_consistent());
    }

    #[test]
    fn test_stale_bed_version_rolls_back_admission() {
        let env = TestEnv::new();
        let (ward, _, bed) = env.ward_with_bed("B201");
        let patient = env.patient();
        let mut request = env.admit_request(patient, &ward, &bed);
        request.expected_bed_version = Some(bed.version + 7);

        let err = env
            .engine
            .admissions()
            .admit(&env.admin, request)
            .unwrap_err();

        assert!(matches!(err, EngineError::StaleBed { .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let admissions = env
            .engine
            .admissions()
            .list(&env.admin, AdmissionFilter::default())
            .unwrap();
        assert!(admissions.is_empty());
        let bed = env.engine.registry().get_bed(&env.admin, bed.id).unwrap();
        assert_eq!(bed.status, BedStatus::Vacant);
    }

    #[test]
    fn test_admit_into_deactivated_ward_with_known_bed_version_is_rejected() {
        let env = TestEnv::new();
        let (ward, _, bed) = env.ward_with_bed("B201");
        let patient = env.patient();
        let mut request = env.admit_request(patient, &ward, &bed);
        request.expected_bed_version = Some(bed.version);

        env.engine
            .registry()
            .deactivate_ward(&env.admin, ward.id)
            .unwrap();
        let err = env
            .engine
            .admissions()
            .admit(&env.admin, request)
            .unwrap_err();

        assert!(matches!(
            err,
            EngineError::InvalidTransition {
                entity: EntityKind::Ward,
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let admissions = env
            .engine
            .admissions()
            .list(&env.admin, AdmissionFilter::default())
            .unwrap();
        assert!(admissions.is_empty());
        let bed = env.engine.registry().get_bed(&env.admin, bed.id).unwrap();
        assert_eq!(bed.status, BedStatus::Vacant);
        assert_eq!(bed.current_admission, None);
    }

    #[test]
    fn test_patient_cannot_hold_two_active_admissions() {
        let env = TestEnv::new();
        let ward = env.ward("MED");
        let category = env.category("GEN");
        let b1 = env.bed(&ward, &category, "B1");
        let b2 = env.bed(&ward, &category, "B2");
        let first = env.admit(&ward, &b1);

        let err = env
            .engine
            .admissions()
            .admit(&env.admin, env.admit_request(first.patient_id, &ward, &b2))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        let b2 = env.engine.registry().get_bed(&env.admin, b2.id).unwrap();
        assert_eq!(b2.status, BedStatus::Vacant);
    }

    #[test]
    fn test_concurrent_admissions_to_same_bed_admit_exactly_one() {
        let env = TestEnv::new();
        let (ward, _, bed) = env.ward_with_bed("B305");
        let patients: Vec<_> = (0..8).map(|_| env.patient()).collect();

        let results: Vec<EngineResult<Admission>> = std::thread::scope(|s| {
            let handles: Vec<_> = patients
                .iter()
                .map(|&patient| {
                    let request = env.admit_request(patient, &ward, &bed);
                    let admissions = env.engine.admissions();
                    let admin = env.admin;
                    s.spawn(move || admissions.admit(&admin, request))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("admit thread panicked"))
                .collect()
        });

        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(err.kind(), ErrorKind::Conflict);
        }

        let active = env
            .engine
            .admissions()
            .list(
                &env.admin,
                AdmissionFilter {
                    status: Some(AdmissionStatus::Active),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].bed_id, bed.id);
        assert!(env.occupancy_is_consistent());
    }

    #[test]
    fn test_discharge_returns_bed_to_vacant() {
        let env = TestEnv::new();
        let (ward, _, bed) = env.ward_with_bed("B201");
        let admission = env.admit(&ward, &bed);
        let order = env.medication_order(&admission, "twice daily", Some(3));
        env.schedule(&order);
        env.engine
            .vitals()
            .record_vitals(&env.nurse, env.vitals_request(&admission, false))
            .unwrap();

        let discharged = env
            .engine
            .admissions()
            .discharge(&env.doctor, admission.id, "Recovered well".into())
            .unwrap();

        assert_eq!(discharged.status, AdmissionStatus::Discharged);
        assert_eq!(discharged.discharge_summary.as_deref(), Some("Recovered well"));
        assert!(discharged.discharged_at.is_some());
        let bed = env.engine.registry().get_bed(&env.admin, bed.id).unwrap();
        assert_eq!(bed.status, BedStatus::Vacant);
        assert!(bed.current_patient.is_none());
        assert!(bed.admission_date.is_none());
        assert!(env.occupancy_is_consistent());
    }

    #[test]
    fn test_discharge_twice_is_conflict() {
        let env = TestEnv::new();
        let (ward, _, bed) = env.ward_with_bed("B201");
        let admission = env.admit(&ward, &bed);
        let admissions = env.engine.admissions();
        admissions
            .discharge(&env.doctor, admission.id, String::new())
            .unwrap();

        let err = admissions
            .discharge(&env.doctor, admission.id, String::new())
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("discharged"));
    }

    #[test]
    fn test_discharge_unknown_admission_is_not_found() {
        let env = TestEnv::new();
        let err = env
            .engine
            .admissions()
            .discharge(&env.doctor, AdmissionId::new(), String::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_transfer_moves_patient_and_releases_old_bed() {
        let env = TestEnv::new();
        let ward = env.ward("MED");
        let icu = env.ward("ICU");
        let category = env.category("GEN");
        let from = env.bed(&ward, &category, "B1");
        let to = env.bed(&icu, &category, "I1");
        let admission = env.admit(&ward, &from);

        let moved = env
            .engine
            .admissions()
            .transfer(
                &env.doctor,
                admission.id,
                TransferRequest {
                    to_bed_id: to.id,
                    notes: Some("Needs ventilation".into()),
                },
            )
            .unwrap();

        assert_eq!(moved.admission_type, AdmissionType::Transfer);
        assert_eq!(moved.ward_id, icu.id);
        assert_eq!(moved.transferred_from, Some(admission.id));
        assert_eq!(moved.patient_id, admission.patient_id);

        let old = env.engine.admissions().get(&env.admin, admission.id).unwrap();
        assert_eq!(old.status, AdmissionStatus::Transferred);
        assert_eq!(old.transferred_to, Some(moved.id));

        let registry = env.engine.registry();
        assert_eq!(
            registry.get_bed(&env.admin, from.id).unwrap().status,
            BedStatus::Vacant
        );
        assert_eq!(
            registry.get_bed(&env.admin, to.id).unwrap().current_admission,
            Some(moved.id)
        );
        assert!(env.occupancy_is_consistent());
        assert!(env.audit.actions().contains(&"transfer_in"));
    }

    #[test]
    fn test_transfer_to_occupied_bed_changes_nothing() {
        let env = TestEnv::new();
        let ward = env.ward("MED");
        let category = env.category("GEN");
        let b1 = env.bed(&ward, &category, "B1");
        let b2 = env.bed(&ward, &category, "B2");
        let first = env.admit(&ward, &b1);
        env.admit(&ward, &b2);

        let err = env
            .engine
            .admissions()
            .transfer(
                &env.doctor,
                first.id,
                TransferRequest {
                    to_bed_id: b2.id,
                    notes: None,
                },
            )
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        let first = env.engine.admissions().get(&env.admin, first.id).unwrap();
        assert!(first.is_active());
        assert!(env.occupancy_is_consistent());
    }

    #[test]
    fn test_record_death_releases_bed() {
        let env = TestEnv::new();
        let (ward, _, bed) = env.ward_with_bed("B201");
        let admission = env.admit(&ward, &bed);

        let closed = env
            .engine
            .admissions()
            .record_death(&env.doctor, admission.id, "Cardiac arrest".into())
            .unwrap();

        assert_eq!(closed.status, AdmissionStatus::Deceased);
        let found = env
            .engine
            .admissions()
            .active_admission_for_bed(&env.admin, bed.id)
            .unwrap();
        assert!(found.is_none());
        assert!(env.occupancy_is_consistent());
    }

    #[test]
    fn test_discharge_summary_annotation_requires_terminated_stay() {
        let env = TestEnv::new();
        let (ward, _, bed) = env.ward_with_bed("B201");
        let admission = env.admit(&ward, &bed);
        let admissions = env.engine.admissions();

        let err = admissions
            .annotate_discharge_summary(&env.doctor, admission.id, "Summary".into())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        admissions
            .discharge(&env.doctor, admission.id, String::new())
            .unwrap();
        let annotated = admissions
            .annotate_discharge_summary(&env.doctor, admission.id, "Follow up in 2 weeks".into())
            .unwrap();
        assert_eq!(
            annotated.discharge_summary.as_deref(),
            Some("Follow up in 2 weeks")
        );
    }

    #[test]
    fn test_active_admission_for_bed_finds_occupant() {
        let env = TestEnv::new();
        let (ward, _, bed) = env.ward_with_bed("B201");
        let admission = env.admit(&ward, &bed);

        let found = env
            .engine
            .admissions()
            .active_admission_for_bed(&env.nurse, bed.id)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, admission.id);
    }
}
