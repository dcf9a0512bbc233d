use super::{
    administration_in, insert_pending, schedule_in, AdministrationStatus, DoseDetails,
    MedicationAdministration, MedicationSchedule, MedicationService, Route, ScheduleStatus,
    Verification,
};
use crate::admissions;
use crate::audit::{Change, OperationDescriptor};
use crate::error::{EngineError, EngineResult, EntityKind};
use crate::policy::{Actor, Operation, ResourceContext};
use crate::store::Transaction;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ward_uuid::{AdministrationId, AdmissionId, BedId, CanonicalUuid, ScheduleId, WardId};

/// Identifies the dose being acted on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseTarget {
    /// A due instant of the schedule. Created if it has not been materialized yet.
    DueAt(DateTime<Utc>),
    /// An existing pending record.
    Record(AdministrationId),
}

#[derive(Clone, Debug, Deserialize)]
pub struct ExecuteRequest {
    pub target: DoseTarget,
    /// Defaults to the prescribed dosage and unit.
    #[serde(default)]
    pub dosage: Option<String>,
    /// Defaults to the prescribed route.
    #[serde(default)]
    pub route: Option<Route>,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub batch_number: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub side_effects: Vec<String>,
}

impl ExecuteRequest {
    pub fn for_instant(due_at: DateTime<Utc>) -> Self {
        Self::new(DoseTarget::DueAt(due_at))
    }

    pub fn for_record(id: AdministrationId) -> Self {
        Self::new(DoseTarget::Record(id))
    }

    fn new(target: DoseTarget) -> Self {
        Self {
            target,
            dosage: None,
            route: None,
            site: None,
            batch_number: None,
            expiry_date: None,
            notes: None,
            side_effects: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct OmissionRequest {
    pub target: DoseTarget,
    /// One of `refused`, `held`, `delayed` or `not_given`.
    pub status: AdministrationStatus,
    pub reason: String,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct AdministrationFilter {
    pub schedule_id: Option<ScheduleId>,
    pub admission_id: Option<AdmissionId>,
    pub status: Option<AdministrationStatus>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct OverdueFilter {
    pub ward_id: Option<WardId>,
    pub admission_id: Option<AdmissionId>,
}

/// A pending dose whose due instant has passed.
#[derive(Clone, Debug, Serialize)]
pub struct OverdueTask {
    pub administration: MedicationAdministration,
    pub medication: String,
    pub ward_id: WardId,
    pub bed_id: BedId,
    pub overdue_minutes: i64,
}

fn administration_id_of(a: &MedicationAdministration) -> CanonicalUuid {
    a.id.into()
}

const EXECUTE: OperationDescriptor<MedicationAdministration> = OperationDescriptor {
    entity: EntityKind::MedicationAdministration,
    action: "execute_medication",
    id_of: administration_id_of,
};
const OMIT: OperationDescriptor<MedicationAdministration> = OperationDescriptor {
    entity: EntityKind::MedicationAdministration,
    action: "record_omission",
    id_of: administration_id_of,
};
const VERIFY: OperationDescriptor<MedicationAdministration> = OperationDescriptor {
    entity: EntityKind::MedicationAdministration,
    action: "verify_administration",
    id_of: administration_id_of,
};

impl MedicationService {
    /// Records a dose as given by the acting nurse.
    ///
    /// Late administration is allowed; the record then reports
    /// [`MedicationAdministration::was_overdue_at_execution`].
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if the schedule or record does not exist.
    /// - [`EngineError::InvalidInput`] if the instant is not on the schedule, lies beyond the
    ///   materialization window, the record belongs to another schedule, or the batch expired.
    /// - [`EngineError::InvalidTransition`] if the schedule or admission is not active, or the
    ///   dose is no longer pending.
    pub fn execute_medication(
        &self,
        actor: &Actor,
        schedule_id: ScheduleId,
        request: ExecuteRequest,
    ) -> EngineResult<MedicationAdministration> {
        self.ctx
            .authorize(actor, Operation::AdministerMedication, ResourceContext::none())?;

        let now = self.ctx.now();
        if let Some(expiry) = request.expiry_date {
            if expiry < now.date_naive() {
                return Err(EngineError::InvalidInput(format!(
                    "batch expired on {expiry}"
                )));
            }
        }
        self.materialize_on_demand(actor, Some(schedule_id), now)?;

        let result = self.ctx.store.transaction(|tx| {
            let (schedule, before) =
                self.pending_dose(tx, schedule_id, request.target, "administer", now)?;

            let mut after = before.clone();
            after.status = AdministrationStatus::Administered;
            after.administered_at = Some(now);
            after.administered_by = Some(actor.id);
            after.dose = Some(DoseDetails {
                dosage: request
                    .dosage
                    .clone()
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| {
                        format!("{} {}", schedule.dosage, schedule.unit)
                            .trim()
                            .to_string()
                    }),
                route: request.route.unwrap_or(schedule.route),
                site: trimmed(request.site.clone()),
                batch_number: trimmed(request.batch_number.clone()),
                expiry_date: request.expiry_date,
            });
            after.nurse_notes = trimmed(request.notes.clone());
            after.side_effects = request
                .side_effects
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            tx.put_administration(after.clone());

            Ok(Change::updated(before, after).with_note(schedule.label()))
        });

        let record = self.ctx.audit.after(actor, &EXECUTE, now, result)?;
        tracing::info!(
            administration = %record.id,
            schedule = %record.schedule_id,
            due_at = %record.due_at,
            late = record.was_overdue_at_execution(),
            "medication administered"
        );
        Ok(record)
    }

    /// Records a dose as not given. Other due instants are unaffected.
    pub fn skip_medication(
        &self,
        actor: &Actor,
        schedule_id: ScheduleId,
        due_at: DateTime<Utc>,
        reason: String,
    ) -> EngineResult<MedicationAdministration> {
        self.record_omission(
            actor,
            schedule_id,
            OmissionRequest {
                target: DoseTarget::DueAt(due_at),
                status: AdministrationStatus::NotGiven,
                reason,
            },
        )
    }

    /// Closes a pending dose with a non-administered outcome and its reason.
    pub fn record_omission(
        &self,
        actor: &Actor,
        schedule_id: ScheduleId,
        request: OmissionRequest,
    ) -> EngineResult<MedicationAdministration> {
        self.ctx
            .authorize(actor, Operation::AdministerMedication, ResourceContext::none())?;

        if !request.status.is_omission() {
            return Err(EngineError::InvalidInput(format!(
                "{} is not an omission outcome",
                request.status
            )));
        }
        let reason = ward_types::NonEmptyText::new(&request.reason)?;

        let now = self.ctx.now();
        self.materialize_on_demand(actor, Some(schedule_id), now)?;

        let result = self.ctx.store.transaction(|tx| {
            let attempted = format!("record as {}", request.status);
            let (schedule, before) =
                self.pending_dose(tx, schedule_id, request.target, &attempted, now)?;

            let mut after = before.clone();
            after.status = request.status;
            after.administered_at = Some(now);
            after.administered_by = Some(actor.id);
            after.omission_reason = Some(reason.into_string());
            tx.put_administration(after.clone());

            Ok(Change::updated(before, after).with_note(schedule.label()))
        });

        let record = self.ctx.audit.after(actor, &OMIT, now, result)?;
        tracing::info!(
            administration = %record.id,
            status = %record.status,
            "medication omission recorded"
        );
        Ok(record)
    }

    /// Second-person check of an administered dose. Rejection does not undo the
    /// administration; it is kept for quality review.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidTransition`] if the record is not administered or has already
    ///   been verified.
    /// - [`EngineError::InvalidInput`] if the verifier administered the dose.
    pub fn verify_administration(
        &self,
        actor: &Actor,
        administration_id: AdministrationId,
        accepted: bool,
        notes: Option<String>,
    ) -> EngineResult<MedicationAdministration> {
        self.ctx
            .authorize(actor, Operation::VerifyAdministration, ResourceContext::none())?;

        let now = self.ctx.now();
        let result = self.ctx.store.transaction(|tx| {
            let before = administration_in(tx.tables(), administration_id)?.clone();
            if before.status != AdministrationStatus::Administered {
                return Err(EngineError::transition(
                    EntityKind::MedicationAdministration,
                    administration_id,
                    before.status,
                    "verify",
                ));
            }
            if before.verification.is_some() {
                return Err(EngineError::transition(
                    EntityKind::MedicationAdministration,
                    administration_id,
                    "already verified",
                    "verify",
                ));
            }
            if before.administered_by == Some(actor.id) {
                return Err(EngineError::InvalidInput(
                    "a dose must be verified by someone other than the administering nurse"
                        .into(),
                ));
            }

            let mut after = before.clone();
            after.verification = Some(Verification {
                verified_by: actor.id,
                verified_at: now,
                accepted,
                notes: trimmed(notes),
            });
            tx.put_administration(after.clone());
            Ok(Change::updated(before, after))
        });

        let record = self.ctx.audit.after(actor, &VERIFY, now, result)?;
        if !accepted {
            tracing::warn!(administration = %record.id, "administration verification rejected");
        }
        Ok(record)
    }

    pub fn get_administration(
        &self,
        actor: &Actor,
        administration_id: AdministrationId,
    ) -> EngineResult<MedicationAdministration> {
        self.ctx
            .authorize(actor, Operation::ViewMedication, ResourceContext::none())?;
        self.ctx
            .store
            .read(|t| administration_in(t, administration_id).cloned())
    }

    /// Administration records matching the filter, ordered by due instant.
    pub fn list_administrations(
        &self,
        actor: &Actor,
        filter: AdministrationFilter,
    ) -> EngineResult<Vec<MedicationAdministration>> {
        let context = filter
            .admission_id
            .map(ResourceContext::admission)
            .unwrap_or_default();
        self.ctx
            .authorize(actor, Operation::ViewMedication, context)?;

        let mut out: Vec<MedicationAdministration> = self.ctx.store.read(|t| {
            t.administrations
                .values()
                .filter(|a| filter.schedule_id.is_none_or(|s| a.schedule_id == s))
                .filter(|a| filter.admission_id.is_none_or(|id| a.admission_id == id))
                .filter(|a| filter.status.is_none_or(|s| a.status == s))
                .cloned()
                .collect()
        });
        out.sort_by(|a, b| a.due_at.cmp(&b.due_at).then(a.schedule_id.cmp(&b.schedule_id)));
        Ok(out)
    }

    /// Pending doses of active schedules on active stays whose due instant has passed,
    /// most overdue first. Runs the materializer first so that missed instants are included.
    pub fn list_overdue(
        &self,
        actor: &Actor,
        filter: OverdueFilter,
    ) -> EngineResult<Vec<OverdueTask>> {
        let context = ResourceContext {
            ward_id: filter.ward_id,
            admission_id: filter.admission_id,
        };
        self.ctx
            .authorize(actor, Operation::ViewMedication, context)?;

        let now = self.ctx.now();
        self.materialize_on_demand(actor, None, now)?;

        let mut out: Vec<OverdueTask> = self.ctx.store.read(|t| {
            t.administrations
                .values()
                .filter(|a| a.is_overdue(now))
                .filter(|a| filter.admission_id.is_none_or(|id| a.admission_id == id))
                .filter_map(|a| {
                    let schedule = t.schedules.get(&a.schedule_id)?;
                    let admission = t.admissions.get(&a.admission_id)?;
                    if schedule.status != ScheduleStatus::Active || !admission.is_active() {
                        return None;
                    }
                    if filter.ward_id.is_some_and(|w| admission.ward_id != w) {
                        return None;
                    }
                    Some(OverdueTask {
                        administration: a.clone(),
                        medication: schedule.label(),
                        ward_id: admission.ward_id,
                        bed_id: admission.bed_id,
                        overdue_minutes: (now - a.due_at).num_minutes(),
                    })
                })
                .collect()
        });
        out.sort_by(|a, b| a.administration.due_at.cmp(&b.administration.due_at));
        Ok(out)
    }

    /// Whether the dose was acted on after its due instant had already passed.
    pub fn was_overdue_at_execution(
        &self,
        actor: &Actor,
        administration_id: AdministrationId,
    ) -> EngineResult<bool> {
        Ok(self
            .get_administration(actor, administration_id)?
            .was_overdue_at_execution())
    }

    /// Materializer run triggered by a read or an execute/skip call, audited under the caller.
    fn materialize_on_demand(
        &self,
        actor: &Actor,
        schedule_id: Option<ScheduleId>,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        for (schedule, count) in self.materialize(schedule_id, now)? {
            self.ctx.audit.after(
                actor,
                &super::schedules::MATERIALIZE,
                now,
                Ok(Change::created(schedule).with_note(format!("{count} task(s) materialized"))),
            )?;
        }
        Ok(())
    }

    /// Locates the pending record for `target`, creating it for a due instant that has no
    /// record yet.
    fn pending_dose(
        &self,
        tx: &mut Transaction<'_>,
        schedule_id: ScheduleId,
        target: DoseTarget,
        attempted: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<(MedicationSchedule, MedicationAdministration)> {
        let schedule = schedule_in(tx.tables(), schedule_id)?.clone();
        if schedule.status != ScheduleStatus::Active {
            return Err(EngineError::transition(
                EntityKind::MedicationSchedule,
                schedule_id,
                schedule.status,
                attempted,
            ));
        }
        admissions::require_active(tx.tables(), schedule.admission_id, attempted)?;

        let record = match target {
            DoseTarget::Record(id) => {
                let record = administration_in(tx.tables(), id)?.clone();
                if record.schedule_id != schedule_id {
                    return Err(EngineError::InvalidInput(format!(
                        "administration {id} does not belong to schedule {schedule_id}"
                    )));
                }
                record
            }
            DoseTarget::DueAt(due_at) => {
                if !schedule.is_due_instant(due_at) {
                    return Err(EngineError::InvalidInput(format!(
                        "{due_at} is not a due instant of schedule {schedule_id} ({})",
                        schedule.frequency
                    )));
                }
                if due_at > self.horizon(now) {
                    return Err(EngineError::InvalidInput(format!(
                        "{due_at} is beyond the current administration window"
                    )));
                }
                match tx.tables().dose_index.get(&(schedule_id, due_at)).copied() {
                    Some(id) => administration_in(tx.tables(), id)?.clone(),
                    None => insert_pending(tx, &schedule, due_at, now),
                }
            }
        };

        if record.status != AdministrationStatus::Pending {
            return Err(EngineError::transition(
                EntityKind::MedicationAdministration,
                record.id,
                record.status,
                attempted,
            ));
        }
        Ok((schedule, record))
    }
}

fn trimmed(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}
