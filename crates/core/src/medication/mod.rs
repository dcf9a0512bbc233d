//! Medication Task Scheduler/Executor.
//!
//! A [`MedicationSchedule`] is created from an approved medication order and carries a
//! [`Frequency`]. The materializer expands the frequency into due instants and writes one
//! `pending` [`MedicationAdministration`] per `(schedule, due instant)` up to
//! `now + materialization window`, including instants already in the past so that missed
//! doses surface as overdue. Re-running it never creates duplicates.
//!
//! Each administration record moves exactly once out of `pending`:
//!
//! ```text
//! pending ──> administered | refused | held | delayed | not_given
//! ```
//!
//! After that it is append-only: the only further change is the optional verification stamp
//! on an administered record.

mod frequency;
mod schedules;
mod tasks;

pub use frequency::{Frequency, FrequencyError};
pub use schedules::NewSchedule;
pub use tasks::{
    AdministrationFilter, DoseTarget, ExecuteRequest, OmissionRequest, OverdueFilter,
    OverdueTask,
};

use crate::engine::EngineContext;
use crate::error::{EngineError, EngineResult, EntityKind};
use crate::orders::OrderStatus;
use crate::store::{Tables, Transaction};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use ward_types::NonEmptyText;
use ward_uuid::{AdministrationId, AdmissionId, OrderId, ScheduleId, UserId};

// ============================================================================
// SCHEDULES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Oral,
    Intravenous,
    Intramuscular,
    Subcutaneous,
    Sublingual,
    Topical,
    Inhaled,
    Rectal,
    Nasogastric,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Oral => "oral",
            Route::Intravenous => "intravenous",
            Route::Intramuscular => "intramuscular",
            Route::Subcutaneous => "subcutaneous",
            Route::Sublingual => "sublingual",
            Route::Topical => "topical",
            Route::Inhaled => "inhaled",
            Route::Rectal => "rectal",
            Route::Nasogastric => "nasogastric",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Active => "active",
            ScheduleStatus::Paused => "paused",
            ScheduleStatus::Completed => "completed",
            ScheduleStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScheduleStatus::Completed | ScheduleStatus::Cancelled)
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra observations the prescriber wants taken around each dose.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringFlags {
    pub high_alert: bool,
    pub blood_pressure: bool,
    pub heart_rate: bool,
    pub blood_glucose: bool,
    pub pain_score: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct MedicationSchedule {
    pub id: ScheduleId,
    pub order_id: OrderId,
    pub admission_id: AdmissionId,
    pub medication_name: NonEmptyText,
    pub dosage: NonEmptyText,
    pub unit: String,
    pub route: Route,
    pub frequency: Frequency,
    pub starts_at: DateTime<Utc>,
    /// Resolved exclusive end: the explicit end, or start plus the duration.
    pub ends_at: Option<DateTime<Utc>>,
    pub duration_days: Option<u32>,
    pub instructions: Option<String>,
    pub monitoring: MonitoringFlags,
    pub prescribed_by: UserId,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
}

impl MedicationSchedule {
    /// Every due instant of the schedule up to `horizon`.
    pub fn due_instants(&self, horizon: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        self.frequency
            .due_instants(self.starts_at, self.ends_at, horizon)
    }

    pub fn is_due_instant(&self, instant: DateTime<Utc>) -> bool {
        self.frequency
            .is_due_instant(self.starts_at, self.ends_at, instant)
    }

    /// "Paracetamol 500 mg oral", for audit notes and notifications.
    pub fn label(&self) -> String {
        let mut label = format!("{} {}", self.medication_name, self.dosage);
        if !self.unit.is_empty() {
            label.push(' ');
            label.push_str(&self.unit);
        }
        label.push(' ');
        label.push_str(self.route.as_str());
        label
    }
}

// ============================================================================
// ADMINISTRATIONS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdministrationStatus {
    Pending,
    Administered,
    Refused,
    Held,
    Delayed,
    NotGiven,
}

impl AdministrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdministrationStatus::Pending => "pending",
            AdministrationStatus::Administered => "administered",
            AdministrationStatus::Refused => "refused",
            AdministrationStatus::Held => "held",
            AdministrationStatus::Delayed => "delayed",
            AdministrationStatus::NotGiven => "not_given",
        }
    }

    /// A terminal outcome other than administration.
    pub fn is_omission(&self) -> bool {
        matches!(
            self,
            AdministrationStatus::Refused
                | AdministrationStatus::Held
                | AdministrationStatus::Delayed
                | AdministrationStatus::NotGiven
        )
    }
}

impl fmt::Display for AdministrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What was actually given. Recorded only on administration.
#[derive(Clone, Debug, Serialize)]
pub struct DoseDetails {
    pub dosage: String,
    pub route: Route,
    pub site: Option<String>,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Verification {
    pub verified_by: UserId,
    pub verified_at: DateTime<Utc>,
    pub accepted: bool,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MedicationAdministration {
    pub id: AdministrationId,
    pub schedule_id: ScheduleId,
    pub admission_id: AdmissionId,
    pub due_at: DateTime<Utc>,
    pub status: AdministrationStatus,
    /// When the dose was given or the omission recorded.
    pub administered_at: Option<DateTime<Utc>>,
    pub administered_by: Option<UserId>,
    pub omission_reason: Option<String>,
    pub dose: Option<DoseDetails>,
    pub nurse_notes: Option<String>,
    pub side_effects: Vec<String>,
    pub verification: Option<Verification>,
    pub created_at: DateTime<Utc>,
}

impl MedicationAdministration {
    fn pending(schedule: &MedicationSchedule, due_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id: AdministrationId::new(),
            schedule_id: schedule.id,
            admission_id: schedule.admission_id,
            due_at,
            status: AdministrationStatus::Pending,
            administered_at: None,
            administered_by: None,
            omission_reason: None,
            dose: None,
            nurse_notes: None,
            side_effects: Vec::new(),
            verification: None,
            created_at: now,
        }
    }

    /// Derived: still pending after its due instant.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == AdministrationStatus::Pending && self.due_at < now
    }

    /// Whether the record was acted on after its due instant had passed.
    pub fn was_overdue_at_execution(&self) -> bool {
        self.administered_at.is_some_and(|at| at > self.due_at)
    }
}

// ============================================================================
// SERVICE
// ============================================================================

#[derive(Clone)]
pub struct MedicationService {
    ctx: Arc<EngineContext>,
}

impl MedicationService {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    fn horizon(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.ctx.cfg.materialization_window())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Writes a pending record for every unmaterialized due instant of an active schedule up to
/// `horizon`. Returns the number of records created.
pub(crate) fn materialize_schedule(
    tx: &mut Transaction<'_>,
    schedule_id: ScheduleId,
    horizon: DateTime<Utc>,
    now: DateTime<Utc>,
) -> EngineResult<usize> {
    let schedule = schedule_in(tx.tables(), schedule_id)?.clone();
    if schedule.status != ScheduleStatus::Active {
        return Ok(0);
    }

    let mut created = 0;
    for due_at in schedule.due_instants(horizon) {
        if tx.tables().dose_index.contains_key(&(schedule.id, due_at)) {
            continue;
        }
        insert_pending(tx, &schedule, due_at, now);
        created += 1;
    }
    Ok(created)
}

fn insert_pending(
    tx: &mut Transaction<'_>,
    schedule: &MedicationSchedule,
    due_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> MedicationAdministration {
    let record = MedicationAdministration::pending(schedule, due_at, now);
    tx.index_dose((schedule.id, due_at), record.id);
    tx.put_administration(record.clone());
    record
}

/// Completes the active and paused schedules of a stay that has ended.
pub(crate) fn complete_schedules_for_admission(
    tx: &mut Transaction<'_>,
    admission_id: AdmissionId,
) -> EngineResult<usize> {
    let open: Vec<MedicationSchedule> = tx
        .tables()
        .schedules
        .values()
        .filter(|s| s.admission_id == admission_id && !s.status.is_terminal())
        .cloned()
        .collect();

    let count = open.len();
    for mut schedule in open {
        schedule.status = ScheduleStatus::Completed;
        tx.put_schedule(schedule);
    }
    Ok(count)
}

/// Carries an order status change through to the order's schedule, if it has one.
pub(crate) fn follow_order_status(
    tx: &mut Transaction<'_>,
    order_id: OrderId,
    order_status: OrderStatus,
) -> EngineResult<()> {
    let Some(schedule_id) = tx.tables().schedule_by_order.get(&order_id).copied() else {
        return Ok(());
    };
    let mut schedule = schedule_in(tx.tables(), schedule_id)?.clone();

    let next = match (order_status, schedule.status) {
        (_, current) if current.is_terminal() => return Ok(()),
        (OrderStatus::OnHold, ScheduleStatus::Active) => ScheduleStatus::Paused,
        (OrderStatus::Active, ScheduleStatus::Paused) => ScheduleStatus::Active,
        (OrderStatus::Completed, _) => ScheduleStatus::Completed,
        (OrderStatus::Cancelled, _) => ScheduleStatus::Cancelled,
        _ => return Ok(()),
    };
    schedule.status = next;
    tx.put_schedule(schedule);
    Ok(())
}

pub(crate) fn schedule_in(
    tables: &Tables,
    schedule_id: ScheduleId,
) -> EngineResult<&MedicationSchedule> {
    tables
        .schedules
        .get(&schedule_id)
        .ok_or_else(|| EngineError::not_found(EntityKind::MedicationSchedule, schedule_id))
}

pub(crate) fn administration_in(
    tables: &Tables,
    administration_id: AdministrationId,
) -> EngineResult<&MedicationAdministration> {
    tables.administrations.get(&administration_id).ok_or_else(|| {
        EngineError::not_found(EntityKind::MedicationAdministration, administration_id)
    })
}
