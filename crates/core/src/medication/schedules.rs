use super::{
    materialize_schedule, schedule_in, Frequency, MedicationSchedule, MedicationService,
    MonitoringFlags, Route, ScheduleStatus,
};
use crate::admissions;
use crate::audit::{Change, OperationDescriptor};
use crate::constants::MAX_COURSE_DAYS;
use crate::error::{EngineError, EngineResult, EntityKind};
use crate::orders::{self, OrderType};
use crate::policy::{Actor, Operation, ResourceContext};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use ward_types::NonEmptyText;
use ward_uuid::{AdmissionId, CanonicalUuid, OrderId, ScheduleId};

#[derive(Clone, Debug, Deserialize)]
pub struct NewSchedule {
    pub order_id: OrderId,
    pub medication_name: String,
    pub dosage: String,
    #[serde(default)]
    pub unit: String,
    pub route: Route,
    pub frequency: String,
    /// Defaults to the order time.
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_days: Option<u32>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub monitoring: MonitoringFlags,
}

fn schedule_id_of(s: &MedicationSchedule) -> CanonicalUuid {
    s.id.into()
}

const CREATE_SCHEDULE: OperationDescriptor<MedicationSchedule> = OperationDescriptor {
    entity: EntityKind::MedicationSchedule,
    action: "create_schedule",
    id_of: schedule_id_of,
};
const PAUSE_SCHEDULE: OperationDescriptor<MedicationSchedule> = OperationDescriptor {
    entity: EntityKind::MedicationSchedule,
    action: "pause_schedule",
    id_of: schedule_id_of,
};
const RESUME_SCHEDULE: OperationDescriptor<MedicationSchedule> = OperationDescriptor {
    entity: EntityKind::MedicationSchedule,
    action: "resume_schedule",
    id_of: schedule_id_of,
};
const CANCEL_SCHEDULE: OperationDescriptor<MedicationSchedule> = OperationDescriptor {
    entity: EntityKind::MedicationSchedule,
    action: "cancel_schedule",
    id_of: schedule_id_of,
};
pub(super) const MATERIALIZE: OperationDescriptor<MedicationSchedule> = OperationDescriptor {
    entity: EntityKind::MedicationSchedule,
    action: "materialize_tasks",
    id_of: schedule_id_of,
};

impl MedicationService {
    /// Creates the schedule for a medication order and materializes its first window.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if the order does not exist.
    /// - [`EngineError::InvalidInput`] if the order is not a medication order, the end precedes
    ///   the start, the start precedes the admission, both an end and a duration are given, or
    ///   the duration exceeds [`MAX_COURSE_DAYS`].
    /// - [`EngineError::Frequency`] if the frequency is not recognised.
    /// - [`EngineError::InvalidTransition`] if the order is not active (or still awaiting
    ///   approval) or its admission has ended.
    /// - [`EngineError::DuplicateKey`] if the order already has a schedule.
    pub fn create_schedule(
        &self,
        actor: &Actor,
        new: NewSchedule,
    ) -> EngineResult<MedicationSchedule> {
        self.ctx
            .authorize(actor, Operation::ManageSchedule, ResourceContext::none())?;

        let medication_name = NonEmptyText::new(&new.medication_name)?;
        let dosage = NonEmptyText::new(&new.dosage)?;
        let frequency = Frequency::parse(&new.frequency)?;
        if new.ends_at.is_some() && new.duration_days.is_some() {
            return Err(EngineError::InvalidInput(
                "give either an end or a duration, not both".into(),
            ));
        }
        if let Some(days) = new.duration_days {
            if !(1..=MAX_COURSE_DAYS).contains(&days) {
                return Err(EngineError::InvalidInput(format!(
                    "duration must be between 1 and {MAX_COURSE_DAYS} days, got {days}"
                )));
            }
        }

        let now = self.ctx.now();
        let horizon = self.horizon(now);
        let result = self.ctx.store.transaction(|tx| {
            let order = orders::order_in(tx.tables(), new.order_id)?.clone();
            if order.order_type != OrderType::Medication {
                return Err(EngineError::InvalidInput(format!(
                    "order {} is a {:?} order, not a medication order",
                    order.id, order.order_type
                )));
            }
            if !order.is_schedulable() {
                let current = if order.status.is_terminal() {
                    order.status.to_string()
                } else {
                    order.approval_state.to_string()
                };
                return Err(EngineError::transition(
                    EntityKind::DoctorOrder,
                    order.id,
                    current,
                    "create schedule",
                ));
            }
            let admitted_at =
                admissions::require_active(tx.tables(), order.admission_id, "create schedule")?
                    .admitted_at;
            if tx.tables().schedule_by_order.contains_key(&order.id) {
                return Err(EngineError::DuplicateKey {
                    entity: EntityKind::MedicationSchedule,
                    key: format!("order {}", order.id),
                });
            }

            let starts_at = new.starts_at.unwrap_or(order.ordered_at);
            if starts_at < admitted_at {
                return Err(EngineError::InvalidInput(format!(
                    "schedule cannot start at {} before the admission at {}",
                    starts_at.to_rfc3339(),
                    admitted_at.to_rfc3339()
                )));
            }
            let ends_at = match (new.ends_at, new.duration_days) {
                (Some(end), _) => Some(end),
                (None, Some(days)) => Some(
                    starts_at
                        .checked_add_signed(Duration::days(i64::from(days)))
                        .ok_or_else(|| {
                            EngineError::InvalidInput(format!(
                                "a {days}-day course from {} is out of range",
                                starts_at.to_rfc3339()
                            ))
                        })?,
                ),
                (None, None) => None,
            };
            if ends_at.is_some_and(|end| end <= starts_at) {
                return Err(EngineError::InvalidInput(
                    "schedule must end after it starts".into(),
                ));
            }

            let schedule = MedicationSchedule {
                id: ScheduleId::new(),
                order_id: order.id,
                admission_id: order.admission_id,
                medication_name,
                dosage,
                unit: new.unit.trim().to_string(),
                route: new.route,
                frequency,
                starts_at,
                ends_at,
                duration_days: new.duration_days,
                instructions: new
                    .instructions
                    .map(|i| i.trim().to_string())
                    .filter(|i| !i.is_empty()),
                monitoring: new.monitoring,
                prescribed_by: order.doctor_id,
                status: ScheduleStatus::Active,
                created_at: now,
            };
            tx.index_schedule_order(order.id, schedule.id);
            tx.put_schedule(schedule.clone());
            let created = materialize_schedule(tx, schedule.id, horizon, now)?;

            Ok(Change::created(schedule).with_note(format!("{created} task(s) materialized")))
        });

        let schedule = self
            .ctx
            .audit
            .after(actor, &CREATE_SCHEDULE, now, result)?;
        tracing::info!(
            schedule = %schedule.id,
            order = %schedule.order_id,
            frequency = %schedule.frequency,
            "created medication schedule"
        );
        Ok(schedule)
    }

    pub fn pause_schedule(
        &self,
        actor: &Actor,
        schedule_id: ScheduleId,
    ) -> EngineResult<MedicationSchedule> {
        self.move_schedule(
            actor,
            schedule_id,
            &[ScheduleStatus::Active],
            ScheduleStatus::Paused,
            &PAUSE_SCHEDULE,
        )
    }

    /// Resumes a paused schedule. Instants that fell due while paused are materialized on the
    /// next run and show up as overdue.
    pub fn resume_schedule(
        &self,
        actor: &Actor,
        schedule_id: ScheduleId,
    ) -> EngineResult<MedicationSchedule> {
        self.move_schedule(
            actor,
            schedule_id,
            &[ScheduleStatus::Paused],
            ScheduleStatus::Active,
            &RESUME_SCHEDULE,
        )
    }

    pub fn cancel_schedule(
        &self,
        actor: &Actor,
        schedule_id: ScheduleId,
    ) -> EngineResult<MedicationSchedule> {
        self.move_schedule(
            actor,
            schedule_id,
            &[ScheduleStatus::Active, ScheduleStatus::Paused],
            ScheduleStatus::Cancelled,
            &CANCEL_SCHEDULE,
        )
    }

    fn move_schedule(
        &self,
        actor: &Actor,
        schedule_id: ScheduleId,
        from: &[ScheduleStatus],
        to: ScheduleStatus,
        op: &OperationDescriptor<MedicationSchedule>,
    ) -> EngineResult<MedicationSchedule> {
        self.ctx
            .authorize(actor, Operation::ManageSchedule, ResourceContext::none())?;

        let now = self.ctx.now();
        let result = self.ctx.store.transaction(|tx| {
            let before = schedule_in(tx.tables(), schedule_id)?.clone();
            if !from.contains(&before.status) {
                return Err(EngineError::transition(
                    EntityKind::MedicationSchedule,
                    schedule_id,
                    before.status,
                    op.action.trim_end_matches("_schedule"),
                ));
            }
            if to == ScheduleStatus::Active {
                admissions::require_active(tx.tables(), before.admission_id, "resume schedule")?;
            }
            let mut after = before.clone();
            after.status = to;
            tx.put_schedule(after.clone());
            Ok(Change::updated(before, after))
        });

        let schedule = self.ctx.audit.after(actor, op, now, result)?;
        tracing::info!(schedule = %schedule.id, status = %schedule.status, "schedule status changed");
        Ok(schedule)
    }

    /// Materializes pending tasks for one schedule, or for every active schedule.
    ///
    /// Safe to run any number of times, concurrently or not: a `(schedule, due instant)` pair
    /// is only ever materialized once. Returns the number of records created by this call.
    pub fn materialize_due_tasks(
        &self,
        actor: &Actor,
        schedule_id: Option<ScheduleId>,
    ) -> EngineResult<usize> {
        self.ctx
            .authorize(actor, Operation::MaterializeTasks, ResourceContext::none())?;

        let now = self.ctx.now();
        let created = self.materialize(schedule_id, now)?;

        let mut total = 0;
        for (schedule, count) in created {
            total += count;
            self.ctx.audit.after(
                actor,
                &MATERIALIZE,
                now,
                Ok(Change::created(schedule).with_note(format!("{count} task(s) materialized"))),
            )?;
        }
        tracing::debug!(created = total, "materializer run finished");
        Ok(total)
    }

    /// One periodic materializer run under the system actor.
    pub fn tick(&self) -> EngineResult<usize> {
        self.materialize_due_tasks(&Actor::system(), None)
    }

    /// Runs the materializer without an authorization check. Returns the schedules that
    /// gained records together with the number created.
    pub(super) fn materialize(
        &self,
        schedule_id: Option<ScheduleId>,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<(MedicationSchedule, usize)>> {
        let horizon = self.horizon(now);
        self.ctx.store.transaction(|tx| {
            let targets: Vec<ScheduleId> = match schedule_id {
                Some(id) => vec![schedule_in(tx.tables(), id)?.id],
                None => tx
                    .tables()
                    .schedules
                    .values()
                    .filter(|s| s.status == ScheduleStatus::Active)
                    .map(|s| s.id)
                    .collect(),
            };

            let mut created = Vec::new();
            for id in targets {
                let count = materialize_schedule(tx, id, horizon, now)?;
                if count > 0 {
                    created.push((schedule_in(tx.tables(), id)?.clone(), count));
                }
            }
            Ok(created)
        })
    }

    pub fn get_schedule(
        &self,
        actor: &Actor,
        schedule_id: ScheduleId,
    ) -> EngineResult<MedicationSchedule> {
        self.ctx
            .authorize(actor, Operation::ViewMedication, ResourceContext::none())?;
        self.ctx
            .store
            .read(|t| schedule_in(t, schedule_id).cloned())
    }

    /// Schedules of one admission, or all schedules, oldest first.
    pub fn list_schedules(
        &self,
        actor: &Actor,
        admission_id: Option<AdmissionId>,
    ) -> EngineResult<Vec<MedicationSchedule>> {
        let context = admission_id
            .map(ResourceContext::admission)
            .unwrap_or_default();
        self.ctx
            .authorize(actor, Operation::ViewMedication, context)?;

        let mut out: Vec<MedicationSchedule> = self.ctx.store.read(|t| {
            t.schedules
                .values()
                .filter(|s| admission_id.is_none_or(|a| s.admission_id == a))
                .cloned()
                .collect()
        });
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    /// The schedule's full expansion: every due instant up to its end, or up to the current
    /// horizon for open-ended schedules.
    pub fn due_instants(
        &self,
        actor: &Actor,
        schedule_id: ScheduleId,
    ) -> EngineResult<Vec<DateTime<Utc>>> {
        let schedule = self.get_schedule(actor, schedule_id)?;
        let horizon = match schedule.ends_at {
            Some(end) => end,
            None => self.horizon(self.ctx.now()),
        };
        Ok(schedule.due_instants(horizon))
    }
}
