//! Clinical Order Pipeline.
//!
//! Doctor orders are issued against an active admission and move forward only:
//!
//! ```text
//! active ──hold──> on_hold ──resume──> active
//!   │                 │
//!   ├──complete───────┴──> completed
//!   └──cancel─────────┴──> cancelled
//! ```
//!
//! Orders flagged as requiring approval carry a separate approval state. A medication order
//! awaiting approval cannot be scheduled; a rejected order is cancelled. Cancelling,
//! completing, holding or resuming a medication order carries through to its schedule.

use crate::admissions;
use crate::audit::{Change, OperationDescriptor};
use crate::engine::EngineContext;
use crate::error::{EngineError, EngineResult, EntityKind};
use crate::medication;
use crate::policy::{Actor, Operation, ResourceContext};
use crate::store::{Tables, Transaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use ward_types::NonEmptyText;
use ward_uuid::{AdmissionId, CanonicalUuid, OrderId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Medication,
    Procedure,
    Investigation,
    Diet,
    Activity,
    Observation,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Routine,
    Urgent,
    Stat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Active,
    OnHold,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Active => "active",
            OrderStatus::OnHold => "on_hold",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    fn can_transition(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Active, OnHold)
                | (OnHold, Active)
                | (Active | OnHold, Completed)
                | (Active | OnHold, Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    NotRequired,
    Pending,
    Approved,
    Rejected,
}

impl ApprovalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalState::NotRequired => "not_required",
            ApprovalState::Pending => "pending approval",
            ApprovalState::Approved => "approved",
            ApprovalState::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Approval {
    pub approved_by: UserId,
    pub approved_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Cancellation {
    pub cancelled_by: UserId,
    pub cancelled_at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct DoctorOrder {
    pub id: OrderId,
    pub admission_id: AdmissionId,
    pub doctor_id: UserId,
    pub ordered_at: DateTime<Utc>,
    pub order_type: OrderType,
    pub description: NonEmptyText,
    pub instructions: Option<String>,
    pub priority: Priority,
    pub status: OrderStatus,
    pub approval_state: ApprovalState,
    pub approval: Option<Approval>,
    pub cancellation: Option<Cancellation>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DoctorOrder {
    /// Whether a medication schedule may be created from this order.
    pub fn is_schedulable(&self) -> bool {
        self.status == OrderStatus::Active
            && matches!(
                self.approval_state,
                ApprovalState::NotRequired | ApprovalState::Approved
            )
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewOrder {
    pub admission_id: AdmissionId,
    pub order_type: OrderType,
    pub description: String,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub approvals_required: bool,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub admission_id: Option<AdmissionId>,
    pub status: Option<OrderStatus>,
}

fn order_id_of(o: &DoctorOrder) -> CanonicalUuid {
    o.id.into()
}

const CREATE_ORDER: OperationDescriptor<DoctorOrder> = OperationDescriptor {
    entity: EntityKind::DoctorOrder,
    action: "create_order",
    id_of: order_id_of,
};
const APPROVE_ORDER: OperationDescriptor<DoctorOrder> = OperationDescriptor {
    entity: EntityKind::DoctorOrder,
    action: "approve_order",
    id_of: order_id_of,
};
const REJECT_ORDER: OperationDescriptor<DoctorOrder> = OperationDescriptor {
    entity: EntityKind::DoctorOrder,
    action: "reject_order",
    id_of: order_id_of,
};
const CANCEL_ORDER: OperationDescriptor<DoctorOrder> = OperationDescriptor {
    entity: EntityKind::DoctorOrder,
    action: "cancel_order",
    id_of: order_id_of,
};
const HOLD_ORDER: OperationDescriptor<DoctorOrder> = OperationDescriptor {
    entity: EntityKind::DoctorOrder,
    action: "hold_order",
    id_of: order_id_of,
};
const RESUME_ORDER: OperationDescriptor<DoctorOrder> = OperationDescriptor {
    entity: EntityKind::DoctorOrder,
    action: "resume_order",
    id_of: order_id_of,
};
const COMPLETE_ORDER: OperationDescriptor<DoctorOrder> = OperationDescriptor {
    entity: EntityKind::DoctorOrder,
    action: "complete_order",
    id_of: order_id_of,
};

#[derive(Clone)]
pub struct OrderService {
    ctx: Arc<EngineContext>,
}

impl OrderService {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Issues an order against an active admission. The acting doctor is recorded as the
    /// ordering doctor.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if the admission does not exist.
    /// - [`EngineError::InvalidTransition`] if the admission is no longer active.
    pub fn create(&self, actor: &Actor, new: NewOrder) -> EngineResult<DoctorOrder> {
        self.ctx.authorize(
            actor,
            Operation::CreateOrder,
            ResourceContext::admission(new.admission_id),
        )?;

        let description = NonEmptyText::new(&new.description)?;
        let now = self.ctx.now();

        let result = self.ctx.store.transaction(|tx| {
            admissions::require_active(tx.tables(), new.admission_id, "create order")?;

            let order = DoctorOrder {
                id: OrderId::new(),
                admission_id: new.admission_id,
                doctor_id: actor.id,
                ordered_at: now,
                order_type: new.order_type,
                description,
                instructions: new
                    .instructions
                    .map(|i| i.trim().to_string())
                    .filter(|i| !i.is_empty()),
                priority: new.priority,
                status: OrderStatus::Active,
                approval_state: if new.approvals_required {
                    ApprovalState::Pending
                } else {
                    ApprovalState::NotRequired
                },
                approval: None,
                cancellation: None,
                completed_at: None,
            };
            tx.put_order(order.clone());
            Ok(Change::created(order))
        });

        let order = self.ctx.audit.after(actor, &CREATE_ORDER, now, result)?;
        tracing::info!(
            order = %order.id,
            admission = %order.admission_id,
            kind = ?order.order_type,
            "created order"
        );
        Ok(order)
    }

    /// Approves an order awaiting approval, making it usable for scheduling.
    pub fn approve(&self, actor: &Actor, order_id: OrderId) -> EngineResult<DoctorOrder> {
        self.ctx
            .authorize(actor, Operation::ApproveOrder, ResourceContext::none())?;

        let now = self.ctx.now();
        let result = self.ctx.store.transaction(|tx| {
            let before = pending_approval(tx.tables(), order_id, "approve")?.clone();
            let mut after = before.clone();
            after.approval_state = ApprovalState::Approved;
            after.approval = Some(Approval {
                approved_by: actor.id,
                approved_at: now,
            });
            tx.put_order(after.clone());
            Ok(Change::updated(before, after))
        });

        self.ctx.audit.after(actor, &APPROVE_ORDER, now, result)
    }

    /// Rejects an order awaiting approval. The order is cancelled and can never be scheduled.
    pub fn reject(
        &self,
        actor: &Actor,
        order_id: OrderId,
        reason: String,
    ) -> EngineResult<DoctorOrder> {
        self.ctx
            .authorize(actor, Operation::ApproveOrder, ResourceContext::none())?;

        let reason = NonEmptyText::new(reason)?;
        let now = self.ctx.now();
        let result = self.ctx.store.transaction(|tx| {
            let before = pending_approval(tx.tables(), order_id, "reject")?.clone();
            let mut after = before.clone();
            after.approval_state = ApprovalState::Rejected;
            after.status = OrderStatus::Cancelled;
            after.cancellation = Some(Cancellation {
                cancelled_by: actor.id,
                cancelled_at: now,
                reason: reason.to_string(),
            });
            tx.put_order(after.clone());
            Ok(Change::updated(before, after).with_note(reason.into_string()))
        });

        self.ctx.audit.after(actor, &REJECT_ORDER, now, result)
    }

    /// Cancels an active or held order. Terminal.
    pub fn cancel(
        &self,
        actor: &Actor,
        order_id: OrderId,
        reason: String,
    ) -> EngineResult<DoctorOrder> {
        let reason = NonEmptyText::new(reason)?;
        let now = self.ctx.now();
        let cancellation = Cancellation {
            cancelled_by: actor.id,
            cancelled_at: now,
            reason: reason.to_string(),
        };
        self.move_to(
            actor,
            order_id,
            OrderStatus::Cancelled,
            &CANCEL_ORDER,
            move |order| order.cancellation = Some(cancellation),
        )
    }

    pub fn hold(&self, actor: &Actor, order_id: OrderId) -> EngineResult<DoctorOrder> {
        self.move_to(actor, order_id, OrderStatus::OnHold, &HOLD_ORDER, |_| {})
    }

    pub fn resume(&self, actor: &Actor, order_id: OrderId) -> EngineResult<DoctorOrder> {
        self.move_to(actor, order_id, OrderStatus::Active, &RESUME_ORDER, |_| {})
    }

    /// Marks an active or held order as fulfilled. Terminal.
    pub fn complete(&self, actor: &Actor, order_id: OrderId) -> EngineResult<DoctorOrder> {
        let now = self.ctx.now();
        self.move_to(
            actor,
            order_id,
            OrderStatus::Completed,
            &COMPLETE_ORDER,
            move |order| order.completed_at = Some(now),
        )
    }

    pub fn get(&self, actor: &Actor, order_id: OrderId) -> EngineResult<DoctorOrder> {
        self.ctx
            .authorize(actor, Operation::ViewOrders, ResourceContext::none())?;
        self.ctx.store.read(|t| order_in(t, order_id).cloned())
    }

    /// Orders matching the filter, oldest first.
    pub fn list(&self, actor: &Actor, filter: OrderFilter) -> EngineResult<Vec<DoctorOrder>> {
        let context = filter
            .admission_id
            .map(ResourceContext::admission)
            .unwrap_or_default();
        self.ctx.authorize(actor, Operation::ViewOrders, context)?;

        let mut out: Vec<DoctorOrder> = self.ctx.store.read(|t| {
            t.orders
                .values()
                .filter(|o| filter.admission_id.is_none_or(|a| o.admission_id == a))
                .filter(|o| filter.status.is_none_or(|s| o.status == s))
                .cloned()
                .collect()
        });
        out.sort_by(|a, b| a.ordered_at.cmp(&b.ordered_at));
        Ok(out)
    }

    fn move_to(
        &self,
        actor: &Actor,
        order_id: OrderId,
        target: OrderStatus,
        op: &OperationDescriptor<DoctorOrder>,
        stamp: impl FnOnce(&mut DoctorOrder),
    ) -> EngineResult<DoctorOrder> {
        self.ctx
            .authorize(actor, Operation::UpdateOrder, ResourceContext::none())?;

        let now = self.ctx.now();
        let result = self.ctx.store.transaction(|tx| {
            let before = order_in(tx.tables(), order_id)?.clone();
            if !before.status.can_transition(target) {
                return Err(EngineError::transition(
                    EntityKind::DoctorOrder,
                    order_id,
                    before.status,
                    op.action.trim_end_matches("_order"),
                ));
            }
            let mut after = before.clone();
            after.status = target;
            stamp(&mut after);
            tx.put_order(after.clone());
            follow_schedule(tx, &after)?;
            Ok(Change::updated(before, after))
        });

        let order = self.ctx.audit.after(actor, op, now, result)?;
        tracing::info!(order = %order.id, status = %order.status, "order status changed");
        Ok(order)
    }
}

fn follow_schedule(tx: &mut Transaction<'_>, order: &DoctorOrder) -> EngineResult<()> {
    if order.order_type == OrderType::Medication {
        medication::follow_order_status(tx, order.id, order.status)?;
    }
    Ok(())
}

pub(crate) fn order_in(tables: &Tables, order_id: OrderId) -> EngineResult<&DoctorOrder> {
    tables
        .orders
        .get(&order_id)
        .ok_or_else(|| EngineError::not_found(EntityKind::DoctorOrder, order_id))
}

fn pending_approval<'t>(
    tables: &'t Tables,
    order_id: OrderId,
    attempted: &str,
) -> EngineResult<&'t DoctorOrder> {
    let order = order_in(tables, order_id)?;
    if order.approval_state != ApprovalState::Pending {
        return Err(EngineError::transition(
            EntityKind::DoctorOrder,
            order_id,
            order.approval_state,
            attempted,
        ));
    }
    if order.status.is_terminal() {
        return Err(EngineError::transition(
            EntityKind::DoctorOrder,
            order_id,
            order.status,
            attempted,
        ));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::medication::ScheduleStatus;
    use crate::test_support::TestEnv;

    fn new_order(admission_id: AdmissionId, approvals_required: bool) -> NewOrder {
        NewOrder {
            admission_id,
            order_type: OrderType::Medication,
            description: "Amoxicillin 500mg".into(),
            instructions: Some("  with food ".into()),
            priority: Priority::Urgent,
            approvals_required,
        }
    }

    #[test]
    fn test_create_order_defaults_to_active() {
        let env = TestEnv::new();
        let admission = env.admitted();

        let order = env
            .engine
            .orders()
            .create(&env.doctor, new_order(admission.id, false))
            .unwrap();

        assert_eq!(order.status, OrderStatus::Active);
        assert_eq!(order.approval_state, ApprovalState::NotRequired);
        assert_eq!(order.doctor_id, env.doctor.id);
        assert_eq!(order.instructions.as_deref(), Some("with food"));
        assert!(order.is_schedulable());
    }

    #[test]
    fn test_create_order_requires_active_admission() {
        let env = TestEnv::new();
        let admission = env.admitted();
        env.engine
            .admissions()
            .discharge(&env.doctor, admission.id, String::new())
            .unwrap();

        let err = env
            .engine
            .orders()
            .create(&env.doctor, new_order(admission.id, false))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("cannot create order"));

        let err = env
            .engine
            .orders()
            .create(&env.doctor, new_order(AdmissionId::new(), false))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_nurses_cannot_create_orders() {
        let env = TestEnv::new();
        let admission = env.admitted();

        let err = env
            .engine
            .orders()
            .create(&env.nurse, new_order(admission.id, false))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn test_order_requiring_approval_is_not_schedulable_until_approved() {
        let env = TestEnv::new();
        let admission = env.admitted();
        let orders = env.engine.orders();
        let order = orders
            .create(&env.doctor, new_order(admission.id, true))
            .unwrap();
        assert_eq!(order.approval_state, ApprovalState::Pending);
        assert!(!order.is_schedulable());

        let approved = orders.approve(&env.senior, order.id).unwrap();

        assert_eq!(approved.approval_state, ApprovalState::Approved);
        assert_eq!(approved.approval.unwrap().approved_by, env.senior.id);
        let approved = orders.get(&env.doctor, order.id).unwrap();
        assert!(approved.is_schedulable());
    }

    #[test]
    fn test_rejected_order_is_cancelled() {
        let env = TestEnv::new();
        let admission = env.admitted();
        let orders = env.engine.orders();
        let order = orders
            .create(&env.doctor, new_order(admission.id, true))
            .unwrap();

        let rejected = orders
            .reject(&env.senior, order.id, "Allergy on file".into())
            .unwrap();

        assert_eq!(rejected.status, OrderStatus::Cancelled);
        assert_eq!(rejected.approval_state, ApprovalState::Rejected);
        assert_eq!(rejected.cancellation.unwrap().reason, "Allergy on file");

        let err = orders.approve(&env.senior, order.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_approve_without_pending_approval_is_conflict() {
        let env = TestEnv::new();
        let admission = env.admitted();
        let orders = env.engine.orders();
        let order = orders
            .create(&env.doctor, new_order(admission.id, false))
            .unwrap();

        let err = orders.approve(&env.doctor, order.id).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_cancel_is_terminal() {
        let env = TestEnv::new();
        let admission = env.admitted();
        let orders = env.engine.orders();
        let order = orders
            .create(&env.doctor, new_order(admission.id, false))
            .unwrap();

        let cancelled = orders
            .cancel(&env.doctor, order.id, "Course changed".into())
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.cancellation.as_ref().unwrap().cancelled_by, env.doctor.id);

        for err in [
            orders.resume(&env.doctor, order.id).unwrap_err(),
            orders.hold(&env.doctor, order.id).unwrap_err(),
            orders.complete(&env.doctor, order.id).unwrap_err(),
            orders
                .cancel(&env.doctor, order.id, "again".into())
                .unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::Conflict);
        }
    }

    #[test]
    fn test_cancel_requires_reason() {
        let env = TestEnv::new();
        let admission = env.admitted();
        let orders = env.engine.orders();
        let order = orders
            .create(&env.doctor, new_order(admission.id, false))
            .unwrap();

        let err = orders.cancel(&env.doctor, order.id, "  ".into()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            orders.get(&env.doctor, order.id).unwrap().status,
            OrderStatus::Active
        );
    }

    #[test]
    fn test_hold_and_resume_follow_schedule() {
        let env = TestEnv::new();
        let admission = env.admitted();
        let order = env.medication_order(&admission, "every 6 hours", None);
        let schedule = env.schedule(&order);
        let orders = env.engine.orders();

        orders.hold(&env.doctor, order.id).unwrap();
        let held = env
            .engine
            .medication()
            .get_schedule(&env.doctor, schedule.id)
            .unwrap();
        assert_eq!(held.status, ScheduleStatus::Paused);

        let resumed = orders.resume(&env.doctor, order.id).unwrap();
        assert_eq!(resumed.status, OrderStatus::Active);
        let schedule = env
            .engine
            .medication()
            .get_schedule(&env.doctor, schedule.id)
            .unwrap();
        assert_eq!(schedule.status, ScheduleStatus::Active);
    }

    #[test]
    fn test_complete_order_completes_schedule() {
        let env = TestEnv::new();
        let admission = env.admitted();
        let order = env.medication_order(&admission, "once daily", None);
        let schedule = env.schedule(&order);

        let completed = env.engine.orders().complete(&env.doctor, order.id).unwrap();

        assert_eq!(completed.status, OrderStatus::Completed);
        assert!(completed.completed_at.is_some());
        let schedule = env
            .engine
            .medication()
            .get_schedule(&env.doctor, schedule.id)
            .unwrap();
        assert_eq!(schedule.status, ScheduleStatus::Completed);
    }

    #[test]
    fn test_list_filters_by_status() {
        let env = TestEnv::new();
        let admission = env.admitted();
        let orders = env.engine.orders();
        let first = orders
            .create(&env.doctor, new_order(admission.id, false))
            .unwrap();
        orders
            .create(&env.doctor, new_order(admission.id, false))
            .unwrap();
        orders.hold(&env.doctor, first.id).unwrap();

        let held = orders
            .list(
                &env.nurse,
                OrderFilter {
                    admission_id: Some(admission.id),
                    status: Some(OrderStatus::OnHold),
                },
            )
            .unwrap();

        assert_eq!(held.len(), 1);
        assert_eq!(held[0].id, first.id);
    }
}
