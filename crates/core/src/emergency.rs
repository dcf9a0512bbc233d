//! Emergency Escalation.
//!
//! Event status only ever moves forward through this lattice:
//!
//! ```text
//! reported ──acknowledge──> in_progress ──resolve──> resolved
//!    │                          │                       ^
//!    └───────escalate───────────┴──> escalated ──resolve┘
//! ```
//!
//! `acknowledged` is accepted as a source state, but acknowledging through the engine begins the
//! response directly. Any other move fails with a conflict that names the current status and
//! leaves the event untouched.

use crate::admissions;
use crate::audit::{Change, OperationDescriptor};
use crate::engine::EngineContext;
use crate::error::{EngineError, EngineResult, EntityKind};
use crate::notify::{Notification, NotificationKind};
use crate::policy::{Actor, Operation, ResourceContext};
use crate::registry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use ward_types::NonEmptyText;
use ward_uuid::{AdmissionId, CanonicalUuid, EventId, PatientId, UserId, WardId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CardiacArrest,
    RespiratoryDistress,
    Seizure,
    Fall,
    Haemorrhage,
    Anaphylaxis,
    Sepsis,
    Deterioration,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Reported,
    Acknowledged,
    InProgress,
    Resolved,
    Escalated,
}

impl EventStatus {
    pub const ALL: [EventStatus; 5] = [
        EventStatus::Reported,
        EventStatus::Acknowledged,
        EventStatus::InProgress,
        EventStatus::Resolved,
        EventStatus::Escalated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Reported => "reported",
            EventStatus::Acknowledged => "acknowledged",
            EventStatus::InProgress => "in_progress",
            EventStatus::Resolved => "resolved",
            EventStatus::Escalated => "escalated",
        }
    }

    pub fn can_transition(self, to: EventStatus) -> bool {
        use EventStatus::*;
        matches!(
            (self, to),
            (Reported, Acknowledged | InProgress | Escalated)
                | (Acknowledged, InProgress | Resolved | Escalated)
                | (InProgress, Resolved | Escalated)
                | (Escalated, Resolved)
        )
    }

    pub fn is_open(&self) -> bool {
        *self != EventStatus::Resolved
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Escalation {
    pub reason: String,
    pub escalated_to: Vec<UserId>,
    pub escalated_by: UserId,
    pub escalated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct EmergencyEvent {
    pub id: EventId,
    pub admission_id: Option<AdmissionId>,
    pub patient_id: PatientId,
    pub reported_by: UserId,
    pub event_type: EventType,
    pub severity: Severity,
    pub location: Option<String>,
    pub description: NonEmptyText,
    pub occurred_at: DateTime<Utc>,
    pub notified_doctors: Vec<UserId>,
    pub notified_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<UserId>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub responding_doctor: Option<UserId>,
    pub response_started_at: Option<DateTime<Utc>>,
    pub response_ended_at: Option<DateTime<Utc>>,
    pub actions_taken: Option<String>,
    pub outcome: Option<String>,
    pub status: EventStatus,
    pub escalation: Option<Escalation>,
    pub resolved_by: Option<UserId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub follow_up_required: bool,
    pub follow_up_notes: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RaiseEvent {
    pub patient_id: PatientId,
    #[serde(default)]
    pub admission_id: Option<AdmissionId>,
    pub event_type: EventType,
    pub severity: Severity,
    /// Defaults to the ward and bed of the linked admission.
    #[serde(default)]
    pub location: Option<String>,
    pub description: String,
    #[serde(default)]
    pub notify: Vec<UserId>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EscalateEvent {
    pub reason: String,
    pub escalate_to: Vec<UserId>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ResolveEvent {
    pub outcome: String,
    #[serde(default)]
    pub actions_taken: Option<String>,
    #[serde(default)]
    pub follow_up_required: bool,
    #[serde(default)]
    pub follow_up_notes: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct EventFilter {
    pub ward_id: Option<WardId>,
    pub status: Option<EventStatus>,
    #[serde(default)]
    pub open_only: bool,
}

fn event_id_of(e: &EmergencyEvent) -> CanonicalUuid {
    e.id.into()
}

const RAISE: OperationDescriptor<EmergencyEvent> = OperationDescriptor {
    entity: EntityKind::EmergencyEvent,
    action: "raise_event",
    id_of: event_id_of,
};
const ACKNOWLEDGE: OperationDescriptor<EmergencyEvent> = OperationDescriptor {
    entity: EntityKind::EmergencyEvent,
    action: "acknowledge_event",
    id_of: event_id_of,
};
const ESCALATE: OperationDescriptor<EmergencyEvent> = OperationDescriptor {
    entity: EntityKind::EmergencyEvent,
    action: "escalate_event",
    id_of: event_id_of,
};
const RESOLVE: OperationDescriptor<EmergencyEvent> = OperationDescriptor {
    entity: EntityKind::EmergencyEvent,
    action: "resolve_event",
    id_of: event_id_of,
};

#[derive(Clone)]
pub struct EmergencyService {
    ctx: Arc<EngineContext>,
}

impl EmergencyService {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Raises an event in `reported` status and notifies the listed doctors.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if the patient or linked admission does not exist.
    /// - [`EngineError::InvalidInput`] if the admission belongs to another patient.
    pub fn raise(&self, actor: &Actor, request: RaiseEvent) -> EngineResult<EmergencyEvent> {
        let context = request
            .admission_id
            .map(ResourceContext::admission)
            .unwrap_or_default();
        self.ctx
            .authorize(actor, Operation::RaiseEmergency, context)?;

        let description = NonEmptyText::new(&request.description)?;
        if !self.ctx.patients.contains(request.patient_id) {
            return Err(EngineError::not_found(
                EntityKind::Patient,
                request.patient_id,
            ));
        }

        let now = self.ctx.now();
        let mut notify = request.notify.clone();
        notify.sort();
        notify.dedup();

        let result = self.ctx.store.transaction(|tx| {
            let mut location = request
                .location
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string);

            if let Some(admission_id) = request.admission_id {
                let admission = admissions::admission_in(tx.tables(), admission_id)?;
                if admission.patient_id != request.patient_id {
                    return Err(EngineError::InvalidInput(format!(
                        "admission {admission_id} belongs to another patient"
                    )));
                }
                if location.is_none() {
                    let ward = registry::ward_in(tx.tables(), admission.ward_id)?;
                    let bed = registry::bed_in(tx.tables(), admission.bed_id)?;
                    location = Some(format!("{}/{}", ward.code, bed.code));
                }
            }

            let event = EmergencyEvent {
                id: EventId::new(),
                admission_id: request.admission_id,
                patient_id: request.patient_id,
                reported_by: actor.id,
                event_type: request.event_type,
                severity: request.severity,
                location,
                description,
                occurred_at: now,
                notified_at: (!notify.is_empty()).then_some(now),
                notified_doctors: notify.clone(),
                acknowledged_by: None,
                acknowledged_at: None,
                responding_doctor: None,
                response_started_at: None,
                response_ended_at: None,
                actions_taken: None,
                outcome: None,
                status: EventStatus::Reported,
                escalation: None,
                resolved_by: None,
                resolved_at: None,
                follow_up_required: false,
                follow_up_notes: None,
            };
            tx.put_event(event.clone());
            Ok(Change::created(event))
        });

        let event = self.ctx.audit.after(actor, &RAISE, now, result)?;
        tracing::warn!(
            event = %event.id,
            severity = ?event.severity,
            kind = ?event.event_type,
            "emergency raised"
        );
        self.ctx.notify(
            &event.notified_doctors,
            Notification {
                kind: NotificationKind::EmergencyRaised,
                subject_id: event.id.into(),
                patient_id: event.patient_id,
                admission_id: event.admission_id,
                message: format!(
                    "{:?} {:?} emergency: {}",
                    event.severity, event.event_type, event.description
                ),
            },
        );
        Ok(event)
    }

    /// Acknowledges a reported event; the acknowledging doctor begins the response.
    pub fn acknowledge(&self, actor: &Actor, event_id: EventId) -> EngineResult<EmergencyEvent> {
        self.advance(
            actor,
            event_id,
            EventStatus::InProgress,
            &ACKNOWLEDGE,
            |event, now| {
                if event.status != EventStatus::Reported {
                    return Err(EngineError::transition(
                        EntityKind::EmergencyEvent,
                        event.id,
                        event.status,
                        "acknowledge",
                    ));
                }
                event.acknowledged_by = Some(actor.id);
                event.acknowledged_at = Some(now);
                event.responding_doctor = Some(actor.id);
                event.response_started_at = Some(now);
                Ok(())
            },
        )
    }

    pub fn escalate(
        &self,
        actor: &Actor,
        event_id: EventId,
        request: EscalateEvent,
    ) -> EngineResult<EmergencyEvent> {
        let reason = NonEmptyText::new(&request.reason)?;
        let mut escalate_to = request.escalate_to;
        escalate_to.sort();
        escalate_to.dedup();
        if escalate_to.is_empty() {
            return Err(EngineError::InvalidInput(
                "escalation needs at least one recipient".into(),
            ));
        }

        let recipients = escalate_to.clone();
        let event = self.advance(
            actor,
            event_id,
            EventStatus::Escalated,
            &ESCALATE,
            move |event, now| {
                event.escalation = Some(Escalation {
                    reason: reason.into_string(),
                    escalated_to: escalate_to,
                    escalated_by: actor.id,
                    escalated_at: now,
                });
                event.response_started_at.get_or_insert(now);
                Ok(())
            },
        )?;

        self.ctx.notify(
            &recipients,
            Notification {
                kind: NotificationKind::EmergencyEscalated,
                subject_id: event.id.into(),
                patient_id: event.patient_id,
                admission_id: event.admission_id,
                message: format!("emergency escalated: {}", event.description),
            },
        );
        Ok(event)
    }

    pub fn resolve(
        &self,
        actor: &Actor,
        event_id: EventId,
        request: ResolveEvent,
    ) -> EngineResult<EmergencyEvent> {
        let outcome = NonEmptyText::new(&request.outcome)?;

        self.advance(
            actor,
            event_id,
            EventStatus::Resolved,
            &RESOLVE,
            move |event, now| {
                event.outcome = Some(outcome.into_string());
                event.actions_taken = trimmed(request.actions_taken);
                event.follow_up_required = request.follow_up_required;
                event.follow_up_notes = trimmed(request.follow_up_notes);
                event.response_started_at.get_or_insert(now);
                event.response_ended_at = Some(now);
                event.resolved_by = Some(actor.id);
                event.resolved_at = Some(now);
                Ok(())
            },
        )
    }

    pub fn get(&self, actor: &Actor, event_id: EventId) -> EngineResult<EmergencyEvent> {
        self.ctx
            .authorize(actor, Operation::ViewEmergencies, ResourceContext::none())?;
        self.ctx.store.read(|t| {
            t.events
                .get(&event_id)
                .cloned()
                .ok_or_else(|| EngineError::not_found(EntityKind::EmergencyEvent, event_id))
        })
    }

    /// Events matching the filter, most severe first, then most recent.
    pub fn list(&self, actor: &Actor, filter: EventFilter) -> EngineResult<Vec<EmergencyEvent>> {
        let context = filter
            .ward_id
            .map(ResourceContext::ward)
            .unwrap_or_default();
        self.ctx
            .authorize(actor, Operation::ViewEmergencies, context)?;

        let mut out: Vec<EmergencyEvent> = self.ctx.store.read(|t| {
            t.events
                .values()
                .filter(|e| filter.status.is_none_or(|s| e.status == s))
                .filter(|e| !filter.open_only || e.status.is_open())
                .filter(|e| {
                    filter.ward_id.is_none_or(|w| {
                        e.admission_id
                            .and_then(|a| t.admissions.get(&a))
                            .is_some_and(|a| a.ward_id == w)
                    })
                })
                .cloned()
                .collect()
        });
        out.sort_by(|a, b| {
            a.severity
                .cmp(&b.severity)
                .then(b.occurred_at.cmp(&a.occurred_at))
        });
        Ok(out)
    }

    fn advance(
        &self,
        actor: &Actor,
        event_id: EventId,
        target: EventStatus,
        op: &OperationDescriptor<EmergencyEvent>,
        apply: impl FnOnce(&mut EmergencyEvent, DateTime<Utc>) -> EngineResult<()>,
    ) -> EngineResult<EmergencyEvent> {
        self.ctx
            .authorize(actor, Operation::RespondEmergency, ResourceContext::none())?;

        let now = self.ctx.now();
        let result = self.ctx.store.transaction(|tx| {
            let before = tx
                .tables()
                .events
                .get(&event_id)
                .cloned()
                .ok_or_else(|| EngineError::not_found(EntityKind::EmergencyEvent, event_id))?;
            if !before.status.can_transition(target) {
                return Err(EngineError::transition(
                    EntityKind::EmergencyEvent,
                    event_id,
                    before.status,
                    op.action.trim_end_matches("_event"),
                ));
            }

            let mut after = before.clone();
            apply(&mut after, now)?;
            after.status = target;
            tx.put_event(after.clone());
            Ok(Change::updated(before, after))
        });

        let event = self.ctx.audit.after(actor, op, now, result)?;
        tracing::info!(event = %event.id, status = %event.status, "emergency status changed");
        Ok(event)
    }
}

fn trimmed(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::TestEnv;
    use chrono::Duration;

    fn raise_request(patient_id: PatientId, admission_id: Option<AdmissionId>) -> RaiseEvent {
        RaiseEvent {
            patient_id,
            admission_id,
            event_type: EventType::CardiacArrest,
            severity: Severity::Critical,
            location: None,
            description: "Unresponsive, no pulse".into(),
            notify: Vec::new(),
        }
    }

    fn resolution() -> ResolveEvent {
        ResolveEvent {
            outcome: "ROSC achieved".into(),
            actions_taken: Some("CPR, 2 shocks".into()),
            follow_up_required: true,
            follow_up_notes: Some("Transfer to ICU".into()),
        }
    }

    #[test]
    fn test_resolve_requires_acknowledgement() {
        let env = TestEnv::new();
        let patient = env.patient();
        let emergency = env.engine.emergency();

        let event = emergency
            .raise(&env.nurse, raise_request(patient, None))
            .unwrap();
        assert_eq!(event.status, EventStatus::Reported);
        assert!(event.admission_id.is_none());

        let err = emergency
            .resolve(&env.doctor, event.id, resolution())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("is reported; cannot resolve"));
        assert_eq!(
            emergency.get(&env.doctor, event.id).unwrap().status,
            EventStatus::Reported
        );

        let acknowledged = emergency.acknowledge(&env.doctor, event.id).unwrap();
        assert_eq!(acknowledged.status, EventStatus::InProgress);
        assert_eq!(acknowledged.responding_doctor, Some(env.doctor.id));

        env.clock.advance(Duration::minutes(25));
        let resolved = emergency
            .resolve(&env.doctor, event.id, resolution())
            .unwrap();
        assert_eq!(resolved.status, EventStatus::Resolved);
        let started = resolved.response_started_at.unwrap();
        let ended = resolved.response_ended_at.unwrap();
        assert!(ended >= started);
        assert_eq!(ended - started, Duration::minutes(25));
        assert_eq!(resolved.outcome.as_deref(), Some("ROSC achieved"));
        assert!(resolved.follow_up_required);
    }

    #[test]
    fn test_lattice_allows_only_forward_moves() {
        use EventStatus::*;
        let allowed = [
            (Reported, Acknowledged),
            (Reported, InProgress),
            (Reported, Escalated),
            (Acknowledged, InProgress),
            (Acknowledged, Resolved),
            (Acknowledged, Escalated),
            (InProgress, Resolved),
            (InProgress, Escalated),
            (Escalated, Resolved),
        ];
        for from in EventStatus::ALL {
            for to in EventStatus::ALL {
                assert_eq!(
                    from.can_transition(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_escalation_then_resolution() {
        let env = TestEnv::new();
        let admission = env.admitted();
        let emergency = env.engine.emergency();
        let event = emergency
            .raise(&env.nurse, raise_request(admission.patient_id, Some(admission.id)))
            .unwrap();
        emergency.acknowledge(&env.doctor, event.id).unwrap();

        let escalated = emergency
            .escalate(
                &env.doctor,
                event.id,
                EscalateEvent {
                    reason: "Needs ICU team".into(),
                    escalate_to: vec![env.senior.id, env.senior.id],
                },
            )
            .unwrap();
        assert_eq!(escalated.status, EventStatus::Escalated);
        assert_eq!(
            escalated.escalation.as_ref().unwrap().escalated_to,
            vec![env.senior.id]
        );

        let err = emergency.acknowledge(&env.doctor, event.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = emergency
            .escalate(
                &env.doctor,
                event.id,
                EscalateEvent {
                    reason: "again".into(),
                    escalate_to: vec![env.senior.id],
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let resolved = emergency
            .resolve(&env.senior, event.id, resolution())
            .unwrap();
        assert_eq!(resolved.resolved_by, Some(env.senior.id));

        let err = emergency
            .resolve(&env.senior, event.id, resolution())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_escalation_from_reported_starts_response() {
        let env = TestEnv::new();
        let patient = env.patient();
        let emergency = env.engine.emergency();
        let event = emergency
            .raise(&env.nurse, raise_request(patient, None))
            .unwrap();

        let escalated = emergency
            .escalate(
                &env.doctor,
                event.id,
                EscalateEvent {
                    reason: "Arrest team".into(),
                    escalate_to: vec![env.senior.id],
                },
            )
            .unwrap();

        assert_eq!(escalated.response_started_at, Some(env.engine.now()));
        let sent = env.notifier.sent();
        assert_eq!(sent.last().unwrap().1.kind, NotificationKind::EmergencyEscalated);
        assert_eq!(sent.last().unwrap().0, vec![env.senior.id]);
    }

    #[test]
    fn test_raise_notifies_and_defaults_location() {
        let env = TestEnv::new();
        let admission = env.admitted();
        let mut request = raise_request(admission.patient_id, Some(admission.id));
        request.notify = vec![env.doctor.id];

        let event = env.engine.emergency().raise(&env.nurse, request).unwrap();

        assert_eq!(event.location.as_deref(), Some("MED/B201"));
        assert_eq!(event.notified_doctors, vec![env.doctor.id]);
        assert_eq!(event.notified_at, Some(event.occurred_at));
        let sent = env.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.kind, NotificationKind::EmergencyRaised);
    }

    #[test]
    fn test_raise_rejects_mismatched_admission() {
        let env = TestEnv::new();
        let admission = env.admitted();
        let stranger = env.patient();

        let err = env
            .engine
            .emergency()
            .raise(&env.nurse, raise_request(stranger, Some(admission.id)))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_raise_rejects_unknown_patient() {
        let env = TestEnv::new();
        let err = env
            .engine
            .emergency()
            .raise(&env.nurse, raise_request(PatientId::new(), None))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_nurses_cannot_resolve() {
        let env = TestEnv::new();
        let patient = env.patient();
        let event = env
            .engine
            .emergency()
            .raise(&env.nurse, raise_request(patient, None))
            .unwrap();

        let err = env
            .engine
            .emergency()
            .acknowledge(&env.nurse, event.id)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn test_list_orders_by_severity_and_filters_open() {
        let env = TestEnv::new();
        let admission = env.admitted();
        let emergency = env.engine.emergency();
        let mut low = raise_request(admission.patient_id, Some(admission.id));
        low.severity = Severity::Low;
        let low = emergency.raise(&env.nurse, low).unwrap();
        let critical = emergency
            .raise(&env.nurse, raise_request(admission.patient_id, None))
            .unwrap();
        emergency.acknowledge(&env.doctor, low.id).unwrap();
        emergency.resolve(&env.doctor, low.id, resolution()).unwrap();

        let all = emergency.list(&env.nurse, EventFilter::default()).unwrap();
        assert_eq!(all[0].id, critical.id);
        assert_eq!(all.len(), 2);

        let open = emergency
            .list(
                &env.nurse,
                EventFilter {
                    open_only: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(open.len(), 1);

        let in_ward = emergency
            .list(
                &env.nurse,
                EventFilter {
                    ward_id: Some(admission.ward_id),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(in_ward.len(), 1);
        assert_eq!(in_ward[0].id, low.id);
    }
}
