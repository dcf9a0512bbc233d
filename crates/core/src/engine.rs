//! Engine assembly: shared context plus the per-component services.

use crate::admissions::AdmissionService;
use crate::audit::{AuditInterceptor, AuditSink, TracingAuditSink};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::emergency::EmergencyService;
use crate::error::{EngineError, EngineResult};
use crate::medication::MedicationService;
use crate::notify::{Notification, NotificationDispatch, TracingNotifier};
use crate::orders::OrderService;
use crate::patients::{InMemoryPatientDirectory, PatientDirectory};
use crate::policy::{AccessPolicy, Actor, Operation, ResourceContext, RoleMatrix};
use crate::registry::RegistryService;
use crate::store::Store;
use crate::vitals::VitalsService;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use ward_uuid::UserId;

/// State shared by every service.
pub(crate) struct EngineContext {
    pub cfg: Arc<EngineConfig>,
    pub store: Store,
    pub clock: Arc<dyn Clock>,
    pub policy: Arc<dyn AccessPolicy>,
    pub patients: Arc<dyn PatientDirectory>,
    pub audit: AuditInterceptor,
    pub notifier: Arc<dyn NotificationDispatch>,
}

impl EngineContext {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn authorize(
        &self,
        actor: &Actor,
        operation: Operation,
        context: ResourceContext,
    ) -> EngineResult<()> {
        if self.policy.can(actor.role, operation, &context) {
            return Ok(());
        }
        tracing::debug!(actor = %actor.id, role = %actor.role, %operation, "operation denied");
        Err(EngineError::Forbidden {
            role: actor.role.to_string(),
            operation: operation.to_string(),
        })
    }

    /// Best-effort dispatch; failures are logged and dropped.
    pub fn notify(&self, recipients: &[UserId], notification: Notification) {
        if recipients.is_empty() {
            return;
        }
        if let Err(e) = self.notifier.notify(recipients, &notification) {
            tracing::warn!(
                kind = ?notification.kind,
                subject = %notification.subject_id,
                "notification dropped: {}",
                e
            );
        }
    }
}

/// The inpatient care orchestration engine.
///
/// Cheap to clone; all clones share the same store and collaborators.
#[derive(Clone)]
pub struct Engine {
    ctx: Arc<EngineContext>,
}

impl Engine {
    /// An engine with default collaborators (system clock, role matrix, tracing audit and
    /// notification sinks, empty patient directory).
    pub fn new(cfg: Arc<EngineConfig>) -> Self {
        EngineBuilder::new(cfg).build()
    }

    pub fn builder(cfg: Arc<EngineConfig>) -> EngineBuilder {
        EngineBuilder::new(cfg)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.cfg
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.ctx.now()
    }

    pub fn registry(&self) -> RegistryService {
        RegistryService::new(self.ctx.clone())
    }

    pub fn admissions(&self) -> AdmissionService {
        AdmissionService::new(self.ctx.clone())
    }

    pub fn orders(&self) -> OrderService {
        OrderService::new(self.ctx.clone())
    }

    pub fn medication(&self) -> MedicationService {
        MedicationService::new(self.ctx.clone())
    }

    pub fn vitals(&self) -> VitalsService {
        VitalsService::new(self.ctx.clone())
    }

    pub fn emergency(&self) -> EmergencyService {
        EmergencyService::new(self.ctx.clone())
    }

    #[cfg(test)]
    pub(crate) fn ctx(&self) -> &EngineContext {
        &self.ctx
    }
}

pub struct EngineBuilder {
    cfg: Arc<EngineConfig>,
    clock: Arc<dyn Clock>,
    policy: Arc<dyn AccessPolicy>,
    patients: Arc<dyn PatientDirectory>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn NotificationDispatch>,
}

impl EngineBuilder {
    pub fn new(cfg: Arc<EngineConfig>) -> Self {
        Self {
            cfg,
            clock: Arc::new(SystemClock),
            policy: Arc::new(RoleMatrix),
            patients: Arc::new(InMemoryPatientDirectory::new()),
            audit: Arc::new(TracingAuditSink),
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn patients(mut self, patients: Arc<dyn PatientDirectory>) -> Self {
        self.patients = patients;
        self
    }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn NotificationDispatch>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            ctx: Arc::new(EngineContext {
                cfg: self.cfg,
                store: Store::default(),
                clock: self.clock,
                policy: self.policy,
                patients: self.patients,
                audit: AuditInterceptor::new(self.audit),
                notifier: self.notifier,
            }),
        }
    }
}
