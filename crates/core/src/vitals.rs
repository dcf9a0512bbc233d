//! Vitals Monitor.
//!
//! Observations are immutable once recorded; a correction is a new record. The abnormal flag
//! is asserted by the recording nurse. When it is set, or when the nurse names a doctor, the
//! record is stamped as reported and the doctor (by default the attending doctor) is notified.

use crate::admissions;
use crate::audit::{Change, OperationDescriptor};
use crate::engine::EngineContext;
use crate::error::{EngineError, EngineResult, EntityKind};
use crate::notify::{Notification, NotificationKind};
use crate::policy::{Actor, Operation, ResourceContext};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ward_uuid::{AdmissionId, CanonicalUuid, UserId, VitalsId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: u16,
    pub diastolic: u16,
}

/// AVPU scale, plus new confusion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsciousnessLevel {
    Alert,
    Confused,
    Voice,
    Pain,
    Unresponsive,
}

/// The measured values. Every field is optional; at least one must be present.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Observations {
    pub temperature_c: Option<f64>,
    pub heart_rate: Option<u16>,
    pub blood_pressure: Option<BloodPressure>,
    pub respiratory_rate: Option<u16>,
    pub spo2: Option<u8>,
    pub glucose_mmol_l: Option<f64>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub pain_score: Option<u8>,
    pub gcs: Option<u8>,
    pub consciousness: Option<ConsciousnessLevel>,
    pub urine_output_ml: Option<u32>,
    pub bowel_status: Option<String>,
}

impl Observations {
    fn is_empty(&self) -> bool {
        *self == Observations::default()
    }

    fn validate(&self) -> EngineResult<()> {
        if self.is_empty() {
            return Err(invalid("at least one observation is required"));
        }
        if let Some(t) = self.temperature_c {
            if !(25.0..=45.0).contains(&t) {
                return Err(invalid(format!("temperature {t}°C is out of range")));
            }
        }
        if self.heart_rate == Some(0) {
            return Err(invalid("heart rate must be greater than zero"));
        }
        if self.respiratory_rate == Some(0) {
            return Err(invalid("respiratory rate must be greater than zero"));
        }
        if let Some(bp) = self.blood_pressure {
            if bp.diastolic == 0 || bp.systolic <= bp.diastolic {
                return Err(invalid(format!(
                    "blood pressure {}/{} is not plausible",
                    bp.systolic, bp.diastolic
                )));
            }
        }
        if self.spo2.is_some_and(|s| s > 100) {
            return Err(invalid("SpO2 must be between 0 and 100"));
        }
        if self.pain_score.is_some_and(|p| p > 10) {
            return Err(invalid("pain score must be between 0 and 10"));
        }
        if self.gcs.is_some_and(|g| !(3..=15).contains(&g)) {
            return Err(invalid("GCS must be between 3 and 15"));
        }
        for (name, value) in [
            ("glucose", self.glucose_mmol_l),
            ("weight", self.weight_kg),
            ("height", self.height_cm),
        ] {
            if value.is_some_and(|v| !v.is_finite() || v <= 0.0) {
                return Err(invalid(format!("{name} must be a positive number")));
            }
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> EngineError {
    EngineError::InvalidInput(message.into())
}

#[derive(Clone, Debug, Serialize)]
pub struct VitalsRecord {
    pub id: VitalsId,
    pub admission_id: AdmissionId,
    pub recorded_by: UserId,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub observations: Observations,
    pub notes: Option<String>,
    pub abnormal_findings: bool,
    pub reported_to: Option<UserId>,
    pub reported_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RecordVitals {
    pub admission_id: AdmissionId,
    #[serde(flatten)]
    pub observations: Observations,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub abnormal_findings: bool,
    /// Doctor to report to. Defaults to the attending doctor when findings are abnormal.
    #[serde(default)]
    pub notify_doctor: Option<UserId>,
}

fn vitals_id_of(v: &VitalsRecord) -> CanonicalUuid {
    v.id.into()
}

const RECORD_VITALS: OperationDescriptor<VitalsRecord> = OperationDescriptor {
    entity: EntityKind::VitalsRecord,
    action: "record_vitals",
    id_of: vitals_id_of,
};

#[derive(Clone)]
pub struct VitalsService {
    ctx: Arc<EngineContext>,
}

impl VitalsService {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Records a set of observations against an active admission.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if the admission does not exist.
    /// - [`EngineError::InvalidTransition`] if the admission is no longer active.
    /// - [`EngineError::InvalidInput`] if no observation is given or a value is out of range.
    pub fn record_vitals(&self, actor: &Actor, request: RecordVitals) -> EngineResult<VitalsRecord> {
        self.ctx.authorize(
            actor,
            Operation::RecordVitals,
            ResourceContext::admission(request.admission_id),
        )?;
        request.observations.validate()?;

        let now = self.ctx.now();
        let result = self.ctx.store.transaction(|tx| {
            let admission =
                admissions::require_active(tx.tables(), request.admission_id, "record vitals")?;

            let reported_to = request.notify_doctor.or(request
                .abnormal_findings
                .then_some(admission.attending_doctor));
            let record = VitalsRecord {
                id: VitalsId::new(),
                admission_id: admission.id,
                recorded_by: actor.id,
                recorded_at: now,
                observations: request.observations,
                notes: request
                    .notes
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty()),
                abnormal_findings: request.abnormal_findings,
                reported_to,
                reported_at: reported_to.map(|_| now),
            };
            let patient_id = admission.patient_id;
            tx.put_vitals(record.clone());
            Ok((Change::created(record), patient_id))
        });

        let (change, patient_id) = result?;
        let record = self
            .ctx
            .audit
            .after(actor, &RECORD_VITALS, now, Ok(change))?;

        if let Some(doctor) = record.reported_to {
            let (kind, message) = if record.abnormal_findings {
                (
                    NotificationKind::AbnormalVitals,
                    "abnormal vital signs recorded",
                )
            } else {
                (NotificationKind::VitalsReported, "vital signs reported")
            };
            self.ctx.notify(
                &[doctor],
                Notification {
                    kind,
                    subject_id: record.id.into(),
                    patient_id,
                    admission_id: Some(record.admission_id),
                    message: message.to_string(),
                },
            );
        }

        tracing::info!(
            vitals = %record.id,
            admission = %record.admission_id,
            abnormal = record.abnormal_findings,
            "recorded vitals"
        );
        Ok(record)
    }

    /// Observations for an admission, oldest first.
    pub fn list_vitals(
        &self,
        actor: &Actor,
        admission_id: AdmissionId,
    ) -> EngineResult<Vec<VitalsRecord>> {
        self.ctx.authorize(
            actor,
            Operation::ViewVitals,
            ResourceContext::admission(admission_id),
        )?;

        let mut out = self.ctx.store.read(|t| -> EngineResult<Vec<VitalsRecord>> {
            admissions::admission_in(t, admission_id)?;
            Ok(t.vitals
                .values()
                .filter(|v| v.admission_id == admission_id)
                .cloned()
                .collect())
        })?;
        out.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));
        Ok(out)
    }

    pub fn latest_vitals(
        &self,
        actor: &Actor,
        admission_id: AdmissionId,
    ) -> EngineResult<Option<VitalsRecord>> {
        Ok(self.list_vitals(actor, admission_id)?.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::TestEnv;
    use chrono::Duration;

    #[test]
    fn test_normal_vitals_are_not_reported() {
        let env = TestEnv::new();
        let admission = env.admitted();

        let record = env
            .engine
            .vitals()
            .record_vitals(&env.nurse, env.vitals_request(&admission, false))
            .unwrap();

        assert_eq!(record.recorded_by, env.nurse.id);
        assert!(record.reported_to.is_none());
        assert!(record.reported_at.is_none());
        assert!(env.notifier.sent().is_empty());
    }

    #[test]
    fn test_abnormal_vitals_notify_attending_doctor() {
        let env = TestEnv::new();
        let admission = env.admitted();

        let record = env
            .engine
            .vitals()
            .record_vitals(&env.nurse, env.vitals_request(&admission, true))
            .unwrap();

        assert_eq!(record.reported_to, Some(admission.attending_doctor));
        assert_eq!(record.reported_at, Some(record.recorded_at));
        let sent = env.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, vec![admission.attending_doctor]);
        assert_eq!(sent[0].1.kind, NotificationKind::AbnormalVitals);
        assert_eq!(sent[0].1.patient_id, admission.patient_id);
    }

    #[test]
    fn test_named_doctor_is_reported_to() {
        let env = TestEnv::new();
        let admission = env.admitted();
        let mut request = env.vitals_request(&admission, false);
        request.notify_doctor = Some(env.senior.id);

        let record = env
            .engine
            .vitals()
            .record_vitals(&env.nurse, request)
            .unwrap();

        assert_eq!(record.reported_to, Some(env.senior.id));
        assert_eq!(env.notifier.sent()[0].1.kind, NotificationKind::VitalsReported);
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let env = TestEnv::new();
        let admission = env.admitted();
        let vitals = env.engine.vitals();

        let cases: Vec<Box<dyn Fn(&mut Observations)>> = vec![
            Box::new(|o| o.spo2 = Some(101)),
            Box::new(|o| o.pain_score = Some(11)),
            Box::new(|o| o.gcs = Some(2)),
            Box::new(|o| o.heart_rate = Some(0)),
            Box::new(|o| {
                o.blood_pressure = Some(BloodPressure {
                    systolic: 70,
                    diastolic: 90,
                })
            }),
            Box::new(|o| o.weight_kg = Some(-4.0)),
        ];
        for mutate in cases {
            let mut request = env.vitals_request(&admission, false);
            mutate(&mut request.observations);
            let err = vitals.record_vitals(&env.nurse, request).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }

        let empty = RecordVitals {
            admission_id: admission.id,
            observations: Observations::default(),
            notes: None,
            abnormal_findings: false,
            notify_doctor: None,
        };
        assert_eq!(
            vitals.record_vitals(&env.nurse, empty).unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert!(vitals.list_vitals(&env.nurse, admission.id).unwrap().is_empty());
    }

    #[test]
    fn test_vitals_require_active_admission() {
        let env = TestEnv::new();
        let admission = env.admitted();
        env.engine
            .admissions()
            .discharge(&env.doctor, admission.id, String::new())
            .unwrap();

        let err = env
            .engine
            .vitals()
            .record_vitals(&env.nurse, env.vitals_request(&admission, false))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_latest_vitals_returns_most_recent() {
        let env = TestEnv::new();
        let admission = env.admitted();
        let vitals = env.engine.vitals();
        vitals
            .record_vitals(&env.nurse, env.vitals_request(&admission, false))
            .unwrap();
        env.clock.advance(Duration::hours(4));
        let mut request = env.vitals_request(&admission, false);
        request.observations.heart_rate = Some(112);
        let second = vitals.record_vitals(&env.nurse, request).unwrap();

        let latest = vitals
            .latest_vitals(&env.doctor, admission.id)
            .unwrap()
            .unwrap();

        assert_eq!(latest.id, second.id);
        assert_eq!(latest.observations.heart_rate, Some(112));
        assert_eq!(vitals.list_vitals(&env.doctor, admission.id).unwrap().len(), 2);
    }
}
