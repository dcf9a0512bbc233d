//! Shared fixtures for unit tests.

use crate::admissions::{Admission, AdmissionType, AdmitRequest};
use crate::audit::MemoryAuditSink;
use crate::clock::ManualClock;
use crate::medication::{MedicationSchedule, MonitoringFlags, NewSchedule, Route};
use crate::notify::MemoryNotifier;
use crate::orders::{DoctorOrder, NewOrder, OrderType};
use crate::patients::InMemoryPatientDirectory;
use crate::policy::{Actor, Role};
use crate::registry::{Bed, NewBed, NewRoomCategory, NewWard, RoomCategory, Ward};
use crate::vitals::{BloodPressure, Observations, RecordVitals};
use crate::{Engine, EngineConfig};
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use ward_uuid::{OrderId, PatientId, UserId};

pub(crate) struct TestEnv {
    pub engine: Engine,
    pub clock: Arc<ManualClock>,
    pub audit: Arc<MemoryAuditSink>,
    pub notifier: Arc<MemoryNotifier>,
    pub patients: Arc<InMemoryPatientDirectory>,
    pub admin: Actor,
    pub doctor: Actor,
    pub senior: Actor,
    pub nurse: Actor,
    pub second_nurse: Actor,
    regimens: Mutex<HashMap<OrderId, (String, Option<u32>)>>,
}

impl TestEnv {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap(),
        ));
        let audit = Arc::new(MemoryAuditSink::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let patients = Arc::new(InMemoryPatientDirectory::new());

        let engine = Engine::builder(Arc::new(EngineConfig::default()))
            .clock(clock.clone())
            .audit_sink(audit.clone())
            .notifier(notifier.clone())
            .patients(patients.clone())
            .build();

        Self {
            engine,
            clock,
            audit,
            notifier,
            patients,
            admin: Actor::new(UserId::new(), Role::Admin),
            doctor: Actor::new(UserId::new(), Role::Doctor),
            senior: Actor::new(UserId::new(), Role::Doctor),
            nurse: Actor::new(UserId::new(), Role::Nurse),
            second_nurse: Actor::new(UserId::new(), Role::Nurse),
            regimens: Mutex::new(HashMap::new()),
        }
    }

    pub fn ward(&self, code: &str) -> Ward {
        self.engine
            .registry()
            .register_ward(
                &self.admin,
                NewWard {
                    code: code.into(),
                    name: format!("{code} ward"),
                    floor: 2,
                    building: None,
                },
            )
            .unwrap()
    }

    pub fn category(&self, code: &str) -> RoomCategory {
        self.engine
            .registry()
            .register_room_category(
                &self.admin,
                NewRoomCategory {
                    code: code.into(),
                    name: format!("{code} room"),
                    description: None,
                },
            )
            .unwrap()
    }

    pub fn bed(&self, ward: &Ward, category: &RoomCategory, code: &str) -> Bed {
        self.engine
            .registry()
            .register_bed(
                &self.admin,
                NewBed {
                    code: code.into(),
                    ward_id: ward.id,
                    category_id: category.id,
                    special_requirements: None,
                },
            )
            .unwrap()
    }

    /// A bed with the given code in the `MED` ward, creating the ward and the `GEN` category
    /// on first use.
    pub fn ward_with_bed(&self, bed_code: &str) -> (Ward, RoomCategory, Bed) {
        let registry = self.engine.registry();
        let ward = registry
            .list_wards(&self.admin)
            .unwrap()
            .into_iter()
            .find(|w| w.code.as_str() == "MED")
            .unwrap_or_else(|| self.ward("MED"));
        let category = registry
            .list_room_categories(&self.admin)
            .unwrap()
            .into_iter()
            .find(|c| c.code.as_str() == "GEN")
            .unwrap_or_else(|| self.category("GEN"));
        let bed = self.bed(&ward, &category, bed_code);
        (ward, category, bed)
    }

    pub fn patient(&self) -> PatientId {
        let id = PatientId::new();
        self.patients.register(id);
        id
    }

    pub fn admit_request(&self, patient_id: PatientId, ward: &Ward, bed: &Bed) -> AdmitRequest {
        AdmitRequest {
            patient_id,
            bed_id: bed.id,
            ward_id: ward.id,
            attending_doctor: self.doctor.id,
            admission_type: AdmissionType::Emergency,
            chief_complaint: "Community acquired pneumonia".into(),
            notes: None,
            icu: false,
            nicu: false,
            expected_bed_version: None,
        }
    }

    pub fn admit(&self, ward: &Ward, bed: &Bed) -> Admission {
        let patient = self.patient();
        self.engine
            .admissions()
            .admit(&self.admin, self.admit_request(patient, ward, bed))
            .unwrap()
    }

    /// A fresh patient admitted to the next free `MED` bed (`B201`, `B202`, ...).
    pub fn admitted(&self) -> Admission {
        let taken = self
            .engine
            .registry()
            .query_beds(&self.admin, Default::default())
            .unwrap()
            .len();
        let (ward, _, bed) = self.ward_with_bed(&format!("B{}", 201 + taken));
        self.admit(&ward, &bed)
    }

    /// An active medication order. The frequency and course length are remembered for
    /// [`TestEnv::schedule`].
    pub fn medication_order(
        &self,
        admission: &Admission,
        frequency: &str,
        days: Option<u32>,
    ) -> DoctorOrder {
        let order = self
            .engine
            .orders()
            .create(
                &self.doctor,
                NewOrder {
                    admission_id: admission.id,
                    order_type: OrderType::Medication,
                    description: format!("Paracetamol 500mg {frequency}"),
                    instructions: None,
                    priority: Default::default(),
                    approvals_required: false,
                },
            )
            .unwrap();
        self.regimens
            .lock()
            .unwrap()
            .insert(order.id, (frequency.to_string(), days));
        order
    }

    pub fn schedule(&self, order: &DoctorOrder) -> MedicationSchedule {
        let (frequency, duration_days) = self
            .regimens
            .lock()
            .unwrap()
            .get(&order.id)
            .cloned()
            .unwrap_or_else(|| ("twice daily".to_string(), None));
        self.engine
            .medication()
            .create_schedule(
                &self.doctor,
                NewSchedule {
                    order_id: order.id,
                    medication_name: "Paracetamol".into(),
                    dosage: "500".into(),
                    unit: "mg".into(),
                    route: Route::Oral,
                    frequency,
                    starts_at: None,
                    ends_at: None,
                    duration_days,
                    instructions: None,
                    monitoring: MonitoringFlags::default(),
                },
            )
            .unwrap()
    }

    pub fn vitals_request(&self, admission: &Admission, abnormal: bool) -> RecordVitals {
        RecordVitals {
            admission_id: admission.id,
            observations: Observations {
                temperature_c: Some(if abnormal { 39.2 } else { 36.8 }),
                heart_rate: Some(if abnormal { 128 } else { 78 }),
                blood_pressure: Some(BloodPressure {
                    systolic: 124,
                    diastolic: 80,
                }),
                respiratory_rate: Some(16),
                spo2: Some(if abnormal { 89 } else { 97 }),
                ..Default::default()
            },
            notes: None,
            abnormal_findings: abnormal,
            notify_doctor: None,
        }
    }

    pub fn occupancy_is_consistent(&self) -> bool {
        self.engine
            .ctx()
            .store
            .read(crate::admissions::occupancy_is_consistent)
    }
}
