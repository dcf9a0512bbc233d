//! Scripted walkthrough of one admission on a simulated clock.

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use ward_core::admissions::{AdmissionType, AdmitRequest};
use ward_core::medication::{ExecuteRequest, MonitoringFlags, NewSchedule, OverdueFilter, Route};
use ward_core::orders::{NewOrder, OrderType};
use ward_core::registry::{NewBed, NewRoomCategory, NewWard};
use ward_core::{
    Actor, Engine, EngineConfig, InMemoryPatientDirectory, ManualClock, MemoryAuditSink, PatientId,
    Role, UserId,
};

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let start = Utc
        .with_ymd_and_hms(2024, 3, 4, 8, 0, 0)
        .single()
        .ok_or("invalid start instant")?;
    let clock = Arc::new(ManualClock::new(start));
    let audit = Arc::new(MemoryAuditSink::new());
    let patients = Arc::new(InMemoryPatientDirectory::new());
    let engine = Engine::builder(Arc::new(EngineConfig::default()))
        .clock(clock.clone())
        .audit_sink(audit.clone())
        .patients(patients.clone())
        .build();

    let admin = Actor::new(UserId::new(), Role::Admin);
    let doctor = Actor::new(UserId::new(), Role::Doctor);
    let nurse = Actor::new(UserId::new(), Role::Nurse);

    let registry = engine.registry();
    let ward = registry.register_ward(
        &admin,
        NewWard {
            code: "MED".into(),
            name: "General medicine".into(),
            floor: 2,
            building: None,
        },
    )?;
    let category = registry.register_room_category(
        &admin,
        NewRoomCategory {
            code: "GEN".into(),
            name: "General bay".into(),
            description: None,
        },
    )?;
    let bed = registry.register_bed(
        &admin,
        NewBed {
            code: "B201".into(),
            ward_id: ward.id,
            category_id: category.id,
            special_requirements: None,
        },
    )?;

    let patient_id = PatientId::new();
    patients.register(patient_id);
    let admission = engine.admissions().admit(
        &admin,
        AdmitRequest {
            patient_id,
            bed_id: bed.id,
            ward_id: ward.id,
            attending_doctor: doctor.id,
            admission_type: AdmissionType::Emergency,
            chief_complaint: "Community acquired pneumonia".into(),
            notes: None,
            icu: false,
            nicu: false,
            expected_bed_version: None,
        },
    )?;
    println!("Admitted patient {} to {}/{}", patient_id, ward.code, bed.code);

    let order = engine.orders().create(
        &doctor,
        NewOrder {
            admission_id: admission.id,
            order_type: OrderType::Medication,
            description: "Paracetamol 500 mg oral".into(),
            instructions: None,
            priority: Default::default(),
            approvals_required: false,
        },
    )?;
    let schedule = engine.medication().create_schedule(
        &doctor,
        NewSchedule {
            order_id: order.id,
            medication_name: "Paracetamol".into(),
            dosage: "500".into(),
            unit: "mg".into(),
            route: Route::Oral,
            frequency: "bd".into(),
            starts_at: None,
            ends_at: None,
            duration_days: Some(2),
            instructions: None,
            monitoring: MonitoringFlags::default(),
        },
    )?;
    println!("Scheduled {}", schedule.label());

    let first = engine.medication().execute_medication(
        &nurse,
        schedule.id,
        ExecuteRequest::for_instant(schedule.starts_at),
    )?;
    println!("Gave first dose due {}", first.due_at.to_rfc3339());

    clock.advance(Duration::hours(13));
    for task in engine
        .medication()
        .list_overdue(&nurse, OverdueFilter::default())?
    {
        println!(
            "Overdue: {} due {} ({} minutes late)",
            task.medication,
            task.administration.due_at.to_rfc3339(),
            task.overdue_minutes
        );
    }

    engine
        .admissions()
        .discharge(&doctor, admission.id, "Recovered on oral antibiotics".into())?;
    println!("Discharged; bed {} released", bed.code);

    println!("Audit trail:");
    for action in audit.actions() {
        println!("  {action}");
    }
    Ok(())
}
