//! Request handlers. Each handler resolves the caller, delegates to one engine operation and
//! maps the result onto JSON.

use crate::auth::Caller;
use crate::error::{ApiResult, ErrorBody};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use ward_core::admissions::{Admission, AdmissionFilter, AdmitRequest, TransferRequest};
use ward_core::emergency::{EmergencyEvent, EscalateEvent, EventFilter, RaiseEvent, ResolveEvent};
use ward_core::medication::{
    AdministrationFilter, ExecuteRequest, MedicationAdministration, MedicationSchedule,
    NewSchedule, OmissionRequest, OverdueFilter, OverdueTask,
};
use ward_core::orders::{DoctorOrder, NewOrder, OrderFilter};
use ward_core::registry::{
    Bed, BedFilter, BedStatus, NewBed, NewRoomCategory, NewWard, OccupancySummary, RoomCategory,
    Ward, WardUpdate,
};
use ward_core::vitals::{RecordVitals, VitalsRecord};
use ward_core::{AdministrationId, AdmissionId, BedId, EventId, OrderId, ScheduleId, WardId};

type Created<T> = (StatusCode, Json<T>);

fn created<T>(value: T) -> Created<T> {
    (StatusCode::CREATED, Json(value))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReasonReq {
    pub reason: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SummaryReq {
    pub summary: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeathReq {
    pub notes: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyReq {
    pub accepted: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SkipReq {
    pub due_at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct BedStatusReq {
    pub status: BedStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScheduleQuery {
    pub admission_id: Option<AdmissionId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MaterializeReq {
    #[serde(default)]
    pub schedule_id: Option<ScheduleId>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MaterializeRes {
    pub materialized: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OverdueAtExecutionRes {
    pub overdue: bool,
}

// ============================================================================
// Health
// ============================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancers. Needs no credentials.
pub async fn health() -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Ward REST API is alive".into(),
    })
}

// ============================================================================
// Bed & ward registry
// ============================================================================

#[utoipa::path(
    post,
    path = "/wards",
    responses(
        (status = 201, description = "Ward registered"),
        (status = 409, description = "Ward code already in use", body = ErrorBody)
    )
)]
pub async fn register_ward(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<NewWard>,
) -> ApiResult<Created<Ward>> {
    Ok(created(state.engine.registry().register_ward(&actor, req)?))
}

#[utoipa::path(get, path = "/wards", responses((status = 200, description = "All wards by code")))]
pub async fn list_wards(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ApiResult<Json<Vec<Ward>>> {
    Ok(Json(state.engine.registry().list_wards(&actor)?))
}

#[utoipa::path(
    get,
    path = "/wards/{id}",
    params(("id" = String, Path, description = "Ward id")),
    responses(
        (status = 200, description = "The ward"),
        (status = 404, description = "No such ward", body = ErrorBody)
    )
)]
pub async fn get_ward(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<WardId>,
) -> ApiResult<Json<Ward>> {
    Ok(Json(state.engine.registry().get_ward(&actor, id)?))
}

#[utoipa::path(
    put,
    path = "/wards/{id}",
    params(("id" = String, Path, description = "Ward id")),
    responses((status = 200, description = "Ward updated"))
)]
pub async fn update_ward(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<WardId>,
    Json(req): Json<WardUpdate>,
) -> ApiResult<Json<Ward>> {
    Ok(Json(state.engine.registry().update_ward(&actor, id, req)?))
}

#[utoipa::path(
    post,
    path = "/wards/{id}/deactivate",
    params(("id" = String, Path, description = "Ward id")),
    responses(
        (status = 200, description = "Ward deactivated"),
        (status = 409, description = "Ward still has occupied beds", body = ErrorBody)
    )
)]
pub async fn deactivate_ward(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<WardId>,
) -> ApiResult<Json<Ward>> {
    Ok(Json(state.engine.registry().deactivate_ward(&actor, id)?))
}

#[utoipa::path(post, path = "/room-categories", responses((status = 201, description = "Category registered")))]
pub async fn register_room_category(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<NewRoomCategory>,
) -> ApiResult<Created<RoomCategory>> {
    Ok(created(
        state.engine.registry().register_room_category(&actor, req)?,
    ))
}

#[utoipa::path(get, path = "/room-categories", responses((status = 200, description = "All room categories")))]
pub async fn list_room_categories(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ApiResult<Json<Vec<RoomCategory>>> {
    Ok(Json(state.engine.registry().list_room_categories(&actor)?))
}

#[utoipa::path(post, path = "/beds", responses((status = 201, description = "Bed registered")))]
pub async fn register_bed(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<NewBed>,
) -> ApiResult<Created<Bed>> {
    Ok(created(state.engine.registry().register_bed(&actor, req)?))
}

#[utoipa::path(
    get,
    path = "/beds",
    params(
        ("ward_id" = Option<String>, Query, description = "Only beds in this ward"),
        ("category_id" = Option<String>, Query, description = "Only beds of this room category"),
        ("status" = Option<String>, Query, description = "vacant, occupied, maintenance or reserved")
    ),
    responses((status = 200, description = "Matching beds by code"))
)]
pub async fn query_beds(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Query(filter): Query<BedFilter>,
) -> ApiResult<Json<Vec<Bed>>> {
    Ok(Json(state.engine.registry().query_beds(&actor, filter)?))
}

#[utoipa::path(
    get,
    path = "/beds/{id}",
    params(("id" = String, Path, description = "Bed id")),
    responses((status = 200, description = "The bed"))
)]
pub async fn get_bed(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<BedId>,
) -> ApiResult<Json<Bed>> {
    Ok(Json(state.engine.registry().get_bed(&actor, id)?))
}

#[utoipa::path(
    put,
    path = "/beds/{id}/status",
    params(("id" = String, Path, description = "Bed id")),
    responses(
        (status = 200, description = "Bed status changed"),
        (status = 409, description = "Bed is occupied", body = ErrorBody)
    )
)]
pub async fn set_bed_status(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<BedId>,
    Json(req): Json<BedStatusReq>,
) -> ApiResult<Json<Bed>> {
    Ok(Json(
        state
            .engine
            .registry()
            .set_bed_operational_status(&actor, id, req.status)?,
    ))
}

#[utoipa::path(
    get,
    path = "/beds/{id}/admission",
    params(("id" = String, Path, description = "Bed id")),
    responses((status = 200, description = "The active admission in the bed, or null"))
)]
pub async fn bed_admission(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<BedId>,
) -> ApiResult<Json<Option<Admission>>> {
    Ok(Json(
        state
            .engine
            .admissions()
            .active_admission_for_bed(&actor, id)?,
    ))
}

#[utoipa::path(get, path = "/occupancy/wards", responses((status = 200, description = "Bed counts per ward")))]
pub async fn ward_occupancy(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ApiResult<Json<Vec<OccupancySummary>>> {
    Ok(Json(state.engine.registry().ward_occupancy(&actor)?))
}

#[utoipa::path(get, path = "/occupancy/categories", responses((status = 200, description = "Bed counts per room category")))]
pub async fn category_occupancy(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ApiResult<Json<Vec<OccupancySummary>>> {
    Ok(Json(state.engine.registry().category_occupancy(&actor)?))
}

// ============================================================================
// Admissions
// ============================================================================

#[utoipa::path(
    post,
    path = "/admissions",
    responses(
        (status = 201, description = "Patient admitted and bed occupied"),
        (status = 404, description = "Unknown patient, ward or bed", body = ErrorBody),
        (status = 409, description = "Bed not available or patient already admitted", body = ErrorBody)
    )
)]
/// Admit a patient into a bed.
///
/// The bed claim and the admission are one atomic change: when two requests race for the same
/// bed exactly one succeeds and the other receives `409 Conflict`.
pub async fn admit(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<AdmitRequest>,
) -> ApiResult<Created<Admission>> {
    Ok(created(state.engine.admissions().admit(&actor, req)?))
}

#[utoipa::path(
    get,
    path = "/admissions",
    params(
        ("ward_id" = Option<String>, Query, description = "Only admissions to this ward"),
        ("patient_id" = Option<String>, Query, description = "Only this patient's admissions"),
        ("status" = Option<String>, Query, description = "active, discharged, transferred or deceased")
    ),
    responses((status = 200, description = "Matching admissions, newest first"))
)]
pub async fn list_admissions(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Query(filter): Query<AdmissionFilter>,
) -> ApiResult<Json<Vec<Admission>>> {
    Ok(Json(state.engine.admissions().list(&actor, filter)?))
}

#[utoipa::path(
    get,
    path = "/admissions/{id}",
    params(("id" = String, Path, description = "Admission id")),
    responses((status = 200, description = "The admission"))
)]
pub async fn get_admission(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<AdmissionId>,
) -> ApiResult<Json<Admission>> {
    Ok(Json(state.engine.admissions().get(&actor, id)?))
}

#[utoipa::path(
    post,
    path = "/admissions/{id}/discharge",
    params(("id" = String, Path, description = "Admission id")),
    request_body = SummaryReq,
    responses(
        (status = 200, description = "Patient discharged and bed released"),
        (status = 409, description = "Admission is not active", body = ErrorBody)
    )
)]
pub async fn discharge(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<AdmissionId>,
    Json(req): Json<SummaryReq>,
) -> ApiResult<Json<Admission>> {
    Ok(Json(
        state.engine.admissions().discharge(&actor, id, req.summary)?,
    ))
}

#[utoipa::path(
    put,
    path = "/admissions/{id}/discharge-summary",
    params(("id" = String, Path, description = "Admission id")),
    request_body = SummaryReq,
    responses((status = 200, description = "Discharge summary replaced"))
)]
pub async fn annotate_discharge_summary(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<AdmissionId>,
    Json(req): Json<SummaryReq>,
) -> ApiResult<Json<Admission>> {
    Ok(Json(
        state
            .engine
            .admissions()
            .annotate_discharge_summary(&actor, id, req.summary)?,
    ))
}

#[utoipa::path(
    post,
    path = "/admissions/{id}/transfer",
    params(("id" = String, Path, description = "Admission id")),
    responses(
        (status = 201, description = "The new admission in the destination bed"),
        (status = 409, description = "Destination bed not available", body = ErrorBody)
    )
)]
pub async fn transfer(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<AdmissionId>,
    Json(req): Json<TransferRequest>,
) -> ApiResult<Created<Admission>> {
    Ok(created(state.engine.admissions().transfer(&actor, id, req)?))
}

#[utoipa::path(
    post,
    path = "/admissions/{id}/death",
    params(("id" = String, Path, description = "Admission id")),
    request_body = DeathReq,
    responses((status = 200, description = "Death recorded and bed released"))
)]
pub async fn record_death(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<AdmissionId>,
    Json(req): Json<DeathReq>,
) -> ApiResult<Json<Admission>> {
    Ok(Json(
        state.engine.admissions().record_death(&actor, id, req.notes)?,
    ))
}

// ============================================================================
// Orders
// ============================================================================

#[utoipa::path(
    post,
    path = "/orders",
    responses(
        (status = 201, description = "Order created"),
        (status = 409, description = "Admission is not active", body = ErrorBody)
    )
)]
pub async fn create_order(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<NewOrder>,
) -> ApiResult<Created<DoctorOrder>> {
    Ok(created(state.engine.orders().create(&actor, req)?))
}

#[utoipa::path(
    get,
    path = "/orders",
    params(
        ("admission_id" = Option<String>, Query, description = "Only orders for this admission"),
        ("status" = Option<String>, Query, description = "active, on_hold, completed or cancelled")
    ),
    responses((status = 200, description = "Matching orders"))
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Query(filter): Query<OrderFilter>,
) -> ApiResult<Json<Vec<DoctorOrder>>> {
    Ok(Json(state.engine.orders().list(&actor, filter)?))
}

#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(("id" = String, Path, description = "Order id")),
    responses((status = 200, description = "The order"))
)]
pub async fn get_order(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<OrderId>,
) -> ApiResult<Json<DoctorOrder>> {
    Ok(Json(state.engine.orders().get(&actor, id)?))
}

#[utoipa::path(
    post,
    path = "/orders/{id}/approve",
    params(("id" = String, Path, description = "Order id")),
    responses((status = 200, description = "Order approved"))
)]
pub async fn approve_order(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<OrderId>,
) -> ApiResult<Json<DoctorOrder>> {
    Ok(Json(state.engine.orders().approve(&actor, id)?))
}

#[utoipa::path(
    post,
    path = "/orders/{id}/reject",
    params(("id" = String, Path, description = "Order id")),
    request_body = ReasonReq,
    responses((status = 200, description = "Order rejected"))
)]
pub async fn reject_order(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<OrderId>,
    Json(req): Json<ReasonReq>,
) -> ApiResult<Json<DoctorOrder>> {
    Ok(Json(state.engine.orders().reject(&actor, id, req.reason)?))
}

#[utoipa::path(
    post,
    path = "/orders/{id}/cancel",
    params(("id" = String, Path, description = "Order id")),
    request_body = ReasonReq,
    responses((status = 200, description = "Order cancelled"))
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<OrderId>,
    Json(req): Json<ReasonReq>,
) -> ApiResult<Json<DoctorOrder>> {
    Ok(Json(state.engine.orders().cancel(&actor, id, req.reason)?))
}

#[utoipa::path(
    post,
    path = "/orders/{id}/hold",
    params(("id" = String, Path, description = "Order id")),
    responses((status = 200, description = "Order on hold"))
)]
pub async fn hold_order(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<OrderId>,
) -> ApiResult<Json<DoctorOrder>> {
    Ok(Json(state.engine.orders().hold(&actor, id)?))
}

#[utoipa::path(
    post,
    path = "/orders/{id}/resume",
    params(("id" = String, Path, description = "Order id")),
    responses((status = 200, description = "Order active again"))
)]
pub async fn resume_order(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<OrderId>,
) -> ApiResult<Json<DoctorOrder>> {
    Ok(Json(state.engine.orders().resume(&actor, id)?))
}

#[utoipa::path(
    post,
    path = "/orders/{id}/complete",
    params(("id" = String, Path, description = "Order id")),
    responses((status = 200, description = "Order completed"))
)]
pub async fn complete_order(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<OrderId>,
) -> ApiResult<Json<DoctorOrder>> {
    Ok(Json(state.engine.orders().complete(&actor, id)?))
}

// ============================================================================
// Medication schedules and tasks
// ============================================================================

#[utoipa::path(
    post,
    path = "/schedules",
    responses(
        (status = 201, description = "Schedule created and first window materialized"),
        (status = 400, description = "Unrecognised frequency or invalid dates", body = ErrorBody)
    )
)]
pub async fn create_schedule(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<NewSchedule>,
) -> ApiResult<Created<MedicationSchedule>> {
    Ok(created(
        state.engine.medication().create_schedule(&actor, req)?,
    ))
}

#[utoipa::path(
    get,
    path = "/schedules",
    params(("admission_id" = Option<String>, Query, description = "Only schedules for this admission")),
    responses((status = 200, description = "Matching schedules"))
)]
pub async fn list_schedules(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Query(query): Query<ScheduleQuery>,
) -> ApiResult<Json<Vec<MedicationSchedule>>> {
    Ok(Json(
        state
            .engine
            .medication()
            .list_schedules(&actor, query.admission_id)?,
    ))
}

#[utoipa::path(
    get,
    path = "/schedules/{id}",
    params(("id" = String, Path, description = "Schedule id")),
    responses((status = 200, description = "The schedule"))
)]
pub async fn get_schedule(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<ScheduleId>,
) -> ApiResult<Json<MedicationSchedule>> {
    Ok(Json(state.engine.medication().get_schedule(&actor, id)?))
}

#[utoipa::path(
    get,
    path = "/schedules/{id}/due-instants",
    params(("id" = String, Path, description = "Schedule id")),
    responses((status = 200, description = "Every due instant of the course, ascending"))
)]
pub async fn due_instants(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<ScheduleId>,
) -> ApiResult<Json<Vec<DateTime<Utc>>>> {
    Ok(Json(state.engine.medication().due_instants(&actor, id)?))
}

#[utoipa::path(
    post,
    path = "/schedules/{id}/pause",
    params(("id" = String, Path, description = "Schedule id")),
    responses((status = 200, description = "Schedule paused"))
)]
pub async fn pause_schedule(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<ScheduleId>,
) -> ApiResult<Json<MedicationSchedule>> {
    Ok(Json(state.engine.medication().pause_schedule(&actor, id)?))
}

#[utoipa::path(
    post,
    path = "/schedules/{id}/resume",
    params(("id" = String, Path, description = "Schedule id")),
    responses((status = 200, description = "Schedule active again"))
)]
pub async fn resume_schedule(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<ScheduleId>,
) -> ApiResult<Json<MedicationSchedule>> {
    Ok(Json(state.engine.medication().resume_schedule(&actor, id)?))
}

#[utoipa::path(
    post,
    path = "/schedules/{id}/cancel",
    params(("id" = String, Path, description = "Schedule id")),
    responses((status = 200, description = "Schedule cancelled"))
)]
pub async fn cancel_schedule(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<ScheduleId>,
) -> ApiResult<Json<MedicationSchedule>> {
    Ok(Json(state.engine.medication().cancel_schedule(&actor, id)?))
}

#[utoipa::path(
    post,
    path = "/materialize",
    responses((status = 200, description = "Number of tasks created", body = MaterializeRes))
)]
/// Run the materializer now, for one schedule or for every active one.
pub async fn materialize(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<MaterializeReq>,
) -> ApiResult<Json<MaterializeRes>> {
    let materialized = state
        .engine
        .medication()
        .materialize_due_tasks(&actor, req.schedule_id)?;
    Ok(Json(MaterializeRes { materialized }))
}

#[utoipa::path(
    post,
    path = "/schedules/{id}/administrations",
    params(("id" = String, Path, description = "Schedule id")),
    responses(
        (status = 200, description = "Dose recorded as administered"),
        (status = 409, description = "Dose already administered or omitted", body = ErrorBody)
    )
)]
pub async fn execute_medication(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<ScheduleId>,
    Json(req): Json<ExecuteRequest>,
) -> ApiResult<Json<MedicationAdministration>> {
    Ok(Json(
        state
            .engine
            .medication()
            .execute_medication(&actor, id, req)?,
    ))
}

#[utoipa::path(
    post,
    path = "/schedules/{id}/omissions",
    params(("id" = String, Path, description = "Schedule id")),
    responses((status = 200, description = "Omission recorded"))
)]
pub async fn record_omission(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<ScheduleId>,
    Json(req): Json<OmissionRequest>,
) -> ApiResult<Json<MedicationAdministration>> {
    Ok(Json(
        state.engine.medication().record_omission(&actor, id, req)?,
    ))
}

#[utoipa::path(
    post,
    path = "/schedules/{id}/skip",
    params(("id" = String, Path, description = "Schedule id")),
    request_body = SkipReq,
    responses((status = 200, description = "Dose marked as not given"))
)]
pub async fn skip_medication(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<ScheduleId>,
    Json(req): Json<SkipReq>,
) -> ApiResult<Json<MedicationAdministration>> {
    Ok(Json(state.engine.medication().skip_medication(
        &actor,
        id,
        req.due_at,
        req.reason,
    )?))
}

#[utoipa::path(
    get,
    path = "/administrations",
    params(
        ("schedule_id" = Option<String>, Query, description = "Only this schedule's tasks"),
        ("admission_id" = Option<String>, Query, description = "Only this admission's tasks"),
        ("status" = Option<String>, Query, description = "Task status")
    ),
    responses((status = 200, description = "Matching administration tasks by due time"))
)]
pub async fn list_administrations(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Query(filter): Query<AdministrationFilter>,
) -> ApiResult<Json<Vec<MedicationAdministration>>> {
    Ok(Json(
        state
            .engine
            .medication()
            .list_administrations(&actor, filter)?,
    ))
}

#[utoipa::path(
    get,
    path = "/administrations/{id}",
    params(("id" = String, Path, description = "Administration id")),
    responses((status = 200, description = "The administration task"))
)]
pub async fn get_administration(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<AdministrationId>,
) -> ApiResult<Json<MedicationAdministration>> {
    Ok(Json(
        state.engine.medication().get_administration(&actor, id)?,
    ))
}

#[utoipa::path(
    post,
    path = "/administrations/{id}/verify",
    params(("id" = String, Path, description = "Administration id")),
    request_body = VerifyReq,
    responses(
        (status = 200, description = "Administration verified"),
        (status = 400, description = "Verifier administered the dose", body = ErrorBody)
    )
)]
pub async fn verify_administration(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<AdministrationId>,
    Json(req): Json<VerifyReq>,
) -> ApiResult<Json<MedicationAdministration>> {
    Ok(Json(state.engine.medication().verify_administration(
        &actor,
        id,
        req.accepted,
        req.notes,
    )?))
}

#[utoipa::path(
    get,
    path = "/administrations/{id}/overdue",
    params(("id" = String, Path, description = "Administration id")),
    responses((status = 200, description = "Whether the dose was given late", body = OverdueAtExecutionRes))
)]
pub async fn was_overdue_at_execution(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<AdministrationId>,
) -> ApiResult<Json<OverdueAtExecutionRes>> {
    let overdue = state
        .engine
        .medication()
        .was_overdue_at_execution(&actor, id)?;
    Ok(Json(OverdueAtExecutionRes { overdue }))
}

#[utoipa::path(
    get,
    path = "/overdue",
    params(
        ("ward_id" = Option<String>, Query, description = "Only tasks on this ward"),
        ("admission_id" = Option<String>, Query, description = "Only this admission's tasks")
    ),
    responses((status = 200, description = "Pending tasks past their due time, most overdue first"))
)]
pub async fn list_overdue(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Query(filter): Query<OverdueFilter>,
) -> ApiResult<Json<Vec<OverdueTask>>> {
    Ok(Json(state.engine.medication().list_overdue(&actor, filter)?))
}

// ============================================================================
// Vitals
// ============================================================================

#[utoipa::path(
    post,
    path = "/vitals",
    responses(
        (status = 201, description = "Observations recorded"),
        (status = 400, description = "Observation out of range", body = ErrorBody)
    )
)]
pub async fn record_vitals(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<RecordVitals>,
) -> ApiResult<Created<VitalsRecord>> {
    Ok(created(state.engine.vitals().record_vitals(&actor, req)?))
}

#[utoipa::path(
    get,
    path = "/admissions/{id}/vitals",
    params(("id" = String, Path, description = "Admission id")),
    responses((status = 200, description = "Observations, newest first"))
)]
pub async fn list_vitals(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<AdmissionId>,
) -> ApiResult<Json<Vec<VitalsRecord>>> {
    Ok(Json(state.engine.vitals().list_vitals(&actor, id)?))
}

#[utoipa::path(
    get,
    path = "/admissions/{id}/vitals/latest",
    params(("id" = String, Path, description = "Admission id")),
    responses((status = 200, description = "The latest observations, or null"))
)]
pub async fn latest_vitals(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<AdmissionId>,
) -> ApiResult<Json<Option<VitalsRecord>>> {
    Ok(Json(state.engine.vitals().latest_vitals(&actor, id)?))
}

// ============================================================================
// Emergency events
// ============================================================================

#[utoipa::path(
    post,
    path = "/emergencies",
    responses((status = 201, description = "Event raised and doctors notified"))
)]
pub async fn raise_event(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<RaiseEvent>,
) -> ApiResult<Created<EmergencyEvent>> {
    Ok(created(state.engine.emergency().raise(&actor, req)?))
}

#[utoipa::path(
    get,
    path = "/emergencies",
    params(
        ("ward_id" = Option<String>, Query, description = "Only events linked to admissions on this ward"),
        ("status" = Option<String>, Query, description = "Event status"),
        ("open_only" = Option<bool>, Query, description = "Exclude resolved events")
    ),
    responses((status = 200, description = "Matching events, most severe first"))
)]
pub async fn list_events(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Query(filter): Query<EventFilter>,
) -> ApiResult<Json<Vec<EmergencyEvent>>> {
    Ok(Json(state.engine.emergency().list(&actor, filter)?))
}

#[utoipa::path(
    get,
    path = "/emergencies/{id}",
    params(("id" = String, Path, description = "Event id")),
    responses((status = 200, description = "The event"))
)]
pub async fn get_event(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<EventId>,
) -> ApiResult<Json<EmergencyEvent>> {
    Ok(Json(state.engine.emergency().get(&actor, id)?))
}

#[utoipa::path(
    post,
    path = "/emergencies/{id}/acknowledge",
    params(("id" = String, Path, description = "Event id")),
    responses(
        (status = 200, description = "Response started"),
        (status = 409, description = "Event is not in reported status", body = ErrorBody)
    )
)]
pub async fn acknowledge_event(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<EventId>,
) -> ApiResult<Json<EmergencyEvent>> {
    Ok(Json(state.engine.emergency().acknowledge(&actor, id)?))
}

#[utoipa::path(
    post,
    path = "/emergencies/{id}/escalate",
    params(("id" = String, Path, description = "Event id")),
    responses((status = 200, description = "Event escalated"))
)]
pub async fn escalate_event(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<EventId>,
    Json(req): Json<EscalateEvent>,
) -> ApiResult<Json<EmergencyEvent>> {
    Ok(Json(state.engine.emergency().escalate(&actor, id, req)?))
}

#[utoipa::path(
    post,
    path = "/emergencies/{id}/resolve",
    params(("id" = String, Path, description = "Event id")),
    responses(
        (status = 200, description = "Event resolved"),
        (status = 409, description = "Event was never acknowledged or escalated", body = ErrorBody)
    )
)]
pub async fn resolve_event(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<EventId>,
    Json(req): Json<ResolveEvent>,
) -> ApiResult<Json<EmergencyEvent>> {
    Ok(Json(state.engine.emergency().resolve(&actor, id, req)?))
}
