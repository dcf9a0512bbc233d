//! # API REST
//!
//! REST API for the ward engine.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, caller identity headers)
//!
//! Every clinical endpoint expects `x-actor-id` and `x-actor-role` headers, plus `x-api-key`
//! when a key is configured. Engine error kinds map onto status codes: not found `404`,
//! conflict `409`, validation `400`, forbidden `403`.

#![warn(rust_2018_idioms)]

pub mod auth;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod startup;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use ward_core::Engine;

/// Application state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    /// Expected `x-api-key`; `None` disables the check.
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(engine: Engine, api_key: Option<String>) -> Self {
        Self {
            engine,
            api_key: api_key.filter(|k| !k.is_empty()).map(Arc::from),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::register_ward,
        handlers::list_wards,
        handlers::get_ward,
        handlers::update_ward,
        handlers::deactivate_ward,
        handlers::register_room_category,
        handlers::list_room_categories,
        handlers::register_bed,
        handlers::query_beds,
        handlers::get_bed,
        handlers::set_bed_status,
        handlers::bed_admission,
        handlers::ward_occupancy,
        handlers::category_occupancy,
        handlers::admit,
        handlers::list_admissions,
        handlers::get_admission,
        handlers::discharge,
        handlers::annotate_discharge_summary,
        handlers::transfer,
        handlers::record_death,
        handlers::create_order,
        handlers::list_orders,
        handlers::get_order,
        handlers::approve_order,
        handlers::reject_order,
        handlers::cancel_order,
        handlers::hold_order,
        handlers::resume_order,
        handlers::complete_order,
        handlers::create_schedule,
        handlers::list_schedules,
        handlers::get_schedule,
        handlers::due_instants,
        handlers::pause_schedule,
        handlers::resume_schedule,
        handlers::cancel_schedule,
        handlers::materialize,
        handlers::execute_medication,
        handlers::record_omission,
        handlers::skip_medication,
        handlers::list_administrations,
        handlers::get_administration,
        handlers::verify_administration,
        handlers::was_overdue_at_execution,
        handlers::list_overdue,
        handlers::record_vitals,
        handlers::list_vitals,
        handlers::latest_vitals,
        handlers::raise_event,
        handlers::list_events,
        handlers::get_event,
        handlers::acknowledge_event,
        handlers::escalate_event,
        handlers::resolve_event,
    ),
    components(schemas(
        error::ErrorBody,
        handlers::HealthRes,
        handlers::ReasonReq,
        handlers::SummaryReq,
        handlers::DeathReq,
        handlers::VerifyReq,
        handlers::SkipReq,
        handlers::MaterializeRes,
        handlers::OverdueAtExecutionRes,
    ))
)]
pub struct ApiDoc;

/// Build the REST router, including Swagger UI at `/swagger-ui`.
pub fn router(state: AppState) -> Router {
    use handlers::*;

    Router::new()
        .route("/health", get(health))
        .route("/wards", get(list_wards).post(register_ward))
        .route("/wards/:id", get(get_ward).put(update_ward))
        .route("/wards/:id/deactivate", post(deactivate_ward))
        .route(
            "/room-categories",
            get(list_room_categories).post(register_room_category),
        )
        .route("/beds", get(query_beds).post(register_bed))
        .route("/beds/:id", get(get_bed))
        .route("/beds/:id/status", put(set_bed_status))
        .route("/beds/:id/admission", get(bed_admission))
        .route("/occupancy/wards", get(ward_occupancy))
        .route("/occupancy/categories", get(category_occupancy))
        .route("/admissions", get(list_admissions).post(admit))
        .route("/admissions/:id", get(get_admission))
        .route("/admissions/:id/discharge", post(discharge))
        .route(
            "/admissions/:id/discharge-summary",
            put(annotate_discharge_summary),
        )
        .route("/admissions/:id/transfer", post(transfer))
        .route("/admissions/:id/death", post(record_death))
        .route("/admissions/:id/vitals", get(list_vitals))
        .route("/admissions/:id/vitals/latest", get(latest_vitals))
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/approve", post(approve_order))
        .route("/orders/:id/reject", post(reject_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/hold", post(hold_order))
        .route("/orders/:id/resume", post(resume_order))
        .route("/orders/:id/complete", post(complete_order))
        .route("/schedules", get(list_schedules).post(create_schedule))
        .route("/schedules/:id", get(get_schedule))
        .route("/schedules/:id/due-instants", get(due_instants))
        .route("/schedules/:id/pause", post(pause_schedule))
        .route("/schedules/:id/resume", post(resume_schedule))
        .route("/schedules/:id/cancel", post(cancel_schedule))
        .route("/schedules/:id/administrations", post(execute_medication))
        .route("/schedules/:id/omissions", post(record_omission))
        .route("/schedules/:id/skip", post(skip_medication))
        .route("/materialize", post(materialize))
        .route("/administrations", get(list_administrations))
        .route("/administrations/:id", get(get_administration))
        .route("/administrations/:id/verify", post(verify_administration))
        .route(
            "/administrations/:id/overdue",
            get(was_overdue_at_execution),
        )
        .route("/overdue", get(list_overdue))
        .route("/vitals", post(record_vitals))
        .route("/emergencies", get(list_events).post(raise_event))
        .route("/emergencies/:id", get(get_event))
        .route("/emergencies/:id/acknowledge", post(acknowledge_event))
        .route("/emergencies/:id/escalate", post(escalate_event))
        .route("/emergencies/:id/resolve", post(resolve_event))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
