//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Useful for development and debugging when you only want the REST server (with
//! OpenAPI/Swagger UI). Due instants are still materialized on demand whenever tasks are
//! listed or executed; the workspace's main `ward-run` binary additionally runs the periodic
//! materializer.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::startup::{build_engine, config_from_env};
use api_rest::{router, AppState};

/// Main entry point for the ward REST API server
///
/// # Environment Variables
/// - `WARD_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `API_KEY`: Expected `x-api-key`; unset disables the check
/// - plus the engine variables read by [`config_from_env`]
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the engine configuration or seed file is invalid,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("ward=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("WARD_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    tracing::info!("-- Starting ward REST API on {}", addr);

    let cfg = Arc::new(config_from_env()?);
    let engine = build_engine(cfg)?;
    let app = router(AppState::new(engine, std::env::var("API_KEY").ok()));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
