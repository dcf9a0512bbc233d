use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::startup::{build_engine, config_from_env};
use api_rest::{AppState, router};
use ward_core::Engine;

/// Main entry point for the ward engine
///
/// Serves the REST API and runs the periodic medication materializer side by side:
/// - REST server on port 3000 (configurable via WARD_REST_ADDR)
/// - materializer every `WARD_MATERIALIZER_TICK_SECS` seconds
///
/// # Environment Variables
/// - `WARD_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `API_KEY`: Expected `x-api-key` header; unset disables the check
/// - `WARD_MATERIALIZE_WINDOW_HOURS`: Look-ahead window for pending doses (default: 48)
/// - `WARD_MATERIALIZER_TICK_SECS`: Materializer period (default: 300)
/// - `WARD_SEED_FILE`: Optional YAML registry seed
///
/// # Returns
/// * `Ok(())` - If the server runs and shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, seeding or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ward=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("WARD_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = Arc::new(config_from_env()?);
    let engine = build_engine(cfg.clone())?;

    tracing::info!("++ Starting ward REST on {}", rest_addr);
    tracing::info!(
        "++ Materializing {}h ahead every {:?}",
        cfg.materialization_window().num_hours(),
        cfg.materializer_tick()
    );

    let materializer = tokio::spawn(run_materializer(engine.clone(), cfg.materializer_tick()));

    let app = router(AppState::new(engine, std::env::var("API_KEY").ok()));
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    let rest_result = axum::serve(listener, app).await;

    materializer.abort();
    rest_result?;

    Ok(())
}

/// Materialize due doses for every active schedule once per `period`.
///
/// A failed tick is logged and retried on the next one.
async fn run_materializer(engine: Engine, period: std::time::Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        match engine.medication().tick() {
            Ok(0) => tracing::debug!("materializer tick: nothing new"),
            Ok(created) => tracing::info!("materializer tick: {} pending doses created", created),
            Err(e) => tracing::warn!("materializer tick failed: {}", e),
        }
    }
}
