//! Process start-up shared by the REST binaries.

use std::sync::Arc;
use ward_core::config::{
    seed_file_from_env_value, tick_secs_from_env_value, window_hours_from_env_value,
};
use ward_core::constants::{ENV_MATERIALIZER_TICK_SECS, ENV_MATERIALIZE_WINDOW_HOURS, ENV_SEED_FILE};
use ward_core::notify::TracingNotifier;
use ward_core::{Actor, Engine, EngineConfig, InMemoryPatientDirectory, SeedFile, TracingAuditSink};

use crate::dispatch::{QueuedAuditSink, QueuedNotifier, DISPATCH_QUEUE_CAPACITY};

/// Resolve [`EngineConfig`] from the process environment.
///
/// # Environment Variables
/// - `WARD_MATERIALIZE_WINDOW_HOURS`: look-ahead window (default 48)
/// - `WARD_MATERIALIZER_TICK_SECS`: background materializer period (default 300)
/// - `WARD_SEED_FILE`: optional registry seed file
pub fn config_from_env() -> anyhow::Result<EngineConfig> {
    let window = window_hours_from_env_value(std::env::var(ENV_MATERIALIZE_WINDOW_HOURS).ok())?;
    let tick = tick_secs_from_env_value(std::env::var(ENV_MATERIALIZER_TICK_SECS).ok())?;
    let seed = seed_file_from_env_value(std::env::var(ENV_SEED_FILE).ok());
    Ok(EngineConfig::new(window, tick, seed)?)
}

/// Build an engine for `cfg`, applying the configured seed file if there is one.
///
/// Audit entries and notifications are delivered from background tasks, so this must be
/// called inside a tokio runtime.
///
/// # Errors
/// Returns an error if the seed file cannot be read, does not match the schema, or conflicts
/// with itself (duplicate codes, unknown references).
pub fn build_engine(cfg: Arc<EngineConfig>) -> anyhow::Result<Engine> {
    let patients = Arc::new(InMemoryPatientDirectory::new());
    let engine = Engine::builder(cfg.clone())
        .patients(patients.clone())
        .audit_sink(Arc::new(QueuedAuditSink::spawn(
            Arc::new(TracingAuditSink),
            DISPATCH_QUEUE_CAPACITY,
        )))
        .notifier(Arc::new(QueuedNotifier::spawn(
            Arc::new(TracingNotifier),
            DISPATCH_QUEUE_CAPACITY,
        )))
        .build();

    if let Some(path) = cfg.seed_file() {
        let seed = SeedFile::load(path)?;
        let summary = seed.apply(&engine, &Actor::system(), &patients)?;
        tracing::info!(
            "-- Seeded {} wards, {} beds, {} patients from {}",
            summary.wards,
            summary.beds,
            summary.patients,
            path.display()
        );
    }

    Ok(engine)
}
