//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into the engine. Environment variables are read by the binaries and handed to the
//! parsing helpers here, so request handling never touches process-wide state.

use crate::constants::{
    DEFAULT_MATERIALIZATION_WINDOW_HOURS, DEFAULT_MATERIALIZER_TICK_SECS,
    MAX_MATERIALIZATION_WINDOW_HOURS,
};
use crate::{EngineError, EngineResult};
use std::path::{Path, PathBuf};

/// Engine configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    materialization_window: chrono::Duration,
    materializer_tick: std::time::Duration,
    seed_file: Option<PathBuf>,
}

impl EngineConfig {
    /// Create a new `EngineConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] if the window is outside
    /// `1..=MAX_MATERIALIZATION_WINDOW_HOURS` hours or the tick is zero.
    pub fn new(
        materialization_window_hours: i64,
        materializer_tick_secs: u64,
        seed_file: Option<PathBuf>,
    ) -> EngineResult<Self> {
        if !(1..=MAX_MATERIALIZATION_WINDOW_HOURS).contains(&materialization_window_hours) {
            return Err(EngineError::InvalidInput(format!(
                "materialization window must be between 1 and {} hours, got {}",
                MAX_MATERIALIZATION_WINDOW_HOURS, materialization_window_hours
            )));
        }
        if materializer_tick_secs == 0 {
            return Err(EngineError::InvalidInput(
                "materializer tick must be at least one second".into(),
            ));
        }

        Ok(Self {
            materialization_window: chrono::Duration::hours(materialization_window_hours),
            materializer_tick: std::time::Duration::from_secs(materializer_tick_secs),
            seed_file,
        })
    }

    /// How far ahead of "now" due instants are materialized.
    pub fn materialization_window(&self) -> chrono::Duration {
        self.materialization_window
    }

    pub fn materializer_tick(&self) -> std::time::Duration {
        self.materializer_tick
    }

    pub fn seed_file(&self) -> Option<&Path> {
        self.seed_file.as_deref()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            materialization_window: chrono::Duration::hours(DEFAULT_MATERIALIZATION_WINDOW_HOURS),
            materializer_tick: std::time::Duration::from_secs(DEFAULT_MATERIALIZER_TICK_SECS),
            seed_file: None,
        }
    }
}

/// Parse the materialization window (hours) from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the default window.
pub fn window_hours_from_env_value(value: Option<String>) -> EngineResult<i64> {
    parse_optional(value, DEFAULT_MATERIALIZATION_WINDOW_HOURS, "materialization window")
}

/// Parse the materializer tick period (seconds) from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the default tick.
pub fn tick_secs_from_env_value(value: Option<String>) -> EngineResult<u64> {
    parse_optional(value, DEFAULT_MATERIALIZER_TICK_SECS, "materializer tick")
}

/// Parse the seed file path from an optional string value; empty means "no seed file".
pub fn seed_file_from_env_value(value: Option<String>) -> Option<PathBuf> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn parse_optional<T>(value: Option<String>, default: T, what: &str) -> EngineResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    match value {
        None => Ok(default),
        Some(v) => v
            .parse::<T>()
            .map_err(|e| EngineError::InvalidInput(format!("invalid {what} '{v}': {e}"))),
    }
}
