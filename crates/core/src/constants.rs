//! Constants used throughout the ward core crate.

/// Default look-ahead window, in hours, for materializing medication due instants.
pub const DEFAULT_MATERIALIZATION_WINDOW_HOURS: i64 = 48;

/// Upper bound on the materialization window. Larger windows pre-create far-future tasks.
pub const MAX_MATERIALIZATION_WINDOW_HOURS: i64 = 168;

/// Default period of the background materializer tick, in seconds.
pub const DEFAULT_MATERIALIZER_TICK_SECS: u64 = 300;

/// Longest course, in days, a schedule may be prescribed for via `duration_days`.
pub const MAX_COURSE_DAYS: u32 = 365;

/// Longest supported interval for an `every N hours` frequency rule.
pub const MAX_FREQUENCY_INTERVAL_HOURS: u32 = 168;

/// Environment variable naming the materialization window in hours.
pub const ENV_MATERIALIZE_WINDOW_HOURS: &str = "WARD_MATERIALIZE_WINDOW_HOURS";

/// Environment variable naming the materializer tick period in seconds.
pub const ENV_MATERIALIZER_TICK_SECS: &str = "WARD_MATERIALIZER_TICK_SECS";

/// Environment variable naming an optional registry seed file.
pub const ENV_SEED_FILE: &str = "WARD_SEED_FILE";
