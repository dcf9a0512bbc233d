//! Recurrence rules for medication schedules.
//!
//! A prescribed frequency string is parsed once, when the schedule is created, into a
//! [`Frequency`]. Expansion into due instants is a pure function of the rule, the schedule's
//! start and end, and a horizon, so it can be re-run any number of times with the same result.
//!
//! Accepted vocabulary (case-insensitive, surrounding and repeated whitespace ignored):
//!
//! | Rule                                             | Meaning             |
//! |--------------------------------------------------|---------------------|
//! | `once daily`, `once a day`, `daily`, `od`, `qd`  | every 24 hours      |
//! | `twice daily`, `twice a day`, `bd`, `bid`        | every 12 hours      |
//! | `three times daily`, `three times a day`, `tds`, `tid` | every 8 hours |
//! | `four times daily`, `four times a day`, `qds`, `qid`   | every 6 hours |
//! | `every N hours`, `every hour`, `qNh`             | every N hours       |
//! | `as needed`, `prn`                               | no automatic doses  |
//! | `once`, `stat`                                   | a single dose at start |

use crate::constants::MAX_FREQUENCY_INTERVAL_HOURS;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrequencyError {
    #[error("frequency cannot be empty")]
    Empty,
    #[error("unrecognised frequency: '{0}'")]
    Unrecognised(String),
    #[error("frequency interval must be between 1 and {max} hours, got {hours}")]
    IntervalOutOfRange { hours: u64, max: u32 },
}

/// A parsed recurrence rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Frequency {
    /// A dose every `n` hours from the schedule start.
    EveryHours(u32),
    /// A single dose at the schedule start.
    Once,
    /// No automatic doses; records are created when a dose is given or skipped.
    AsNeeded,
}

impl Frequency {
    pub fn parse(input: &str) -> Result<Self, FrequencyError> {
        let normalised = input
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();
        if normalised.is_empty() {
            return Err(FrequencyError::Empty);
        }

        let fixed = match normalised.as_str() {
            "once daily" | "once a day" | "daily" | "od" | "qd" => Some(24),
            "twice daily" | "twice a day" | "bd" | "bid" => Some(12),
            "three times daily" | "three times a day" | "tds" | "tid" => Some(8),
            "four times daily" | "four times a day" | "qds" | "qid" => Some(6),
            "every hour" => Some(1),
            "as needed" | "prn" => return Ok(Frequency::AsNeeded),
            "once" | "stat" => return Ok(Frequency::Once),
            _ => None,
        };
        if let Some(hours) = fixed {
            return Ok(Frequency::EveryHours(hours));
        }

        let hours = parse_every_n_hours(&normalised)
            .or_else(|| parse_q_n_h(&normalised))
            .ok_or_else(|| FrequencyError::Unrecognised(input.trim().to_string()))?;
        interval_in_range(hours).map(Frequency::EveryHours)
    }

    /// The fixed spacing between doses, if the rule has one.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Frequency::EveryHours(h) => Some(Duration::hours(i64::from(*h))),
            Frequency::Once | Frequency::AsNeeded => None,
        }
    }

    /// Due instants of a schedule, in order.
    ///
    /// Instants are `start, start + interval, ...`, kept while strictly before `end` and no
    /// later than `horizon`.
    pub fn due_instants(
        &self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        horizon: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        let within = |t: DateTime<Utc>| t <= horizon && end.is_none_or(|e| t < e);

        match self {
            Frequency::AsNeeded => Vec::new(),
            Frequency::Once => {
                if within(start) {
                    vec![start]
                } else {
                    Vec::new()
                }
            }
            Frequency::EveryHours(h) => {
                let step = Duration::hours(i64::from(*h));
                let mut out = Vec::new();
                let mut next = start;
                while within(next) {
                    out.push(next);
                    match next.checked_add_signed(step) {
                        Some(t) => next = t,
                        None => break,
                    }
                }
                out
            }
        }
    }

    /// Whether `instant` is one of the schedule's due instants (ignoring any horizon).
    ///
    /// For as-needed rules every instant inside the schedule's active period qualifies.
    pub fn is_due_instant(
        &self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        instant: DateTime<Utc>,
    ) -> bool {
        if instant < start || end.is_some_and(|e| instant >= e) {
            return false;
        }
        match self {
            Frequency::AsNeeded => true,
            Frequency::Once => instant == start,
            Frequency::EveryHours(h) => {
                let offset = instant - start;
                offset.subsec_nanos() == 0 && offset.num_seconds() % (i64::from(*h) * 3600) == 0
            }
        }
    }
}

fn parse_every_n_hours(s: &str) -> Option<u64> {
    let rest = s.strip_prefix("every ")?;
    let number = rest
        .strip_suffix(" hours")
        .or_else(|| rest.strip_suffix(" hour"))
        .or_else(|| rest.strip_suffix(" hrs"))
        .or_else(|| rest.strip_suffix(" hr"))
        .or_else(|| rest.strip_suffix('h'))?;
    number.trim().parse().ok()
}

fn parse_q_n_h(s: &str) -> Option<u64> {
    let number = s.strip_prefix('q')?.strip_suffix('h')?;
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    number.parse().ok()
}

fn interval_in_range(hours: u64) -> Result<u32, FrequencyError> {
    match u32::try_from(hours) {
        Ok(h) if (1..=MAX_FREQUENCY_INTERVAL_HOURS).contains(&h) => Ok(h),
        _ => Err(FrequencyError::IntervalOutOfRange {
            hours,
            max: MAX_FREQUENCY_INTERVAL_HOURS,
        }),
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::EveryHours(1) => f.write_str("every hour"),
            Frequency::EveryHours(h) => write!(f, "every {h} hours"),
            Frequency::Once => f.write_str("once"),
            Frequency::AsNeeded => f.write_str("as needed"),
        }
    }
}

impl FromStr for Frequency {
    type Err = FrequencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Frequency::parse(s)
    }
}

impl serde::Serialize for Frequency {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Frequency {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Frequency::parse(&s).map_err(serde::de::Error::custom)
    }
}
