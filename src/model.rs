//! Roast data model: sensor readings, derived metrics, event timestamps.
//!
//! [`SensorReading`] is produced once per poll cycle by a roaster port and
//! consumed once by the tracker.  [`RoastMetrics`] is owned and recomputed
//! by the tracker on every update; everything here is a plain value type
//! that is copied out of the session lock, never shared by reference.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Sensor reading
// ---------------------------------------------------------------------------

/// Immutable point-in-time snapshot of the roaster's sensors and actuators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub timestamp: DateTime<Utc>,
    pub bean_temp_c: f64,
    pub chamber_temp_c: f64,
    pub fan_pct: u8,
    pub heat_pct: u8,
}

impl SensorReading {
    pub fn new(
        timestamp: DateTime<Utc>,
        bean_temp_c: f64,
        chamber_temp_c: f64,
        fan_pct: u8,
        heat_pct: u8,
    ) -> Self {
        Self {
            timestamp,
            bean_temp_c,
            chamber_temp_c,
            fan_pct,
            heat_pct,
        }
    }
}

// ---------------------------------------------------------------------------
// Derived metrics
// ---------------------------------------------------------------------------

/// Metrics derived from the reading stream.  `None` means "not yet known".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RoastMetrics {
    /// Seconds since beans-added, or since the first reading before T0.
    pub elapsed_s: f64,
    pub rate_of_rise_c_per_min: Option<f64>,
    pub beans_added_temp_c: Option<f64>,
    pub first_crack_temp_c: Option<f64>,
    pub development_time_s: Option<f64>,
    pub development_time_pct: Option<f64>,
    pub drop_temp_c: Option<f64>,
    /// Drop minus T0, once both exist.
    pub total_duration_s: Option<f64>,
}

// ---------------------------------------------------------------------------
// Roast events
// ---------------------------------------------------------------------------

/// The three write-once events of a roast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoastEventKind {
    BeansAdded,
    FirstCrack,
    Drop,
}

impl fmt::Display for RoastEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeansAdded => write!(f, "beans added"),
            Self::FirstCrack => write!(f, "first crack"),
            Self::Drop => write!(f, "drop"),
        }
    }
}

/// UTC timestamps of the session and its roast events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventTimestamps {
    pub session_start: DateTime<Utc>,
    pub beans_added: Option<DateTime<Utc>>,
    pub first_crack: Option<DateTime<Utc>>,
    pub drop: Option<DateTime<Utc>>,
}

/// Parse an RFC 3339 timestamp from a remote caller into UTC.
pub fn parse_utc_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::validation(format!("malformed timestamp '{raw}': {e}")))
}

/// Seconds between two UTC instants, with sub-second precision.
pub(crate) fn secs_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1e6,
        // Overflows only past ~292k years; millisecond precision is plenty.
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}
