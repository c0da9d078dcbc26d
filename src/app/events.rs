//! Outbound session results and snapshots.
//!
//! Everything the [`RoastSessionManager`](super::service::RoastSessionManager)
//! hands back to callers lives here.  All types are owned copies taken
//! under the session lock and serialize to the status document the remote
//! tool-call layer exposes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fsm::SessionState;
use crate::model::{EventTimestamps, RoastMetrics, SensorReading};
use crate::safety::RoastWarning;

use super::ports::HardwareInfo;

// ───────────────────────────────────────────────────────────────
// Session lifecycle
// ───────────────────────────────────────────────────────────────

/// Identity of a running session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub hardware: HardwareInfo,
}

/// Outcome of `start_session`; starting twice is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started(SessionInfo),
    AlreadyRunning(SessionInfo),
}

impl StartOutcome {
    pub fn info(&self) -> &SessionInfo {
        match self {
            Self::Started(info) | Self::AlreadyRunning(info) => info,
        }
    }

    pub fn into_info(self) -> SessionInfo {
        match self {
            Self::Started(info) | Self::AlreadyRunning(info) => info,
        }
    }
}

/// Final record of a stopped session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub hardware_id: String,
    pub stopped_at: DateTime<Utc>,
    pub timestamps: EventTimestamps,
    pub metrics: RoastMetrics,
    /// Transient hardware read failures absorbed during the session.
    pub read_errors: u64,
    /// Poll cycles that failed outright.
    pub poll_errors: u64,
    /// False if the poller had to be abandoned after the join timeout.
    pub poller_joined: bool,
}

/// Outcome of `stop_session`; stopping while idle is not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    Stopped(Box<SessionSummary>),
    NoActiveSession,
}

/// Acknowledgement of a write-once roast event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventAck {
    pub at: DateTime<Utc>,
    pub temp_c: f64,
}

// ───────────────────────────────────────────────────────────────
// Status snapshot
// ───────────────────────────────────────────────────────────────

/// Sensor block of the status document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorBlock {
    pub bean_temp_c: f64,
    pub chamber_temp_c: f64,
    pub fan_pct: u8,
    pub heat_pct: u8,
}

impl From<&SensorReading> for SensorBlock {
    fn from(r: &SensorReading) -> Self {
        Self {
            bean_temp_c: r.bean_temp_c,
            chamber_temp_c: r.chamber_temp_c,
            fan_pct: r.fan_pct,
            heat_pct: r.heat_pct,
        }
    }
}

/// Connection block of the status document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub status: ConnectionStatus,
    pub hardware_id: String,
    /// Timestamp of the latest reading the poller stored.
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Merged status snapshot returned by `get_status`.
///
/// Built from cached state only; every field belongs to the same poll
/// cycle because the whole document is copied under one lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoastStatus {
    pub session_id: Uuid,
    pub state: SessionState,
    /// `None` until the first poll cycle completes.
    pub sensors: Option<SensorBlock>,
    pub timestamps: EventTimestamps,
    pub metrics: RoastMetrics,
    pub connection: ConnectionInfo,
    pub warnings: Vec<RoastWarning>,
}

// ───────────────────────────────────────────────────────────────
// Health
// ───────────────────────────────────────────────────────────────

/// Health snapshot; available whether or not a session runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub state: SessionState,
    pub session_id: Option<Uuid>,
    pub hardware: Option<HardwareInfo>,
    pub poller_alive: bool,
    pub consecutive_poll_errors: u32,
    pub poll_errors: u64,
    pub read_errors: u64,
    pub last_error: Option<String>,
}
