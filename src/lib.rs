//! Roaster control core.
//!
//! A thread-safe session manager that polls a coffee roaster (simulated,
//! serial, or stub) on a background thread, derives roast metrics from the
//! reading stream, and exposes idempotent control operations.
//!
//! ```text
//!  poller ──▶ RoasterPort::read_sensors ──▶ RoastEventTracker::update
//!                                              │
//!                         session lock ◀───────┘
//!                              │
//!          get_status / execute_command / report_first_crack
//! ```

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod fsm;
pub mod model;
pub mod safety;
pub mod tracker;

pub use app::commands::{CommandOutcome, ControlCommand};
pub use app::events::{
    HealthReport, RoastStatus, SessionInfo, SessionSummary, StartOutcome, StopOutcome,
};
pub use app::ports::{Clock, HardwareInfo, HardwareKind, RoasterPort};
pub use app::service::RoastSessionManager;
pub use config::{HardwareConfig, SessionConfig};
pub use error::{Error, ErrorPayload, Result};
pub use fsm::SessionState;
pub use model::{RoastMetrics, SensorReading, parse_utc_timestamp};
