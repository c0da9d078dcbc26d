//! Port traits — the hexagonal boundary between the session core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ RoastSessionManager (domain)
//! ```
//!
//! Roaster backends (simulated, serial, stub) implement [`RoasterPort`].
//! The session manager holds exactly one of them as a trait object,
//! selected at session construction, so the domain core never touches a
//! transport directly.
//!
//! ## Contract notes
//!
//! - `connect`/`disconnect` are idempotent; `disconnect` never fails.
//! - `read_sensors` must return within one poll interval.  A transient
//!   failure returns the last-known-good reading and bumps
//!   [`RoasterPort::read_error_count`]; `Err` is reserved for a backend
//!   that cannot produce any reading at all.
//! - `set_heat`/`set_fan` return the hardware-confirmed value, which is
//!   authoritative over the request.
//! - Drum, drop and cooling toggles are idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::SensorReading;

// ───────────────────────────────────────────────────────────────
// Roaster port (driven adapter: domain ↔ hardware)
// ───────────────────────────────────────────────────────────────

/// Sensor and actuator capability set of one roaster.
pub trait RoasterPort: Send {
    /// Establish the transport.  No-op when already connected.
    fn connect(&mut self) -> Result<()>;

    /// Release the transport.  No-op when already disconnected.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Read every sensor and return a unified snapshot.
    fn read_sensors(&mut self) -> Result<SensorReading>;

    /// Set heater output (multiple of 10 in 0–100).  Returns the applied value.
    fn set_heat(&mut self, pct: u8) -> Result<u8>;

    /// Set fan output (multiple of 10 in 0–100).  Returns the applied value.
    fn set_fan(&mut self, pct: u8) -> Result<u8>;

    fn start_drum(&mut self) -> Result<()>;

    fn stop_drum(&mut self) -> Result<()>;

    /// Open the drop door and release the beans into the cooling tray.
    fn drop_beans(&mut self) -> Result<()>;

    fn start_cooling(&mut self) -> Result<()>;

    fn stop_cooling(&mut self) -> Result<()>;

    /// Identity and connection metadata.
    fn info(&self) -> HardwareInfo;

    /// Transient read failures absorbed since construction.
    fn read_error_count(&self) -> u64;
}

impl<T: RoasterPort + ?Sized> RoasterPort for Box<T> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn disconnect(&mut self) {
        (**self).disconnect();
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn read_sensors(&mut self) -> Result<SensorReading> {
        (**self).read_sensors()
    }

    fn set_heat(&mut self, pct: u8) -> Result<u8> {
        (**self).set_heat(pct)
    }

    fn set_fan(&mut self, pct: u8) -> Result<u8> {
        (**self).set_fan(pct)
    }

    fn start_drum(&mut self) -> Result<()> {
        (**self).start_drum()
    }

    fn stop_drum(&mut self) -> Result<()> {
        (**self).stop_drum()
    }

    fn drop_beans(&mut self) -> Result<()> {
        (**self).drop_beans()
    }

    fn start_cooling(&mut self) -> Result<()> {
        (**self).start_cooling()
    }

    fn stop_cooling(&mut self) -> Result<()> {
        (**self).stop_cooling()
    }

    fn info(&self) -> HardwareInfo {
        (**self).info()
    }

    fn read_error_count(&self) -> u64 {
        (**self).read_error_count()
    }
}

/// Which family of backend a roaster belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareKind {
    Simulated,
    Real,
    Stub,
}

/// Identity reported by [`RoasterPort::info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareInfo {
    pub hardware_id: String,
    pub kind: HardwareKind,
    pub model: String,
    pub connected: bool,
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Wall-clock source.  Swappable so simulations and tests are deterministic.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
