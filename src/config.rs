//! Session and hardware configuration parameters.
//!
//! All tunable parameters for the roaster core.  Every struct has sane
//! defaults and a `validate()` that rejects dangerous values instead of
//! clamping them.  Loading from disk or environment is the embedding
//! application's job; [`SessionConfig::from_json`] is the one parse entry.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Session-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Poll interval of the background thread (milliseconds).
    pub poll_interval_ms: u64,
    /// How long `stop_session` waits for the poller to exit (milliseconds).
    pub stop_join_timeout_ms: u64,
    /// Consecutive failed polls before the session escalates to ERROR.
    pub max_consecutive_poll_errors: u32,
    /// Event tracker tuning.
    pub tracker: TrackerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,    // 1 Hz
            stop_join_timeout_ms: 2000,
            max_consecutive_poll_errors: 5,
            tracker: TrackerConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Parse from JSON, filling omitted fields with defaults, then validate.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed("poll_interval_ms must be > 0"));
        }
        if self.stop_join_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed("stop_join_timeout_ms must be > 0"));
        }
        if self.max_consecutive_poll_errors == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_consecutive_poll_errors must be > 0",
            ));
        }
        self.tracker.validate()
    }
}

/// Event tracker thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Bean temperature drop between consecutive readings that marks T0 (°C).
    pub beans_added_drop_c: f64,
    /// Rate-of-rise rolling window (seconds).
    pub ror_window_secs: u32,
    /// RoR below this after T0 raises the stall warning (°C/min).
    pub stall_ror_c_per_min: f64,
    /// Bean temperature above this raises the overheat warning (°C).
    pub max_bean_temp_c: f64,
    /// Chamber temperature above this raises the overheat warning (°C).
    pub max_chamber_temp_c: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            beans_added_drop_c: 10.0,
            ror_window_secs: 60,
            stall_ror_c_per_min: -2.0,
            max_bean_temp_c: 250.0,
            max_chamber_temp_c: 300.0,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.beans_added_drop_c.is_finite() && self.beans_added_drop_c > 0.0) {
            return Err(ConfigError::ValidationFailed("beans_added_drop_c must be > 0"));
        }
        if self.ror_window_secs == 0 {
            return Err(ConfigError::ValidationFailed("ror_window_secs must be > 0"));
        }
        if !self.stall_ror_c_per_min.is_finite() {
            return Err(ConfigError::ValidationFailed("stall_ror_c_per_min must be finite"));
        }
        if !(self.max_bean_temp_c.is_finite() && self.max_chamber_temp_c.is_finite()) {
            return Err(ConfigError::ValidationFailed("temperature limits must be finite"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hardware selection
// ---------------------------------------------------------------------------

/// Which roaster backend a session binds to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HardwareConfig {
    Simulated(SimulatorConfig),
    Serial(SerialConfig),
    Stub(StubConfig),
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self::Simulated(SimulatorConfig::default())
    }
}

impl HardwareConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Simulated(c) => c.validate(),
            Self::Serial(c) => c.validate(),
            Self::Stub(_) => Ok(()),
        }
    }
}

/// Fastest supported simulation speed-up.
pub const MAX_TIME_SCALE: f64 = 1000.0;

/// Thermal model constants for the simulated roaster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Room temperature; also the temperature of freshly charged beans (°C).
    pub ambient_c: f64,
    /// Simulated seconds per wall-clock second.
    pub time_scale: f64,
    /// Chamber heating at 100% heat (°C/s).
    pub heat_gain_c_per_s: f64,
    /// Fan cooling coefficient at 100% fan (1/s, scaled by chamber-ambient delta).
    pub fan_loss_per_s: f64,
    /// Passive chamber loss coefficient (1/s).
    pub passive_loss_per_s: f64,
    /// Bean lag behind chamber with the drum turning (seconds).
    pub bean_time_constant_s: f64,
    /// Bean probe lag when the drum holds no beans (seconds).
    pub probe_time_constant_s: f64,
    /// Bean relaxation toward ambient in the cooling tray (seconds).
    pub cooling_time_constant_s: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            ambient_c: 22.0,
            time_scale: 1.0,
            heat_gain_c_per_s: 2.5,
            fan_loss_per_s: 0.012,
            passive_loss_per_s: 0.004,
            bean_time_constant_s: 90.0,
            probe_time_constant_s: 8.0,
            cooling_time_constant_s: 30.0,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.time_scale.is_finite() && self.time_scale > 0.0) {
            return Err(ConfigError::ValidationFailed("time_scale must be > 0"));
        }
        if self.time_scale > MAX_TIME_SCALE {
            return Err(ConfigError::ValidationFailed("time_scale must be <= 1000"));
        }
        let constants = [
            self.heat_gain_c_per_s,
            self.fan_loss_per_s,
            self.passive_loss_per_s,
        ];
        if constants.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(ConfigError::ValidationFailed("thermal coefficients must be >= 0"));
        }
        let taus = [
            self.bean_time_constant_s,
            self.probe_time_constant_s,
            self.cooling_time_constant_s,
        ];
        if taus.iter().any(|t| !t.is_finite() || *t <= 0.0) {
            return Err(ConfigError::ValidationFailed("time constants must be > 0"));
        }
        if !self.ambient_c.is_finite() {
            return Err(ConfigError::ValidationFailed("ambient_c must be finite"));
        }
        Ok(())
    }
}

/// Serial vendor-protocol roaster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device node, e.g. `/dev/ttyUSB0`.
    pub device: String,
    /// Line speed; 8N1, no flow control.
    pub baud_rate: u32,
    /// How long `connect` waits for the first status frame (milliseconds).
    pub connect_timeout_ms: u64,
    /// A cached status older than this counts as a failed read (milliseconds).
    pub stale_after_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            connect_timeout_ms: 3000,
            stale_after_ms: 3000,
        }
    }
}

impl SerialConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.is_empty() {
            return Err(ConfigError::ValidationFailed("device must not be empty"));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::ValidationFailed("baud_rate must be > 0"));
        }
        if self.connect_timeout_ms == 0 || self.stale_after_ms == 0 {
            return Err(ConfigError::ValidationFailed("serial timeouts must be > 0"));
        }
        Ok(())
    }
}

/// Constants returned by the stub roaster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StubConfig {
    pub bean_temp_c: f64,
    pub chamber_temp_c: f64,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            bean_temp_c: 20.0,
            chamber_temp_c: 20.0,
        }
    }
}
