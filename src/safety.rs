//! Roast warning monitor.
//!
//! The monitor runs **every poll cycle after the tracker update** and
//! accumulates a warning bitmask that is surfaced in status output.
//! Warnings are observational only: the roaster runs attended, so nothing
//! here commands an actuator.
//!
//! ## Warning lifecycle
//!
//! 1. A condition triggers a warning (e.g. bean temperature above limit).
//! 2. The monitor sets the corresponding bit and logs it once.
//! 3. Each cycle the monitor re-evaluates; when the condition clears, the
//!    bit is unset and the clearance logged.
//!
//! Multiple simultaneous warnings are tracked independently.

use core::fmt;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::model::SensorReading;

/// Individual warning conditions, one bit each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RoastWarning {
    /// Bean temperature exceeds the configured limit.
    BeanOverheat = 0b0000_0001,
    /// Chamber temperature exceeds the configured limit.
    ChamberOverheat = 0b0000_0010,
    /// Rate of rise fell below the stall threshold after beans were added.
    Stall = 0b0000_0100,
}

impl RoastWarning {
    pub const ALL: [Self; 3] = [Self::BeanOverheat, Self::ChamberOverheat, Self::Stall];

    /// Return the bitmask for this warning.
    pub const fn mask(self) -> u8 {
        self as u8
    }

    /// Expand a bitmask into its individual warnings.
    pub fn from_mask(mask: u8) -> Vec<Self> {
        Self::ALL.into_iter().filter(|w| mask & w.mask() != 0).collect()
    }
}

impl fmt::Display for RoastWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeanOverheat => write!(f, "bean overheat"),
            Self::ChamberOverheat => write!(f, "chamber overheat"),
            Self::Stall => write!(f, "roast stalling"),
        }
    }
}

/// Warning monitor.
#[derive(Debug, Clone)]
pub struct WarningMonitor {
    max_bean_temp_c: f64,
    max_chamber_temp_c: f64,
    stall_ror_c_per_min: f64,
    /// Latched warning bitmask.
    warnings: u8,
}

impl WarningMonitor {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            max_bean_temp_c: config.max_bean_temp_c,
            max_chamber_temp_c: config.max_chamber_temp_c,
            stall_ror_c_per_min: config.stall_ror_c_per_min,
            warnings: 0,
        }
    }

    /// Evaluate every condition against the latest reading.
    ///
    /// `ror` is the current rate of rise; `roasting` is true between T0 and
    /// drop, the only window in which a stall is meaningful.
    pub fn evaluate(&mut self, reading: &SensorReading, ror: Option<f64>, roasting: bool) -> u8 {
        self.eval_warning(
            RoastWarning::BeanOverheat,
            reading.bean_temp_c > self.max_bean_temp_c,
        );
        self.eval_warning(
            RoastWarning::ChamberOverheat,
            reading.chamber_temp_c > self.max_chamber_temp_c,
        );
        self.eval_warning(
            RoastWarning::Stall,
            roasting && ror.is_some_and(|r| r < self.stall_ror_c_per_min),
        );
        self.warnings
    }

    /// Current warning bitmask.
    pub fn warnings(&self) -> u8 {
        self.warnings
    }

    pub fn has_warning(&self, warning: RoastWarning) -> bool {
        self.warnings & warning.mask() != 0
    }

    fn eval_warning(&mut self, warning: RoastWarning, condition: bool) {
        if condition {
            if self.warnings & warning.mask() == 0 {
                warn!("ROAST WARNING SET: {warning}");
            }
            self.warnings |= warning.mask();
        } else {
            if self.warnings & warning.mask() != 0 {
                info!("ROAST WARNING CLEARED: {warning}");
            }
            self.warnings &= !warning.mask();
        }
    }
}
