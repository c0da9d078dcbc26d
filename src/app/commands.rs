//! Inbound control commands.
//!
//! These represent actions requested by the outside world (the remote
//! tool-call layer, a local operator) that the
//! [`RoastSessionManager`](super::service::RoastSessionManager) validates
//! and forwards to the roaster.  Validation happens here, before anything
//! touches hardware.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Output step for heat and fan.
pub const PERCENT_STEP: u8 = 10;

/// Commands that external adapters can send into the session core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Heater output, percent.
    SetHeat(u8),
    /// Fan output, percent.
    SetFan(u8),
    /// Start the drum motor (`start_roaster` on the wire).
    StartDrum,
    /// Stop the drum motor (`stop_roaster` on the wire).
    StopDrum,
    DropBeans,
    StartCooling,
    StopCooling,
}

impl ControlCommand {
    /// Build a command from a raw `{action, value?}` pair.
    ///
    /// Rejects unknown actions, a missing or superfluous value, and heat/fan
    /// values that are not a multiple of 10 in 0–100.
    pub fn parse(action: &str, value: Option<i64>) -> Result<Self> {
        let cmd = match action {
            "set_heat" => Self::SetHeat(percent_arg(action, value)?),
            "set_fan" => Self::SetFan(percent_arg(action, value)?),
            "start_drum" | "start_roaster" => Self::StartDrum,
            "stop_drum" | "stop_roaster" => Self::StopDrum,
            "drop_beans" => Self::DropBeans,
            "start_cooling" => Self::StartCooling,
            "stop_cooling" => Self::StopCooling,
            other => return Err(Error::validation(format!("unknown action '{other}'"))),
        };
        if !cmd.takes_value() && value.is_some() {
            return Err(Error::validation(format!("action '{action}' takes no value")));
        }
        cmd.validate()?;
        Ok(cmd)
    }

    /// Re-check a command built directly (e.g. deserialized).
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::SetHeat(pct) | Self::SetFan(pct) => validate_percent(*pct).map(|_| ()),
            _ => Ok(()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SetHeat(_) => "set_heat",
            Self::SetFan(_) => "set_fan",
            Self::StartDrum => "start_drum",
            Self::StopDrum => "stop_drum",
            Self::DropBeans => "drop_beans",
            Self::StartCooling => "start_cooling",
            Self::StopCooling => "stop_cooling",
        }
    }

    fn takes_value(&self) -> bool {
        matches!(self, Self::SetHeat(_) | Self::SetFan(_))
    }
}

/// Result of an applied command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub command: ControlCommand,
    /// Hardware-confirmed value for heat/fan; `None` for toggles.
    pub applied: Option<u8>,
}

/// Accept only multiples of [`PERCENT_STEP`] in 0–100.
pub fn validate_percent(pct: u8) -> Result<u8> {
    if pct > 100 || pct % PERCENT_STEP != 0 {
        return Err(Error::validation(format!(
            "{pct} is not a multiple of {PERCENT_STEP} in 0..=100"
        )));
    }
    Ok(pct)
}

fn percent_arg(action: &str, value: Option<i64>) -> Result<u8> {
    let raw = value.ok_or_else(|| Error::validation(format!("action '{action}' requires a value")))?;
    let pct = u8::try_from(raw)
        .map_err(|_| Error::validation(format!("{raw} is out of range 0..=100")))?;
    validate_percent(pct)
}
