//! Fixed-value roaster stub.
//!
//! Returns constant temperatures and echoes actuator settings.  For
//! environments that need a roaster-shaped object without any simulation
//! fidelity (transport wiring, smoke tests).

use std::sync::Arc;

use crate::adapters::time::SystemClock;
use crate::app::commands::validate_percent;
use crate::app::ports::{Clock, HardwareInfo, HardwareKind, RoasterPort};
use crate::config::StubConfig;
use crate::error::{Error, Result};
use crate::model::SensorReading;

pub struct StubRoaster {
    config: StubConfig,
    clock: Arc<dyn Clock>,
    connected: bool,
    heat_pct: u8,
    fan_pct: u8,
}

impl StubRoaster {
    pub fn new(config: StubConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: StubConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            connected: false,
            heat_pct: 0,
            fan_pct: 0,
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::connection("stub roaster not connected"))
        }
    }
}

impl RoasterPort for StubRoaster {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn read_sensors(&mut self) -> Result<SensorReading> {
        self.ensure_connected()?;
        Ok(SensorReading::new(
            self.clock.now(),
            self.config.bean_temp_c,
            self.config.chamber_temp_c,
            self.fan_pct,
            self.heat_pct,
        ))
    }

    fn set_heat(&mut self, pct: u8) -> Result<u8> {
        validate_percent(pct)?;
        self.ensure_connected()?;
        self.heat_pct = pct;
        Ok(pct)
    }

    fn set_fan(&mut self, pct: u8) -> Result<u8> {
        validate_percent(pct)?;
        self.ensure_connected()?;
        self.fan_pct = pct;
        Ok(pct)
    }

    fn start_drum(&mut self) -> Result<()> {
        self.ensure_connected()
    }

    fn stop_drum(&mut self) -> Result<()> {
        self.ensure_connected()
    }

    fn drop_beans(&mut self) -> Result<()> {
        self.ensure_connected()
    }

    fn start_cooling(&mut self) -> Result<()> {
        self.ensure_connected()
    }

    fn stop_cooling(&mut self) -> Result<()> {
        self.ensure_connected()
    }

    fn info(&self) -> HardwareInfo {
        HardwareInfo {
            hardware_id: "stub-0".to_string(),
            kind: HardwareKind::Stub,
            model: "fixed-value stub".to_string(),
            connected: self.connected,
        }
    }

    fn read_error_count(&self) -> u64 {
        0
    }
}
