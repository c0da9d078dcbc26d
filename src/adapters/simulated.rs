//! Physically simulated roaster.
//!
//! A lumped thermal model, integrated over clock time on every read or
//! command:
//!
//! ```text
//!  dTc/dt = gain·heat − (fan_loss·fan + passive_loss)·(Tc − ambient)
//!  dTb/dt = (Tc − Tb) / τ          τ depends on what the bean probe sees
//! ```
//!
//! | Drum contents | Probe coupling                                   |
//! |---------------|--------------------------------------------------|
//! | empty         | drum air, fast (`probe_time_constant_s`)         |
//! | beans         | beans, slow (`bean_time_constant_s`), drum only  |
//! | dropped       | cooling tray, relaxes toward ambient             |
//!
//! Beans receive heat only while the drum turns.  Charging snaps the
//! probe to ambient, which is the sharp drop beans-added detection keys on.
//!
//! The handle is `Clone`; clones share one model so a caller can keep
//! charging beans or injecting faults after moving a clone into a session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::adapters::time::SystemClock;
use crate::app::commands::validate_percent;
use crate::app::ports::{Clock, HardwareInfo, HardwareKind, RoasterPort};
use crate::config::SimulatorConfig;
use crate::error::{Error, Result};
use crate::model::{SensorReading, secs_between};

/// Longest integration step (simulated seconds).
const MAX_STEP_S: f64 = 1.0;

/// Longest span integrated in one advance (simulated seconds).  The model
/// settles well within this, so longer idle gaps are truncated.
const MAX_ADVANCE_S: f64 = 3600.0;

/// What the bean probe is sitting in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeanLoad {
    Empty,
    Roasting,
    Dropped,
}

struct Model {
    config: SimulatorConfig,
    connected: bool,
    chamber_c: f64,
    bean_c: f64,
    heat_pct: u8,
    fan_pct: u8,
    drum_on: bool,
    cooling_on: bool,
    load: BeanLoad,
    last_step: Option<DateTime<Utc>>,
    last_good: Option<SensorReading>,
    pending_failures: u32,
    severed: bool,
    read_errors: u64,
}

impl Model {
    fn new(config: SimulatorConfig) -> Self {
        let ambient = config.ambient_c;
        Self {
            config,
            connected: false,
            chamber_c: ambient,
            bean_c: ambient,
            heat_pct: 0,
            fan_pct: 0,
            drum_on: false,
            cooling_on: false,
            load: BeanLoad::Empty,
            last_step: None,
            last_good: None,
            pending_failures: 0,
            severed: false,
            read_errors: 0,
        }
    }

    /// Integrate from the last step up to `now`.
    fn advance_to(&mut self, now: DateTime<Utc>) {
        let Some(last) = self.last_step else {
            self.last_step = Some(now);
            return;
        };
        let wall_s = secs_between(last, now);
        if wall_s <= 0.0 {
            return;
        }
        self.last_step = Some(now);

        let mut remaining = (wall_s * self.config.time_scale).min(MAX_ADVANCE_S);
        while remaining > 0.0 {
            let h = remaining.min(MAX_STEP_S);
            self.step(h);
            remaining -= h;
        }
    }

    fn step(&mut self, h: f64) {
        let c = &self.config;
        let heat = f64::from(self.heat_pct) / 100.0;
        let fan = f64::from(self.fan_pct) / 100.0;

        let excess = self.chamber_c - c.ambient_c;
        let d_chamber = c.heat_gain_c_per_s * heat - (c.fan_loss_per_s * fan + c.passive_loss_per_s) * excess;
        self.chamber_c += d_chamber * h;

        let (target, tau) = match self.load {
            BeanLoad::Empty => (self.chamber_c, Some(c.probe_time_constant_s)),
            BeanLoad::Roasting => (self.chamber_c, self.drum_on.then_some(c.bean_time_constant_s)),
            BeanLoad::Dropped => {
                let tau = if self.cooling_on {
                    c.cooling_time_constant_s
                } else {
                    c.cooling_time_constant_s * 4.0
                };
                (c.ambient_c, Some(tau))
            }
        };
        if let Some(tau) = tau {
            // Clamp so a coarse step never overshoots the target.
            let k = (h / tau).min(1.0);
            self.bean_c += (target - self.bean_c) * k;
        }
    }

    fn reading(&self, at: DateTime<Utc>) -> SensorReading {
        SensorReading::new(at, self.bean_c, self.chamber_c, self.fan_pct, self.heat_pct)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::connection("simulated roaster not connected"))
        }
    }
}

/// Simulated roaster handle.
#[derive(Clone)]
pub struct SimulatedRoaster {
    model: Arc<Mutex<Model>>,
    clock: Arc<dyn Clock>,
}

impl SimulatedRoaster {
    pub fn new(config: SimulatorConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SimulatorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            model: Arc::new(Mutex::new(Model::new(config))),
            clock,
        }
    }

    /// Load cold beans into the drum.  No-op if beans are already in.
    pub fn charge_beans(&self) {
        let now = self.clock.now();
        let mut m = self.lock();
        m.advance_to(now);
        if m.load == BeanLoad::Roasting {
            return;
        }
        m.load = BeanLoad::Roasting;
        m.bean_c = m.config.ambient_c;
        info!("sim: beans charged at chamber {:.1}\u{00b0}C", m.chamber_c);
    }

    /// Make the next `n` reads fail transiently.
    pub fn inject_read_failures(&self, n: u32) {
        self.lock().pending_failures += n;
    }

    /// Make every read fail hard until [`restore`](Self::restore).
    pub fn sever(&self) {
        self.lock().severed = true;
    }

    pub fn restore(&self) {
        self.lock().severed = false;
    }

    pub fn load(&self) -> BeanLoad {
        self.lock().load
    }

    pub fn is_drum_running(&self) -> bool {
        self.lock().drum_on
    }

    pub fn is_cooling(&self) -> bool {
        self.lock().cooling_on
    }

    /// `(bean, chamber)` temperatures integrated up to now.
    pub fn temperatures(&self) -> (f64, f64) {
        let now = self.clock.now();
        let mut m = self.lock();
        m.advance_to(now);
        (m.bean_c, m.chamber_c)
    }

    fn lock(&self) -> MutexGuard<'_, Model> {
        self.model.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Integrate to now, then apply `f` to a connected model.
    fn actuate<T>(&mut self, f: impl FnOnce(&mut Model) -> T) -> Result<T> {
        let now = self.clock.now();
        let mut m = self.lock();
        m.ensure_connected()?;
        m.advance_to(now);
        Ok(f(&mut m))
    }
}

impl RoasterPort for SimulatedRoaster {
    fn connect(&mut self) -> Result<()> {
        let now = self.clock.now();
        let mut m = self.lock();
        if m.connected {
            return Ok(());
        }
        m.config
            .validate()
            .map_err(|e| Error::connection(format!("simulated clock unavailable: {e}")))?;
        m.connected = true;
        m.last_step = Some(now);
        info!("sim: connected (time scale {}x)", m.config.time_scale);
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut m = self.lock();
        if m.connected {
            m.connected = false;
            info!("sim: disconnected");
        }
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn read_sensors(&mut self) -> Result<SensorReading> {
        let now = self.clock.now();
        let mut m = self.lock();
        m.ensure_connected()?;
        if m.severed {
            return Err(Error::connection("simulated link severed"));
        }
        m.advance_to(now);

        if m.pending_failures > 0 {
            m.pending_failures -= 1;
            m.read_errors += 1;
            warn!("sim: transient read failure #{}", m.read_errors);
            return m
                .last_good
                .ok_or_else(|| Error::connection("no reading available yet"));
        }

        let reading = m.reading(now);
        m.last_good = Some(reading);
        Ok(reading)
    }

    fn set_heat(&mut self, pct: u8) -> Result<u8> {
        validate_percent(pct)?;
        self.actuate(|m| {
            m.heat_pct = pct;
            m.heat_pct
        })
    }

    fn set_fan(&mut self, pct: u8) -> Result<u8> {
        validate_percent(pct)?;
        self.actuate(|m| {
            m.fan_pct = pct;
            m.fan_pct
        })
    }

    fn start_drum(&mut self) -> Result<()> {
        self.actuate(|m| m.drum_on = true)
    }

    fn stop_drum(&mut self) -> Result<()> {
        self.actuate(|m| m.drum_on = false)
    }

    fn drop_beans(&mut self) -> Result<()> {
        self.actuate(|m| {
            if m.load == BeanLoad::Roasting {
                m.load = BeanLoad::Dropped;
                info!("sim: beans dropped at {:.1}\u{00b0}C", m.bean_c);
            }
        })
    }

    fn start_cooling(&mut self) -> Result<()> {
        self.actuate(|m| m.cooling_on = true)
    }

    fn stop_cooling(&mut self) -> Result<()> {
        self.actuate(|m| m.cooling_on = false)
    }

    fn info(&self) -> HardwareInfo {
        HardwareInfo {
            hardware_id: "sim-roaster".to_string(),
            kind: HardwareKind::Simulated,
            model: "lumped thermal model".to_string(),
            connected: self.lock().connected,
        }
    }

    fn read_error_count(&self) -> u64 {
        self.lock().read_errors
    }
}
