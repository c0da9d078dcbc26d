//! Scripted roaster for integration tests.
//!
//! Serves readings from a queue the test fills, repeating the last one
//! once the queue runs dry (the tracker ignores those), and records every
//! actuator call.  Clones share one script so a test keeps a handle after
//! moving a clone into the session manager.
//!
//! In live mode every read instead produces a fresh reading one second
//! after the previous, carrying the heat and fan in effect when the read
//! began.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use roastcore::app::ports::{HardwareInfo, HardwareKind, RoasterPort};
use roastcore::model::SensorReading;
use roastcore::{Error, Result};

/// Fixed test epoch.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
}

/// Reading `secs` after [`epoch`], chamber 40 °C above the beans.
pub fn reading_at(secs: i64, bean_c: f64) -> SensorReading {
    SensorReading::new(
        epoch() + chrono::Duration::seconds(secs),
        bean_c,
        bean_c + 40.0,
        0,
        0,
    )
}

/// Poll `cond` until it holds or five seconds pass.
pub fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

// ── Actuator call record ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorCall {
    SetHeat(u8),
    SetFan(u8),
    StartDrum,
    StopDrum,
    DropBeans,
    StartCooling,
    StopCooling,
}

#[derive(Default)]
struct Script {
    queue: VecDeque<SensorReading>,
    last: Option<SensorReading>,
    connected: bool,
    connect_fails: bool,
    reads_fail: bool,
    commands_fail: bool,
    read_delay: Duration,
    panic_on_read: bool,
    live_bean_c: Option<f64>,
    reads: i64,
    heat_pct: u8,
    fan_pct: u8,
    calls: Vec<ActuatorCall>,
    disconnects: u32,
}

// ── ScriptedRoaster ───────────────────────────────────────────

#[derive(Clone, Default)]
pub struct ScriptedRoaster {
    script: Arc<Mutex<Script>>,
}

#[allow(dead_code)]
impl ScriptedRoaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_readings(readings: impl IntoIterator<Item = SensorReading>) -> Self {
        let r = Self::new();
        r.push(readings);
        r
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn push(&self, readings: impl IntoIterator<Item = SensorReading>) {
        self.lock().queue.extend(readings);
    }

    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn fail_connect(&self) {
        self.lock().connect_fails = true;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.lock().reads_fail = fail;
    }

    pub fn fail_commands(&self, fail: bool) {
        self.lock().commands_fail = fail;
    }

    pub fn set_read_delay(&self, delay: Duration) {
        self.lock().read_delay = delay;
    }

    /// Make the next read panic, as a buggy driver would.
    pub fn panic_on_read(&self) {
        self.lock().panic_on_read = true;
    }

    /// Switch to live mode at a constant bean temperature.
    pub fn live(&self, bean_c: f64) {
        self.lock().live_bean_c = Some(bean_c);
    }

    pub fn calls(&self) -> Vec<ActuatorCall> {
        self.lock().calls.clone()
    }

    pub fn disconnects(&self) -> u32 {
        self.lock().disconnects
    }

    pub fn boxed(&self) -> Box<dyn RoasterPort> {
        Box::new(self.clone())
    }

    fn actuate(&mut self, call: ActuatorCall) -> Result<()> {
        let mut s = self.lock();
        if !s.connected || s.commands_fail {
            return Err(Error::Connection("scripted roaster unreachable".into()));
        }
        match call {
            ActuatorCall::SetHeat(pct) => s.heat_pct = pct,
            ActuatorCall::SetFan(pct) => s.fan_pct = pct,
            _ => {}
        }
        s.calls.push(call);
        Ok(())
    }
}

impl RoasterPort for ScriptedRoaster {
    fn connect(&mut self) -> Result<()> {
        let mut s = self.lock();
        if s.connect_fails {
            return Err(Error::Connection("scripted connect failure".into()));
        }
        s.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut s = self.lock();
        s.connected = false;
        s.disconnects += 1;
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn read_sensors(&mut self) -> Result<SensorReading> {
        let (delay, panics, heat_pct, fan_pct) = {
            let s = self.lock();
            (s.read_delay, s.panic_on_read, s.heat_pct, s.fan_pct)
        };
        if panics {
            panic!("scripted driver fault");
        }
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let mut s = self.lock();
        if !s.connected || s.reads_fail {
            return Err(Error::Connection("scripted read failure".into()));
        }
        if let Some(bean_c) = s.live_bean_c {
            s.reads += 1;
            let mut reading = reading_at(s.reads, bean_c);
            reading.heat_pct = heat_pct;
            reading.fan_pct = fan_pct;
            return Ok(reading);
        }
        if let Some(next) = s.queue.pop_front() {
            s.last = Some(next);
        }
        s.last
            .ok_or_else(|| Error::Connection("script has no readings".into()))
    }

    fn set_heat(&mut self, pct: u8) -> Result<u8> {
        self.actuate(ActuatorCall::SetHeat(pct))?;
        Ok(pct)
    }

    fn set_fan(&mut self, pct: u8) -> Result<u8> {
        self.actuate(ActuatorCall::SetFan(pct))?;
        Ok(pct)
    }

    fn start_drum(&mut self) -> Result<()> {
        self.actuate(ActuatorCall::StartDrum)
    }

    fn stop_drum(&mut self) -> Result<()> {
        self.actuate(ActuatorCall::StopDrum)
    }

    fn drop_beans(&mut self) -> Result<()> {
        self.actuate(ActuatorCall::DropBeans)
    }

    fn start_cooling(&mut self) -> Result<()> {
        self.actuate(ActuatorCall::StartCooling)
    }

    fn stop_cooling(&mut self) -> Result<()> {
        self.actuate(ActuatorCall::StopCooling)
    }

    fn info(&self) -> HardwareInfo {
        HardwareInfo {
            hardware_id: "scripted-0".to_string(),
            kind: HardwareKind::Stub,
            model: "scripted test roaster".to_string(),
            connected: self.lock().connected,
        }
    }

    fn read_error_count(&self) -> u64 {
        0
    }
}
