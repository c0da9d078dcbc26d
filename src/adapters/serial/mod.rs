//! Vendor serial-protocol roaster driver.
//!
//! The roaster streams status frames on its own schedule, so reads never
//! block on the wire:
//!
//! ```text
//!   tty ──▶ reader thread ──▶ FrameDecoder ──▶ on_status ──▶ StatusCache
//!                                                              │
//!   read_sensors() ◀───────────────────────────────────────────┘
//!   set_heat()/…  ──▶ command frame (full actuator state) ──▶ tty
//!                 ◀── first status frame after the write (confirmation)
//! ```
//!
//! A cached status older than `stale_after_ms` counts as a transient read
//! failure (last-known-good is returned).  A closed or failed link is a
//! hard connection error, and so is a command the roaster never confirms.
//! Confirmed values are the roaster's, which may differ from the request.
//!
//! The reader thread is detached on disconnect.  It exits on its next
//! read timeout ([`link::TTY_READ_TIMEOUT`] on a real port) or byte,
//! whichever comes first.

pub mod codec;
pub mod link;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::adapters::time::SystemClock;
use crate::app::commands::validate_percent;
use crate::app::ports::{Clock, HardwareInfo, HardwareKind, RoasterPort};
use crate::config::SerialConfig;
use crate::error::{Error, Result};
use crate::model::{SensorReading, secs_between};

use codec::{ActuatorState, FrameDecoder, StatusFrame};
use link::{SerialLink, TtyLink, VirtualRoaster};

const READ_CHUNK: usize = 64;
const STATUS_POLL: Duration = Duration::from_millis(2);
const WOULD_BLOCK_BACKOFF: Duration = Duration::from_millis(10);

type LinkOpener = Box<dyn FnMut() -> anyhow::Result<Box<dyn SerialLink>> + Send>;

#[derive(Debug, Clone, Copy)]
struct CachedStatus {
    frame: StatusFrame,
    received_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct StatusCache {
    latest: Option<CachedStatus>,
    link_error: Option<String>,
    frames: u64,
}

fn lock_cache(cache: &Mutex<StatusCache>) -> MutexGuard<'_, StatusCache> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SerialRoaster {
    config: SerialConfig,
    opener: LinkOpener,
    clock: Arc<dyn Clock>,
    writer: Option<Box<dyn SerialLink>>,
    reader_stop: Option<Arc<AtomicBool>>,
    cache: Arc<Mutex<StatusCache>>,
    desired: ActuatorState,
    last_good: Option<SensorReading>,
    read_errors: u64,
}

impl SerialRoaster {
    /// Driver for the device node named in `config`.
    pub fn open(config: SerialConfig) -> Self {
        let device = config.device.clone();
        let baud_rate = config.baud_rate;
        Self::with_link_opener(config, Arc::new(SystemClock), move || {
            Ok(Box::new(TtyLink::open(&device, baud_rate)?) as Box<dyn SerialLink>)
        })
    }

    /// Driver talking to an in-process [`VirtualRoaster`].
    pub fn emulated(config: SerialConfig, clock: Arc<dyn Clock>, device: &VirtualRoaster) -> Self {
        let device = device.clone();
        Self::with_link_opener(config, clock, move || {
            Ok(Box::new(device.link()) as Box<dyn SerialLink>)
        })
    }

    /// `opener` is called on every `connect`.
    pub fn with_link_opener(
        config: SerialConfig,
        clock: Arc<dyn Clock>,
        opener: impl FnMut() -> anyhow::Result<Box<dyn SerialLink>> + Send + 'static,
    ) -> Self {
        Self {
            config,
            opener: Box::new(opener),
            clock,
            writer: None,
            reader_stop: None,
            cache: Arc::new(Mutex::new(StatusCache::default())),
            desired: ActuatorState::default(),
            last_good: None,
            read_errors: 0,
        }
    }

    /// Valid status frames received on the current link.
    pub fn frames_received(&self) -> u64 {
        lock_cache(&self.cache).frames
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.writer.is_none() {
            return Err(Error::connection("serial roaster not connected"));
        }
        match &lock_cache(&self.cache).link_error {
            Some(e) => Err(Error::connection(format!("serial link lost: {e}"))),
            None => Ok(()),
        }
    }

    fn spawn_reader(&self, link: Box<dyn SerialLink>, stop: Arc<AtomicBool>) -> Result<()> {
        let on_status = {
            let cache = Arc::clone(&self.cache);
            let clock = Arc::clone(&self.clock);
            move |frame: StatusFrame| {
                let mut c = lock_cache(&cache);
                c.latest = Some(CachedStatus {
                    frame,
                    received_at: clock.now(),
                });
                c.frames += 1;
            }
        };
        let cache = Arc::clone(&self.cache);
        thread::Builder::new()
            .name("roaster-serial-rx".into())
            .spawn(move || reader_loop(link, &stop, on_status, &cache))
            .map(|_| ())
            .map_err(|e| Error::connection(format!("spawning serial reader: {e}")))
    }

    /// Wait up to `timeout_ms` for a status frame beyond the first
    /// `frames_seen` on this link.
    fn await_status_after(&self, frames_seen: u64, timeout_ms: u64) -> Result<StatusFrame> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            {
                let c = lock_cache(&self.cache);
                if let (true, Some(status)) = (c.frames > frames_seen, c.latest) {
                    return Ok(status.frame);
                }
                if let Some(e) = &c.link_error {
                    return Err(Error::connection(format!("serial link lost: {e}")));
                }
            }
            if Instant::now() >= deadline {
                return Err(Error::connection(format!(
                    "no status frame from {} within {} ms",
                    self.config.device, timeout_ms
                )));
            }
            thread::sleep(STATUS_POLL);
        }
    }

    fn teardown(&mut self) {
        if let Some(stop) = self.reader_stop.take() {
            stop.store(true, Ordering::Release);
        }
        self.writer = None;
    }

    /// Write `next` as a command frame and wait for the roaster to confirm
    /// it.  The confirmed state becomes the commanded state.
    fn send(&mut self, next: ActuatorState) -> Result<()> {
        let frames_seen = lock_cache(&self.cache).frames;
        let Some(writer) = self.writer.as_mut() else {
            return Err(Error::connection("serial roaster not connected"));
        };
        writer
            .write_all(&codec::encode_command(&next))
            .map_err(|e| Error::connection(format!("serial write failed: {e}")))?;

        let confirmed = self
            .await_status_after(frames_seen, self.config.stale_after_ms)
            .map_err(|e| match e {
                Error::Connection(msg) => Error::connection(format!("command not confirmed: {msg}")),
                other => other,
            })?;
        if confirmed.actuators != next {
            debug!("roaster adjusted command {next:?} to {:?}", confirmed.actuators);
        }
        self.desired = confirmed.actuators;
        Ok(())
    }

    /// Apply a change to the commanded state.  No frame is sent when the
    /// change is already in effect.
    fn update(&mut self, change: impl FnOnce(&mut ActuatorState)) -> Result<()> {
        self.ensure_connected()?;
        let mut next = self.desired;
        change(&mut next);
        if next == self.desired {
            return Ok(());
        }
        self.send(next)
    }
}

fn reader_loop(
    mut link: Box<dyn SerialLink>,
    stop: &AtomicBool,
    mut on_status: impl FnMut(StatusFrame),
    cache: &Mutex<StatusCache>,
) {
    let mut decoder = FrameDecoder::status();
    let mut buf = [0u8; READ_CHUNK];
    while !stop.load(Ordering::Acquire) {
        let failure = match link.read(&mut buf) {
            Ok(0) => "link closed".to_string(),
            Ok(n) => {
                decoder.feed(&buf[..n], &mut on_status);
                continue;
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::Interrupted) => {
                continue;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(WOULD_BLOCK_BACKOFF);
                continue;
            }
            Err(e) => e.to_string(),
        };
        if !stop.load(Ordering::Acquire) {
            warn!("serial reader stopping: {failure}");
            lock_cache(cache).link_error = Some(failure);
        }
        break;
    }
    debug!("serial reader exited ({} frames rejected)", decoder.rejected());
}

impl RoasterPort for SerialRoaster {
    fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.teardown();
        self.config
            .validate()
            .map_err(|e| Error::connection(format!("serial config: {e}")))?;

        let link = (self.opener)().map_err(|e| Error::connection(format!("{e:#}")))?;
        let reader = link
            .try_clone()
            .map_err(|e| Error::connection(format!("cloning serial link: {e}")))?;
        *lock_cache(&self.cache) = StatusCache::default();

        let stop = Arc::new(AtomicBool::new(false));
        self.spawn_reader(reader, Arc::clone(&stop))?;
        self.writer = Some(link);
        self.reader_stop = Some(stop);

        match self.await_status_after(0, self.config.connect_timeout_ms) {
            Ok(frame) => {
                // Take over whatever the roaster is already doing.
                self.desired = frame.actuators;
                info!("serial roaster connected on {}", self.config.device);
                Ok(())
            }
            Err(e) => {
                self.teardown();
                Err(e)
            }
        }
    }

    fn disconnect(&mut self) {
        if self.writer.is_some() {
            info!("serial roaster disconnected from {}", self.config.device);
        }
        self.teardown();
    }

    fn is_connected(&self) -> bool {
        self.ensure_connected().is_ok()
    }

    fn read_sensors(&mut self) -> Result<SensorReading> {
        self.ensure_connected()?;
        let now = self.clock.now();
        let latest = lock_cache(&self.cache).latest;
        let stale_after_s = self.config.stale_after_ms as f64 / 1000.0;

        match latest {
            Some(s) if secs_between(s.received_at, now) <= stale_after_s => {
                let reading = SensorReading::new(
                    s.received_at,
                    s.frame.bean_c(),
                    s.frame.chamber_c(),
                    s.frame.actuators.fan_pct(),
                    s.frame.actuators.heat_pct,
                );
                self.last_good = Some(reading);
                Ok(reading)
            }
            _ => {
                self.read_errors += 1;
                warn!(
                    "serial status stale (> {} ms), serving last good reading",
                    self.config.stale_after_ms
                );
                self.last_good
                    .ok_or_else(|| Error::connection("no status received from roaster"))
            }
        }
    }

    fn set_heat(&mut self, pct: u8) -> Result<u8> {
        validate_percent(pct)?;
        self.update(|s| s.heat_pct = pct)?;
        Ok(self.desired.heat_pct)
    }

    fn set_fan(&mut self, pct: u8) -> Result<u8> {
        validate_percent(pct)?;
        self.update(|s| s.fan_level = pct / 10)?;
        Ok(self.desired.fan_pct())
    }

    fn start_drum(&mut self) -> Result<()> {
        self.update(|s| s.drum = true)
    }

    fn stop_drum(&mut self) -> Result<()> {
        self.update(|s| s.drum = false)
    }

    fn drop_beans(&mut self) -> Result<()> {
        self.update(|s| s.solenoid = true)
    }

    fn start_cooling(&mut self) -> Result<()> {
        self.update(|s| s.cooling = true)
    }

    fn stop_cooling(&mut self) -> Result<()> {
        self.update(|s| s.cooling = false)
    }

    fn info(&self) -> HardwareInfo {
        HardwareInfo {
            hardware_id: format!("serial:{}", self.config.device),
            kind: HardwareKind::Real,
            model: "vendor serial roaster".to_string(),
            connected: self.is_connected(),
        }
    }

    fn read_error_count(&self) -> u64 {
        self.read_errors
    }
}

impl Drop for SerialRoaster {
    fn drop(&mut self) {
        self.teardown();
    }
}
