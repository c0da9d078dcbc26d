//! Byte transports for the vendor serial driver.
//!
//! - [`TtyLink`] talks to a real serial port (8N1, no flow control) with a
//!   short read timeout, so the reader thread wakes up regularly even on a
//!   silent line.
//! - [`VirtualRoaster`] is an in-process roaster that answers command
//!   frames with status frames.  Used by tests and bench demos.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use serialport::{FlowControl, SerialPort};

use super::codec::{
    self, celsius_to_f_tenths, ActuatorState, FrameDecoder, StatusFrame,
};

/// Bidirectional byte link.  One handle is moved to the reader thread and
/// a clone is kept for writes.
pub trait SerialLink: Send {
    /// Blocking read.  `Ok(0)` means the link closed.  `TimedOut` and
    /// `WouldBlock` are retried by the caller.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    fn try_clone(&self) -> io::Result<Box<dyn SerialLink>>;
}

// ── Serial port ──────────────────────────────────────────────

/// Read timeout on the port.  A detached reader notices its stop flag
/// within this long.
pub const TTY_READ_TIMEOUT: Duration = Duration::from_millis(100);

pub struct TtyLink {
    port: Box<dyn SerialPort>,
}

impl TtyLink {
    pub fn open(path: &str, baud_rate: u32) -> anyhow::Result<Self> {
        let port = serialport::new(path, baud_rate)
            .timeout(TTY_READ_TIMEOUT)
            .flow_control(FlowControl::None)
            .open()
            .with_context(|| format!("opening serial device {path} at {baud_rate} baud"))?;
        Ok(Self { port })
    }
}

impl SerialLink for TtyLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn try_clone(&self) -> io::Result<Box<dyn SerialLink>> {
        let port = self.port.try_clone().map_err(io::Error::from)?;
        Ok(Box::new(Self { port }))
    }
}

// ── In-process roaster ───────────────────────────────────────

const READ_WAIT: Duration = Duration::from_millis(50);

struct DeviceState {
    actuators: ActuatorState,
    chamber_f_tenths: u16,
    bean_f_tenths: u16,
    commands_seen: u64,
    /// Highest heat the roaster accepts; commands above it are clamped.
    heat_limit_pct: u8,
    /// When false, commands are applied silently with no status reply.
    reply_to_commands: bool,
    closed: bool,
    rx: VecDeque<u8>,
}

struct Shared {
    state: Mutex<DeviceState>,
    readable: Condvar,
}

/// Emulated roaster on the far end of a [`VirtualLink`].
#[derive(Clone)]
pub struct VirtualRoaster {
    shared: Arc<Shared>,
}

impl Default for VirtualRoaster {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualRoaster {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(DeviceState {
                    actuators: ActuatorState::default(),
                    chamber_f_tenths: celsius_to_f_tenths(20.0),
                    bean_f_tenths: celsius_to_f_tenths(20.0),
                    commands_seen: 0,
                    heat_limit_pct: 100,
                    reply_to_commands: true,
                    closed: false,
                    rx: VecDeque::new(),
                }),
                readable: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DeviceState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Host-side end of the link.
    pub fn link(&self) -> VirtualLink {
        VirtualLink {
            device: self.clone(),
            decoder: FrameDecoder::command(),
        }
    }

    pub fn set_temperatures_c(&self, bean_c: f64, chamber_c: f64) {
        let mut s = self.lock();
        s.bean_f_tenths = celsius_to_f_tenths(bean_c);
        s.chamber_f_tenths = celsius_to_f_tenths(chamber_c);
    }

    /// Queue one status frame for the host.
    pub fn emit_status(&self) {
        let mut s = self.lock();
        let frame = StatusFrame {
            actuators: s.actuators,
            chamber_f_tenths: s.chamber_f_tenths,
            bean_f_tenths: s.bean_f_tenths,
        };
        Self::enqueue(&mut s, &codec::encode_status(&frame));
        self.shared.readable.notify_all();
    }

    /// Queue raw bytes, e.g. line noise.
    pub fn emit_raw(&self, bytes: &[u8]) {
        let mut s = self.lock();
        Self::enqueue(&mut s, bytes);
        self.shared.readable.notify_all();
    }

    fn enqueue(s: &mut DeviceState, bytes: &[u8]) {
        if !s.closed {
            s.rx.extend(bytes.iter().copied());
        }
    }

    pub fn set_reply_to_commands(&self, reply: bool) {
        self.lock().reply_to_commands = reply;
    }

    /// Clamp commanded heat to `pct`, as a roaster with a power cap does.
    pub fn set_heat_limit(&self, pct: u8) {
        self.lock().heat_limit_pct = pct;
    }

    /// Simulate the cable being pulled.  Pending reads see EOF.
    pub fn close(&self) {
        let mut s = self.lock();
        s.closed = true;
        s.rx.clear();
        self.shared.readable.notify_all();
    }

    pub fn actuators(&self) -> ActuatorState {
        self.lock().actuators
    }

    pub fn commands_seen(&self) -> u64 {
        self.lock().commands_seen
    }

    fn apply_command(&self, mut actuators: ActuatorState) {
        let reply = {
            let mut s = self.lock();
            actuators.heat_pct = actuators.heat_pct.min(s.heat_limit_pct);
            s.actuators = actuators;
            s.commands_seen += 1;
            s.reply_to_commands
        };
        if reply {
            self.emit_status();
        }
    }
}

/// Host end of an in-process link.
pub struct VirtualLink {
    device: VirtualRoaster,
    decoder: FrameDecoder,
}

impl SerialLink for VirtualLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let shared = &self.device.shared;
        let guard = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut s, _) = shared
            .readable
            .wait_timeout_while(guard, READ_WAIT, |s| s.rx.is_empty() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        if s.closed {
            return Ok(0);
        }
        if s.rx.is_empty() {
            return Err(io::Error::from(io::ErrorKind::TimedOut));
        }
        let n = buf.len().min(s.rx.len());
        for (slot, byte) in buf.iter_mut().zip(s.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        if self.device.lock().closed {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        let mut frames = Vec::new();
        self.decoder.feed(data, |f| frames.push(f));
        for frame in frames {
            self.device.apply_command(frame.actuators);
        }
        Ok(())
    }

    fn try_clone(&self) -> io::Result<Box<dyn SerialLink>> {
        Ok(Box::new(self.device.link()))
    }
}
