//! Vendor serial frame codec.
//!
//! Fixed-length frames in both directions:
//! ```text
//! ┌──────┬──────┬──────┬──────┬───────┬───────┬─────────────┬─────────────┬──────┬──────┐
//! │ 0xA5 │ 0x96 │ kind │ heat │ fan   │ flags │ chamber °F  │ bean °F     │ rsvd │ csum │
//! │      │      │      │ 0-100│ 0-10  │       │ ×10, u16 BE │ ×10, u16 BE │      │      │
//! └──────┴──────┴──────┴──────┴───────┴───────┴─────────────┴─────────────┴──────┴──────┘
//!    0      1      2      3      4       5       6..8          8..10         10     11
//! ```
//!
//! `kind` is `0x01` for status (roaster → host) and `0x02` for command
//! (host → roaster).  Command frames carry the full desired actuator state
//! and zero temperatures.  `csum` is the wrapping byte sum of bytes 0..11.
//!
//! The decoder accumulates incoming bytes and yields complete status
//! frames.  This handles partial reads gracefully — a single read may
//! return half a frame, line noise, or several frames back to back.  A
//! rejected frame's bytes after its sync are hunted through again, so a
//! stray `A5 96` in the noise cannot swallow a real frame behind it.

/// Total frame size.
pub const FRAME_LEN: usize = 12;

/// Sync preamble.
pub const SYNC: [u8; 2] = [0xA5, 0x96];

pub const KIND_STATUS: u8 = 0x01;
pub const KIND_COMMAND: u8 = 0x02;

/// Highest vendor fan level.
pub const MAX_FAN_LEVEL: u8 = 10;

const FLAG_DRUM: u8 = 0b0000_0001;
const FLAG_COOLING: u8 = 0b0000_0010;
const FLAG_SOLENOID: u8 = 0b0000_0100;

/// Actuator state carried by both frame kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActuatorState {
    pub heat_pct: u8,
    /// Vendor fan level, 0–10.
    pub fan_level: u8,
    pub drum: bool,
    pub cooling: bool,
    /// Drop door open.
    pub solenoid: bool,
}

impl ActuatorState {
    fn flags(&self) -> u8 {
        let mut f = 0;
        if self.drum {
            f |= FLAG_DRUM;
        }
        if self.cooling {
            f |= FLAG_COOLING;
        }
        if self.solenoid {
            f |= FLAG_SOLENOID;
        }
        f
    }

    fn from_bytes(heat: u8, fan: u8, flags: u8) -> Self {
        Self {
            heat_pct: heat.min(100),
            fan_level: fan.min(MAX_FAN_LEVEL),
            drum: flags & FLAG_DRUM != 0,
            cooling: flags & FLAG_COOLING != 0,
            solenoid: flags & FLAG_SOLENOID != 0,
        }
    }

    /// Fan output as a percentage.
    pub fn fan_pct(&self) -> u8 {
        self.fan_level * 10
    }
}

/// A decoded status frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFrame {
    pub actuators: ActuatorState,
    pub chamber_f_tenths: u16,
    pub bean_f_tenths: u16,
}

impl StatusFrame {
    pub fn chamber_c(&self) -> f64 {
        fahrenheit_to_celsius(f64::from(self.chamber_f_tenths) / 10.0)
    }

    pub fn bean_c(&self) -> f64 {
        fahrenheit_to_celsius(f64::from(self.bean_f_tenths) / 10.0)
    }
}

pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

/// Inverse of [`fahrenheit_to_celsius`], rounded to the wire's 0.1 °F.
pub fn celsius_to_f_tenths(c: f64) -> u16 {
    let tenths = ((c * 9.0 / 5.0 + 32.0) * 10.0).round();
    tenths.clamp(0.0, f64::from(u16::MAX)) as u16
}

pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

fn encode(kind: u8, actuators: &ActuatorState, chamber: u16, bean: u16) -> [u8; FRAME_LEN] {
    let mut out = [0u8; FRAME_LEN];
    out[..2].copy_from_slice(&SYNC);
    out[2] = kind;
    out[3] = actuators.heat_pct;
    out[4] = actuators.fan_level;
    out[5] = actuators.flags();
    out[6..8].copy_from_slice(&chamber.to_be_bytes());
    out[8..10].copy_from_slice(&bean.to_be_bytes());
    out[FRAME_LEN - 1] = checksum(&out[..FRAME_LEN - 1]);
    out
}

/// Encode a host → roaster command frame.
pub fn encode_command(actuators: &ActuatorState) -> [u8; FRAME_LEN] {
    encode(KIND_COMMAND, actuators, 0, 0)
}

/// Encode a roaster → host status frame.
pub fn encode_status(frame: &StatusFrame) -> [u8; FRAME_LEN] {
    encode(
        KIND_STATUS,
        &frame.actuators,
        frame.chamber_f_tenths,
        frame.bean_f_tenths,
    )
}

/// Parse one complete frame of the expected kind.
///
/// Returns `None` on bad sync, kind, or checksum.
pub fn parse_frame(raw: &[u8; FRAME_LEN], expected_kind: u8) -> Option<StatusFrame> {
    if raw[..2] != SYNC || raw[2] != expected_kind {
        return None;
    }
    if checksum(&raw[..FRAME_LEN - 1]) != raw[FRAME_LEN - 1] {
        return None;
    }
    Some(StatusFrame {
        actuators: ActuatorState::from_bytes(raw[3], raw[4], raw[5]),
        chamber_f_tenths: u16::from_be_bytes([raw[6], raw[7]]),
        bean_f_tenths: u16::from_be_bytes([raw[8], raw[9]]),
    })
}

/// Decoder state machine.
#[derive(Debug, Clone, Copy)]
enum DecoderState {
    /// Looking for the sync preamble; `matched` bytes of it seen so far.
    Hunting { matched: usize },
    /// Sync seen, filling the rest of the frame.
    Collecting { collected: usize },
}

/// Streaming frame decoder.
pub struct FrameDecoder {
    expected_kind: u8,
    state: DecoderState,
    buf: [u8; FRAME_LEN],
    rejected: u64,
}

impl FrameDecoder {
    /// Decoder for roaster → host status frames.
    pub fn status() -> Self {
        Self::new(KIND_STATUS)
    }

    /// Decoder for host → roaster command frames.
    pub fn command() -> Self {
        Self::new(KIND_COMMAND)
    }

    fn new(expected_kind: u8) -> Self {
        Self {
            expected_kind,
            state: DecoderState::Hunting { matched: 0 },
            buf: [0; FRAME_LEN],
            rejected: 0,
        }
    }

    /// Feed one byte.  Returns a frame when this byte completes a valid one.
    pub fn push(&mut self, byte: u8) -> Option<StatusFrame> {
        match self.state {
            DecoderState::Hunting { matched } => {
                if byte == SYNC[matched] {
                    self.buf[matched] = byte;
                    self.state = if matched + 1 == SYNC.len() {
                        DecoderState::Collecting { collected: SYNC.len() }
                    } else {
                        DecoderState::Hunting { matched: matched + 1 }
                    };
                } else {
                    // A stray first sync byte may still start a frame.
                    let restart = usize::from(byte == SYNC[0]);
                    if restart == 1 {
                        self.buf[0] = byte;
                    }
                    self.state = DecoderState::Hunting { matched: restart };
                }
                None
            }
            DecoderState::Collecting { collected } => {
                self.buf[collected] = byte;
                if collected + 1 < FRAME_LEN {
                    self.state = DecoderState::Collecting { collected: collected + 1 };
                    return None;
                }
                self.state = DecoderState::Hunting { matched: 0 };
                let frame = parse_frame(&self.buf, self.expected_kind);
                if frame.is_none() {
                    self.rejected += 1;
                    self.rescan();
                }
                frame
            }
        }
    }

    /// Replay a rejected frame minus its first byte through the hunter.
    fn rescan(&mut self) {
        let rejected = self.buf;
        for &byte in &rejected[1..] {
            // Fewer than FRAME_LEN bytes, so no frame can complete here.
            let _ = self.push(byte);
        }
    }

    /// Feed a chunk, invoking `on_frame` for every complete frame in it.
    pub fn feed(&mut self, data: &[u8], mut on_frame: impl FnMut(StatusFrame)) {
        for &byte in data {
            if let Some(frame) = self.push(byte) {
                on_frame(frame);
            }
        }
    }

    /// Frames discarded for bad kind or checksum.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Reset decoder state (e.g. after a transport reconnect).
    pub fn reset(&mut self) {
        self.state = DecoderState::Hunting { matched: 0 };
    }
}
