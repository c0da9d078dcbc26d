//! Application service — the hexagonal core.
//!
//! [`RoastSessionManager`] owns the session lifecycle, the background
//! poller, and the zero-or-one live session.  It exposes a synchronous,
//! hardware-agnostic API; all hardware I/O flows through the
//! [`RoasterPort`] selected when the session starts.
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!  callers ──────▶│     RoastSessionManager       │
//!                 │  FSM · session · tracker      │◀── poller thread
//!                 └──────────────┬───────────────┘
//!                                ▼
//!                           RoasterPort
//! ```
//!
//! Start and stop are serialised by a lifecycle mutex that also holds the
//! poller handle.  Everything else shares the session lock (see
//! [`super::session`]).  Lock order: lifecycle → session → hardware.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};
use uuid::Uuid;

use crate::adapters::build_roaster;
use crate::adapters::time::SystemClock;
use crate::config::{HardwareConfig, SessionConfig};
use crate::error::{Error, Result};
use crate::fsm::{SessionEvent, SessionState};
use crate::model::RoastEventKind;
use crate::safety::RoastWarning;

use super::commands::{CommandOutcome, ControlCommand};
use super::events::{
    ConnectionInfo, ConnectionStatus, EventAck, HealthReport, RoastStatus, SessionInfo,
    SessionSummary, StartOutcome, StopOutcome,
};
use super::poller::{self, PollerHandle};
use super::ports::{Clock, RoasterPort};
use super::session::{ActiveSession, SharedState, lock};

// ───────────────────────────────────────────────────────────────
// RoastSessionManager
// ───────────────────────────────────────────────────────────────

/// Single-session, thread-safe façade over one roaster.
///
/// Share it between threads behind an `Arc`; every method takes `&self`.
pub struct RoastSessionManager {
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    shared: Arc<Mutex<SharedState>>,
    /// Poller of the live session.  Held for the whole of start/stop.
    lifecycle: Mutex<Option<PollerHandle>>,
}

impl RoastSessionManager {
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Use `clock` for session start/stop stamps.
    pub fn with_clock(config: SessionConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            shared: Arc::new(Mutex::new(SharedState::default())),
            lifecycle: Mutex::new(None),
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Build the backend described by `hardware` and start a session on it.
    ///
    /// Returns the existing session untouched if one is already live.
    pub fn start_session(&self, hardware: &HardwareConfig) -> Result<StartOutcome> {
        let mut slot = lock(&self.lifecycle);
        if let Some(info) = self.session_info() {
            return Ok(StartOutcome::AlreadyRunning(info));
        }
        let roaster = build_roaster(hardware)?;
        self.start_locked(&mut slot, roaster)
    }

    /// Start a session on an already-built roaster.
    ///
    /// If a session is already live, `roaster` is dropped unused.
    pub fn start_session_with(&self, roaster: Box<dyn RoasterPort>) -> Result<StartOutcome> {
        let mut slot = lock(&self.lifecycle);
        if let Some(info) = self.session_info() {
            return Ok(StartOutcome::AlreadyRunning(info));
        }
        self.start_locked(&mut slot, roaster)
    }

    fn start_locked(
        &self,
        slot: &mut Option<PollerHandle>,
        mut roaster: Box<dyn RoasterPort>,
    ) -> Result<StartOutcome> {
        roaster.connect()?;
        // The first reading doubles as the connectivity check.
        let first = match roaster.read_sensors() {
            Ok(reading) => reading,
            Err(e) => {
                roaster.disconnect();
                return Err(Error::connection(format!("initial sensor read failed: {e}")));
            }
        };

        let info = SessionInfo {
            session_id: Uuid::new_v4(),
            started_at: self.clock.now(),
            hardware: roaster.info(),
        };
        let hardware = Arc::new(Mutex::new(roaster));

        {
            let mut state = lock(&self.shared);
            let mut session =
                ActiveSession::new(info.clone(), Arc::clone(&hardware), &self.config.tracker);
            session.apply_reading(&first, session.command_seq);
            session.health.poller_alive = true;
            state.session = Some(session);
            state.fsm.apply(SessionEvent::Start);
        }

        match poller::spawn(
            Arc::clone(&self.shared),
            Arc::clone(&hardware),
            info.session_id,
            Duration::from_millis(self.config.poll_interval_ms),
            self.config.max_consecutive_poll_errors,
        ) {
            Ok(handle) => *slot = Some(handle),
            Err(e) => {
                let mut state = lock(&self.shared);
                state.session = None;
                state.fsm.apply(SessionEvent::Stop);
                drop(state);
                lock(&hardware).disconnect();
                return Err(e);
            }
        }

        info!(
            "session {} started on {} ({:?})",
            info.session_id, info.hardware.hardware_id, info.hardware.kind
        );
        Ok(StartOutcome::Started(info))
    }

    /// Stop the live session, join its poller (bounded), and release the
    /// hardware.
    pub fn stop_session(&self) -> StopOutcome {
        let mut slot = lock(&self.lifecycle);
        let poller_joined = match slot.take() {
            Some(handle) => {
                handle.stop(Duration::from_millis(self.config.stop_join_timeout_ms))
            }
            None => true,
        };

        let session = {
            let mut state = lock(&self.shared);
            let session = state.session.take();
            state.fsm.apply(SessionEvent::Stop);
            session
        };
        let Some(session) = session else {
            return StopOutcome::NoActiveSession;
        };

        release_hardware(&session, poller_joined);

        let summary = SessionSummary {
            session_id: session.info.session_id,
            hardware_id: session.info.hardware.hardware_id.clone(),
            stopped_at: self.clock.now(),
            timestamps: session.tracker.timestamps(session.info.started_at),
            metrics: session.tracker.metrics(),
            read_errors: session.health.read_errors,
            poll_errors: session.health.total_errors,
            poller_joined,
        };
        info!("session {} stopped", summary.session_id);
        StopOutcome::Stopped(Box::new(summary))
    }

    // ── Queries ───────────────────────────────────────────────

    /// Merged status snapshot from cached state.  Never touches hardware.
    ///
    /// Fails with [`Error::ThreadHealth`] once polling has escalated to
    /// ERROR; [`Self::health`] still answers in that state.
    pub fn get_status(&self) -> Result<RoastStatus> {
        let state = lock(&self.shared);
        let current = state.fsm.current_state();
        let session = state.session.as_ref().ok_or(Error::NoActiveSession)?;
        if current == SessionState::Error {
            let reason = session
                .health
                .last_error
                .clone()
                .unwrap_or_else(|| "polling stopped".to_string());
            return Err(Error::ThreadHealth(reason));
        }

        Ok(RoastStatus {
            session_id: session.info.session_id,
            state: current,
            sensors: session.sensors,
            timestamps: session.tracker.timestamps(session.info.started_at),
            metrics: session.tracker.metrics(),
            connection: ConnectionInfo {
                status: if session.health.connected {
                    ConnectionStatus::Connected
                } else {
                    ConnectionStatus::Disconnected
                },
                hardware_id: session.info.hardware.hardware_id.clone(),
                last_update: session.last_update,
            },
            warnings: RoastWarning::from_mask(session.tracker.warnings()),
        })
    }

    /// Health snapshot.  Answers in every state.
    pub fn health(&self) -> HealthReport {
        let state = lock(&self.shared);
        let current = state.fsm.current_state();
        match &state.session {
            Some(s) => {
                let mut hardware = s.info.hardware.clone();
                hardware.connected = s.health.connected;
                HealthReport {
                    state: current,
                    session_id: Some(s.info.session_id),
                    hardware: Some(hardware),
                    poller_alive: s.health.poller_alive,
                    consecutive_poll_errors: s.health.consecutive_errors,
                    poll_errors: s.health.total_errors,
                    read_errors: s.health.read_errors,
                    last_error: s.health.last_error.clone(),
                }
            }
            None => HealthReport {
                state: current,
                session_id: None,
                hardware: None,
                poller_alive: false,
                consecutive_poll_errors: 0,
                poll_errors: 0,
                read_errors: 0,
                last_error: None,
            },
        }
    }

    pub fn state(&self) -> SessionState {
        lock(&self.shared).fsm.current_state()
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        lock(&self.shared).session.as_ref().map(|s| s.info.clone())
    }

    // ── Commands ──────────────────────────────────────────────

    /// Validate `cmd`, forward it to the roaster, and return the
    /// hardware-confirmed value.
    ///
    /// Accepted in POLLING and ERROR so an operator can always cut heat.
    pub fn execute_command(&self, cmd: ControlCommand) -> Result<CommandOutcome> {
        cmd.validate()?;

        let mut state = lock(&self.shared);
        let session = state.session.as_mut().ok_or(Error::NoActiveSession)?;
        let mut hw = lock(&session.hardware);

        let applied = match cmd {
            ControlCommand::SetHeat(pct) => Some(hw.set_heat(pct).map_err(command_error)?),
            ControlCommand::SetFan(pct) => Some(hw.set_fan(pct).map_err(command_error)?),
            ControlCommand::StartDrum => hw.start_drum().map_err(command_error).map(|()| None)?,
            ControlCommand::StopDrum => hw.stop_drum().map_err(command_error).map(|()| None)?,
            ControlCommand::DropBeans => hw.drop_beans().map_err(command_error).map(|()| None)?,
            ControlCommand::StartCooling => {
                hw.start_cooling().map_err(command_error).map(|()| None)?
            }
            ControlCommand::StopCooling => {
                hw.stop_cooling().map_err(command_error).map(|()| None)?
            }
        };
        drop(hw);
        session.command_seq += 1;

        match cmd {
            ControlCommand::SetHeat(_) => {
                if let (Some(block), Some(pct)) = (session.sensors.as_mut(), applied) {
                    block.heat_pct = pct;
                }
            }
            ControlCommand::SetFan(_) => {
                if let (Some(block), Some(pct)) = (session.sensors.as_mut(), applied) {
                    block.fan_pct = pct;
                }
            }
            ControlCommand::DropBeans => record_drop_on_command(session),
            _ => {}
        }

        info!("command {} applied ({:?})", cmd.name(), applied);
        Ok(CommandOutcome { command: cmd, applied })
    }

    // ── Roast events ──────────────────────────────────────────

    /// Record first crack as reported by the external detector.
    pub fn report_first_crack(&self, at: DateTime<Utc>, temp_c: f64) -> Result<EventAck> {
        let mut state = lock(&self.shared);
        let session = state.session.as_mut().ok_or(Error::NoActiveSession)?;
        session.tracker.report_first_crack(at, temp_c)?;
        Ok(EventAck { at, temp_c })
    }

    /// Record drop at the latest reading's time.
    pub fn record_drop(&self, temp_c: f64) -> Result<EventAck> {
        let mut state = lock(&self.shared);
        let session = state.session.as_mut().ok_or(Error::NoActiveSession)?;
        let at = session.tracker.record_drop(temp_c)?;
        Ok(EventAck { at, temp_c })
    }
}

impl Drop for RoastSessionManager {
    fn drop(&mut self) {
        if self.state().has_session() {
            self.stop_session();
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────

/// Hardware failures during a command surface as connection errors.
fn command_error(e: Error) -> Error {
    match e {
        Error::Connection(_) | Error::Validation(_) => e,
        other => Error::Connection(other.to_string()),
    }
}

fn record_drop_on_command(session: &mut ActiveSession) {
    if session.tracker.event_time(RoastEventKind::Drop).is_some() {
        return;
    }
    let Some(reading) = session.tracker.last_reading() else {
        return;
    };
    if let Err(e) = session.tracker.record_drop(reading.bean_temp_c) {
        warn!("drop_beans applied but drop not recorded: {e}");
    }
}

/// Disconnect the roaster.  An abandoned poller may still hold the
/// hardware; then the handle is released without a disconnect.
fn release_hardware(session: &ActiveSession, poller_joined: bool) {
    if poller_joined {
        lock(&session.hardware).disconnect();
        return;
    }
    match session.hardware.try_lock() {
        Ok(mut hw) => hw.disconnect(),
        Err(std::sync::TryLockError::Poisoned(p)) => p.into_inner().disconnect(),
        Err(std::sync::TryLockError::WouldBlock) => {
            warn!(
                "hardware for session {} still busy in abandoned poller; releasing handle",
                session.info.session_id
            );
        }
    }
}
