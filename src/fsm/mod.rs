//! Session lifecycle state machine.
//!
//! ```text
//!  IDLE ──[start]──▶ POLLING ──[stop]──▶ IDLE
//!                       │
//!                    [fault]
//!                       ▼
//!                     ERROR ──[stop]──▶ IDLE
//! ```
//!
//! A fault is either the poll loop exceeding its consecutive error budget
//! or the polling thread dying.  ERROR keeps the session (and its last
//! good data) around until the caller stops it; it never auto-recovers.
//!
//! The transition table is a pure function so the session manager can
//! apply it under its lock and tests can enumerate it exhaustively.

use core::fmt;

use log::info;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// State and event identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Polling,
    Error,
}

impl SessionState {
    pub const ALL: [Self; 3] = [Self::Idle, Self::Polling, Self::Error];

    /// True while a session value exists (POLLING or ERROR).
    pub fn has_session(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Polling => write!(f, "POLLING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    Start,
    Stop,
    Fault,
}

impl SessionEvent {
    pub const ALL: [Self; 3] = [Self::Start, Self::Stop, Self::Fault];
}

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

/// `Some(next)` for a legal transition, `None` when the event does not
/// apply in `state` (the caller treats that as a no-op).
pub const fn next_state(state: SessionState, event: SessionEvent) -> Option<SessionState> {
    match (state, event) {
        (SessionState::Idle, SessionEvent::Start) => Some(SessionState::Polling),
        (SessionState::Polling, SessionEvent::Stop) | (SessionState::Error, SessionEvent::Stop) => {
            Some(SessionState::Idle)
        }
        (SessionState::Polling, SessionEvent::Fault) => Some(SessionState::Error),
        _ => None,
    }
}

/// Lifecycle tracker owned by the session manager.
#[derive(Debug, Default)]
pub struct SessionFsm {
    current: SessionState,
}

impl SessionFsm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_state(&self) -> SessionState {
        self.current
    }

    /// Apply `event`.  Returns `true` if the state changed.
    pub fn apply(&mut self, event: SessionEvent) -> bool {
        match next_state(self.current, event) {
            Some(next) => {
                info!("session transition: {} -> {} ({:?})", self.current, next, event);
                self.current = next;
                true
            }
            None => false,
        }
    }
}
