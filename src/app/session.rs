//! Shared session state behind the manager's single lock.
//!
//! The poller and every caller-thread operation go through
//! [`SharedState`], so a status snapshot copied under the lock always
//! belongs to one poll cycle.  The hardware handle sits behind its own
//! mutex so an abandoned poller stuck in a read cannot wedge the session
//! lock.  Lock order is session → hardware; the poller never nests them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::TrackerConfig;
use crate::fsm::SessionFsm;
use crate::model::SensorReading;
use crate::tracker::RoastEventTracker;

use super::events::{SensorBlock, SessionInfo};
use super::ports::RoasterPort;

pub(crate) type SharedHardware = Arc<Mutex<Box<dyn RoasterPort>>>;

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lifecycle plus the zero-or-one live session.
#[derive(Default)]
pub(crate) struct SharedState {
    pub fsm: SessionFsm,
    pub session: Option<ActiveSession>,
}

/// The live session, if it is the one identified by `session_id`.
///
/// Takes the slot rather than `&mut SharedState` so the FSM stays
/// borrowable alongside the result.
pub(crate) fn current(slot: &mut Option<ActiveSession>, session_id: Uuid) -> Option<&mut ActiveSession> {
    slot.as_mut().filter(|s| s.info.session_id == session_id)
}

/// Poll loop bookkeeping surfaced through `health()`.
#[derive(Debug, Clone, Default)]
pub(crate) struct PollHealth {
    pub poller_alive: bool,
    pub consecutive_errors: u32,
    pub total_errors: u64,
    pub last_error: Option<String>,
    /// Mirrors of hardware counters, refreshed each cycle.
    pub read_errors: u64,
    pub connected: bool,
}

pub(crate) struct ActiveSession {
    pub info: SessionInfo,
    pub hardware: SharedHardware,
    pub tracker: RoastEventTracker,
    /// Latest sensor block, with confirmed heat/fan written through by
    /// commands until the next reading taken after them.
    pub sensors: Option<SensorBlock>,
    /// Bumped by every confirmed command.  The poller samples it before a
    /// read to tell whether the reading predates a command.
    pub command_seq: u64,
    pub last_update: Option<DateTime<Utc>>,
    pub health: PollHealth,
}

impl ActiveSession {
    pub fn new(info: SessionInfo, hardware: SharedHardware, config: &TrackerConfig) -> Self {
        Self {
            health: PollHealth {
                connected: info.hardware.connected,
                ..PollHealth::default()
            },
            info,
            hardware,
            tracker: RoastEventTracker::new(config),
            sensors: None,
            command_seq: 0,
            last_update: None,
        }
    }

    /// Feed a reading into the cached snapshot and the tracker.
    ///
    /// `read_seq` is the [`command_seq`](Self::command_seq) sampled before
    /// the read.  If a command was confirmed since, the reading's heat and
    /// fan are superseded and the confirmed values are kept.
    ///
    /// Returns `false` for a re-served reading that does not advance time.
    pub fn apply_reading(&mut self, reading: &SensorReading, read_seq: u64) -> bool {
        if self.last_update.is_some_and(|t| reading.timestamp <= t) {
            return false;
        }
        self.tracker.update(reading);

        let mut block = SensorBlock::from(reading);
        if let (true, Some(confirmed)) = (read_seq != self.command_seq, self.sensors) {
            block.heat_pct = confirmed.heat_pct;
            block.fan_pct = confirmed.fan_pct;
        }
        self.sensors = Some(block);
        self.last_update = Some(reading.timestamp);
        true
    }
}
