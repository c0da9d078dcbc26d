//! Background polling thread.
//!
//! One thread per session runs `read_sensors → tracker.update` once per
//! interval.  It is the only writer of the cached reading and metrics.
//!
//! ```text
//!  loop:
//!    stop_rx.recv_timeout(interval) ── stop / sender gone ──▶ exit
//!    lock(session):  sample command_seq
//!    lock(hardware): read_sensors()
//!    lock(session):  generation check → apply reading / count error
//!                    errors ≥ budget ──▶ FSM fault, exit
//! ```
//!
//! The read runs outside the session lock, so a command can be confirmed
//! while it is in flight.  The sampled `command_seq` lets the apply step
//! keep the command's heat/fan instead of the older reading's.
//!
//! Exit always runs [`ExitGuard`], which clears `poller_alive`, escalates
//! an unexpected exit (including a panic) to a fault, and signals the done
//! channel that `stop` waits on.  std offers no timed join, so the done
//! channel is what bounds the wait.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::fsm::{SessionEvent, SessionState};

use super::session::{SharedHardware, SharedState, current, lock};

/// Caller-side handle to a running poller.
pub(crate) struct PollerHandle {
    session_id: Uuid,
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    thread: JoinHandle<()>,
}

impl PollerHandle {
    /// Signal stop and wait up to `timeout` for the thread to finish.
    ///
    /// Returns `false` if the thread had to be abandoned.
    pub fn stop(self, timeout: Duration) -> bool {
        // A poller that already exited has dropped its receiver.
        let _ = self.stop_tx.send(());
        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.thread.join().is_err() {
                    warn!("poller for session {} had panicked", self.session_id);
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                error!(
                    "poller for session {} did not exit within {:?}; abandoning it",
                    self.session_id, timeout
                );
                false
            }
        }
    }
}

#[derive(Clone)]
struct PollContext {
    shared: Arc<Mutex<SharedState>>,
    hardware: SharedHardware,
    session_id: Uuid,
    max_consecutive_errors: u32,
}

/// Spawn the poller.  The caller must already have marked the session's
/// `poller_alive`.
pub(crate) fn spawn(
    shared: Arc<Mutex<SharedState>>,
    hardware: SharedHardware,
    session_id: Uuid,
    interval: Duration,
    max_consecutive_errors: u32,
) -> Result<PollerHandle> {
    let (stop_tx, stop_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel();
    let ctx = PollContext {
        shared,
        hardware,
        session_id,
        max_consecutive_errors,
    };

    let thread = thread::Builder::new()
        .name(format!("roast-poller-{}", &session_id.simple().to_string()[..8]))
        .spawn(move || run(ctx, interval, &stop_rx, done_tx))
        .map_err(|e| Error::ThreadHealth(format!("failed to spawn poller: {e}")))?;

    Ok(PollerHandle {
        session_id,
        stop_tx,
        done_rx,
        thread,
    })
}

fn run(ctx: PollContext, interval: Duration, stop_rx: &Receiver<()>, done_tx: Sender<()>) {
    let mut guard = ExitGuard {
        ctx: ctx.clone(),
        done_tx,
        clean: false,
    };
    debug!("poller for session {} running every {:?}", ctx.session_id, interval);

    loop {
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        if !poll_once(&ctx) {
            break;
        }
    }
    guard.clean = true;
}

/// One poll cycle.  Returns `false` when the loop should exit.
fn poll_once(ctx: &PollContext) -> bool {
    let read_seq = {
        let mut state = lock(&ctx.shared);
        match current(&mut state.session, ctx.session_id) {
            Some(session) => session.command_seq,
            None => {
                debug!("poller for session {} superseded", ctx.session_id);
                return false;
            }
        }
    };

    let (result, read_errors, connected) = {
        let mut hw = lock(&ctx.hardware);
        let result = hw.read_sensors();
        (result, hw.read_error_count(), hw.is_connected())
    };

    let mut state = lock(&ctx.shared);
    let state = &mut *state;
    if state.fsm.current_state() != SessionState::Polling {
        return false;
    }
    let Some(session) = current(&mut state.session, ctx.session_id) else {
        debug!("poller for session {} superseded", ctx.session_id);
        return false;
    };

    session.health.read_errors = read_errors;
    session.health.connected = connected;

    match result {
        Ok(reading) => {
            session.apply_reading(&reading, read_seq);
            session.health.consecutive_errors = 0;
            true
        }
        Err(e) => {
            let health = &mut session.health;
            health.consecutive_errors += 1;
            health.total_errors += 1;
            health.last_error = Some(e.to_string());
            warn!(
                "poll failed ({}/{}): {e}",
                health.consecutive_errors, ctx.max_consecutive_errors
            );
            if health.consecutive_errors < ctx.max_consecutive_errors {
                return true;
            }
            error!(
                "session {}: {} consecutive poll failures, entering ERROR",
                ctx.session_id, health.consecutive_errors
            );
            state.fsm.apply(SessionEvent::Fault);
            false
        }
    }
}

/// Runs on every poller exit, including unwinding.
struct ExitGuard {
    ctx: PollContext,
    done_tx: Sender<()>,
    clean: bool,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        {
            let mut state = lock(&self.ctx.shared);
            let state = &mut *state;
            let polling = state.fsm.current_state() == SessionState::Polling;
            if let Some(session) = current(&mut state.session, self.ctx.session_id) {
                session.health.poller_alive = false;
                if !self.clean && polling {
                    error!("poller for session {} died", self.ctx.session_id);
                    session.health.last_error = Some("polling thread exited unexpectedly".into());
                    state.fsm.apply(SessionEvent::Fault);
                }
            }
        }
        info!("poller for session {} exited", self.ctx.session_id);
        let _ = self.done_tx.send(());
    }
}
