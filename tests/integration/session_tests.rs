//! Session manager behaviour against the scripted roaster.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use roastcore::fsm::SessionState;
use roastcore::model::RoastEventKind;
use roastcore::safety::RoastWarning;
use roastcore::{
    ControlCommand, Error, RoastSessionManager, SessionConfig, StartOutcome, StopOutcome,
};

use crate::mock_hw::{ActuatorCall, ScriptedRoaster, epoch, reading_at, wait_for};

fn config() -> SessionConfig {
    SessionConfig {
        poll_interval_ms: 5,
        max_consecutive_poll_errors: 3,
        ..SessionConfig::default()
    }
}

fn manager() -> RoastSessionManager {
    RoastSessionManager::new(config()).unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    epoch() + chrono::Duration::seconds(secs)
}

fn last_update(m: &RoastSessionManager) -> Option<DateTime<Utc>> {
    m.get_status().ok().and_then(|s| s.connection.last_update)
}

fn started(m: &RoastSessionManager, hw: &ScriptedRoaster) -> uuid::Uuid {
    match m.start_session_with(hw.boxed()).unwrap() {
        StartOutcome::Started(info) => info.session_id,
        StartOutcome::AlreadyRunning(_) => panic!("expected a fresh session"),
    }
}

// ── Lifecycle ─────────────────────────────────────────────────

#[test]
fn start_twice_returns_same_session() {
    let m = manager();
    let hw = ScriptedRoaster::with_readings([reading_at(0, 20.0)]);
    let id = started(&m, &hw);

    let again = m.start_session_with(ScriptedRoaster::new().boxed()).unwrap();
    assert!(matches!(again, StartOutcome::AlreadyRunning(_)));
    assert_eq!(again.info().session_id, id);
    assert_eq!(m.state(), SessionState::Polling);
}

#[test]
fn stop_twice_reports_no_active_session() {
    let m = manager();
    let hw = ScriptedRoaster::with_readings([reading_at(0, 20.0)]);
    let id = started(&m, &hw);

    match m.stop_session() {
        StopOutcome::Stopped(summary) => {
            assert_eq!(summary.session_id, id);
            assert!(summary.poller_joined);
        }
        StopOutcome::NoActiveSession => panic!("session should have been live"),
    }
    assert_eq!(m.stop_session(), StopOutcome::NoActiveSession);
    assert_eq!(m.state(), SessionState::Idle);
    assert_eq!(hw.disconnects(), 1);
}

#[test]
fn failed_connect_leaves_manager_idle() {
    let m = manager();
    let hw = ScriptedRoaster::with_readings([reading_at(0, 20.0)]);
    hw.fail_connect();
    let err = m.start_session_with(hw.boxed()).unwrap_err();
    assert_eq!(err.code(), "CONNECTION_ERROR");
    assert_eq!(m.state(), SessionState::Idle);
    assert!(m.session_info().is_none());
}

#[test]
fn failed_first_read_disconnects() {
    let m = manager();
    let hw = ScriptedRoaster::new();
    let err = m.start_session_with(hw.boxed()).unwrap_err();
    assert_eq!(err.code(), "CONNECTION_ERROR");
    assert_eq!(hw.disconnects(), 1);
    assert_eq!(m.state(), SessionState::Idle);
}

#[test]
fn restart_begins_with_a_clean_tracker() {
    let m = manager();
    let hw = ScriptedRoaster::with_readings([reading_at(0, 170.0), reading_at(1, 150.0)]);
    let first = started(&m, &hw);
    assert!(wait_for(|| last_update(&m) == Some(at(1))));
    assert!(m.get_status().unwrap().timestamps.beans_added.is_some());
    m.stop_session();

    let hw = ScriptedRoaster::with_readings([reading_at(10, 150.0)]);
    let second = started(&m, &hw);
    assert_ne!(first, second);
    let status = m.get_status().unwrap();
    assert!(status.timestamps.beans_added.is_none());
    assert_eq!(status.metrics.beans_added_temp_c, None);
}

#[test]
fn abandoned_poller_cannot_touch_the_next_session() {
    let m = RoastSessionManager::new(SessionConfig {
        stop_join_timeout_ms: 50,
        ..config()
    })
    .unwrap();
    let slow = ScriptedRoaster::with_readings([reading_at(0, 20.0)]);
    started(&m, &slow);
    slow.set_read_delay(Duration::from_millis(300));
    thread::sleep(Duration::from_millis(30));

    match m.stop_session() {
        StopOutcome::Stopped(summary) => assert!(!summary.poller_joined),
        StopOutcome::NoActiveSession => panic!("session should have been live"),
    }
    assert_eq!(m.state(), SessionState::Idle);

    let fresh = ScriptedRoaster::with_readings([reading_at(100, 20.0)]);
    let id = started(&m, &fresh);
    // Let the abandoned read finish and its poller exit.
    thread::sleep(Duration::from_millis(400));

    let status = m.get_status().unwrap();
    assert_eq!(status.session_id, id);
    assert_eq!(status.connection.last_update, Some(at(100)));
    assert!(m.health().poller_alive);
}

// ── Commands ──────────────────────────────────────────────────

#[test]
fn commands_validate_then_forward() {
    let m = manager();
    let hw = ScriptedRoaster::with_readings([reading_at(0, 20.0)]);
    started(&m, &hw);

    let err = m.execute_command(ControlCommand::SetHeat(55)).unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert!(hw.calls().is_empty());

    let out = m.execute_command(ControlCommand::SetHeat(60)).unwrap();
    assert_eq!(out.applied, Some(60));
    assert_eq!(m.get_status().unwrap().sensors.unwrap().heat_pct, 60);

    m.execute_command(ControlCommand::StartDrum).unwrap();
    assert_eq!(
        m.execute_command(ControlCommand::StartDrum).unwrap().applied,
        None
    );
    assert_eq!(
        hw.calls(),
        vec![
            ActuatorCall::SetHeat(60),
            ActuatorCall::StartDrum,
            ActuatorCall::StartDrum
        ]
    );
}

#[test]
fn status_never_shows_heat_from_before_a_command() {
    let m = RoastSessionManager::new(SessionConfig {
        poll_interval_ms: 1,
        ..config()
    })
    .unwrap();
    let hw = ScriptedRoaster::new();
    hw.live(150.0);
    started(&m, &hw);
    // Reads sample heat on entry and take a while, so most of them are
    // still in flight when the next command lands.
    hw.set_read_delay(Duration::from_millis(20));

    for i in 0..30 {
        let pct = if i % 2 == 0 { 60 } else { 30 };
        let out = m.execute_command(ControlCommand::SetHeat(pct)).unwrap();
        assert_eq!(out.applied, Some(pct));
        thread::sleep(Duration::from_millis(3));

        let heat = m.get_status().unwrap().sensors.unwrap().heat_pct;
        assert_eq!(heat, pct, "iteration {i}: status lags the confirmed command");
    }
    assert!(matches!(m.stop_session(), StopOutcome::Stopped(_)));
}

#[test]
fn hardware_command_failure_is_a_connection_error() {
    let m = manager();
    let hw = ScriptedRoaster::with_readings([reading_at(0, 20.0)]);
    started(&m, &hw);
    hw.fail_commands(true);

    let err = m.execute_command(ControlCommand::SetFan(30)).unwrap_err();
    assert_eq!(err.code(), "CONNECTION_ERROR");
    assert_eq!(m.state(), SessionState::Polling);
}

#[test]
fn commands_and_events_need_a_session() {
    let m = manager();
    assert_eq!(
        m.execute_command(ControlCommand::DropBeans).unwrap_err(),
        Error::NoActiveSession
    );
    assert_eq!(
        m.report_first_crack(epoch(), 195.0).unwrap_err(),
        Error::NoActiveSession
    );
    assert_eq!(m.record_drop(200.0).unwrap_err(), Error::NoActiveSession);
}

// ── Roast events ──────────────────────────────────────────────

#[test]
fn first_crack_is_write_once() {
    let m = manager();
    let hw = ScriptedRoaster::with_readings([
        reading_at(0, 170.0),
        reading_at(1, 155.0),
        reading_at(2, 160.0),
    ]);
    started(&m, &hw);
    assert!(wait_for(|| last_update(&m) == Some(at(2))));

    m.report_first_crack(at(2), 160.0).unwrap();
    let err = m.report_first_crack(at(3), 161.0).unwrap_err();
    assert_eq!(err, Error::AlreadyReported(RoastEventKind::FirstCrack));
    assert_eq!(err.code(), "ALREADY_REPORTED");

    let status = m.get_status().unwrap();
    assert_eq!(status.timestamps.first_crack, Some(at(2)));
    assert_eq!(status.metrics.first_crack_temp_c, Some(160.0));
}

#[test]
fn drop_beans_command_records_drop_once() {
    let m = manager();
    let hw = ScriptedRoaster::with_readings([
        reading_at(0, 170.0),
        reading_at(1, 155.0),
        reading_at(2, 180.0),
    ]);
    started(&m, &hw);
    assert!(wait_for(|| last_update(&m) == Some(at(2))));
    m.report_first_crack(at(2), 180.0).unwrap();

    m.execute_command(ControlCommand::DropBeans).unwrap();
    let status = m.get_status().unwrap();
    assert_eq!(status.timestamps.drop, Some(at(2)));
    assert_eq!(status.metrics.drop_temp_c, Some(180.0));

    assert_eq!(
        m.record_drop(181.0).unwrap_err(),
        Error::AlreadyReported(RoastEventKind::Drop)
    );
    // The command itself stays repeatable.
    m.execute_command(ControlCommand::DropBeans).unwrap();
}

#[test]
fn end_to_end_roast() {
    let m = manager();
    let hw = ScriptedRoaster::with_readings([reading_at(0, 170.0)]);
    let id = started(&m, &hw);

    hw.push([reading_at(1, 155.0)]);
    hw.push((1..=48).map(|k| reading_at(1 + 10 * k, 155.0 + 40.0 * k as f64 / 48.0)));
    assert!(wait_for(|| last_update(&m) == Some(at(481))));

    let status = m.get_status().unwrap();
    assert_eq!(status.timestamps.beans_added, Some(at(1)));
    assert_eq!(status.metrics.beans_added_temp_c, Some(170.0));
    assert_eq!(status.metrics.development_time_pct, None);

    m.report_first_crack(at(481), 195.0).unwrap();
    hw.push((1..=9).map(|k| reading_at(481 + 10 * k, 195.0 + k as f64 / 3.0)));
    assert!(wait_for(|| last_update(&m) == Some(at(571))));

    let status = m.get_status().unwrap();
    let pct = status.metrics.development_time_pct.unwrap();
    assert!((pct - 90.0 / 570.0 * 100.0).abs() < 1e-9);
    assert!((pct - 15.8).abs() < 0.05);
    assert_eq!(status.metrics.development_time_s, Some(90.0));

    let ack = m.record_drop(198.0).unwrap();
    assert_eq!(ack.at, at(571));

    let StopOutcome::Stopped(summary) = m.stop_session() else {
        panic!("session should have been live");
    };
    assert_eq!(summary.session_id, id);
    let ts = &summary.timestamps;
    assert_eq!(ts.beans_added, Some(at(1)));
    assert_eq!(ts.first_crack, Some(at(481)));
    assert_eq!(ts.drop, Some(at(571)));
    assert!(ts.session_start <= Utc::now());
    assert_eq!(summary.metrics.total_duration_s, Some(570.0));
    assert_eq!(summary.metrics.drop_temp_c, Some(198.0));
}

// ── Polling health ────────────────────────────────────────────

#[test]
fn persistent_read_failure_escalates_to_error() {
    let m = manager();
    let hw = ScriptedRoaster::with_readings([reading_at(0, 20.0)]);
    started(&m, &hw);
    hw.fail_reads(true);

    assert!(wait_for(|| m.state() == SessionState::Error));
    let err = m.get_status().unwrap_err();
    assert_eq!(err.code(), "THREAD_HEALTH_ERROR");

    assert!(wait_for(|| !m.health().poller_alive));
    let health = m.health();
    assert_eq!(health.consecutive_poll_errors, 3);
    assert!(health.last_error.is_some());

    // Operators can still cut heat.
    m.execute_command(ControlCommand::SetHeat(0)).unwrap();

    let StopOutcome::Stopped(summary) = m.stop_session() else {
        panic!("errored session should still be stoppable");
    };
    assert_eq!(summary.poll_errors, 3);
    assert_eq!(m.state(), SessionState::Idle);
}

#[test]
fn poller_death_escalates_to_error() {
    let m = manager();
    let hw = ScriptedRoaster::with_readings([reading_at(0, 20.0)]);
    started(&m, &hw);
    hw.panic_on_read();

    assert!(wait_for(|| m.state() == SessionState::Error));
    assert!(wait_for(|| !m.health().poller_alive));
    assert_eq!(m.get_status().unwrap_err().code(), "THREAD_HEALTH_ERROR");
    assert!(m.health().last_error.is_some());

    // The driver panicked holding the hardware lock; stop still disconnects.
    let StopOutcome::Stopped(summary) = m.stop_session() else {
        panic!("dead poller's session should still be stoppable");
    };
    assert!(summary.poller_joined);
    assert_eq!(hw.disconnects(), 1);
    assert_eq!(m.state(), SessionState::Idle);
}

#[test]
fn isolated_failures_do_not_escalate() {
    let m = RoastSessionManager::new(SessionConfig {
        max_consecutive_poll_errors: 1000,
        ..config()
    })
    .unwrap();
    let hw = ScriptedRoaster::with_readings([reading_at(0, 20.0)]);
    started(&m, &hw);

    hw.fail_reads(true);
    assert!(wait_for(|| m.health().poll_errors >= 1));
    hw.fail_reads(false);
    hw.push([reading_at(1, 21.0)]);
    assert!(wait_for(|| last_update(&m) == Some(at(1))));

    let health = m.health();
    assert_eq!(health.state, SessionState::Polling);
    assert_eq!(health.consecutive_poll_errors, 0);
}

#[test]
fn status_carries_roast_warnings() {
    let m = manager();
    let hw = ScriptedRoaster::with_readings([
        reading_at(0, 200.0),
        reading_at(1, 170.0),
        reading_at(2, 160.0),
    ]);
    started(&m, &hw);
    assert!(wait_for(|| last_update(&m) == Some(at(2))));
    // Still falling after the charge.
    assert_eq!(m.get_status().unwrap().warnings, vec![RoastWarning::Stall]);

    hw.push([reading_at(3, 260.0)]);
    assert!(wait_for(|| last_update(&m) == Some(at(3))));
    assert_eq!(m.get_status().unwrap().warnings, vec![RoastWarning::BeanOverheat]);

    hw.push([reading_at(4, 200.0)]);
    assert!(wait_for(|| last_update(&m) == Some(at(4))));
    assert!(m.get_status().unwrap().warnings.is_empty());
}

#[test]
fn concurrent_status_reads_never_tear() {
    let m = Arc::new(manager());
    let hw = ScriptedRoaster::with_readings([reading_at(0, 100.0)]);
    started(&m, &hw);
    hw.push((1..=600).map(|s| reading_at(s, 100.0 + (s % 50) as f64)));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                for _ in 0..500 {
                    let status = m.get_status().unwrap();
                    let sensors = status.sensors.unwrap();
                    let secs = (status.connection.last_update.unwrap() - epoch()).num_seconds();
                    assert_eq!(sensors.bean_temp_c, 100.0 + (secs % 50) as f64);
                    assert_eq!(sensors.chamber_temp_c - sensors.bean_temp_c, 40.0);
                }
            })
        })
        .collect();

    for heat in [10, 20, 30, 40, 50] {
        m.execute_command(ControlCommand::SetHeat(heat)).unwrap();
    }
    for r in readers {
        r.join().unwrap();
    }
}

#[test]
fn status_serializes_to_the_documented_shape() {
    let m = manager();
    let hw = ScriptedRoaster::with_readings([reading_at(0, 20.0)]);
    started(&m, &hw);

    let value = serde_json::to_value(m.get_status().unwrap()).unwrap();
    for key in ["sensors", "timestamps", "metrics", "connection", "warnings"] {
        assert!(value.get(key).is_some(), "missing {key}");
    }
    assert_eq!(value["connection"]["status"], "connected");
    assert_eq!(value["connection"]["hardware_id"], "scripted-0");
    assert_eq!(value["sensors"]["bean_temp_c"], 20.0);
}
