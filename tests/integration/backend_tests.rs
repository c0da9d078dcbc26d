//! Session manager driving each real backend: simulated, serial, stub.

use std::sync::Arc;

use roastcore::adapters::serial::SerialRoaster;
use roastcore::adapters::serial::link::VirtualRoaster;
use roastcore::adapters::simulated::SimulatedRoaster;
use roastcore::adapters::time::{ManualClock, SystemClock};
use roastcore::config::{SerialConfig, SimulatorConfig, StubConfig};
use roastcore::fsm::SessionState;
use roastcore::{
    ControlCommand, HardwareConfig, HardwareKind, RoastSessionManager, SessionConfig, StopOutcome,
};

use crate::mock_hw::{epoch, wait_for};

fn manager() -> RoastSessionManager {
    RoastSessionManager::new(SessionConfig {
        poll_interval_ms: 5,
        max_consecutive_poll_errors: 3,
        ..SessionConfig::default()
    })
    .unwrap()
}

fn simulated() -> (SimulatedRoaster, ManualClock) {
    let clock = ManualClock::new(epoch());
    let sim = SimulatedRoaster::with_clock(SimulatorConfig::default(), Arc::new(clock.clone()));
    (sim, clock)
}

fn bean_temp(m: &RoastSessionManager) -> f64 {
    m.get_status()
        .ok()
        .and_then(|s| s.sensors)
        .map_or(f64::NAN, |s| s.bean_temp_c)
}

// ── Simulated ─────────────────────────────────────────────────

#[test]
fn simulated_charge_is_detected_as_beans_added() {
    let m = manager();
    let (sim, clock) = simulated();
    m.start_session_with(Box::new(sim.clone())).unwrap();
    assert_eq!(m.health().hardware.unwrap().kind, HardwareKind::Simulated);

    m.execute_command(ControlCommand::SetHeat(100)).unwrap();
    m.execute_command(ControlCommand::StartDrum).unwrap();
    clock.advance_secs(300);
    assert!(wait_for(|| bean_temp(&m) > 150.0));

    sim.charge_beans();
    clock.advance_secs(1);
    assert!(wait_for(|| {
        m.get_status()
            .is_ok_and(|s| s.timestamps.beans_added.is_some())
    }));

    let metrics = m.get_status().unwrap().metrics;
    assert!(metrics.beans_added_temp_c.unwrap() > 150.0);
    assert!(bean_temp(&m) < 60.0);
}

#[test]
fn simulated_transient_failures_are_absorbed() {
    let m = manager();
    let (sim, _clock) = simulated();
    m.start_session_with(Box::new(sim.clone())).unwrap();

    sim.inject_read_failures(2);
    assert!(wait_for(|| m.health().read_errors == 2));
    let health = m.health();
    assert_eq!(health.state, SessionState::Polling);
    assert_eq!(health.poll_errors, 0);
    assert!(m.get_status().is_ok());
}

#[test]
fn simulated_severed_link_escalates() {
    let m = manager();
    let (sim, _clock) = simulated();
    m.start_session_with(Box::new(sim.clone())).unwrap();

    sim.sever();
    assert!(wait_for(|| m.state() == SessionState::Error));
    assert_eq!(m.get_status().unwrap_err().code(), "THREAD_HEALTH_ERROR");

    let StopOutcome::Stopped(summary) = m.stop_session() else {
        panic!("errored session should still be stoppable");
    };
    assert!(summary.poll_errors >= 3);
}

// ── Serial ────────────────────────────────────────────────────

#[test]
fn serial_session_over_virtual_link() {
    let dev = VirtualRoaster::new();
    dev.set_temperatures_c(150.0, 200.0);
    dev.emit_status();
    let roaster = SerialRoaster::emulated(
        SerialConfig {
            device: "virtual".into(),
            connect_timeout_ms: 1000,
            stale_after_ms: 60_000,
            ..SerialConfig::default()
        },
        Arc::new(SystemClock),
        &dev,
    );

    let m = manager();
    let info = m.start_session_with(Box::new(roaster)).unwrap().into_info();
    assert_eq!(info.hardware.kind, HardwareKind::Real);
    assert!((bean_temp(&m) - 150.0).abs() < 0.1);

    let out = m.execute_command(ControlCommand::SetFan(40)).unwrap();
    assert_eq!(out.applied, Some(40));
    assert_eq!(dev.actuators().fan_level, 4);

    m.execute_command(ControlCommand::DropBeans).unwrap();
    assert!(dev.actuators().solenoid);

    assert!(matches!(m.stop_session(), StopOutcome::Stopped(_)));
}

#[test]
fn serial_device_missing_is_a_connection_error() {
    let m = manager();
    let config = HardwareConfig::Serial(SerialConfig {
        device: "/nonexistent/ttyROAST".into(),
        ..SerialConfig::default()
    });
    let err = m.start_session(&config).unwrap_err();
    assert_eq!(err.code(), "CONNECTION_ERROR");
    assert_eq!(m.state(), SessionState::Idle);
}

// ── Stub ──────────────────────────────────────────────────────

#[test]
fn stub_from_config() {
    let m = manager();
    m.start_session(&HardwareConfig::Stub(StubConfig {
        bean_temp_c: 42.0,
        chamber_temp_c: 84.0,
    }))
    .unwrap();

    let health = m.health();
    let hw = health.hardware.unwrap();
    assert_eq!(hw.kind, HardwareKind::Stub);
    assert!(hw.connected);
    assert!(health.poller_alive);
    assert_eq!(bean_temp(&m), 42.0);
}
