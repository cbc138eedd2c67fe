//! Integration tests for the station lifecycle
//!
//! These tests validate the complete sampling workflow:
//! - Attach, disconnect and reconnect with engine teardown
//! - Live rate changes and collection toggling
//! - Read failures skipping ticks without stopping the engine
//! - Slow zero operations reported asynchronously
//!
//! Timing-sensitive, so they run one at a time.

mod common;

use common::{eventually, wait_for, SimulatedStationBuilder};
use loadframe_rs::device::{open_session, DeviceFamily, DeviceOptions};
use loadframe_rs::station::{DeviceCommand, Station, StationMessage};
use loadframe_rs::transport::{Motion, SimulatedLoadFrame};
use loadframe_rs::ConnectionStatus;
use serial_test::serial;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(5);

#[test]
#[serial]
fn test_attach_publishes_status_and_readings() {
    let (station, receiver, _handle) = SimulatedStationBuilder::new(DeviceFamily::H5k)
        .load_raw(3000)
        .build();
    assert_eq!(station.status(), ConnectionStatus::Connected);
    assert!(station.is_sampling());

    // The range is resolved before the first reading is published
    let messages = wait_for(&receiver, TIMEOUT, |m| matches!(m, StationMessage::Reading(_)));
    assert!(messages
        .iter()
        .any(|m| matches!(m, StationMessage::LoadCellRange(r) if *r == 5000.0)));

    let Some(StationMessage::Reading(reading)) = messages.last() else {
        panic!("expected a reading");
    };
    // 3000 / 30000 of a 5000 N cell
    common::assert_float_eq(reading.load, 500.0, 1e-9);
    assert!(!reading.recorded);
}

#[test]
#[serial]
fn test_collection_toggles_recording() {
    let (mut station, _receiver, _handle) =
        SimulatedStationBuilder::new(DeviceFamily::H5k).build();
    let data = station.data();

    std::thread::sleep(Duration::from_millis(50));
    assert!(data.is_empty());

    station.start_collecting();
    assert!(eventually(TIMEOUT, || data.len() >= 3));

    station.stop_collecting();
    std::thread::sleep(Duration::from_millis(30));
    let paused_at = data.len();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(data.len(), paused_at);

    assert!(station.toggle_collecting());
    assert!(eventually(TIMEOUT, || data.len() > paused_at));
}

#[test]
#[serial]
fn test_samples_are_time_ordered() {
    let (station, _receiver, _handle) = SimulatedStationBuilder::new(DeviceFamily::H5k)
        .collecting(true)
        .build();
    let data = station.data();
    assert!(eventually(TIMEOUT, || data.len() >= 10));

    let samples = station.snapshot();
    assert!(samples
        .windows(2)
        .all(|w| w[0].timestamp < w[1].timestamp));
}

#[test]
#[serial]
fn test_rate_change_applies_to_sleeping_engine() {
    // Start slow enough that the engine is asleep for a long time
    let (mut station, receiver, handle) = SimulatedStationBuilder::new(DeviceFamily::H5k)
        .rate_hz(0.05)
        .build();
    assert!(eventually(TIMEOUT, || handle.count("RL") == 1));

    let changed = Instant::now();
    station.set_sample_rate(50.0).unwrap();
    assert_eq!(station.interval(), Duration::from_millis(20));

    // The 20 s wait in progress is cut short
    assert!(eventually(TIMEOUT, || handle.count("RL") >= 3));
    assert!(changed.elapsed() < TIMEOUT);
    assert!(receiver
        .drain()
        .iter()
        .any(|m| matches!(m, StationMessage::RateChanged(d) if *d == Duration::from_millis(20))));
}

#[test]
#[serial]
fn test_rejected_rate_keeps_interval() {
    let (mut station, receiver, _handle) = SimulatedStationBuilder::new(DeviceFamily::H5k)
        .rate_hz(10.0)
        .build();
    receiver.drain();

    assert!(station.set_sample_rate(0.0).is_err());
    assert!(station.set_sample_rate_text("ten").is_err());
    assert!(station.set_sample_rate(-5.0).is_err());
    assert_eq!(station.interval(), Duration::from_millis(100));

    let rejected = receiver
        .drain()
        .into_iter()
        .filter(|m| matches!(m, StationMessage::RateRejected(_)))
        .count();
    assert_eq!(rejected, 3);
}

#[test]
#[serial]
fn test_read_errors_skip_ticks_and_keep_polling() {
    let (station, receiver, handle) = SimulatedStationBuilder::new(DeviceFamily::H5k)
        .collecting(true)
        .build();
    let data = station.data();
    assert!(eventually(TIMEOUT, || !data.is_empty()));

    handle.set_responsive(false);
    let messages = wait_for(&receiver, TIMEOUT, |m| matches!(m, StationMessage::ReadError(_)));
    assert!(matches!(messages.last(), Some(StationMessage::ReadError(_))));
    assert!(station.is_sampling());

    handle.set_responsive(true);
    let resumed_from = data.len();
    assert!(eventually(TIMEOUT, || data.len() > resumed_from));
}

#[test]
#[serial]
fn test_reconnect_tears_down_previous_engine() {
    let (mut station, receiver, first) = SimulatedStationBuilder::new(DeviceFamily::H5k).build();
    station.execute(DeviceCommand::MoveUp).unwrap();
    assert!(eventually(TIMEOUT, || first.count("RL") >= 2));

    let (device, second) = SimulatedStationBuilder::new(DeviceFamily::Series1000).build_device();
    station.attach("second", device).unwrap();

    // The first session was stopped and closed before the second started
    assert_eq!(first.motion(), Motion::Stopped);
    assert_eq!(first.commands().last().map(String::as_str), Some("WS"));
    let polls_after_close = first.count("RL");
    assert!(eventually(TIMEOUT, || second.count("R1") >= 2));
    assert_eq!(first.count("RL"), polls_after_close);

    assert_eq!(station.port_name(), Some("second"));
    let stopped = receiver
        .drain()
        .into_iter()
        .filter(|m| matches!(m, StationMessage::EngineStopped))
        .count();
    assert_eq!(stopped, 1);
}

#[test]
#[serial]
fn test_settings_survive_reconnect() {
    let (mut station, _receiver, _handle) = SimulatedStationBuilder::new(DeviceFamily::H5k)
        .rate_hz(4.0)
        .collecting(true)
        .build();
    station.disconnect();
    assert_eq!(station.status(), ConnectionStatus::Disconnected);
    assert!(!station.is_sampling());

    let (device, _second) = SimulatedStationBuilder::new(DeviceFamily::H5k).build_device();
    station.attach("again", device).unwrap();
    assert_eq!(station.interval(), Duration::from_millis(250));
    assert!(station.is_collecting());
}

#[test]
#[serial]
fn test_slow_zero_runs_off_the_control_thread() {
    let settle = Duration::from_millis(500);
    let simulator = SimulatedLoadFrame::new(DeviceFamily::Series1000);
    let handle = simulator.handle();
    let options = DeviceOptions {
        zero_settle: settle,
        ..DeviceOptions::default()
    };
    let device = open_session(DeviceFamily::Series1000, Box::new(simulator), &options);
    let (mut station, receiver) = Station::new(options);
    station.attach("simulator", device).unwrap();

    let started = Instant::now();
    station.execute(DeviceCommand::ZeroExtension).unwrap();
    assert!(started.elapsed() < settle);

    let messages = wait_for(&receiver, TIMEOUT, |m| {
        matches!(m, StationMessage::CommandCompleted(DeviceCommand::ZeroExtension))
    });
    assert!(matches!(
        messages.last(),
        Some(StationMessage::CommandCompleted(DeviceCommand::ZeroExtension))
    ));
    assert!(started.elapsed() >= settle);
    assert_eq!(handle.count("WE"), 1);
}

#[test]
#[serial]
fn test_stop_gets_through_during_zero_settle() {
    let settle = Duration::from_millis(1500);
    let simulator = SimulatedLoadFrame::new(DeviceFamily::Series1000);
    let handle = simulator.handle();
    let options = DeviceOptions {
        zero_settle: settle,
        ..DeviceOptions::default()
    };
    let device = open_session(DeviceFamily::Series1000, Box::new(simulator), &options);
    let (mut station, receiver) = Station::new(options);
    station.attach("simulator", device).unwrap();

    station.execute(DeviceCommand::MoveUp).unwrap();
    station.execute(DeviceCommand::ZeroLoad).unwrap();
    assert!(eventually(TIMEOUT, || handle.count("WZ") == 1));

    let started = Instant::now();
    station.execute(DeviceCommand::Stop).unwrap();
    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(handle.motion(), Motion::Stopped);

    // The zero still completes once the controller has settled
    let messages = wait_for(&receiver, TIMEOUT, |m| {
        matches!(m, StationMessage::CommandCompleted(DeviceCommand::ZeroLoad))
    });
    assert!(matches!(
        messages.last(),
        Some(StationMessage::CommandCompleted(DeviceCommand::ZeroLoad))
    ));
}

#[test]
#[serial]
fn test_failed_command_is_reported() {
    let (mut station, receiver, handle) = SimulatedStationBuilder::new(DeviceFamily::H5k).build();
    handle.set_responsive(false);
    assert!(station.execute(DeviceCommand::Stop).is_err());

    let messages = wait_for(&receiver, TIMEOUT, |m| {
        matches!(m, StationMessage::CommandFailed { .. })
    });
    assert!(matches!(
        messages.last(),
        Some(StationMessage::CommandFailed { command: DeviceCommand::Stop, .. })
    ));
}

#[test]
#[serial]
fn test_dropping_station_stops_everything() {
    let (mut station, _receiver, handle) = SimulatedStationBuilder::new(DeviceFamily::H5k).build();
    station.execute(DeviceCommand::MoveDown).unwrap();
    assert_eq!(handle.motion(), Motion::Down);

    drop(station);
    assert_eq!(handle.motion(), Motion::Stopped);
    let polls = handle.count("RL");
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(handle.count("RL"), polls);
}
