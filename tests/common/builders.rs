//! Test builders for simulated stations

use loadframe_rs::device::{open_session, DeviceFamily, DeviceOptions, LoadFrame};
use loadframe_rs::station::{Station, StationReceiver};
use loadframe_rs::transport::{SimulatedLoadFrame, SimulatorHandle};
use std::sync::Arc;
use std::time::Duration;

/// Builder for a station attached to a simulated controller
pub struct SimulatedStationBuilder {
    family: DeviceFamily,
    rate_hz: f64,
    collecting: bool,
    load_raw: i64,
    load_cell_code: Option<String>,
}

impl SimulatedStationBuilder {
    pub fn new(family: DeviceFamily) -> Self {
        Self {
            family,
            rate_hz: 100.0,
            collecting: false,
            load_raw: 0,
            load_cell_code: None,
        }
    }

    pub fn rate_hz(mut self, rate_hz: f64) -> Self {
        self.rate_hz = rate_hz;
        self
    }

    pub fn collecting(mut self, collecting: bool) -> Self {
        self.collecting = collecting;
        self
    }

    pub fn load_raw(mut self, load_raw: i64) -> Self {
        self.load_raw = load_raw;
        self
    }

    pub fn load_cell_code(mut self, code: &str) -> Self {
        self.load_cell_code = Some(code.to_string());
        self
    }

    /// Options with a short settle delay
    pub fn options() -> DeviceOptions {
        DeviceOptions {
            read_timeout: Duration::from_millis(100),
            zero_settle: super::test_settle(),
        }
    }

    /// Open a session without a station
    pub fn build_device(&self) -> (Arc<dyn LoadFrame>, SimulatorHandle) {
        let simulator = SimulatedLoadFrame::new(self.family);
        let handle = simulator.handle();
        handle.set_load_raw(self.load_raw);
        if let Some(code) = &self.load_cell_code {
            handle.set_load_cell_code(code.as_str());
        }
        (open_session(self.family, Box::new(simulator), &Self::options()), handle)
    }

    /// Build a station and attach the simulated session
    pub fn build(self) -> (Station, StationReceiver, SimulatorHandle) {
        let (device, handle) = self.build_device();
        let (mut station, receiver) = Station::new(Self::options());
        station.set_sample_rate(self.rate_hz).unwrap();
        if self.collecting {
            station.start_collecting();
        }
        station.attach("simulator", device).unwrap();
        (station, receiver, handle)
    }
}
