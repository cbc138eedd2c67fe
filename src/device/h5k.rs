//! H5K-series controllers
//!
//! The H5K reports load as a signed decimal where 30000 is full scale of the
//! fitted cell, and extension in micrometres. Zeroing happens in firmware.

use super::framing::FrameLink;
use super::{run_rate_command, CommandSet, DeviceFamily, LoadFrame};
use crate::error::Result;
use crate::transport::Transport;

/// Raw load reading at full scale (empirical, not a power of two)
pub const LOAD_DIVISOR: f64 = 30000.0;

/// Millimeters per raw extension unit
pub const EXTENSION_SCALE: f64 = 0.001;

/// A session with an H5K-series controller
pub struct H5kLoadFrame {
    link: FrameLink,
}

impl H5kLoadFrame {
    /// Build a session over an open transport
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            link: FrameLink::new(transport, Self::commands().stop),
        }
    }

    fn commands() -> &'static CommandSet {
        DeviceFamily::H5k.commands()
    }
}

impl LoadFrame for H5kLoadFrame {
    fn family(&self) -> DeviceFamily {
        DeviceFamily::H5k
    }

    fn read_load_cell_type(&self) -> Result<String> {
        self.link.query(Self::commands().read_load_cell_type)
    }

    fn read_load(&self) -> Result<f64> {
        let raw = self.link.query_reading(Self::commands().read_load)?;
        Ok(raw / LOAD_DIVISOR)
    }

    fn read_extension(&self) -> Result<f64> {
        let raw = self.link.query_reading(Self::commands().read_extension)?;
        Ok(raw * EXTENSION_SCALE)
    }

    fn set_run_rate(&self, rate: f64) -> Result<()> {
        let command = run_rate_command(Self::commands(), rate)?;
        tracing::debug!("Setting run rate to {:.1}", rate);
        self.link.command(&command)
    }

    fn start_moving_up(&self) -> Result<()> {
        self.link.command(Self::commands().move_up)
    }

    fn start_moving_down(&self) -> Result<()> {
        self.link.command(Self::commands().move_down)
    }

    fn stop_moving(&self) -> Result<()> {
        self.link.command(Self::commands().stop)
    }

    fn zero_load(&self) -> Result<()> {
        self.link.command(Self::commands().zero_load)
    }

    fn zero_extension(&self) -> Result<()> {
        self.link.command(Self::commands().zero_extension)
    }

    fn disconnect(&self) -> Result<()> {
        self.link.close()
    }

    fn is_connected(&self) -> bool {
        self.link.is_open()
    }

    fn describe(&self) -> String {
        match self.link.description() {
            Some(port) => format!("H5K load frame on {}", port),
            None => "H5K load frame (closed)".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadFrameError;
    use crate::transport::{Motion, SimulatedLoadFrame, SimulatorHandle};

    fn simulated() -> (H5kLoadFrame, SimulatorHandle) {
        let sim = SimulatedLoadFrame::new(DeviceFamily::H5k);
        let handle = sim.handle();
        (H5kLoadFrame::new(Box::new(sim)), handle)
    }

    #[test]
    fn test_read_load_scales_to_full_range() {
        let (frame, handle) = simulated();
        handle.set_load_raw(15000);
        handle.set_load_cell_code("9");

        let range = frame.get_load_cell_range().unwrap();
        let load = frame.read_load().unwrap() * range;
        assert_eq!(range, 5000.0);
        assert_eq!(load, 2500.0);
    }

    #[test]
    fn test_read_extension_in_mm() {
        let (frame, handle) = simulated();
        handle.set_extension_raw(1500);
        assert!((frame.read_extension().unwrap() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_load_cell() {
        let (frame, handle) = simulated();
        handle.set_load_cell_code("999");
        assert!(matches!(
            frame.get_load_cell_range(),
            Err(LoadFrameError::RangeLookup { .. })
        ));
    }

    #[test]
    fn test_motion_commands() {
        let (frame, handle) = simulated();
        frame.set_run_rate(2.0).unwrap();
        frame.start_moving_up().unwrap();
        assert_eq!(handle.motion(), Motion::Up);
        frame.start_moving_down().unwrap();
        assert_eq!(handle.motion(), Motion::Down);
        frame.stop_moving().unwrap();
        assert_eq!(handle.motion(), Motion::Stopped);
        assert_eq!(handle.commands(), vec!["WV2.0", "WF", "WR", "WS"]);
    }

    #[test]
    fn test_zero_is_single_command() {
        let (frame, handle) = simulated();
        handle.set_load_raw(600);
        frame.zero_load().unwrap();
        frame.zero_extension().unwrap();
        assert_eq!(frame.read_load().unwrap(), 0.0);
        assert_eq!(handle.commands(), vec!["WZ", "WP", "RL"]);
        assert!(!frame.zero_is_slow());
    }

    #[test]
    fn test_timeout_surfaces() {
        let (frame, handle) = simulated();
        handle.set_responsive(false);
        assert!(frame.read_load().unwrap_err().is_timeout());
    }

    #[test]
    fn test_disconnect_stops_before_closing() {
        let (frame, handle) = simulated();
        frame.start_moving_up().unwrap();
        frame.disconnect().unwrap();
        assert_eq!(handle.motion(), Motion::Stopped);
        assert!(!frame.is_connected());
        assert!(matches!(
            frame.read_load(),
            Err(LoadFrameError::NotConnected)
        ));
    }

    #[test]
    fn test_drop_stops_crosshead() {
        let (frame, handle) = simulated();
        frame.start_moving_down().unwrap();
        drop(frame);
        assert_eq!(handle.motion(), Motion::Stopped);
        assert_eq!(handle.count("WS"), 1);
    }
}
