//! 1000-series controllers
//!
//! The 1000-series has no hardware zero: it always reports absolute values.
//! Zeroing sends the zero command, waits for the firmware to settle, reads
//! the now-valid absolute value and keeps it as a software offset that later
//! readings are corrected by.

use super::framing::FrameLink;
use super::{run_rate_command, CommandSet, DeviceFamily, LoadFrame};
use crate::error::{LoadFrameError, Result};
use crate::transport::Transport;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Raw load reading at full scale
pub const LOAD_DIVISOR: f64 = 2000.0;

#[derive(Debug, Default, Clone, Copy)]
struct ZeroState {
    load: f64,
    extension: f64,
    /// Zero operations between their command and their re-read
    settling: usize,
}

fn lock_state(state: &Mutex<ZeroState>) -> MutexGuard<'_, ZeroState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks a zero as settling until dropped
struct SettleGuard<'a> {
    state: &'a Mutex<ZeroState>,
}

impl<'a> SettleGuard<'a> {
    fn begin(state: &'a Mutex<ZeroState>) -> Self {
        lock_state(state).settling += 1;
        Self { state }
    }
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock_state(self.state);
        state.settling = state.settling.saturating_sub(1);
    }
}

/// A session with a 1000-series controller
pub struct Series1000LoadFrame {
    link: FrameLink,
    /// Readings check and apply this while the link lock is held, so a
    /// reading and its offset always belong together
    zero: Mutex<ZeroState>,
    settle: Duration,
}

impl Series1000LoadFrame {
    /// Build a session over an open transport, waiting `settle` after zero commands
    pub fn new(transport: Box<dyn Transport>, settle: Duration) -> Self {
        Self {
            link: FrameLink::new(transport, Self::commands().stop),
            zero: Mutex::new(ZeroState::default()),
            settle,
        }
    }

    fn commands() -> &'static CommandSet {
        DeviceFamily::Series1000.commands()
    }

    fn zero_state(&self) -> MutexGuard<'_, ZeroState> {
        lock_state(&self.zero)
    }

    /// Current software zero offsets (load, extension) in raw units
    pub fn zero_offsets(&self) -> (f64, f64) {
        let state = *self.zero_state();
        (state.load, state.extension)
    }

    /// Whether a zero is waiting for the controller to settle
    pub fn is_settling(&self) -> bool {
        self.zero_state().settling > 0
    }

    /// Read `command` and correct it by the offset `pick` selects
    ///
    /// Fails with [`LoadFrameError::Settling`] during a zero, since the
    /// controller's readings are not valid until it has settled.
    fn read_corrected(&self, command: &str, pick: impl FnOnce(&ZeroState) -> f64) -> Result<f64> {
        self.link.with_channel(|channel| {
            if self.is_settling() {
                return Err(LoadFrameError::Settling {
                    command: command.to_string(),
                });
            }
            let raw = channel.query_reading(command)?;
            Ok(raw - pick(&*self.zero_state()))
        })
    }

    /// Send `zero_command`, wait out the settle time, read the absolute
    /// value from `read_command` and store it with `store`
    ///
    /// The session lock is released during the settle so stop commands
    /// still get through; readings fail until the offset is stored.
    fn settle_and_record(
        &self,
        zero_command: &str,
        read_command: &str,
        store: impl FnOnce(&mut ZeroState, f64),
    ) -> Result<f64> {
        let settling = self.link.with_channel(|channel| {
            channel.command(zero_command)?;
            Ok(SettleGuard::begin(&self.zero))
        })?;

        tracing::info!(
            "Waiting {:?} for controller to settle after {}",
            self.settle,
            zero_command
        );
        std::thread::sleep(self.settle);

        self.link.with_channel(move |channel| {
            let offset = channel.query_reading(read_command)?;
            store(&mut *self.zero_state(), offset);
            drop(settling);
            Ok(offset)
        })
    }
}

impl LoadFrame for Series1000LoadFrame {
    fn family(&self) -> DeviceFamily {
        DeviceFamily::Series1000
    }

    fn read_load_cell_type(&self) -> Result<String> {
        self.link.query(Self::commands().read_load_cell_type)
    }

    fn read_load(&self) -> Result<f64> {
        let load = self.read_corrected(Self::commands().read_load, |zero| zero.load)?;
        Ok(load / LOAD_DIVISOR)
    }

    fn read_extension(&self) -> Result<f64> {
        self.read_corrected(Self::commands().read_extension, |zero| zero.extension)
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
        let commands = Self::commands();
        let offset = self.settle_and_record(commands.zero_load, commands.read_load, |o, v| {
            o.load = v
        })?;
        tracing::info!("Load zero offset set to {}", offset);
        Ok(())
    }

    fn zero_extension(&self) -> Result<()> {
        let commands = Self::commands();
        let offset = self.settle_and_record(
            commands.zero_extension,
            commands.read_extension,
            |o, v| o.extension = v,
        )?;
        tracing::info!("Extension zero offset set to {}", offset);
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.link.close()
    }

    fn is_connected(&self) -> bool {
        self.link.is_open()
    }

    fn describe(&self) -> String {
        match self.link.description() {
            Some(port) => format!("1000-series load frame on {}", port),
            None => "1000-series load frame (closed)".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Motion, SimulatedLoadFrame, SimulatorHandle};
    use std::time::Instant;

    const TEST_SETTLE: Duration = Duration::from_millis(20);

    fn simulated() -> (Series1000LoadFrame, SimulatorHandle) {
        let sim = SimulatedLoadFrame::new(DeviceFamily::Series1000);
        let handle = sim.handle();
        (Series1000LoadFrame::new(Box::new(sim), TEST_SETTLE), handle)
    }

    #[test]
    fn test_read_load_subtracts_offset() {
        let (frame, handle) = simulated();
        handle.set_load_raw(100);
        frame.zero_load().unwrap();
        assert_eq!(frame.zero_offsets().0, 100.0);

        handle.set_load_raw(500);
        let range = frame.get_load_cell_range().unwrap();
        assert_eq!(range, 1000.0);
        assert_eq!(frame.read_load().unwrap() * range, 200.0);
    }

    #[test]
    fn test_zero_waits_for_settle_then_reads() {
        let (frame, handle) = simulated();
        handle.set_extension_raw(42);

        let started = Instant::now();
        frame.zero_extension().unwrap();
        assert!(started.elapsed() >= TEST_SETTLE);

        assert_eq!(handle.commands(), vec!["WE", "R2"]);
        handle.set_extension_raw(50);
        assert_eq!(frame.read_extension().unwrap(), 8.0);
        assert!(frame.zero_is_slow());
    }

    #[test]
    fn test_zero_load_wire_sequence() {
        let (frame, handle) = simulated();
        frame.zero_load().unwrap();
        assert_eq!(handle.commands(), vec!["WZ", "R1"]);
    }

    #[test]
    fn test_failed_zero_keeps_previous_offset() {
        let (frame, handle) = simulated();
        handle.set_load_raw(100);
        frame.zero_load().unwrap();

        handle.set_responsive(false);
        assert!(frame.zero_load().is_err());
        assert_eq!(frame.zero_offsets().0, 100.0);
    }

    /// Start a zero with a long settle on another thread and wait for its command
    fn zero_in_background(
        settle: Duration,
    ) -> (
        std::sync::Arc<Series1000LoadFrame>,
        SimulatorHandle,
        std::thread::JoinHandle<Result<()>>,
    ) {
        let sim = SimulatedLoadFrame::new(DeviceFamily::Series1000);
        let handle = sim.handle();
        let frame = std::sync::Arc::new(Series1000LoadFrame::new(Box::new(sim), settle));
        let zeroing = {
            let frame = std::sync::Arc::clone(&frame);
            std::thread::spawn(move || frame.zero_load())
        };
        let deadline = Instant::now() + Duration::from_secs(5);
        while !frame.is_settling() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(frame.is_settling());
        (frame, handle, zeroing)
    }

    #[test]
    fn test_stop_is_not_held_up_by_settle() {
        let (frame, handle, zeroing) = zero_in_background(Duration::from_millis(400));

        let started = Instant::now();
        frame.stop_moving().unwrap();
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(handle.commands(), vec!["WZ", "WS"]);

        zeroing.join().unwrap().unwrap();
        assert!(!frame.is_settling());
    }

    #[test]
    fn test_readings_fail_while_settling() {
        let (frame, handle, zeroing) = zero_in_background(Duration::from_millis(300));
        handle.set_load_raw(80);

        assert!(matches!(
            frame.read_load(),
            Err(LoadFrameError::Settling { .. })
        ));
        assert!(matches!(
            frame.read_extension(),
            Err(LoadFrameError::Settling { .. })
        ));
        // Nothing was read from the controller mid-zero
        assert_eq!(handle.count("R1"), 0);

        zeroing.join().unwrap().unwrap();
        assert_eq!(frame.zero_offsets().0, 80.0);
        assert_eq!(frame.read_load().unwrap(), 0.0);
    }

    #[test]
    fn test_disconnect_during_settle_fails_the_zero() {
        let (frame, handle, zeroing) = zero_in_background(Duration::from_millis(200));

        frame.disconnect().unwrap();
        assert_eq!(handle.commands().last().map(String::as_str), Some("WS"));

        assert!(matches!(
            zeroing.join().unwrap(),
            Err(LoadFrameError::NotConnected)
        ));
        assert!(!frame.is_settling());
    }

    #[test]
    fn test_run_rate_and_stop_on_disconnect() {
        let (frame, handle) = simulated();
        frame.set_run_rate(0.5).unwrap();
        frame.start_moving_up().unwrap();
        frame.disconnect().unwrap();
        assert_eq!(handle.run_rate(), Some(0.5));
        assert_eq!(handle.motion(), Motion::Stopped);
        assert_eq!(handle.commands().last().map(String::as_str), Some("WS"));
    }
}
