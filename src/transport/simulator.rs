//! Simulated load frame controller
//!
//! An in-process stand-in for a controller's RS232 command module, used by
//! tests and by `loadframe --simulate` when no hardware is attached. It
//! parses CR-terminated commands written to it and queues the responses the
//! selected family would send.
//!
//! # Behaviour
//!
//! - Readings are raw decimal integers, the same as the firmware sends
//! - Motion commands move the crosshead one step per extension read
//! - H5K zero commands zero the reported value in "firmware"; the 1000-series
//!   acknowledges them but keeps reporting absolute values
//! - An unresponsive simulator swallows commands so reads time out
//!
//! # Example
//!
//! ```ignore
//! use loadframe_rs::device::{open_session, DeviceFamily, DeviceOptions};
//! use loadframe_rs::transport::SimulatedLoadFrame;
//!
//! let simulator = SimulatedLoadFrame::new(DeviceFamily::H5k);
//! let handle = simulator.handle();
//! handle.set_load_raw(15000);
//!
//! let device = open_session(DeviceFamily::H5k, Box::new(simulator), &DeviceOptions::default());
//! assert_eq!(device.read_load()?, 0.5);
//! ```

use super::Transport;
use crate::device::DeviceFamily;
use crate::error::Result;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Crosshead travel per extension read while moving, in raw units
const DEFAULT_TRAVEL_STEP: i64 = 10;

/// Load change per extension read while moving, in raw units
const DEFAULT_LOAD_STEP: i64 = 25;

/// Crosshead motion state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Motion {
    #[default]
    Stopped,
    Up,
    Down,
}

#[derive(Debug)]
struct SimulatorState {
    family: DeviceFamily,
    load_raw: i64,
    extension_raw: i64,
    load_zero: i64,
    extension_zero: i64,
    load_cell_code: String,
    motion: Motion,
    run_rate: Option<f64>,
    responsive: bool,
    travel_step: i64,
    load_step: i64,
    commands: Vec<String>,
}

impl SimulatorState {
    fn new(family: DeviceFamily) -> Self {
        let load_cell_code = match family {
            DeviceFamily::H5k => "9",
            DeviceFamily::Series1000 => "2",
        };
        Self {
            family,
            load_raw: 0,
            extension_raw: 0,
            load_zero: 0,
            extension_zero: 0,
            load_cell_code: load_cell_code.to_string(),
            motion: Motion::Stopped,
            run_rate: None,
            responsive: true,
            travel_step: DEFAULT_TRAVEL_STEP,
            load_step: DEFAULT_LOAD_STEP,
            commands: Vec::new(),
        }
    }

    fn advance(&mut self) {
        match self.motion {
            Motion::Stopped => {}
            Motion::Up => {
                self.extension_raw += self.travel_step;
                self.load_raw += self.load_step;
            }
            Motion::Down => {
                self.extension_raw -= self.travel_step;
                self.load_raw -= self.load_step;
            }
        }
    }

    /// Execute one command, returning the response text (without terminator)
    fn execute(&mut self, command: &str) -> String {
        let commands = self.family.commands();
        if command == commands.read_extension {
            let value = self.extension_raw - self.extension_zero;
            self.advance();
            value.to_string()
        } else if command == commands.read_load {
            (self.load_raw - self.load_zero).to_string()
        } else if command == commands.read_load_cell_type {
            self.load_cell_code.clone()
        } else if let Some(rate) = command.strip_prefix(commands.set_run_rate) {
            self.run_rate = rate.parse().ok();
            String::new()
        } else if command == commands.move_up {
            self.motion = Motion::Up;
            String::new()
        } else if command == commands.move_down {
            self.motion = Motion::Down;
            String::new()
        } else if command == commands.stop {
            self.motion = Motion::Stopped;
            String::new()
        } else if command == commands.zero_load {
            if self.family == DeviceFamily::H5k {
                self.load_zero = self.load_raw;
            }
            String::new()
        } else if command == commands.zero_extension {
            if self.family == DeviceFamily::H5k {
                self.extension_zero = self.extension_raw;
            }
            String::new()
        } else {
            tracing::debug!("Simulator ignoring unknown command {:?}", command);
            String::new()
        }
    }
}

/// Shared view of a simulator's state, kept by tests after the simulator
/// itself has been handed to a session
#[derive(Debug, Clone)]
pub struct SimulatorHandle {
    state: Arc<Mutex<SimulatorState>>,
}

impl SimulatorHandle {
    fn lock(&self) -> MutexGuard<'_, SimulatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the absolute raw load reading
    pub fn set_load_raw(&self, raw: i64) {
        self.lock().load_raw = raw;
    }

    /// Set the absolute raw extension reading
    pub fn set_extension_raw(&self, raw: i64) {
        self.lock().extension_raw = raw;
    }

    /// Set the load cell type code reported for `RC`
    pub fn set_load_cell_code(&self, code: impl Into<String>) {
        self.lock().load_cell_code = code.into();
    }

    /// Stop (or resume) answering commands
    pub fn set_responsive(&self, responsive: bool) {
        self.lock().responsive = responsive;
    }

    /// Set the per-read travel and load change while moving
    pub fn set_motion_steps(&self, travel_step: i64, load_step: i64) {
        let mut state = self.lock();
        state.travel_step = travel_step;
        state.load_step = load_step;
    }

    /// Put the crosshead in motion without a command
    pub fn set_motion(&self, motion: Motion) {
        self.lock().motion = motion;
    }

    /// Current crosshead motion
    pub fn motion(&self) -> Motion {
        self.lock().motion
    }

    /// Last run rate received, if any
    pub fn run_rate(&self) -> Option<f64> {
        self.lock().run_rate
    }

    /// Every command received so far, without terminators
    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    /// Number of times `command` has been received
    pub fn count(&self, command: &str) -> usize {
        self.lock().commands.iter().filter(|c| *c == command).count()
    }
}

/// Transport end of a simulated controller
pub struct SimulatedLoadFrame {
    state: Arc<Mutex<SimulatorState>>,
    pending: Vec<u8>,
    output: VecDeque<u8>,
}

impl SimulatedLoadFrame {
    /// Create a simulator for `family` with zeroed readings
    pub fn new(family: DeviceFamily) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimulatorState::new(family))),
            pending: Vec::new(),
            output: VecDeque::new(),
        }
    }

    /// Get a handle for inspecting and driving the simulator
    pub fn handle(&self) -> SimulatorHandle {
        SimulatorHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Transport for SimulatedLoadFrame {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        for &byte in bytes {
            if byte != b'\r' {
                self.pending.push(byte);
                continue;
            }

            let command = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();

            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.commands.push(command.clone());
            if !state.responsive {
                continue;
            }
            let response = state.execute(&command);
            self.output.extend(response.bytes());
            self.output.push_back(b'\r');
        }
        Ok(())
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        Ok(self.output.pop_front())
    }

    fn discard_input(&mut self) -> Result<()> {
        self.output.clear();
        Ok(())
    }

    fn description(&self) -> String {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        format!("simulated {} controller", state.family)
    }
}
