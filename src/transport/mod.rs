//! Byte-level transports to the load frame controller
//!
//! The device layer only needs a duplex byte channel whose reads give up
//! after a bounded timeout. [`Transport`] captures exactly that, so the same
//! framing and device code runs over a real RS232 port or the in-process
//! simulator.
//!
//! # Components
//!
//! - [`SerialTransport`] - RS232 / USB-serial port via the `serialport` crate
//! - [`SimulatedLoadFrame`] - in-process controller speaking both command dialects

pub mod serial;
pub mod simulator;

pub use serial::SerialTransport;
pub use simulator::{Motion, SimulatedLoadFrame, SimulatorHandle};

use crate::error::Result;

/// Duplex byte channel with bounded-timeout reads
///
/// Implementations must be `Send` so a session can be shared between the
/// control thread and the sampling engine thread.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send {
    /// Write every byte of `bytes`, flushing any output buffering
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read a single byte
    ///
    /// Returns `Ok(None)` when the read times out or returns no data.
    fn read_byte(&mut self) -> Result<Option<u8>>;

    /// Drop any bytes received but not yet read
    fn discard_input(&mut self) -> Result<()>;

    /// Human readable name of the underlying channel (port name, etc.)
    fn description(&self) -> String;
}
