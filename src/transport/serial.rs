//! RS232 transport over the `serialport` crate

use super::Transport;
use crate::error::{LoadFrameError, Result};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// A serial port opened at a controller family's baud rate
///
/// The port is closed when the transport is dropped.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    port_name: String,
    baud_rate: u32,
}

impl SerialTransport {
    /// Open `port_name` at `baud_rate` (8N1) with the given read timeout
    pub fn open(port_name: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(read_timeout)
            .open()
            .map_err(|source| LoadFrameError::Connection {
                port: port_name.to_string(),
                source,
            })?;

        // Drop anything the controller sent before we were listening
        if let Err(e) = port.clear(serialport::ClearBuffer::All) {
            tracing::warn!("Failed to clear buffers on {}: {}", port_name, e);
        }

        tracing::debug!("Serial port '{}' opened at {} baud", port_name, baud_rate);

        Ok(Self {
            port,
            port_name: port_name.to_string(),
            baud_rate,
        })
    }

    /// Baud rate the port was opened with
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut buffer = [0u8; 1];
        match self.port.read(&mut buffer) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buffer[0])),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn discard_input(&mut self) -> Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(std::io::Error::from)?;
        Ok(())
    }

    fn description(&self) -> String {
        format!("{} @ {} baud", self.port_name, self.baud_rate)
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        tracing::debug!("Serial port '{}' closed", self.port_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_port_is_connection_error() {
        let result = SerialTransport::open(
            "/dev/loadframe-rs-does-not-exist",
            19200,
            Duration::from_millis(10),
        );
        match result {
            Err(LoadFrameError::Connection { port, .. }) => {
                assert_eq!(port, "/dev/loadframe-rs-does-not-exist");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opening a missing port should fail"),
        }
    }
}
