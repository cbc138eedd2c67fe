//! CR-terminated request/response framing
//!
//! Every exchange with a controller is a command followed by a carriage
//! return, answered by zero or more bytes and a carriage return (a null byte
//! also ends a frame). Commands that only acknowledge with the terminator
//! are followed by a purge.
//!
//! There are no correlation IDs, so a write must be followed by its read
//! before anything else touches the port. [`FrameLink`] owns the session
//! lock that enforces this across threads.

use crate::error::{LoadFrameError, Result};
use crate::transport::Transport;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Frame terminator (ASCII CR)
pub const TERMINATOR: u8 = b'\r';

/// A null byte also terminates a frame
pub const NULL_TERMINATOR: u8 = 0;

/// Upper bound on a single response; anything longer is line noise
const MAX_FRAME_LEN: usize = 256;

/// Bytes skipped looking for the end of an oversized frame before giving up
const MAX_DRAIN_LEN: usize = 4096;

/// A transport wrapped with command/response framing
///
/// After a failed exchange (timeout or oversized reply) the reply may still
/// be arriving, so pending input is discarded before the next command is
/// sent. Otherwise a late reply would be read as the answer to the next
/// command.
pub struct FramedChannel {
    transport: Box<dyn Transport>,
    last_command: String,
    needs_resync: bool,
}

impl FramedChannel {
    /// Wrap a transport
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            last_command: String::new(),
            needs_resync: false,
        }
    }

    /// Write `command` followed by the terminator
    pub fn send(&mut self, command: &str) -> Result<()> {
        if self.needs_resync {
            tracing::debug!("Discarding pending input after failed {:?}", self.last_command);
            self.transport.discard_input()?;
            self.needs_resync = false;
        }

        let mut frame = Vec::with_capacity(command.len() + 1);
        frame.extend_from_slice(command.as_bytes());
        frame.push(TERMINATOR);

        tracing::trace!("-> {:?}", command);
        self.last_command = command.to_string();
        self.transport.write_all(&frame)
    }

    /// Read bytes until a terminator, returning them without it
    ///
    /// A timeout before the terminator is a [`LoadFrameError::CommunicationTimeout`],
    /// never an empty response.
    pub fn read_frame(&mut self) -> Result<Vec<u8>> {
        let mut frame = Vec::new();
        loop {
            match self.transport.read_byte()? {
                None => {
                    tracing::warn!(
                        "Timed out after {} bytes waiting for reply to {:?}",
                        frame.len(),
                        self.last_command
                    );
                    self.needs_resync = true;
                    return Err(LoadFrameError::CommunicationTimeout {
                        command: self.last_command.clone(),
                    });
                }
                Some(TERMINATOR) | Some(NULL_TERMINATOR) => break,
                Some(byte) => {
                    if frame.len() >= MAX_FRAME_LEN {
                        self.skip_rest_of_frame()?;
                        return Err(LoadFrameError::InvalidResponse {
                            command: self.last_command.clone(),
                            response: String::from_utf8_lossy(&frame).into_owned(),
                        });
                    }
                    frame.push(byte);
                }
            }
        }
        tracing::trace!("<- {:?}", String::from_utf8_lossy(&frame));
        Ok(frame)
    }

    /// Consume the remainder of an oversized frame
    fn skip_rest_of_frame(&mut self) -> Result<()> {
        self.needs_resync = true;
        for _ in 0..MAX_DRAIN_LEN {
            match self.transport.read_byte()? {
                None | Some(TERMINATOR) | Some(NULL_TERMINATOR) => return Ok(()),
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Read and discard one frame
    pub fn purge(&mut self) -> Result<()> {
        self.read_frame().map(drop)
    }

    /// Send a command that is acknowledged by the terminator alone
    pub fn command(&mut self, command: &str) -> Result<()> {
        self.send(command)?;
        self.purge()
    }

    /// Send a command and return its response as text
    pub fn query(&mut self, command: &str) -> Result<String> {
        self.send(command)?;
        let frame = self.read_frame()?;
        String::from_utf8(frame)
            .map(|text| text.trim().to_string())
            .map_err(|e| LoadFrameError::InvalidResponse {
                command: command.to_string(),
                response: String::from_utf8_lossy(e.as_bytes()).into_owned(),
            })
    }

    /// Send a command and parse its response as a decimal reading
    pub fn query_reading(&mut self, command: &str) -> Result<f64> {
        let text = self.query(command)?;
        parse_reading(command, &text)
    }

    /// Description of the underlying transport
    pub fn description(&self) -> String {
        self.transport.description()
    }
}

/// Parse the decimal text a controller returns for a reading
pub fn parse_reading(command: &str, text: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| LoadFrameError::InvalidResponse {
            command: command.to_string(),
            response: text.to_string(),
        })
}

/// A framed channel behind the session lock
///
/// All exchanges go through here so that the poll loop and one-shot
/// commands never interleave bytes. The channel is dropped (closing the
/// transport) by [`FrameLink::close`], after sending the stop command.
pub struct FrameLink {
    channel: Mutex<Option<FramedChannel>>,
    stop_command: &'static str,
}

impl FrameLink {
    /// Put `transport` behind a session lock; `stop_command` is sent on close
    pub fn new(transport: Box<dyn Transport>, stop_command: &'static str) -> Self {
        Self {
            channel: Mutex::new(Some(FramedChannel::new(transport))),
            stop_command,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<FramedChannel>> {
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a multi-step exchange while holding the session lock
    pub fn with_channel<T>(&self, f: impl FnOnce(&mut FramedChannel) -> Result<T>) -> Result<T> {
        let mut guard = self.lock();
        let channel = guard.as_mut().ok_or(LoadFrameError::NotConnected)?;
        f(channel)
    }

    /// Send a command acknowledged by the terminator alone
    pub fn command(&self, command: &str) -> Result<()> {
        self.with_channel(|channel| channel.command(command))
    }

    /// Send a command and return its text response
    pub fn query(&self, command: &str) -> Result<String> {
        self.with_channel(|channel| channel.query(command))
    }

    /// Send a command and parse its decimal response
    pub fn query_reading(&self, command: &str) -> Result<f64> {
        self.with_channel(|channel| channel.query_reading(command))
    }

    /// Whether the transport is still open
    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Description of the underlying transport, if open
    pub fn description(&self) -> Option<String> {
        self.lock().as_ref().map(FramedChannel::description)
    }

    /// Stop the crosshead and close the transport
    ///
    /// The transport is closed even if the stop command fails; the stop
    /// error is still returned. Closing an already closed link is a no-op.
    pub fn close(&self) -> Result<()> {
        let Some(mut channel) = self.lock().take() else {
            return Ok(());
        };
        let result = channel.command(self.stop_command);
        tracing::info!("Closing {}", channel.description());
        drop(channel);
        result
    }
}

impl Drop for FrameLink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to stop load frame while closing: {}", e);
        }
    }
}
