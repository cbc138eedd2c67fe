//! Error handling for loadframe-rs
//!
//! This module defines the error taxonomy for talking to a load frame and
//! running an acquisition, plus a Result alias for use throughout the crate.

use crate::device::DeviceFamily;
use thiserror::Error;

/// Main error type for load frame operations
#[derive(Error, Debug)]
pub enum LoadFrameError {
    /// The serial port could not be opened
    #[error("Failed to open serial port '{port}': {source}")]
    Connection {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// A framed read produced no terminator before the transport timed out
    #[error("Timed out waiting for a response to '{command}'")]
    CommunicationTimeout { command: String },

    /// The controller reported a load cell code missing from the range table
    #[error("Unknown load cell type code '{code}' reported by {family} controller")]
    RangeLookup { family: DeviceFamily, code: String },

    /// A sampling or run rate that is not a positive finite number
    #[error("Invalid rate: {0}")]
    InvalidRateInput(String),

    /// The controller answered with something that is not a reading
    #[error("Invalid response to '{command}': {response:?}")]
    InvalidResponse { command: String, response: String },

    /// A reading was requested while a zero is still settling
    #[error("Controller is settling after a zero; '{command}' not sent")]
    Settling { command: String },

    /// An operation needed an open session but none exists
    #[error("Not connected to a load frame")]
    NotConnected,

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to writing run data out
    #[error("Export error: {0}")]
    Export(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<LoadFrameError>,
    },
}

impl LoadFrameError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        LoadFrameError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True when the error means the controller stopped answering
    pub fn is_timeout(&self) -> bool {
        match self {
            LoadFrameError::CommunicationTimeout { .. } => true,
            LoadFrameError::WithContext { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

/// Result type alias for load frame operations
pub type Result<T> = std::result::Result<T, LoadFrameError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
