//! Core data types for loadframe-rs
//!
//! # Main Types
//!
//! - [`Sample`] - A single timestamped load/extension pair captured during a run
//! - [`Reading`] - A live load/extension pair published for display
//! - [`ConnectionStatus`] - State of the link to the load frame controller

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single sample captured by the sampling engine
///
/// The timestamp is monotonic time since the engine started polling, so
/// samples in a run buffer are ordered by both insertion and time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Time since polling started
    pub timestamp: Duration,
    /// Load in Newtons
    pub load: f64,
    /// Extension in millimeters
    pub extension: f64,
}

impl Sample {
    /// Create a new sample
    pub fn new(timestamp: Duration, load: f64, extension: f64) -> Self {
        Self {
            timestamp,
            load,
            extension,
        }
    }

    /// Timestamp in seconds, as written to exports and plotted
    pub fn seconds(&self) -> f64 {
        self.timestamp.as_secs_f64()
    }
}

/// A live reading published to the display on every poll tick,
/// whether or not it is being recorded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Time since polling started
    pub timestamp: Duration,
    /// Load in Newtons
    pub load: f64,
    /// Extension in millimeters
    pub extension: f64,
    /// Whether this reading was appended to the run buffer
    pub recorded: bool,
}

impl From<Reading> for Sample {
    fn from(reading: Reading) -> Self {
        Sample::new(reading.timestamp, reading.load, reading.extension)
    }
}

/// Connection status to the load frame controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// No session open
    #[default]
    Disconnected,
    /// Opening the port and querying the load cell
    Connecting,
    /// Session open and polling
    Connected,
    /// Connection attempt failed
    Error,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connecting => write!(f, "Connecting..."),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Error => write!(f, "Error"),
        }
    }
}
