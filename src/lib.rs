//! # loadframe-rs: Tinius Olsen load frame control
//!
//! Drives tensile/compression testers through their RS232 command module and
//! samples load and extension live while the operator reconfigures the run.
//!
//! ## Architecture
//!
//! - **Transport**: Serial byte stream (`serialport`) or an in-process simulator
//! - **Device**: Framed CR-terminated exchanges behind a session lock, one
//!   [`device::LoadFrame`] implementation per controller family
//! - **Station**: Owns the session and a sampling engine thread; one-shot
//!   commands and rate changes go through it
//! - **Run data**: Lock-protected sample buffer, snapshotted for export
//! - **Communication**: Crossbeam channel carrying [`station::StationMessage`]s
//! - **Shutdown**: SIGINT/SIGTERM raise a flag so the session still closes cleanly
//!
//! ## Configuration
//!
//! Configuration and state are stored in the platform-appropriate data
//! directory under `edu.bucknell.TOControl`:
//!
//! - **Linux**: `~/.local/share/edu.bucknell.TOControl/`
//! - **macOS**: `~/Library/Application Support/edu.bucknell.TOControl/`
//! - **Windows**: `%APPDATA%\edu.bucknell.TOControl\`
//!
//! ## Example
//!
//! ```ignore
//! use loadframe_rs::{
//!     config::AppConfig,
//!     station::{Station, StationMessage},
//! };
//!
//! let config = AppConfig::load_or_default(None);
//! let (mut station, receiver) = Station::new(config.device.options()?);
//!
//! station.connect("/dev/ttyUSB0", config.device.family)?;
//! station.set_sample_rate(config.sampling.sample_rate_hz)?;
//! station.start_collecting();
//!
//! while let Some(msg) = receiver.recv_timeout(std::time::Duration::from_secs(1)) {
//!     if let StationMessage::Reading(reading) = msg {
//!         println!("{:.2} N, {:.3} mm", reading.load, reading.extension);
//!     }
//! }
//!
//! station.export_csv("run.csv".as_ref())?;
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod run;
pub mod shutdown;
pub mod station;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use config::{AppConfig, AppState};
pub use device::{DeviceFamily, DeviceOptions, LoadFrame};
pub use error::{LoadFrameError, Result};
pub use run::RunData;
pub use station::{DeviceCommand, Station, StationMessage, StationReceiver};
pub use types::{ConnectionStatus, Reading, Sample};
