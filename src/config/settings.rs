//! Station configuration
//!
//! Everything here is read from `loadframe.toml` (or a file named on the
//! command line). Every field has a default, so a partial file, or none at
//! all, is valid.
//!
//! # Main Types
//!
//! - [`AppConfig`] - Whole configuration file
//! - [`DeviceConfig`] - Serial port, controller family and protocol timing
//! - [`SamplingConfig`] - Initial sample rate and whether to record at start
//! - [`LoggingConfig`] - Log filter and optional log file
//! - [`ExportConfig`] - Where exported runs go
//!
//! # Example file
//!
//! ```toml
//! [device]
//! port = "/dev/ttyUSB0"
//! family = "1000"
//! zero_settle_secs = 15.0
//!
//! [sampling]
//! sample_rate_hz = 10.0
//!
//! [logging]
//! log_to_file = true
//! ```

use crate::device::{DeviceFamily, DeviceOptions, DEFAULT_READ_TIMEOUT, DEFAULT_ZERO_SETTLE};
use crate::error::{LoadFrameError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default sample rate in Hz
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 2.0;

/// Default tracing filter
pub const DEFAULT_LOG_FILTER: &str = "info,loadframe_rs=debug";

/// Default log file name
pub const DEFAULT_LOG_FILE: &str = "tinius_olsen.log";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub sampling: SamplingConfig,
    pub logging: LoggingConfig,
    pub export: ExportConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LoadFrameError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            LoadFrameError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Load from `path`, or the default location when `None`
    ///
    /// A missing default file gives the defaults. Errors are logged and
    /// also give the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match super::config_path() {
                Some(path) if path.exists() => path,
                _ => return Self::default(),
            },
        };

        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Using default configuration: {}", e);
            Self::default()
        })
    }

    /// Write configuration as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                LoadFrameError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| LoadFrameError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            LoadFrameError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}

// ==================== Device Config ====================

/// Serial connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Serial port to connect to (e.g. `/dev/ttyUSB0`, `COM3`)
    pub port: Option<String>,

    /// Controller family
    pub family: DeviceFamily,

    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,

    /// Settle time after a 1000-series zero, in seconds
    pub zero_settle_secs: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: None,
            family: DeviceFamily::default(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT.as_millis() as u64,
            zero_settle_secs: DEFAULT_ZERO_SETTLE.as_secs_f64(),
        }
    }
}

impl DeviceConfig {
    /// Session options for these settings
    pub fn options(&self) -> Result<DeviceOptions> {
        if self.read_timeout_ms == 0 {
            return Err(LoadFrameError::Config(
                "read_timeout_ms must be greater than zero".to_string(),
            ));
        }
        let zero_settle = Duration::try_from_secs_f64(self.zero_settle_secs).map_err(|_| {
            LoadFrameError::Config(format!(
                "zero_settle_secs must be a non-negative number, got {}",
                self.zero_settle_secs
            ))
        })?;

        Ok(DeviceOptions {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            zero_settle,
        })
    }
}

// ==================== Sampling Config ====================

/// Initial sampling settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    /// Sample rate in Hz
    pub sample_rate_hz: f64,

    /// Start recording as soon as the station connects
    pub collect_on_start: bool,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            collect_on_start: false,
        }
    }
}

// ==================== Logging Config ====================

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write logs to `log_file`
    pub log_to_file: bool,

    /// Log file; relative paths are under the app data directory
    pub log_file: PathBuf,

    /// Tracing filter used when `RUST_LOG` is not set
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_to_file: false,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl LoggingConfig {
    /// Log file path with relative paths resolved
    pub fn log_file_path(&self) -> PathBuf {
        super::resolve_data_path(&self.log_file)
    }
}

// ==================== Export Config ====================

/// Export settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory for exported runs; the working directory when unset
    pub directory: Option<PathBuf>,
}

impl ExportConfig {
    /// Full path for an export file called `file_name`
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        match &self.directory {
            Some(dir) => dir.join(file_name),
            None => PathBuf::from(file_name),
        }
    }
}
