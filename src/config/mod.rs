//! Configuration module for loadframe-rs
//!
//! This module handles:
//! - Station configuration (`loadframe.toml`): port, family, timing, logging, export
//! - Application state persistence (last used port and family)
//!
//! # App Data Location
//!
//! Application data is stored in the platform-appropriate location:
//! - **Linux**: `~/.local/share/edu.bucknell.TOControl/`
//! - **macOS**: `~/Library/Application Support/edu.bucknell.TOControl/`
//! - **Windows**: `%APPDATA%\edu.bucknell.TOControl\`
//!
//! # Files
//!
//! - `loadframe.toml` - Station configuration, edited by hand
//! - `app_state.json` - Last connection, written by the application
//! - `tinius_olsen.log` - Log file, when file logging is enabled
//!
//! # Example
//!
//! ```ignore
//! use loadframe_rs::config::{AppConfig, AppState};
//!
//! let config = AppConfig::load_or_default(None);
//! let mut state = AppState::load_or_default();
//!
//! state.update_last_connection("/dev/ttyUSB0", config.device.family);
//! state.save()?;
//! ```

pub mod settings;

pub use settings::*;

use crate::device::DeviceFamily;
use crate::error::{LoadFrameError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "edu.bucknell.TOControl";

/// App state filename
pub const APP_STATE_FILE: &str = "app_state.json";

/// Configuration filename
pub const CONFIG_FILE: &str = "loadframe.toml";

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        LoadFrameError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            LoadFrameError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the app state file
pub fn app_state_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(APP_STATE_FILE))
}

/// Get the path to the default configuration file
pub fn config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

/// Resolve `path` against the app data directory unless it is absolute
pub fn resolve_data_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match app_data_dir() {
        Some(dir) => dir.join(path),
        None => path.to_path_buf(),
    }
}

// ==================== App State ====================

/// Persistent application state
///
/// Remembers the last connection so the next session can reconnect without
/// asking, separate from the hand-edited configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppState {
    /// Version for future migration support
    #[serde(default = "default_app_state_version")]
    pub version: u32,

    /// Last serial port connected to
    #[serde(default)]
    pub last_port: Option<String>,

    /// Family of the last connected controller
    #[serde(default)]
    pub last_family: Option<DeviceFamily>,
}

fn default_app_state_version() -> u32 {
    1
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            version: 1,
            last_port: None,
            last_family: None,
        }
    }
}

impl AppState {
    /// Load app state from the default location
    pub fn load() -> Result<Self> {
        let path = app_state_path().ok_or_else(|| {
            LoadFrameError::Config("Could not determine app state path".to_string())
        })?;
        Self::load_from(&path)
    }

    /// Load app state from `path`; a missing file gives the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| LoadFrameError::Config(format!("Failed to read app state: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| LoadFrameError::Config(format!("Failed to parse app state: {}", e)))
    }

    /// Load app state, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load app state, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save app state to the default location
    pub fn save(&self) -> Result<()> {
        let dir = ensure_app_data_dir()?;
        self.save_to(&dir.join(APP_STATE_FILE))
    }

    /// Save app state to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            LoadFrameError::Config(format!("Failed to serialize app state: {}", e))
        })?;

        std::fs::write(path, content)
            .map_err(|e| LoadFrameError::Config(format!("Failed to write app state: {}", e)))
    }

    /// Update last used connection info
    pub fn update_last_connection(&mut self, port: &str, family: DeviceFamily) {
        self.last_port = Some(port.to_string());
        self.last_family = Some(family);
    }

    /// Pick the port and family to connect with
    ///
    /// An explicit `port` or the configured one wins, with `family` or the
    /// configured family. Otherwise the last connection is reused along with
    /// the family it was made with, unless `family` overrides it.
    pub fn connection_target(
        &self,
        port: Option<&str>,
        family: Option<DeviceFamily>,
        device: &DeviceConfig,
    ) -> ConnectionTarget {
        if let Some(port) = port.or(device.port.as_deref()) {
            return ConnectionTarget {
                port: Some(port.to_string()),
                family: family.unwrap_or(device.family),
            };
        }

        match &self.last_port {
            Some(last_port) => ConnectionTarget {
                port: Some(last_port.clone()),
                family: family.or(self.last_family).unwrap_or(device.family),
            },
            None => ConnectionTarget {
                port: None,
                family: family.unwrap_or(device.family),
            },
        }
    }
}

/// Port and controller family for the next connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    /// `None` when no port was given, configured, or remembered
    pub port: Option<String>,
    pub family: DeviceFamily,
}

// ==================== Tests ====================
