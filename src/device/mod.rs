//! Load frame device protocol
//!
//! Tinius Olsen controllers with an RS232 command module speak short ASCII
//! commands terminated by a carriage return. Different controller families
//! use different command letters, baud rates and numeric encodings; this
//! module normalises them behind the [`LoadFrame`] trait.
//!
//! # Components
//!
//! - [`LoadFrame`] - Uniform capability set every supported family provides
//! - [`DeviceFamily`] / [`CommandSet`] - Per-family wire constants
//! - [`H5kLoadFrame`] - H5K-series: hardware zero, 19200 baud
//! - [`Series1000LoadFrame`] - 1000-series: software zero with a settle delay, 9600 baud
//! - [`FrameLink`] - CR framing plus the session lock serialising exchanges
//!
//! # Example
//!
//! ```ignore
//! use loadframe_rs::device::{connect, DeviceFamily, DeviceOptions};
//!
//! let device = connect("/dev/ttyUSB0", DeviceFamily::H5k, &DeviceOptions::default())?;
//! let range = device.get_load_cell_range()?;
//! let load_newtons = device.read_load()? * range;
//! let extension_mm = device.read_extension()?;
//! ```

pub mod framing;
pub mod h5k;
pub mod range_table;
pub mod series1000;

pub use framing::{FrameLink, FramedChannel};
pub use h5k::H5kLoadFrame;
pub use series1000::Series1000LoadFrame;

use crate::error::{LoadFrameError, Result};
use crate::transport::{SerialTransport, Transport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default serial read timeout (one second, as the controllers expect)
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Time a 1000-series controller needs after a zero command before its
/// readings are valid again
pub const DEFAULT_ZERO_SETTLE: Duration = Duration::from_secs(15);

/// Supported controller families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DeviceFamily {
    /// H5K-series bench top testers
    #[default]
    #[serde(rename = "h5k")]
    H5k,
    /// 1000-series testers
    #[serde(rename = "1000")]
    Series1000,
}

/// Command strings for one controller family (terminator not included)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSet {
    pub read_extension: &'static str,
    pub read_load: &'static str,
    pub read_load_cell_type: &'static str,
    /// Prefix; the rate follows with one decimal place
    pub set_run_rate: &'static str,
    pub move_up: &'static str,
    pub move_down: &'static str,
    pub stop: &'static str,
    pub zero_extension: &'static str,
    pub zero_load: &'static str,
}

const H5K_COMMANDS: CommandSet = CommandSet {
    read_extension: "RP",
    read_load: "RL",
    read_load_cell_type: "RC",
    set_run_rate: "WV",
    move_up: "WF",
    move_down: "WR",
    stop: "WS",
    zero_extension: "WP",
    zero_load: "WZ",
};

const SERIES_1000_COMMANDS: CommandSet = CommandSet {
    read_extension: "R2",
    read_load: "R1",
    read_load_cell_type: "RC",
    set_run_rate: "WV",
    move_up: "WF",
    move_down: "WR",
    stop: "WS",
    zero_extension: "WE",
    zero_load: "WZ",
};

impl DeviceFamily {
    /// All supported families
    pub fn all() -> &'static [DeviceFamily] {
        &[DeviceFamily::H5k, DeviceFamily::Series1000]
    }

    /// Serial baud rate
    pub fn baud_rate(&self) -> u32 {
        match self {
            DeviceFamily::H5k => 19200,
            DeviceFamily::Series1000 => 9600,
        }
    }

    /// Wire command set
    pub fn commands(&self) -> &'static CommandSet {
        match self {
            DeviceFamily::H5k => &H5K_COMMANDS,
            DeviceFamily::Series1000 => &SERIES_1000_COMMANDS,
        }
    }

    /// Raw load reading corresponding to full scale
    pub fn load_divisor(&self) -> f64 {
        match self {
            DeviceFamily::H5k => h5k::LOAD_DIVISOR,
            DeviceFamily::Series1000 => series1000::LOAD_DIVISOR,
        }
    }

    /// Whether zeroing blocks for the settle time
    pub fn zero_is_slow(&self) -> bool {
        matches!(self, DeviceFamily::Series1000)
    }
}

impl std::fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceFamily::H5k => write!(f, "H5K"),
            DeviceFamily::Series1000 => write!(f, "1000-series"),
        }
    }
}

impl std::str::FromStr for DeviceFamily {
    type Err = LoadFrameError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h5k" | "h5k-series" => Ok(DeviceFamily::H5k),
            "1000" | "1000-series" | "series1000" => Ok(DeviceFamily::Series1000),
            other => Err(LoadFrameError::Config(format!(
                "Unknown load frame family '{}' (expected h5k or 1000)",
                other
            ))),
        }
    }
}

/// Session options that are not part of the wire protocol
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceOptions {
    /// Serial read timeout; a frame not terminated within this is a timeout
    pub read_timeout: Duration,
    /// Settle delay after a 1000-series zero command
    pub zero_settle: Duration,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            zero_settle: DEFAULT_ZERO_SETTLE,
        }
    }
}

/// Uniform interface to a connected load frame controller
///
/// Every method performs its whole write/read exchange under the session
/// lock, so an instance can be shared between the control thread and the
/// sampling engine. Implementations must stop the crosshead before closing
/// the transport, both in [`LoadFrame::disconnect`] and on drop.
pub trait LoadFrame: Send + Sync {
    /// Controller family
    fn family(&self) -> DeviceFamily;

    /// Raw load cell type code reported by the controller
    fn read_load_cell_type(&self) -> Result<String>;

    /// Rated range of the fitted load cell in Newtons
    ///
    /// Fails with [`LoadFrameError::RangeLookup`] for codes the family's
    /// table does not know.
    fn get_load_cell_range(&self) -> Result<f64> {
        let code = self.read_load_cell_type()?;
        range_table::lookup(self.family(), &code)
    }

    /// Load as a fraction of full scale; multiply by the range for Newtons
    fn read_load(&self) -> Result<f64>;

    /// Extension in millimeters
    fn read_extension(&self) -> Result<f64>;

    /// Set the crosshead run rate
    fn set_run_rate(&self, rate: f64) -> Result<()>;

    /// Start moving the crosshead up
    fn start_moving_up(&self) -> Result<()>;

    /// Start moving the crosshead down
    fn start_moving_down(&self) -> Result<()>;

    /// Stop the crosshead
    fn stop_moving(&self) -> Result<()>;

    /// Zero the load reading
    ///
    /// May block for the settle time; see [`LoadFrame::zero_is_slow`].
    fn zero_load(&self) -> Result<()>;

    /// Zero the extension reading
    ///
    /// May block for the settle time; see [`LoadFrame::zero_is_slow`].
    fn zero_extension(&self) -> Result<()>;

    /// Whether the zero operations block for a settle delay
    fn zero_is_slow(&self) -> bool {
        self.family().zero_is_slow()
    }

    /// Stop the crosshead and close the transport
    fn disconnect(&self) -> Result<()>;

    /// Whether the transport is still open
    fn is_connected(&self) -> bool;

    /// Status line for display
    fn describe(&self) -> String {
        format!("{} load frame", self.family())
    }
}

/// Encode a run rate as the `WV` argument
pub(crate) fn run_rate_command(commands: &CommandSet, rate: f64) -> Result<String> {
    if !rate.is_finite() || rate < 0.0 {
        return Err(LoadFrameError::InvalidRateInput(format!(
            "run rate {} is not a non-negative number",
            rate
        )));
    }
    Ok(format!("{}{:.1}", commands.set_run_rate, rate))
}

/// Build a session for `family` over an already open transport
pub fn open_session(
    family: DeviceFamily,
    transport: Box<dyn Transport>,
    options: &DeviceOptions,
) -> Arc<dyn LoadFrame> {
    tracing::info!("Opening {} session over {}", family, transport.description());
    match family {
        DeviceFamily::H5k => Arc::new(H5kLoadFrame::new(transport)),
        DeviceFamily::Series1000 => {
            Arc::new(Series1000LoadFrame::new(transport, options.zero_settle))
        }
    }
}

/// Open `port_name` at the family's baud rate and build a session
pub fn connect(
    port_name: &str,
    family: DeviceFamily,
    options: &DeviceOptions,
) -> Result<Arc<dyn LoadFrame>> {
    let transport = SerialTransport::open(port_name, family.baud_rate(), options.read_timeout)?;
    Ok(open_session(family, Box::new(transport), options))
}
