//! One-shot device commands issued from the control thread

use crate::device::LoadFrame;
use crate::error::Result;
use std::fmt;

/// An operator command routed to the connected load frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceCommand {
    /// Start moving the crosshead up
    MoveUp,
    /// Start moving the crosshead down
    MoveDown,
    /// Stop the crosshead
    Stop,
    /// Zero the load reading
    ZeroLoad,
    /// Zero the extension reading
    ZeroExtension,
    /// Set the crosshead run rate
    SetRunRate(f64),
}

impl DeviceCommand {
    /// Execute against `device`
    pub fn apply(&self, device: &dyn LoadFrame) -> Result<()> {
        match *self {
            DeviceCommand::MoveUp => device.start_moving_up(),
            DeviceCommand::MoveDown => device.start_moving_down(),
            DeviceCommand::Stop => device.stop_moving(),
            DeviceCommand::ZeroLoad => device.zero_load(),
            DeviceCommand::ZeroExtension => device.zero_extension(),
            DeviceCommand::SetRunRate(rate) => device.set_run_rate(rate),
        }
    }

    /// Whether this command blocks for a settle delay on `device`
    pub fn is_slow_on(&self, device: &dyn LoadFrame) -> bool {
        matches!(self, DeviceCommand::ZeroLoad | DeviceCommand::ZeroExtension)
            && device.zero_is_slow()
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceCommand::MoveUp => write!(f, "move up"),
            DeviceCommand::MoveDown => write!(f, "move down"),
            DeviceCommand::Stop => write!(f, "stop"),
            DeviceCommand::ZeroLoad => write!(f, "zero load"),
            DeviceCommand::ZeroExtension => write!(f, "zero extension"),
            DeviceCommand::SetRunRate(rate) => write!(f, "set run rate {:.1}", rate),
        }
    }
}
