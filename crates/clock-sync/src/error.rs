//! Clock Sync Error Types

use depth_device::{DeviceError, SyncMode};
use thiserror::Error;

/// Errors from clock calibration and sync sessions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// Device call failed
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Too few frames collected from one of the devices
    #[error("Insufficient frames for calibration: master={master}, slave={slave} (need {required})")]
    InsufficientSamples {
        master: usize,
        slave: usize,
        required: usize,
    },

    /// Too few cross-device frame pairs
    #[error("Insufficient aligned frame pairs: {found} (need {required})")]
    InsufficientPairs { found: usize, required: usize },

    /// Master and slave series differ in length
    #[error("Series length mismatch: master={master}, slave={slave}")]
    LengthMismatch { master: usize, slave: usize },

    /// Regression is undefined (constant master series or zero slope)
    #[error("Degenerate clock fit: {0}")]
    DegenerateFit(String),

    /// Sync mode was set but the device reports something else
    #[error("Sync mode {requested:?} not applied, device reports {reported}")]
    ModeNotApplied { requested: SyncMode, reported: f32 },

    /// Settings the analysis cannot work with
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Device lacks inter-camera sync support
    #[error("Not supported: {0}")]
    Unsupported(String),
}
