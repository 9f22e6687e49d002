//! Device Error Types

use crate::device::DeviceOption;
use std::time::Duration;
use thiserror::Error;

/// Errors returned across the device boundary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    /// No device handle is available
    #[error("No device connected")]
    NotConnected,

    /// Option is not exposed by this device
    #[error("Option {0:?} not supported by device")]
    UnsupportedOption(DeviceOption),

    /// Option cannot be changed while streaming
    #[error("Option {0:?} is locked while streaming")]
    OptionLocked(DeviceOption),

    /// Option value outside the accepted range
    #[error("Invalid value {value} for option {option:?}")]
    InvalidValue { option: DeviceOption, value: f32 },

    /// Stream already running
    #[error("Device is already streaming")]
    AlreadyStreaming,

    /// Operation requires an active stream
    #[error("Device is not streaming")]
    NotStreaming,

    /// Stream configuration rejected
    #[error("Stream error: {0}")]
    Stream(String),

    /// No frame arrived in time
    #[error("Frame didn't arrive within {0:?}")]
    FrameTimeout(Duration),

    /// Calibration table could not be read
    #[error("Failed to read calibration table: {0}")]
    TableRead(String),

    /// Calibration table was rejected on write
    #[error("Failed to write calibration table: {0}")]
    TableWrite(String),

    /// Vendor calibration routine raised
    #[error("Calibration failed: {0}")]
    Calibration(String),

    /// Vendor calibration routine ran out of time
    #[error("Calibration timed out after {0:?}")]
    CalibrationTimeout(Duration),

    /// Capability absent on this device
    #[error("Not supported: {0}")]
    Unsupported(String),
}
