//! Protocol error types

use calib_table::TableError;
use depth_device::DeviceError;
use std::time::Duration;
use thiserror::Error;

/// Failure of a CRC-patched table write
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableWriteError {
    /// Table too short to carry a CRC
    #[error("CRC update failed: {0}")]
    Crc(#[from] TableError),

    /// Device rejected the staged table or the commit
    #[error("Device rejected table: {0}")]
    Device(#[from] DeviceError),
}

/// Errors that abort a calibration scenario
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Device boundary call failed
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Table could not be decoded
    #[error("Calibration table error: {0}")]
    Table(#[from] TableError),

    #[error(transparent)]
    TableWrite(#[from] TableWriteError),

    /// Operation attempted without a device handle
    #[error("No device handle")]
    NoDevice,

    /// Host-assisted calibration did not finish in time
    #[error("Calibration timed out after {elapsed:?} ({frames} frames processed)")]
    CalibrationTimeout { elapsed: Duration, frames: u32 },

    /// Device family or mode not covered by the protocol
    #[error("Unsupported device: {0}")]
    Unsupported(String),

    /// Parameter blob could not be generated
    #[error("Invalid calibration parameters: {0}")]
    Params(#[from] serde_json::Error),
}
