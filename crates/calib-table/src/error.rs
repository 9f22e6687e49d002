//! Calibration Table Error Types

use thiserror::Error;

/// Errors while decoding or patching a calibration table
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    /// No table was read from the device
    #[error("Calibration table unavailable")]
    Missing,

    /// Table shorter than the layout's minimum size
    #[error("Calibration table is too small: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },

    /// A block would read past the end of the table
    #[error("Block at offset {offset} (+{size} bytes) exceeds table length {len}")]
    OutOfBounds { offset: usize, size: usize, len: usize },

    /// Stored CRC does not match the payload
    #[error("CRC mismatch: stored {stored:08X}, computed {computed:08X}")]
    CrcMismatch { stored: u32, computed: u32 },

    /// Layout constants are inconsistent
    #[error("Invalid table layout: {0}")]
    InvalidLayout(String),
}
