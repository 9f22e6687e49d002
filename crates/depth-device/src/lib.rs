//! Depth Camera Device Boundary
//!
//! Describes the vendor-defined surface the calibration and sync checks are
//! written against. Every call returns a typed result; nothing panics on a
//! device failure.
//!
//! Provides:
//! - Capability discovery from device info (family quirks, sync support, table layout)
//! - Stream, frame and per-frame metadata types
//! - `DepthDevice` / `AutoCalibratedDevice` traits
//! - A bounded-wait primitive used by every suspension point
//! - An in-memory simulated device for hardware-free runs

mod device;
mod error;
mod frame;
mod info;
pub mod sim;
pub mod wait;

pub use device::{
    AutoCalibratedDevice, CalibrationOutput, DepthDevice, DeviceOption, FrameCallback,
    ProgressCallback, SyncMode, TargetZRequest,
};
pub use error::DeviceError;
pub use frame::{DepthFrame, FrameMetadata, MetadataField, PixelFormat, StreamConfig, StreamKind};
pub use info::{DeviceCapabilities, DeviceInfo, FirmwareVersion, ProductFamily};
pub use sim::{CalibrationBehavior, SimClock, SimulatedDevice, SimulationSettings};
pub use wait::{poll_until, wait_until, WaitError, WaitPolicy};
