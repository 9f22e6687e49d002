//! Device traits
//!
//! The calibration protocol and the sync session only talk to hardware
//! through these traits. Calls block the caller the way the vendor SDK does;
//! callback streaming delivers frames on a device-owned thread.

use crate::error::DeviceError;
use crate::frame::{DepthFrame, StreamConfig};
use crate::info::{DeviceCapabilities, DeviceInfo};
use calib_table::CalibrationTable;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Frame sink for callback streaming, invoked on the device's thread
pub type FrameCallback = Arc<dyn Fn(DepthFrame) + Send + Sync>;

/// Calibration progress sink (percent complete)
pub type ProgressCallback<'a> = &'a mut dyn FnMut(f32);

/// Numeric device options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceOption {
    EmitterEnabled,
    ThermalCompensation,
    Exposure,
    Gain,
    EnableAutoExposure,
    AutoExposureMode,
    InterCamSyncMode,
}

/// Inter-camera sync mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMode {
    /// Free-running
    Default,
    Master,
    Slave,
}

impl SyncMode {
    /// Option value for `DeviceOption::InterCamSyncMode`
    pub fn option_value(self) -> f32 {
        match self {
            SyncMode::Default => 0.0,
            SyncMode::Master => 1.0,
            SyncMode::Slave => 2.0,
        }
    }

    pub fn from_option_value(value: f32) -> Option<Self> {
        match value.round() as i32 {
            0 => Some(SyncMode::Default),
            1 => Some(SyncMode::Master),
            2 => Some(SyncMode::Slave),
            _ => None,
        }
    }
}

/// Result of a vendor calibration call
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationOutput {
    /// New table; empty while host-assisted processing is still running
    pub table: CalibrationTable,
    pub health_factor: f64,
}

impl CalibrationOutput {
    /// Whether the routine produced a finished table
    pub fn is_complete(&self) -> bool {
        !self.table.is_empty()
    }
}

/// Parameters for the Tare target-distance estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetZRequest {
    /// Target rectangle width (mm)
    pub target_width_mm: f64,
    /// Target rectangle height (mm)
    pub target_height_mm: f64,
    /// IR frames to accumulate before estimating
    pub frames: u32,
    pub timeout: Duration,
}

impl Default for TargetZRequest {
    fn default() -> Self {
        Self {
            target_width_mm: 175.0,
            target_height_mm: 100.0,
            frames: 50,
            timeout: Duration::from_secs(30),
        }
    }
}

/// A streaming depth camera
pub trait DepthDevice: Send {
    fn info(&self) -> &DeviceInfo;

    fn capabilities(&self) -> &DeviceCapabilities;

    /// Start a stream for blocking `wait_for_frame` consumption
    fn start_stream(&mut self, config: &StreamConfig) -> Result<(), DeviceError>;

    /// Stop whatever is streaming; stopping an idle device is not an error
    fn stop_stream(&mut self) -> Result<(), DeviceError>;

    fn is_streaming(&self) -> bool;

    /// Block until the next frame or `timeout`
    fn wait_for_frame(&mut self, timeout: Duration) -> Result<DepthFrame, DeviceError>;

    /// Start one or more streams delivering frames to `callback`
    fn start_with_callback(
        &mut self,
        configs: &[StreamConfig],
        callback: FrameCallback,
    ) -> Result<(), DeviceError>;

    fn supports_option(&self, option: DeviceOption) -> bool;

    fn get_option(&self, option: DeviceOption) -> Result<f32, DeviceError>;

    fn set_option(&mut self, option: DeviceOption, value: f32) -> Result<(), DeviceError>;

    /// Meters per depth unit
    fn depth_scale(&self) -> Result<f32, DeviceError>;
}

/// A camera exposing on-chip calibration
pub trait AutoCalibratedDevice: DepthDevice {
    /// Current live calibration table
    fn calibration_table(&self) -> Result<CalibrationTable, DeviceError>;

    /// Stage a table; takes effect on `write_calibration`
    fn set_calibration_table(&mut self, table: &CalibrationTable) -> Result<(), DeviceError>;

    /// Commit the staged table
    fn write_calibration(&mut self) -> Result<(), DeviceError>;

    fn run_on_chip_calibration(
        &mut self,
        json: &str,
        progress: ProgressCallback<'_>,
        timeout: Duration,
    ) -> Result<CalibrationOutput, DeviceError>;

    fn run_tare_calibration(
        &mut self,
        ground_truth_mm: f64,
        json: &str,
        progress: ProgressCallback<'_>,
        timeout: Duration,
    ) -> Result<CalibrationOutput, DeviceError>;

    /// Feed one frame to a host-assisted calibration in progress
    fn process_calibration_frame(
        &mut self,
        frame: &DepthFrame,
        progress: ProgressCallback<'_>,
        timeout: Duration,
    ) -> Result<CalibrationOutput, DeviceError>;

    /// Estimate distance to a known-size target (mm)
    fn calculate_target_z(&mut self, request: &TargetZRequest) -> Result<f64, DeviceError>;

    /// Restore the last-known-good factory calibration
    fn reset_to_factory_calibration(&mut self) -> Result<(), DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_mode_values() {
        assert_eq!(SyncMode::Default.option_value(), 0.0);
        assert_eq!(SyncMode::Master.option_value(), 1.0);
        assert_eq!(SyncMode::Slave.option_value(), 2.0);
        assert_eq!(SyncMode::from_option_value(2.0), Some(SyncMode::Slave));
        assert_eq!(SyncMode::from_option_value(4.0), None);
    }

    #[test]
    fn test_empty_output_is_incomplete() {
        let out = CalibrationOutput {
            table: CalibrationTable::from_bytes(Vec::new()),
            health_factor: 0.0,
        };
        assert!(!out.is_complete());
    }
}
