//! Simulated Depth Camera
//!
//! In-memory stand-in for a physical camera, used by tests and by the runner
//! when no hardware is attached. The depth it reports is biased in
//! proportion to how far the live right-eye principal point sits from the
//! factory one, so a perturb-calibrate cycle has a measurable effect.

mod clock;
mod device;

pub use clock::{host_now_us, SimClock, HW_COUNTER_MODULUS};
pub use device::SimulatedDevice;

use crate::info::DeviceInfo;
use calib_table::{CalibrationTable, Eye, TableError, TableLayout, INTRINSIC_FLOATS};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// What the simulated on-chip / tare routine returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationBehavior {
    /// Return the factory table (a perfect correction)
    RevertToFactory,
    /// Return the live table unchanged
    ReturnCurrent,
    /// Raise from the vendor call
    Fail { message: String },
    /// Require `frames` host-assisted frames, then revert to factory
    HostAssisted { frames: u32 },
}

/// Simulated device settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub info: DeviceInfo,
    /// Scene distance seen with a factory-calibrated table (mm)
    pub true_distance_mm: f64,
    /// Depth error per pixel of right-eye principal point error (mm/px)
    pub depth_bias_mm_per_px: f64,
    /// Meters per depth unit; `None` makes the query fail
    pub depth_scale: Option<f32>,
    /// Report no valid depth pixels
    pub dark: bool,
    /// Attach per-frame metadata
    pub metadata_enabled: bool,
    pub calibration: CalibrationBehavior,
    pub health_factor: f64,
    /// Result of the target-distance estimate (mm)
    pub target_z_mm: Option<f64>,
    pub clock: SimClock,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            info: DeviceInfo {
                name: "Intel RealSense D435".to_string(),
                serial_number: "SIM0001".to_string(),
                firmware_version: "5.16.0.1".to_string(),
                product_line: "D400".to_string(),
                connection_type: "USB".to_string(),
            },
            true_distance_mm: 1000.0,
            depth_bias_mm_per_px: 40.0,
            depth_scale: Some(0.001),
            dark: false,
            metadata_enabled: true,
            calibration: CalibrationBehavior::RevertToFactory,
            health_factor: 0.18,
            target_z_mm: Some(1000.0),
            clock: SimClock::default(),
        }
    }
}

impl SimulationSettings {
    /// Settings for a named camera with a given serial
    pub fn named(name: &str, serial: &str) -> Self {
        let mut settings = Self::default();
        settings.info.name = name.to_string();
        settings.info.serial_number = serial.to_string();
        settings
    }
}

/// Factory table with nominal intrinsics and a valid CRC.
///
/// Families without a known layout get an opaque blob with no CRC.
pub fn synthetic_table(layout: Option<&TableLayout>) -> CalibrationTable {
    let layout = match layout {
        Some(l) => l,
        None => return filler_table(),
    };
    if let Err(e) = layout.validate() {
        warn!("Cannot build a synthetic table for this layout: {}", e);
        return filler_table();
    }

    let mut table = CalibrationTable::from_bytes(vec![0u8; layout.min_table_size]);
    if let Err(e) = write_intrinsics(&mut table, layout) {
        warn!("Synthetic calibration table left without a valid CRC: {}", e);
    }
    table
}

fn filler_table() -> CalibrationTable {
    CalibrationTable::from_bytes(vec![0xA5; 512])
}

fn write_intrinsics(table: &mut CalibrationTable, layout: &TableLayout) -> Result<(), TableError> {
    let fx = (640.0 / layout.nominal_width) as f32;
    let fy = (640.0 / layout.nominal_height) as f32;
    let left: [f32; INTRINSIC_FLOATS] = [fx, fy, 0.5, 0.375, 0.0, 0.0, 0.0, 0.0, 1.0];
    let right: [f32; INTRINSIC_FLOATS] = [fx, fy, 0.501, 0.376, 0.0, 0.0, 0.0, 0.0, 1.0];
    table.set_intrinsics(Eye::Left, &left, layout)?;
    table.set_intrinsics(Eye::Right, &right, layout)?;
    table.finalize_crc(layout)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_table_is_valid() {
        let layout = TableLayout::d400();
        let table = synthetic_table(Some(&layout));
        assert_eq!(table.len(), 280);
        assert!(table.verify_crc(&layout).is_ok());
        let points = calib_table::read_principal_points(Some(&table), &layout).unwrap();
        assert!((points.right.ppx - 641.28).abs() < 1e-3);
    }

    #[test]
    fn test_inconsistent_layout_gets_filler_table() {
        let layout = TableLayout {
            header_size: 4096,
            ..TableLayout::d400()
        };
        let table = synthetic_table(Some(&layout));
        assert_eq!(table.len(), 512);
        assert!(table.verify_crc(&TableLayout::d400()).is_err());
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: SimulationSettings = serde_json::from_str(
            r#"{"dark": true, "calibration": {"kind": "host_assisted", "frames": 5}}"#,
        )
        .unwrap();
        assert!(settings.dark);
        assert_eq!(settings.calibration, CalibrationBehavior::HostAssisted { frames: 5 });
        assert_eq!(settings.true_distance_mm, 1000.0);
    }
}
