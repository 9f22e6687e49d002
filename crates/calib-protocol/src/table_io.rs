//! Calibration table I/O against a device

use crate::error::{ProtocolError, TableWriteError};
use calib_table::{
    patch_principal_point, read_principal_points, Axis, CalibrationTable, PrincipalPointPatch,
    PrincipalPoints, TableLayout,
};
use depth_device::AutoCalibratedDevice;
use tracing::{debug, error};

/// Read the live table as a restore point
pub fn save_table<D>(device: &D) -> Result<CalibrationTable, ProtocolError>
where
    D: AutoCalibratedDevice + ?Sized,
{
    device.calibration_table().map_err(|e| {
        error!("Failed to get calibration table: {}", e);
        ProtocolError::from(e)
    })
}

/// Principal points of the device's live table
pub fn read_device_principal_points<D>(
    device: &D,
    layout: &TableLayout,
) -> Result<PrincipalPoints, ProtocolError>
where
    D: AutoCalibratedDevice + ?Sized,
{
    let table = save_table(device)?;
    Ok(read_principal_points(Some(&table), layout)?)
}

/// Recompute the CRC over the payload, stage and commit the table.
///
/// Returns the bytes that were written. Never panics; every failure comes
/// back as a `TableWriteError`.
pub fn write_table_with_crc<D>(
    device: &mut D,
    table: &CalibrationTable,
    layout: &TableLayout,
) -> Result<CalibrationTable, TableWriteError>
where
    D: AutoCalibratedDevice + ?Sized,
{
    let mut finalized = table.clone();
    let old_crc = finalized.stored_crc(layout)?;
    let new_crc = finalized.finalize_crc(layout)?;
    debug!("Table CRC 0x{:08X} -> 0x{:08X}", old_crc, new_crc);

    let result = device
        .set_calibration_table(&finalized)
        .and_then(|_| device.write_calibration());
    if let Err(e) = result {
        error!("Error writing calibration table: {}", e);
        return Err(e.into());
    }
    Ok(finalized)
}

/// Shift one right-eye principal-point axis by `delta_px` and write it back
pub fn modify_principal_point<D>(
    device: &mut D,
    delta_px: f64,
    axis: Axis,
    layout: &TableLayout,
) -> Result<PrincipalPointPatch, ProtocolError>
where
    D: AutoCalibratedDevice + ?Sized,
{
    let current = save_table(device)?;
    let mut patch = patch_principal_point(&current, delta_px, axis, layout)?;
    patch.table = write_table_with_crc(device, &patch.table, layout)?;
    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calib_table::table_crc32;
    use depth_device::{DeviceError, SimulatedDevice, SimulationSettings};

    fn device() -> SimulatedDevice {
        SimulatedDevice::new(SimulationSettings::default())
    }

    #[test]
    fn test_write_fixes_stale_crc() {
        let mut dev = device();
        let layout = TableLayout::d400();
        let mut bytes = dev.live_table().into_bytes();
        bytes[200] = 0x42;

        let written = write_table_with_crc(&mut dev, &CalibrationTable::from_bytes(bytes), &layout).unwrap();
        let raw = written.as_bytes();
        assert_eq!(&raw[12..16], &table_crc32(&raw[16..]).to_le_bytes());
        assert_eq!(dev.live_table(), written);
        assert_eq!(dev.table_write_count(), 1);
    }

    #[test]
    fn test_write_reports_device_rejection() {
        let mut dev = device();
        dev.set_fail_table_write(true);
        let layout = TableLayout::d400();
        let table = dev.live_table();
        let err = write_table_with_crc(&mut dev, &table, &layout).unwrap_err();
        assert!(matches!(err, TableWriteError::Device(DeviceError::TableWrite(_))));
    }

    #[test]
    fn test_write_reports_short_table() {
        let mut dev = device();
        let layout = TableLayout::d400();
        let err = write_table_with_crc(&mut dev, &CalibrationTable::from_bytes(vec![0; 8]), &layout)
            .unwrap_err();
        assert!(matches!(err, TableWriteError::Crc(_)));
        assert_eq!(dev.table_write_count(), 0);
    }

    #[test]
    fn test_modify_principal_point_updates_device() {
        let mut dev = device();
        let layout = TableLayout::d400();
        let before = read_device_principal_points(&dev, &layout).unwrap();

        let patch = modify_principal_point(&mut dev, -0.8, Axis::Ppx, &layout).unwrap();
        let after = read_device_principal_points(&dev, &layout).unwrap();

        assert!((patch.patched.ppx - (before.right.ppx - 0.8)).abs() < 1e-3);
        assert!((after.right.ppx - patch.patched.ppx).abs() < 1e-3);
        assert_eq!(after.right.ppy, before.right.ppy);
        assert_eq!(after.left, before.left);
    }

    #[test]
    fn test_save_table_propagates_read_failure() {
        let mut dev = device();
        dev.set_fail_table_read(true);
        assert!(matches!(
            save_table(&dev),
            Err(ProtocolError::Device(DeviceError::TableRead(_)))
        ));
    }
}
