//! Factory-calibration restore guard

use crate::error::ProtocolError;
use depth_device::{AutoCalibratedDevice, DeviceError};
use tracing::{error, info, warn};

/// RAII guard that returns a device to factory calibration.
///
/// Restoration happens at most once: either through an explicit
/// `restore()` or when the guard is dropped, including during unwinding.
/// A guard created without a device is inert.
pub struct RestoreGuard<'a, D: AutoCalibratedDevice + ?Sized> {
    device: Option<&'a mut D>,
    restored: bool,
}

impl<'a, D: AutoCalibratedDevice + ?Sized> RestoreGuard<'a, D> {
    pub fn new(device: Option<&'a mut D>) -> Self {
        Self {
            device,
            restored: false,
        }
    }

    /// Device under guard
    pub fn device(&mut self) -> Result<&mut D, ProtocolError> {
        self.device.as_deref_mut().ok_or(ProtocolError::NoDevice)
    }

    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    pub fn is_restored(&self) -> bool {
        self.restored
    }

    /// Stop streaming and reset to factory calibration.
    ///
    /// Returns `Ok(false)` when there is nothing to do (already restored or
    /// no device).
    pub fn restore(&mut self) -> Result<bool, DeviceError> {
        if self.restored {
            return Ok(false);
        }
        let device = match self.device.as_deref_mut() {
            Some(d) => d,
            None => return Ok(false),
        };
        self.restored = true;

        if let Err(e) = device.stop_stream() {
            warn!("Failed to stop stream before restore: {}", e);
        }
        device.reset_to_factory_calibration()?;
        info!("Calibration restored to factory defaults");
        Ok(true)
    }
}

impl<D: AutoCalibratedDevice + ?Sized> Drop for RestoreGuard<'_, D> {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            error!("Failed to restore factory calibration: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depth_device::{SimulatedDevice, SimulationSettings};

    #[test]
    fn test_restores_once_on_drop() {
        let mut dev = SimulatedDevice::new(SimulationSettings::default());
        {
            let mut guard = RestoreGuard::new(Some(&mut dev));
            assert!(guard.restore().unwrap());
            assert!(!guard.restore().unwrap());
        }
        assert_eq!(dev.factory_reset_count(), 1);
    }

    #[test]
    fn test_drop_restores_without_explicit_call() {
        let mut dev = SimulatedDevice::new(SimulationSettings::default());
        {
            let mut guard = RestoreGuard::new(Some(&mut dev));
            guard.device().unwrap().set_dark(true);
        }
        assert_eq!(dev.factory_reset_count(), 1);
    }

    #[test]
    fn test_restores_during_unwind() {
        let mut dev = SimulatedDevice::new(SimulationSettings::default());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = RestoreGuard::new(Some(&mut dev));
            panic!("scenario blew up");
        }));
        assert!(result.is_err());
        assert_eq!(dev.factory_reset_count(), 1);
    }

    #[test]
    fn test_missing_device_is_inert() {
        let mut guard: RestoreGuard<'_, SimulatedDevice> = RestoreGuard::new(None);
        assert!(!guard.has_device());
        assert!(matches!(guard.device(), Err(ProtocolError::NoDevice)));
        assert!(!guard.restore().unwrap());
    }
}
