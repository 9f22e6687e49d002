//! Vendor calibration driving

use crate::config::CalibrationTimeouts;
use crate::error::ProtocolError;
use calib_table::CalibrationTable;
use depth_device::{
    poll_until, AutoCalibratedDevice, CalibrationOutput, DeviceError, DeviceOption, StreamConfig,
    StreamKind, WaitError, WaitPolicy,
};
use tracing::{debug, error, info, warn};

/// Which vendor entry point to call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RoutineKind {
    OnChip,
    Tare { ground_truth_mm: f64 },
}

/// Outcome of a completed vendor calibration
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    pub health_factor: f64,
    /// Finished table, never empty
    pub table: CalibrationTable,
    /// Frames fed in host-assisted mode
    pub frames_processed: u32,
}

/// Run OCC or Tare on a freshly started stream.
///
/// When the first call returns no table the routine is host-assisted: depth
/// frames are fed to `process_calibration_frame` until a table comes back or
/// `timeouts.host_assist` expires. The stream is stopped on every path.
pub fn run_calibration<D>(
    device: &mut D,
    kind: RoutineKind,
    json: &str,
    stream: &StreamConfig,
    timeouts: &CalibrationTimeouts,
) -> Result<CalibrationResult, ProtocolError>
where
    D: AutoCalibratedDevice + ?Sized,
{
    device.start_stream(stream)?;
    let result = drive(device, kind, json, timeouts);
    if let Err(e) = device.stop_stream() {
        warn!("Failed to stop calibration stream: {}", e);
    }

    match &result {
        Ok(r) => {
            info!("Calibration completed successfully");
            info!("Health factor = {}", r.health_factor);
        }
        Err(e) => error!("Calibration failed: {}", e),
    }
    result
}

fn drive<D>(
    device: &mut D,
    kind: RoutineKind,
    json: &str,
    timeouts: &CalibrationTimeouts,
) -> Result<CalibrationResult, ProtocolError>
where
    D: AutoCalibratedDevice + ?Sized,
{
    // Streaming must be live before the vendor call
    device.wait_for_frame(timeouts.first_frame)?;
    prepare_stream(device)?;

    let mut on_progress = |pct: f32| debug!("Calibration at {}%", pct);
    let first = match kind {
        RoutineKind::OnChip => {
            info!("Starting on-chip calibration");
            device.run_on_chip_calibration(json, &mut on_progress, timeouts.on_chip)?
        }
        RoutineKind::Tare { ground_truth_mm } => {
            info!("Starting tare calibration (ground truth {:.1} mm)", ground_truth_mm);
            device.run_tare_calibration(ground_truth_mm, json, &mut on_progress, timeouts.tare)?
        }
    };
    debug!(
        "Initial calibration call completed. Calibration done: {}, table size: {}",
        first.is_complete(),
        first.table.len()
    );

    if first.is_complete() {
        debug!("Calibration completed in initial call (no frame processing needed)");
        return Ok(CalibrationResult {
            health_factor: first.health_factor,
            table: first.table,
            frames_processed: 0,
        });
    }

    debug!("Entering frame processing loop for host-assisted calibration");
    let (output, frames) = host_assist(device, timeouts)?;
    Ok(CalibrationResult {
        health_factor: output.health_factor,
        table: output.table,
        frames_processed: frames,
    })
}

/// Projector on where the family needs it, thermal compensation off
fn prepare_stream<D>(device: &mut D) -> Result<(), ProtocolError>
where
    D: AutoCalibratedDevice + ?Sized,
{
    let caps = device.capabilities();
    let want_emitter = caps.emitter_required_for_calibration;
    if want_emitter && device.supports_option(DeviceOption::EmitterEnabled) {
        device.set_option(DeviceOption::EmitterEnabled, 1.0)?;
    }
    if device.supports_option(DeviceOption::ThermalCompensation) {
        device.set_option(DeviceOption::ThermalCompensation, 0.0)?;
    }
    Ok(())
}

fn host_assist<D>(
    device: &mut D,
    timeouts: &CalibrationTimeouts,
) -> Result<(CalibrationOutput, u32), ProtocolError>
where
    D: AutoCalibratedDevice + ?Sized,
{
    let mut frames = 0u32;
    let mut on_progress = |pct: f32| debug!("Calibration at {}%", pct);
    let policy = WaitPolicy::busy(timeouts.host_assist);

    let outcome = poll_until(&policy, || -> Result<Option<CalibrationOutput>, DeviceError> {
        let frame = device.wait_for_frame(timeouts.frame_processing)?;
        if frame.stream != StreamKind::Depth {
            return Ok(None);
        }
        frames += 1;
        let output = device.process_calibration_frame(&frame, &mut on_progress, timeouts.frame_processing)?;
        if frames % 30 == 0 {
            debug!("Processed {} frames, calibration done: {}", frames, output.is_complete());
        }
        Ok(output.is_complete().then_some(output))
    });

    match outcome {
        Ok(output) => Ok((output, frames)),
        Err(WaitError::Aborted(e)) => Err(ProtocolError::Device(e)),
        Err(WaitError::Timeout { elapsed, .. }) => {
            Err(ProtocolError::CalibrationTimeout { elapsed, frames })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depth_device::{CalibrationBehavior, DepthDevice, SimulatedDevice, SimulationSettings};
    use std::time::Duration;

    fn stream() -> StreamConfig {
        StreamConfig::depth(16, 8, 90)
    }

    #[test]
    fn test_synchronous_calibration() {
        let mut dev = SimulatedDevice::new(SimulationSettings::default());
        let result = run_calibration(&mut dev, RoutineKind::OnChip, "{}", &stream(), &CalibrationTimeouts::default())
            .unwrap();
        assert_eq!(result.frames_processed, 0);
        assert_eq!(result.table, dev.factory_table());
        assert!((result.health_factor - 0.18).abs() < 1e-12);
        assert!(!dev.is_streaming());
        assert_eq!(dev.get_option(DeviceOption::ThermalCompensation).unwrap(), 0.0);
    }

    #[test]
    fn test_host_assisted_loop() {
        let mut dev = SimulatedDevice::new(SimulationSettings::default());
        dev.set_calibration_behavior(CalibrationBehavior::HostAssisted { frames: 4 });
        let result = run_calibration(&mut dev, RoutineKind::OnChip, "{}", &stream(), &CalibrationTimeouts::default())
            .unwrap();
        assert_eq!(result.frames_processed, 4);
        assert!(!result.table.is_empty());
    }

    #[test]
    fn test_host_assisted_timeout() {
        let mut dev = SimulatedDevice::new(SimulationSettings::default());
        dev.set_calibration_behavior(CalibrationBehavior::HostAssisted { frames: 100_000 });
        let timeouts = CalibrationTimeouts {
            host_assist: Duration::from_millis(100),
            ..Default::default()
        };
        let err = run_calibration(&mut dev, RoutineKind::OnChip, "{}", &stream(), &timeouts).unwrap_err();
        match err {
            ProtocolError::CalibrationTimeout { elapsed, frames } => {
                assert!(elapsed >= Duration::from_millis(100));
                assert!(frames > 0);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(!dev.is_streaming());
    }

    #[test]
    fn test_tare_records_ground_truth() {
        let mut dev = SimulatedDevice::new(SimulationSettings::default());
        run_calibration(
            &mut dev,
            RoutineKind::Tare { ground_truth_mm: 1234.0 },
            "{}",
            &stream(),
            &CalibrationTimeouts::default(),
        )
        .unwrap();
        assert_eq!(dev.last_tare_ground_truth_mm(), Some(1234.0));
    }

    #[test]
    fn test_vendor_failure_propagates() {
        let mut dev = SimulatedDevice::new(SimulationSettings::default());
        dev.set_calibration_behavior(CalibrationBehavior::Fail {
            message: "scan failed".to_string(),
        });
        let err = run_calibration(&mut dev, RoutineKind::OnChip, "{}", &stream(), &CalibrationTimeouts::default())
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Device(DeviceError::Calibration(ref m)) if m == "scan failed"));
        assert!(!dev.is_streaming());
    }
}
