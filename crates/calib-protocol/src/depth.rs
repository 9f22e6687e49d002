//! Average depth measurement

use crate::config::DepthSampling;
use depth_device::{poll_until, DepthDevice, DeviceOption, StreamConfig, StreamKind, WaitError, WaitPolicy};
use std::time::Instant;
use tracing::{debug, warn};

/// Mean depth in meters over all valid (non-zero) pixels of up to
/// `sampling.frames` frames.
///
/// Starts and stops the stream itself. Returns `None` when no valid pixel was
/// seen or the stream could not be started.
pub fn measure_average_depth<D>(
    device: &mut D,
    stream: &StreamConfig,
    sampling: &DepthSampling,
) -> Option<f64>
where
    D: DepthDevice + ?Sized,
{
    if let Err(e) = device.start_stream(stream) {
        warn!("measure_average_depth failed to start stream: {}", e);
        return None;
    }

    // Best effort; some families lock or lack these options
    if sampling.enable_emitter && device.supports_option(DeviceOption::EmitterEnabled) {
        if let Err(e) = device.set_option(DeviceOption::EmitterEnabled, 1.0) {
            debug!("Could not enable emitter: {}", e);
        }
    }
    if device.supports_option(DeviceOption::ThermalCompensation) {
        if let Err(e) = device.set_option(DeviceOption::ThermalCompensation, 0.0) {
            debug!("Could not disable thermal compensation: {}", e);
        }
    }
    let depth_scale = match device.depth_scale() {
        Ok(scale) => scale as f64,
        Err(_) => sampling.fallback_depth_scale,
    };

    let start = Instant::now();
    let mut collected = 0u32;
    let mut valid_sum = 0u64;
    let mut valid_count = 0usize;

    let policy = WaitPolicy::busy(sampling.timeout);
    let outcome = poll_until(&policy, || {
        let frame = match device.wait_for_frame(sampling.frame_timeout) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Depth frame wait failed: {}", e);
                return Ok::<_, ()>(None);
            }
        };
        if frame.stream != StreamKind::Depth || frame.data.is_empty() {
            return Ok(None);
        }

        let (sum, count) = frame.valid_samples();
        valid_sum += sum;
        valid_count += count;
        collected += 1;

        let early = collected >= sampling.early_stop_frames && start.elapsed() > sampling.early_stop_after;
        Ok((collected >= sampling.frames || early).then_some(()))
    });

    if let Err(WaitError::Timeout { elapsed, .. }) = outcome {
        debug!(
            "Depth sampling stopped after {:?} with {}/{} frames",
            elapsed, collected, sampling.frames
        );
    }
    if let Err(e) = device.stop_stream() {
        warn!("Failed to stop depth stream: {}", e);
    }

    if valid_count == 0 {
        return None;
    }
    Some(valid_sum as f64 * depth_scale / valid_count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use depth_device::{SimulatedDevice, SimulationSettings};
    use std::time::Duration;

    fn fast_sampling() -> DepthSampling {
        DepthSampling {
            frames: 3,
            timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    #[test]
    fn test_average_depth_in_meters() {
        let mut dev = SimulatedDevice::new(SimulationSettings::default());
        let depth = measure_average_depth(&mut dev, &StreamConfig::depth(16, 8, 90), &fast_sampling()).unwrap();
        assert!((depth - 1.0).abs() < 1e-6);
        assert!(!dev.is_streaming());
    }

    #[test]
    fn test_fallback_depth_scale() {
        let settings = SimulationSettings {
            depth_scale: None,
            ..Default::default()
        };
        let mut dev = SimulatedDevice::new(settings);
        let depth = measure_average_depth(&mut dev, &StreamConfig::depth(16, 8, 90), &fast_sampling()).unwrap();
        assert!((depth - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dark_scene_returns_none() {
        let mut dev = SimulatedDevice::new(SimulationSettings::default());
        dev.set_dark(true);
        assert!(measure_average_depth(&mut dev, &StreamConfig::depth(16, 8, 90), &fast_sampling()).is_none());
    }

    #[test]
    fn test_stalled_stream_returns_none() {
        let mut dev = SimulatedDevice::new(SimulationSettings::default());
        dev.set_stalled(true);
        let sampling = DepthSampling {
            timeout: Duration::from_millis(100),
            frame_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        assert!(measure_average_depth(&mut dev, &StreamConfig::depth(16, 8, 90), &sampling).is_none());
        assert!(!dev.is_streaming());
    }
}
