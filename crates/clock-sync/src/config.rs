//! Sync analysis configuration

use crate::error::SyncError;
use depth_device::StreamConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shortest drift segment the analysis will cut
pub const MIN_SEGMENT_DURATION: Duration = Duration::from_millis(100);

/// Two-device calibration and drift measurement settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Depth profile streamed on both devices
    pub stream: StreamConfig,
    /// Frames in this initial window are discarded
    pub settle: Duration,
    pub calibration_window: Duration,
    pub measurement_window: Duration,
    /// Host-clock pairing distance during calibration (µs)
    pub calibration_pair_threshold_us: f64,
    pub min_calibration_samples: usize,
    pub min_calibration_pairs: usize,
    /// Hardware-clock pairing distance as a fraction of the frame interval
    pub pair_threshold_ratio: f64,
    /// Pairs matched further apart than this are left out of segment stats (µs)
    pub match_quality_threshold_us: f64,
    pub segment_duration: Duration,
    /// Each device must deliver this share of `window * fps` frames
    pub min_frame_ratio: f64,
    /// Drift analysis needs at least this many frames per device
    pub min_frames: usize,
    /// Frame rates swept by the per-FPS check
    pub fps_rates: Vec<u32>,
    /// Collection window per frame rate
    pub fps_window: Duration,
    /// Minimum pairs for a per-FPS sync figure
    pub min_fps_pairs: usize,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::depth(640, 480, 30),
            settle: Duration::from_secs(1),
            calibration_window: Duration::from_secs(5),
            measurement_window: Duration::from_secs(90),
            calibration_pair_threshold_us: 33_333.0,
            min_calibration_samples: 10,
            min_calibration_pairs: 10,
            pair_threshold_ratio: 0.3,
            match_quality_threshold_us: 10_000.0,
            segment_duration: Duration::from_secs(10),
            min_frame_ratio: 0.75,
            min_frames: 100,
            fps_rates: vec![15, 30, 60, 90],
            fps_window: Duration::from_secs(10),
            min_fps_pairs: 10,
        }
    }
}

impl DriftConfig {
    /// Pairing distance for the measurement phase at `stream`'s rate (µs)
    pub fn pair_threshold_us(&self, stream: &StreamConfig) -> f64 {
        stream.frame_interval_us() * self.pair_threshold_ratio
    }

    /// Minimum frame count per device for a window at `fps`
    pub fn min_expected_frames(&self, window: Duration, fps: u32) -> usize {
        (window.as_secs_f64() * fps as f64 * self.min_frame_ratio) as usize
    }

    /// Reject settings the analysis cannot work with
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.segment_duration < MIN_SEGMENT_DURATION {
            return Err(SyncError::InvalidConfig(format!(
                "segment_duration {:?} is below {:?}",
                self.segment_duration, MIN_SEGMENT_DURATION
            )));
        }
        if self.stream.fps == 0 || self.fps_rates.contains(&0) {
            return Err(SyncError::InvalidConfig("frame rates must be positive".to_string()));
        }
        if !(self.pair_threshold_ratio > 0.0) {
            return Err(SyncError::InvalidConfig(format!(
                "pair_threshold_ratio must be positive, got {}",
                self.pair_threshold_ratio
            )));
        }
        Ok(())
    }
}

/// Pass/fail limits for sync verdicts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftThresholds {
    /// MASTER-SLAVE: first-segment offset must stay below (µs)
    pub master_slave_max_offset_us: f64,
    /// MASTER-SLAVE: drift rate must stay below (µs/min)
    pub master_slave_max_drift_us_per_min: f64,
    /// DEFAULT: first-segment offset must exceed (µs)
    pub default_min_offset_us: f64,
    /// DEFAULT: drift rate must exceed (µs/min)
    pub default_min_drift_us_per_min: f64,
    /// Per-FPS median offset limit (µs)
    pub fps_max_median_offset_us: f64,
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self {
            master_slave_max_offset_us: 20.0,
            master_slave_max_drift_us_per_min: 20.0,
            default_min_offset_us: 100.0,
            default_min_drift_us_per_min: 100.0,
            fps_max_median_offset_us: 50.0,
        }
    }
}

/// Depth/color timestamp agreement on a single device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntraSyncConfig {
    pub depth: StreamConfig,
    pub color: StreamConfig,
    pub settle: Duration,
    pub window: Duration,
    /// Pairs within this gap count as synchronized (ms)
    pub gap_threshold_ms: f64,
    /// Required share of synchronized pairs (percent)
    pub min_sync_percentage: f64,
    /// Each stream must deliver this share of `window * fps` frames
    pub min_frame_ratio: f64,
    /// Tolerated share of frame-number discontinuities
    pub max_drop_ratio: f64,
}

impl Default for IntraSyncConfig {
    fn default() -> Self {
        Self {
            depth: StreamConfig::depth(640, 480, 30),
            color: StreamConfig::color(640, 480, 30),
            settle: Duration::from_secs(2),
            window: Duration::from_secs(5),
            gap_threshold_ms: 3.0,
            min_sync_percentage: 95.0,
            min_frame_ratio: 0.8,
            max_drop_ratio: 0.05,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_threshold_at_30_fps() {
        let config = DriftConfig::default();
        let t = config.pair_threshold_us(&config.stream);
        assert!((t - 10_000.0).abs() < 1e-6);
        assert_eq!(config.min_expected_frames(Duration::from_secs(90), 30), 2025);
    }

    #[test]
    fn test_validate_rejects_tiny_segments() {
        assert!(DriftConfig::default().validate().is_ok());
        let config = DriftConfig {
            segment_duration: Duration::from_micros(1),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
        let config = DriftConfig {
            fps_rates: vec![30, 0],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_overrides() {
        let config: DriftConfig = serde_json::from_str(r#"{"min_frames": 20}"#).unwrap();
        assert_eq!(config.min_frames, 20);
        assert_eq!(config.segment_duration, Duration::from_secs(10));
    }
}
