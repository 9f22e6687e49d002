//! Scenario configuration

use calib_table::{Axis, TableLayout};
use depth_device::{StreamConfig, TargetZRequest};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which vendor routine a scenario drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationKind {
    OnChip,
    Tare,
}

/// Average-depth sampling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthSampling {
    /// Maximum frames to sample
    pub frames: u32,
    /// Overall sampling budget
    pub timeout: Duration,
    /// Per-frame wait
    pub frame_timeout: Duration,
    /// Stop early once this many frames are in and `early_stop_after` has passed
    pub early_stop_frames: u32,
    pub early_stop_after: Duration,
    /// Meters per unit when the device cannot report its depth scale
    pub fallback_depth_scale: f64,
    /// Turn the projector on before sampling
    pub enable_emitter: bool,
}

impl Default for DepthSampling {
    fn default() -> Self {
        Self {
            frames: 10,
            timeout: Duration::from_secs(12),
            frame_timeout: Duration::from_secs(3),
            early_stop_frames: 5,
            early_stop_after: Duration::from_millis(1500),
            fallback_depth_scale: 0.001,
            enable_emitter: true,
        }
    }
}

/// Budgets for vendor calibration calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationTimeouts {
    pub on_chip: Duration,
    pub tare: Duration,
    /// Per-frame budget in host-assisted mode
    pub frame_processing: Duration,
    /// Total budget for the host-assisted frame loop
    pub host_assist: Duration,
    /// Wait for the first frame after the stream starts
    pub first_frame: Duration,
}

impl Default for CalibrationTimeouts {
    fn default() -> Self {
        Self {
            on_chip: Duration::from_millis(30_000),
            tare: Duration::from_millis(10_000),
            frame_processing: Duration::from_millis(5_000),
            host_assist: Duration::from_secs(90),
            first_frame: Duration::from_secs(5),
        }
    }
}

/// Larger perturbation used when the target is close
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShortRangeCorrection {
    /// Applies when the target distance is below this (mm)
    pub below_mm: f64,
    pub pixel_correction_px: f64,
}

/// Perturb-calibrate-verify scenario settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub kind: CalibrationKind,
    /// Right-eye axis that gets perturbed and checked
    pub axis: Axis,
    pub pixel_correction_px: f64,
    pub short_range: Option<ShortRangeCorrection>,
    /// Allowed mismatch between requested and observed perturbation (px)
    pub perturbation_epsilon_px: f64,
    /// Calibration must move the axis by more than this (px)
    pub min_change_px: f64,
    /// Slack on the closer-to-base comparison (px)
    pub reversion_epsilon_px: f64,
    /// Maximum |health factor| after the perturbation
    pub health_threshold: f64,
    /// Post-calibration depth may be this much further from ground truth (mm)
    pub depth_tolerance_mm: f64,
    /// Calibration attempts while depth fails to converge
    pub max_calibration_attempts: u32,
    pub host_assistance: bool,
    /// Known scene distance (mm); derived when absent
    pub ground_truth_mm: Option<f64>,
    /// JSON parameter file overriding the defaults
    pub params_file: Option<PathBuf>,
    pub stream: StreamConfig,
    pub host_assisted_stream: StreamConfig,
    pub depth: DepthSampling,
    pub timeouts: CalibrationTimeouts,
    /// Tare target-distance estimate
    pub target: TargetZRequest,
    pub target_z_min_mm: f64,
    pub target_z_max_mm: f64,
    /// Overrides the layout from capability discovery
    pub layout: Option<TableLayout>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self::on_chip()
    }
}

impl ScenarioConfig {
    /// OCC: perturb ppy by -1 px
    pub fn on_chip() -> Self {
        Self {
            kind: CalibrationKind::OnChip,
            axis: Axis::Ppy,
            pixel_correction_px: -1.0,
            short_range: None,
            perturbation_epsilon_px: 0.1,
            min_change_px: 0.001,
            reversion_epsilon_px: 0.1,
            health_threshold: 2.0,
            depth_tolerance_mm: 50.0,
            max_calibration_attempts: 1,
            host_assistance: false,
            ground_truth_mm: None,
            params_file: None,
            stream: StreamConfig::depth(256, 144, 90),
            host_assisted_stream: StreamConfig::depth(1280, 720, 30),
            depth: DepthSampling::default(),
            timeouts: CalibrationTimeouts::default(),
            target: TargetZRequest::default(),
            target_z_min_mm: 600.0,
            target_z_max_mm: 1500.0,
            layout: None,
        }
    }

    /// Tare: perturb ppx by -0.8 px (-3 px under 1.3 m)
    pub fn tare() -> Self {
        Self {
            kind: CalibrationKind::Tare,
            axis: Axis::Ppx,
            pixel_correction_px: -0.8,
            short_range: Some(ShortRangeCorrection {
                below_mm: 1300.0,
                pixel_correction_px: -3.0,
            }),
            perturbation_epsilon_px: 0.001,
            reversion_epsilon_px: 0.5,
            depth_tolerance_mm: 0.0,
            ..Self::on_chip()
        }
    }

    /// Perturbation for a target at `target_mm`
    pub fn correction_for(&self, target_mm: Option<f64>) -> f64 {
        match (self.short_range, target_mm) {
            (Some(short), Some(z)) if z < short.below_mm => short.pixel_correction_px,
            _ => self.pixel_correction_px,
        }
    }

    /// Stream used while calibrating
    pub fn calibration_stream(&self, host_assistance: bool) -> StreamConfig {
        if host_assistance {
            self.host_assisted_stream
        } else {
            self.stream
        }
    }

    /// Scenario name for reports
    pub fn name(&self) -> &'static str {
        match self.kind {
            CalibrationKind::OnChip => "occ_perturbation",
            CalibrationKind::Tare => "tare_perturbation",
        }
    }
}

/// Plain OCC run without perturbation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub iterations: u32,
    /// Lab threshold; a well-placed camera should reach 0.25
    pub health_threshold: f64,
    pub host_assistance: bool,
    pub params_file: Option<PathBuf>,
    pub stream: StreamConfig,
    pub host_assisted_stream: StreamConfig,
    pub timeouts: CalibrationTimeouts,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            iterations: 1,
            health_threshold: 1.5,
            host_assistance: false,
            params_file: None,
            stream: StreamConfig::depth(256, 144, 90),
            host_assisted_stream: StreamConfig::depth(1280, 720, 30),
            timeouts: CalibrationTimeouts::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tare_short_range_correction() {
        let tare = ScenarioConfig::tare();
        assert_eq!(tare.correction_for(Some(1000.0)), -3.0);
        assert_eq!(tare.correction_for(Some(1400.0)), -0.8);
        assert_eq!(tare.correction_for(None), -0.8);
        assert_eq!(ScenarioConfig::on_chip().correction_for(Some(500.0)), -1.0);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let cfg: ScenarioConfig =
            serde_json::from_str(r#"{"max_calibration_attempts": 2, "axis": "ppx"}"#).unwrap();
        assert_eq!(cfg.max_calibration_attempts, 2);
        assert_eq!(cfg.axis, Axis::Ppx);
        assert_eq!(cfg.kind, CalibrationKind::OnChip);
        assert_eq!(cfg.depth.frames, 10);
    }
}
