//! Sync verdicts

use crate::config::{DriftConfig, DriftThresholds};
use crate::drift::{AlignedPair, DriftAnalysis};
use crate::stats::{self, OffsetStats};
use depth_device::SyncMode;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// One pass/fail judgement with the value behind it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCheck {
    pub name: String,
    pub passed: bool,
    pub observed: f64,
    pub limit: f64,
    pub message: String,
}

impl SyncCheck {
    pub(crate) fn new(name: &str, passed: bool, observed: f64, limit: f64, message: String) -> Self {
        if passed {
            info!("[{}] {}", name, message);
        } else {
            error!("[{}] {}", name, message);
        }
        Self {
            name: name.to_string(),
            passed,
            observed,
            limit,
            message,
        }
    }

    fn below(name: &str, what: &str, observed: f64, limit: f64, unit: &str) -> Self {
        Self::new(
            name,
            observed < limit,
            observed,
            limit,
            format!("{} should be < {} {}, got {:.2} {}", what, limit, unit, observed, unit),
        )
    }

    fn above(name: &str, what: &str, observed: f64, limit: f64, unit: &str) -> Self {
        Self::new(
            name,
            observed > limit,
            observed,
            limit,
            format!("{} should be > {} {}, got {:.2} {}", what, limit, unit, observed, unit),
        )
    }
}

/// Judge a drift analysis against what `mode` should achieve.
///
/// Hardware-synced modes must show a small first-segment offset and drift;
/// free-running mode must show both clearly above the limits, proving the
/// measurement can tell the two apart. An analysis without a summary fails.
pub fn evaluate_mode(mode: SyncMode, analysis: &DriftAnalysis, thresholds: &DriftThresholds) -> Vec<SyncCheck> {
    let summary = match analysis.summary {
        Some(s) => s,
        None => {
            return vec![SyncCheck::new(
                "drift_summary",
                false,
                analysis.segments.len() as f64,
                2.0,
                format!("{:?}: need at least 2 usable segments, got {}", mode, analysis.segments.len()),
            )]
        }
    };

    match mode {
        SyncMode::Master | SyncMode::Slave => vec![
            SyncCheck::below(
                "master_slave_offset",
                "MASTER-SLAVE first segment offset",
                summary.first_offset_us,
                thresholds.master_slave_max_offset_us,
                "us",
            ),
            SyncCheck::below(
                "master_slave_drift",
                "MASTER-SLAVE drift rate",
                summary.drift_rate_us_per_min,
                thresholds.master_slave_max_drift_us_per_min,
                "us/min",
            ),
        ],
        SyncMode::Default => vec![
            SyncCheck::above(
                "default_offset",
                "DEFAULT first segment offset",
                summary.first_offset_us,
                thresholds.default_min_offset_us,
                "us",
            ),
            SyncCheck::above(
                "default_drift",
                "DEFAULT drift rate",
                summary.drift_rate_us_per_min,
                thresholds.default_min_drift_us_per_min,
                "us/min",
            ),
        ],
    }
}

/// Both devices must deliver enough frames for the window
pub fn check_frame_counts(
    master: usize,
    slave: usize,
    window: std::time::Duration,
    fps: u32,
    config: &DriftConfig,
) -> Vec<SyncCheck> {
    let expected = config.min_expected_frames(window, fps).max(config.min_frames);
    [("master_frames", "Master", master), ("slave_frames", "Slave", slave)]
        .into_iter()
        .map(|(name, who, count)| {
            SyncCheck::new(
                name,
                count >= expected,
                count as f64,
                expected as f64,
                format!("{} should receive at least {} frames, got {}", who, expected, count),
            )
        })
        .collect()
}

/// Offset figures for one frame rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FpsSyncResult {
    pub fps: u32,
    pub pairs: usize,
    pub median_offset_us: f64,
    pub stdev_us: f64,
    pub outliers_removed: usize,
    pub avg_match_quality_us: f64,
    pub max_match_quality_us: f64,
}

/// IQR-filtered median offset over all pairs of a run.
///
/// No match-quality filter is applied; pairing already bounded the
/// distance. `None` with fewer than `min_pairs` pairs.
pub fn analyze_fps_sync(fps: u32, pairs: &[AlignedPair], min_pairs: usize) -> Option<FpsSyncResult> {
    if pairs.len() < min_pairs {
        error!("{} fps: only {} aligned pairs (need {})", fps, pairs.len(), min_pairs);
        return None;
    }
    let offsets: Vec<f64> = pairs.iter().map(|p| p.offset_us()).collect();
    let qualities: Vec<f64> = pairs.iter().map(|p| p.match_quality_us).collect();
    let offset_stats = OffsetStats::compute(&offsets)?;

    let result = FpsSyncResult {
        fps,
        pairs: pairs.len(),
        median_offset_us: offset_stats.median,
        stdev_us: offset_stats.stdev,
        outliers_removed: offset_stats.outliers_removed,
        avg_match_quality_us: stats::mean(&qualities).unwrap_or(0.0),
        max_match_quality_us: qualities.iter().copied().fold(0.0, f64::max),
    };
    info!(
        "{} fps: median offset {:.2} us, stdev {:.2} us, match quality avg {:.2} us",
        fps, result.median_offset_us, result.stdev_us, result.avg_match_quality_us
    );
    Some(result)
}

pub fn evaluate_fps_sync(result: &FpsSyncResult, thresholds: &DriftThresholds) -> SyncCheck {
    SyncCheck::below(
        &format!("fps_{}_offset", result.fps),
        &format!("{} fps median offset", result.fps),
        result.median_offset_us,
        thresholds.fps_max_median_offset_us,
        "us",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::{DriftSummary, SegmentStats};
    use std::time::Duration;

    fn analysis(first: f64, rate: f64) -> DriftAnalysis {
        let seg = SegmentStats {
            index: 0,
            start_s: 0.0,
            end_s: 10.0,
            median_offset_us: first,
            stdev_us: 1.0,
            pairs_used: 300,
            poor_matches: 0,
            outliers_removed: 0,
        };
        DriftAnalysis {
            segments: vec![seg, seg],
            segment_drift_rates: vec![rate],
            summary: Some(DriftSummary {
                first_offset_us: first,
                last_offset_us: first,
                total_drift_us: rate,
                duration_s: 60.0,
                drift_rate_us_per_min: rate,
            }),
        }
    }

    #[test]
    fn test_master_slave_limits() {
        let t = DriftThresholds::default();
        assert!(evaluate_mode(SyncMode::Master, &analysis(3.0, 1.5), &t).iter().all(|c| c.passed));
        let checks = evaluate_mode(SyncMode::Slave, &analysis(25.0, 1.5), &t);
        assert!(!checks[0].passed);
        assert!(checks[1].passed);
    }

    #[test]
    fn test_default_mode_must_drift() {
        let t = DriftThresholds::default();
        assert!(evaluate_mode(SyncMode::Default, &analysis(4_000.0, 2_500.0), &t).iter().all(|c| c.passed));
        // A free-running pair that looks synced means the measurement is blind
        assert!(evaluate_mode(SyncMode::Default, &analysis(3.0, 1.0), &t).iter().all(|c| !c.passed));
    }

    #[test]
    fn test_missing_summary_fails() {
        let checks = evaluate_mode(SyncMode::Master, &DriftAnalysis::default(), &DriftThresholds::default());
        assert_eq!(checks.len(), 1);
        assert!(!checks[0].passed);
    }

    #[test]
    fn test_frame_count_floor() {
        let config = DriftConfig::default();
        let checks = check_frame_counts(2_700, 2_000, Duration::from_secs(90), 30, &config);
        assert!(checks[0].passed);
        assert!(!checks[1].passed);
        assert_eq!(checks[1].limit, 2025.0);

        // Short windows still need the absolute minimum
        let short = check_frame_counts(90, 90, Duration::from_secs(3), 30, &config);
        assert!(short.iter().all(|c| !c.passed && c.limit == 100.0));
    }

    #[test]
    fn test_fps_sync_median() {
        let pairs: Vec<AlignedPair> = (0..40)
            .map(|i| {
                let off = if i == 7 { 4_000.0 } else { 10.0 + (i % 5) as f64 };
                AlignedPair {
                    master_us: i as f64 * 16_666.0,
                    slave_us: 0.0,
                    slave_in_master_us: i as f64 * 16_666.0 + off,
                    match_quality_us: off,
                }
            })
            .collect();
        let result = analyze_fps_sync(60, &pairs, 10).unwrap();
        assert_eq!(result.pairs, 40);
        assert_eq!(result.outliers_removed, 1);
        assert_eq!(result.median_offset_us, 12.0);
        assert_eq!(result.max_match_quality_us, 4_000.0);
        assert!(evaluate_fps_sync(&result, &DriftThresholds::default()).passed);

        assert!(analyze_fps_sync(60, &pairs[..5], 10).is_none());
    }
}
