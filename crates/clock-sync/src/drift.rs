//! Drift measurement and segment analysis
//!
//! Slave timestamps are mapped into the master's domain with the
//! calibration, paired on hardware time and turned into per-pair absolute
//! offsets. The run is then cut into fixed-length segments on the master
//! clock; each segment is summarised by its outlier-filtered median offset.

use crate::config::{DriftConfig, MIN_SEGMENT_DURATION};
use crate::pairing::pair_nearest;
use crate::regression::DriftCalibration;
use crate::stats::OffsetStats;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// One master frame and the slave frame matched to it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignedPair {
    pub master_us: f64,
    /// Raw slave hardware timestamp
    pub slave_us: f64,
    /// Slave timestamp in the master's domain
    pub slave_in_master_us: f64,
    /// Pairing distance; equal to the offset but kept for filtering
    pub match_quality_us: f64,
}

impl AlignedPair {
    /// |master - slave in master domain|
    pub fn offset_us(&self) -> f64 {
        (self.master_us - self.slave_in_master_us).abs()
    }
}

/// Pair master and slave hardware timestamps after mapping the slave into
/// the master's domain
pub fn align_measurement(
    master_us: &[f64],
    slave_us: &[f64],
    calibration: &DriftCalibration,
    threshold_us: f64,
) -> Vec<AlignedPair> {
    let transformed: Vec<f64> = slave_us.iter().map(|&s| calibration.to_master(s)).collect();
    let pairs: Vec<AlignedPair> = pair_nearest(master_us, &transformed, threshold_us)
        .into_iter()
        .map(|p| AlignedPair {
            master_us: master_us[p.reference_index],
            slave_us: slave_us[p.candidate_index],
            slave_in_master_us: transformed[p.candidate_index],
            match_quality_us: p.distance,
        })
        .collect();

    info!(
        "Aligned {} frame pairs (master={}, slave={})",
        pairs.len(),
        master_us.len(),
        slave_us.len()
    );
    pairs
}

/// Summary of one time segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentStats {
    pub index: usize,
    /// Segment start relative to the first pair (s)
    pub start_s: f64,
    pub end_s: f64,
    /// Median |offset| after quality and IQR filtering (µs)
    pub median_offset_us: f64,
    pub stdev_us: f64,
    pub pairs_used: usize,
    /// Pairs dropped for poor match quality
    pub poor_matches: usize,
    pub outliers_removed: usize,
}

/// First-to-last segment drift
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftSummary {
    pub first_offset_us: f64,
    pub last_offset_us: f64,
    pub total_drift_us: f64,
    /// Master-clock span of the aligned pairs (s)
    pub duration_s: f64,
    pub drift_rate_us_per_min: f64,
}

/// Segmented drift analysis of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftAnalysis {
    /// Segments that kept at least one pair
    pub segments: Vec<SegmentStats>,
    /// Drift rate of each later segment against the first (µs/min)
    pub segment_drift_rates: Vec<f64>,
    /// `None` with fewer than two usable segments
    pub summary: Option<DriftSummary>,
}

impl DriftAnalysis {
    pub fn first_offset_us(&self) -> Option<f64> {
        self.segments.first().map(|s| s.median_offset_us)
    }
}

/// Cut `pairs` into segments of `config.segment_duration` on the master
/// clock and summarise each.
///
/// The segment count is the run span divided by the segment duration,
/// rounded; pairs past the last boundary fall into the last segment.
/// Durations under [`MIN_SEGMENT_DURATION`] are raised to it, and there are
/// never more segments than pairs.
pub fn analyze_drift(pairs: &[AlignedPair], config: &DriftConfig) -> DriftAnalysis {
    let segment = config.segment_duration.max(MIN_SEGMENT_DURATION);
    if segment != config.segment_duration {
        warn!(
            "Segment duration {:?} below {:?}; using the minimum",
            config.segment_duration, MIN_SEGMENT_DURATION
        );
    }
    let seg_s = segment.as_secs_f64();
    let seg_us = seg_s * 1e6;
    let (first, last) = match (pairs.first(), pairs.last()) {
        (Some(f), Some(l)) => (f.master_us, l.master_us),
        _ => return DriftAnalysis::default(),
    };
    let span_us = (last - first).max(0.0);
    let num_segments = ((span_us / seg_us).round() as usize).clamp(1, pairs.len());

    let mut buckets: Vec<Vec<&AlignedPair>> = vec![Vec::new(); num_segments];
    for pair in pairs {
        let k = (((pair.master_us - first) / seg_us).floor().max(0.0) as usize).min(num_segments - 1);
        buckets[k].push(pair);
    }

    info!("Drift analysis over {} segments:", num_segments);
    let mut segments: Vec<SegmentStats> = Vec::new();
    let mut segment_drift_rates = Vec::new();

    for (k, bucket) in buckets.iter().enumerate() {
        let offsets: Vec<f64> = bucket
            .iter()
            .filter(|p| p.match_quality_us <= config.match_quality_threshold_us)
            .map(|p| p.offset_us())
            .collect();
        let poor_matches = bucket.len() - offsets.len();
        let stats = match OffsetStats::compute(&offsets) {
            Some(s) => s,
            None => {
                debug!("  Segment {} has no usable pairs", k + 1);
                continue;
            }
        };

        let segment = SegmentStats {
            index: k,
            start_s: k as f64 * seg_s,
            end_s: (k + 1) as f64 * seg_s,
            median_offset_us: stats.median,
            stdev_us: stats.stdev,
            pairs_used: stats.count,
            poor_matches,
            outliers_removed: stats.outliers_removed,
        };
        info!(
            "  Segment {} ({:.0}-{:.0}s): hw_ts_offset={:.2} us, stdev={:.2} us",
            k + 1,
            segment.start_s,
            segment.end_s,
            segment.median_offset_us,
            segment.stdev_us
        );

        if let Some(base) = segments.first().map(|s| s.median_offset_us) {
            let elapsed_s = (k + 1) as f64 * seg_s;
            segment_drift_rates.push((stats.median - base).abs() / elapsed_s * 60.0);
        }
        segments.push(segment);
    }

    let summary = summarize(&segments, span_us / 1e6);
    DriftAnalysis {
        segments,
        segment_drift_rates,
        summary,
    }
}

fn summarize(segments: &[SegmentStats], duration_s: f64) -> Option<DriftSummary> {
    if segments.len() < 2 || duration_s <= 0.0 {
        return None;
    }
    let first = segments[0].median_offset_us;
    let last = segments[segments.len() - 1].median_offset_us;
    let total = (last - first).abs();
    let summary = DriftSummary {
        first_offset_us: first,
        last_offset_us: last,
        total_drift_us: total,
        duration_s,
        drift_rate_us_per_min: total / duration_s * 60.0,
    };
    info!("Drift summary:");
    info!("  First segment HW timestamp offset: {:.2} us", first);
    info!("  Last segment HW timestamp offset: {:.2} us", last);
    info!("  Total drift: {:.2} us over {:.0}s", total, duration_s);
    info!("  Drift rate: {:.2} us/minute", summary.drift_rate_us_per_min);
    Some(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn identity() -> DriftCalibration {
        DriftCalibration {
            slope: 1.0,
            offset_us: 0.0,
            r_squared: 1.0,
            pairs: 0,
        }
    }

    fn config(segment_s: u64) -> DriftConfig {
        DriftConfig {
            segment_duration: Duration::from_secs(segment_s),
            ..Default::default()
        }
    }

    /// 30 fps pairs whose offset grows linearly by `drift_per_s` µs
    fn drifting_pairs(seconds: f64, base: f64, drift_per_s: f64) -> Vec<AlignedPair> {
        let n = (seconds * 30.0) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 * 33_333.333;
                let offset = base + drift_per_s * t / 1e6;
                AlignedPair {
                    master_us: t,
                    slave_us: t + offset,
                    slave_in_master_us: t + offset,
                    match_quality_us: offset,
                }
            })
            .collect()
    }

    #[test]
    fn test_align_maps_into_master_domain() {
        let cal = DriftCalibration {
            slope: 1.001,
            offset_us: 5_000.0,
            r_squared: 1.0,
            pairs: 10,
        };
        let master: Vec<f64> = (0..10).map(|i| i as f64 * 33_333.0).collect();
        let slave: Vec<f64> = master.iter().map(|m| cal.to_slave(*m + 3.0)).collect();
        let pairs = align_measurement(&master, &slave, &cal, 10_000.0);
        assert_eq!(pairs.len(), 10);
        for p in &pairs {
            assert!((p.offset_us() - 3.0).abs() < 1e-6);
            assert!((p.match_quality_us - 3.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_align_drops_distant_frames() {
        let master = [0.0, 33_333.0, 66_666.0];
        let slave = [20.0, 33_340.0, 66_666.0 + 15_000.0];
        let pairs = align_measurement(&master, &slave, &identity(), 10_000.0);
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn test_stable_offset_has_no_drift() {
        let analysis = analyze_drift(&drifting_pairs(30.0, 5.0, 0.0), &config(10));
        assert_eq!(analysis.segments.len(), 3);
        let summary = analysis.summary.unwrap();
        assert!((summary.first_offset_us - 5.0).abs() < 1e-9);
        assert!(summary.drift_rate_us_per_min < 1e-6);
        assert_eq!(analysis.segment_drift_rates.len(), 2);
    }

    #[test]
    fn test_linear_drift_rate() {
        // 10 us/s is 600 us/min
        let analysis = analyze_drift(&drifting_pairs(60.0, 200.0, 10.0), &config(10));
        assert_eq!(analysis.segments.len(), 6);
        let summary = analysis.summary.unwrap();
        // Segment medians sit at 5 s and 55 s; span is just under 60 s
        assert!((summary.total_drift_us - 500.0).abs() < 1.0);
        assert!((summary.drift_rate_us_per_min - 500.0).abs() < 2.0);
        // Second segment: |350 - 250| / 20 s * 60
        assert!((analysis.segment_drift_rates[0] - 300.0).abs() < 1.0);
    }

    #[test]
    fn test_poor_matches_excluded() {
        let mut pairs = drifting_pairs(20.0, 5.0, 0.0);
        for p in pairs.iter_mut().step_by(3) {
            p.slave_in_master_us = p.master_us + 12_000.0;
            p.match_quality_us = 12_000.0;
        }
        let analysis = analyze_drift(&pairs, &config(10));
        let seg = analysis.segments[0];
        assert!(seg.poor_matches > 0);
        assert!((seg.median_offset_us - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_tiny_segment_duration_is_bounded() {
        let config = DriftConfig {
            segment_duration: Duration::from_nanos(1),
            ..Default::default()
        };
        // 60 pairs over ~2 s cut at the 100 ms floor
        let analysis = analyze_drift(&drifting_pairs(2.0, 5.0, 0.0), &config);
        assert_eq!(analysis.segments.len(), 20);
        assert!((analysis.segments[1].start_s - 0.1).abs() < 1e-9);

        // Never more segments than pairs
        let sparse: Vec<AlignedPair> = drifting_pairs(30.0, 5.0, 0.0).into_iter().step_by(300).collect();
        assert_eq!(sparse.len(), 3);
        let analysis = analyze_drift(&sparse, &config);
        assert!(analysis.segments.len() <= 3);
    }

    #[test]
    fn test_single_segment_has_no_summary() {
        let analysis = analyze_drift(&drifting_pairs(8.0, 5.0, 0.0), &config(10));
        assert_eq!(analysis.segments.len(), 1);
        assert!(analysis.summary.is_none());
        assert_eq!(analysis.first_offset_us(), Some(5.0));
        assert!(analyze_drift(&[], &config(10)).segments.is_empty());
    }
}
