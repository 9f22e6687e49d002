//! Depth/color timestamp agreement on one device

use crate::config::IntraSyncConfig;
use crate::pairing::pair_nearest;
use crate::stats;
use crate::verdict::SyncCheck;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Host-domain frame time (ms) and frame number of one stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamTimestamp {
    pub global_ms: f64,
    pub frame_number: u64,
}

/// Gap statistics between depth frames and their nearest color frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapAnalysis {
    pub pairs: usize,
    pub synced_pairs: usize,
    pub max_gap_ms: f64,
    pub mean_gap_ms: f64,
    /// Sorted gap at index `floor(n * 0.95)`
    pub p95_gap_ms: f64,
    pub sync_percentage: f64,
}

/// Pair every depth frame with the nearest color frame; `None` if either
/// stream is empty
pub fn analyze_gaps(depth_ms: &[f64], color_ms: &[f64], threshold_ms: f64) -> Option<GapAnalysis> {
    if depth_ms.is_empty() || color_ms.is_empty() {
        return None;
    }
    let gaps: Vec<f64> = pair_nearest(depth_ms, color_ms, f64::INFINITY)
        .iter()
        .map(|p| p.distance)
        .collect();
    let synced = gaps.iter().filter(|&&g| g <= threshold_ms).count();

    Some(GapAnalysis {
        pairs: gaps.len(),
        synced_pairs: synced,
        max_gap_ms: gaps.iter().copied().fold(0.0, f64::max),
        mean_gap_ms: stats::mean(&gaps).unwrap_or(0.0),
        p95_gap_ms: stats::percentile(&gaps, 0.95).unwrap_or(0.0),
        sync_percentage: synced as f64 / gaps.len() as f64 * 100.0,
    })
}

/// Steps between consecutive frame numbers other than +1
pub fn count_discontinuities(frame_numbers: &[u64]) -> usize {
    frame_numbers.windows(2).filter(|w| w[1] != w[0].wrapping_add(1)).count()
}

/// Frame counts, gap statistics and continuity for one collection
pub fn evaluate_intra(
    depth: &[StreamTimestamp],
    color: &[StreamTimestamp],
    config: &IntraSyncConfig,
) -> (Option<GapAnalysis>, Vec<SyncCheck>) {
    let mut checks = Vec::new();
    let window_s = config.window.as_secs_f64();

    for (name, stream, fps) in [("depth", depth, config.depth.fps), ("color", color, config.color.fps)] {
        let expected = (window_s * fps as f64 * config.min_frame_ratio) as usize;
        checks.push(SyncCheck::new(
            &format!("{}_frames", name),
            stream.len() >= expected,
            stream.len() as f64,
            expected as f64,
            format!("{} frames: got {}, need at least {}", name, stream.len(), expected),
        ));
    }

    let depth_ms: Vec<f64> = depth.iter().map(|t| t.global_ms).collect();
    let color_ms: Vec<f64> = color.iter().map(|t| t.global_ms).collect();
    let analysis = analyze_gaps(&depth_ms, &color_ms, config.gap_threshold_ms);

    match &analysis {
        Some(a) => {
            info!("Timestamp sync analysis:");
            info!("  Max gap: {:.3} ms", a.max_gap_ms);
            info!("  95th percentile gap: {:.3} ms", a.p95_gap_ms);
            info!("  Mean gap: {:.3} ms", a.mean_gap_ms);
            info!("  Sync percentage: {:.1}%", a.sync_percentage);
            if a.max_gap_ms > config.gap_threshold_ms {
                warn!(
                    "Max gap {:.3} ms exceeds {} ms (p95 is the pass criterion)",
                    a.max_gap_ms, config.gap_threshold_ms
                );
            }
            checks.push(SyncCheck::new(
                "p95_gap",
                a.p95_gap_ms <= config.gap_threshold_ms,
                a.p95_gap_ms,
                config.gap_threshold_ms,
                format!("95th percentile gap {:.3} ms (limit {} ms)", a.p95_gap_ms, config.gap_threshold_ms),
            ));
            checks.push(SyncCheck::new(
                "sync_percentage",
                a.sync_percentage >= config.min_sync_percentage,
                a.sync_percentage,
                config.min_sync_percentage,
                format!("synchronization {:.1}% (need {}%)", a.sync_percentage, config.min_sync_percentage),
            ));
        }
        None => checks.push(SyncCheck::new(
            "gap_analysis",
            false,
            0.0,
            0.0,
            "no frames collected".to_string(),
        )),
    }

    for (name, stream) in [("depth", depth), ("color", color)] {
        let numbers: Vec<u64> = stream.iter().map(|t| t.frame_number).collect();
        let drops = count_discontinuities(&numbers);
        let allowed = numbers.len() as f64 * config.max_drop_ratio;
        checks.push(SyncCheck::new(
            &format!("{}_continuity", name),
            drops as f64 <= allowed,
            drops as f64,
            allowed,
            format!("{} frame continuity: {} drops in {} frames", name, drops, numbers.len()),
        ));
    }

    (analysis, checks)
}
