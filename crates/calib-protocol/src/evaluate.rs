//! Scenario checks
//!
//! Every check yields a `Check` carrying the observed and expected values so
//! a report explains itself. Checks that depend on a measurement the camera
//! could not provide come back `Skipped` rather than `Fail`.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckOutcome {
    Pass,
    Fail,
    Skipped,
}

/// Result of one assertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    pub outcome: CheckOutcome,
    pub observed: Option<f64>,
    pub expected: Option<f64>,
    pub message: String,
}

impl Check {
    fn new(
        name: &str,
        outcome: CheckOutcome,
        observed: Option<f64>,
        expected: Option<f64>,
        message: String,
    ) -> Self {
        match outcome {
            CheckOutcome::Pass => info!("[{}] {}", name, message),
            CheckOutcome::Fail => error!("[{}] {}", name, message),
            CheckOutcome::Skipped => warn!("[{}] skipped: {}", name, message),
        }
        Self {
            name: name.to_string(),
            outcome,
            observed,
            expected,
            message,
        }
    }

    pub fn pass(name: &str, observed: Option<f64>, expected: Option<f64>, message: String) -> Self {
        Self::new(name, CheckOutcome::Pass, observed, expected, message)
    }

    pub fn fail(name: &str, observed: Option<f64>, expected: Option<f64>, message: String) -> Self {
        Self::new(name, CheckOutcome::Fail, observed, expected, message)
    }

    pub fn skipped(name: &str, message: String) -> Self {
        Self::new(name, CheckOutcome::Skipped, None, None, message)
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == CheckOutcome::Fail
    }
}

/// The vendor routine must return a table with |health| under `threshold`
pub fn check_health(health_factor: Option<f64>, threshold: f64) -> Check {
    match health_factor {
        Some(hf) if hf.abs() < threshold => Check::pass(
            "health_factor",
            Some(hf),
            Some(threshold),
            format!("health factor {:+.4} within {}", hf, threshold),
        ),
        Some(hf) => Check::fail(
            "health_factor",
            Some(hf),
            Some(threshold),
            format!(
                "health factor out of threshold (hf={:+.4}, threshold={})",
                hf, threshold
            ),
        ),
        None => Check::fail(
            "health_factor",
            None,
            Some(threshold),
            "calibration produced no health factor".to_string(),
        ),
    }
}

/// Observed axis after the perturbation must match the requested value
pub fn check_perturbation(expected_px: f64, observed_px: f64, epsilon_px: f64) -> Check {
    let delta = (observed_px - expected_px).abs();
    if delta > epsilon_px {
        Check::fail(
            "perturbation",
            Some(observed_px),
            Some(expected_px),
            format!(
                "modification mismatch: expected {:.6} got {:.6} (delta {:.6} > {})",
                expected_px, observed_px, delta, epsilon_px
            ),
        )
    } else {
        Check::pass(
            "perturbation",
            Some(observed_px),
            Some(expected_px),
            format!("modification applied: {:.6} (delta {:.6})", observed_px, delta),
        )
    }
}

/// Calibration must move the axis, and end no closer to the perturbed value
/// than to the original one.
pub fn check_reversion(
    base_px: f64,
    modified_px: f64,
    final_px: f64,
    min_change_px: f64,
    epsilon_px: f64,
) -> Check {
    let dist_from_base = (final_px - base_px).abs();
    let dist_from_modified = (final_px - modified_px).abs();
    info!(
        "  distances: from_base={:.6} from_modified={:.6}",
        dist_from_base, dist_from_modified
    );

    if dist_from_modified <= min_change_px {
        Check::fail(
            "reversion",
            Some(final_px),
            Some(base_px),
            format!(
                "principal point unchanged by calibration ({:.6} vs modified {:.6}, min change {})",
                final_px, modified_px, min_change_px
            ),
        )
    } else if dist_from_modified + epsilon_px <= dist_from_base {
        Check::fail(
            "reversion",
            Some(final_px),
            Some(base_px),
            format!(
                "did not revert toward base: from_base={:.6} from_modified={:.6}",
                dist_from_base, dist_from_modified
            ),
        )
    } else {
        Check::pass(
            "reversion",
            Some(final_px),
            Some(base_px),
            format!("reverted toward base (from_base={:.6})", dist_from_base),
        )
    }
}

/// Post-calibration depth must be no further from ground truth than the
/// perturbed depth, plus `tolerance_mm`.
pub fn check_depth_convergence(
    ground_truth_mm: Option<f64>,
    modified_mm: Option<f64>,
    post_mm: Option<f64>,
    tolerance_mm: f64,
) -> Check {
    let (gt, modified, post) = match (ground_truth_mm, modified_mm, post_mm) {
        (Some(gt), Some(m), Some(p)) => (gt, m, p),
        _ => {
            return Check::skipped(
                "depth_convergence",
                format!(
                    "depth unavailable (ground truth={:?}, modified={:?}, post={:?})",
                    ground_truth_mm, modified_mm, post_mm
                ),
            )
        }
    };

    let dist_modified = (modified - gt).abs();
    let dist_post = (post - gt).abs();
    info!(
        "Depth to ground truth (mm): modified={:.1} post={:.1} (ground truth={:.1} mm)",
        dist_modified, dist_post, gt
    );

    if dist_post > dist_modified + tolerance_mm {
        Check::fail(
            "depth_convergence",
            Some(post),
            Some(gt),
            format!(
                "post-calibration depth did not converge toward ground truth (modified={:.1} post={:.1} tolerance={:.1} mm)",
                dist_modified, dist_post, tolerance_mm
            ),
        )
    } else {
        Check::pass(
            "depth_convergence",
            Some(post),
            Some(gt),
            format!(
                "converged toward ground truth (improvement={:.1} mm)",
                dist_modified - dist_post
            ),
        )
    }
}

/// Tare target distance must lie strictly inside `(min_mm, max_mm)`
pub fn check_target_z(z_mm: f64, min_mm: f64, max_mm: f64) -> Check {
    if z_mm > min_mm && z_mm < max_mm {
        Check::pass(
            "target_z",
            Some(z_mm),
            None,
            format!("target distance {:.1} mm in ({}, {})", z_mm, min_mm, max_mm),
        )
    } else {
        Check::fail(
            "target_z",
            Some(z_mm),
            None,
            format!("target distance {:.1} mm outside ({}, {})", z_mm, min_mm, max_mm),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_thresholds() {
        assert_eq!(check_health(Some(-0.3), 2.0).outcome, CheckOutcome::Pass);
        assert_eq!(check_health(Some(2.5), 2.0).outcome, CheckOutcome::Fail);
        assert_eq!(check_health(Some(-2.0), 2.0).outcome, CheckOutcome::Fail);
        assert_eq!(check_health(None, 2.0).outcome, CheckOutcome::Fail);
    }

    #[test]
    fn test_perturbation_epsilon() {
        assert_eq!(check_perturbation(299.0, 299.05, 0.1).outcome, CheckOutcome::Pass);
        assert_eq!(check_perturbation(299.0, 300.0, 0.1).outcome, CheckOutcome::Fail);
    }

    #[test]
    fn test_reversion_to_base_passes() {
        let check = check_reversion(300.0, 299.0, 300.0, 0.001, 0.1);
        assert_eq!(check.outcome, CheckOutcome::Pass);
        assert_eq!(check.observed, Some(300.0));
    }

    #[test]
    fn test_unchanged_table_fails() {
        let check = check_reversion(300.0, 299.0, 299.0, 0.001, 0.1);
        assert!(check.is_failure());
        assert!(check.message.contains("unchanged"));
    }

    #[test]
    fn test_moving_away_fails() {
        // Moved, but further from base
        let check = check_reversion(300.0, 299.0, 298.0, 0.001, 0.1);
        assert!(check.is_failure());
        assert!(check.message.contains("did not revert"));
    }

    #[test]
    fn test_reversion_epsilon_slack() {
        // Halfway back: equal distances pass only thanks to epsilon
        assert_eq!(check_reversion(300.0, 299.0, 299.5, 0.001, 0.1).outcome, CheckOutcome::Pass);
        // Tare epsilon tolerates ending slightly nearer the perturbed value
        assert_eq!(check_reversion(640.0, 639.2, 639.5, 0.001, 0.5).outcome, CheckOutcome::Pass);
    }

    #[test]
    fn test_depth_convergence() {
        assert_eq!(
            check_depth_convergence(Some(1000.0), Some(1040.0), Some(1001.0), 50.0).outcome,
            CheckOutcome::Pass
        );
        assert_eq!(
            check_depth_convergence(Some(1000.0), Some(1040.0), Some(1100.0), 50.0).outcome,
            CheckOutcome::Fail
        );
        assert_eq!(
            check_depth_convergence(Some(1000.0), Some(1040.0), Some(1041.0), 0.0).outcome,
            CheckOutcome::Fail
        );
    }

    #[test]
    fn test_missing_depth_is_skipped() {
        let check = check_depth_convergence(Some(1000.0), None, Some(1000.0), 50.0);
        assert_eq!(check.outcome, CheckOutcome::Skipped);
        assert!(!check.is_failure());
        assert_eq!(check_depth_convergence(None, Some(1.0), Some(1.0), 50.0).outcome, CheckOutcome::Skipped);
    }

    #[test]
    fn test_target_z_bounds() {
        assert_eq!(check_target_z(1000.0, 600.0, 1500.0).outcome, CheckOutcome::Pass);
        assert_eq!(check_target_z(600.0, 600.0, 1500.0).outcome, CheckOutcome::Fail);
        assert_eq!(check_target_z(1600.0, 600.0, 1500.0).outcome, CheckOutcome::Fail);
    }

    proptest::proptest! {
        #[test]
        fn test_reversion_direction(base in 100.0f64..900.0, delta in 0.05f64..5.0, sign in proptest::bool::ANY) {
            let modified = if sign { base + delta } else { base - delta };
            let reverted = check_reversion(base, modified, base, 0.001, 0.1 * delta);
            let stuck = check_reversion(base, modified, modified, 0.001, 0.1 * delta);
            proptest::prop_assert_eq!(reverted.outcome, CheckOutcome::Pass);
            proptest::prop_assert_eq!(stuck.outcome, CheckOutcome::Fail);
        }
    }
}
