//! Slave-to-master clock relation

use crate::error::SyncError;
use crate::pairing::pair_nearest;
use crate::sample::TimestampSample;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Linear relation `slave = slope * master + offset` between two hardware
/// clocks, in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftCalibration {
    pub slope: f64,
    pub offset_us: f64,
    /// Coefficient of determination of the fit
    pub r_squared: f64,
    /// Frame pairs the fit used
    pub pairs: usize,
}

impl DriftCalibration {
    /// Map a slave timestamp into the master's domain
    pub fn to_master(&self, slave_us: f64) -> f64 {
        (slave_us - self.offset_us) / self.slope
    }

    /// Predicted slave timestamp for a master timestamp
    pub fn to_slave(&self, master_us: f64) -> f64 {
        self.slope * master_us + self.offset_us
    }

    /// Relative clock-rate error in parts per million
    pub fn rate_error_ppm(&self) -> f64 {
        (self.slope - 1.0) * 1e6
    }
}

/// Ordinary least squares fit of `slave` on `master`.
///
/// Both series are shifted by their first value before fitting so the sums
/// stay small; the intercept is shifted back afterwards.
pub fn fit_clock_relation(master: &[f64], slave: &[f64]) -> Result<DriftCalibration, SyncError> {
    if master.len() != slave.len() {
        return Err(SyncError::LengthMismatch {
            master: master.len(),
            slave: slave.len(),
        });
    }
    if master.len() < 2 {
        return Err(SyncError::InsufficientPairs {
            found: master.len(),
            required: 2,
        });
    }

    let master_ref = master[0];
    let slave_ref = slave[0];
    let xs: Vec<f64> = master.iter().map(|m| m - master_ref).collect();
    let ys: Vec<f64> = slave.iter().map(|s| s - slave_ref).collect();

    let n = xs.len() as f64;
    let sum_x: f64 = xs.iter().sum();
    let sum_y: f64 = ys.iter().sum();
    let sum_xy: f64 = xs.iter().zip(&ys).map(|(x, y)| x * y).sum();
    let sum_xx: f64 = xs.iter().map(|x| x * x).sum();

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator == 0.0 || !denominator.is_finite() {
        return Err(SyncError::DegenerateFit("master timestamps do not vary".to_string()));
    }
    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    if slope == 0.0 || !slope.is_finite() {
        return Err(SyncError::DegenerateFit(format!("slope {}", slope)));
    }
    let offset_norm = (sum_y - slope * sum_x) / n;
    let offset_us = slave_ref - slope * master_ref + offset_norm;

    let mean_y = sum_y / n;
    let ss_tot: f64 = ys.iter().map(|y| (y - mean_y).powi(2)).sum();
    let ss_res: f64 = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| (y - (slope * x + offset_norm)).powi(2))
        .sum();
    let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

    Ok(DriftCalibration {
        slope,
        offset_us,
        r_squared,
        pairs: xs.len(),
    })
}

/// Calibrate from concurrently collected samples.
///
/// Frames are paired on host arrival time, since the hardware clocks are
/// not yet related, then the hardware timestamps of the pairs are fitted.
pub fn calibrate_from_samples(
    master: &[TimestampSample],
    slave: &[TimestampSample],
    host_pair_threshold_us: f64,
    min_samples: usize,
    min_pairs: usize,
) -> Result<DriftCalibration, SyncError> {
    if master.len() < min_samples || slave.len() < min_samples {
        error!(
            "Insufficient frames for calibration: master={}, slave={}",
            master.len(),
            slave.len()
        );
        return Err(SyncError::InsufficientSamples {
            master: master.len(),
            slave: slave.len(),
            required: min_samples,
        });
    }

    let master_host: Vec<f64> = master.iter().map(|s| s.host_us).collect();
    let slave_host: Vec<f64> = slave.iter().map(|s| s.host_us).collect();
    let pairs = pair_nearest(&master_host, &slave_host, host_pair_threshold_us);

    if pairs.len() < min_pairs.max(2) {
        error!("Insufficient aligned frame pairs for calibration: {}", pairs.len());
        return Err(SyncError::InsufficientPairs {
            found: pairs.len(),
            required: min_pairs.max(2),
        });
    }

    let master_hw: Vec<f64> = pairs.iter().map(|p| master[p.reference_index].hardware_us).collect();
    let slave_hw: Vec<f64> = pairs.iter().map(|p| slave[p.candidate_index].hardware_us).collect();
    let calibration = fit_clock_relation(&master_hw, &slave_hw)?;

    info!("Calibration complete: {} aligned frame pairs", calibration.pairs);
    info!(
        "  Slave = {:.6} * Master + {:.2} us",
        calibration.slope, calibration.offset_us
    );
    info!("  R-squared: {:.6}", calibration.r_squared);
    Ok(calibration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn gaussian(rng: &mut StdRng, sigma: f64) -> f64 {
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen();
        sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    #[test]
    fn test_exact_line() {
        let master: Vec<f64> = (0..50).map(|i| 1_000_000.0 + i as f64 * 33_333.0).collect();
        let slave: Vec<f64> = master.iter().map(|m| 1.0002 * m + 500.0).collect();
        let cal = fit_clock_relation(&master, &slave).unwrap();
        assert!((cal.slope - 1.0002).abs() < 1e-9);
        assert!((cal.offset_us - 500.0).abs() < 1e-3);
        assert!((cal.r_squared - 1.0).abs() < 1e-9);
        assert!((cal.to_master(cal.to_slave(2_500_000.0)) - 2_500_000.0).abs() < 1e-6);
        assert!((cal.rate_error_ppm() - 200.0).abs() < 1e-3);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(matches!(
            fit_clock_relation(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]),
            Err(SyncError::DegenerateFit(_))
        ));
        assert!(matches!(
            fit_clock_relation(&[1.0, 2.0], &[1.0]),
            Err(SyncError::LengthMismatch { master: 2, slave: 1 })
        ));
        assert!(matches!(
            fit_clock_relation(&[1.0], &[1.0]),
            Err(SyncError::InsufficientPairs { found: 1, .. })
        ));
    }

    #[test]
    fn test_calibrate_pairs_on_host_time() {
        // Hardware clocks are unrelated in scale to host time
        let master: Vec<TimestampSample> = (0..30)
            .map(|i| TimestampSample::new(10_000.0 + i as f64 * 33_333.0, 1.7e15 + i as f64 * 33_333.0))
            .collect();
        let slave: Vec<TimestampSample> = (0..30)
            .map(|i| {
                let hw = 1.0001 * (10_000.0 + i as f64 * 33_333.0) + 9_000_000.0;
                TimestampSample::new(hw, 1.7e15 + i as f64 * 33_333.0 + 150.0)
            })
            .collect();
        let cal = calibrate_from_samples(&master, &slave, 33_333.0, 10, 10).unwrap();
        assert_eq!(cal.pairs, 30);
        assert!((cal.slope - 1.0001).abs() < 1e-9);
        assert!((cal.offset_us - 9_000_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_calibrate_requires_samples_and_pairs() {
        let few: Vec<TimestampSample> = (0..5).map(|i| TimestampSample::new(i as f64, i as f64)).collect();
        let many: Vec<TimestampSample> = (0..20).map(|i| TimestampSample::new(i as f64, i as f64)).collect();
        assert!(matches!(
            calibrate_from_samples(&few, &many, 33_333.0, 10, 10),
            Err(SyncError::InsufficientSamples { master: 5, slave: 20, required: 10 })
        ));

        // Host clocks a second apart: nothing pairs
        let late: Vec<TimestampSample> = (0..20)
            .map(|i| TimestampSample::new(i as f64, 1_000_000.0 + i as f64))
            .collect();
        assert!(matches!(
            calibrate_from_samples(&many, &late, 33_333.0, 10, 10),
            Err(SyncError::InsufficientPairs { found: 0, required: 10 })
        ));
    }

    proptest::proptest! {
        #[test]
        fn test_recovers_relation_under_noise(
            seed in proptest::num::u64::ANY,
            slope_ppm in -500.0f64..500.0,
            offset in -1e6f64..1e6,
            sigma in 0.5f64..5.0,
        ) {
            let true_slope = 1.0 + slope_ppm * 1e-6;
            let mut rng = StdRng::seed_from_u64(seed);
            // 5 s at 30 fps
            let master: Vec<f64> = (0..150).map(|i| 2_000_000.0 + i as f64 * 33_333.0).collect();
            let slave: Vec<f64> = master
                .iter()
                .map(|m| true_slope * m + offset + gaussian(&mut rng, sigma))
                .collect();

            let cal = fit_clock_relation(&master, &slave).unwrap();
            let span = master[master.len() - 1] - master[0];
            proptest::prop_assert!((cal.offset_us - offset).abs() < 3.0 * sigma);
            proptest::prop_assert!((cal.slope - true_slope).abs() < 3.0 * sigma / span);
            proptest::prop_assert!(cal.r_squared > 0.999_999);
        }
    }
}
