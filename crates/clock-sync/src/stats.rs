//! Robust Offset Statistics

use serde::{Deserialize, Serialize};

/// IQR fence multiplier
pub const IQR_FENCE: f64 = 1.5;

/// Median, spread and outlier count of a batch of offsets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetStats {
    /// Median after outlier removal
    pub median: f64,
    /// Sample standard deviation after outlier removal
    pub stdev: f64,
    /// Values kept
    pub count: usize,
    /// Values rejected by the IQR fence
    pub outliers_removed: usize,
}

impl OffsetStats {
    /// IQR-filter `values`, then summarise what is left
    pub fn compute(values: &[f64]) -> Option<Self> {
        let kept = iqr_filter(values);
        let median = median(&kept)?;
        Some(Self {
            median,
            stdev: sample_stdev(&kept),
            count: kept.len(),
            outliers_removed: values.len() - kept.len(),
        })
    }
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Middle value; mean of the two middle values for even counts
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let v = sorted(values);
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        Some((v[mid - 1] + v[mid]) / 2.0)
    } else {
        Some(v[mid])
    }
}

/// Sample (n - 1) standard deviation; zero for fewer than two values
pub fn sample_stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = values.iter().sum::<f64>() / values.len() as f64;
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Value at sorted index `floor(n * q)`, clamped to the last element
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let v = sorted(values);
    let idx = ((v.len() as f64 * q) as usize).min(v.len() - 1);
    Some(v[idx])
}

/// Drop values outside `[q1 - 1.5 IQR, q3 + 1.5 IQR]`.
///
/// Quartiles are the sorted values at `n / 4` and `3n / 4`. Fewer than four
/// values are returned unchanged. Order of the kept values is preserved.
pub fn iqr_filter(values: &[f64]) -> Vec<f64> {
    if values.len() < 4 {
        return values.to_vec();
    }
    let v = sorted(values);
    let q1 = v[v.len() / 4];
    let q3 = v[3 * v.len() / 4];
    let iqr = q3 - q1;
    let lower = q1 - IQR_FENCE * iqr;
    let upper = q3 + IQR_FENCE * iqr;
    values.iter().copied().filter(|x| (lower..=upper).contains(x)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn gaussian(rng: &mut StdRng, mean: f64, sigma: f64) -> f64 {
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen();
        mean + sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_stdev_small_samples() {
        assert_eq!(sample_stdev(&[]), 0.0);
        assert_eq!(sample_stdev(&[7.0]), 0.0);
        assert!((sample_stdev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 2.138_089_935).abs() < 1e-6);
    }

    #[test]
    fn test_percentile_index() {
        let gaps: Vec<f64> = (1..=20).map(|v| v as f64).collect();
        // int(20 * 0.95) = 19 -> the largest value
        assert_eq!(percentile(&gaps, 0.95), Some(20.0));
        assert_eq!(percentile(&gaps, 0.5), Some(11.0));
        assert_eq!(percentile(&[1.0], 0.95), Some(1.0));
    }

    #[test]
    fn test_iqr_keeps_short_input() {
        assert_eq!(iqr_filter(&[1.0, 1000.0, 2.0]), vec![1.0, 1000.0, 2.0]);
    }

    #[test]
    fn test_iqr_drops_spike() {
        let values = [10.0, 11.0, 9.0, 10.5, 9.5, 10.2, 500.0, 9.8];
        let kept = iqr_filter(&values);
        assert_eq!(kept.len(), 7);
        assert!(!kept.contains(&500.0));
    }

    #[test]
    fn test_outliers_do_not_move_median() {
        let mut rng = StdRng::seed_from_u64(7);
        let sigma = 2.0;
        let clean: Vec<f64> = (0..190).map(|_| gaussian(&mut rng, 15.0, sigma).abs()).collect();
        let clean_median = median(&clean).unwrap();

        // 5% extreme outliers at random positions
        let mut mixed = clean.clone();
        for _ in 0..10 {
            let pos = rng.gen_range(0..=mixed.len());
            mixed.insert(pos, rng.gen_range(5_000.0..20_000.0));
        }

        let stats = OffsetStats::compute(&mixed).unwrap();
        assert!(stats.outliers_removed >= 10);
        assert!((stats.median - clean_median).abs() < sigma);
        assert!(stats.stdev < 3.0 * sigma);
    }
}
