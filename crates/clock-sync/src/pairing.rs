//! Nearest-neighbour frame pairing

use serde::{Deserialize, Serialize};

/// A reference value matched to its nearest candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub reference_index: usize,
    pub candidate_index: usize,
    /// |reference - candidate|
    pub distance: f64,
}

/// Match every reference value to its nearest candidate.
///
/// Pairs further apart than `threshold` are dropped. Candidates need not be
/// sorted; on equal distances the earlier candidate (smaller value) wins.
/// A candidate may be matched by more than one reference value.
pub fn pair_nearest(reference: &[f64], candidates: &[f64], threshold: f64) -> Vec<MatchedPair> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| candidates[a].total_cmp(&candidates[b]).then(a.cmp(&b)));
    let sorted: Vec<f64> = order.iter().map(|&i| candidates[i]).collect();

    reference
        .iter()
        .enumerate()
        .filter_map(|(ri, &value)| {
            let pos = sorted.partition_point(|&c| c < value);
            let mut best: Option<(usize, f64)> = None;
            // Predecessor first so it wins ties
            for slot in [pos.checked_sub(1), Some(pos)].into_iter().flatten() {
                if let Some(&c) = sorted.get(slot) {
                    let d = (value - c).abs();
                    if best.map_or(true, |(_, bd)| d < bd) {
                        best = Some((slot, d));
                    }
                }
            }
            best.filter(|&(_, d)| d <= threshold).map(|(slot, d)| MatchedPair {
                reference_index: ri,
                candidate_index: order[slot],
                distance: d,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(reference: &[f64], candidates: &[f64], threshold: f64) -> Vec<f64> {
        reference
            .iter()
            .filter_map(|&r| {
                candidates
                    .iter()
                    .map(|&c| (r - c).abs())
                    .fold(None, |best: Option<f64>, d| Some(best.map_or(d, |b| b.min(d))))
                    .filter(|&d| d <= threshold)
            })
            .collect()
    }

    #[test]
    fn test_pairs_within_threshold() {
        let master = [0.0, 33_333.0, 66_666.0, 100_000.0];
        let slave = [150.0, 33_500.0, 99_000.0];
        let pairs = pair_nearest(&master, &slave, 10_000.0);
        let got: Vec<(usize, usize)> = pairs.iter().map(|p| (p.reference_index, p.candidate_index)).collect();
        // 66_666 is more than 32 ms from any slave frame
        assert_eq!(got, vec![(0, 0), (1, 1), (3, 2)]);
        assert_eq!(pairs[2].distance, 1_000.0);
    }

    #[test]
    fn test_unsorted_candidates() {
        let pairs = pair_nearest(&[10.0, 20.0], &[21.0, 9.0, 100.0], 5.0);
        assert_eq!(pairs[0].candidate_index, 1);
        assert_eq!(pairs[1].candidate_index, 0);
    }

    #[test]
    fn test_tie_prefers_earlier_candidate() {
        let pairs = pair_nearest(&[10.0], &[12.0, 8.0], 5.0);
        assert_eq!(pairs[0].candidate_index, 1);
        assert_eq!(pairs[0].distance, 2.0);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(pair_nearest(&[1.0], &[], f64::INFINITY).is_empty());
        assert!(pair_nearest(&[], &[1.0], f64::INFINITY).is_empty());
    }

    proptest::proptest! {
        #[test]
        fn test_matches_exhaustive_search(
            reference in proptest::collection::vec(0.0f64..1e6, 0..40),
            candidates in proptest::collection::vec(0.0f64..1e6, 1..40),
            threshold in 0.0f64..5e4,
        ) {
            let fast: Vec<f64> = pair_nearest(&reference, &candidates, threshold).iter().map(|p| p.distance).collect();
            let slow = brute_force(&reference, &candidates, threshold);
            proptest::prop_assert_eq!(fast, slow);
        }
    }
}
