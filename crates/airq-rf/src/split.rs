use crate::node::{FeatureIndex, Variance};

/// Result of finding the best split for a node.
#[derive(Debug, Clone)]
pub(crate) struct SplitResult {
    /// Feature used for the split.
    pub(crate) feature: FeatureIndex,
    /// Threshold value: samples with feature <= threshold go left.
    pub(crate) threshold: f64,
    /// Decrease in summed squared error from this split.
    pub(crate) impurity_decrease: f64,
    /// Sample indices going to the left child.
    pub(crate) left_indices: Vec<usize>,
    /// Sample indices going to the right child.
    pub(crate) right_indices: Vec<usize>,
}

/// Mean and population variance of the targets selected by `sample_indices`.
///
/// Two-pass, so the variance is exactly zero for constant targets.
pub(crate) fn target_moments(targets: &[f64], sample_indices: &[usize]) -> (f64, Variance) {
    if sample_indices.is_empty() {
        return (0.0, Variance::new(0.0));
    }
    let n = sample_indices.len() as f64;
    let mean = sample_indices.iter().map(|&si| targets[si]).sum::<f64>() / n;
    let sse: f64 = sample_indices
        .iter()
        .map(|&si| {
            let d = targets[si] - mean;
            d * d
        })
        .sum();
    (mean, Variance::new(sse / n))
}

/// Relative slack, scaled by the parent SSE, within which two candidate
/// scores count as equal.
///
/// The running sums accumulate rows in a different order for each feature,
/// so one partition reached through two features can differ in the last
/// bits.
const TIE_TOLERANCE: f64 = 1e-10;

/// Summed squared error of a partition side from its deviation sums.
fn side_sse(sum: f64, sum_sq: f64, count: usize) -> f64 {
    (sum_sq - sum * sum / count as f64).max(0.0)
}

/// Find the variance-minimizing split among `candidates`.
///
/// Features are scanned in the order given. Within a feature, each distinct
/// value is a threshold candidate, visited in ascending order; a threshold
/// that leaves either side empty is skipped. The score is the count-weighted
/// variance of the two sides, `(sse_left + sse_right) / n`. Only a strictly
/// lower score replaces the running best, so the earliest candidate wins ties.
/// Candidates whose SSE differs by less than `TIE_TOLERANCE` times the parent
/// SSE are ties.
///
/// Returns `None` when no candidate feature takes two distinct values.
///
/// # Column-major layout
///
/// `columns` is column-major: `columns[feature_idx][sample_idx]`.
/// `sample_indices` index into the inner Vecs and may repeat (bootstrap).
pub(crate) fn find_best_split(
    columns: &[Vec<f64>],
    targets: &[f64],
    sample_indices: &[usize],
    candidates: &[FeatureIndex],
) -> Option<SplitResult> {
    let n_samples = sample_indices.len();
    if n_samples < 2 || candidates.is_empty() {
        return None;
    }

    let (parent_mean, _) = target_moments(targets, sample_indices);

    // Deviations from the parent mean keep the running sums small.
    let mut total_sum = 0.0f64;
    let mut total_sq = 0.0f64;
    for &si in sample_indices {
        let d = targets[si] - parent_mean;
        total_sum += d;
        total_sq += d * d;
    }
    let parent_sse = side_sse(total_sum, total_sq, n_samples);
    let tolerance = TIE_TOLERANCE * parent_sse;

    let mut best_sse = f64::INFINITY;
    let mut best: Option<(FeatureIndex, f64)> = None;

    for &feature in candidates {
        let feat_col = &columns[feature.index()];

        let mut sorted: Vec<(f64, f64)> = sample_indices
            .iter()
            .map(|&si| (feat_col[si], targets[si] - parent_mean))
            .collect();
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_sum = 0.0f64;
        let mut left_sq = 0.0f64;

        for i in 0..(n_samples - 1) {
            let (val_i, d) = sorted[i];
            left_sum += d;
            left_sq += d * d;

            // Only the last occurrence of a value closes a partition.
            if val_i == sorted[i + 1].0 {
                continue;
            }

            let n_left = i + 1;
            let n_right = n_samples - n_left;
            let sse = side_sse(left_sum, left_sq, n_left)
                + side_sse(total_sum - left_sum, total_sq - left_sq, n_right);

            if sse < best_sse - tolerance {
                best_sse = sse;
                best = Some((feature, val_i));
            }
        }
    }

    let (feature, threshold) = best?;

    let feat_col = &columns[feature.index()];
    let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = sample_indices
        .iter()
        .partition(|&&si| feat_col[si] <= threshold);

    Some(SplitResult {
        feature,
        threshold,
        impurity_decrease: (parent_sse - best_sse).max(0.0),
        left_indices,
        right_indices,
    })
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::{find_best_split, target_moments};
    use crate::node::FeatureIndex;

    fn all_features(n: usize) -> Vec<FeatureIndex> {
        (0..n).map(FeatureIndex::new).collect()
    }

    #[test]
    fn moments_of_constant_targets() {
        let (mean, var) = target_moments(&[4.0, 4.0, 4.0], &[0, 1, 2]);
        assert!((mean - 4.0).abs() < f64::EPSILON);
        assert_eq!(var.value(), 0.0);
    }

    #[test]
    fn moments_follow_repeated_indices() {
        // Indices [0, 0, 1] weight the first target twice.
        let (mean, var) = target_moments(&[0.0, 3.0], &[0, 0, 1]);
        assert!((mean - 1.0).abs() < 1e-12);
        assert!((var.value() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn step_function_split_found() {
        let columns = vec![vec![1.0, 2.0, 3.0, 10.0, 11.0, 12.0]];
        let targets = vec![5.0, 5.0, 5.0, 50.0, 50.0, 50.0];
        let samples: Vec<usize> = (0..6).collect();

        let split = find_best_split(&columns, &targets, &samples, &all_features(1))
            .expect("should find a split");

        assert_eq!(split.feature.index(), 0);
        // Thresholds are observed values, not midpoints.
        assert!((split.threshold - 3.0).abs() < f64::EPSILON);
        assert_eq!(split.left_indices, vec![0, 1, 2]);
        assert_eq!(split.right_indices, vec![3, 4, 5]);
        // Parent SSE = 6 * 22.5^2; both children are pure.
        assert!((split.impurity_decrease - 6.0 * 22.5 * 22.5).abs() < 1e-6);
    }

    #[test]
    fn constant_feature_returns_none() {
        let columns = vec![vec![5.0, 5.0, 5.0, 5.0]];
        let targets = vec![1.0, 2.0, 3.0, 4.0];
        let samples: Vec<usize> = (0..4).collect();
        assert!(find_best_split(&columns, &targets, &samples, &all_features(1)).is_none());
    }

    #[test]
    fn only_candidate_features_are_considered() {
        // Feature 0 separates the targets perfectly, feature 1 is constant.
        let columns = vec![vec![1.0, 2.0, 3.0, 4.0], vec![7.0, 7.0, 7.0, 7.0]];
        let targets = vec![0.0, 0.0, 9.0, 9.0];
        let samples: Vec<usize> = (0..4).collect();
        let only_second = [FeatureIndex::new(1)];
        assert!(find_best_split(&columns, &targets, &samples, &only_second).is_none());
    }

    #[test]
    fn first_candidate_wins_exact_tie() {
        // Two identical columns give identical scores; candidate order decides.
        let columns = vec![vec![1.0, 2.0, 3.0, 4.0], vec![1.0, 2.0, 3.0, 4.0]];
        let targets = vec![0.0, 0.0, 10.0, 10.0];
        let samples: Vec<usize> = (0..4).collect();

        let order = [FeatureIndex::new(1), FeatureIndex::new(0)];
        let split = find_best_split(&columns, &targets, &samples, &order).unwrap();
        assert_eq!(split.feature.index(), 1);
        assert!((split.threshold - 2.0).abs() < f64::EPSILON);

        let order = [FeatureIndex::new(0), FeatureIndex::new(1)];
        let split = find_best_split(&columns, &targets, &samples, &order).unwrap();
        assert_eq!(split.feature.index(), 0);
    }

    #[test]
    fn earliest_threshold_wins_within_feature() {
        // Splitting after 1.0 or after 2.0 isolates a zero-variance side of
        // equal cost; the ascending scan keeps the first.
        let columns = vec![vec![1.0, 2.0, 3.0]];
        let targets = vec![0.0, 5.0, 10.0];
        let samples: Vec<usize> = (0..3).collect();
        let split = find_best_split(&columns, &targets, &samples, &all_features(1)).unwrap();
        assert!((split.threshold - 1.0).abs() < f64::EPSILON);
        assert_eq!(split.left_indices, vec![0]);
    }

    #[test]
    fn repeated_sample_indices_stay_together() {
        let columns = vec![vec![1.0, 8.0]];
        let targets = vec![2.0, 20.0];
        let samples = vec![0, 1, 1, 0, 1];
        let split = find_best_split(&columns, &targets, &samples, &all_features(1)).unwrap();
        assert_eq!(split.left_indices, vec![0, 0]);
        assert_eq!(split.right_indices, vec![1, 1, 1]);
    }

    #[test]
    fn single_sample_returns_none() {
        let columns = vec![vec![1.0]];
        let targets = vec![3.0];
        assert!(find_best_split(&columns, &targets, &[0], &all_features(1)).is_none());
    }

    #[test]
    fn mirrored_column_does_not_steal_tie() {
        // Feature 0 at 1.0 and feature 1 at 0.0 both isolate row 0; the
        // sorted scans add the other two rows in opposite orders.
        let columns = vec![vec![2.0, 1.0, 0.0], vec![0.0, 1.0, 2.0], vec![2.0, 0.0, 2.0]];
        let targets = vec![135.0, 107.0, 114.0];
        let samples: Vec<usize> = (0..3).collect();
        let split = find_best_split(&columns, &targets, &samples, &all_features(3)).unwrap();
        assert_eq!(split.feature.index(), 0);
        assert!((split.threshold - 1.0).abs() < f64::EPSILON);
        assert_eq!(split.left_indices, vec![1, 2]);
        assert_eq!(split.right_indices, vec![0]);
    }

    /// Best split by exact rational arithmetic, first strict improvement wins.
    fn exact_best_split(columns: &[Vec<f64>], targets: &[i64]) -> Option<(usize, f64)> {
        // SSE of a side is (n * sum_sq - sum^2) / n; candidates compare as
        // fractions over n_left * n_right.
        let side = |rows: &[usize]| -> (i128, i128) {
            let n = rows.len() as i128;
            let sum: i128 = rows.iter().map(|&r| i128::from(targets[r])).sum();
            let sq: i128 = rows.iter().map(|&r| i128::from(targets[r]).pow(2)).sum();
            (n * sq - sum * sum, n)
        };
        let mut best: Option<((i128, i128), (usize, f64))> = None;
        for (feature, col) in columns.iter().enumerate() {
            let mut values = col.clone();
            values.sort_by(f64::total_cmp);
            values.dedup();
            for &threshold in &values[..values.len() - 1] {
                let (left, right): (Vec<usize>, Vec<usize>) =
                    (0..col.len()).partition(|&r| col[r] <= threshold);
                let (num_l, n_l) = side(&left);
                let (num_r, n_r) = side(&right);
                let candidate = (num_l * n_r + num_r * n_l, n_l * n_r);
                let better = best.is_none_or(|((num, den), _)| candidate.0 * den < num * candidate.1);
                if better {
                    best = Some((candidate, (feature, threshold)));
                }
            }
        }
        best.map(|(_, split)| split)
    }

    #[test]
    fn agrees_with_exact_arithmetic_on_small_integer_tables() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..5000 {
            let n_rows = rng.gen_range(2..=6);
            let n_features = rng.gen_range(1..=3);
            let columns: Vec<Vec<f64>> = (0..n_features)
                .map(|_| (0..n_rows).map(|_| f64::from(rng.gen_range(0..3u8))).collect())
                .collect();
            let targets: Vec<i64> = (0..n_rows).map(|_| rng.gen_range(100..140)).collect();
            let float_targets: Vec<f64> = targets.iter().map(|&t| t as f64).collect();
            let samples: Vec<usize> = (0..n_rows).collect();

            let got = find_best_split(&columns, &float_targets, &samples, &all_features(n_features))
                .map(|s| (s.feature.index(), s.threshold));
            let expected = exact_best_split(&columns, &targets);
            assert_eq!(got, expected, "columns={columns:?} targets={targets:?}");
        }
    }
}
