//! Out-of-bag (OOB) evaluation for Random Forest.

use crate::dataset::Dataset;
use crate::error::ForestError;
use crate::metrics::RegressionMetrics;
use crate::tree::DecisionTree;

/// Out-of-bag evaluation result.
#[derive(Debug, Clone)]
pub struct OobScore {
    /// Mean squared error of the OOB predictions.
    pub mse: f64,
    /// Coefficient of determination of the OOB predictions.
    pub r2: f64,
    /// Number of samples that had at least one OOB tree.
    pub n_oob_samples: usize,
}

/// Rows of an `n_samples` table that never appear in `in_bag`.
pub(crate) fn out_of_bag(n_samples: usize, in_bag: &[usize]) -> Vec<usize> {
    let mut drawn = vec![false; n_samples];
    for &i in in_bag {
        drawn[i] = true;
    }
    (0..n_samples).filter(|&i| !drawn[i]).collect()
}

/// Compute out-of-bag predictions and score them.
///
/// Each sample is predicted by the mean of the trees whose in-bag set did not
/// contain it. Samples with no OOB tree are skipped.
pub(crate) fn compute_oob(
    trees: &[DecisionTree],
    dataset: &Dataset,
    in_bag_per_tree: &[Vec<usize>],
) -> Result<OobScore, ForestError> {
    let n_samples = dataset.n_samples();
    let mut sums = vec![0.0f64; n_samples];
    let mut counts = vec![0usize; n_samples];

    for (tree, in_bag) in trees.iter().zip(in_bag_per_tree) {
        for sample_idx in out_of_bag(n_samples, in_bag) {
            sums[sample_idx] += tree.leaf_value(&dataset.rows()[sample_idx]);
            counts[sample_idx] += 1;
        }
    }

    let (predictions, targets): (Vec<f64>, Vec<f64>) = (0..n_samples)
        .filter(|&i| counts[i] > 0)
        .map(|i| (sums[i] / counts[i] as f64, dataset.targets()[i]))
        .unzip();

    if predictions.is_empty() {
        return Err(ForestError::OobEvaluationFailed {
            reason: "no sample has any OOB tree".to_string(),
        });
    }

    let metrics = RegressionMetrics::compute(&predictions, &targets)?;
    Ok(OobScore {
        mse: metrics.mse,
        r2: metrics.r2,
        n_oob_samples: predictions.len(),
    })
}
