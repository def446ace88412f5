//! K-fold cross-validation for Random Forest regression.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, instrument};

use crate::config::{OobMode, RandomForestConfig};
use crate::dataset::Dataset;
use crate::error::ForestError;
use crate::importance::{RankedFeature, aggregate_importances};
use crate::metrics::RegressionMetrics;

/// Cross-validation configuration.
///
/// Construct via [`CrossValidation::new`], then chain `with_seed` if desired.
#[derive(Debug, Clone)]
pub struct CrossValidation {
    n_folds: usize,
    seed: u64,
}

/// Results of k-fold cross-validation.
#[derive(Debug)]
pub struct CrossValidationResult {
    /// Held-out metrics for each fold, in fold order.
    pub fold_metrics: Vec<RegressionMetrics>,
    /// Mean R² across folds.
    pub mean_r2: f64,
    /// Population standard deviation of fold R².
    pub std_r2: f64,
    /// Mean RMSE across folds.
    pub mean_rmse: f64,
    /// Population standard deviation of fold RMSE.
    pub std_rmse: f64,
    /// Averaged feature importances across all folds.
    pub feature_importances: Vec<RankedFeature>,
    /// Number of folds.
    pub n_folds: usize,
    /// Total number of samples.
    pub n_samples: usize,
    /// Number of features.
    pub n_features: usize,
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

impl CrossValidation {
    /// Create a new cross-validation config with the given number of folds.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidFoldCount`] if `n_folds` < 2.
    pub fn new(n_folds: usize) -> Result<Self, ForestError> {
        if n_folds < 2 {
            return Err(ForestError::InvalidFoldCount { n_folds });
        }
        Ok(Self { n_folds, seed: 42 })
    }

    /// Set the random seed for fold shuffling.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the number of folds.
    #[must_use]
    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    /// Return the fold shuffling seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Run k-fold cross-validation.
    ///
    /// Each fold trains a forest on the other folds, with the config seed
    /// offset by the fold index, and scores the held-out rows. OOB
    /// evaluation is skipped inside folds.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | Config errors | `config` fails [`RandomForestConfig::validate`] |
    /// | [`ForestError::EmptyDataset`] | Zero samples |
    /// | [`ForestError::TooFewSamplesForFolds`] | Fewer samples than folds |
    /// | Other errors | From underlying training |
    #[instrument(skip_all, fields(n_folds = self.n_folds, n_samples = dataset.n_samples()))]
    pub fn evaluate(
        &self,
        config: &RandomForestConfig,
        dataset: &Dataset,
    ) -> Result<CrossValidationResult, ForestError> {
        config.validate()?;
        if dataset.is_empty() {
            return Err(ForestError::EmptyDataset);
        }
        let n_samples = dataset.n_samples();
        if n_samples < self.n_folds {
            return Err(ForestError::TooFewSamplesForFolds {
                n_samples,
                n_folds: self.n_folds,
            });
        }

        let fold_assignments = self.assign_folds(n_samples);

        let mut fold_metrics = Vec::with_capacity(self.n_folds);
        let mut all_importances: Vec<Vec<f64>> = Vec::new();

        for fold in 0..self.n_folds {
            let (test_idx, train_idx): (Vec<usize>, Vec<usize>) =
                (0..n_samples).partition(|&i| fold_assignments[i] == fold);

            let train = dataset.subset(&train_idx);
            let test = dataset.subset(&test_idx);

            let fold_config = config
                .clone()
                .with_seed(config.seed.wrapping_add(fold as u64))
                .with_oob_mode(OobMode::Disabled);
            let result = fold_config.fit(&train)?;

            let predictions = result
                .forest()
                .predict_batch(test.rows())
                .into_iter()
                .collect::<Result<Vec<f64>, _>>()?;
            let metrics = RegressionMetrics::compute(&predictions, test.targets())?;

            debug!(
                fold,
                n_train = train_idx.len(),
                n_test = test_idx.len(),
                r2 = metrics.r2,
                rmse = metrics.rmse,
                "fold completed"
            );
            fold_metrics.push(metrics);

            all_importances.extend(
                result
                    .forest()
                    .trees()
                    .iter()
                    .map(|t| t.feature_importances()),
            );
        }

        let r2s: Vec<f64> = fold_metrics.iter().map(|m| m.r2).collect();
        let rmses: Vec<f64> = fold_metrics.iter().map(|m| m.rmse).collect();
        let (mean_r2, std_r2) = mean_std(&r2s);
        let (mean_rmse, std_rmse) = mean_std(&rmses);

        let feature_importances = aggregate_importances(&all_importances, dataset.feature_names());

        info!(mean_r2, std_r2, mean_rmse, "cross-validation complete");

        Ok(CrossValidationResult {
            fold_metrics,
            mean_r2,
            std_r2,
            mean_rmse,
            std_rmse,
            feature_importances,
            n_folds: self.n_folds,
            n_samples,
            n_features: dataset.n_features(),
        })
    }

    /// Shuffle row indices and deal them to folds round-robin.
    fn assign_folds(&self, n_samples: usize) -> Vec<usize> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut order: Vec<usize> = (0..n_samples).collect();
        order.shuffle(&mut rng);

        let mut fold_assignments = vec![0usize; n_samples];
        for (j, &idx) in order.iter().enumerate() {
            fold_assignments[idx] = j % self.n_folds;
        }
        fold_assignments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MaxFeatures;

    fn make_regression() -> Dataset {
        let rows: Vec<Vec<f64>> = (0..80)
            .map(|i| vec![f64::from(i) * 0.25, f64::from(i % 5)])
            .collect();
        let targets: Vec<f64> = rows.iter().map(|r| 4.0 * r[0] + r[1]).collect();
        Dataset::new(rows, targets).unwrap()
    }

    #[test]
    fn five_fold_smooth_target() {
        let ds = make_regression();
        let rf_config = RandomForestConfig::new(20)
            .unwrap()
            .with_max_features(MaxFeatures::All);
        let cv = CrossValidation::new(5).unwrap().with_seed(42);
        let result = cv.evaluate(&rf_config, &ds).unwrap();

        assert!(result.mean_r2 > 0.9, "mean_r2 = {}", result.mean_r2);
        assert_eq!(result.fold_metrics.len(), 5);
        assert_eq!(result.n_folds, 5);
        assert_eq!(result.n_samples, 80);
        assert_eq!(result.n_features, 2);
        assert!(result.std_rmse >= 0.0);
    }

    #[test]
    fn folds_partition_rows_evenly() {
        let cv = CrossValidation::new(3).unwrap();
        let assignments = cv.assign_folds(10);
        let mut sizes = [0usize; 3];
        for &fold in &assignments {
            sizes[fold] += 1;
        }
        assert_eq!(sizes, [4, 3, 3]);
    }

    #[test]
    fn deterministic_with_same_seed() {
        let ds = make_regression();
        let rf_config = RandomForestConfig::new(5).unwrap();
        let cv = CrossValidation::new(4).unwrap().with_seed(7);
        let a = cv.evaluate(&rf_config, &ds).unwrap();
        let b = cv.evaluate(&rf_config, &ds).unwrap();
        assert_eq!(a.fold_metrics, b.fold_metrics);
    }

    #[test]
    fn feature_importances_sum_to_one() {
        let ds = make_regression();
        let rf_config = RandomForestConfig::new(10).unwrap();
        let cv = CrossValidation::new(3).unwrap();
        let result = cv.evaluate(&rf_config, &ds).unwrap();
        let total: f64 = result.feature_importances.iter().map(|f| f.importance).sum();
        assert!((total - 1.0).abs() < 1e-10, "total = {total}");
    }

    #[test]
    fn invalid_fold_count() {
        assert!(matches!(
            CrossValidation::new(1),
            Err(ForestError::InvalidFoldCount { n_folds: 1 })
        ));
        assert!(CrossValidation::new(0).is_err());
    }

    #[test]
    fn too_few_samples_for_folds() {
        let ds = Dataset::new(vec![vec![1.0], vec![2.0], vec![3.0]], vec![1.0, 2.0, 3.0]).unwrap();
        let rf_config = RandomForestConfig::new(5).unwrap();
        let cv = CrossValidation::new(5).unwrap();
        let err = cv.evaluate(&rf_config, &ds).unwrap_err();
        assert!(matches!(
            err,
            ForestError::TooFewSamplesForFolds { n_samples: 3, n_folds: 5 }
        ));
    }
}
