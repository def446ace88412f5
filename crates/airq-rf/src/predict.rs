//! Prediction methods for the Random Forest ensemble.

use rayon::prelude::*;

use crate::error::ForestError;
use crate::forest::{ForestParams, RandomForest};
use crate::tree::DecisionTree;

impl RandomForest {
    /// Predict the target for a single sample.
    ///
    /// Every tree routes the sample to a leaf; the leaf values are averaged
    /// without weights.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict(&self, sample: &[f64]) -> Result<f64, ForestError> {
        if sample.len() != self.n_features {
            return Err(ForestError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }
        let total: f64 = self.trees.iter().map(|tree| tree.leaf_value(sample)).sum();
        Ok(total / self.trees.len() as f64)
    }

    /// Predict a batch of samples in parallel.
    ///
    /// Each row is scored independently, so a malformed row fails only its
    /// own slot. Output order matches input order.
    #[must_use]
    pub fn predict_batch(&self, samples: &[Vec<f64>]) -> Vec<Result<f64, ForestError>> {
        samples
            .par_iter()
            .map(|sample| self.predict(sample))
            .collect()
    }

    /// Return the member trees, in training order.
    #[must_use]
    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Return the hyperparameters the forest was trained with.
    #[must_use]
    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Return the number of features this forest was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Return the feature names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }
}
