//! Regression metrics over paired predictions and targets.

use crate::error::ForestError;

/// Error summary of a set of predictions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionMetrics {
    /// Mean squared error.
    pub mse: f64,
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean absolute error.
    pub mae: f64,
    /// Coefficient of determination.
    pub r2: f64,
}

impl RegressionMetrics {
    /// Score `predictions` against `targets`.
    ///
    /// R² is `1 - SS_res / SS_tot`. When the targets are constant,
    /// `SS_tot` is zero and R² is 1.0 for a perfect fit and 0.0 otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::MetricInput`] when the slices are empty or of
    /// different lengths.
    pub fn compute(predictions: &[f64], targets: &[f64]) -> Result<Self, ForestError> {
        if predictions.is_empty() || predictions.len() != targets.len() {
            return Err(ForestError::MetricInput {
                n_predictions: predictions.len(),
                n_targets: targets.len(),
            });
        }

        let n = targets.len() as f64;
        let mean = targets.iter().sum::<f64>() / n;

        let mut ss_res = 0.0f64;
        let mut abs_sum = 0.0f64;
        let mut ss_tot = 0.0f64;
        for (&p, &t) in predictions.iter().zip(targets) {
            let residual = t - p;
            ss_res += residual * residual;
            abs_sum += residual.abs();
            ss_tot += (t - mean) * (t - mean);
        }

        let mse = ss_res / n;
        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };

        Ok(Self {
            mse,
            rmse: mse.sqrt(),
            mae: abs_sum / n,
            r2,
        })
    }
}
