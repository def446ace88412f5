//! Configuration builder for Random Forest training.

use std::fmt;
use std::str::FromStr;

use crate::dataset::Dataset;
use crate::error::ForestError;
use crate::result::RandomForestResult;

/// Strategy for determining the number of features to consider at each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxFeatures {
    /// Square root of total features, rounded down.
    Sqrt,
    /// Log base 2 of total features, rounded down.
    Log2,
    /// A fixed count, clamped to the number of features.
    Fixed(usize),
    /// All features (no subsampling).
    All,
}

impl MaxFeatures {
    /// Resolve the policy against a concrete feature count.
    ///
    /// `Sqrt` and `Log2` never resolve below 1, so a dataset with a single
    /// feature can still be split.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidMaxFeatures`] for `Fixed(0)`.
    pub fn resolve(self, n_features: usize) -> Result<usize, ForestError> {
        let resolved = match self {
            MaxFeatures::Sqrt => ((n_features as f64).sqrt().floor() as usize).max(1),
            MaxFeatures::Log2 => ((n_features as f64).log2().floor() as usize).max(1),
            MaxFeatures::Fixed(n) => n,
            MaxFeatures::All => n_features,
        };
        if resolved == 0 {
            return Err(ForestError::InvalidMaxFeatures {
                max_features: resolved,
                n_features,
            });
        }
        Ok(resolved.min(n_features))
    }
}

impl FromStr for MaxFeatures {
    type Err = ForestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(MaxFeatures::All),
            "sqrt" => Ok(MaxFeatures::Sqrt),
            "log2" => Ok(MaxFeatures::Log2),
            other => match other.parse::<usize>() {
                Ok(n) if n > 0 => Ok(MaxFeatures::Fixed(n)),
                _ => Err(ForestError::UnknownMaxFeatures {
                    policy: s.to_string(),
                }),
            },
        }
    }
}

impl fmt::Display for MaxFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxFeatures::Sqrt => f.write_str("sqrt"),
            MaxFeatures::Log2 => f.write_str("log2"),
            MaxFeatures::Fixed(n) => write!(f, "{n}"),
            MaxFeatures::All => f.write_str("all"),
        }
    }
}

/// Whether to compute out-of-bag evaluation during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OobMode {
    /// Compute OOB error and R².
    Enabled,
    /// Skip OOB evaluation.
    Disabled,
}

/// Configuration for Random Forest regression training.
///
/// Construct via [`RandomForestConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter            | Default     |
/// |----------------------|-------------|
/// | `max_features`       | `Sqrt`      |
/// | `max_depth`          | `None`      |
/// | `min_samples_split`  | 2           |
/// | `bootstrap`          | `true`      |
/// | `seed`               | 42          |
/// | `oob_mode`           | `Disabled`  |
#[derive(Debug, Clone)]
pub struct RandomForestConfig {
    pub(crate) n_estimators: usize,
    pub(crate) max_features: MaxFeatures,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) bootstrap: bool,
    pub(crate) seed: u64,
    pub(crate) oob_mode: OobMode,
}

impl RandomForestConfig {
    /// Create a new config with the given number of trees.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidEstimatorCount`] if `n_estimators` is zero.
    pub fn new(n_estimators: usize) -> Result<Self, ForestError> {
        if n_estimators == 0 {
            return Err(ForestError::InvalidEstimatorCount { n_estimators });
        }
        Ok(Self {
            n_estimators,
            max_features: MaxFeatures::Sqrt,
            max_depth: None,
            min_samples_split: 2,
            bootstrap: true,
            seed: 42,
            oob_mode: OobMode::Disabled,
        })
    }

    // --- Setters ---

    /// Set the max features strategy.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the maximum tree depth. `None` means unlimited.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum number of samples required to attempt a split.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Enable or disable bootstrap resampling of the rows for each tree.
    #[must_use]
    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the OOB evaluation mode.
    #[must_use]
    pub fn with_oob_mode(mut self, oob_mode: OobMode) -> Self {
        self.oob_mode = oob_mode;
        self
    }

    // --- Getters ---

    /// Return the number of trees.
    #[must_use]
    pub fn n_estimators(&self) -> usize {
        self.n_estimators
    }

    /// Return the max features strategy.
    #[must_use]
    pub fn max_features(&self) -> MaxFeatures {
        self.max_features
    }

    /// Return the maximum depth limit, if any.
    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Return the minimum samples required to split a node.
    #[must_use]
    pub fn min_samples_split(&self) -> usize {
        self.min_samples_split
    }

    /// Return whether each tree trains on a bootstrap sample.
    #[must_use]
    pub fn bootstrap(&self) -> bool {
        self.bootstrap
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Return the OOB evaluation mode.
    #[must_use]
    pub fn oob_mode(&self) -> OobMode {
        self.oob_mode
    }

    /// Check the hyperparameters that do not depend on the data.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`ForestError::InvalidEstimatorCount`]  | `n_estimators` is zero    |
    /// | [`ForestError::InvalidMinSamplesSplit`] | `min_samples_split` < 2   |
    /// | [`ForestError::InvalidMaxFeatures`]     | `max_features` is `Fixed(0)` |
    pub fn validate(&self) -> Result<(), ForestError> {
        if self.n_estimators == 0 {
            return Err(ForestError::InvalidEstimatorCount {
                n_estimators: self.n_estimators,
            });
        }
        if self.min_samples_split < 2 {
            return Err(ForestError::InvalidMinSamplesSplit {
                min_samples_split: self.min_samples_split,
            });
        }
        if self.max_features == MaxFeatures::Fixed(0) {
            return Err(ForestError::InvalidMaxFeatures {
                max_features: 0,
                n_features: 0,
            });
        }
        Ok(())
    }

    /// Train a Random Forest regressor on the provided dataset.
    ///
    /// # Errors
    ///
    /// | Variant                               | When                                         |
    /// |---------------------------------------|----------------------------------------------|
    /// | [`ForestError::InvalidEstimatorCount`]  | `n_estimators` is zero                     |
    /// | [`ForestError::InvalidMinSamplesSplit`] | `min_samples_split` < 2                    |
    /// | [`ForestError::InvalidMaxFeatures`]     | `max_features` resolves to zero            |
    /// | [`ForestError::EmptyDataset`]           | `dataset` has no rows                      |
    /// | [`ForestError::ZeroFeatures`]           | rows have zero feature columns             |
    /// | [`ForestError::OobEvaluationFailed`]    | OOB enabled but no sample has any OOB tree |
    pub fn fit(&self, dataset: &Dataset) -> Result<RandomForestResult, ForestError> {
        crate::forest::train(self, dataset)
    }
}
