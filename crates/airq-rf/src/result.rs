//! What a call to `fit` hands back.

use crate::forest::RandomForest;
use crate::importance::RankedFeature;
use crate::oob::{OobScore, out_of_bag};

/// Shape of the data and ensemble a forest was fitted on.
#[derive(Debug, Clone)]
pub struct TrainingMetadata {
    /// Number of trees in the ensemble.
    pub n_estimators: usize,
    /// Feature width of the training table.
    pub n_features: usize,
    /// Rows in the training table, before any bootstrap draw.
    pub n_samples: usize,
    /// Candidate features per split after resolving the policy.
    pub max_features_resolved: usize,
}

/// A fitted forest plus everything learned while fitting it.
///
/// The in-bag row lists are kept so callers can tell which rows each tree
/// never saw.
#[derive(Debug)]
pub struct RandomForestResult {
    forest: RandomForest,
    importances: Vec<RankedFeature>,
    oob_score: Option<OobScore>,
    in_bag: Vec<Vec<usize>>,
    metadata: TrainingMetadata,
}

impl RandomForestResult {
    pub(crate) fn new(
        forest: RandomForest,
        importances: Vec<RankedFeature>,
        oob_score: Option<OobScore>,
        in_bag: Vec<Vec<usize>>,
        metadata: TrainingMetadata,
    ) -> Self {
        Self {
            forest,
            importances,
            oob_score,
            in_bag,
            metadata,
        }
    }

    /// Borrow the fitted forest.
    #[must_use]
    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    /// Drop the training diagnostics and keep the model.
    #[must_use]
    pub fn into_forest(self) -> RandomForest {
        self.forest
    }

    /// Features by decreasing importance, rank 1 first.
    #[must_use]
    pub fn importances(&self) -> &[RankedFeature] {
        &self.importances
    }

    /// Out-of-bag MSE and R², present only with `OobMode::Enabled`.
    #[must_use]
    pub fn oob_score(&self) -> Option<&OobScore> {
        self.oob_score.as_ref()
    }

    /// Table shape and resolved feature count of the run.
    #[must_use]
    pub fn metadata(&self) -> &TrainingMetadata {
        &self.metadata
    }

    /// Training rows drawn for each tree, in draw order with repeats.
    ///
    /// Without bootstrap every entry is `0..n_samples`.
    #[must_use]
    pub fn in_bag_indices_per_tree(&self) -> &[Vec<usize>] {
        &self.in_bag
    }

    /// Rows tree `tree_index` never trained on, ascending.
    ///
    /// `None` when the index is past the last tree.
    #[must_use]
    pub fn out_of_bag_rows(&self, tree_index: usize) -> Option<Vec<usize>> {
        self.in_bag
            .get(tree_index)
            .map(|bag| out_of_bag(self.metadata.n_samples, bag))
    }
}
