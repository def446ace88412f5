//! Random Forest training with parallel tree construction.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info, instrument};

use crate::config::{OobMode, RandomForestConfig};
use crate::dataset::Dataset;
use crate::error::ForestError;
use crate::importance::aggregate_importances;
use crate::oob::compute_oob;
use crate::result::{RandomForestResult, TrainingMetadata};
use crate::tree::{DecisionTree, GrowParams, grow};

/// Hyperparameters a fitted forest was trained with.
///
/// `max_features` holds the count resolved against the training data, not
/// the policy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForestParams {
    /// Number of trees in the ensemble.
    pub n_estimators: usize,
    /// Depth bound, `None` when unbounded.
    pub max_depth: Option<usize>,
    /// Minimum routed samples for a node to be split.
    pub min_samples_split: usize,
    /// Candidate features drawn at each split.
    pub max_features: usize,
    /// Whether each tree trained on a bootstrap sample.
    pub bootstrap: bool,
    /// Master seed.
    pub seed: u64,
}

/// A fitted Random Forest regression ensemble.
///
/// Immutable: built by [`RandomForestConfig::fit`] or
/// [`RandomForest::from_bytes`] and only read afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomForest {
    pub(crate) trees: Vec<DecisionTree>,
    pub(crate) params: ForestParams,
    pub(crate) n_features: usize,
    pub(crate) feature_names: Vec<String>,
}

/// Draw `n_samples` row indices uniformly with replacement.
fn bootstrap_sample(n_samples: usize, rng: &mut impl Rng) -> Vec<usize> {
    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
}

/// Train the Random Forest ensemble.
#[instrument(skip_all, fields(n_estimators = config.n_estimators, n_samples = dataset.n_samples()))]
pub(crate) fn train(
    config: &RandomForestConfig,
    dataset: &Dataset,
) -> Result<RandomForestResult, ForestError> {
    config.validate()?;

    if dataset.is_empty() {
        return Err(ForestError::EmptyDataset);
    }
    let n_samples = dataset.n_samples();
    let n_features = dataset.n_features();
    if n_features == 0 {
        return Err(ForestError::ZeroFeatures);
    }

    let max_features_resolved = config.max_features.resolve(n_features)?;

    info!(
        n_estimators = config.n_estimators,
        n_samples,
        n_features,
        max_features = max_features_resolved,
        bootstrap = config.bootstrap,
        "training random forest"
    );

    // Per-tree seeds are drawn up front so the result does not depend on
    // how rayon schedules the members.
    let mut master_rng = ChaCha8Rng::seed_from_u64(config.seed);
    let tree_seeds: Vec<u64> = (0..config.n_estimators)
        .map(|_| master_rng.r#gen())
        .collect();

    let params = GrowParams {
        max_depth: config.max_depth,
        min_samples_split: config.min_samples_split,
        max_features: max_features_resolved,
    };
    let bootstrap = config.bootstrap;

    let tree_results: Vec<(DecisionTree, Vec<usize>)> = tree_seeds
        .into_par_iter()
        .enumerate()
        .map(|(tree_index, seed)| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let in_bag = if bootstrap {
                bootstrap_sample(n_samples, &mut rng)
            } else {
                (0..n_samples).collect()
            };
            let tree = grow(dataset, &in_bag, &params, &mut rng);
            debug!(
                tree_index,
                n_nodes = tree.n_nodes(),
                depth = tree.depth(),
                "tree trained"
            );
            (tree, in_bag)
        })
        .collect();

    let (trees, in_bag_per_tree): (Vec<DecisionTree>, Vec<Vec<usize>>) =
        tree_results.into_iter().unzip();

    let per_tree_importances: Vec<Vec<f64>> =
        trees.iter().map(|t| t.feature_importances()).collect();
    let importances = aggregate_importances(&per_tree_importances, dataset.feature_names());

    let oob_score = if config.oob_mode == OobMode::Enabled {
        Some(compute_oob(&trees, dataset, &in_bag_per_tree)?)
    } else {
        None
    };

    let forest = RandomForest {
        trees,
        params: ForestParams {
            n_estimators: config.n_estimators,
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            max_features: max_features_resolved,
            bootstrap,
            seed: config.seed,
        },
        n_features,
        feature_names: dataset.feature_names().to_vec(),
    };

    let metadata = TrainingMetadata {
        n_estimators: config.n_estimators,
        n_features,
        n_samples,
        max_features_resolved,
    };

    info!(
        oob_r2 = oob_score.as_ref().map(|s| s.r2),
        "random forest training complete"
    );

    Ok(RandomForestResult::new(
        forest,
        importances,
        oob_score,
        in_bag_per_tree,
        metadata,
    ))
}
