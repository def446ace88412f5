use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::{
    Dataset, ForestError,
    node::{FeatureIndex, Node, NodeIndex},
    split::{find_best_split, target_moments},
};

/// Configuration for a single CART regression tree.
///
/// Construct via [`DecisionTreeConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter           | Default               |
/// |---------------------|-----------------------|
/// | `max_depth`         | `None` (unlimited)    |
/// | `min_samples_split` | 2                     |
/// | `max_features`      | `None` (all features) |
/// | `seed`              | 42                    |
#[derive(Debug, Clone)]
pub struct DecisionTreeConfig {
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) max_features: Option<usize>,
    pub(crate) seed: u64,
}

/// Stopping rules and feature budget shared by every node of one tree.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GrowParams {
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) max_features: usize,
}

impl DecisionTreeConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            max_features: None,
            seed: 42,
        }
    }

    /// Set the maximum tree depth.
    ///
    /// `None` means grow until another stopping condition holds. `Some(d)`
    /// limits depth to `d` levels (root is depth 0).
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

    /// Set the number of features drawn as split candidates at each node.
    ///
    /// `None` means consider all features. Values above the feature count
    /// are clamped to it.
    #[must_use]
    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
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

    /// Return the maximum features to consider per split, if set.
    #[must_use]
    pub fn max_features(&self) -> Option<usize> {
        self.max_features
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Train a regression tree on every row of `dataset`.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`ForestError::EmptyDataset`]           | `dataset` has no rows                |
    /// | [`ForestError::ZeroFeatures`]           | rows have zero feature columns       |
    /// | [`ForestError::InvalidMinSamplesSplit`] | `min_samples_split` < 2              |
    /// | [`ForestError::InvalidMaxFeatures`]     | `max_features` is `Some(0)`          |
    #[instrument(skip_all, fields(n_samples = dataset.n_samples()))]
    pub fn fit(&self, dataset: &Dataset) -> Result<DecisionTree, ForestError> {
        if dataset.is_empty() {
            return Err(ForestError::EmptyDataset);
        }
        let n_features = dataset.n_features();
        if n_features == 0 {
            return Err(ForestError::ZeroFeatures);
        }
        if self.min_samples_split < 2 {
            return Err(ForestError::InvalidMinSamplesSplit {
                min_samples_split: self.min_samples_split,
            });
        }
        let max_features = self.max_features.unwrap_or(n_features);
        if max_features == 0 {
            return Err(ForestError::InvalidMaxFeatures {
                max_features,
                n_features,
            });
        }

        let params = GrowParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            max_features: max_features.min(n_features),
        };
        let sample_indices: Vec<usize> = (0..dataset.n_samples()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        Ok(grow(dataset, &sample_indices, &params, &mut rng))
    }
}

impl Default for DecisionTreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Grow one tree over `sample_indices` (which may repeat) of `dataset`.
///
/// Inputs must already be validated; this cannot fail.
pub(crate) fn grow(
    dataset: &Dataset,
    sample_indices: &[usize],
    params: &GrowParams,
    rng: &mut impl Rng,
) -> DecisionTree {
    let mut arena: Vec<Node> = Vec::new();
    let root = build_node(dataset, sample_indices, params, 0, rng, &mut arena);
    debug!(
        root_index = root.index(),
        n_nodes = arena.len(),
        "decision tree built"
    );
    DecisionTree {
        nodes: arena,
        root,
        n_features: dataset.n_features(),
    }
}

/// Draw `count` distinct feature indices out of `n_features`, in draw order.
///
/// Partial Fisher-Yates: only the first `count` positions are shuffled.
pub(crate) fn draw_features(
    n_features: usize,
    count: usize,
    rng: &mut impl Rng,
) -> Vec<FeatureIndex> {
    let take = count.min(n_features);
    let mut order: Vec<usize> = (0..n_features).collect();
    for i in 0..take {
        let j = rng.gen_range(i..n_features);
        order.swap(i, j);
    }
    order[..take].iter().copied().map(FeatureIndex::new).collect()
}

/// Recursively build the arena; returns the index of the node just created.
///
/// Nodes land in pre-order: a split reserves its slot before either child
/// is built, so every child index is greater than its parent's.
fn build_node(
    dataset: &Dataset,
    sample_indices: &[usize],
    params: &GrowParams,
    depth: usize,
    rng: &mut impl Rng,
    arena: &mut Vec<Node>,
) -> NodeIndex {
    let n_samples = sample_indices.len();
    let (mean, variance) = target_moments(dataset.targets(), sample_indices);

    let make_leaf = |arena: &mut Vec<Node>| -> NodeIndex {
        let idx = arena.len();
        arena.push(Node::Leaf {
            value: mean,
            variance,
            n_samples,
        });
        NodeIndex::new(idx)
    };

    let depth_exceeded = params.max_depth.is_some_and(|max_d| depth >= max_d);
    let too_few = n_samples < params.min_samples_split;
    let pure = variance.value() == 0.0;

    if depth_exceeded || too_few || pure {
        return make_leaf(arena);
    }

    let candidates = draw_features(dataset.n_features(), params.max_features, rng);
    let Some(split) = find_best_split(
        dataset.columns(),
        dataset.targets(),
        sample_indices,
        &candidates,
    ) else {
        return make_leaf(arena);
    };

    // Reserve the parent slot, recurse, then overwrite with the split.
    let node_idx = arena.len();
    arena.push(Node::Leaf {
        value: mean,
        variance,
        n_samples,
    });

    let left = build_node(dataset, &split.left_indices, params, depth + 1, rng, arena);
    let right = build_node(dataset, &split.right_indices, params, depth + 1, rng, arena);

    arena[node_idx] = Node::Split {
        feature: split.feature,
        threshold: split.threshold,
        left,
        right,
        variance,
        n_samples,
        impurity_decrease: split.impurity_decrease,
    };

    NodeIndex::new(node_idx)
}

/// A fitted CART regression tree.
///
/// Stored as an arena-based `Vec<Node>` with index references. Immutable
/// once built.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: NodeIndex,
    pub(crate) n_features: usize,
}

impl DecisionTree {
    /// Predict the target for a single sample.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict(&self, sample: &[f64]) -> Result<f64, ForestError> {
        self.check_width(sample)?;
        Ok(self.leaf_value(sample))
    }

    /// Return the arena index of the leaf that `sample` routes to.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn apply(&self, sample: &[f64]) -> Result<NodeIndex, ForestError> {
        self.check_width(sample)?;
        Ok(self.traverse(sample))
    }

    /// Compute Mean Decrease in Impurity (MDI) feature importances.
    ///
    /// Each split's `impurity_decrease` is accumulated by feature and the
    /// totals are normalized to sum to 1.0. All zeros for a single-leaf tree.
    #[must_use]
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut totals = vec![0.0f64; self.n_features];
        for node in &self.nodes {
            if let Node::Split {
                feature,
                impurity_decrease,
                ..
            } = node
            {
                totals[feature.index()] += impurity_decrease;
            }
        }
        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|v| *v /= sum);
        }
        totals
    }

    /// Return the arena, in pre-order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Return the index of the root node.
    #[must_use]
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// Return the root node.
    #[must_use]
    pub fn root_node(&self) -> &Node {
        &self.nodes[self.root.index()]
    }

    /// Return the node at `index`, if it exists.
    #[must_use]
    pub fn node(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(index.index())
    }

    /// Return the number of features the tree was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the total number of nodes in the tree (both splits and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the tree.
    ///
    /// A single-node tree (just a root leaf) has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }

        // BFS: (node_index, current_depth)
        let mut max_depth = 0usize;
        let mut queue = std::collections::VecDeque::new();
        queue.push_back((self.root.index(), 0usize));

        while let Some((node_idx, d)) = queue.pop_front() {
            match &self.nodes[node_idx] {
                Node::Leaf { .. } => max_depth = max_depth.max(d),
                Node::Split { left, right, .. } => {
                    queue.push_back((left.index(), d + 1));
                    queue.push_back((right.index(), d + 1));
                }
            }
        }

        max_depth
    }

    fn check_width(&self, sample: &[f64]) -> Result<(), ForestError> {
        if sample.len() != self.n_features {
            return Err(ForestError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }
        Ok(())
    }

    /// Leaf value for a sample whose width has already been checked.
    pub(crate) fn leaf_value(&self, sample: &[f64]) -> f64 {
        match &self.nodes[self.traverse(sample).index()] {
            Node::Leaf { value, .. } => *value,
            Node::Split { .. } => unreachable!("traverse always ends at a leaf"),
        }
    }

    fn traverse(&self, sample: &[f64]) -> NodeIndex {
        let mut idx = self.root;
        loop {
            match &self.nodes[idx.index()] {
                Node::Leaf { .. } => return idx,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if sample[feature.index()] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(rows: Vec<Vec<f64>>, targets: Vec<f64>) -> Dataset {
        Dataset::new(rows, targets).unwrap()
    }

    #[test]
    fn empty_dataset_error() {
        let ds = dataset(vec![], vec![]);
        let err = DecisionTreeConfig::new().fit(&ds).unwrap_err();
        assert!(matches!(err, ForestError::EmptyDataset));
    }

    #[test]
    fn identical_rows_give_root_leaf_with_mean() {
        let ds = dataset(vec![vec![1.0, 2.0]; 4], vec![1.0, 2.0, 3.0, 6.0]);
        let tree = DecisionTreeConfig::new().fit(&ds).unwrap();
        assert_eq!(tree.n_nodes(), 1);
        match tree.root_node() {
            Node::Leaf { value, n_samples, .. } => {
                assert!((value - 3.0).abs() < 1e-12);
                assert_eq!(*n_samples, 4);
            }
            Node::Split { .. } => panic!("root should be a leaf"),
        }
    }

    #[test]
    fn constant_target_stops_at_root() {
        let ds = dataset(vec![vec![1.0], vec![2.0], vec![3.0]], vec![7.0, 7.0, 7.0]);
        let tree = DecisionTreeConfig::new().fit(&ds).unwrap();
        assert_eq!(tree.n_nodes(), 1);
        assert!((tree.predict(&[100.0]).unwrap() - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn step_function_is_learned() {
        let ds = dataset(
            vec![vec![1.0], vec![2.0], vec![3.0], vec![10.0], vec![11.0], vec![12.0]],
            vec![5.0, 5.0, 5.0, 50.0, 50.0, 50.0],
        );
        let tree = DecisionTreeConfig::new().fit(&ds).unwrap();
        assert_eq!(tree.n_leaves(), 2);
        assert!((tree.predict(&[2.0]).unwrap() - 5.0).abs() < 1e-12);
        assert!((tree.predict(&[11.0]).unwrap() - 50.0).abs() < 1e-12);
        // Anything above the last left value routes right.
        assert!((tree.predict(&[3.5]).unwrap() - 50.0).abs() < 1e-12);
    }

    #[test]
    fn min_samples_split_makes_leaf() {
        let ds = dataset(vec![vec![1.0], vec![2.0], vec![3.0]], vec![0.0, 1.0, 2.0]);
        let tree = DecisionTreeConfig::new()
            .with_min_samples_split(4)
            .fit(&ds)
            .unwrap();
        assert_eq!(tree.n_nodes(), 1);
    }

    #[test]
    fn max_depth_limits_tree() {
        let rows: Vec<Vec<f64>> = (0..32).map(|i| vec![f64::from(i)]).collect();
        let targets: Vec<f64> = (0..32).map(|i| f64::from(i * i)).collect();
        let ds = dataset(rows, targets);
        for max_depth in 0..4 {
            let tree = DecisionTreeConfig::new()
                .with_max_depth(Some(max_depth))
                .fit(&ds)
                .unwrap();
            assert!(tree.depth() <= max_depth, "depth {} > {max_depth}", tree.depth());
        }
    }

    #[test]
    fn arena_is_preorder() {
        let rows: Vec<Vec<f64>> = (0..16).map(|i| vec![f64::from(i), f64::from(i % 3)]).collect();
        let targets: Vec<f64> = (0..16).map(|i| f64::from(i % 5)).collect();
        let tree = DecisionTreeConfig::new().fit(&dataset(rows, targets)).unwrap();
        assert_eq!(tree.root(), NodeIndex::ROOT);
        for (i, node) in tree.nodes().iter().enumerate() {
            if let Node::Split { left, right, .. } = node {
                assert_eq!(left.index(), i + 1);
                assert!(right.index() > left.index());
            }
        }
    }

    #[test]
    fn draw_features_distinct_and_clamped() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let drawn = draw_features(5, 3, &mut rng);
        assert_eq!(drawn.len(), 3);
        let mut sorted: Vec<usize> = drawn.iter().map(|f| f.index()).collect();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 3);

        let all = draw_features(4, 10, &mut rng);
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn deterministic_with_same_seed() {
        let rows: Vec<Vec<f64>> = (0..20)
            .map(|i| vec![f64::from(i), f64::from(20 - i), f64::from(i % 4)])
            .collect();
        let targets: Vec<f64> = (0..20).map(|i| f64::from(i) * 1.5).collect();
        let ds = dataset(rows, targets);
        let config = DecisionTreeConfig::new().with_max_features(Some(1)).with_seed(123);
        assert_eq!(config.fit(&ds).unwrap(), config.fit(&ds).unwrap());
    }

    #[test]
    fn prediction_feature_mismatch() {
        let ds = dataset(vec![vec![1.0, 2.0], vec![3.0, 4.0]], vec![0.0, 1.0]);
        let tree = DecisionTreeConfig::new().fit(&ds).unwrap();
        let err = tree.predict(&[1.0]).unwrap_err();
        assert!(matches!(
            err,
            ForestError::PredictionFeatureMismatch { expected: 2, got: 1 }
        ));
    }

    #[test]
    fn feature_importances_sum_to_one() {
        let rows: Vec<Vec<f64>> = (0..12).map(|i| vec![f64::from(i), f64::from(i % 2)]).collect();
        let targets: Vec<f64> = (0..12).map(|i| if i < 6 { 1.0 } else { 9.0 }).collect();
        let tree = DecisionTreeConfig::new().fit(&dataset(rows, targets)).unwrap();
        let importances = tree.feature_importances();
        let sum: f64 = importances.iter().sum();
        assert!((sum - 1.0).abs() < 1e-10, "sum = {sum}");
        assert!(importances[0] > importances[1]);
    }

    #[test]
    fn invalid_config_rejected() {
        let ds = dataset(vec![vec![1.0]], vec![1.0]);
        let err = DecisionTreeConfig::new()
            .with_min_samples_split(1)
            .fit(&ds)
            .unwrap_err();
        assert!(matches!(err, ForestError::InvalidMinSamplesSplit { .. }));
        let err = DecisionTreeConfig::new()
            .with_max_features(Some(0))
            .fit(&ds)
            .unwrap_err();
        assert!(matches!(err, ForestError::InvalidMaxFeatures { .. }));
    }
}
