//! Model serialization and deserialization via bincode.
//!
//! The persisted form is a versioned envelope holding a header and, per
//! tree, a flat pre-order list of node records. Nothing decoded is trusted:
//! [`RandomForest::from_bytes`] rebuilds the arena only after every record
//! passes structural validation, so a loaded forest routes exactly like a
//! fitted one.

use std::path::Path;

use tracing::{debug, info, instrument};

use crate::error::ForestError;
use crate::forest::{ForestParams, RandomForest};
use crate::node::{FeatureIndex, Node, NodeIndex, Variance};
use crate::tree::DecisionTree;

/// Current binary format version.
const FORMAT_VERSION: u32 = 1;

/// Versioned envelope for the serialized model.
///
/// `format_version` must stay the first field: it is peeked before the rest
/// is decoded.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct ModelEnvelope {
    format_version: u32,
    header: ModelHeader,
    trees: Vec<Vec<NodeRecord>>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct ModelHeader {
    n_estimators: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    max_features: usize,
    bootstrap: bool,
    seed: u64,
    n_features: usize,
    feature_names: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
enum NodeTag {
    Leaf,
    Split,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct SplitRecord {
    feature: usize,
    threshold: f64,
    left: usize,
    right: usize,
    impurity_decrease: f64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct NodeRecord {
    tag: NodeTag,
    value: Option<f64>,
    split: Option<SplitRecord>,
    n_samples: usize,
    variance: f64,
}

impl From<&Node> for NodeRecord {
    fn from(node: &Node) -> Self {
        match node {
            Node::Leaf {
                value,
                variance,
                n_samples,
            } => NodeRecord {
                tag: NodeTag::Leaf,
                value: Some(*value),
                split: None,
                n_samples: *n_samples,
                variance: variance.value(),
            },
            Node::Split {
                feature,
                threshold,
                left,
                right,
                variance,
                n_samples,
                impurity_decrease,
            } => NodeRecord {
                tag: NodeTag::Split,
                value: None,
                split: Some(SplitRecord {
                    feature: feature.index(),
                    threshold: *threshold,
                    left: left.index(),
                    right: right.index(),
                    impurity_decrease: *impurity_decrease,
                }),
                n_samples: *n_samples,
                variance: variance.value(),
            },
        }
    }
}

impl ModelEnvelope {
    fn from_forest(forest: &RandomForest) -> Self {
        let params = &forest.params;
        ModelEnvelope {
            format_version: FORMAT_VERSION,
            header: ModelHeader {
                n_estimators: params.n_estimators,
                max_depth: params.max_depth,
                min_samples_split: params.min_samples_split,
                max_features: params.max_features,
                bootstrap: params.bootstrap,
                seed: params.seed,
                n_features: forest.n_features,
                feature_names: forest.feature_names.clone(),
            },
            trees: forest
                .trees
                .iter()
                .map(|tree| tree.nodes.iter().map(NodeRecord::from).collect())
                .collect(),
        }
    }

    fn into_forest(self) -> Result<RandomForest, ForestError> {
        let header = self.header;
        validate_header(&header)?;
        if self.trees.len() != header.n_estimators {
            return Err(ForestError::CorruptHeader {
                reason: format!(
                    "header declares {} trees but {} are stored",
                    header.n_estimators,
                    self.trees.len()
                ),
            });
        }

        let trees = self
            .trees
            .into_iter()
            .enumerate()
            .map(|(tree_index, records)| build_tree(tree_index, &records, header.n_features))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RandomForest {
            trees,
            params: ForestParams {
                n_estimators: header.n_estimators,
                max_depth: header.max_depth,
                min_samples_split: header.min_samples_split,
                max_features: header.max_features,
                bootstrap: header.bootstrap,
                seed: header.seed,
            },
            n_features: header.n_features,
            feature_names: header.feature_names,
        })
    }
}

fn validate_header(header: &ModelHeader) -> Result<(), ForestError> {
    let reason = if header.n_estimators == 0 {
        "n_estimators is zero".to_string()
    } else if header.n_features == 0 {
        "feature width is zero".to_string()
    } else if header.min_samples_split < 2 {
        format!("min_samples_split is {}", header.min_samples_split)
    } else if header.max_features == 0 || header.max_features > header.n_features {
        format!(
            "max_features {} outside [1, {}]",
            header.max_features, header.n_features
        )
    } else if header.feature_names.len() != header.n_features {
        format!(
            "{} feature names for width {}",
            header.feature_names.len(),
            header.n_features
        )
    } else {
        return Ok(());
    };
    Err(ForestError::CorruptHeader { reason })
}

/// Rebuild one tree arena from its records, checking every structural rule.
///
/// Children must sit after their parent, and every node except the root
/// must have exactly one parent. Together these make the records a single
/// tree rooted at index 0, so routing always terminates at a leaf.
fn build_tree(
    tree_index: usize,
    records: &[NodeRecord],
    n_features: usize,
) -> Result<DecisionTree, ForestError> {
    let corrupt = |node_index: usize, reason: String| ForestError::CorruptNode {
        tree_index,
        node_index,
        reason,
    };

    if records.is_empty() {
        return Err(corrupt(0, "tree has no nodes".to_string()));
    }

    let n_nodes = records.len();
    let mut parents = vec![0usize; n_nodes];
    let mut nodes = Vec::with_capacity(n_nodes);

    for (node_index, record) in records.iter().enumerate() {
        if !record.variance.is_finite() || record.variance < 0.0 {
            return Err(corrupt(
                node_index,
                format!("invalid variance {}", record.variance),
            ));
        }
        let variance = Variance::new(record.variance);

        let node = match (record.tag, record.value, &record.split) {
            (NodeTag::Leaf, _, Some(_)) => {
                return Err(corrupt(node_index, "leaf carries split fields".to_string()));
            }
            (NodeTag::Leaf, None, None) => {
                return Err(corrupt(node_index, "leaf has no value".to_string()));
            }
            (NodeTag::Leaf, Some(value), None) => {
                if !value.is_finite() {
                    return Err(corrupt(node_index, format!("non-finite leaf value {value}")));
                }
                Node::Leaf {
                    value,
                    variance,
                    n_samples: record.n_samples,
                }
            }
            (NodeTag::Split, Some(_), _) => {
                return Err(corrupt(node_index, "split carries a leaf value".to_string()));
            }
            (NodeTag::Split, None, None) => {
                return Err(corrupt(node_index, "split has no split fields".to_string()));
            }
            (NodeTag::Split, None, Some(split)) => {
                if split.feature >= n_features {
                    return Err(corrupt(
                        node_index,
                        format!("feature {} out of range for width {n_features}", split.feature),
                    ));
                }
                if !split.threshold.is_finite() {
                    return Err(corrupt(
                        node_index,
                        format!("non-finite threshold {}", split.threshold),
                    ));
                }
                if !split.impurity_decrease.is_finite() {
                    return Err(corrupt(
                        node_index,
                        format!("non-finite impurity decrease {}", split.impurity_decrease),
                    ));
                }
                for (side, child) in [("left", split.left), ("right", split.right)] {
                    if child >= n_nodes {
                        return Err(corrupt(
                            node_index,
                            format!("{side} child {child} out of range ({n_nodes} nodes)"),
                        ));
                    }
                    if child <= node_index {
                        return Err(corrupt(
                            node_index,
                            format!("{side} child {child} does not follow its parent"),
                        ));
                    }
                    parents[child] += 1;
                    if parents[child] > 1 {
                        return Err(corrupt(
                            node_index,
                            format!("{side} child {child} already has a parent"),
                        ));
                    }
                }
                Node::Split {
                    feature: FeatureIndex::new(split.feature),
                    threshold: split.threshold,
                    left: NodeIndex::new(split.left),
                    right: NodeIndex::new(split.right),
                    variance,
                    n_samples: record.n_samples,
                    impurity_decrease: split.impurity_decrease,
                }
            }
        };
        nodes.push(node);
    }

    if let Some(orphan) = (1..n_nodes).find(|&i| parents[i] == 0) {
        return Err(corrupt(orphan, "node is unreachable from the root".to_string()));
    }

    Ok(DecisionTree {
        nodes,
        root: NodeIndex::ROOT,
        n_features,
    })
}

impl RandomForest {
    /// Encode the forest into the versioned binary format.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::SerializeModel`] if bincode encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ForestError> {
        let envelope = ModelEnvelope::from_forest(self);
        bincode::serialize(&envelope).map_err(|e| ForestError::SerializeModel { source: e })
    }

    /// Decode and validate a forest produced by [`RandomForest::to_bytes`].
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::DecodeModel`] | bytes are not a decodable envelope |
    /// | [`ForestError::IncompatibleModelVersion`] | format version mismatch |
    /// | [`ForestError::CorruptHeader`] | header values or tree count are invalid |
    /// | [`ForestError::CorruptNode`] | a node record fails structural validation |
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ForestError> {
        let found: u32 =
            bincode::deserialize(bytes).map_err(|e| ForestError::DecodeModel { source: e })?;
        if found != FORMAT_VERSION {
            return Err(ForestError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found,
            });
        }

        let envelope: ModelEnvelope =
            bincode::deserialize(bytes).map_err(|e| ForestError::DecodeModel { source: e })?;
        envelope.into_forest()
    }

    /// Save the model to a binary file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::SerializeModel`] | bincode encoding failed |
    /// | [`ForestError::WriteModel`] | file write failed |
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ForestError> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;

        std::fs::write(path, &bytes).map_err(|e| ForestError::WriteModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        info!(
            size_bytes = bytes.len(),
            n_trees = self.trees.len(),
            "model saved"
        );

        Ok(())
    }

    /// Load and validate a model from a binary file.
    ///
    /// # Errors
    ///
    /// [`ForestError::ReadModel`] if the file cannot be read, otherwise any
    /// error of [`RandomForest::from_bytes`].
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ForestError> {
        let path = path.as_ref();

        let bytes = std::fs::read(path).map_err(|e| ForestError::ReadModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        let forest = Self::from_bytes(&bytes)?;

        debug!(
            n_trees = forest.trees.len(),
            n_features = forest.n_features,
            "model loaded"
        );

        Ok(forest)
    }
}
