//! Random Forest regression: train, evaluate, predict, persist.
//!
//! CART regression trees split on variance reduction and are bagged into an
//! ensemble whose prediction is the unweighted mean of its members. Trees
//! are built in parallel via rayon from per-tree seeds drawn up front, so a
//! fixed seed gives the same forest at any thread count. Fitted forests
//! carry MDI feature importances and an optional out-of-bag score, can be
//! cross-validated, and round-trip through a validated bincode format.

mod config;
mod dataset;
mod error;
mod eval;
mod forest;
mod importance;
mod metrics;
mod node;
mod oob;
mod predict;
mod result;
mod serialize;
mod split;
mod tree;

pub use config::{MaxFeatures, OobMode, RandomForestConfig};
pub use dataset::Dataset;
pub use error::{ErrorKind, ForestError};
pub use eval::{CrossValidation, CrossValidationResult};
pub use forest::{ForestParams, RandomForest};
pub use importance::RankedFeature;
pub use metrics::RegressionMetrics;
pub use node::{FeatureIndex, Node, NodeIndex, Variance};
pub use oob::OobScore;
pub use result::{RandomForestResult, TrainingMetadata};
pub use tree::{DecisionTree, DecisionTreeConfig};
