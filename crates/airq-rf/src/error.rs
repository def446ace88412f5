use std::fmt;
use std::path::PathBuf;

/// Broad category of a [`ForestError`].
///
/// Callers that only care about *what kind* of failure happened (bad
/// hyperparameters, bad data, a damaged model file) match on this instead of
/// on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid hyperparameters, raised before any training work.
    Config,
    /// Bad training data or a prediction input of the wrong shape.
    InvalidInput,
    /// A persisted forest failed structural validation.
    ModelCorrupt,
    /// Reading or writing a model file failed.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Config => "config",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::ModelCorrupt => "model corrupt",
            ErrorKind::Io => "io",
        };
        f.write_str(name)
    }
}

/// Errors from Random Forest operations.
#[derive(Debug, thiserror::Error)]
pub enum ForestError {
    /// Returned when n_estimators is zero.
    #[error("n_estimators must be at least 1, got {n_estimators}")]
    InvalidEstimatorCount {
        /// The invalid n_estimators value provided.
        n_estimators: usize,
    },

    /// Returned when min_samples_split is less than 2.
    #[error("min_samples_split must be at least 2, got {min_samples_split}")]
    InvalidMinSamplesSplit {
        /// The invalid min_samples_split value provided.
        min_samples_split: usize,
    },

    /// Returned when max_features resolves to 0.
    #[error("max_features resolved to {max_features}, but must be in [1, {n_features}]")]
    InvalidMaxFeatures {
        /// The resolved max_features value.
        max_features: usize,
        /// The number of features in the dataset.
        n_features: usize,
    },

    /// Returned when a max_features policy string is not recognized.
    #[error("unknown max_features policy \"{policy}\" (expected all, sqrt, log2, or a positive integer)")]
    UnknownMaxFeatures {
        /// The unrecognized policy text.
        policy: String,
    },

    /// Returned when n_folds is less than 2.
    #[error("n_folds must be at least 2, got {n_folds}")]
    InvalidFoldCount {
        /// The invalid n_folds value provided.
        n_folds: usize,
    },

    /// Returned when the training dataset has zero samples.
    #[error("training dataset has zero samples")]
    EmptyDataset,

    /// Returned when the training dataset has zero feature columns.
    #[error("training dataset has zero feature columns")]
    ZeroFeatures,

    /// Returned when a sample has a different number of features than expected.
    #[error("sample {sample_index} has {got} features, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the sample.
        got: usize,
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when the number of targets differs from the number of rows.
    #[error("dataset has {n_rows} feature rows but {n_targets} targets")]
    TargetCountMismatch {
        /// Number of feature rows.
        n_rows: usize,
        /// Number of target values.
        n_targets: usize,
    },

    /// Returned when the number of feature names differs from the feature width.
    #[error("dataset has {n_features} feature columns but {n_names} names")]
    FeatureNameCountMismatch {
        /// Number of feature columns.
        n_features: usize,
        /// Number of names supplied.
        n_names: usize,
    },

    /// Returned when a training value is NaN or infinite.
    #[error("non-finite value at sample {sample_index}, feature {feature_index}")]
    NonFiniteValue {
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// The zero-based index of the offending feature column.
        feature_index: usize,
    },

    /// Returned when a training target is NaN or infinite.
    #[error("non-finite target at sample {sample_index}")]
    NonFiniteTarget {
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when a sample has a different number of features at prediction time.
    #[error("prediction input has {got} features, expected {expected}")]
    PredictionFeatureMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the prediction input.
        got: usize,
    },

    /// Returned when there are fewer samples than cross-validation folds.
    #[error("dataset has only {n_samples} samples, need at least {n_folds} for {n_folds}-fold CV")]
    TooFewSamplesForFolds {
        /// The number of samples available.
        n_samples: usize,
        /// The requested number of folds.
        n_folds: usize,
    },

    /// Returned when OOB evaluation fails (no sample has any OOB tree).
    #[error("OOB evaluation failed: {reason}")]
    OobEvaluationFailed {
        /// Human-readable description of why OOB evaluation failed.
        reason: String,
    },

    /// Returned when regression metrics get empty or unpaired inputs.
    #[error("cannot score {n_predictions} predictions against {n_targets} targets")]
    MetricInput {
        /// Number of predictions supplied.
        n_predictions: usize,
        /// Number of targets supplied.
        n_targets: usize,
    },

    /// Returned when the persisted header holds values no fit could produce.
    #[error("corrupt model header: {reason}")]
    CorruptHeader {
        /// What was wrong with the header.
        reason: String,
    },

    /// Returned when a persisted node fails structural validation.
    #[error("corrupt model: tree {tree_index}, node {node_index}: {reason}")]
    CorruptNode {
        /// Index of the tree within the forest.
        tree_index: usize,
        /// Index of the node within the tree's serialized array.
        node_index: usize,
        /// What was wrong with the node.
        reason: String,
    },

    /// Returned when the model bytes cannot be decoded at all.
    #[error("failed to decode model")]
    DecodeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when loading a model with an incompatible format version.
    #[error("incompatible model version: expected {expected}, found {found}")]
    IncompatibleModelVersion {
        /// The model format version this build expects.
        expected: u32,
        /// The model format version found in the data.
        found: u32,
    },

    /// Returned when model serialization fails.
    #[error("failed to serialize model")]
    SerializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when writing the model file fails.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the model file fails.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

impl ForestError {
    /// Return the broad category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ForestError::InvalidEstimatorCount { .. }
            | ForestError::InvalidMinSamplesSplit { .. }
            | ForestError::InvalidMaxFeatures { .. }
            | ForestError::UnknownMaxFeatures { .. }
            | ForestError::InvalidFoldCount { .. } => ErrorKind::Config,

            ForestError::EmptyDataset
            | ForestError::ZeroFeatures
            | ForestError::FeatureCountMismatch { .. }
            | ForestError::TargetCountMismatch { .. }
            | ForestError::FeatureNameCountMismatch { .. }
            | ForestError::NonFiniteValue { .. }
            | ForestError::NonFiniteTarget { .. }
            | ForestError::PredictionFeatureMismatch { .. }
            | ForestError::TooFewSamplesForFolds { .. }
            | ForestError::OobEvaluationFailed { .. }
            | ForestError::MetricInput { .. } => ErrorKind::InvalidInput,

            ForestError::CorruptHeader { .. }
            | ForestError::CorruptNode { .. }
            | ForestError::DecodeModel { .. }
            | ForestError::IncompatibleModelVersion { .. } => ErrorKind::ModelCorrupt,

            ForestError::SerializeModel { .. }
            | ForestError::WriteModel { .. }
            | ForestError::ReadModel { .. } => ErrorKind::Io,
        }
    }
}
