//! Domain types for airq-io.

use crate::IoError;

/// Canonical sensor columns of an air-quality station export.
///
/// `aqi` is the usual regression target; the rest are pollutant and
/// weather readings.
pub const SENSOR_KEYS: [&str; 11] = [
    "aqi", "co", "dew", "h", "no2", "o3", "pm10", "pm25", "so2", "t", "w",
];

/// Label of one input row.
///
/// Taken from the id column when the table has one, otherwise the
/// zero-based row number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowId(String);

impl RowId {
    pub(crate) fn new(id: String) -> Self {
        Self(id)
    }

    /// Return the row ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated experiment name for output file naming.
///
/// Must match `[a-zA-Z0-9_-]+`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentName(String);

impl ExperimentName {
    /// Parse and validate an experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidExperimentName`] if the name is empty or
    /// contains characters outside `[a-zA-Z0-9_-]`.
    pub fn new(name: String) -> Result<Self, IoError> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(IoError::InvalidExperimentName { name });
        }
        Ok(Self(name))
    }

    /// Return the experiment name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExperimentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A labelled regression table read from CSV.
///
/// Produced by [`TrainingReader`](crate::TrainingReader). `ids[i]`,
/// `features[i]` and `targets[i]` describe the same row.
#[derive(Debug)]
pub struct TrainingTable {
    ids: Vec<RowId>,
    target_name: String,
    feature_names: Vec<String>,
    features: Vec<Vec<f64>>,
    targets: Vec<f64>,
}

impl TrainingTable {
    pub(crate) fn new(
        ids: Vec<RowId>,
        target_name: String,
        feature_names: Vec<String>,
        features: Vec<Vec<f64>>,
        targets: Vec<f64>,
    ) -> Self {
        Self {
            ids,
            target_name,
            feature_names,
            features,
            targets,
        }
    }

    /// Return the row IDs.
    #[must_use]
    pub fn ids(&self) -> &[RowId] {
        &self.ids
    }

    /// Return the name of the target column.
    #[must_use]
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Return the feature column names, in header order.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Return the feature matrix (row-major).
    #[must_use]
    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    /// Return the target values.
    #[must_use]
    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    /// Return the number of rows.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.features.len()
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Consume the table, returning `(feature_names, features, targets)`.
    #[must_use]
    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<f64>>, Vec<f64>) {
        (self.feature_names, self.features, self.targets)
    }
}

/// An unlabelled table whose columns are already ordered to a model.
///
/// Each row is kept as a `Result` so one unreadable row does not hide the
/// rest. Produced by [`PredictionReader`](crate::PredictionReader).
#[derive(Debug)]
pub struct PredictionTable {
    ids: Vec<RowId>,
    rows: Vec<Result<Vec<f64>, IoError>>,
    ignored_columns: Vec<String>,
}

impl PredictionTable {
    pub(crate) fn new(
        ids: Vec<RowId>,
        rows: Vec<Result<Vec<f64>, IoError>>,
        ignored_columns: Vec<String>,
    ) -> Self {
        Self {
            ids,
            rows,
            ignored_columns,
        }
    }

    /// Return the row IDs.
    #[must_use]
    pub fn ids(&self) -> &[RowId] {
        &self.ids
    }

    /// Return each row's features in model feature order, or the error
    /// that prevented reading it.
    #[must_use]
    pub fn rows(&self) -> &[Result<Vec<f64>, IoError>] {
        &self.rows
    }

    /// Return header columns that are not model features.
    #[must_use]
    pub fn ignored_columns(&self) -> &[String] {
        &self.ignored_columns
    }

    /// Return the number of rows, readable or not.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.rows.len()
    }

    /// Return the number of rows that could not be read.
    #[must_use]
    pub fn n_invalid(&self) -> usize {
        self.rows.iter().filter(|r| r.is_err()).count()
    }
}
