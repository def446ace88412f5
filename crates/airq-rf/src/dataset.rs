//! Validated in-memory training table.

use crate::error::ForestError;

/// An immutable table of feature rows and regression targets.
///
/// Rows are kept row-major for callers and mirrored column-major for split
/// search, which scans one feature at a time.
#[derive(Debug, Clone)]
pub struct Dataset {
    rows: Vec<Vec<f64>>,
    columns: Vec<Vec<f64>>,
    targets: Vec<f64>,
    feature_names: Vec<String>,
}

impl Dataset {
    /// Build a dataset from row-major features and one target per row.
    ///
    /// Feature names default to `f0`, `f1`, ... An empty table is accepted
    /// here and rejected by `fit`.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`ForestError::TargetCountMismatch`] | `targets.len() != rows.len()` |
    /// | [`ForestError::FeatureCountMismatch`] | rows have inconsistent lengths |
    /// | [`ForestError::NonFiniteValue`] | any feature is NaN or infinite |
    /// | [`ForestError::NonFiniteTarget`] | any target is NaN or infinite |
    pub fn new(rows: Vec<Vec<f64>>, targets: Vec<f64>) -> Result<Self, ForestError> {
        if rows.len() != targets.len() {
            return Err(ForestError::TargetCountMismatch {
                n_rows: rows.len(),
                n_targets: targets.len(),
            });
        }

        let n_features = rows.first().map_or(0, Vec::len);
        for (sample_index, row) in rows.iter().enumerate() {
            if row.len() != n_features {
                return Err(ForestError::FeatureCountMismatch {
                    expected: n_features,
                    got: row.len(),
                    sample_index,
                });
            }
            if let Some(feature_index) = row.iter().position(|v| !v.is_finite()) {
                return Err(ForestError::NonFiniteValue {
                    sample_index,
                    feature_index,
                });
            }
        }
        if let Some(sample_index) = targets.iter().position(|t| !t.is_finite()) {
            return Err(ForestError::NonFiniteTarget { sample_index });
        }

        let columns: Vec<Vec<f64>> = (0..n_features)
            .map(|feat_idx| rows.iter().map(|row| row[feat_idx]).collect())
            .collect();
        let feature_names = (0..n_features).map(|f| format!("f{f}")).collect();

        Ok(Self {
            rows,
            columns,
            targets,
            feature_names,
        })
    }

    /// Replace the default feature names.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::FeatureNameCountMismatch`] when the number of
    /// names differs from the feature width.
    pub fn with_feature_names(mut self, names: Vec<String>) -> Result<Self, ForestError> {
        if names.len() != self.n_features() {
            return Err(ForestError::FeatureNameCountMismatch {
                n_features: self.n_features(),
                n_names: names.len(),
            });
        }
        self.feature_names = names;
        Ok(self)
    }

    /// Return a new dataset holding the given rows, in the given order.
    ///
    /// Indices may repeat. Feature names carry over.
    pub(crate) fn subset(&self, indices: &[usize]) -> Self {
        let rows: Vec<Vec<f64>> = indices.iter().map(|&i| self.rows[i].clone()).collect();
        let targets: Vec<f64> = indices.iter().map(|&i| self.targets[i]).collect();
        let columns = self
            .columns
            .iter()
            .map(|col| indices.iter().map(|&i| col[i]).collect())
            .collect();
        Self {
            rows,
            columns,
            targets,
            feature_names: self.feature_names.clone(),
        }
    }

    /// Return the feature rows (row-major).
    #[must_use]
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Return the feature columns (column-major).
    #[must_use]
    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    /// Return the regression targets.
    #[must_use]
    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    /// Return the feature names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Return the number of samples.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.rows.len()
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    /// Return `true` when the dataset has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
