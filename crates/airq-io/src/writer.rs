//! JSON result writer for training, evaluation, and prediction outputs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::{ExperimentName, RowId};

/// One ranked feature importance, as written to JSON.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureEntry<'a> {
    /// Feature name.
    pub name: &'a str,
    /// Normalized importance.
    pub importance: f64,
    /// 1-based rank.
    pub rank: usize,
}

/// Summary of a training run.
///
/// Plain values only: the writer has no dependency on `airq-rf`.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport<'a> {
    /// Name of the target column.
    pub target: &'a str,
    /// Training rows.
    pub n_samples: usize,
    /// Feature columns.
    pub n_features: usize,
    /// Trees in the forest.
    pub n_estimators: usize,
    /// Depth bound, `None` when unbounded.
    pub max_depth: Option<usize>,
    /// Minimum rows for a node to be split.
    pub min_samples_split: usize,
    /// Candidate features per split, resolved against the table.
    pub max_features: usize,
    /// Whether trees trained on bootstrap samples.
    pub bootstrap: bool,
    /// Master seed.
    pub seed: u64,
    /// Out-of-bag MSE, when computed.
    pub oob_mse: Option<f64>,
    /// Out-of-bag R², when computed.
    pub oob_r2: Option<f64>,
    /// Rows with at least one out-of-bag tree, when computed.
    pub n_oob_samples: Option<usize>,
    /// Features by decreasing importance.
    pub feature_importances: Vec<FeatureEntry<'a>>,
}

/// Held-out metrics of one cross-validation fold.
#[derive(Debug, Clone, Serialize)]
pub struct FoldEntry {
    /// Zero-based fold index.
    pub fold: usize,
    /// Mean squared error on the held-out rows.
    pub mse: f64,
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean absolute error.
    pub mae: f64,
    /// Coefficient of determination.
    pub r2: f64,
}

/// Summary of a cross-validation run.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport<'a> {
    /// Name of the target column.
    pub target: &'a str,
    /// Rows across all folds.
    pub n_samples: usize,
    /// Feature columns.
    pub n_features: usize,
    /// Number of folds.
    pub n_folds: usize,
    /// Mean held-out R².
    pub mean_r2: f64,
    /// Population standard deviation of held-out R².
    pub std_r2: f64,
    /// Mean held-out RMSE.
    pub mean_rmse: f64,
    /// Population standard deviation of held-out RMSE.
    pub std_rmse: f64,
    /// Per-fold metrics, in fold order.
    pub folds: Vec<FoldEntry>,
    /// Importances averaged over the fold models.
    pub feature_importances: Vec<FeatureEntry<'a>>,
}

/// Writes run results to JSON files.
///
/// Creates the output directory on construction if it does not exist.
/// Output files are named `{experiment}_train.json`,
/// `{experiment}_evaluate.json` and `{experiment}_predict.json`.
pub struct ResultWriter {
    output_dir: PathBuf,
    experiment: ExperimentName,
}

impl ResultWriter {
    /// Create a new writer targeting the given directory and experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), experiment = %experiment))]
    pub fn new(output_dir: &Path, experiment: ExperimentName) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            experiment,
        })
    }

    fn artifact_path(&self, suffix: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{suffix}.json", self.experiment.as_str()))
    }

    fn write_json<T: Serialize>(&self, path: &Path, artifact: &T) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(artifact).map_err(|e| IoError::EncodeJson {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, &json).map_err(|e| IoError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write a training summary to `{experiment}_train.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::EncodeJson`] or [`IoError::WriteFile`].
    #[instrument(skip_all)]
    pub fn write_training(&self, report: &TrainingReport<'_>) -> Result<PathBuf, IoError> {
        let path = self.artifact_path("train");
        let artifact = Artifact {
            experiment: self.experiment.as_str(),
            report,
        };
        self.write_json(&path, &artifact)?;
        info!(path = %path.display(), "training result written");
        Ok(path)
    }

    /// Write a cross-validation summary to `{experiment}_evaluate.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::EncodeJson`] or [`IoError::WriteFile`].
    #[instrument(skip_all)]
    pub fn write_evaluation(&self, report: &EvaluationReport<'_>) -> Result<PathBuf, IoError> {
        let path = self.artifact_path("evaluate");
        let artifact = Artifact {
            experiment: self.experiment.as_str(),
            report,
        };
        self.write_json(&path, &artifact)?;
        info!(path = %path.display(), "evaluation result written");
        Ok(path)
    }

    /// Write predictions to `{experiment}_predict.json`.
    ///
    /// Each row carries either its predicted value or the message of the
    /// error that prevented scoring it.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::EncodeJson`] or [`IoError::WriteFile`].
    #[instrument(skip_all, fields(n_rows = predictions.len()))]
    pub fn write_predictions(
        &self,
        model: &Path,
        predictions: &[(RowId, Result<f64, String>)],
    ) -> Result<PathBuf, IoError> {
        let path = self.artifact_path("predict");

        let entries: Vec<PredictionEntry<'_>> = predictions
            .iter()
            .map(|(id, outcome)| PredictionEntry {
                id: id.as_str(),
                prediction: outcome.as_ref().ok().copied(),
                error: outcome.as_ref().err().map(String::as_str),
            })
            .collect();
        let n_failed = entries.iter().filter(|e| e.error.is_some()).count();

        let model = model.display().to_string();
        let artifact = PredictArtifact {
            experiment: self.experiment.as_str(),
            model: &model,
            n_rows: entries.len(),
            n_failed,
            predictions: entries,
        };
        self.write_json(&path, &artifact)?;

        info!(path = %path.display(), n_failed, "predictions written");
        Ok(path)
    }

    /// Return the path where the model binary should be saved.
    ///
    /// Does not write anything; just computes `{output_dir}/{experiment}_model.bin`.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_model.bin", self.experiment.as_str()))
    }
}

// --- Shadow structs for JSON serialization ---

#[derive(Serialize)]
struct Artifact<'a, T: Serialize> {
    experiment: &'a str,
    #[serde(flatten)]
    report: &'a T,
}

#[derive(Serialize)]
struct PredictArtifact<'a> {
    experiment: &'a str,
    model: &'a str,
    n_rows: usize,
    n_failed: usize,
    predictions: Vec<PredictionEntry<'a>>,
}

#[derive(Serialize)]
struct PredictionEntry<'a> {
    id: &'a str,
    prediction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}
