use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use airq_io::{
    EvaluationReport, ExperimentName, FeatureEntry, FoldEntry, PredictionReader,
    PredictionTable, ResultWriter, RowId, SensorSnapshot, TrainingReader, TrainingReport,
    TrainingTable,
};
use airq_rf::{
    CrossValidation, Dataset, MaxFeatures, OobMode, RandomForest, RandomForestConfig,
    RankedFeature,
};

#[derive(Parser)]
#[command(name = "airq")]
#[command(about = "Air-quality index regression from sensor readings with a random forest")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Training table location and column roles.
#[derive(Args, Debug, Clone)]
struct DataArgs {
    /// Path to the training CSV file
    #[arg(long)]
    data: PathBuf,

    /// Name of the target column
    #[arg(long, default_value = "aqi")]
    target: String,

    /// Name of the optional row id column
    #[arg(long, default_value = "id")]
    id_column: String,
}

/// Forest hyperparameters shared by training and evaluation.
#[derive(Args, Debug, Clone)]
struct ForestArgs {
    /// Number of trees in the forest
    #[arg(long, default_value_t = 100)]
    n_estimators: usize,

    /// Maximum tree depth (unlimited if not set)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Minimum samples a node needs to be split
    #[arg(long, default_value_t = 2)]
    min_samples_split: usize,

    /// Features drawn per split: "sqrt", "log2", "all", or a count
    #[arg(long, default_value = "sqrt")]
    max_features: String,

    /// Train every tree on all rows instead of a bootstrap sample
    #[arg(long, default_value_t = false)]
    no_bootstrap: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Fit a forest on a training table and save the model
    Train {
        #[command(flatten)]
        data: DataArgs,

        /// Experiment name for output files (must match [a-zA-Z0-9_-]+)
        #[arg(long)]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Compute the out-of-bag score
        #[arg(long, default_value_t = false)]
        oob: bool,

        #[command(flatten)]
        forest: ForestArgs,
    },

    /// Estimate generalization error with k-fold cross-validation
    Evaluate {
        #[command(flatten)]
        data: DataArgs,

        /// Experiment name for output files (must match [a-zA-Z0-9_-]+)
        #[arg(long)]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Number of cross-validation folds
        #[arg(long, default_value_t = 5)]
        folds: usize,

        #[command(flatten)]
        forest: ForestArgs,
    },

    /// Predict the target for every row of a CSV file
    Predict {
        /// Path to the trained model binary
        #[arg(long)]
        model: PathBuf,

        /// Path to the CSV file of rows to score
        #[arg(long)]
        input: PathBuf,

        /// Name of the optional row id column
        #[arg(long, default_value = "id")]
        id_column: String,

        /// Experiment name for output files
        #[arg(long)]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Predict the target for one snapshot of sensor readings
    Score {
        /// Path to the trained model binary
        #[arg(long)]
        model: PathBuf,

        /// Sensor readings as key=value pairs, e.g. pm25=88 t=3.5
        #[arg(required = true)]
        readings: Vec<String>,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct TrainOutput {
    experiment: String,
    model: String,
    n_samples: usize,
    n_features: usize,
    n_estimators: usize,
    max_features: usize,
    oob_r2: Option<f64>,
    top_feature: Option<String>,
}

#[derive(Serialize)]
struct EvaluateOutput {
    experiment: String,
    n_samples: usize,
    n_folds: usize,
    cv_mean_r2: f64,
    cv_std_r2: f64,
    cv_mean_rmse: f64,
    cv_std_rmse: f64,
}

#[derive(Serialize)]
struct PredictOutput {
    experiment: String,
    n_rows: usize,
    n_failed: usize,
    model_n_trees: usize,
    model_n_features: usize,
}

#[derive(Serialize)]
struct ScoreOutput {
    prediction: f64,
    n_readings: usize,
    model_n_trees: usize,
}

fn build_config(args: &ForestArgs, seed: u64) -> Result<RandomForestConfig> {
    let max_features: MaxFeatures = args
        .max_features
        .parse()
        .context("invalid --max-features")?;
    Ok(RandomForestConfig::new(args.n_estimators)?
        .with_max_depth(args.max_depth)
        .with_min_samples_split(args.min_samples_split)
        .with_max_features(max_features)
        .with_bootstrap(!args.no_bootstrap)
        .with_seed(seed))
}

fn read_training(args: &DataArgs) -> Result<TrainingTable> {
    let table = TrainingReader::new(&args.data)
        .with_target(&args.target)
        .with_id_column(&args.id_column)
        .read()
        .context("failed to read training CSV")?;
    Ok(table)
}

fn to_dataset(table: TrainingTable) -> Result<Dataset> {
    let (names, features, targets) = table.into_parts();
    let dataset = Dataset::new(features, targets)
        .and_then(|ds| ds.with_feature_names(names))
        .context("training table is not a valid dataset")?;
    Ok(dataset)
}

fn feature_entries(ranked: &[RankedFeature]) -> Vec<FeatureEntry<'_>> {
    ranked
        .iter()
        .map(|f| FeatureEntry {
            name: &f.name,
            importance: f.importance,
            rank: f.rank,
        })
        .collect()
}

fn load_model(path: &Path) -> Result<RandomForest> {
    let forest = RandomForest::load(path).context("failed to load model")?;
    Ok(forest)
}

/// Score every readable row in one batch and pair each row with its outcome.
///
/// Rows that failed to read keep their read error; the rest carry the
/// forest's prediction or prediction error.
fn score_rows(
    forest: &RandomForest,
    table: &PredictionTable,
) -> Vec<(RowId, std::result::Result<f64, String>)> {
    let readable: Vec<Vec<f64>> = table
        .rows()
        .iter()
        .filter_map(|row| row.as_ref().ok().cloned())
        .collect();
    let mut scored = forest.predict_batch(&readable).into_iter();

    table
        .ids()
        .iter()
        .zip(table.rows())
        .map(|(id, row)| {
            let outcome = match row {
                Ok(_) => scored
                    .next()
                    .map_or_else(|| Err("row was not scored".to_string()), |p| {
                        p.map_err(|e| e.to_string())
                    }),
                Err(e) => Err(e.to_string()),
            };
            (id.clone(), outcome)
        })
        .collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Configure Rayon thread pool
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Train {
            data,
            experiment,
            output_dir,
            oob,
            forest,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;
            let oob_mode = if oob { OobMode::Enabled } else { OobMode::Disabled };
            let config = build_config(&forest, cli.seed)?.with_oob_mode(oob_mode);

            // 1. Read table
            let table = read_training(&data)?;
            let target = table.target_name().to_string();
            let dataset = to_dataset(table)?;

            // 2. Fit
            let result = config.fit(&dataset).context("training failed")?;
            let model = result.forest();
            let oob_score = result.oob_score();

            // 3. Save model
            let writer = ResultWriter::new(&output_dir, experiment_name)?;
            let model_path = writer.model_path();
            model.save(&model_path).context("failed to save model")?;

            // 4. Write training JSON
            let params = model.params();
            writer.write_training(&TrainingReport {
                target: &target,
                n_samples: dataset.n_samples(),
                n_features: dataset.n_features(),
                n_estimators: params.n_estimators,
                max_depth: params.max_depth,
                min_samples_split: params.min_samples_split,
                max_features: params.max_features,
                bootstrap: params.bootstrap,
                seed: params.seed,
                oob_mse: oob_score.map(|s| s.mse),
                oob_r2: oob_score.map(|s| s.r2),
                n_oob_samples: oob_score.map(|s| s.n_oob_samples),
                feature_importances: feature_entries(result.importances()),
            })?;

            // 5. Print summary
            let output = TrainOutput {
                experiment,
                model: model_path.display().to_string(),
                n_samples: dataset.n_samples(),
                n_features: dataset.n_features(),
                n_estimators: params.n_estimators,
                max_features: params.max_features,
                oob_r2: oob_score.map(|s| s.r2),
                top_feature: result.importances().first().map(|f| f.name.clone()),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Evaluate {
            data,
            experiment,
            output_dir,
            folds,
            forest,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;
            let config = build_config(&forest, cli.seed)?;
            let cv = CrossValidation::new(folds)?.with_seed(cli.seed);

            let table = read_training(&data)?;
            let target = table.target_name().to_string();
            let dataset = to_dataset(table)?;

            let cv_result = cv
                .evaluate(&config, &dataset)
                .context("cross-validation failed")?;

            let writer = ResultWriter::new(&output_dir, experiment_name)?;
            writer.write_evaluation(&EvaluationReport {
                target: &target,
                n_samples: cv_result.n_samples,
                n_features: cv_result.n_features,
                n_folds: cv_result.n_folds,
                mean_r2: cv_result.mean_r2,
                std_r2: cv_result.std_r2,
                mean_rmse: cv_result.mean_rmse,
                std_rmse: cv_result.std_rmse,
                folds: cv_result
                    .fold_metrics
                    .iter()
                    .enumerate()
                    .map(|(fold, m)| FoldEntry {
                        fold,
                        mse: m.mse,
                        rmse: m.rmse,
                        mae: m.mae,
                        r2: m.r2,
                    })
                    .collect(),
                feature_importances: feature_entries(&cv_result.feature_importances),
            })?;

            let output = EvaluateOutput {
                experiment,
                n_samples: cv_result.n_samples,
                n_folds: cv_result.n_folds,
                cv_mean_r2: cv_result.mean_r2,
                cv_std_r2: cv_result.std_r2,
                cv_mean_rmse: cv_result.mean_rmse,
                cv_std_rmse: cv_result.std_rmse,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Predict {
            model,
            input,
            id_column,
            experiment,
            output_dir,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;

            // 1. Load model
            let forest = load_model(&model)?;

            // 2. Read rows, mapped onto the model's feature order
            let table = PredictionReader::new(&input, forest.feature_names())
                .with_id_column(&id_column)
                .read()
                .context("failed to read input CSV")?;

            // 3. Predict; a failing row does not abort the batch
            let predictions = score_rows(&forest, &table);
            let n_failed = predictions.iter().filter(|(_, p)| p.is_err()).count();

            // 4. Write predictions JSON
            let writer = ResultWriter::new(&output_dir, experiment_name)?;
            writer.write_predictions(&model, &predictions)?;

            // 5. Print summary
            let output = PredictOutput {
                experiment,
                n_rows: table.n_samples(),
                n_failed,
                model_n_trees: forest.n_trees(),
                model_n_features: forest.n_features(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Score { model, readings } => {
            let forest = load_model(&model)?;

            let snapshot = SensorSnapshot::parse(readings.as_slice())
                .context("invalid sensor readings")?;
            let features = snapshot.to_features(forest.feature_names())?;
            let prediction = forest.predict(&features).context("prediction failed")?;

            let output = ScoreOutput {
                prediction,
                n_readings: snapshot.len(),
                model_n_trees: forest.n_trees(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use airq_io::PredictionReader;
    use airq_rf::{Dataset, MaxFeatures, RandomForestConfig};
    use tempfile::NamedTempFile;

    use super::score_rows;

    #[test]
    fn unreadable_row_keeps_its_error_and_siblings_are_scored() {
        let dataset = Dataset::new(
            vec![vec![1.0, 2.0], vec![4.0, 5.0], vec![8.0, 1.0]],
            vec![10.0, 40.0, 80.0],
        )
        .and_then(|ds| ds.with_feature_names(vec!["pm25".into(), "o3".into()]))
        .unwrap();
        let forest = RandomForestConfig::new(3)
            .unwrap()
            .with_bootstrap(false)
            .with_max_features(MaxFeatures::All)
            .fit(&dataset)
            .unwrap()
            .into_forest();

        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"id,pm25,o3\nA,1,2\nB,,3\nC,4,5\n").unwrap();
        f.flush().unwrap();
        let table = PredictionReader::new(f.path(), forest.feature_names())
            .read()
            .unwrap();

        let scored = score_rows(&forest, &table);
        assert_eq!(scored.len(), 3);
        assert_eq!(scored[0].0.as_str(), "A");
        assert!((scored[0].1.clone().unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(scored[1].0.as_str(), "B");
        assert!(scored[1].1.as_ref().unwrap_err().contains("pm25"));
        assert_eq!(scored[2].0.as_str(), "C");
        assert!((scored[2].1.clone().unwrap() - 40.0).abs() < 1e-9);
    }
}
