//! File I/O, validation, and serialization for the airq pipeline.

mod domain;
mod error;
mod reader;
mod sensor;
mod writer;

pub use domain::{ExperimentName, PredictionTable, RowId, SENSOR_KEYS, TrainingTable};
pub use error::IoError;
pub use reader::{PredictionReader, TrainingReader};
pub use sensor::SensorSnapshot;
pub use writer::{EvaluationReport, FeatureEntry, FoldEntry, ResultWriter, TrainingReport};
