//! CSV readers with full input validation.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::IoError;
use crate::domain::{PredictionTable, RowId, SENSOR_KEYS, TrainingTable};

/// Open `path` as a headed CSV and return the reader with its header.
///
/// `flexible(true)` lets ragged rows through the parser so the caller's
/// [`IoError::InconsistentRowLength`] check reports them.
fn open_csv(path: &Path) -> Result<(csv::Reader<File>, csv::StringRecord), IoError> {
    let file = File::open(path).map_err(|e| IoError::FileNotFound {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let header = rdr.headers().map_err(|e| csv_error(path, e))?.clone();
    debug!(n_columns = header.len(), "read CSV header");
    Ok((rdr, header))
}

fn csv_error(path: &Path, e: csv::Error) -> IoError {
    IoError::CsvParse {
        path: path.to_path_buf(),
        offset: e.position().map_or(0, |p| p.byte()),
        source: e,
    }
}

/// Parse one cell as a finite float.
fn parse_cell(
    path: &Path,
    record: &csv::StringRecord,
    row_index: usize,
    col: usize,
    column: &str,
) -> Result<f64, IoError> {
    let raw = record.get(col).unwrap_or("");
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(IoError::NonFiniteValue {
            path: path.to_path_buf(),
            row_index,
            column: column.to_string(),
            raw: raw.to_string(),
        }),
    }
}

/// Iterate data records with their zero-based row index.
fn records(
    path: &Path,
    rdr: &mut csv::Reader<File>,
) -> impl Iterator<Item = Result<(usize, csv::StringRecord), IoError>> {
    rdr.records().enumerate().map(move |(row_index, result)| {
        result
            .map(|record| (row_index, record))
            .map_err(|e| csv_error(path, e))
    })
}

/// Check a record against the header width.
fn check_width(
    path: &Path,
    record: &csv::StringRecord,
    row_index: usize,
    expected: usize,
) -> Result<(), IoError> {
    if record.len() != expected {
        return Err(IoError::InconsistentRowLength {
            path: path.to_path_buf(),
            row_index,
            expected,
            got: record.len(),
        });
    }
    Ok(())
}

fn row_id(record: &csv::StringRecord, id_col: Option<usize>, row_index: usize) -> RowId {
    match id_col.and_then(|c| record.get(c)) {
        Some(id) => RowId::new(id.to_string()),
        None => RowId::new(row_index.to_string()),
    }
}

/// Reads a labelled regression table from a CSV file.
///
/// Expected CSV format:
/// - Header row required
/// - One column is the target (default `aqi`)
/// - An optional id column (default `id`) labels rows and is not a feature
/// - Every other column is a feature, kept in header order
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::MissingColumn`] | Target column absent from the header |
/// | [`IoError::NoFeatureColumns`] | Only target and id columns |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::NonFiniteValue`] | Cell is NaN, Inf, or unparseable float |
pub struct TrainingReader {
    path: PathBuf,
    target: String,
    id_column: String,
}

impl TrainingReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            target: "aqi".to_string(),
            id_column: "id".to_string(),
        }
    }

    /// Set the name of the target column.
    #[must_use]
    pub fn with_target(mut self, target: &str) -> Self {
        self.target = target.to_string();
        self
    }

    /// Set the name of the optional id column.
    #[must_use]
    pub fn with_id_column(mut self, id_column: &str) -> Self {
        self.id_column = id_column.to_string();
        self
    }

    /// Read and validate the CSV file, returning a [`TrainingTable`].
    #[instrument(skip(self), fields(path = %self.path.display(), target = %self.target))]
    pub fn read(&self) -> Result<TrainingTable, IoError> {
        let path = self.path.as_path();
        let (mut rdr, header) = open_csv(path)?;

        let target_col = header
            .iter()
            .position(|h| h == self.target)
            .ok_or_else(|| IoError::MissingColumn {
                path: self.path.clone(),
                column: self.target.clone(),
            })?;
        let id_col = header.iter().position(|h| h == self.id_column);

        let feature_cols: Vec<(usize, String)> = header
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != target_col && Some(i) != id_col)
            .map(|(i, h)| (i, h.to_string()))
            .collect();
        if feature_cols.is_empty() {
            return Err(IoError::NoFeatureColumns {
                path: self.path.clone(),
            });
        }
        for (_, name) in &feature_cols {
            if !SENSOR_KEYS.contains(&name.as_str()) {
                debug!(column = %name, "feature column is not a standard sensor key");
            }
        }

        let mut ids = Vec::new();
        let mut features = Vec::new();
        let mut targets = Vec::new();

        for item in records(path, &mut rdr) {
            let (row_index, record) = item?;
            check_width(path, &record, row_index, header.len())?;
            let row = feature_cols
                .iter()
                .map(|(col, name)| parse_cell(path, &record, row_index, *col, name))
                .collect::<Result<Vec<f64>, _>>()?;
            targets.push(parse_cell(path, &record, row_index, target_col, &self.target)?);
            ids.push(row_id(&record, id_col, row_index));
            features.push(row);
        }

        if features.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        let feature_names: Vec<String> = feature_cols.into_iter().map(|(_, name)| name).collect();
        info!(
            n_samples = features.len(),
            n_features = feature_names.len(),
            "training table loaded"
        );

        Ok(TrainingTable::new(
            ids,
            self.target.clone(),
            feature_names,
            features,
            targets,
        ))
    }
}

/// Reads rows to score from a CSV file, mapping columns onto a model.
///
/// Columns are matched to `feature_names` by header name, so column order in
/// the file does not matter. Header columns that are not model features are
/// skipped with a warning.
///
/// A row with the wrong width or a bad cell does not fail the read: its
/// slot in [`PredictionTable::rows`] holds [`IoError::InconsistentRowLength`]
/// or [`IoError::NonFiniteValue`] and the other rows load as usual.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::MissingColumn`] | A model feature has no column |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
pub struct PredictionReader {
    path: PathBuf,
    feature_names: Vec<String>,
    id_column: String,
}

impl PredictionReader {
    /// Create a new reader producing rows in `feature_names` order.
    pub fn new(path: &Path, feature_names: &[String]) -> Self {
        Self {
            path: path.to_path_buf(),
            feature_names: feature_names.to_vec(),
            id_column: "id".to_string(),
        }
    }

    /// Set the name of the optional id column.
    #[must_use]
    pub fn with_id_column(mut self, id_column: &str) -> Self {
        self.id_column = id_column.to_string();
        self
    }

    /// Read and validate the CSV file, returning a [`PredictionTable`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<PredictionTable, IoError> {
        let path = self.path.as_path();
        let (mut rdr, header) = open_csv(path)?;

        let feature_cols = self
            .feature_names
            .iter()
            .map(|name| {
                header
                    .iter()
                    .position(|h| h == name.as_str())
                    .ok_or_else(|| IoError::MissingColumn {
                        path: self.path.clone(),
                        column: name.clone(),
                    })
            })
            .collect::<Result<Vec<usize>, _>>()?;
        let id_col = header.iter().position(|h| h == self.id_column);

        let ignored_columns: Vec<String> = header
            .iter()
            .enumerate()
            .filter(|&(i, _)| !feature_cols.contains(&i) && Some(i) != id_col)
            .map(|(_, h)| h.to_string())
            .collect();
        for column in &ignored_columns {
            warn!(column = %column, "ignoring column that is not a model feature");
        }

        let mut ids = Vec::new();
        let mut rows = Vec::new();

        for item in records(path, &mut rdr) {
            let (row_index, record) = item?;
            let row = check_width(path, &record, row_index, header.len()).and_then(|()| {
                feature_cols
                    .iter()
                    .zip(&self.feature_names)
                    .map(|(&col, name)| parse_cell(path, &record, row_index, col, name))
                    .collect::<Result<Vec<f64>, _>>()
            });
            if let Err(e) = &row {
                warn!(row_index, error = %e, "row cannot be scored");
            }
            ids.push(row_id(&record, id_col, row_index));
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        let table = PredictionTable::new(ids, rows, ignored_columns);
        info!(
            n_samples = table.n_samples(),
            n_invalid = table.n_invalid(),
            "prediction table loaded"
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn read_valid_training_table() {
        let csv = "id,pm25,aqi,o3,t\nS1,35.0,101,20.5,14.0\nS2,12.0,51,31.0,18.5\nS3,80.5,160,9.0,11.0\n";
        let f = write_csv(csv);
        let table = TrainingReader::new(f.path()).read().unwrap();
        assert_eq!(table.n_samples(), 3);
        assert_eq!(table.feature_names(), &["pm25", "o3", "t"]);
        assert_eq!(table.target_name(), "aqi");
        assert_eq!(table.ids()[1].as_str(), "S2");
        assert_eq!(table.features()[2], vec![80.5, 9.0, 11.0]);
        assert_eq!(table.targets(), &[101.0, 51.0, 160.0]);
    }

    #[test]
    fn custom_target_and_missing_id() {
        let csv = "pm25,no2,aqi\n10,20,30\n11,21,31\n";
        let f = write_csv(csv);
        let table = TrainingReader::new(f.path()).with_target("pm25").read().unwrap();
        assert_eq!(table.feature_names(), &["no2", "aqi"]);
        assert_eq!(table.targets(), &[10.0, 11.0]);
        assert_eq!(table.ids()[0].as_str(), "0");
        assert_eq!(table.ids()[1].as_str(), "1");
    }

    #[test]
    fn missing_target_column_error() {
        let csv = "pm25,o3\n1,2\n";
        let f = write_csv(csv);
        let err = TrainingReader::new(f.path()).read().unwrap_err();
        assert!(matches!(err, IoError::MissingColumn { ref column, .. } if column == "aqi"));
    }

    #[test]
    fn empty_dataset_error() {
        let f = write_csv("pm25,aqi\n");
        let err = TrainingReader::new(f.path()).read().unwrap_err();
        assert!(matches!(err, IoError::EmptyDataset { .. }));
    }

    #[test]
    fn no_feature_columns_error() {
        let f = write_csv("id,aqi\nA,1\nB,2\n");
        let err = TrainingReader::new(f.path()).read().unwrap_err();
        assert!(matches!(err, IoError::NoFeatureColumns { .. }));
    }

    #[test]
    fn inconsistent_row_length_error() {
        let f = write_csv("pm25,o3,aqi\n1,2,3\n4,5\n");
        let err = TrainingReader::new(f.path()).read().unwrap_err();
        assert!(matches!(
            err,
            IoError::InconsistentRowLength { row_index: 1, expected: 3, got: 2, .. }
        ));
    }

    #[test]
    fn non_finite_value_error() {
        let f = write_csv("pm25,aqi\nNaN,3\n");
        let err = TrainingReader::new(f.path()).read().unwrap_err();
        assert!(matches!(
            err,
            IoError::NonFiniteValue { row_index: 0, ref column, ref raw, .. }
                if column == "pm25" && raw == "NaN"
        ));
    }

    #[test]
    fn unparseable_target_error() {
        let f = write_csv("pm25,aqi\n1.0,high\n");
        let err = TrainingReader::new(f.path()).read().unwrap_err();
        assert!(matches!(err, IoError::NonFiniteValue { ref column, .. } if column == "aqi"));
    }

    #[test]
    fn missing_file_error() {
        let err = TrainingReader::new(Path::new("/nonexistent/air.csv"))
            .read()
            .unwrap_err();
        assert!(matches!(err, IoError::FileNotFound { .. }));
    }

    #[test]
    fn prediction_columns_follow_model_order() {
        let csv = "t,id,extra,pm25\n14.0,A,x,35\n18.5,B,y,12\n";
        let f = write_csv(csv);
        let table = PredictionReader::new(f.path(), &names(&["pm25", "t"]))
            .read()
            .unwrap();
        assert_eq!(*table.rows()[0].as_ref().unwrap(), vec![35.0, 14.0]);
        assert_eq!(*table.rows()[1].as_ref().unwrap(), vec![12.0, 18.5]);
        assert_eq!(table.n_invalid(), 0);
        assert_eq!(table.ids()[0].as_str(), "A");
        assert_eq!(table.ignored_columns(), &["extra"]);
    }

    #[test]
    fn prediction_missing_feature_column() {
        let f = write_csv("pm25\n1\n");
        let err = PredictionReader::new(f.path(), &names(&["pm25", "o3"]))
            .read()
            .unwrap_err();
        assert!(matches!(err, IoError::MissingColumn { ref column, .. } if column == "o3"));
    }

    #[test]
    fn prediction_bad_cell_fails_only_its_row() {
        let f = write_csv("id,pm25,o3\nA,1,2\nB,,3\nC,4,5\n");
        let table = PredictionReader::new(f.path(), &names(&["pm25", "o3"]))
            .read()
            .unwrap();
        assert_eq!(table.n_samples(), 3);
        assert_eq!(table.n_invalid(), 1);
        assert_eq!(table.ids()[1].as_str(), "B");
        assert_eq!(*table.rows()[0].as_ref().unwrap(), vec![1.0, 2.0]);
        assert!(matches!(
            table.rows()[1],
            Err(IoError::NonFiniteValue { row_index: 1, ref column, ref raw, .. })
                if column == "pm25" && raw.is_empty()
        ));
        assert_eq!(*table.rows()[2].as_ref().unwrap(), vec![4.0, 5.0]);
    }

    #[test]
    fn prediction_ragged_row_fails_only_its_row() {
        let f = write_csv("pm25,o3\n1,inf\n2\n3,4\n");
        let table = PredictionReader::new(f.path(), &names(&["pm25", "o3"]))
            .read()
            .unwrap();
        assert_eq!(table.n_invalid(), 2);
        assert!(matches!(
            table.rows()[0],
            Err(IoError::NonFiniteValue { ref column, .. }) if column == "o3"
        ));
        assert!(matches!(
            table.rows()[1],
            Err(IoError::InconsistentRowLength { row_index: 1, expected: 2, got: 1, .. })
        ));
        assert_eq!(table.ids()[1].as_str(), "1");
        assert_eq!(*table.rows()[2].as_ref().unwrap(), vec![3.0, 4.0]);
    }

    #[test]
    fn prediction_empty_table_error() {
        let f = write_csv("pm25,o3\n");
        let err = PredictionReader::new(f.path(), &names(&["pm25", "o3"]))
            .read()
            .unwrap_err();
        assert!(matches!(err, IoError::EmptyDataset { .. }));
    }
}
