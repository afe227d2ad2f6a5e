use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use mo_types::{DataError, Dataset, MoResult};

/// Loads tabular datasets: numeric feature columns followed by a 0/1 label.
///
/// A header row is detected rather than configured: the first row is taken
/// as a header when its label cell is not a number. A first row with a
/// numeric label is data, so a bad feature cell there is an error rather
/// than a silently dropped sample.
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    delimiter: u8,
}

impl DatasetLoader {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter }
    }

    pub fn load_csv_file<P: AsRef<Path>>(&self, file_path: P) -> MoResult<Dataset> {
        let path = file_path.as_ref();
        tracing::info!("Loading dataset from: {}", path.display());

        if !path.exists() {
            return Err(DataError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .delimiter(self.delimiter)
            .from_path(path)
            .map_err(|e| DataError::InvalidFormat {
                message: format!("Failed to open CSV file {}: {}", path.display(), e),
            })?;

        let mut features = Vec::new();
        let mut labels = Vec::new();
        let mut width: Option<usize> = None;

        for (index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| DataError::ParseError {
                line: index + 1,
                message: e.to_string(),
            })?;
            let line = record
                .position()
                .map_or(index + 1, |pos| pos.line() as usize);

            if index == 0 && is_header(&record) {
                tracing::debug!("Dataset header: {:?}", record);
                continue;
            }

            let expected = *width.get_or_insert(record.len());
            if record.len() != expected {
                return Err(DataError::RowWidth {
                    line,
                    expected,
                    actual: record.len(),
                }
                .into());
            }
            if expected < 2 {
                return Err(DataError::InvalidFormat {
                    message: format!(
                        "line {line}: need at least one feature column and a label column"
                    ),
                }
                .into());
            }

            let (row, label) = parse_row(&record, line)?;
            features.push(row);
            labels.push(label);
        }

        if labels.is_empty() {
            return Err(DataError::Empty {
                path: path.display().to_string(),
            }
            .into());
        }

        let dataset = Dataset::new(features, labels);
        let [negative, positive] = dataset.class_counts();
        tracing::info!(
            "Loaded {} samples with {} features from {} ({} positive, {} negative)",
            dataset.len(),
            dataset.n_features(),
            path.display(),
            positive,
            negative
        );
        Ok(dataset)
    }
}

impl Default for DatasetLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Load a comma-separated dataset with the default loader.
pub fn load_dataset<P: AsRef<Path>>(path: P) -> MoResult<Dataset> {
    DatasetLoader::new().load_csv_file(path)
}

fn is_header(record: &StringRecord) -> bool {
    record
        .iter()
        .last()
        .is_some_and(|label| label.parse::<f64>().is_err())
}

fn parse_row(record: &StringRecord, line: usize) -> MoResult<(Vec<f64>, u8)> {
    let label_index = record.len() - 1;
    let mut row = Vec::with_capacity(label_index);
    for (column, cell) in record.iter().take(label_index).enumerate() {
        let value: f64 = cell.parse().map_err(|_| DataError::ParseError {
            line,
            message: format!("column {}: '{}' is not a number", column + 1, cell),
        })?;
        if !value.is_finite() {
            return Err(DataError::ParseError {
                line,
                message: format!("column {}: '{}' is not finite", column + 1, cell),
            }
            .into());
        }
        row.push(value);
    }

    let cell = &record[label_index];
    let label = match cell.parse::<f64>() {
        Ok(v) if v == 0.0 => 0,
        Ok(v) if v == 1.0 => 1,
        _ => {
            return Err(DataError::InvalidLabel {
                line,
                label: cell.to_string(),
            }
            .into())
        }
    };
    Ok((row, label))
}
