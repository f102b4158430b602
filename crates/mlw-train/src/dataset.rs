use std::path::Path;

use mlw_core::errors::{ErrorInfo, MlwError};

/// Label column of the diabetes dataset.
pub const DEFAULT_LABEL: &str = "Diabetic";

/// Identifier columns that never act as features.
const ID_COLUMNS: &[&str] = &["PatientID"];

/// Numeric feature matrix with a binary label per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
}

fn data_error(code: &str, path: &Path, message: impl ToString) -> MlwError {
    MlwError::Validation(
        ErrorInfo::new(code, message.to_string()).with_context("path", path.display().to_string()),
    )
}

impl Dataset {
    /// Reads a headed CSV file. Every column other than `label` and known
    /// identifier columns is a feature; labels must be 0 or 1.
    pub fn from_csv(path: &Path, label: &str) -> Result<Self, MlwError> {
        let mut reader =
            csv::Reader::from_path(path).map_err(|err| data_error("dataset.open", path, err))?;
        let headers = reader
            .headers()
            .map_err(|err| data_error("dataset.header", path, err))?
            .clone();
        let label_idx = headers.iter().position(|h| h == label).ok_or_else(|| {
            MlwError::Validation(
                ErrorInfo::new("dataset.label_missing", "label column not found")
                    .with_context("path", path.display().to_string())
                    .with_context("label", label),
            )
        })?;
        let feature_idx: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(idx, name)| *idx != label_idx && !ID_COLUMNS.contains(name))
            .map(|(idx, _)| idx)
            .collect();
        let feature_names = feature_idx
            .iter()
            .map(|&idx| headers[idx].to_string())
            .collect();

        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|err| data_error("dataset.record", path, err))?;
            let parse = |idx: usize| -> Result<f64, MlwError> {
                record[idx].trim().parse::<f64>().map_err(|_| {
                    MlwError::Validation(
                        ErrorInfo::new("dataset.value", "non-numeric value")
                            .with_context("path", path.display().to_string())
                            .with_context("row", (line + 1).to_string())
                            .with_context("column", headers[idx].to_string()),
                    )
                })
            };
            let label_value = parse(label_idx)?;
            if label_value != 0.0 && label_value != 1.0 {
                return Err(MlwError::Validation(
                    ErrorInfo::new("dataset.label_value", "labels must be 0 or 1")
                        .with_context("row", (line + 1).to_string()),
                ));
            }
            rows.push(
                feature_idx
                    .iter()
                    .map(|&idx| parse(idx))
                    .collect::<Result<Vec<_>, _>>()?,
            );
            labels.push(label_value);
        }
        if rows.is_empty() {
            return Err(data_error("dataset.empty", path, "dataset has no rows"));
        }
        Ok(Self {
            feature_names,
            rows,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows at `indices`, in that order.
    pub fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            feature_names: self.feature_names.clone(),
            rows: indices.iter().map(|&idx| self.rows[idx].clone()).collect(),
            labels: indices.iter().map(|&idx| self.labels[idx]).collect(),
        }
    }
}
