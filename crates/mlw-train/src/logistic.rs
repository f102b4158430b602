//! L2-regularised logistic regression fitted by batch gradient descent on
//! standardised features.

use std::fs;
use std::path::Path;

use mlw_core::errors::{ErrorInfo, MlwError};
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// Inverse of scikit-learn's `C`; the penalty is `reg_rate / (2n) * |w|^2`.
    pub reg_rate: f64,
    pub epochs: usize,
    pub learning_rate: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            reg_rate: 0.01,
            epochs: 1000,
            learning_rate: 0.5,
        }
    }
}

/// Fitted model, serialized with bincode as the run artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub feature_names: Vec<String>,
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
    pub weights: Vec<f64>,
    pub bias: f64,
    pub reg_rate: f64,
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

fn column_stats(rows: &[Vec<f64>], width: usize) -> (Vec<f64>, Vec<f64>) {
    let n = rows.len().max(1) as f64;
    let mut means = vec![0.0; width];
    for row in rows {
        for (mean, value) in means.iter_mut().zip(row) {
            *mean += value / n;
        }
    }
    let mut scales = vec![0.0; width];
    for row in rows {
        for ((scale, mean), value) in scales.iter_mut().zip(&means).zip(row) {
            *scale += (value - mean).powi(2) / n;
        }
    }
    for scale in &mut scales {
        *scale = scale.sqrt();
        if *scale < 1e-12 {
            *scale = 1.0;
        }
    }
    (means, scales)
}

impl LogisticModel {
    pub fn fit(data: &Dataset, options: &FitOptions) -> Result<Self, MlwError> {
        if data.is_empty() {
            return Err(MlwError::validation("train.empty", "cannot fit on an empty dataset"));
        }
        if options.reg_rate < 0.0 || !options.reg_rate.is_finite() {
            return Err(MlwError::Validation(
                ErrorInfo::new("train.reg_rate", "regularization rate must be finite and >= 0")
                    .with_context("reg_rate", options.reg_rate.to_string()),
            ));
        }
        let width = data.feature_names.len();
        let (means, scales) = column_stats(&data.rows, width);
        let standardized: Vec<Vec<f64>> = data
            .rows
            .iter()
            .map(|row| standardize(row, &means, &scales))
            .collect();

        let n = data.len() as f64;
        let mut weights = vec![0.0; width];
        let mut bias = 0.0;
        let mut grad = vec![0.0; width];
        for _ in 0..options.epochs {
            grad.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_bias = 0.0;
            for (row, label) in standardized.iter().zip(&data.labels) {
                let error = sigmoid(dot(&weights, row) + bias) - label;
                for (g, x) in grad.iter_mut().zip(row) {
                    *g += error * x;
                }
                grad_bias += error;
            }
            for (w, g) in weights.iter_mut().zip(&grad) {
                *w -= options.learning_rate * (g / n + options.reg_rate / n * *w);
            }
            bias -= options.learning_rate * grad_bias / n;
        }

        Ok(Self {
            feature_names: data.feature_names.clone(),
            means,
            scales,
            weights,
            bias,
            reg_rate: options.reg_rate,
        })
    }

    /// Probability of the positive class for one raw feature row.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let x = standardize(row, &self.means, &self.scales);
        sigmoid(dot(&self.weights, &x) + self.bias)
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        if self.predict_proba(row) >= 0.5 {
            1.0
        } else {
            0.0
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MlwError> {
        bincode::serialize(self)
            .map_err(|err| MlwError::Serde(ErrorInfo::new("model.encode", err.to_string())))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MlwError> {
        bincode::deserialize(bytes)
            .map_err(|err| MlwError::Serde(ErrorInfo::new("model.decode", err.to_string())))
    }

    pub fn save(&self, path: &Path) -> Result<(), MlwError> {
        fs::write(path, self.to_bytes()?).map_err(|err| MlwError::io("model.save", path, err))
    }

    pub fn load(path: &Path) -> Result<Self, MlwError> {
        let bytes = fs::read(path).map_err(|err| MlwError::io("model.load", path, err))?;
        Self::from_bytes(&bytes)
    }
}

fn standardize(row: &[f64], means: &[f64], scales: &[f64]) -> Vec<f64> {
    row.iter()
        .zip(means)
        .zip(scales)
        .map(|((value, mean), scale)| (value - mean) / scale)
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
