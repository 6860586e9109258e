//! One-hot encoding of categorical context columns

use crate::error::MotorError;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Fitted one-hot encoder.
///
/// Categories are sorted per column. A category not seen during fitting encodes
/// as all zeros for that column rather than failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    pub columns: Vec<String>,
    pub categories: Vec<Vec<String>>,
}

impl OneHotEncoder {
    /// Fit on column-major categorical data
    pub fn fit(columns: &[String], data: &[Vec<String>]) -> Result<Self, MotorError> {
        if columns.len() != data.len() {
            return Err(MotorError::ArtifactMismatch(format!(
                "encoder fit on {} columns but {} names given",
                data.len(),
                columns.len()
            )));
        }

        let categories = data
            .iter()
            .map(|values| {
                let mut distinct: Vec<String> = values.clone();
                distinct.sort();
                distinct.dedup();
                distinct
            })
            .collect();

        Ok(Self {
            columns: columns.to_vec(),
            categories,
        })
    }

    /// Width of the encoded output
    pub fn n_outputs(&self) -> usize {
        self.categories.iter().map(Vec::len).sum()
    }

    /// Encoded feature names, `<column>_<category>`
    pub fn output_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .zip(&self.categories)
            .flat_map(|(column, cats)| cats.iter().map(move |c| format!("{column}_{c}")))
            .collect()
    }

    /// Encode `n_rows` rows of column-major categorical data
    pub fn transform(&self, data: &[Vec<String>], n_rows: usize) -> Result<Array2<f64>, MotorError> {
        if data.len() != self.columns.len() {
            return Err(MotorError::ArtifactMismatch(format!(
                "encoder expects {} categorical columns, got {}",
                self.columns.len(),
                data.len()
            )));
        }

        let mut out = Array2::zeros((n_rows, self.n_outputs()));
        let mut offset = 0;
        for (values, cats) in data.iter().zip(&self.categories) {
            if values.len() != n_rows {
                return Err(MotorError::ArtifactMismatch(format!(
                    "categorical column has {} rows, expected {}",
                    values.len(),
                    n_rows
                )));
            }
            for (row, value) in values.iter().enumerate() {
                if let Ok(pos) = cats.binary_search(value) {
                    out[[row, offset + pos]] = 1.0;
                }
            }
            offset += cats.len();
        }
        Ok(out)
    }
}
