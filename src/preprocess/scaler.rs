//! Robust feature scaling
//!
//! Centers each feature on its median and divides by its interquartile range,
//! so a handful of extreme sessions cannot dominate the scale.

use crate::error::MotorError;
use crate::stats::percentile_sorted;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Fitted median/IQR scaler over a fixed, ordered column list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustScaler {
    pub columns: Vec<String>,
    pub center: Vec<f64>,
    pub scale: Vec<f64>,
}

impl RobustScaler {
    /// Fit on a rows x features matrix whose columns are named by `columns`
    pub fn fit(columns: &[String], x: ArrayView2<f64>) -> Result<Self, MotorError> {
        if x.ncols() != columns.len() {
            return Err(MotorError::ArtifactMismatch(format!(
                "scaler fit on {} columns but {} names given",
                x.ncols(),
                columns.len()
            )));
        }
        if x.nrows() == 0 {
            return Err(MotorError::EmptyDataset(
                "cannot fit a scaler on zero rows".to_string(),
            ));
        }

        let mut center = Vec::with_capacity(x.ncols());
        let mut scale = Vec::with_capacity(x.ncols());
        for column in x.columns() {
            let mut sorted = column.to_vec();
            sorted.sort_by(f64::total_cmp);
            let q25 = percentile_sorted(&sorted, 25.0).unwrap_or(0.0);
            let q50 = percentile_sorted(&sorted, 50.0).unwrap_or(0.0);
            let q75 = percentile_sorted(&sorted, 75.0).unwrap_or(0.0);

            center.push(q50);
            // A constant feature keeps unit scale instead of dividing by zero
            let iqr = q75 - q25;
            scale.push(if iqr.abs() < f64::EPSILON { 1.0 } else { iqr });
        }

        Ok(Self {
            columns: columns.to_vec(),
            center,
            scale,
        })
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    /// Scale a rows x features matrix laid out in `self.columns` order
    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, MotorError> {
        self.check_width(x.ncols())?;
        let mut out = x.to_owned();
        for (j, mut column) in out.columns_mut().into_iter().enumerate() {
            let (c, s) = (self.center[j], self.scale[j]);
            column.mapv_inplace(|v| (v - c) / s);
        }
        Ok(out)
    }

    /// Scale a single feature vector
    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>, MotorError> {
        self.check_width(row.len())?;
        Ok(row
            .iter()
            .zip(self.center.iter().zip(&self.scale))
            .map(|(v, (c, s))| (v - c) / s)
            .collect())
    }

    fn check_width(&self, width: usize) -> Result<(), MotorError> {
        if width != self.columns.len() {
            return Err(MotorError::ArtifactMismatch(format!(
                "scaler expects {} features, got {}",
                self.columns.len(),
                width
            )));
        }
        Ok(())
    }
}
