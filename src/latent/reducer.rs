//! One-component principal axis reducer

use crate::error::MotorError;
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Projection of scaled motor features onto their dominant direction of variance.
///
/// `flipped` is part of the fitted state: when set, every projection is negated
/// so that higher latent scores mean better performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatentReducer {
    pub columns: Vec<String>,
    /// Per-feature mean removed before projecting
    pub mean: Vec<f64>,
    /// Unit-length component 1 loadings, in `columns` order
    pub loadings: Vec<f64>,
    pub explained_variance_ratio: f64,
    pub flipped: bool,
}

impl LatentReducer {
    /// Fit component 1 of a rows x features matrix.
    ///
    /// The component is oriented so its largest-magnitude loading is positive;
    /// the ability orientation is applied afterwards via [`LatentReducer::with_flip`].
    pub fn fit(columns: &[String], x: ArrayView2<f64>) -> Result<Self, MotorError> {
        let (n, d) = x.dim();
        if d != columns.len() {
            return Err(MotorError::ArtifactMismatch(format!(
                "reducer fit on {} columns but {} names given",
                d,
                columns.len()
            )));
        }
        if n == 0 || d == 0 {
            return Err(MotorError::EmptyDataset(
                "cannot fit a reducer on an empty matrix".to_string(),
            ));
        }

        let mean: Array1<f64> = x
            .mean_axis(Axis(0))
            .ok_or_else(|| MotorError::EmptyDataset("no rows to average".to_string()))?;
        let centered: Array2<f64> = &x - &mean;
        let denom = (n.max(2) - 1) as f64;
        let covariance = centered.t().dot(&centered) / denom;

        let eigen = SymmetricEigen::new(DMatrix::from_fn(d, d, |i, j| covariance[(i, j)]));
        let eigenvalues = &eigen.eigenvalues;

        let mut top = 0;
        for (i, value) in eigenvalues.iter().enumerate() {
            if *value > eigenvalues[top] {
                top = i;
            }
        }

        let mut loadings: Vec<f64> = eigen.eigenvectors.column(top).iter().copied().collect();
        let mut pivot = 0;
        for (i, w) in loadings.iter().enumerate() {
            if w.abs() > loadings[pivot].abs() {
                pivot = i;
            }
        }
        if loadings[pivot] < 0.0 {
            loadings.iter_mut().for_each(|w| *w = -*w);
        }

        let total_variance: f64 = covariance.diag().sum();
        let explained_variance_ratio = if total_variance > 0.0 {
            eigenvalues[top] / total_variance
        } else {
            0.0
        };

        Ok(Self {
            columns: columns.to_vec(),
            mean: mean.to_vec(),
            loadings,
            explained_variance_ratio,
            flipped: false,
        })
    }

    /// Record the ability orientation decided during training
    pub fn with_flip(mut self, flipped: bool) -> Self {
        self.flipped = flipped;
        self
    }

    fn sign(&self) -> f64 {
        if self.flipped {
            -1.0
        } else {
            1.0
        }
    }

    /// Projection without the ability orientation
    pub fn project_unaligned(&self, scaled: ArrayView2<f64>) -> Result<Array1<f64>, MotorError> {
        self.check_width(scaled.ncols())?;
        let mean = Array1::from(self.mean.clone());
        let loadings = Array1::from(self.loadings.clone());
        Ok((&scaled - &mean).dot(&loadings))
    }

    /// Aligned latent scores for a scaled matrix
    pub fn transform(&self, scaled: ArrayView2<f64>) -> Result<Array1<f64>, MotorError> {
        let sign = self.sign();
        Ok(self.project_unaligned(scaled)?.mapv(|v| v * sign))
    }

    /// Aligned latent score for a single scaled feature vector
    pub fn transform_row(&self, scaled: &[f64]) -> Result<f64, MotorError> {
        self.check_width(scaled.len())?;
        let projection: f64 = scaled
            .iter()
            .zip(self.mean.iter().zip(&self.loadings))
            .map(|(x, (m, w))| (x - m) * w)
            .sum();
        Ok(projection * self.sign())
    }

    fn check_width(&self, width: usize) -> Result<(), MotorError> {
        if width != self.columns.len() {
            return Err(MotorError::ArtifactMismatch(format!(
                "reducer expects {} features, got {}",
                self.columns.len(),
                width
            )));
        }
        Ok(())
    }
}
