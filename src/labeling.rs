//! Percentile labeling
//!
//! Splits the training population's latent scores into four contiguous bands.
//! The cut points are frozen at training time; a scored session is never
//! re-ranked against its own population.

use crate::error::MotorError;
use crate::stats::percentile_sorted;
use crate::types::MotorLevel;
use serde::{Deserialize, Serialize};

/// Name recorded in the training report
pub const LABELING_METHOD: &str = "percentile_bands_on_pca_pc1";

/// Latent-score cut points, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileThresholds {
    pub p10: f64,
    pub p30: f64,
    pub p60: f64,
}

impl PercentileThresholds {
    /// Compute the cut points of `scores` at `cuts` (percent)
    pub fn fit(scores: &[f64], cuts: [f64; 3]) -> Result<Self, MotorError> {
        if scores.is_empty() {
            return Err(MotorError::EmptyDataset(
                "cannot compute percentiles of zero scores".to_string(),
            ));
        }
        let mut sorted = scores.to_vec();
        sorted.sort_by(f64::total_cmp);

        let at = |q: f64| percentile_sorted(&sorted, q).unwrap_or(f64::NAN);
        Ok(Self {
            p10: at(cuts[0]),
            p30: at(cuts[1]),
            p60: at(cuts[2]),
        })
    }

    /// Level of one aligned latent score
    pub fn level(&self, score: f64) -> MotorLevel {
        if score <= self.p10 {
            MotorLevel::High
        } else if score <= self.p30 {
            MotorLevel::Moderate
        } else if score <= self.p60 {
            MotorLevel::Mild
        } else {
            MotorLevel::Typical
        }
    }

    /// Class indices for a batch of scores
    pub fn classes(&self, scores: &[f64]) -> Vec<usize> {
        scores.iter().map(|s| self.level(*s).class()).collect()
    }
}
