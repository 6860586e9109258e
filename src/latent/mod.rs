//! Latent ability score
//!
//! Robust-scales the motor matrix, projects it onto its first principal axis,
//! then orients the axis so that higher scores mean better performance.
//!
//! Pipeline: cleaned motor matrix → RobustScaler → LatentReducer → sign alignment

pub mod reducer;

pub use reducer::LatentReducer;

use crate::cleaning::CleanedTable;
use crate::error::MotorError;
use crate::preprocess::RobustScaler;
use crate::stats::pearson;
use tracing::{info, warn};

/// Fitted latent transform plus the training-time scores it produced
#[derive(Debug, Clone)]
pub struct LatentFit {
    pub scaler: RobustScaler,
    pub reducer: LatentReducer,
    /// Aligned scores, one per cleaned row
    pub scores: Vec<f64>,
    /// Projection before alignment
    pub raw_scores: Vec<f64>,
    /// Column used to orient the axis, if one exists
    pub sign_anchor: Option<String>,
    /// Correlation of the raw projection with the anchor column
    pub anchor_correlation: Option<f64>,
}

/// Decide whether the raw axis must be negated.
///
/// Reaction time falls as ability rises, so a positive (finite) correlation
/// between the raw projection and mean reaction time means the axis runs
/// backwards.
pub fn needs_flip(raw_scores: &[f64], reaction_time: &[f64]) -> (bool, f64) {
    let r = pearson(raw_scores, reaction_time);
    (r.is_finite() && r > 0.0, r)
}

/// Builds the latent score from a cleaned table
pub struct LatentScoreBuilder;

impl LatentScoreBuilder {
    /// Fit scaler and reducer on the cleaned motor matrix and align the sign
    pub fn fit(cleaned: &CleanedTable) -> Result<LatentFit, MotorError> {
        let columns = &cleaned.schema.motor_numeric;

        let scaler = RobustScaler::fit(columns, cleaned.motor.view())?;
        let scaled = scaler.transform(cleaned.motor.view())?;

        let reducer = LatentReducer::fit(columns, scaled.view())?;
        let raw_scores = reducer.project_unaligned(scaled.view())?.to_vec();

        let (flipped, sign_anchor, anchor_correlation) = match cleaned.schema.sign_anchor() {
            Some((index, name)) => {
                let reaction_time = cleaned.motor.column(index).to_vec();
                let (flip, r) = needs_flip(&raw_scores, &reaction_time);
                (flip, Some(name.to_string()), Some(r))
            }
            None => {
                warn!("no reaction-time column found; latent axis orientation is unvalidated");
                (false, None, None)
            }
        };

        let reducer = reducer.with_flip(flipped);
        let scores = if flipped {
            raw_scores.iter().map(|v| -v).collect()
        } else {
            raw_scores.clone()
        };

        info!(
            explained_variance_ratio = reducer.explained_variance_ratio,
            flipped,
            anchor = sign_anchor.as_deref().unwrap_or("none"),
            "fitted latent axis"
        );

        Ok(LatentFit {
            scaler,
            reducer,
            scores,
            raw_scores,
            sign_anchor,
            anchor_correlation,
        })
    }
}
