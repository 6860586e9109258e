//! Training configuration
//!
//! Every knob has a default equal to the production training run, so an empty
//! JSON object (or no config file at all) reproduces the reference setup.

use crate::error::MotorError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of cross-validation folds
pub const DEFAULT_FOLDS: usize = 5;

/// Default seed threaded through every stochastic step
pub const DEFAULT_SEED: u64 = 42;

/// Rows with a larger fraction of missing motor values are discarded
pub const DEFAULT_MAX_MISSING_MOTOR_FRACTION: f64 = 0.25;

/// Fewer motor columns than this means the input is not a motor-session table
pub const DEFAULT_MIN_MOTOR_FEATURES: usize = 10;

/// Percentile cut points separating the four difficulty bands
pub const DEFAULT_PERCENTILE_CUTS: [f64; 3] = [10.0, 30.0, 60.0];

/// Hyperparameters of the gradient-boosted tree classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoosterParams {
    /// Boosting rounds (one tree per class per round)
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// Fraction of rows sampled per round
    pub subsample: f64,
    /// Fraction of columns sampled per tree
    pub colsample_bytree: f64,
    /// L2 regularisation on leaf weights
    pub reg_lambda: f64,
    /// Minimum hessian sum in a child
    pub min_child_weight: f64,
    pub num_class: usize,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            n_estimators: 400,
            max_depth: 4,
            learning_rate: 0.05,
            subsample: 0.9,
            colsample_bytree: 0.9,
            reg_lambda: 1.0,
            min_child_weight: 1.0,
            num_class: 4,
        }
    }
}

/// Configuration for a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub folds: usize,
    pub seed: u64,
    pub max_missing_motor_fraction: f64,
    pub min_motor_features: usize,
    pub percentile_cuts: [f64; 3],
    pub booster: BoosterParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            folds: DEFAULT_FOLDS,
            seed: DEFAULT_SEED,
            max_missing_motor_fraction: DEFAULT_MAX_MISSING_MOTOR_FRACTION,
            min_motor_features: DEFAULT_MIN_MOTOR_FEATURES,
            percentile_cuts: DEFAULT_PERCENTILE_CUTS,
            booster: BoosterParams::default(),
        }
    }
}

impl TrainingConfig {
    /// Load a configuration from a JSON file; missing keys take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self, MotorError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| MotorError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Override the fold count and seed (CLI flags win over the file)
    pub fn with_overrides(mut self, folds: Option<usize>, seed: Option<u64>) -> Self {
        if let Some(folds) = folds {
            self.folds = folds;
        }
        if let Some(seed) = seed {
            self.seed = seed;
        }
        self
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<(), MotorError> {
        if self.folds < 2 {
            return Err(MotorError::Config(format!(
                "folds must be at least 2, got {}",
                self.folds
            )));
        }
        if !(0.0..=1.0).contains(&self.max_missing_motor_fraction) {
            return Err(MotorError::Config(format!(
                "max_missing_motor_fraction must be within [0, 1], got {}",
                self.max_missing_motor_fraction
            )));
        }
        let [a, b, c] = self.percentile_cuts;
        if !(0.0 < a && a < b && b < c && c < 100.0) {
            return Err(MotorError::Config(format!(
                "percentile_cuts must be strictly increasing within (0, 100), got {:?}",
                self.percentile_cuts
            )));
        }

        let booster = &self.booster;
        if booster.n_estimators == 0 || booster.max_depth == 0 {
            return Err(MotorError::Config(
                "booster needs at least one round and depth 1".to_string(),
            ));
        }
        if booster.num_class < 2 {
            return Err(MotorError::Config("num_class must be at least 2".to_string()));
        }
        for (name, value) in [
            ("subsample", booster.subsample),
            ("colsample_bytree", booster.colsample_bytree),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(MotorError::Config(format!(
                    "{name} must be within (0, 1], got {value}"
                )));
            }
        }
        if booster.learning_rate <= 0.0 || booster.reg_lambda < 0.0 {
            return Err(MotorError::Config(
                "learning_rate must be positive and reg_lambda non-negative".to_string(),
            ));
        }
        Ok(())
    }
}
