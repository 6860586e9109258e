//! Training report
//!
//! Human-auditable summary of one training run: the latent axis, the label
//! bands and both classifiers' cross-validated performance.

use crate::cleaning::ImputationRecord;
use crate::config::BoosterParams;
use crate::cv::CvResult;
use crate::labeling::PercentileThresholds;
use crate::types::MotorLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Who produced an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
}

impl Producer {
    pub fn current() -> Self {
        Self {
            name: crate::PRODUCER_NAME.to_string(),
            version: crate::MOTOR_VERSION.to_string(),
        }
    }
}

/// Row accounting of the training input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSummary {
    pub input_rows: usize,
    pub retained_rows: usize,
    pub dropped_rows: usize,
    pub participants: usize,
    pub max_missing_motor_fraction: f64,
    pub imputations: Vec<ImputationRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaReport {
    pub explained_variance_ratio_pc1: f64,
    pub pc1_flipped: bool,
    pub motor_feature_columns: Vec<String>,
    pub excluded_condition_columns: Vec<String>,
    /// Loading per motor column, in motor column order
    pub pc1_loadings: Map<String, Value>,
    /// Column whose correlation decided the flip; null when none exists
    pub sign_anchor_column: Option<String>,
    pub sign_anchor_correlation: Option<f64>,
}

impl PcaReport {
    /// Ordered column → loading map
    pub fn loadings_map(columns: &[String], loadings: &[f64]) -> Map<String, Value> {
        columns
            .iter()
            .zip(loadings)
            .map(|(c, w)| (c.clone(), Value::from(*w)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelingReport {
    pub method: String,
    pub cuts_percentiles: [f64; 3],
    pub thresholds: PercentileThresholds,
    /// Class index (as a string) → human-readable level name
    pub label_names: BTreeMap<String, String>,
    /// Training rows per class index
    pub label_counts: BTreeMap<String, usize>,
}

impl LabelingReport {
    pub fn label_names() -> BTreeMap<String, String> {
        MotorLevel::ALL
            .iter()
            .map(|level| (level.class().to_string(), level.description().to_string()))
            .collect()
    }

    pub fn label_counts(labels: &[usize]) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> = MotorLevel::ALL
            .iter()
            .map(|level| (level.class().to_string(), 0))
            .collect();
        for label in labels {
            *counts.entry(label.to_string()).or_default() += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextModelReport {
    pub context_numeric_columns: Vec<String>,
    pub context_categorical_columns: Vec<String>,
    /// One-hot outputs of the final fit, `<column>_<category>`
    pub encoded_categorical_columns: Vec<String>,
    #[serde(flatten)]
    pub cv: CvResult,
}

/// Full training report document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub producer: Producer,
    pub seed: u64,
    pub data: DataSummary,
    pub pca: PcaReport,
    pub labeling: LabelingReport,
    #[serde(rename = "modelA_motor_only")]
    pub model_a: CvResult,
    #[serde(rename = "modelB_motor_plus_context")]
    pub model_b: ContextModelReport,
    pub estimator: BoosterParams,
}

impl TrainingReport {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
