//! Error types for aura-motor

use thiserror::Error;

/// Errors that can occur while training or scoring
#[derive(Debug, Error)]
pub enum MotorError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Insufficient groups: {groups} distinct participants for {folds} folds")]
    InsufficientGroups { groups: usize, folds: usize },

    #[error("No row found with sessionId={0}")]
    RecordNotFound(String),

    #[error("Row {index} out of range. Must be 0..{}", .len.saturating_sub(1))]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Artifact mismatch: {0}")]
    ArtifactMismatch(String),

    #[error("Incomplete record: {missing} of {total} motor values missing (limit {limit:.2})")]
    IncompleteRecord {
        missing: usize,
        total: usize,
        limit: f64,
    },

    #[error("Artifacts already exist at {0}")]
    ArtifactExists(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Dataset is empty: {0}")]
    EmptyDataset(String),

    #[error("Failed to parse dataset: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl MotorError {
    /// Stable machine-readable code for CLI output
    pub fn code(&self) -> &'static str {
        match self {
            MotorError::Schema(_) => "SCHEMA_ERROR",
            MotorError::InsufficientGroups { .. } => "INSUFFICIENT_GROUPS",
            MotorError::RecordNotFound(_) => "RECORD_NOT_FOUND",
            MotorError::IndexOutOfRange { .. } => "INDEX_OUT_OF_RANGE",
            MotorError::ArtifactMismatch(_) => "ARTIFACT_MISMATCH",
            MotorError::IncompleteRecord { .. } => "INCOMPLETE_RECORD",
            MotorError::ArtifactExists(_) => "ARTIFACT_EXISTS",
            MotorError::Config(_) => "CONFIG_ERROR",
            MotorError::EmptyDataset(_) => "EMPTY_DATASET",
            MotorError::ParseError(_) => "PARSE_ERROR",
            MotorError::Io(_) => "IO_ERROR",
            MotorError::Csv(_) => "CSV_ERROR",
            MotorError::JsonError(_) => "JSON_ERROR",
        }
    }
}
