//! Column roles and the versioned feature schema
//!
//! Roles are inferred once from the training table's header and types, then
//! frozen into a [`FeatureSchema`]. Later runs validate incoming tables against
//! the frozen schema instead of re-deriving roles from column names.

use crate::error::MotorError;
use crate::schema::table::{ColumnKind, SessionTable, ID_COLUMNS};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Version of the persisted feature schema layout
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// Prefixes of per-round and cross-round motor metric columns
pub const MOTOR_PREFIXES: [&str; 4] = ["r1_", "r2_", "r3_", "delta_"];

/// Experimental condition parameters. They describe the task, not the
/// participant, so they are context even though they carry round prefixes.
pub const EXCLUDED_CONDITION_COLUMNS: [&str; 6] = [
    "r1_spawnIntervalMs",
    "r1_speedPxPerFrame",
    "r2_spawnIntervalMs",
    "r2_speedPxPerFrame",
    "r3_spawnIntervalMs",
    "r3_speedPxPerFrame",
];

/// Name fragment of the column used to orient the latent axis
pub const REACTION_TIME_ANCHOR: &str = "reactionTime_mean";

/// Whether a column name carries a motor metric prefix
pub fn is_motor_candidate(name: &str) -> bool {
    MOTOR_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

/// Frozen column roles of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub identifier_columns: Vec<String>,
    /// Motor features in the authoritative training order
    pub motor_numeric: Vec<String>,
    pub context_numeric: Vec<String>,
    pub context_categorical: Vec<String>,
    /// Condition parameters kept out of the motor set (sorted)
    pub excluded_condition: Vec<String>,
}

impl FeatureSchema {
    /// Infer roles from a training table.
    ///
    /// Fails with a schema error when an identifier column is absent or fewer
    /// than `min_motor_features` motor columns are found.
    pub fn infer(table: &SessionTable, min_motor_features: usize) -> Result<Self, MotorError> {
        table.require_columns(&ID_COLUMNS)?;

        let mut motor_numeric = Vec::new();
        let mut context_numeric = Vec::new();
        let mut context_categorical = Vec::new();

        for column in table.columns() {
            let name = column.name.as_str();
            if ID_COLUMNS.contains(&name) {
                continue;
            }
            let numeric = column.data.kind() == ColumnKind::Numeric;

            if numeric && is_motor_candidate(name) && !EXCLUDED_CONDITION_COLUMNS.contains(&name)
            {
                motor_numeric.push(name.to_string());
            } else if numeric {
                context_numeric.push(name.to_string());
            } else {
                context_categorical.push(name.to_string());
            }
        }

        if motor_numeric.len() < min_motor_features {
            return Err(MotorError::Schema(format!(
                "Not enough motor features found ({} < {}). Ensure r1_/r2_/r3_/delta_ columns exist.",
                motor_numeric.len(),
                min_motor_features
            )));
        }

        debug!(
            motor = motor_numeric.len(),
            context_numeric = context_numeric.len(),
            context_categorical = context_categorical.len(),
            "inferred column roles"
        );

        Ok(Self {
            version: FEATURE_SCHEMA_VERSION,
            identifier_columns: ID_COLUMNS.iter().map(|c| c.to_string()).collect(),
            motor_numeric,
            context_numeric,
            context_categorical,
            excluded_condition: EXCLUDED_CONDITION_COLUMNS
                .iter()
                .map(|c| c.to_string())
                .collect(),
        })
    }

    /// First motor column usable as the reaction-time sign anchor
    pub fn sign_anchor(&self) -> Option<(usize, &str)> {
        self.motor_numeric
            .iter()
            .enumerate()
            .find(|(_, name)| name.contains(REACTION_TIME_ANCHOR))
            .map(|(i, name)| (i, name.as_str()))
    }

    /// Check that a table can be replayed through this schema's motor features.
    ///
    /// Every motor column must be present. There is no best-effort alignment:
    /// any gap is an artifact mismatch. Cell types are checked per record by
    /// the scorer, so a stray token in another row never blocks a valid one.
    pub fn validate_motor(&self, table: &SessionTable) -> Result<(), MotorError> {
        if self.version != FEATURE_SCHEMA_VERSION {
            return Err(MotorError::ArtifactMismatch(format!(
                "feature schema version {} is not supported (expected {})",
                self.version, FEATURE_SCHEMA_VERSION
            )));
        }

        let missing: Vec<&str> = self
            .motor_numeric
            .iter()
            .filter(|name| !table.has_column(name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(MotorError::ArtifactMismatch(format!(
                "input is missing {} motor feature column(s): {}",
                missing.len(),
                missing.join(", ")
            )));
        }
        Ok(())
    }
}
