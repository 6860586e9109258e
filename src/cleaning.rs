//! Missing-data policy
//!
//! Turns the raw session table into a [`CleanedTable`] in two steps:
//! row filtering on the share of missing motor values, then median imputation
//! computed over the retained rows only. The raw table is left untouched.

use crate::error::MotorError;
use crate::schema::{FeatureSchema, SessionTable, PARTICIPANT_ID_COLUMN, SESSION_ID_COLUMN};
use crate::stats::median;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Category substituted for missing or null-like categorical cells
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Text values treated as null when coercing categorical cells
const NULL_LIKE: [&str; 4] = ["nan", "NaN", "None", "null"];

/// One column's imputation, kept for auditing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputationRecord {
    pub column: String,
    pub fill_value: f64,
    pub cells_filled: usize,
}

/// Retained, imputed rows ready for fitting
#[derive(Debug, Clone)]
pub struct CleanedTable {
    pub schema: FeatureSchema,
    /// Positions of the retained rows in the raw table
    pub retained_rows: Vec<usize>,
    pub session_ids: Vec<String>,
    pub participant_ids: Vec<String>,
    /// Rows x motor features, in schema order
    pub motor: Array2<f64>,
    /// Rows x context numeric features, in schema order
    pub context_numeric: Array2<f64>,
    /// One vector per categorical context column
    pub context_categorical: Vec<Vec<String>>,
    /// Median of every motor column over the retained rows
    pub motor_fill_values: Vec<f64>,
    pub imputations: Vec<ImputationRecord>,
}

impl CleanedTable {
    pub fn n_rows(&self) -> usize {
        self.retained_rows.len()
    }

    /// Number of distinct participants among retained rows
    pub fn n_participants(&self) -> usize {
        let mut ids: Vec<&str> = self.participant_ids.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

/// Row filter plus median imputation
#[derive(Debug, Clone, Copy)]
pub struct MissingDataPolicy {
    max_missing_motor_fraction: f64,
}

impl MissingDataPolicy {
    pub fn new(max_missing_motor_fraction: f64) -> Self {
        Self {
            max_missing_motor_fraction,
        }
    }

    pub fn max_missing_motor_fraction(&self) -> f64 {
        self.max_missing_motor_fraction
    }

    /// Whether a row with `missing` of `total` motor values missing is kept
    pub fn retains(&self, missing: usize, total: usize) -> bool {
        total == 0 || (missing as f64 / total as f64) <= self.max_missing_motor_fraction
    }

    /// Filter and impute `table` according to `schema`
    pub fn apply(
        &self,
        table: &SessionTable,
        schema: &FeatureSchema,
    ) -> Result<CleanedTable, MotorError> {
        let motor_columns = numeric_columns(table, &schema.motor_numeric)?;
        let context_columns = numeric_columns(table, &schema.context_numeric)?;

        let retained_rows: Vec<usize> = (0..table.n_rows())
            .filter(|&row| {
                let missing = motor_columns.iter().filter(|c| c[row].is_none()).count();
                self.retains(missing, motor_columns.len())
            })
            .collect();

        let dropped = table.n_rows() - retained_rows.len();
        if dropped > 0 {
            info!(
                dropped,
                limit = self.max_missing_motor_fraction,
                "discarded rows with too many missing motor values"
            );
        }
        if retained_rows.is_empty() {
            return Err(MotorError::EmptyDataset(
                "no rows left after missing-data filtering".to_string(),
            ));
        }

        let mut imputations = Vec::new();
        let (motor, motor_fill_values) = impute_matrix(
            &motor_columns,
            &schema.motor_numeric,
            &retained_rows,
            &mut imputations,
        );
        let (context_numeric, _) = impute_matrix(
            &context_columns,
            &schema.context_numeric,
            &retained_rows,
            &mut imputations,
        );

        let context_categorical = schema
            .context_categorical
            .iter()
            .map(|name| {
                let cells = table.text(name).ok_or_else(|| {
                    MotorError::Schema(format!("Categorical column {name} is missing"))
                })?;
                Ok(retained_rows
                    .iter()
                    .map(|&row| coerce_category(cells[row].as_deref()))
                    .collect())
            })
            .collect::<Result<Vec<Vec<String>>, MotorError>>()?;

        let session_ids = identifiers(table, SESSION_ID_COLUMN, &retained_rows);
        let participant_ids = identifiers(table, PARTICIPANT_ID_COLUMN, &retained_rows);

        debug!(
            rows = retained_rows.len(),
            imputed_columns = imputations.len(),
            "cleaned session table"
        );

        Ok(CleanedTable {
            schema: schema.clone(),
            retained_rows,
            session_ids,
            participant_ids,
            motor,
            context_numeric,
            context_categorical,
            motor_fill_values,
            imputations,
        })
    }
}

/// Map a raw categorical cell to its cleaned category
pub fn coerce_category(cell: Option<&str>) -> String {
    match cell {
        Some(value) if !NULL_LIKE.contains(&value) => value.to_string(),
        _ => UNKNOWN_CATEGORY.to_string(),
    }
}

fn numeric_columns<'a>(
    table: &'a SessionTable,
    names: &[String],
) -> Result<Vec<&'a [Option<f64>]>, MotorError> {
    names
        .iter()
        .map(|name| {
            table
                .numeric(name)
                .ok_or_else(|| MotorError::Schema(format!("Numeric column {name} is missing")))
        })
        .collect()
}

/// Build a rows x columns matrix over `rows`, filling gaps with the column
/// median over those same rows. Returns the matrix and every column's median.
fn impute_matrix(
    columns: &[&[Option<f64>]],
    names: &[String],
    rows: &[usize],
    log: &mut Vec<ImputationRecord>,
) -> (Array2<f64>, Vec<f64>) {
    let mut matrix = Array2::zeros((rows.len(), columns.len()));
    let mut fill_values = Vec::with_capacity(columns.len());

    for (j, (cells, name)) in columns.iter().zip(names).enumerate() {
        let observed: Vec<f64> = rows.iter().filter_map(|&row| cells[row]).collect();
        let fill_value = median(&observed).unwrap_or_else(|| {
            warn!(column = %name, "no observed values among retained rows; filling with 0");
            0.0
        });
        fill_values.push(fill_value);

        let mut cells_filled = 0;
        for (i, &row) in rows.iter().enumerate() {
            matrix[[i, j]] = cells[row].unwrap_or_else(|| {
                cells_filled += 1;
                fill_value
            });
        }
        if cells_filled > 0 {
            log.push(ImputationRecord {
                column: name.clone(),
                fill_value,
                cells_filled,
            });
        }
    }

    (matrix, fill_values)
}

fn identifiers(table: &SessionTable, column: &str, rows: &[usize]) -> Vec<String> {
    rows.iter()
        .map(|&row| {
            table
                .cell_text(column, row)
                .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;

    /// Four motor columns, one context numeric, one categorical
    fn make_table() -> (SessionTable, FeatureSchema) {
        let table = SessionTable::from_columns(vec![
            Column::text(
                "sessionId",
                (1..=5).map(|i| Some(format!("S_{i}"))).collect(),
            ),
            Column::text(
                "participantId",
                vec![
                    Some("P_1".into()),
                    Some("P_1".into()),
                    Some("P_2".into()),
                    Some("P_3".into()),
                    Some("P_3".into()),
                ],
            ),
            Column::numeric("r1_a", vec![Some(1.0), None, Some(3.0), Some(100.0), Some(5.0)]),
            Column::numeric("r1_b", vec![Some(1.0), None, Some(3.0), Some(4.0), Some(5.0)]),
            Column::numeric("r2_a", vec![Some(1.0), Some(2.0), None, Some(4.0), Some(5.0)]),
            Column::numeric("r2_b", vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0)]),
            Column::numeric("screen_dpr", vec![Some(1.0), Some(2.0), None, None, Some(1.5)]),
            Column::text(
                "device_os",
                vec![Some("Linux".into()), None, Some("nan".into()), Some("iOS".into()), None],
            ),
        ])
        .unwrap();
        let schema = FeatureSchema::infer(&table, 4).unwrap();
        (table, schema)
    }

    #[test]
    fn test_row_filter_drops_before_statistics() {
        let (table, schema) = make_table();
        let cleaned = MissingDataPolicy::new(0.25).apply(&table, &schema).unwrap();

        // Row 1 misses 2 of 4 motor values (50%) and is dropped
        assert_eq!(cleaned.retained_rows, vec![0, 2, 3, 4]);
        assert_eq!(cleaned.session_ids, vec!["S_1", "S_3", "S_4", "S_5"]);

        // r2_a median over retained rows (1, 4, 5) is 4, not the median of all rows
        let r2_a = schema.motor_numeric.iter().position(|c| c == "r2_a").unwrap();
        assert_eq!(cleaned.motor[[1, r2_a]], 4.0);
        assert_eq!(cleaned.motor_fill_values[r2_a], 4.0);
    }

    #[test]
    fn test_boundary_fraction_is_retained() {
        let (table, schema) = make_table();
        // Row 2 misses exactly 1 of 4 motor values (25%)
        let cleaned = MissingDataPolicy::new(0.25).apply(&table, &schema).unwrap();
        assert!(cleaned.retained_rows.contains(&2));

        let strict = MissingDataPolicy::new(0.2).apply(&table, &schema).unwrap();
        assert!(!strict.retained_rows.contains(&2));
    }

    #[test]
    fn test_context_numeric_imputation() {
        let (table, schema) = make_table();
        let cleaned = MissingDataPolicy::new(0.25).apply(&table, &schema).unwrap();

        // screen_dpr over retained rows: 1.0, None, None, 1.5 -> median 1.25
        let col = cleaned.context_numeric.column(0);
        assert_eq!(col.to_vec(), vec![1.0, 1.25, 1.25, 1.5]);

        let record = cleaned
            .imputations
            .iter()
            .find(|r| r.column == "screen_dpr")
            .unwrap();
        assert_eq!(record.cells_filled, 2);
    }

    #[test]
    fn test_categorical_unknown() {
        let (table, schema) = make_table();
        let cleaned = MissingDataPolicy::new(0.25).apply(&table, &schema).unwrap();
        assert_eq!(
            cleaned.context_categorical[0],
            vec!["Linux", "unknown", "iOS", "unknown"]
        );
    }

    #[test]
    fn test_raw_table_untouched() {
        let (table, schema) = make_table();
        let _ = MissingDataPolicy::new(0.25).apply(&table, &schema).unwrap();
        assert_eq!(table.numeric("r2_a").unwrap()[2], None);
        assert_eq!(table.n_rows(), 5);
    }

    #[test]
    fn test_all_rows_dropped() {
        let table = SessionTable::from_columns(vec![
            Column::text("sessionId", vec![Some("S_1".into()), Some("S_2".into())]),
            Column::text("participantId", vec![Some("P_1".into()), Some("P_2".into())]),
            Column::numeric("r1_a", vec![None, Some(1.0)]),
            Column::numeric("r1_b", vec![Some(1.0), None]),
        ])
        .unwrap();
        let schema = FeatureSchema::infer(&table, 2).unwrap();

        let err = MissingDataPolicy::new(0.25).apply(&table, &schema).unwrap_err();
        assert!(matches!(err, MotorError::EmptyDataset(_)));
    }

    #[test]
    fn test_participant_count() {
        let (table, schema) = make_table();
        let cleaned = MissingDataPolicy::new(0.25).apply(&table, &schema).unwrap();
        assert_eq!(cleaned.n_participants(), 3);
    }
}
