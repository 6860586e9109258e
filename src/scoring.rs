//! Scoring replay
//!
//! Replays a training run's fitted transforms on one new record:
//! schema check → motor values in training order → training-median imputation
//! → scaler → reducer (with flip) → latent score, and in parallel the imputed
//! vector → classifier A → difficulty level.
//!
//! Nothing is refit here. A [`ScoringService`] is immutable once loaded and can
//! be shared across threads.

use crate::artifacts::{ArtifactBundle, ArtifactStore};
use crate::cleaning::MissingDataPolicy;
use crate::error::MotorError;
use crate::model::argmax;
use crate::schema::{ColumnData, SessionTable, PARTICIPANT_ID_COLUMN, SESSION_ID_COLUMN};
use crate::types::{round4, MotorLevel, MotorProfile, ScoringOutput, SCORING_NOTES};
use std::path::Path;
use tracing::debug;

/// Identifier echoed when a record has no id
const UNKNOWN_ID: &str = "unknown";

/// Which record of a dataset to score
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RowSelector {
    /// First row of the dataset
    #[default]
    First,
    SessionId(String),
    Index(usize),
}

impl RowSelector {
    /// Session id wins over a row index; neither means the first row
    pub fn from_options(session_id: Option<String>, row: Option<usize>) -> Self {
        match (session_id, row) {
            (Some(id), _) => RowSelector::SessionId(id),
            (None, Some(index)) => RowSelector::Index(index),
            (None, None) => RowSelector::First,
        }
    }

    /// Resolve to a row position in `table`
    pub fn resolve(&self, table: &SessionTable) -> Result<usize, MotorError> {
        match self {
            RowSelector::SessionId(id) => table
                .find_session(id)
                .ok_or_else(|| MotorError::RecordNotFound(id.clone())),
            RowSelector::Index(index) => {
                if *index < table.n_rows() {
                    Ok(*index)
                } else {
                    Err(MotorError::IndexOutOfRange {
                        index: *index,
                        len: table.n_rows(),
                    })
                }
            }
            RowSelector::First => {
                if table.n_rows() == 0 {
                    Err(MotorError::EmptyDataset("no rows to score".to_string()))
                } else {
                    Ok(0)
                }
            }
        }
    }
}

/// Loaded, read-only scoring state of one training run
#[derive(Debug, Clone)]
pub struct ScoringService {
    bundle: ArtifactBundle,
    policy: MissingDataPolicy,
}

impl ScoringService {
    /// Load the bundle written by a training run into `output_dir`
    pub fn load(output_dir: &Path) -> Result<Self, MotorError> {
        let bundle = ArtifactStore::new(output_dir).load_bundle()?;
        Ok(Self::from_bundle(bundle))
    }

    pub fn from_bundle(bundle: ArtifactBundle) -> Self {
        let policy = MissingDataPolicy::new(bundle.manifest.max_missing_motor_fraction);
        Self { bundle, policy }
    }

    pub fn bundle(&self) -> &ArtifactBundle {
        &self.bundle
    }

    /// Validate the table, select one record and score it
    pub fn score(&self, table: &SessionTable, selector: &RowSelector) -> Result<ScoringOutput, MotorError> {
        self.bundle.manifest.schema.validate_motor(table)?;
        let row = selector.resolve(table)?;
        self.score_row(table, row)
    }

    /// Score one row of an already validated table
    fn score_row(&self, table: &SessionTable, row: usize) -> Result<ScoringOutput, MotorError> {
        let values = self.motor_values(table, row)?;
        let motor_profile = self.profile(&values)?;
        let id = |column: &str| {
            table
                .cell_text(column, row)
                .unwrap_or_else(|| UNKNOWN_ID.to_string())
        };

        Ok(ScoringOutput {
            session_id: id(SESSION_ID_COLUMN),
            participant_id: id(PARTICIPANT_ID_COLUMN),
            motor_profile,
            notes: SCORING_NOTES.iter().map(|n| n.to_string()).collect(),
        })
    }

    /// Motor values of one record in training column order.
    ///
    /// Only the selected record's cells are parsed; a non-numeric cell there is
    /// an artifact mismatch naming the column.
    fn motor_values(&self, table: &SessionTable, row: usize) -> Result<Vec<Option<f64>>, MotorError> {
        if row >= table.n_rows() {
            return Err(MotorError::IndexOutOfRange {
                index: row,
                len: table.n_rows(),
            });
        }

        self.bundle
            .manifest
            .schema
            .motor_numeric
            .iter()
            .map(|name| match table.column(name).map(|c| &c.data) {
                Some(ColumnData::Numeric(cells)) => Ok(cells[row]),
                Some(ColumnData::Text(cells)) => match cells[row].as_deref() {
                    None => Ok(None),
                    Some(text) => text
                        .parse::<f64>()
                        .ok()
                        .filter(|v| v.is_finite())
                        .map(Some)
                        .ok_or_else(|| {
                            MotorError::ArtifactMismatch(format!(
                                "motor feature column {name} is not numeric in row {row}: {text:?}"
                            ))
                        }),
                },
                None => Err(MotorError::ArtifactMismatch(format!(
                    "input is missing motor feature column {name}"
                ))),
            })
            .collect()
    }

    /// Imputed motor vector in training column order
    pub fn impute(&self, values: &[Option<f64>]) -> Result<Vec<f64>, MotorError> {
        let fill_values = &self.bundle.manifest.motor_fill_values;
        if values.len() != fill_values.len() {
            return Err(MotorError::ArtifactMismatch(format!(
                "record has {} motor values, bundle expects {}",
                values.len(),
                fill_values.len()
            )));
        }

        let missing = values.iter().filter(|v| v.is_none()).count();
        if !self.policy.retains(missing, values.len()) {
            return Err(MotorError::IncompleteRecord {
                missing,
                total: values.len(),
                limit: self.policy.max_missing_motor_fraction(),
            });
        }

        Ok(values
            .iter()
            .zip(fill_values)
            .map(|(value, fill)| value.unwrap_or(*fill))
            .collect())
    }

    /// Aligned latent score of an imputed motor vector, unrounded
    pub fn latent_score(&self, imputed: &[f64]) -> Result<f64, MotorError> {
        let scaled = self.bundle.scaler.transform_row(imputed)?;
        self.bundle.reducer.transform_row(&scaled)
    }

    /// Replay every fitted transform on one record's motor values
    pub fn profile(&self, values: &[Option<f64>]) -> Result<MotorProfile, MotorError> {
        let imputed = self.impute(values)?;
        let latent = self.latent_score(&imputed)?;

        let probabilities = self.bundle.classifier.predict_proba_numeric(&imputed)?;
        let class = argmax(&probabilities);
        let level = MotorLevel::from_class(class).ok_or_else(|| {
            MotorError::ArtifactMismatch(format!("classifier produced unknown class {class}"))
        })?;
        let confidence = probabilities.get(class).copied().unwrap_or(0.0);

        debug!(level = level.as_str(), confidence, latent, "scored record");

        Ok(MotorProfile {
            level,
            confidence: round4(confidence),
            latent_score: round4(latent),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{BundleManifest, Producer, UnitPaths, BUNDLE_FORMAT_VERSION};
    use crate::config::BoosterParams;
    use crate::labeling::PercentileThresholds;
    use crate::latent::LatentReducer;
    use crate::model::{ClassifierSpec, FeatureFrame, Variant};
    use crate::preprocess::RobustScaler;
    use crate::schema::{Column, FeatureSchema, FEATURE_SCHEMA_VERSION};
    use chrono::Utc;
    use ndarray::Array2;

    fn motor_columns() -> Vec<String> {
        (0..4).map(|i| format!("r1_m{i}")).collect()
    }

    /// Hand-built bundle: identity scaler, unit reducer, classifier on column 0
    fn make_service() -> ScoringService {
        let columns = motor_columns();
        let n = 32;
        let labels: Vec<usize> = (0..n).map(|i| i % 4).collect();
        let values: Vec<f64> = labels
            .iter()
            .enumerate()
            .flat_map(|(i, l)| {
                [*l as f64 * 2.0, (i % 3) as f64, (i % 5) as f64, 1.0]
            })
            .collect();
        let frame = FeatureFrame {
            numeric_columns: columns.clone(),
            numeric: Array2::from_shape_vec((n, 4), values).unwrap(),
            categorical_columns: Vec::new(),
            categorical: Vec::new(),
        };
        let params = BoosterParams {
            n_estimators: 15,
            ..BoosterParams::default()
        };
        let classifier = ClassifierSpec::new(Variant::MotorOnly, params, 42)
            .fit(&frame, &labels)
            .unwrap();

        let manifest = BundleManifest {
            format_version: BUNDLE_FORMAT_VERSION,
            run_id: "test-run".to_string(),
            created_at: Utc::now(),
            producer: Producer::current(),
            schema: FeatureSchema {
                version: FEATURE_SCHEMA_VERSION,
                identifier_columns: vec!["sessionId".into(), "participantId".into()],
                motor_numeric: columns.clone(),
                context_numeric: Vec::new(),
                context_categorical: Vec::new(),
                excluded_condition: Vec::new(),
            },
            thresholds: PercentileThresholds {
                p10: -1.0,
                p30: 0.0,
                p60: 1.0,
            },
            max_missing_motor_fraction: 0.25,
            motor_fill_values: vec![10.0, 20.0, 30.0, 40.0],
            units: UnitPaths::default(),
        };

        ScoringService::from_bundle(ArtifactBundle {
            manifest,
            scaler: RobustScaler {
                columns: columns.clone(),
                center: vec![0.0; 4],
                scale: vec![1.0; 4],
            },
            reducer: LatentReducer {
                columns,
                mean: vec![0.0; 4],
                loadings: vec![1.0, 0.0, 0.0, 0.0],
                explained_variance_ratio: 1.0,
                flipped: true,
            },
            classifier,
        })
    }

    fn make_table(rows: Vec<[Option<f64>; 4]>) -> SessionTable {
        let n = rows.len();
        let mut columns = vec![
            Column::text("sessionId", (0..n).map(|i| Some(format!("S_{i}"))).collect()),
            Column::text("participantId", (0..n).map(|_| None).collect()),
        ];
        for (j, name) in motor_columns().into_iter().enumerate() {
            columns.push(Column::numeric(name, rows.iter().map(|r| r[j]).collect()));
        }
        SessionTable::from_columns(columns).unwrap()
    }

    #[test]
    fn test_scores_selected_session() {
        let service = make_service();
        let table = make_table(vec![
            [Some(0.0), Some(1.0), Some(2.0), Some(1.0)],
            [Some(6.0), Some(1.0), Some(2.0), Some(1.0)],
        ]);
        let output = service
            .score(&table, &RowSelector::SessionId("S_1".to_string()))
            .unwrap();

        assert_eq!(output.session_id, "S_1");
        assert_eq!(output.participant_id, "unknown");
        assert_eq!(output.motor_profile.level, MotorLevel::High);
        // Flipped unit loading on column 0
        assert_eq!(output.motor_profile.latent_score, -6.0);
        assert!(output.motor_profile.confidence > 0.25 && output.motor_profile.confidence <= 1.0);
        assert_eq!(output.notes.len(), 2);
    }

    #[test]
    fn test_default_selector_is_first_row() {
        let service = make_service();
        let table = make_table(vec![
            [Some(2.0), Some(1.0), Some(2.0), Some(1.0)],
            [Some(6.0), Some(1.0), Some(2.0), Some(1.0)],
        ]);
        let output = service.score(&table, &RowSelector::default()).unwrap();
        assert_eq!(output.session_id, "S_0");
        assert_eq!(output.motor_profile.level, MotorLevel::Mild);
    }

    #[test]
    fn test_imputes_with_training_medians() {
        let service = make_service();
        let imputed = service
            .impute(&[Some(1.0), None, Some(3.0), Some(4.0)])
            .unwrap();
        assert_eq!(imputed, vec![1.0, 20.0, 3.0, 4.0]);

        let err = service.impute(&[None, None, Some(3.0), Some(4.0)]).unwrap_err();
        assert!(matches!(
            err,
            MotorError::IncompleteRecord {
                missing: 2,
                total: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_session() {
        let service = make_service();
        let table = make_table(vec![[Some(0.0); 4]]);
        let err = service
            .score(&table, &RowSelector::SessionId("S_404".to_string()))
            .unwrap_err();
        assert!(matches!(err, MotorError::RecordNotFound(id) if id == "S_404"));
    }

    #[test]
    fn test_row_out_of_range() {
        let service = make_service();
        let table = make_table(vec![[Some(0.0); 4]; 3]);
        let err = service.score(&table, &RowSelector::Index(7)).unwrap_err();
        assert_eq!(err.to_string(), "Row 7 out of range. Must be 0..2");
    }

    #[test]
    fn test_missing_motor_column_is_mismatch() {
        let service = make_service();
        let table = SessionTable::from_columns(vec![
            Column::text("sessionId", vec![Some("S_0".into())]),
            Column::text("participantId", vec![Some("P_0".into())]),
            Column::numeric("r1_m0", vec![Some(1.0)]),
        ])
        .unwrap();
        let err = service.score(&table, &RowSelector::First).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, MotorError::ArtifactMismatch(_)));
        assert!(message.contains("r1_m1") && message.contains("r1_m3"));
    }

    /// Motor column `r1_m1` read as text because row 1 holds a stray token
    fn table_with_bad_cell() -> SessionTable {
        SessionTable::from_reader(
            "sessionId,participantId,r1_m0,r1_m1,r1_m2,r1_m3\n\
             S_0,P_0,2.0,1.0,2.0,1.0\n\
             S_1,P_1,6.0,n/a?,2.0,1.0\n\
             S_2,P_2,4.0,NA,2.0,1.0\n"
                .as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn test_stray_token_in_other_row_does_not_block_scoring() {
        let service = make_service();
        let table = table_with_bad_cell();
        assert_eq!(table.kind("r1_m1"), Some(crate::schema::ColumnKind::Text));

        let output = service.score(&table, &RowSelector::Index(0)).unwrap();
        assert_eq!(output.session_id, "S_0");
        assert_eq!(output.motor_profile.latent_score, -2.0);

        let imputed = service.score(&table, &RowSelector::Index(2)).unwrap();
        assert_eq!(imputed.motor_profile.latent_score, -4.0);
    }

    #[test]
    fn test_non_numeric_cell_in_selected_row_is_mismatch() {
        let service = make_service();
        let table = table_with_bad_cell();
        let err = service
            .score(&table, &RowSelector::SessionId("S_1".to_string()))
            .unwrap_err();
        assert!(matches!(err, MotorError::ArtifactMismatch(ref m) if m.contains("r1_m1")));
    }

    #[test]
    fn test_motor_values_guard_row_bounds() {
        let service = make_service();
        let table = make_table(vec![[Some(0.0); 4]; 2]);
        let err = service.motor_values(&table, 2).unwrap_err();
        assert!(matches!(err, MotorError::IndexOutOfRange { index: 2, len: 2 }));
    }

    #[test]
    fn test_selector_precedence() {
        assert_eq!(
            RowSelector::from_options(Some("S_1".into()), Some(3)),
            RowSelector::SessionId("S_1".into())
        );
        assert_eq!(RowSelector::from_options(None, Some(3)), RowSelector::Index(3));
        assert_eq!(RowSelector::from_options(None, None), RowSelector::First);
    }

    #[test]
    fn test_service_is_shareable() {
        fn assert_sync<T: Send + Sync>() {}
        assert_sync::<ScoringService>();
    }
}
