//! Training pipeline
//!
//! Orchestrates one training run end to end:
//! session table → column roles → cleaning → latent score → percentile labels
//! → grouped CV of both classifier variants → final fits → artifact bundle.
//!
//! Everything is computed before the first byte is written, so a run that
//! fails leaves no artifacts behind.

use crate::artifacts::report::{
    ContextModelReport, DataSummary, LabelingReport, PcaReport, Producer, TrainingReport,
};
use crate::artifacts::store::{CLASSIFIER_KIND, REDUCER_KIND, SCALER_KIND};
use crate::artifacts::{
    ArtifactStore, BundleManifest, UnitPaths, BUNDLE_FORMAT_VERSION, LABELED_SESSIONS_PATH,
    MODEL_A_PATH, MODEL_B_PATH, REDUCER_PATH, SCALER_PATH,
};
use crate::cleaning::{CleanedTable, MissingDataPolicy};
use crate::config::TrainingConfig;
use crate::cv::{cross_validate, CvResult, Fold, GroupKFold};
use crate::error::MotorError;
use crate::labeling::{PercentileThresholds, LABELING_METHOD};
use crate::latent::{LatentFit, LatentScoreBuilder};
use crate::model::{ClassifierSpec, FittedClassifier, Variant};
use crate::schema::{Column, ColumnData, FeatureSchema, SessionTable};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Column holding the aligned latent score in the labeled export
pub const LATENT_COLUMN: &str = "latent_pc1_motor";

/// Column holding the class index in the labeled export
pub const LABEL_COLUMN: &str = "label_level";

/// Result of a completed training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub run_id: String,
    pub manifest: BundleManifest,
    pub report: TrainingReport,
    /// Participants held out by each fold, in fold order
    pub fold_participants: Vec<BTreeSet<String>>,
    /// Aligned latent score per retained row
    pub latent_scores: Vec<f64>,
    pub session_ids: Vec<String>,
}

/// Fitted classifier plus its cross-validation record
struct VariantFit {
    cv: CvResult,
    model: FittedClassifier,
}

/// Runs training with a fixed configuration
#[derive(Debug, Clone)]
pub struct MotorTrainer {
    config: TrainingConfig,
}

impl MotorTrainer {
    pub fn new(config: TrainingConfig) -> Result<Self, MotorError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train from a CSV file and write the bundle into `output_dir`
    pub fn train_file(&self, dataset: &Path, output_dir: &Path) -> Result<TrainingOutcome, MotorError> {
        let store = ArtifactStore::new(output_dir);
        store.ensure_vacant()?;
        let table = SessionTable::from_path(dataset)?;
        info!(path = %dataset.display(), rows = table.n_rows(), "loaded dataset");
        self.train_table(&table, &store)
    }

    /// Train on an in-memory table
    pub fn train_table(
        &self,
        table: &SessionTable,
        store: &ArtifactStore,
    ) -> Result<TrainingOutcome, MotorError> {
        let config = &self.config;
        store.ensure_vacant()?;

        let schema = FeatureSchema::infer(table, config.min_motor_features)?;
        info!(
            motor = schema.motor_numeric.len(),
            context_numeric = schema.context_numeric.len(),
            context_categorical = schema.context_categorical.len(),
            "column roles inferred"
        );

        let cleaned = MissingDataPolicy::new(config.max_missing_motor_fraction).apply(table, &schema)?;
        info!(
            input_rows = table.n_rows(),
            retained_rows = cleaned.n_rows(),
            participants = cleaned.n_participants(),
            "cleaned dataset"
        );

        let latent = LatentScoreBuilder::fit(&cleaned)?;
        let thresholds = PercentileThresholds::fit(&latent.scores, config.percentile_cuts)?;
        let labels = thresholds.classes(&latent.scores);
        info!(
            p10 = thresholds.p10,
            p30 = thresholds.p30,
            p60 = thresholds.p60,
            "labeled sessions"
        );

        let mut rng = StdRng::seed_from_u64(config.seed);
        let folds = GroupKFold::new(config.folds)?.split(&cleaned.participant_ids, &mut rng)?;

        let model_a = self.fit_variant(Variant::MotorOnly, &cleaned, &labels, &folds)?;
        let model_b = self.fit_variant(Variant::MotorPlusContext, &cleaned, &labels, &folds)?;

        let run_id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        let report = TrainingReport {
            run_id: run_id.clone(),
            created_at,
            producer: Producer::current(),
            seed: config.seed,
            data: DataSummary {
                input_rows: table.n_rows(),
                retained_rows: cleaned.n_rows(),
                dropped_rows: table.n_rows() - cleaned.n_rows(),
                participants: cleaned.n_participants(),
                max_missing_motor_fraction: config.max_missing_motor_fraction,
                imputations: cleaned.imputations.clone(),
            },
            pca: pca_report(&cleaned, &latent),
            labeling: LabelingReport {
                method: LABELING_METHOD.to_string(),
                cuts_percentiles: config.percentile_cuts,
                thresholds,
                label_names: LabelingReport::label_names(),
                label_counts: LabelingReport::label_counts(&labels),
            },
            model_a: model_a.cv.clone(),
            model_b: ContextModelReport {
                context_numeric_columns: schema.context_numeric.clone(),
                context_categorical_columns: schema.context_categorical.clone(),
                encoded_categorical_columns: model_b
                    .model
                    .encoder
                    .as_ref()
                    .map(|encoder| encoder.output_names())
                    .unwrap_or_default(),
                cv: model_b.cv.clone(),
            },
            estimator: config.booster.clone(),
        };

        let manifest = BundleManifest {
            format_version: BUNDLE_FORMAT_VERSION,
            run_id: run_id.clone(),
            created_at,
            producer: Producer::current(),
            schema: schema.clone(),
            thresholds,
            max_missing_motor_fraction: config.max_missing_motor_fraction,
            motor_fill_values: cleaned.motor_fill_values.clone(),
            units: UnitPaths::default(),
        };

        let labeled = labeled_sessions(table, &cleaned, &latent.scores, &labels)?;
        let mut csv_bytes = Vec::new();
        labeled.write_csv(&mut csv_bytes)?;

        store.prepare()?;
        store.write_unit(SCALER_PATH, &run_id, SCALER_KIND, &latent.scaler)?;
        store.write_unit(REDUCER_PATH, &run_id, REDUCER_KIND, &latent.reducer)?;
        store.write_unit(MODEL_A_PATH, &run_id, CLASSIFIER_KIND, &model_a.model)?;
        store.write_unit(MODEL_B_PATH, &run_id, CLASSIFIER_KIND, &model_b.model)?;
        store.write_report(&report)?;
        store.write_atomic(LABELED_SESSIONS_PATH, &csv_bytes)?;
        store.write_manifest(&manifest)?;

        info!(
            run_id = %run_id,
            output_dir = %store.root().display(),
            model_a_macro_f1 = report.model_a.overall.macro_f1,
            model_b_macro_f1 = report.model_b.cv.overall.macro_f1,
            "training run complete"
        );

        let fold_participants: Vec<BTreeSet<String>> = folds
            .iter()
            .map(|fold| {
                fold.test
                    .iter()
                    .map(|&row| cleaned.participant_ids[row].clone())
                    .collect()
            })
            .collect();

        Ok(TrainingOutcome {
            run_id,
            manifest,
            report,
            fold_participants,
            latent_scores: latent.scores,
            session_ids: cleaned.session_ids,
        })
    }

    fn fit_variant(
        &self,
        variant: Variant,
        cleaned: &CleanedTable,
        labels: &[usize],
        folds: &[Fold],
    ) -> Result<VariantFit, MotorError> {
        let spec = ClassifierSpec::new(variant, self.config.booster.clone(), self.config.seed);
        let frame = variant.frame(cleaned)?;

        let cv = cross_validate(&spec, &frame, labels, folds)?;
        info!(
            variant = variant.key(),
            macro_f1 = cv.overall.macro_f1,
            balanced_acc = cv.overall.balanced_acc,
            "cross-validated classifier"
        );

        let model = spec.fit(&frame, labels)?;
        Ok(VariantFit { cv, model })
    }
}

/// Train with `config`, reading `dataset` and writing into `output_dir`
pub fn train(
    dataset: &Path,
    output_dir: &Path,
    config: TrainingConfig,
) -> Result<TrainingOutcome, MotorError> {
    MotorTrainer::new(config)?.train_file(dataset, output_dir)
}

fn pca_report(cleaned: &CleanedTable, latent: &LatentFit) -> PcaReport {
    let schema = &cleaned.schema;
    PcaReport {
        explained_variance_ratio_pc1: latent.reducer.explained_variance_ratio,
        pc1_flipped: latent.reducer.flipped,
        motor_feature_columns: schema.motor_numeric.clone(),
        excluded_condition_columns: schema.excluded_condition.clone(),
        pc1_loadings: PcaReport::loadings_map(&schema.motor_numeric, &latent.reducer.loadings),
        sign_anchor_column: latent.sign_anchor.clone(),
        sign_anchor_correlation: latent.anchor_correlation.filter(|r| r.is_finite()),
    }
}

/// Retained rows with imputed values, coerced categories, latent score and label
fn labeled_sessions(
    table: &SessionTable,
    cleaned: &CleanedTable,
    scores: &[f64],
    labels: &[usize],
) -> Result<SessionTable, MotorError> {
    let schema = &cleaned.schema;
    let rows = &cleaned.retained_rows;

    let mut columns = Vec::with_capacity(table.columns().len() + 2);
    for column in table.columns() {
        let name = column.name.as_str();
        let position = |names: &[String]| names.iter().position(|n| n == name);

        let rebuilt = if let Some(j) = position(&schema.motor_numeric) {
            Column::numeric(name, cleaned.motor.column(j).iter().map(|v| Some(*v)).collect())
        } else if let Some(j) = position(&schema.context_numeric) {
            Column::numeric(
                name,
                cleaned.context_numeric.column(j).iter().map(|v| Some(*v)).collect(),
            )
        } else if let Some(j) = position(&schema.context_categorical) {
            Column::text(
                name,
                cleaned.context_categorical[j].iter().cloned().map(Some).collect(),
            )
        } else {
            let data = match &column.data {
                ColumnData::Numeric(values) => {
                    ColumnData::Numeric(rows.iter().map(|&r| values[r]).collect())
                }
                ColumnData::Text(values) => {
                    ColumnData::Text(rows.iter().map(|&r| values[r].clone()).collect())
                }
            };
            Column {
                name: name.to_string(),
                data,
            }
        };
        columns.push(rebuilt);
    }

    columns.push(Column::numeric(
        LATENT_COLUMN,
        scores.iter().map(|s| Some(*s)).collect(),
    ));
    columns.push(Column::numeric(
        LABEL_COLUMN,
        labels.iter().map(|l| Some(*l as f64)).collect(),
    ));
    SessionTable::from_columns(columns)
}
