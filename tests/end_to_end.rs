//! Library-level tests of a full train → score cycle on synthetic sessions.

use aura_motor::artifacts::{ArtifactStore, LABELED_SESSIONS_PATH, MANIFEST_FILE};
use aura_motor::config::BoosterParams;
use aura_motor::schema::{
    is_motor_candidate, Column, ColumnData, SessionTable, EXCLUDED_CONDITION_COLUMNS,
    PARTICIPANT_ID_COLUMN, SESSION_ID_COLUMN,
};
use aura_motor::synthetic::{generate_sessions, write_sessions, SyntheticConfig};
use aura_motor::types::round4;
use aura_motor::{MotorError, MotorTrainer, RowSelector, ScoringService, TrainingConfig};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn quick_config() -> TrainingConfig {
    TrainingConfig {
        booster: BoosterParams {
            n_estimators: 12,
            max_depth: 3,
            ..BoosterParams::default()
        },
        ..TrainingConfig::default()
    }
}

fn reference_dataset(dir: &Path) -> PathBuf {
    let path = dir.join("data").join("sessions.csv");
    write_sessions(&path, &SyntheticConfig::default()).unwrap();
    path
}

#[test]
fn reference_run_produces_ordered_bands_and_disjoint_folds() {
    let dir = TempDir::new().unwrap();
    let csv = reference_dataset(dir.path());
    let outdir = dir.path().join("run");

    let outcome = MotorTrainer::new(quick_config())
        .unwrap()
        .train_file(&csv, &outdir)
        .unwrap();

    let t = &outcome.report.labeling.thresholds;
    assert!(t.p10 < t.p30 && t.p30 < t.p60);
    assert!(outcome.manifest.schema.motor_numeric.len() >= 10);
    assert_eq!(outcome.report.data.participants, 80);

    assert_eq!(outcome.fold_participants.len(), 5);
    let mut seen = BTreeSet::new();
    for fold in &outcome.fold_participants {
        for participant in fold {
            assert!(seen.insert(participant.clone()), "{participant} in two folds");
        }
    }
    assert_eq!(seen.len(), 80);

    assert_eq!(outcome.report.model_a.cv_folds.len(), 5);
    assert_eq!(outcome.report.model_b.cv.cv_folds.len(), 5);
    assert!(outdir.join(MANIFEST_FILE).is_file());
    ArtifactStore::new(&outdir).verify().unwrap();
}

#[test]
fn missing_participant_column_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let csv = reference_dataset(dir.path());
    let table = SessionTable::from_path(&csv).unwrap();
    let columns: Vec<Column> = table
        .columns()
        .iter()
        .filter(|c| c.name != PARTICIPANT_ID_COLUMN)
        .cloned()
        .collect();
    let stripped = dir.path().join("no_participant.csv");
    SessionTable::from_columns(columns)
        .unwrap()
        .write_csv(std::fs::File::create(&stripped).unwrap())
        .unwrap();

    let outdir = dir.path().join("run");
    let err = MotorTrainer::new(quick_config())
        .unwrap()
        .train_file(&stripped, &outdir)
        .unwrap_err();

    assert!(matches!(err, MotorError::Schema(_)));
    assert!(!outdir.join(MANIFEST_FILE).exists());
    assert!(!outdir.join("models").exists());
}

#[test]
fn scoring_replays_training_scores() {
    let dir = TempDir::new().unwrap();
    let csv = reference_dataset(dir.path());
    let outdir = dir.path().join("run");
    let outcome = MotorTrainer::new(quick_config())
        .unwrap()
        .train_file(&csv, &outdir)
        .unwrap();

    let service = ScoringService::load(&outdir).unwrap();
    let table = SessionTable::from_path(&csv).unwrap();

    for i in (0..outcome.session_ids.len()).step_by(37) {
        let session_id = outcome.session_ids[i].clone();
        let output = service
            .score(&table, &RowSelector::SessionId(session_id.clone()))
            .unwrap();
        assert_eq!(output.session_id, session_id);
        let expected = round4(outcome.latent_scores[i]);
        assert!(
            (output.motor_profile.latent_score - expected).abs() < 1.5e-4,
            "{session_id}: {} vs {expected}",
            output.motor_profile.latent_score
        );
        assert!(output.motor_profile.confidence > 0.0 && output.motor_profile.confidence <= 1.0);
    }

    let err = service
        .score(&table, &RowSelector::SessionId("S_99999".to_string()))
        .unwrap_err();
    assert!(matches!(err, MotorError::RecordNotFound(_)));
}

#[test]
fn same_seed_reproduces_the_run() {
    let dir = TempDir::new().unwrap();
    let csv = reference_dataset(dir.path());
    let trainer = MotorTrainer::new(quick_config()).unwrap();

    let first = trainer.train_file(&csv, &dir.path().join("a")).unwrap();
    let second = trainer.train_file(&csv, &dir.path().join("b")).unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.report.labeling.thresholds, second.report.labeling.thresholds);
    assert_eq!(first.report.pca.pc1_loadings, second.report.pca.pc1_loadings);
    assert_eq!(first.report.pca.pc1_flipped, second.report.pca.pc1_flipped);
    assert_eq!(first.report.model_a, second.report.model_a);
    assert_eq!(first.report.model_b.cv, second.report.model_b.cv);
    assert_eq!(first.fold_participants, second.fold_participants);
}

#[test]
fn retraining_into_a_bundle_directory_is_refused() {
    let dir = TempDir::new().unwrap();
    let csv = reference_dataset(dir.path());
    let outdir = dir.path().join("run");
    let trainer = MotorTrainer::new(quick_config()).unwrap();

    let outcome = trainer.train_file(&csv, &outdir).unwrap();
    let err = trainer.train_file(&csv, &outdir).unwrap_err();
    assert!(matches!(err, MotorError::ArtifactExists(_)));

    let manifest = ArtifactStore::new(&outdir).load_manifest().unwrap();
    assert_eq!(manifest.run_id, outcome.run_id);
}

/// Append a copy of row 0 under a new session id with every motor value blank
fn with_incomplete_session(table: &SessionTable, session_id: &str) -> SessionTable {
    let columns = table
        .columns()
        .iter()
        .map(|column| {
            let data = match &column.data {
                ColumnData::Numeric(values) => {
                    let mut values = values.clone();
                    let blank = is_motor_candidate(&column.name)
                        && !EXCLUDED_CONDITION_COLUMNS.contains(&column.name.as_str());
                    values.push(if blank { None } else { values[0] });
                    ColumnData::Numeric(values)
                }
                ColumnData::Text(values) => {
                    let mut values = values.clone();
                    values.push(if column.name == SESSION_ID_COLUMN {
                        Some(session_id.to_string())
                    } else {
                        values[0].clone()
                    });
                    ColumnData::Text(values)
                }
            };
            Column {
                name: column.name.clone(),
                data,
            }
        })
        .collect();
    SessionTable::from_columns(columns).unwrap()
}

#[test]
fn incomplete_session_is_excluded_from_every_statistic() {
    let dir = TempDir::new().unwrap();
    let table = generate_sessions(&SyntheticConfig {
        participants: 15,
        ..SyntheticConfig::default()
    })
    .unwrap();
    let augmented = with_incomplete_session(&table, "S_INCOMPLETE");
    let trainer = MotorTrainer::new(TrainingConfig {
        folds: 3,
        ..quick_config()
    })
    .unwrap();

    let baseline_store = ArtifactStore::new(dir.path().join("baseline"));
    let baseline = trainer.train_table(&table, &baseline_store).unwrap();
    let store = ArtifactStore::new(dir.path().join("augmented"));
    let outcome = trainer.train_table(&augmented, &store).unwrap();

    assert_eq!(outcome.report.data.input_rows, table.n_rows() + 1);
    assert_eq!(outcome.report.data.dropped_rows, 1);
    assert!(!outcome.session_ids.iter().any(|id| id == "S_INCOMPLETE"));
    assert_eq!(outcome.session_ids, baseline.session_ids);

    let exported = SessionTable::from_path(&store.path(LABELED_SESSIONS_PATH)).unwrap();
    assert_eq!(exported.find_session("S_INCOMPLETE"), None);
    assert_eq!(exported.n_rows(), baseline.latent_scores.len());

    assert_eq!(outcome.report.labeling.thresholds, baseline.report.labeling.thresholds);
    assert_eq!(outcome.latent_scores, baseline.latent_scores);
    assert_eq!(outcome.report.model_a, baseline.report.model_a);
    assert_eq!(outcome.manifest.motor_fill_values, baseline.manifest.motor_fill_values);
}
