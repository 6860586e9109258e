//! On-disk artifact store
//!
//! Layout under the output directory:
//!
//! ```text
//! bundle.json
//! preprocess/pca_scaler_motor.json
//! preprocess/pca_pc1_motor.json
//! models/modelA_motor_only.json
//! models/modelB_motor_plus_context.json
//! reports/training_report.json
//! reports/sessions_with_latent_and_labels.csv
//! ```
//!
//! `bundle.json` is written last, so a directory without it holds no usable
//! run. A directory that already has one is never written to again.

use crate::artifacts::report::{Producer, TrainingReport};
use crate::error::MotorError;
use crate::labeling::PercentileThresholds;
use crate::latent::LatentReducer;
use crate::model::{FittedClassifier, Variant};
use crate::preprocess::RobustScaler;
use crate::schema::FeatureSchema;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Version of the bundle manifest layout
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

pub const MANIFEST_FILE: &str = "bundle.json";
pub const SCALER_PATH: &str = "preprocess/pca_scaler_motor.json";
pub const REDUCER_PATH: &str = "preprocess/pca_pc1_motor.json";
pub const MODEL_A_PATH: &str = "models/modelA_motor_only.json";
pub const MODEL_B_PATH: &str = "models/modelB_motor_plus_context.json";
pub const REPORT_PATH: &str = "reports/training_report.json";
pub const LABELED_SESSIONS_PATH: &str = "reports/sessions_with_latent_and_labels.csv";

/// `kind` tags stored in each unit
pub const SCALER_KIND: &str = "robust_scaler";
pub const REDUCER_KIND: &str = "latent_reducer";
pub const CLASSIFIER_KIND: &str = "classifier";

const SUBDIRECTORIES: [&str; 3] = ["preprocess", "models", "reports"];

/// A persisted fitted object tagged with the run that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactUnit<T> {
    pub run_id: String,
    pub kind: String,
    pub payload: T,
}

/// Relative paths of every unit in a bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitPaths {
    pub scaler: String,
    pub reducer: String,
    pub model_a: String,
    pub model_b: String,
    pub report: String,
    pub labeled_sessions: String,
}

impl Default for UnitPaths {
    fn default() -> Self {
        Self {
            scaler: SCALER_PATH.to_string(),
            reducer: REDUCER_PATH.to_string(),
            model_a: MODEL_A_PATH.to_string(),
            model_b: MODEL_B_PATH.to_string(),
            report: REPORT_PATH.to_string(),
            labeled_sessions: LABELED_SESSIONS_PATH.to_string(),
        }
    }
}

/// Manifest tying one run's artifacts together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub format_version: u32,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub producer: Producer,
    pub schema: FeatureSchema,
    pub thresholds: PercentileThresholds,
    pub max_missing_motor_fraction: f64,
    /// Training medians, one per motor column in schema order
    pub motor_fill_values: Vec<f64>,
    pub units: UnitPaths,
}

/// Every unit needed to score a record, checked against the manifest
#[derive(Debug, Clone)]
pub struct ArtifactBundle {
    pub manifest: BundleManifest,
    pub scaler: RobustScaler,
    pub reducer: LatentReducer,
    pub classifier: FittedClassifier,
}

/// Reader/writer rooted at one output directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.path(MANIFEST_FILE)
    }

    /// Fail if this directory already holds a completed run
    pub fn ensure_vacant(&self) -> Result<(), MotorError> {
        let manifest = self.manifest_path();
        if manifest.exists() {
            return Err(MotorError::ArtifactExists(manifest.display().to_string()));
        }
        Ok(())
    }

    /// Refuse to write over a completed run, then create the layout
    pub fn prepare(&self) -> Result<(), MotorError> {
        self.ensure_vacant()?;
        for dir in SUBDIRECTORIES {
            fs::create_dir_all(self.root.join(dir))?;
        }
        Ok(())
    }

    /// Write bytes to `relative` through a sibling temp file and a rename
    pub fn write_atomic(&self, relative: &str, bytes: &[u8]) -> Result<(), MotorError> {
        let target = self.path(relative);
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| relative.to_string());
        let temp = target.with_file_name(format!(".{file_name}.tmp"));

        {
            let mut file = fs::File::create(&temp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &target)?;
        debug!(path = %target.display(), bytes = bytes.len(), "wrote artifact");
        Ok(())
    }

    pub fn write_unit<T: Serialize>(
        &self,
        relative: &str,
        run_id: &str,
        kind: &str,
        payload: &T,
    ) -> Result<(), MotorError> {
        let unit = ArtifactUnit {
            run_id: run_id.to_string(),
            kind: kind.to_string(),
            payload,
        };
        self.write_atomic(relative, serde_json::to_string_pretty(&unit)?.as_bytes())
    }

    pub fn write_report(&self, report: &TrainingReport) -> Result<(), MotorError> {
        self.write_atomic(REPORT_PATH, report.to_json()?.as_bytes())
    }

    pub fn write_manifest(&self, manifest: &BundleManifest) -> Result<(), MotorError> {
        self.write_atomic(
            MANIFEST_FILE,
            serde_json::to_string_pretty(manifest)?.as_bytes(),
        )
    }

    pub fn load_manifest(&self) -> Result<BundleManifest, MotorError> {
        let path = self.manifest_path();
        if !path.exists() {
            return Err(MotorError::ArtifactMismatch(format!(
                "no bundle manifest at {}",
                path.display()
            )));
        }
        let manifest: BundleManifest = serde_json::from_str(&fs::read_to_string(&path)?)?;
        if manifest.format_version != BUNDLE_FORMAT_VERSION {
            return Err(MotorError::ArtifactMismatch(format!(
                "bundle format version {} is not supported (expected {})",
                manifest.format_version, BUNDLE_FORMAT_VERSION
            )));
        }
        Ok(manifest)
    }

    /// Read one unit and check it belongs to `run_id`
    pub fn read_unit<T: DeserializeOwned>(
        &self,
        relative: &str,
        kind: &str,
        run_id: &str,
    ) -> Result<T, MotorError> {
        let path = self.path(relative);
        let text = fs::read_to_string(&path).map_err(|e| {
            MotorError::ArtifactMismatch(format!("cannot read {}: {}", path.display(), e))
        })?;
        let unit: ArtifactUnit<T> = serde_json::from_str(&text)?;
        if unit.kind != kind {
            return Err(MotorError::ArtifactMismatch(format!(
                "{relative} holds a {} artifact, expected {kind}",
                unit.kind
            )));
        }
        if unit.run_id != run_id {
            return Err(MotorError::ArtifactMismatch(format!(
                "{relative} belongs to run {}, manifest is run {run_id}",
                unit.run_id
            )));
        }
        Ok(unit.payload)
    }

    pub fn read_report(&self, relative: &str, run_id: &str) -> Result<TrainingReport, MotorError> {
        let report = TrainingReport::from_json(&fs::read_to_string(self.path(relative))?)?;
        if report.run_id != run_id {
            return Err(MotorError::ArtifactMismatch(format!(
                "{relative} belongs to run {}, manifest is run {run_id}",
                report.run_id
            )));
        }
        Ok(report)
    }

    /// Load the manifest and every scoring unit, all-or-nothing
    pub fn load_bundle(&self) -> Result<ArtifactBundle, MotorError> {
        let manifest = self.load_manifest()?;
        let run_id = manifest.run_id.as_str();
        let units = &manifest.units;

        let scaler: RobustScaler = self.read_unit(&units.scaler, SCALER_KIND, run_id)?;
        let reducer: LatentReducer = self.read_unit(&units.reducer, REDUCER_KIND, run_id)?;
        let classifier: FittedClassifier =
            self.read_unit(&units.model_a, CLASSIFIER_KIND, run_id)?;

        let motor = &manifest.schema.motor_numeric;
        check_columns("scaler", &scaler.columns, motor)?;
        check_columns("reducer", &reducer.columns, motor)?;
        check_columns("classifier", classifier.numeric_columns(), motor)?;
        if classifier.variant != Variant::MotorOnly {
            return Err(MotorError::ArtifactMismatch(format!(
                "{} is not a motor-only classifier",
                units.model_a
            )));
        }
        if manifest.motor_fill_values.len() != motor.len() {
            return Err(MotorError::ArtifactMismatch(format!(
                "manifest has {} fill values for {} motor columns",
                manifest.motor_fill_values.len(),
                motor.len()
            )));
        }

        debug!(run_id, motor_columns = motor.len(), "loaded artifact bundle");
        Ok(ArtifactBundle {
            manifest,
            scaler,
            reducer,
            classifier,
        })
    }

    /// Load the scoring bundle plus the diagnostic units and report
    pub fn verify(&self) -> Result<ArtifactBundle, MotorError> {
        let bundle = self.load_bundle()?;
        let run_id = bundle.manifest.run_id.as_str();
        let units = &bundle.manifest.units;

        let model_b: FittedClassifier = self.read_unit(&units.model_b, CLASSIFIER_KIND, run_id)?;
        if model_b.variant != Variant::MotorPlusContext {
            return Err(MotorError::ArtifactMismatch(format!(
                "{} is not a motor+context classifier",
                units.model_b
            )));
        }
        self.read_report(&units.report, run_id)?;

        let labeled = self.path(&units.labeled_sessions);
        if !labeled.exists() {
            return Err(MotorError::ArtifactMismatch(format!(
                "missing {}",
                labeled.display()
            )));
        }
        Ok(bundle)
    }
}

fn check_columns(unit: &str, found: &[String], expected: &[String]) -> Result<(), MotorError> {
    if found != expected {
        return Err(MotorError::ArtifactMismatch(format!(
            "{unit} columns differ from the manifest's motor columns ({} vs {})",
            found.len(),
            expected.len()
        )));
    }
    Ok(())
}
