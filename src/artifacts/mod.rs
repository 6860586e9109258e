//! Persisted training artifacts
//!
//! Each fitted object is its own JSON unit tagged with the run id; a manifest
//! ties one run's units together and is the only entry point for loading.

pub mod report;
pub mod store;

pub use report::{Producer, TrainingReport};
pub use store::{
    ArtifactBundle, ArtifactStore, ArtifactUnit, BundleManifest, UnitPaths,
    BUNDLE_FORMAT_VERSION, LABELED_SESSIONS_PATH, MANIFEST_FILE, MODEL_A_PATH, MODEL_B_PATH,
    REDUCER_PATH, REPORT_PATH, SCALER_PATH,
};
