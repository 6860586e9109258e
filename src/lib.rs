//! Aura Motor - Latent motor-ability scoring for pointing-task sessions
//!
//! Aura Motor turns a per-session table of pointer metrics into a single
//! latent motor score and a four-level difficulty label through a
//! deterministic pipeline: role inference → missing-data policy → robust
//! scaling → first principal component → percentile banding →
//! participant-grouped cross-validated classification.
//!
//! ## Modules
//!
//! - **Training**: [`MotorTrainer`] fits the latent axis and both classifiers
//!   and writes a versioned artifact bundle
//! - **Scoring**: [`ScoringService`] replays one session through a bundle
//! - **Synthetic data**: [`synthetic`] generates realistic session tables

pub mod artifacts;
pub mod cleaning;
pub mod config;
pub mod cv;
pub mod error;
pub mod labeling;
pub mod latent;
pub mod model;
pub mod pipeline;
pub mod preprocess;
pub mod schema;
pub mod scoring;
pub mod stats;
pub mod synthetic;
pub mod types;

pub use artifacts::{ArtifactBundle, ArtifactStore, BundleManifest, TrainingReport};
pub use config::{BoosterParams, TrainingConfig};
pub use error::MotorError;
pub use pipeline::{train, MotorTrainer, TrainingOutcome};
pub use schema::{FeatureSchema, SessionTable};
pub use scoring::{RowSelector, ScoringService};
pub use types::{MotorLevel, MotorProfile, ScoringOutput};

/// Version embedded in every artifact and report
pub const MOTOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name recorded in artifacts
pub const PRODUCER_NAME: &str = "aura-motor";
