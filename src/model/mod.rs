//! Difficulty classifiers
//!
//! Pipeline per variant: feature frame → RobustScaler (+ OneHotEncoder) → GradientBoostedTrees

pub mod booster;
pub mod metrics;
pub mod pipeline;

pub use booster::{argmax, GradientBoostedTrees, Tree, TreeNode};
pub use metrics::ClassMetrics;
pub use pipeline::{ClassifierSpec, FeatureFrame, FittedClassifier, Variant};
