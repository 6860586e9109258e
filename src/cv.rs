//! Participant-grouped cross-validation
//!
//! Every participant's sessions land in exactly one held-out fold, so a model
//! is never evaluated on a person it has already seen.

use crate::error::MotorError;
use crate::model::metrics::{
    balanced_accuracy, classification_report, confusion_matrix, macro_f1, observed_labels,
    per_class, ClassMetrics,
};
use crate::model::{ClassifierSpec, FeatureFrame};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Digits shown in the text classification report
pub const REPORT_DIGITS: usize = 3;

/// Train/test row indices of one fold
#[derive(Debug, Clone, PartialEq)]
pub struct Fold {
    /// 1-based fold number
    pub number: usize,
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Group-aware K-fold splitter
#[derive(Debug, Clone, Copy)]
pub struct GroupKFold {
    n_splits: usize,
}

impl GroupKFold {
    pub fn new(n_splits: usize) -> Result<Self, MotorError> {
        if n_splits < 2 {
            return Err(MotorError::Config(format!(
                "folds must be at least 2, got {n_splits}"
            )));
        }
        Ok(Self { n_splits })
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Assign groups to folds and return the per-fold row indices.
    ///
    /// Groups are taken in sorted order, shuffled with `rng`, then stably
    /// ordered by descending size; each goes to the currently lightest fold,
    /// lowest fold index first on ties.
    pub fn split(&self, groups: &[String], rng: &mut StdRng) -> Result<Vec<Fold>, MotorError> {
        let mut sizes: BTreeMap<&str, usize> = BTreeMap::new();
        for group in groups {
            *sizes.entry(group.as_str()).or_default() += 1;
        }
        if sizes.len() < self.n_splits {
            return Err(MotorError::InsufficientGroups {
                groups: sizes.len(),
                folds: self.n_splits,
            });
        }

        let mut ordered: Vec<(&str, usize)> = sizes.into_iter().collect();
        ordered.shuffle(rng);
        ordered.sort_by(|a, b| b.1.cmp(&a.1));

        let mut load = vec![0usize; self.n_splits];
        let mut fold_of: BTreeMap<&str, usize> = BTreeMap::new();
        for (group, size) in ordered {
            let mut lightest = 0;
            for (fold, weight) in load.iter().enumerate() {
                if *weight < load[lightest] {
                    lightest = fold;
                }
            }
            load[lightest] += size;
            fold_of.insert(group, lightest);
        }

        let folds = (0..self.n_splits)
            .map(|fold| {
                let (test, train): (Vec<usize>, Vec<usize>) = (0..groups.len())
                    .partition(|&row| fold_of.get(groups[row].as_str()) == Some(&fold));
                Fold {
                    number: fold + 1,
                    train,
                    test,
                }
            })
            .collect();
        Ok(folds)
    }
}

/// Held-out metrics of one fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldMetrics {
    pub fold: usize,
    pub macro_f1: f64,
    pub balanced_acc: f64,
}

/// Metrics over all pooled held-out predictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallMetrics {
    pub macro_f1: f64,
    pub balanced_acc: f64,
    /// Sorted union of observed true and predicted classes
    pub labels: Vec<usize>,
    pub confusion_matrix: Vec<Vec<usize>>,
    pub per_class: Vec<ClassMetrics>,
    pub classification_report: String,
}

impl OverallMetrics {
    pub fn from_predictions(y_true: &[usize], y_pred: &[usize]) -> Self {
        let labels = observed_labels(y_true, y_pred);
        Self {
            macro_f1: macro_f1(y_true, y_pred),
            balanced_acc: balanced_accuracy(y_true, y_pred),
            confusion_matrix: confusion_matrix(y_true, y_pred, &labels),
            labels,
            per_class: per_class(y_true, y_pred),
            classification_report: classification_report(y_true, y_pred, REPORT_DIGITS),
        }
    }
}

/// Cross-validation outcome of one classifier spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvResult {
    pub cv_folds: Vec<FoldMetrics>,
    pub overall: OverallMetrics,
}

/// Fit a fresh model per fold and score its held-out rows.
///
/// Folds run in parallel; results are pooled in fold order.
pub fn cross_validate(
    spec: &ClassifierSpec,
    frame: &FeatureFrame,
    labels: &[usize],
    folds: &[Fold],
) -> Result<CvResult, MotorError> {
    if labels.len() != frame.n_rows() {
        return Err(MotorError::ArtifactMismatch(format!(
            "{} labels for {} rows",
            labels.len(),
            frame.n_rows()
        )));
    }

    let per_fold: Vec<(FoldMetrics, Vec<usize>, Vec<usize>)> = folds
        .par_iter()
        .map(|fold| {
            let train_frame = frame.select_rows(&fold.train);
            let train_labels: Vec<usize> = fold.train.iter().map(|&r| labels[r]).collect();
            let model = spec.fit(&train_frame, &train_labels)?;

            let test_frame = frame.select_rows(&fold.test);
            let y_true: Vec<usize> = fold.test.iter().map(|&r| labels[r]).collect();
            let y_pred = model.predict(&test_frame)?;

            let metrics = FoldMetrics {
                fold: fold.number,
                macro_f1: macro_f1(&y_true, &y_pred),
                balanced_acc: balanced_accuracy(&y_true, &y_pred),
            };
            debug!(
                variant = spec.variant.key(),
                fold = fold.number,
                train = fold.train.len(),
                test = fold.test.len(),
                macro_f1 = metrics.macro_f1,
                "evaluated fold"
            );
            Ok((metrics, y_true, y_pred))
        })
        .collect::<Result<Vec<_>, MotorError>>()?;

    let mut all_true = Vec::new();
    let mut all_pred = Vec::new();
    let mut cv_folds = Vec::with_capacity(per_fold.len());
    for (metrics, y_true, y_pred) in per_fold {
        cv_folds.push(metrics);
        all_true.extend(y_true);
        all_pred.extend(y_pred);
    }

    Ok(CvResult {
        cv_folds,
        overall: OverallMetrics::from_predictions(&all_true, &all_pred),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoosterParams;
    use crate::model::Variant;
    use ndarray::Array2;
    use rand::SeedableRng;
    use std::collections::HashSet;

    /// Participant `P_i` owns `1 + i % 3` sessions
    fn make_groups(participants: usize) -> Vec<String> {
        let mut groups = Vec::new();
        for i in 0..participants {
            for _ in 0..(1 + i % 3) {
                groups.push(format!("P_{i:03}"));
            }
        }
        groups
    }

    #[test]
    fn test_groups_never_cross_folds() {
        let groups = make_groups(20);
        let folds = GroupKFold::new(5)
            .unwrap()
            .split(&groups, &mut StdRng::seed_from_u64(42))
            .unwrap();

        let mut seen = HashSet::new();
        let mut rows = 0;
        for fold in &folds {
            let members: HashSet<&str> = fold.test.iter().map(|&r| groups[r].as_str()).collect();
            for member in &members {
                assert!(seen.insert(member.to_string()), "{member} in two folds");
            }
            for &r in &fold.train {
                assert!(!members.contains(groups[r].as_str()));
            }
            assert_eq!(fold.train.len() + fold.test.len(), groups.len());
            rows += fold.test.len();
        }
        assert_eq!(rows, groups.len());
        assert_eq!(seen.len(), 20);
    }

    #[test]
    fn test_folds_are_balanced() {
        let groups = make_groups(20);
        let folds = GroupKFold::new(5)
            .unwrap()
            .split(&groups, &mut StdRng::seed_from_u64(3))
            .unwrap();
        let sizes: Vec<usize> = folds.iter().map(|f| f.test.len()).collect();
        let max = *sizes.iter().max().unwrap();
        let min = *sizes.iter().min().unwrap();
        assert!(max - min <= 3, "unbalanced folds {sizes:?}");
    }

    #[test]
    fn test_split_is_deterministic_for_seed() {
        let groups = make_groups(15);
        let splitter = GroupKFold::new(3).unwrap();
        let a = splitter.split(&groups, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = splitter.split(&groups, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_insufficient_groups() {
        let groups = make_groups(4);
        let err = GroupKFold::new(5)
            .unwrap()
            .split(&groups, &mut StdRng::seed_from_u64(42))
            .unwrap_err();
        assert!(matches!(
            err,
            MotorError::InsufficientGroups {
                groups: 4,
                folds: 5
            }
        ));
    }

    #[test]
    fn test_single_fold_is_config_error() {
        assert!(matches!(GroupKFold::new(1), Err(MotorError::Config(_))));
    }

    #[test]
    fn test_cross_validate_pools_every_row() {
        let groups = make_groups(12);
        let n = groups.len();
        let labels: Vec<usize> = (0..n).map(|i| i % 4).collect();
        let values: Vec<f64> = labels
            .iter()
            .enumerate()
            .flat_map(|(i, l)| [*l as f64 * 3.0 + (i % 2) as f64 * 0.1, (i % 5) as f64])
            .collect();
        let frame = FeatureFrame {
            numeric_columns: vec!["r1_x".to_string(), "r1_y".to_string()],
            numeric: Array2::from_shape_vec((n, 2), values).unwrap(),
            categorical_columns: Vec::new(),
            categorical: Vec::new(),
        };
        let spec = ClassifierSpec::new(
            Variant::MotorOnly,
            BoosterParams {
                n_estimators: 10,
                ..BoosterParams::default()
            },
            42,
        );
        let folds = GroupKFold::new(3)
            .unwrap()
            .split(&groups, &mut StdRng::seed_from_u64(42))
            .unwrap();

        let result = cross_validate(&spec, &frame, &labels, &folds).unwrap();
        assert_eq!(result.cv_folds.len(), 3);
        assert_eq!(
            result.cv_folds.iter().map(|f| f.fold).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        let pooled: usize = result.overall.confusion_matrix.iter().flatten().sum();
        assert_eq!(pooled, n);
        assert!(result.overall.macro_f1 > 0.4);
    }
}
