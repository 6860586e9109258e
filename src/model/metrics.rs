//! Classification metrics
//!
//! Labels are always the sorted union of classes seen in the true and the
//! predicted vectors. A class with no predictions has zero precision and a
//! class with no support has zero recall; neither is an error.

use serde::{Deserialize, Serialize};

/// Width reserved for row names in the text report
const NAME_WIDTH: usize = 12;

/// Precision, recall and F1 of one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Sorted union of the classes present in either vector
pub fn observed_labels(y_true: &[usize], y_pred: &[usize]) -> Vec<usize> {
    let mut labels: Vec<usize> = y_true.iter().chain(y_pred).copied().collect();
    labels.sort_unstable();
    labels.dedup();
    labels
}

/// Rows are true classes, columns predicted classes, both in `labels` order
pub fn confusion_matrix(y_true: &[usize], y_pred: &[usize], labels: &[usize]) -> Vec<Vec<usize>> {
    let mut matrix = vec![vec![0; labels.len()]; labels.len()];
    for (t, p) in y_true.iter().zip(y_pred) {
        if let (Ok(i), Ok(j)) = (labels.binary_search(t), labels.binary_search(p)) {
            matrix[i][j] += 1;
        }
    }
    matrix
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Per-class metrics over the observed labels
pub fn per_class(y_true: &[usize], y_pred: &[usize]) -> Vec<ClassMetrics> {
    let labels = observed_labels(y_true, y_pred);
    let matrix = confusion_matrix(y_true, y_pred, &labels);

    labels
        .iter()
        .enumerate()
        .map(|(i, &label)| {
            let true_positive = matrix[i][i];
            let predicted: usize = matrix.iter().map(|row| row[i]).sum();
            let support: usize = matrix[i].iter().sum();

            let precision = ratio(true_positive, predicted);
            let recall = ratio(true_positive, support);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            ClassMetrics {
                label,
                precision,
                recall,
                f1,
                support,
            }
        })
        .collect()
}

/// Unweighted mean of per-class F1
pub fn macro_f1(y_true: &[usize], y_pred: &[usize]) -> f64 {
    let classes = per_class(y_true, y_pred);
    if classes.is_empty() {
        return 0.0;
    }
    classes.iter().map(|c| c.f1).sum::<f64>() / classes.len() as f64
}

/// Mean recall over classes present in `y_true`
pub fn balanced_accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    let supported: Vec<f64> = per_class(y_true, y_pred)
        .into_iter()
        .filter(|c| c.support > 0)
        .map(|c| c.recall)
        .collect();
    if supported.is_empty() {
        return 0.0;
    }
    supported.iter().sum::<f64>() / supported.len() as f64
}

pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    ratio(correct, y_true.len())
}

/// Plain-text report with one row per class plus accuracy, macro and
/// support-weighted averages
pub fn classification_report(y_true: &[usize], y_pred: &[usize], digits: usize) -> String {
    let classes = per_class(y_true, y_pred);
    let total: usize = classes.iter().map(|c| c.support).sum();
    let w = NAME_WIDTH;

    let mut report = format!(
        "{:>w$}  {:>9} {:>9} {:>9} {:>9}\n\n",
        "", "precision", "recall", "f1-score", "support"
    );
    let row = |name: &str, p: f64, r: f64, f: f64, s: usize| {
        format!("{name:>w$}  {p:>9.digits$} {r:>9.digits$} {f:>9.digits$} {s:>9}\n")
    };

    for c in &classes {
        report.push_str(&row(&c.label.to_string(), c.precision, c.recall, c.f1, c.support));
    }
    report.push('\n');

    let acc = accuracy(y_true, y_pred);
    report.push_str(&format!(
        "{:>w$}  {:>9} {:>9} {acc:>9.digits$} {total:>9}\n",
        "accuracy", "", ""
    ));

    let n = classes.len().max(1) as f64;
    let mean = |f: fn(&ClassMetrics) -> f64| classes.iter().map(f).sum::<f64>() / n;
    report.push_str(&row(
        "macro avg",
        mean(|c| c.precision),
        mean(|c| c.recall),
        mean(|c| c.f1),
        total,
    ));

    let weight = total.max(1) as f64;
    let weighted =
        |f: fn(&ClassMetrics) -> f64| classes.iter().map(|c| f(c) * c.support as f64).sum::<f64>() / weight;
    report.push_str(&row(
        "weighted avg",
        weighted(|c| c.precision),
        weighted(|c| c.recall),
        weighted(|c| c.f1),
        total,
    ));
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_perfect_predictions() {
        let y = vec![0, 1, 2, 3, 3, 2];
        assert!((macro_f1(&y, &y) - 1.0).abs() < 1e-12);
        assert!((balanced_accuracy(&y, &y) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unpredicted_class_counts_as_zero() {
        let y_true = vec![0, 0, 1, 1];
        let y_pred = vec![0, 0, 0, 0];
        let classes = per_class(&y_true, &y_pred);

        assert_eq!(classes[1].precision, 0.0);
        assert_eq!(classes[1].f1, 0.0);
        // class 0: precision 0.5, recall 1.0
        assert!((classes[0].f1 - 2.0 / 3.0).abs() < 1e-12);
        assert!((macro_f1(&y_true, &y_pred) - 1.0 / 3.0).abs() < 1e-12);
        assert!((balanced_accuracy(&y_true, &y_pred) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_predicted_only_class_is_in_labels() {
        let y_true = vec![0, 0, 1];
        let y_pred = vec![0, 2, 1];
        assert_eq!(observed_labels(&y_true, &y_pred), vec![0, 1, 2]);

        // class 2 has no support so it does not enter balanced accuracy
        assert!((balanced_accuracy(&y_true, &y_pred) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_confusion_matrix_layout() {
        let y_true = vec![0, 1, 1, 3];
        let y_pred = vec![0, 1, 3, 3];
        let labels = observed_labels(&y_true, &y_pred);
        assert_eq!(labels, vec![0, 1, 3]);
        assert_eq!(
            confusion_matrix(&y_true, &y_pred, &labels),
            vec![vec![1, 0, 0], vec![0, 1, 1], vec![0, 0, 1]]
        );
    }

    #[test]
    fn test_report_rows() {
        let y_true = vec![0, 0, 1, 1];
        let y_pred = vec![0, 1, 1, 1];
        let report = classification_report(&y_true, &y_pred, 3);
        let lines: Vec<&str> = report.lines().collect();

        assert!(lines[0].contains("precision"));
        assert!(lines[2].trim_start().starts_with("0"));
        assert!(lines[2].contains("1.000"));
        assert!(report.contains("accuracy"));
        assert!(report.contains("0.750"));
        assert!(report.contains("macro avg"));
        assert!(report.contains("weighted avg"));
    }
}
