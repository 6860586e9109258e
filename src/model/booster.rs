//! Gradient-boosted multiclass trees
//!
//! Second-order boosting with a softmax objective. Each round fits one
//! regression tree per class on the gradient/hessian of the multiclass log
//! loss. Trees grow level by level with exact greedy split finding over
//! per-feature presorted row orders.
//!
//! Every random draw (row subsample per round, column subsample per tree)
//! comes from one [`StdRng`] seeded at fit time, and the parallel split search
//! is reduced in feature order, so a fit depends only on data, params and seed.

use crate::config::BoosterParams;
use crate::error::MotorError;
use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Floor applied to per-row hessians
const MIN_HESSIAN: f64 = 1e-16;

/// Splits gaining less than this are not taken
const MIN_SPLIT_GAIN: f64 = 1e-6;

/// One node of a regression tree, addressed by index into [`Tree::nodes`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    /// Rows with `x[feature] < threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf { value: f64 },
}

/// Regression tree; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    /// Leaf value reached by `row`
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes.get(index) {
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = row.get(*feature).copied().unwrap_or(f64::NAN);
                    index = if value < *threshold { *left } else { *right };
                }
                Some(TreeNode::Leaf { value }) => return *value,
                None => return 0.0,
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], index: usize) -> usize {
            match nodes.get(index) {
                Some(TreeNode::Split { left, right, .. }) => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

/// Fitted booster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    pub params: BoosterParams,
    pub seed: u64,
    pub n_features: usize,
    /// One tree per class per round: `rounds[round][class]`
    pub rounds: Vec<Vec<Tree>>,
}

/// Best split found for one frontier node
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    gain: f64,
    feature: usize,
    threshold: f64,
}

/// Running left-side sums while scanning one feature
#[derive(Clone, Copy)]
struct ScanState {
    grad_left: f64,
    hess_left: f64,
    last_value: Option<f64>,
    best: Option<SplitCandidate>,
}

struct NodeStats {
    grad: f64,
    hess: f64,
}

impl GradientBoostedTrees {
    /// Fit on a rows x features matrix with class labels in `0..num_class`
    pub fn fit(
        x: ArrayView2<f64>,
        y: &[usize],
        params: &BoosterParams,
        seed: u64,
    ) -> Result<Self, MotorError> {
        let (n, d) = x.dim();
        if n == 0 || d == 0 {
            return Err(MotorError::EmptyDataset(
                "cannot fit a booster on an empty matrix".to_string(),
            ));
        }
        if y.len() != n {
            return Err(MotorError::ArtifactMismatch(format!(
                "booster got {} labels for {} rows",
                y.len(),
                n
            )));
        }
        let k = params.num_class;
        if let Some(bad) = y.iter().find(|&&label| label >= k) {
            return Err(MotorError::Config(format!(
                "label {bad} outside 0..{k}"
            )));
        }

        let presorted = presort(x);
        let n_sampled_features = ((params.colsample_bytree * d as f64).round() as usize).clamp(1, d);

        let mut rng = StdRng::seed_from_u64(seed);
        let mut margins = Array2::<f64>::zeros((n, k));
        let mut rounds = Vec::with_capacity(params.n_estimators);

        for round in 0..params.n_estimators {
            let probabilities = softmax_rows(&margins);

            let mut in_sample: Vec<bool> = if params.subsample < 1.0 {
                (0..n).map(|_| rng.gen::<f64>() < params.subsample).collect()
            } else {
                vec![true; n]
            };
            if !in_sample.iter().any(|&s| s) {
                in_sample = vec![true; n];
            }

            let mut trees = Vec::with_capacity(k);
            for class in 0..k {
                let mut grad = vec![0.0; n];
                let mut hess = vec![0.0; n];
                for i in 0..n {
                    let p = probabilities[[i, class]];
                    let target = if y[i] == class { 1.0 } else { 0.0 };
                    grad[i] = p - target;
                    hess[i] = (2.0 * p * (1.0 - p)).max(MIN_HESSIAN);
                }

                let mut features = sample(&mut rng, d, n_sampled_features).into_vec();
                features.sort_unstable();

                let tree = grow_tree(
                    x,
                    &presorted,
                    &features,
                    &grad,
                    &hess,
                    &in_sample,
                    params,
                );
                trees.push(tree);
            }

            for (class, tree) in trees.iter().enumerate() {
                for (i, row) in x.rows().into_iter().enumerate() {
                    let values = row.to_vec();
                    margins[[i, class]] += tree.predict(&values);
                }
            }
            if round % 100 == 0 {
                let depth = trees.iter().map(Tree::depth).max().unwrap_or(0);
                debug!(round, depth, "boosting round");
            }
            rounds.push(trees);
        }

        Ok(Self {
            params: params.clone(),
            seed,
            n_features: d,
            rounds,
        })
    }

    pub fn num_class(&self) -> usize {
        self.params.num_class
    }

    /// Raw per-class margins for one row
    pub fn predict_margin(&self, row: &[f64]) -> Result<Vec<f64>, MotorError> {
        if row.len() != self.n_features {
            return Err(MotorError::ArtifactMismatch(format!(
                "booster expects {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        let mut margins = vec![0.0; self.num_class()];
        for trees in &self.rounds {
            for (class, tree) in trees.iter().enumerate() {
                margins[class] += tree.predict(row);
            }
        }
        Ok(margins)
    }

    /// Class probabilities for one row
    pub fn predict_proba_row(&self, row: &[f64]) -> Result<Vec<f64>, MotorError> {
        Ok(softmax(&self.predict_margin(row)?))
    }

    /// Class probabilities for every row
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, MotorError> {
        let mut out = Array2::zeros((x.nrows(), self.num_class()));
        for (i, row) in x.rows().into_iter().enumerate() {
            let probabilities = self.predict_proba_row(&row.to_vec())?;
            for (class, p) in probabilities.into_iter().enumerate() {
                out[[i, class]] = p;
            }
        }
        Ok(out)
    }
}

/// Index of the largest value; the first one wins ties
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

pub fn softmax(margins: &[f64]) -> Vec<f64> {
    let max = margins.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = margins.iter().map(|m| (m - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

fn softmax_rows(margins: &Array2<f64>) -> Array2<f64> {
    let mut out = margins.clone();
    for mut row in out.rows_mut() {
        let probabilities = softmax(&row.to_vec());
        for (slot, p) in row.iter_mut().zip(probabilities) {
            *slot = p;
        }
    }
    out
}

/// Row indices of every feature sorted by value (stable)
fn presort(x: ArrayView2<f64>) -> Vec<Vec<usize>> {
    (0..x.ncols())
        .map(|feature| {
            let column = x.column(feature);
            let mut order: Vec<usize> = (0..x.nrows()).collect();
            order.sort_by(|&a, &b| column[a].total_cmp(&column[b]));
            order
        })
        .collect()
}

fn leaf_weight(stats: &NodeStats, params: &BoosterParams) -> f64 {
    -stats.grad / (stats.hess + params.reg_lambda) * params.learning_rate
}

fn score(grad: f64, hess: f64, lambda: f64) -> f64 {
    grad * grad / (hess + lambda)
}

/// Grow one tree level by level
fn grow_tree(
    x: ArrayView2<f64>,
    presorted: &[Vec<usize>],
    features: &[usize],
    grad: &[f64],
    hess: &[f64],
    in_sample: &[bool],
    params: &BoosterParams,
) -> Tree {
    let n = x.nrows();

    // Node each sampled row currently sits in
    let mut position: Vec<Option<usize>> = in_sample
        .iter()
        .map(|&s| if s { Some(0) } else { None })
        .collect();

    let mut nodes = vec![TreeNode::Leaf { value: 0.0 }];
    let mut stats = vec![node_stats(&position, 0, grad, hess)];
    let mut frontier = vec![0usize];

    for _ in 0..params.max_depth {
        if frontier.is_empty() {
            break;
        }

        // Map node id to its slot in the frontier
        let mut slot_of = vec![None; nodes.len()];
        for (slot, node) in frontier.iter().enumerate() {
            slot_of[*node] = Some(slot);
        }

        let per_feature: Vec<Vec<Option<SplitCandidate>>> = features
            .par_iter()
            .map(|&feature| {
                scan_feature(
                    x,
                    &presorted[feature],
                    feature,
                    &position,
                    &slot_of,
                    &frontier,
                    &stats,
                    grad,
                    hess,
                    params,
                )
            })
            .collect();

        let mut best: Vec<Option<SplitCandidate>> = vec![None; frontier.len()];
        for candidates in &per_feature {
            for (slot, candidate) in candidates.iter().enumerate() {
                if let Some(c) = candidate {
                    let better = match best[slot] {
                        Some(current) => c.gain > current.gain,
                        None => true,
                    };
                    if better {
                        best[slot] = Some(*c);
                    }
                }
            }
        }

        let mut next_frontier = Vec::new();
        let mut children_of = vec![None; nodes.len()];
        for (slot, node) in frontier.iter().enumerate() {
            let Some(split) = best[slot] else {
                continue;
            };
            let left = nodes.len();
            let right = left + 1;
            nodes.push(TreeNode::Leaf { value: 0.0 });
            nodes.push(TreeNode::Leaf { value: 0.0 });
            nodes[*node] = TreeNode::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };
            children_of[*node] = Some((split.feature, split.threshold, left, right));
            next_frontier.push(left);
            next_frontier.push(right);
        }

        for i in 0..n {
            if let Some(node) = position[i] {
                if let Some((feature, threshold, left, right)) = children_of[node] {
                    position[i] = Some(if x[[i, feature]] < threshold { left } else { right });
                }
            }
        }

        stats.resize_with(nodes.len(), || NodeStats { grad: 0.0, hess: 0.0 });
        for &child in &next_frontier {
            stats[child] = node_stats(&position, child, grad, hess);
        }
        frontier = next_frontier;
    }

    for (index, node) in nodes.iter_mut().enumerate() {
        if let TreeNode::Leaf { value } = node {
            *value = leaf_weight(&stats[index], params);
        }
    }
    Tree { nodes }
}

fn node_stats(position: &[Option<usize>], node: usize, grad: &[f64], hess: &[f64]) -> NodeStats {
    let mut stats = NodeStats { grad: 0.0, hess: 0.0 };
    for (i, p) in position.iter().enumerate() {
        if *p == Some(node) {
            stats.grad += grad[i];
            stats.hess += hess[i];
        }
    }
    stats
}

/// Best split of every frontier node on one feature
#[allow(clippy::too_many_arguments)]
fn scan_feature(
    x: ArrayView2<f64>,
    order: &[usize],
    feature: usize,
    position: &[Option<usize>],
    slot_of: &[Option<usize>],
    frontier: &[usize],
    stats: &[NodeStats],
    grad: &[f64],
    hess: &[f64],
    params: &BoosterParams,
) -> Vec<Option<SplitCandidate>> {
    let lambda = params.reg_lambda;
    let mut states = vec![
        ScanState {
            grad_left: 0.0,
            hess_left: 0.0,
            last_value: None,
            best: None,
        };
        frontier.len()
    ];

    for &row in order {
        let Some(node) = position[row] else {
            continue;
        };
        let Some(slot) = slot_of.get(node).copied().flatten() else {
            continue;
        };
        let value = x[[row, feature]];
        let total = &stats[frontier[slot]];
        let state = &mut states[slot];

        if let Some(last) = state.last_value {
            if value > last {
                let grad_right = total.grad - state.grad_left;
                let hess_right = total.hess - state.hess_left;
                if state.hess_left >= params.min_child_weight
                    && hess_right >= params.min_child_weight
                {
                    let gain = 0.5
                        * (score(state.grad_left, state.hess_left, lambda)
                            + score(grad_right, hess_right, lambda)
                            - score(total.grad, total.hess, lambda));
                    let improves = match state.best {
                        Some(best) => gain > best.gain,
                        None => gain > MIN_SPLIT_GAIN,
                    };
                    if improves {
                        let mut threshold = last + (value - last) / 2.0;
                        if threshold <= last {
                            threshold = value;
                        }
                        state.best = Some(SplitCandidate {
                            gain,
                            feature,
                            threshold,
                        });
                    }
                }
            }
        }

        state.grad_left += grad[row];
        state.hess_left += hess[row];
        state.last_value = Some(value);
    }

    states.into_iter().map(|s| s.best).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn small_params(rounds: usize) -> BoosterParams {
        BoosterParams {
            n_estimators: rounds,
            ..BoosterParams::default()
        }
    }

    /// Four well-separated clusters along the first feature, noise in the second
    fn make_clusters() -> (Array2<f64>, Vec<usize>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for class in 0..4 {
            for i in 0..15 {
                rows.push(class as f64 * 10.0 + (i % 5) as f64 * 0.3);
                rows.push(((i * 7 + class * 3) % 11) as f64);
                labels.push(class);
            }
        }
        (Array2::from_shape_vec((60, 2), rows).unwrap(), labels)
    }

    #[test]
    fn test_learns_separable_classes() {
        let (x, y) = make_clusters();
        let model = GradientBoostedTrees::fit(x.view(), &y, &small_params(30), 42).unwrap();
        let probabilities = model.predict_proba(x.view()).unwrap();

        let mut correct = 0;
        for (i, label) in y.iter().enumerate() {
            let row = probabilities.row(i).to_vec();
            if argmax(&row) == *label {
                correct += 1;
            }
        }
        assert_eq!(correct, y.len());
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = make_clusters();
        let model = GradientBoostedTrees::fit(x.view(), &y, &small_params(10), 7).unwrap();
        for row in model.predict_proba(x.view()).unwrap().rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
            assert!(row.iter().all(|p| *p > 0.0));
        }
    }

    #[test]
    fn test_same_seed_same_model() {
        let (x, y) = make_clusters();
        let a = GradientBoostedTrees::fit(x.view(), &y, &small_params(15), 42).unwrap();
        let b = GradientBoostedTrees::fit(x.view(), &y, &small_params(15), 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_depth_is_bounded() {
        let (x, y) = make_clusters();
        let params = BoosterParams {
            n_estimators: 5,
            max_depth: 2,
            ..BoosterParams::default()
        };
        let model = GradientBoostedTrees::fit(x.view(), &y, &params, 1).unwrap();
        for trees in &model.rounds {
            assert_eq!(trees.len(), 4);
            for tree in trees {
                assert!(tree.depth() <= 2);
            }
        }
    }

    #[test]
    fn test_rejects_out_of_range_label() {
        let (x, mut y) = make_clusters();
        y[0] = 9;
        let err = GradientBoostedTrees::fit(x.view(), &y, &small_params(2), 42).unwrap_err();
        assert!(err.to_string().contains("label 9"));
    }

    #[test]
    fn test_wrong_width_is_rejected() {
        let (x, y) = make_clusters();
        let model = GradientBoostedTrees::fit(x.view(), &y, &small_params(2), 42).unwrap();
        assert!(model.predict_proba_row(&[1.0]).is_err());
    }

    #[test]
    fn test_tree_routing() {
        let tree = Tree {
            nodes: vec![
                TreeNode::Split {
                    feature: 0,
                    threshold: 0.5,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { value: -1.0 },
                TreeNode::Leaf { value: 1.0 },
            ],
        };
        assert_eq!(tree.predict(&[0.4]), -1.0);
        assert_eq!(tree.predict(&[0.5]), 1.0);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_argmax_prefers_first_on_ties() {
        assert_eq!(argmax(&[0.25, 0.25, 0.25, 0.25]), 0);
        assert_eq!(argmax(&[0.1, 0.4, 0.4, 0.1]), 1);
    }
}
