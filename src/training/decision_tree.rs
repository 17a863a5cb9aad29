//! CART decision tree

use crate::error::{DataFlowError, Result};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const MIN_IMPURITY_DECREASE: f64 = 1e-12;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
        /// Training-sample share per class, aligned with the tree's class
        /// list. Empty for regression leaves.
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Binary decision tree for classification (Gini) or regression
/// (variance reduction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<Node>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    is_classification: bool,
    /// When set, splits only consider these feature indices (used by the
    /// forest for per-tree feature subsampling).
    feature_subset: Option<Vec<usize>>,
    n_features: usize,
    classes: Vec<f64>,
}

impl DecisionTree {
    pub fn new_classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            is_classification: true,
            feature_subset: None,
            n_features: 0,
            classes: Vec::new(),
        }
    }

    pub fn new_regressor() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            is_classification: false,
            feature_subset: None,
            n_features: 0,
            classes: Vec::new(),
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub(crate) fn with_feature_subset(mut self, features: Vec<usize>) -> Self {
        self.feature_subset = Some(features);
        self
    }

    pub fn is_classifier(&self) -> bool {
        self.is_classification
    }

    /// Distinct class values seen during fit, ascending. Empty for
    /// regression trees.
    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(DataFlowError::ShapeError {
                expected: format!("{} target values", x.nrows()),
                actual: format!("{}", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(DataFlowError::DataError(
                "cannot fit a tree on zero samples".to_string(),
            ));
        }

        self.n_features = x.ncols();
        if self.is_classification {
            let mut classes: Vec<f64> = y.iter().copied().collect();
            classes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            classes.dedup();
            self.classes = classes;
        }

        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.root = Some(self.build(x, y, &indices, 0));
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(DataFlowError::NotFitted)?;
        if x.ncols() != self.n_features {
            return Err(DataFlowError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{}", x.ncols()),
            });
        }

        let predictions: Vec<f64> = (0..x.nrows())
            .map(|i| {
                let mut node = root;
                loop {
                    match node {
                        Node::Leaf { value, .. } => return *value,
                        Node::Split {
                            feature,
                            threshold,
                            left,
                            right,
                        } => {
                            node = if x[[i, *feature]] <= *threshold {
                                left
                            } else {
                                right
                            };
                        }
                    }
                }
            })
            .collect();
        Ok(Array1::from_vec(predictions))
    }

    /// Per-class probabilities from the reached leaf's training-sample
    /// shares, columns in [`classes`](Self::classes) order.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let root = self.root.as_ref().ok_or(DataFlowError::NotFitted)?;
        if !self.is_classification {
            return Err(DataFlowError::DataError(
                "probabilities are only defined for classification trees".to_string(),
            ));
        }
        if x.ncols() != self.n_features {
            return Err(DataFlowError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{}", x.ncols()),
            });
        }

        let mut proba = Array2::zeros((x.nrows(), self.classes.len()));
        for i in 0..x.nrows() {
            let mut node = root;
            loop {
                match node {
                    Node::Leaf {
                        value,
                        distribution,
                    } => {
                        if distribution.len() == self.classes.len() {
                            for (j, p) in distribution.iter().enumerate() {
                                proba[[i, j]] = *p;
                            }
                        } else if let Some(j) = self
                            .classes
                            .iter()
                            .position(|c| (c - value).abs() < f64::EPSILON)
                        {
                            proba[[i, j]] = 1.0;
                        }
                        break;
                    }
                    Node::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => {
                        node = if x[[i, *feature]] <= *threshold {
                            left
                        } else {
                            right
                        };
                    }
                }
            }
        }
        Ok(proba)
    }

    fn build(&self, x: &Array2<f64>, y: &Array1<f64>, indices: &[usize], depth: usize) -> Node {
        let labels: Vec<f64> = indices.iter().map(|&i| y[i]).collect();

        let stop = indices.len() < self.min_samples_split
            || self.max_depth.is_some_and(|d| depth >= d)
            || is_pure(&labels);
        if stop {
            return self.leaf(&labels);
        }

        match self.best_split(x, y, indices) {
            Some((feature, threshold)) => {
                let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
                    indices.iter().partition(|&&i| x[[i, feature]] <= threshold);
                if left_idx.is_empty() || right_idx.is_empty() {
                    return self.leaf(&labels);
                }
                Node::Split {
                    feature,
                    threshold,
                    left: Box::new(self.build(x, y, &left_idx, depth + 1)),
                    right: Box::new(self.build(x, y, &right_idx, depth + 1)),
                }
            }
            None => self.leaf(&labels),
        }
    }

    fn leaf(&self, labels: &[f64]) -> Node {
        let distribution = if self.is_classification && !labels.is_empty() {
            let n = labels.len() as f64;
            self.classes
                .iter()
                .map(|&class| {
                    labels.iter().filter(|&&v| (v - class).abs() < f64::EPSILON).count() as f64
                        / n
                })
                .collect()
        } else {
            Vec::new()
        };
        Node::Leaf {
            value: self.leaf_value(labels),
            distribution,
        }
    }

    /// Scan candidate features in parallel; within a feature, sweep the
    /// sorted values once with running statistics.
    fn best_split(&self, x: &Array2<f64>, y: &Array1<f64>, indices: &[usize]) -> Option<(usize, f64)> {
        let features: Vec<usize> = match &self.feature_subset {
            Some(subset) => subset.clone(),
            None => (0..self.n_features).collect(),
        };

        let labels: Vec<f64> = indices.iter().map(|&i| y[i]).collect();
        let parent = self.impurity(&labels);

        let best = features
            .into_par_iter()
            .filter_map(|feature| {
                self.sweep_feature(x, y, indices, feature)
                    .map(|(threshold, impurity)| (feature, threshold, impurity))
            })
            .min_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal))?;

        if parent - best.2 > MIN_IMPURITY_DECREASE {
            Some((best.0, best.1))
        } else {
            None
        }
    }

    /// Best threshold for one feature and its weighted child impurity.
    fn sweep_feature(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        feature: usize,
    ) -> Option<(f64, f64)> {
        let mut order: Vec<usize> = indices.to_vec();
        order.sort_by(|&a, &b| {
            x[[a, feature]]
                .partial_cmp(&x[[b, feature]])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let n = order.len();
        let total = n as f64;
        let mut best: Option<(f64, f64)> = None;

        if self.is_classification {
            let mut right_counts: HashMap<i64, usize> = HashMap::new();
            for &i in &order {
                *right_counts.entry(y[i].round() as i64).or_insert(0) += 1;
            }
            let mut left_counts: HashMap<i64, usize> = HashMap::new();

            for k in 1..n {
                let moved = y[order[k - 1]].round() as i64;
                *left_counts.entry(moved).or_insert(0) += 1;
                if let Some(c) = right_counts.get_mut(&moved) {
                    *c -= 1;
                }

                let lo = x[[order[k - 1], feature]];
                let hi = x[[order[k], feature]];
                if lo >= hi {
                    continue;
                }

                let weighted = (k as f64 * gini(&left_counts, k)
                    + (n - k) as f64 * gini(&right_counts, n - k))
                    / total;
                if best.map_or(true, |(_, b)| weighted < b) {
                    best = Some(((lo + hi) / 2.0, weighted));
                }
            }
        } else {
            let mut right_sum: f64 = order.iter().map(|&i| y[i]).sum();
            let mut right_sq: f64 = order.iter().map(|&i| y[i] * y[i]).sum();
            let mut left_sum = 0.0;
            let mut left_sq = 0.0;

            for k in 1..n {
                let yi = y[order[k - 1]];
                left_sum += yi;
                left_sq += yi * yi;
                right_sum -= yi;
                right_sq -= yi * yi;

                let lo = x[[order[k - 1], feature]];
                let hi = x[[order[k], feature]];
                if lo >= hi {
                    continue;
                }

                let weighted = (k as f64 * variance(left_sum, left_sq, k)
                    + (n - k) as f64 * variance(right_sum, right_sq, n - k))
                    / total;
                if best.map_or(true, |(_, b)| weighted < b) {
                    best = Some(((lo + hi) / 2.0, weighted));
                }
            }
        }
        best
    }

    fn impurity(&self, labels: &[f64]) -> f64 {
        if self.is_classification {
            let mut counts: HashMap<i64, usize> = HashMap::new();
            for &v in labels {
                *counts.entry(v.round() as i64).or_insert(0) += 1;
            }
            gini(&counts, labels.len())
        } else {
            let sum: f64 = labels.iter().sum();
            let sq: f64 = labels.iter().map(|v| v * v).sum();
            variance(sum, sq, labels.len())
        }
    }

    fn leaf_value(&self, labels: &[f64]) -> f64 {
        if labels.is_empty() {
            return 0.0;
        }
        if self.is_classification {
            let mut counts: HashMap<i64, usize> = HashMap::new();
            for &v in labels {
                *counts.entry(v.round() as i64).or_insert(0) += 1;
            }
            counts
                .into_iter()
                .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
                .map(|(class, _)| class as f64)
                .unwrap_or(0.0)
        } else {
            labels.iter().sum::<f64>() / labels.len() as f64
        }
    }
}

fn gini(counts: &HashMap<i64, usize>, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts
        .values()
        .map(|&c| (c as f64 / n).powi(2))
        .sum::<f64>()
}

fn variance(sum: f64, sq_sum: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    (sq_sum / n - (sum / n).powi(2)).max(0.0)
}

fn is_pure(labels: &[f64]) -> bool {
    labels
        .windows(2)
        .all(|w| (w[0] - w[1]).abs() < f64::EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_separable() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        let pred = tree.predict(&array![[2.0], [11.5]]).unwrap();
        assert_eq!(pred[0], 0.0);
        assert_eq!(pred[1], 1.0);
        assert_eq!(tree.classes(), &[0.0, 1.0]);
    }

    #[test]
    fn test_regressor_step_function() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![10.0, 10.0, 10.0, 50.0, 50.0, 50.0];

        let mut tree = DecisionTree::new_regressor();
        tree.fit(&x, &y).unwrap();

        let pred = tree.predict(&array![[1.5], [5.5]]).unwrap();
        assert!((pred[0] - 10.0).abs() < 1e-9);
        assert!((pred[1] - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_classifier_probabilities_pure_leaves() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        let proba = tree.predict_proba(&array![[2.0], [11.0]]).unwrap();
        assert_eq!(proba.shape(), &[2, 2]);
        assert!((proba[[0, 0]] - 1.0).abs() < 1e-9);
        assert!((proba[[1, 1]] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_mixed_leaf_probabilities_are_class_shares() {
        // depth 0 forbids splitting, so the root leaf holds the class mix
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![0.0, 0.0, 0.0, 1.0];

        let mut tree = DecisionTree::new_classifier().with_max_depth(0);
        tree.fit(&x, &y).unwrap();

        let proba = tree.predict_proba(&array![[2.5]]).unwrap();
        assert!((proba[[0, 0]] - 0.75).abs() < 1e-9);
        assert!((proba[[0, 1]] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_regressor_has_no_probabilities() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![1.0, 2.0, 3.0];

        let mut tree = DecisionTree::new_regressor();
        tree.fit(&x, &y).unwrap();
        assert!(matches!(
            tree.predict_proba(&array![[1.5]]),
            Err(DataFlowError::DataError(_))
        ));
    }

    #[test]
    fn test_predict_before_fit() {
        let tree = DecisionTree::new_classifier();
        let result = tree.predict(&array![[1.0]]);
        assert!(matches!(result, Err(DataFlowError::NotFitted)));
    }

    #[test]
    fn test_shape_mismatch() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let y = array![0.0, 1.0, 1.0];
        let mut tree = DecisionTree::new_classifier();
        assert!(matches!(
            tree.fit(&x, &y),
            Err(DataFlowError::ShapeError { .. })
        ));
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0], [7.0], [8.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];

        let mut shallow = DecisionTree::new_regressor().with_max_depth(1);
        shallow.fit(&x, &y).unwrap();
        let pred = shallow.predict(&x).unwrap();

        // depth 1 means a single split, so at most two distinct outputs
        let mut distinct: Vec<f64> = pred.to_vec();
        distinct.sort_by(|a, b| a.partial_cmp(b).unwrap());
        distinct.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
        assert!(distinct.len() <= 2);
    }

    #[test]
    fn test_constant_target_single_leaf() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![7.0, 7.0, 7.0];

        let mut tree = DecisionTree::new_regressor();
        tree.fit(&x, &y).unwrap();
        let pred = tree.predict(&array![[9.0]]).unwrap();
        assert!((pred[0] - 7.0).abs() < 1e-9);
    }
}
