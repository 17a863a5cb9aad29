//! Random forest: bootstrap-aggregated decision trees

use super::decision_tree::DecisionTree;
use crate::error::{DataFlowError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bagged ensemble of decision trees. Each tree trains on a seeded
/// bootstrap sample; classifiers additionally restrict each tree to a
/// random sqrt-sized feature subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub seed: u64,
    is_classification: bool,
    classes: Vec<f64>,
    n_features: usize,
}

impl RandomForest {
    pub fn new_classifier(n_trees: usize, seed: u64) -> Self {
        Self {
            trees: Vec::new(),
            n_trees,
            max_depth: None,
            seed,
            is_classification: true,
            classes: Vec::new(),
            n_features: 0,
        }
    }

    pub fn new_regressor(n_trees: usize, seed: u64) -> Self {
        Self {
            trees: Vec::new(),
            n_trees,
            max_depth: None,
            seed,
            is_classification: false,
            classes: Vec::new(),
            n_features: 0,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn is_classifier(&self) -> bool {
        self.is_classification
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(DataFlowError::ShapeError {
                expected: format!("{} target values", n_samples),
                actual: format!("{}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(DataFlowError::DataError(
                "cannot fit a forest on zero samples".to_string(),
            ));
        }

        self.n_features = x.ncols();
        if self.is_classification {
            let mut classes: Vec<f64> = y.iter().copied().collect();
            classes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            classes.dedup();
            self.classes = classes;
        }

        let subset_size = if self.is_classification {
            ((self.n_features as f64).sqrt().ceil() as usize).max(1)
        } else {
            self.n_features
        };

        self.trees = (0..self.n_trees)
            .into_par_iter()
            .map(|tree_idx| {
                // Per-tree seed keeps the ensemble reproducible while
                // decorrelating the trees.
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(tree_idx as u64));

                let sample: Vec<usize> =
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
                let x_boot = x.select(Axis(0), &sample);
                let y_boot = Array1::from_iter(sample.iter().map(|&i| y[i]));

                let features = sample_features(&mut rng, self.n_features, subset_size);

                let mut tree = if self.is_classification {
                    DecisionTree::new_classifier()
                } else {
                    DecisionTree::new_regressor()
                }
                .with_feature_subset(features);
                if let Some(depth) = self.max_depth {
                    tree = tree.with_max_depth(depth);
                }
                tree.fit(&x_boot, &y_boot)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(DataFlowError::NotFitted);
        }
        let votes = self.tree_predictions(x)?;

        let predictions: Vec<f64> = (0..x.nrows())
            .map(|row| {
                if self.is_classification {
                    let mut counts: HashMap<i64, usize> = HashMap::new();
                    for tree_pred in &votes {
                        *counts.entry(tree_pred[row].round() as i64).or_insert(0) += 1;
                    }
                    counts
                        .into_iter()
                        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
                        .map(|(class, _)| class as f64)
                        .unwrap_or(0.0)
                } else {
                    votes.iter().map(|p| p[row]).sum::<f64>() / votes.len() as f64
                }
            })
            .collect();
        Ok(Array1::from_vec(predictions))
    }

    /// Class probabilities as the fraction of trees voting each class.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(DataFlowError::NotFitted);
        }
        if !self.is_classification {
            return Err(DataFlowError::ComputationError(
                "probabilities are only defined for classification forests".to_string(),
            ));
        }

        let votes = self.tree_predictions(x)?;
        let n_trees = votes.len() as f64;
        let mut proba = Array2::zeros((x.nrows(), self.classes.len()));
        for row in 0..x.nrows() {
            for tree_pred in &votes {
                let value = tree_pred[row];
                if let Some(class_idx) = self
                    .classes
                    .iter()
                    .position(|c| (c - value).abs() < f64::EPSILON)
                {
                    proba[[row, class_idx]] += 1.0 / n_trees;
                }
            }
        }
        Ok(proba)
    }

    fn tree_predictions(&self, x: &Array2<f64>) -> Result<Vec<Array1<f64>>> {
        self.trees.par_iter().map(|tree| tree.predict(x)).collect()
    }
}

/// Random distinct feature indices, ascending.
fn sample_features(rng: &mut ChaCha8Rng, n_features: usize, k: usize) -> Vec<usize> {
    if k >= n_features {
        return (0..n_features).collect();
    }
    let mut picked = rand::seq::index::sample(rng, n_features, k).into_vec();
    picked.sort_unstable();
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [1.0, 0.5],
            [1.2, 0.4],
            [0.9, 0.6],
            [1.1, 0.5],
            [8.0, 3.0],
            [8.2, 2.9],
            [7.9, 3.1],
            [8.1, 3.0],
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_classifier_separable() {
        let (x, y) = separable();
        let mut forest = RandomForest::new_classifier(25, 42);
        forest.fit(&x, &y).unwrap();

        let pred = forest.predict(&array![[1.0, 0.5], [8.0, 3.0]]).unwrap();
        assert_eq!(pred[0], 0.0);
        assert_eq!(pred[1], 1.0);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = separable();
        let mut forest = RandomForest::new_classifier(25, 42);
        forest.fit(&x, &y).unwrap();

        let proba = forest.predict_proba(&x).unwrap();
        for row in proba.rows() {
            let sum: f64 = row.sum();
            assert!((sum - 1.0).abs() < 1e-9);
            assert!(row.iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }

    #[test]
    fn test_fit_is_reproducible() {
        let (x, y) = separable();
        let mut a = RandomForest::new_classifier(10, 7);
        let mut b = RandomForest::new_classifier(10, 7);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();

        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_regressor_mean_of_trees() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![10.0, 10.0, 10.0, 50.0, 50.0, 50.0];

        let mut forest = RandomForest::new_regressor(20, 42);
        forest.fit(&x, &y).unwrap();

        let pred = forest.predict(&array![[1.5], [5.5]]).unwrap();
        assert!(pred[0] < 30.0);
        assert!(pred[1] > 30.0);
    }

    #[test]
    fn test_predict_before_fit() {
        let forest = RandomForest::new_classifier(5, 0);
        assert!(matches!(
            forest.predict(&array![[1.0]]),
            Err(DataFlowError::NotFitted)
        ));
    }
}
