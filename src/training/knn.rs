//! K-nearest-neighbors classifier and regressor

use crate::error::{DataFlowError, Result};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Instance-based model: stores the training set and answers queries by
/// majority vote (classification) or mean (regression) over the `k`
/// nearest neighbors under Euclidean distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Knn {
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
    pub k: usize,
    is_classification: bool,
    classes: Vec<f64>,
}

impl Knn {
    pub fn new_classifier(k: usize) -> Self {
        Self {
            x_train: None,
            y_train: None,
            k: k.max(1),
            is_classification: true,
            classes: Vec::new(),
        }
    }

    pub fn new_regressor(k: usize) -> Self {
        Self {
            x_train: None,
            y_train: None,
            k: k.max(1),
            is_classification: false,
            classes: Vec::new(),
        }
    }

    pub fn is_classifier(&self) -> bool {
        self.is_classification
    }

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
                "cannot fit on zero samples".to_string(),
            ));
        }

        if self.is_classification {
            let mut classes: Vec<f64> = y.iter().copied().collect();
            classes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            classes.dedup();
            self.classes = classes;
        }
        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (x_train, y_train) = self.training_data()?;
        self.check_width(x, x_train)?;

        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|row| {
                let neighbors = self.nearest(x, row, x_train);
                if self.is_classification {
                    let mut counts: HashMap<i64, usize> = HashMap::new();
                    for &i in &neighbors {
                        *counts.entry(y_train[i].round() as i64).or_insert(0) += 1;
                    }
                    counts
                        .into_iter()
                        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
                        .map(|(class, _)| class as f64)
                        .unwrap_or(0.0)
                } else {
                    neighbors.iter().map(|&i| y_train[i]).sum::<f64>() / neighbors.len() as f64
                }
            })
            .collect();
        Ok(Array1::from_vec(predictions))
    }

    /// Class probabilities as neighbor vote fractions.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_classification {
            return Err(DataFlowError::ComputationError(
                "probabilities are only defined for classification".to_string(),
            ));
        }
        let (x_train, y_train) = self.training_data()?;
        self.check_width(x, x_train)?;

        let rows: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|row| {
                let neighbors = self.nearest(x, row, x_train);
                let mut votes = vec![0.0; self.classes.len()];
                for &i in &neighbors {
                    let value = y_train[i];
                    if let Some(class_idx) = self
                        .classes
                        .iter()
                        .position(|c| (c - value).abs() < f64::EPSILON)
                    {
                        votes[class_idx] += 1.0 / neighbors.len() as f64;
                    }
                }
                votes
            })
            .collect();

        let mut proba = Array2::zeros((x.nrows(), self.classes.len()));
        for (row_idx, votes) in rows.into_iter().enumerate() {
            for (class_idx, v) in votes.into_iter().enumerate() {
                proba[[row_idx, class_idx]] = v;
            }
        }
        Ok(proba)
    }

    /// Indices of the k nearest training rows to query row `row`.
    fn nearest(&self, x: &Array2<f64>, row: usize, x_train: &Array2<f64>) -> Vec<usize> {
        let query = x.row(row);
        let mut distances: Vec<(usize, f64)> = (0..x_train.nrows())
            .map(|i| {
                let d = x_train
                    .row(i)
                    .iter()
                    .zip(query.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum::<f64>();
                (i, d)
            })
            .collect();

        let k = self.k.min(distances.len());
        distances.select_nth_unstable_by(k - 1, |a, b| {
            a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)
        });
        distances.truncate(k);
        distances.into_iter().map(|(i, _)| i).collect()
    }

    fn training_data(&self) -> Result<(&Array2<f64>, &Array1<f64>)> {
        match (&self.x_train, &self.y_train) {
            (Some(x), Some(y)) => Ok((x, y)),
            _ => Err(DataFlowError::NotFitted),
        }
    }

    fn check_width(&self, x: &Array2<f64>, x_train: &Array2<f64>) -> Result<()> {
        if x.ncols() != x_train.ncols() {
            return Err(DataFlowError::ShapeError {
                expected: format!("{} features", x_train.ncols()),
                actual: format!("{}", x.ncols()),
            });
        }
        Ok(())
    }
}
