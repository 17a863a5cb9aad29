//! Linear models: ordinary least squares and logistic regression

use crate::error::{DataFlowError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Ordinary least squares via centered normal equations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    coefficients: Option<Array1<f64>>,
    intercept: f64,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
        }
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let (n, p) = (x.nrows(), x.ncols());
        if n != y.len() {
            return Err(DataFlowError::ShapeError {
                expected: format!("{} target values", n),
                actual: format!("{}", y.len()),
            });
        }
        if n == 0 {
            return Err(DataFlowError::DataError(
                "cannot fit on zero samples".to_string(),
            ));
        }

        let x_mean = x.mean_axis(Axis(0)).ok_or_else(|| {
            DataFlowError::ComputationError("failed to compute feature means".to_string())
        })?;
        let y_mean = y.sum() / n as f64;

        let xc = x - &x_mean;
        let yc = y.mapv(|v| v - y_mean);

        // X'X with a small ridge term to keep collinear inputs solvable
        let mut gram = xc.t().dot(&xc);
        for i in 0..p {
            gram[[i, i]] += 1e-10;
        }
        let moment = xc.t().dot(&yc);

        let coef = solve_linear_system(gram, moment)?;
        self.intercept = y_mean - coef.dot(&x_mean);
        self.coefficients = Some(coef);
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coef = self.coefficients.as_ref().ok_or(DataFlowError::NotFitted)?;
        if x.ncols() != coef.len() {
            return Err(DataFlowError::ShapeError {
                expected: format!("{} features", coef.len()),
                actual: format!("{}", x.ncols()),
            });
        }
        Ok(x.dot(coef) + self.intercept)
    }
}

/// Gaussian elimination with partial pivoting.
fn solve_linear_system(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| {
                a[[i, col]]
                    .abs()
                    .partial_cmp(&a[[j, col]].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        if a[[pivot_row, col]].abs() < 1e-14 {
            return Err(DataFlowError::ComputationError(
                "singular design matrix".to_string(),
            ));
        }
        if pivot_row != col {
            for k in 0..n {
                a.swap([col, k], [pivot_row, k]);
            }
            b.swap(col, pivot_row);
        }

        for row in (col + 1)..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut solution = Array1::zeros(n);
    for row in (0..n).rev() {
        let mut acc = b[row];
        for k in (row + 1)..n {
            acc -= a[[row, k]] * solution[k];
        }
        solution[row] = acc / a[[row, row]];
    }
    Ok(solution)
}

/// One-vs-rest logistic regression trained by full-batch gradient descent
/// on internally standardized features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// One weight vector (with trailing bias) per class
    weights: Vec<Array1<f64>>,
    classes: Vec<f64>,
    feature_means: Array1<f64>,
    feature_stds: Array1<f64>,
    pub learning_rate: f64,
    pub max_iterations: usize,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            weights: Vec::new(),
            classes: Vec::new(),
            feature_means: Array1::zeros(0),
            feature_stds: Array1::zeros(0),
            learning_rate: 0.1,
            max_iterations: 500,
        }
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let (n, p) = (x.nrows(), x.ncols());
        if n != y.len() {
            return Err(DataFlowError::ShapeError {
                expected: format!("{} target values", n),
                actual: format!("{}", y.len()),
            });
        }
        if n == 0 {
            return Err(DataFlowError::DataError(
                "cannot fit on zero samples".to_string(),
            ));
        }

        let mut classes: Vec<f64> = y.iter().copied().collect();
        classes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        classes.dedup();
        self.classes = classes;

        self.feature_means = x.mean_axis(Axis(0)).ok_or_else(|| {
            DataFlowError::ComputationError("failed to compute feature means".to_string())
        })?;
        self.feature_stds = x
            .axis_iter(Axis(1))
            .map(|col| {
                let mean = col.sum() / n as f64;
                let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
                let std = var.sqrt();
                if std > 0.0 {
                    std
                } else {
                    1.0
                }
            })
            .collect();

        let xs = self.standardize(x);

        self.weights = self
            .classes
            .iter()
            .map(|&class| {
                let targets: Array1<f64> = y
                    .iter()
                    .map(|&v| if (v - class).abs() < f64::EPSILON { 1.0 } else { 0.0 })
                    .collect();
                self.fit_binary(&xs, &targets, p)
            })
            .collect();

        Ok(self)
    }

    fn fit_binary(&self, xs: &Array2<f64>, targets: &Array1<f64>, p: usize) -> Array1<f64> {
        let n = xs.nrows() as f64;
        let mut weights = Array1::zeros(p + 1);

        for _ in 0..self.max_iterations {
            let scores = self.decision(xs, &weights);
            let probs = scores.mapv(sigmoid);
            let residual = &probs - targets;

            let mut gradient = Array1::zeros(p + 1);
            for j in 0..p {
                gradient[j] = xs.column(j).dot(&residual) / n;
            }
            gradient[p] = residual.sum() / n;

            weights = weights - self.learning_rate * gradient;
        }
        weights
    }

    fn decision(&self, xs: &Array2<f64>, weights: &Array1<f64>) -> Array1<f64> {
        let p = xs.ncols();
        let coef = weights.slice(ndarray::s![0..p]);
        xs.dot(&coef) + weights[p]
    }

    fn standardize(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.feature_means) / &self.feature_stds
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        let predictions: Vec<f64> = proba
            .rows()
            .into_iter()
            .map(|row| {
                let best = row
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                self.classes[best]
            })
            .collect();
        Ok(Array1::from_vec(predictions))
    }

    /// Per-class probabilities: one-vs-rest sigmoid scores normalized to
    /// sum to one per row.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.weights.is_empty() {
            return Err(DataFlowError::NotFitted);
        }
        if x.ncols() != self.feature_means.len() {
            return Err(DataFlowError::ShapeError {
                expected: format!("{} features", self.feature_means.len()),
                actual: format!("{}", x.ncols()),
            });
        }

        let xs = self.standardize(x);
        let mut proba = Array2::zeros((x.nrows(), self.classes.len()));
        for (class_idx, weights) in self.weights.iter().enumerate() {
            let scores = self.decision(&xs, weights).mapv(sigmoid);
            for (row, score) in scores.iter().enumerate() {
                proba[[row, class_idx]] = *score;
            }
        }

        for mut row in proba.rows_mut() {
            let sum: f64 = row.sum();
            if sum > 0.0 {
                row.mapv_inplace(|v| v / sum);
            } else {
                row.fill(1.0 / self.classes.len() as f64);
            }
        }
        Ok(proba)
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
