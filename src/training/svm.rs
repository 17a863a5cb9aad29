//! Support vector machines: SMO-trained RBF classifier and a linear
//! epsilon-insensitive regressor

use crate::error::{DataFlowError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

const SUPPORT_THRESHOLD: f64 = 1e-8;

/// One trained binary margin: support vectors with their signed alpha
/// weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinarySvm {
    support_vectors: Array2<f64>,
    /// `alpha_i * y_i` per support vector
    coefficients: Array1<f64>,
    bias: f64,
}

impl BinarySvm {
    fn decision(&self, sample: &[f64], gamma: f64) -> f64 {
        let mut score = self.bias;
        for (sv, coef) in self
            .support_vectors
            .rows()
            .into_iter()
            .zip(self.coefficients.iter())
        {
            let dist_sq: f64 = sv
                .iter()
                .zip(sample.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum();
            score += coef * (-gamma * dist_sq).exp();
        }
        score
    }
}

/// RBF-kernel classifier trained with simplified SMO. Multi-class inputs
/// train one-vs-rest margins and pick the highest decision value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmClassifier {
    pub c: f64,
    pub tolerance: f64,
    pub max_passes: usize,
    pub seed: u64,
    gamma: f64,
    classes: Vec<f64>,
    machines: Vec<BinarySvm>,
    n_features: usize,
}

impl Default for SvmClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SvmClassifier {
    pub fn new() -> Self {
        Self {
            c: 1.0,
            tolerance: 1e-3,
            max_passes: 5,
            seed: 42,
            gamma: 1.0,
            classes: Vec::new(),
            machines: Vec::new(),
            n_features: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n = x.nrows();
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
        if classes.len() < 2 {
            return Err(DataFlowError::DataError(
                "classification needs at least two classes".to_string(),
            ));
        }
        self.classes = classes;
        self.n_features = x.ncols();

        // sklearn's "scale" heuristic: 1 / (n_features * Var(X))
        let x_var = {
            let mean = x.sum() / (n * x.ncols()) as f64;
            x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n * x.ncols()) as f64
        };
        self.gamma = if x_var > 0.0 {
            1.0 / (x.ncols() as f64 * x_var)
        } else {
            1.0 / x.ncols() as f64
        };

        let kernel = self.kernel_matrix(x);

        if self.classes.len() == 2 {
            let positive = self.classes[1];
            let labels: Array1<f64> = y
                .iter()
                .map(|&v| if (v - positive).abs() < f64::EPSILON { 1.0 } else { -1.0 })
                .collect();
            self.machines = vec![self.train_binary(x, &labels, &kernel, 0)];
        } else {
            self.machines = self
                .classes
                .clone()
                .iter()
                .enumerate()
                .map(|(idx, &class)| {
                    let labels: Array1<f64> = y
                        .iter()
                        .map(|&v| if (v - class).abs() < f64::EPSILON { 1.0 } else { -1.0 })
                        .collect();
                    self.train_binary(x, &labels, &kernel, idx as u64)
                })
                .collect();
        }
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.machines.is_empty() {
            return Err(DataFlowError::NotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(DataFlowError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{}", x.ncols()),
            });
        }

        let predictions: Vec<f64> = (0..x.nrows())
            .map(|row| {
                let sample: Vec<f64> = x.row(row).to_vec();
                if self.classes.len() == 2 {
                    if self.machines[0].decision(&sample, self.gamma) >= 0.0 {
                        self.classes[1]
                    } else {
                        self.classes[0]
                    }
                } else {
                    let best = self
                        .machines
                        .iter()
                        .enumerate()
                        .map(|(i, m)| (i, m.decision(&sample, self.gamma)))
                        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                        .map(|(i, _)| i)
                        .unwrap_or(0);
                    self.classes[best]
                }
            })
            .collect();
        Ok(Array1::from_vec(predictions))
    }

    fn kernel_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let n = x.nrows();
        let mut kernel = Array2::zeros((n, n));
        for i in 0..n {
            for j in i..n {
                let dist_sq: f64 = x
                    .row(i)
                    .iter()
                    .zip(x.row(j).iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum();
                let value = (-self.gamma * dist_sq).exp();
                kernel[[i, j]] = value;
                kernel[[j, i]] = value;
            }
        }
        kernel
    }

    /// Simplified SMO over a precomputed kernel matrix.
    fn train_binary(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        kernel: &Array2<f64>,
        machine_idx: u64,
    ) -> BinarySvm {
        let n = x.nrows();
        let mut alphas = Array1::<f64>::zeros(n);
        let mut bias = 0.0;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(machine_idx));

        let decision = |alphas: &Array1<f64>, bias: f64, idx: usize| -> f64 {
            let mut score = bias;
            for k in 0..n {
                if alphas[k] > 0.0 {
                    score += alphas[k] * y[k] * kernel[[k, idx]];
                }
            }
            score
        };

        let mut passes = 0;
        let mut iterations = 0;
        while passes < self.max_passes && iterations < 200 {
            iterations += 1;
            let mut changed = 0;

            for i in 0..n {
                let err_i = decision(&alphas, bias, i) - y[i];
                let violates = (y[i] * err_i < -self.tolerance && alphas[i] < self.c)
                    || (y[i] * err_i > self.tolerance && alphas[i] > 0.0);
                if !violates {
                    continue;
                }

                let mut j = rng.gen_range(0..n - 1);
                if j >= i {
                    j += 1;
                }
                let err_j = decision(&alphas, bias, j) - y[j];

                let (alpha_i_old, alpha_j_old) = (alphas[i], alphas[j]);
                let (low, high) = if (y[i] - y[j]).abs() < f64::EPSILON {
                    (
                        (alpha_i_old + alpha_j_old - self.c).max(0.0),
                        (alpha_i_old + alpha_j_old).min(self.c),
                    )
                } else {
                    (
                        (alpha_j_old - alpha_i_old).max(0.0),
                        (self.c + alpha_j_old - alpha_i_old).min(self.c),
                    )
                };
                if (high - low).abs() < f64::EPSILON {
                    continue;
                }

                let eta = 2.0 * kernel[[i, j]] - kernel[[i, i]] - kernel[[j, j]];
                if eta >= 0.0 {
                    continue;
                }

                let mut alpha_j = alpha_j_old - y[j] * (err_i - err_j) / eta;
                alpha_j = alpha_j.clamp(low, high);
                if (alpha_j - alpha_j_old).abs() < 1e-5 {
                    continue;
                }
                let alpha_i = alpha_i_old + y[i] * y[j] * (alpha_j_old - alpha_j);

                let b1 = bias
                    - err_i
                    - y[i] * (alpha_i - alpha_i_old) * kernel[[i, i]]
                    - y[j] * (alpha_j - alpha_j_old) * kernel[[i, j]];
                let b2 = bias
                    - err_j
                    - y[i] * (alpha_i - alpha_i_old) * kernel[[i, j]]
                    - y[j] * (alpha_j - alpha_j_old) * kernel[[j, j]];
                bias = if alpha_i > 0.0 && alpha_i < self.c {
                    b1
                } else if alpha_j > 0.0 && alpha_j < self.c {
                    b2
                } else {
                    (b1 + b2) / 2.0
                };

                alphas[i] = alpha_i;
                alphas[j] = alpha_j;
                changed += 1;
            }

            if changed == 0 {
                passes += 1;
            } else {
                passes = 0;
            }
        }

        let support: Vec<usize> = (0..n).filter(|&i| alphas[i] > SUPPORT_THRESHOLD).collect();
        let support_vectors = x.select(Axis(0), &support);
        let coefficients = Array1::from_iter(support.iter().map(|&i| alphas[i] * y[i]));

        BinarySvm {
            support_vectors,
            coefficients,
            bias,
        }
    }
}

/// Linear epsilon-insensitive support vector regressor trained by
/// subgradient descent on standardized inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmRegressor {
    pub epsilon: f64,
    pub learning_rate: f64,
    pub epochs: usize,
    pub regularization: f64,
    weights: Option<Array1<f64>>,
    bias: f64,
    feature_means: Array1<f64>,
    feature_stds: Array1<f64>,
    y_mean: f64,
    y_std: f64,
}

impl Default for SvmRegressor {
    fn default() -> Self {
        Self::new()
    }
}

impl SvmRegressor {
    pub fn new() -> Self {
        Self {
            epsilon: 0.1,
            learning_rate: 0.01,
            epochs: 500,
            regularization: 1e-3,
            weights: None,
            bias: 0.0,
            feature_means: Array1::zeros(0),
            feature_stds: Array1::zeros(0),
            y_mean: 0.0,
            y_std: 1.0,
        }
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
        self.y_mean = y.sum() / n as f64;
        let y_var = y.iter().map(|v| (v - self.y_mean).powi(2)).sum::<f64>() / n as f64;
        self.y_std = if y_var > 0.0 { y_var.sqrt() } else { 1.0 };

        let xs = (x - &self.feature_means) / &self.feature_stds;
        let ys = y.mapv(|v| (v - self.y_mean) / self.y_std);

        let mut weights = Array1::<f64>::zeros(p);
        let mut bias = 0.0;
        for _ in 0..self.epochs {
            let residuals = xs.dot(&weights) + bias - &ys;

            let mut gradient = weights.mapv(|w| self.regularization * w);
            let mut bias_gradient = 0.0;
            for (row, &err) in residuals.iter().enumerate() {
                if err.abs() <= self.epsilon {
                    continue;
                }
                let direction = err.signum() / n as f64;
                gradient.scaled_add(direction, &xs.row(row));
                bias_gradient += direction;
            }

            weights.scaled_add(-self.learning_rate, &gradient);
            bias -= self.learning_rate * bias_gradient;
        }

        self.weights = Some(weights);
        self.bias = bias;
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let weights = self.weights.as_ref().ok_or(DataFlowError::NotFitted)?;
        if x.ncols() != weights.len() {
            return Err(DataFlowError::ShapeError {
                expected: format!("{} features", weights.len()),
                actual: format!("{}", x.ncols()),
            });
        }
        let xs = (x - &self.feature_means) / &self.feature_stds;
        let scaled = xs.dot(weights) + self.bias;
        Ok(scaled.mapv(|v| v * self.y_std + self.y_mean))
    }
}
