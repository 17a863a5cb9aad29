//! Evaluation metrics

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Holdout evaluation results for one trained model.
///
/// `accuracy_pct()` keeps the historical single-number summary (accuracy
/// or R², scaled to percent) while the variants carry the properly named
/// per-metric fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluationMetrics {
    Classification {
        accuracy: f64,
        /// Support-weighted precision
        precision: f64,
        /// Support-weighted recall
        recall: f64,
        /// Support-weighted F1
        f1: f64,
    },
    Regression {
        r2: f64,
        mse: f64,
        mae: f64,
        rmse: f64,
    },
}

impl EvaluationMetrics {
    /// Headline percentage: accuracy for classification, R² for
    /// regression, both scaled by 100.
    pub fn accuracy_pct(&self) -> f64 {
        match self {
            EvaluationMetrics::Classification { accuracy, .. } => accuracy * 100.0,
            EvaluationMetrics::Regression { r2, .. } => r2 * 100.0,
        }
    }
}

/// Accuracy plus support-weighted precision/recall/F1.
///
/// Per-class ratios with an empty denominator count as 0 rather than
/// poisoning the weighted average.
pub fn classification_metrics(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> EvaluationMetrics {
    let n = y_true.len();
    if n == 0 {
        return EvaluationMetrics::Classification {
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1: 0.0,
        };
    }

    let to_class = |v: f64| v.round() as i64;

    let mut correct = 0usize;
    let mut support: BTreeMap<i64, usize> = BTreeMap::new();
    let mut true_positives: BTreeMap<i64, usize> = BTreeMap::new();
    let mut predicted_as: BTreeMap<i64, usize> = BTreeMap::new();

    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        let (t, p) = (to_class(*t), to_class(*p));
        *support.entry(t).or_insert(0) += 1;
        *predicted_as.entry(p).or_insert(0) += 1;
        if t == p {
            correct += 1;
            *true_positives.entry(t).or_insert(0) += 1;
        }
    }

    let mut precision = 0.0;
    let mut recall = 0.0;
    let mut f1 = 0.0;
    for (&class, &sup) in &support {
        let tp = *true_positives.get(&class).unwrap_or(&0) as f64;
        let pred = *predicted_as.get(&class).unwrap_or(&0) as f64;

        let class_precision = if pred > 0.0 { tp / pred } else { 0.0 };
        let class_recall = tp / sup as f64;
        let class_f1 = if class_precision + class_recall > 0.0 {
            2.0 * class_precision * class_recall / (class_precision + class_recall)
        } else {
            0.0
        };

        let weight = sup as f64 / n as f64;
        precision += weight * class_precision;
        recall += weight * class_recall;
        f1 += weight * class_f1;
    }

    EvaluationMetrics::Classification {
        accuracy: correct as f64 / n as f64,
        precision,
        recall,
        f1,
    }
}

/// R², MSE, MAE, and RMSE (derived from MSE).
pub fn regression_metrics(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> EvaluationMetrics {
    let n = y_true.len();
    if n == 0 {
        return EvaluationMetrics::Regression {
            r2: 0.0,
            mse: 0.0,
            mae: 0.0,
            rmse: 0.0,
        };
    }

    let mean = y_true.sum() / n as f64;
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();

    let r2 = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    };

    let mse = ss_res / n as f64;
    let mae: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / n as f64;

    EvaluationMetrics::Regression {
        r2,
        mse,
        mae,
        rmse: mse.sqrt(),
    }
}
