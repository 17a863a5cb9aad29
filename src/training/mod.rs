//! Model training
//!
//! Estimator implementations, the problem-type detector, evaluation
//! metrics, the training orchestrator, and artifact persistence.

mod artifact;
mod detector;
mod engine;
mod metrics;
pub mod decision_tree;
pub mod knn;
pub mod linear;
pub mod random_forest;
pub mod svm;

pub use artifact::{ArtifactStore, TrainedArtifact};
pub use decision_tree::DecisionTree;
pub use detector::detect_problem_type;
pub use engine::{train, train_many, TrainingOutcome, TrainingRequest};
pub use knn::Knn;
pub use linear::{LinearRegression, LogisticRegression};
pub use metrics::{classification_metrics, regression_metrics, EvaluationMetrics};
pub use random_forest::RandomForest;
pub use svm::{SvmClassifier, SvmRegressor};

use crate::error::Result;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Detected task kind for a target column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProblemType {
    Classification,
    Regression,
}

impl std::fmt::Display for ProblemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProblemType::Classification => write!(f, "classification"),
            ProblemType::Regression => write!(f, "regression"),
        }
    }
}

/// A fitted estimator of any registered kind.
///
/// Serialized inside the artifact file; dispatches prediction calls to the
/// concrete model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ModelKind {
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
    LinearRegression(LinearRegression),
    LogisticRegression(LogisticRegression),
    Knn(Knn),
    SvmClassifier(SvmClassifier),
    SvmRegressor(SvmRegressor),
}

impl ModelKind {
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            ModelKind::DecisionTree(m) => m.predict(x),
            ModelKind::RandomForest(m) => m.predict(x),
            ModelKind::LinearRegression(m) => m.predict(x),
            ModelKind::LogisticRegression(m) => m.predict(x),
            ModelKind::Knn(m) => m.predict(x),
            ModelKind::SvmClassifier(m) => m.predict(x),
            ModelKind::SvmRegressor(m) => m.predict(x),
        }
    }

    /// Per-class probabilities, for the estimators that expose them.
    ///
    /// `None` means the estimator kind has no probability output and the
    /// caller should fall back to its default confidence.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Option<Result<Array2<f64>>> {
        match self {
            ModelKind::DecisionTree(m) if m.is_classifier() => Some(m.predict_proba(x)),
            ModelKind::RandomForest(m) if m.is_classifier() => Some(m.predict_proba(x)),
            ModelKind::LogisticRegression(m) => Some(m.predict_proba(x)),
            ModelKind::Knn(m) if m.is_classifier() => Some(m.predict_proba(x)),
            _ => None,
        }
    }
}
