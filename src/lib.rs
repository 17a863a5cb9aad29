//! DataFlow AutoML - automated tabular data preparation and model training
//!
//! Takes an uploaded dataset file through the full pipeline: loading,
//! standardization, cleaning, feature engineering, problem-type detection,
//! model training with holdout evaluation, artifact persistence, and
//! prediction serving from persisted artifacts.
//!
//! # Modules
//!
//! - [`dataset`] - File loading (CSV and spreadsheets) and dataset summaries
//! - [`pipeline`] - Standardization, cleaning, and feature engineering stages
//! - [`training`] - Problem-type detection, estimators, orchestration, artifacts
//! - [`inference`] - Prediction serving over persisted artifacts
//!
//! HTTP routing, authentication, relational persistence, and insight
//! generation are external collaborators; this crate is the engine they
//! call into.

pub mod error;

pub mod dataset;
pub mod inference;
pub mod pipeline;
pub mod training;

pub use error::{DataFlowError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{DataFlowError, Result};

    // Dataset loading
    pub use crate::dataset::{DatasetLoader, DatasetSummary, FileKind};

    // Pipeline stages
    pub use crate::pipeline::{
        clean, clean_file, engineer_features, engineer_file, standardize, standardize_file,
        summarize_columns, CleaningReport, ColumnKind, ColumnSummary, FeatureReport,
        StandardizeReport,
    };

    // Training
    pub use crate::training::{
        detect_problem_type, train, train_many, ArtifactStore, EvaluationMetrics, ModelKind,
        ProblemType, TrainedArtifact, TrainingOutcome, TrainingRequest,
    };

    // Inference
    pub use crate::inference::{
        FeatureMatching, PredictedValue, PredictionResult, PredictionService,
    };
}
