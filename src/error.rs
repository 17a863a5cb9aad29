//! Error types for the DataFlow AutoML core

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, DataFlowError>;

/// Errors produced by the pipeline, training, and prediction paths
#[derive(Debug, Error)]
pub enum DataFlowError {
    /// Declared file kind is neither CSV nor a spreadsheet
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// Source content could not be parsed as tabular data
    #[error("Failed to parse dataset: {0}")]
    ParseError(String),

    /// Requested algorithm name is not in the registry
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Feature preprocessing produced zero usable columns
    #[error("No usable features found for training")]
    NoUsableFeatures,

    /// Model artifact path did not resolve
    #[error("Model artifact not found: {0}")]
    ArtifactNotFound(String),

    /// Prediction-time failure (shape mismatch, undecodable artifact)
    #[error("Prediction failed: {0}")]
    PredictionError(String),

    /// Generic data manipulation failure
    #[error("Data error: {0}")]
    DataError(String),

    /// Referenced column does not exist in the table
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Dimension mismatch between arrays
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    /// Estimator used before fitting
    #[error("Model is not fitted")]
    NotFitted,

    /// Numeric computation failure (singular system, divergence)
    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
