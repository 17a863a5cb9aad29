//! Prediction serving over persisted artifacts

use crate::error::{DataFlowError, Result};
use crate::training::{ProblemType, TrainedArtifact};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Confidence reported when the estimator has no probability output.
const DEFAULT_CONFIDENCE: f64 = 0.95;

/// How incoming feature values are matched to the training-time columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureMatching {
    /// Values are consumed in the order they arrive; only the count is
    /// checked against the stored feature list.
    #[default]
    Positional,
    /// Values are reordered by the stored training-time names; unknown or
    /// missing names are rejected.
    ByName,
}

/// A single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictedValue {
    Number(f64),
    /// Decoded class label
    Label(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub value: PredictedValue,
    /// Max class probability, or the fixed default when the model has no
    /// probability output
    pub confidence: f64,
    pub algorithm: String,
}

/// Stateless prediction service: loads the artifact per call and maps the
/// incoming features through the trained model.
#[derive(Debug, Clone, Default)]
pub struct PredictionService {
    matching: FeatureMatching,
}

impl PredictionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matching(matching: FeatureMatching) -> Self {
        Self { matching }
    }

    /// Predict from an artifact path and an ordered name-to-value mapping.
    pub fn predict(
        &self,
        artifact_path: &Path,
        features: &[(String, f64)],
    ) -> Result<PredictionResult> {
        let artifact = TrainedArtifact::load(artifact_path)?;
        let row = self.assemble_row(&artifact, features)?;
        let x = Array2::from_shape_vec((1, row.len()), row)
            .map_err(|e| DataFlowError::PredictionError(e.to_string()))?;

        let predicted = artifact
            .model
            .predict(&x)
            .map_err(|e| DataFlowError::PredictionError(e.to_string()))?[0];

        let confidence = match artifact.model.predict_proba(&x) {
            Some(proba) => {
                let proba = proba.map_err(|e| DataFlowError::PredictionError(e.to_string()))?;
                proba
                    .row(0)
                    .iter()
                    .copied()
                    .fold(f64::MIN, f64::max)
                    .clamp(0.0, 1.0)
            }
            None => DEFAULT_CONFIDENCE,
        };

        let value = self.decode(&artifact, predicted);
        info!(
            algorithm = %artifact.algorithm,
            confidence,
            "prediction served"
        );

        Ok(PredictionResult {
            value,
            confidence,
            algorithm: artifact.algorithm,
        })
    }

    /// Order the incoming values into the model's training-time feature
    /// layout.
    fn assemble_row(
        &self,
        artifact: &TrainedArtifact,
        features: &[(String, f64)],
    ) -> Result<Vec<f64>> {
        let expected = &artifact.feature_names;
        match self.matching {
            FeatureMatching::Positional => {
                if features.len() != expected.len() {
                    return Err(DataFlowError::PredictionError(format!(
                        "expected {} feature values, got {}",
                        expected.len(),
                        features.len()
                    )));
                }
                Ok(features.iter().map(|(_, v)| *v).collect())
            }
            FeatureMatching::ByName => {
                let mut by_name: HashMap<&str, f64> = HashMap::with_capacity(features.len());
                for (name, value) in features {
                    if !expected.iter().any(|e| e == name) {
                        return Err(DataFlowError::PredictionError(format!(
                            "unknown feature: {name}"
                        )));
                    }
                    by_name.insert(name.as_str(), *value);
                }
                expected
                    .iter()
                    .map(|name| {
                        by_name.get(name.as_str()).copied().ok_or_else(|| {
                            DataFlowError::PredictionError(format!("missing feature: {name}"))
                        })
                    })
                    .collect()
            }
        }
    }

    /// Map an encoded classification output back to its label when the
    /// artifact carries the class list.
    fn decode(&self, artifact: &TrainedArtifact, predicted: f64) -> PredictedValue {
        if artifact.problem_type == ProblemType::Classification {
            if let Some(labels) = &artifact.class_labels {
                let idx = predicted.round();
                if idx >= 0.0 && (idx as usize) < labels.len() {
                    return PredictedValue::Label(labels[idx as usize].clone());
                }
                debug!(predicted, "encoded prediction outside the stored class range");
            }
        }
        PredictedValue::Number(predicted)
    }
}
