//! Trained-model artifacts and their on-disk store

use super::{EvaluationMetrics, ModelKind, ProblemType};
use crate::error::{DataFlowError, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Everything needed to serve predictions from a finished training run.
///
/// Written once per (user, dataset, algorithm, timestamp); never mutated
/// or overwritten afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedArtifact {
    pub algorithm: String,
    pub problem_type: ProblemType,
    /// Feature column names in training order
    pub feature_names: Vec<String>,
    pub target_column: String,
    /// Original class labels, index-aligned with the encoded target.
    /// `None` for regression or an already-numeric target.
    pub class_labels: Option<Vec<String>>,
    pub metrics: EvaluationMetrics,
    /// Train fraction used for the holdout split
    pub split_ratio: f64,
    /// RFC3339 creation time
    pub created_at: String,
    pub model: ModelKind,
}

impl TrainedArtifact {
    /// Load an artifact from an arbitrary path.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(DataFlowError::ArtifactNotFound(path.display().to_string()));
        }
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| DataFlowError::PredictionError(format!("undecodable artifact: {e}")))
    }
}

/// Directory-backed artifact storage, passed explicitly to the trainer.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist an artifact under
    /// `model_{user}_{dataset}_{Algorithm}_{timestamp}.json`, suffixing a
    /// counter when a same-second sibling already exists.
    pub fn save(
        &self,
        artifact: &TrainedArtifact,
        user_id: &str,
        dataset_id: &str,
    ) -> Result<PathBuf> {
        let algo_tag = artifact.algorithm.replace(' ', "_");
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let stem = format!("model_{user_id}_{dataset_id}_{algo_tag}_{timestamp}");

        let mut path = self.root.join(format!("{stem}.json"));
        let mut counter = 1;
        while path.exists() {
            path = self.root.join(format!("{stem}_{counter}.json"));
            counter += 1;
        }

        let json = serde_json::to_vec_pretty(artifact)?;
        fs::write(&path, json)?;
        info!(path = %path.display(), algorithm = %artifact.algorithm, "artifact saved");
        Ok(path)
    }

    pub fn load(&self, path: &Path) -> Result<TrainedArtifact> {
        TrainedArtifact::load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::LinearRegression;
    use ndarray::{array, Array1, Array2};

    fn fitted_artifact() -> TrainedArtifact {
        let x: Array2<f64> = array![[1.0], [2.0], [3.0]];
        let y: Array1<f64> = array![2.0, 4.0, 6.0];
        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();

        TrainedArtifact {
            algorithm: "Linear Regression".to_string(),
            problem_type: ProblemType::Regression,
            feature_names: vec!["x".to_string()],
            target_column: "y".to_string(),
            class_labels: None,
            metrics: EvaluationMetrics::Regression {
                r2: 1.0,
                mse: 0.0,
                mae: 0.0,
                rmse: 0.0,
            },
            split_ratio: 0.8,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            model: ModelKind::LinearRegression(model),
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();

        let artifact = fitted_artifact();
        let path = store.save(&artifact, "alice", "sales").unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("model_alice_sales_Linear_Regression_"));

        let loaded = store.load(&path).unwrap();
        assert_eq!(loaded.algorithm, artifact.algorithm);
        assert_eq!(loaded.feature_names, artifact.feature_names);

        let pred = loaded.model.predict(&array![[5.0]]).unwrap();
        assert!((pred[0] - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_same_second_saves_get_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();

        let artifact = fitted_artifact();
        let first = store.save(&artifact, "u", "d").unwrap();
        let second = store.save(&artifact, "u", "d").unwrap();
        let third = store.save(&artifact, "u", "d").unwrap();

        assert_ne!(first, second);
        assert_ne!(second, third);
        assert!(first.exists() && second.exists() && third.exists());
    }

    #[test]
    fn test_load_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let result = store.load(&dir.path().join("nope.json"));
        assert!(matches!(result, Err(DataFlowError::ArtifactNotFound(_))));
    }

    #[test]
    fn test_load_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"not json").unwrap();

        let result = TrainedArtifact::load(&path);
        assert!(matches!(result, Err(DataFlowError::PredictionError(_))));
    }
}
