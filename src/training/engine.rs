//! Training orchestrator
//!
//! Resolves the target, prepares a numeric feature matrix, splits the
//! rows, fits the requested algorithm, evaluates on the holdout, and
//! persists the artifact.

use super::{
    classification_metrics, detect_problem_type, regression_metrics, ArtifactStore,
    DecisionTree, EvaluationMetrics, Knn, LinearRegression, LogisticRegression, ModelKind,
    ProblemType, RandomForest, SvmClassifier, SvmRegressor, TrainedArtifact,
};
use crate::error::{DataFlowError, Result};
use crate::pipeline::{is_numeric_dtype, median_of, numeric_values, string_values};
use chrono::Local;
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::path::PathBuf;
use tracing::{info, warn};

const SPLIT_SEED: u64 = 42;
const FALLBACK_FOREST_TREES: usize = 100;
const FALLBACK_FOREST_SEED: u64 = 42;

const KNOWN_ALGORITHMS: &[&str] = &[
    "Random Forest",
    "Linear Regression",
    "Logistic Regression",
    "Decision Tree",
    "K-Nearest Neighbors",
    "SVM",
];

/// One training run to perform.
#[derive(Debug, Clone)]
pub struct TrainingRequest {
    pub user_id: String,
    pub dataset_id: String,
    pub algorithm: String,
    /// Train share in percent (holdout gets the rest)
    pub split_percent: u8,
    /// Target column; `None` selects the last header
    pub target_column: Option<String>,
}

impl TrainingRequest {
    pub fn new(
        user_id: impl Into<String>,
        dataset_id: impl Into<String>,
        algorithm: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            dataset_id: dataset_id.into(),
            algorithm: algorithm.into(),
            split_percent: 80,
            target_column: None,
        }
    }

    pub fn with_split_percent(mut self, percent: u8) -> Self {
        self.split_percent = percent;
        self
    }

    pub fn with_target_column(mut self, column: impl Into<String>) -> Self {
        self.target_column = Some(column.into());
        self
    }
}

/// Result of a successful training run.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub algorithm: String,
    pub problem_type: ProblemType,
    pub metrics: EvaluationMetrics,
    /// Headline percentage (accuracy or R², scaled by 100)
    pub accuracy_pct: f64,
    pub artifact_path: PathBuf,
    pub train_rows: usize,
    pub test_rows: usize,
    pub feature_names: Vec<String>,
    pub target_column: String,
}

/// Train one algorithm against a prepared-or-raw frame and persist the
/// artifact through `store`. Nothing is written when any step fails.
pub fn train(
    df: &DataFrame,
    request: &TrainingRequest,
    store: &ArtifactStore,
) -> Result<TrainingOutcome> {
    if !(1..=99).contains(&request.split_percent) {
        return Err(DataFlowError::DataError(format!(
            "split percent must be between 1 and 99, got {}",
            request.split_percent
        )));
    }
    if !KNOWN_ALGORITHMS.contains(&request.algorithm.as_str()) {
        return Err(DataFlowError::UnsupportedAlgorithm(request.algorithm.clone()));
    }

    let prepared = prepare(df, request.target_column.as_deref())?;

    let test_frac = (100 - request.split_percent) as f64 / 100.0;
    let (train_idx, test_idx) = train_test_split(prepared.x.nrows(), test_frac)?;

    let x_train = prepared.x.select(Axis(0), &train_idx);
    let y_train = Array1::from_iter(train_idx.iter().map(|&i| prepared.y[i]));
    let x_test = prepared.x.select(Axis(0), &test_idx);
    let y_test = Array1::from_iter(test_idx.iter().map(|&i| prepared.y[i]));

    let model = fit_model(&request.algorithm, prepared.problem_type, &x_train, &y_train)?;

    let y_pred = model.predict(&x_test)?;
    let metrics = match prepared.problem_type {
        ProblemType::Classification => classification_metrics(&y_test, &y_pred),
        ProblemType::Regression => regression_metrics(&y_test, &y_pred),
    };

    let artifact = TrainedArtifact {
        algorithm: request.algorithm.clone(),
        problem_type: prepared.problem_type,
        feature_names: prepared.feature_names.clone(),
        target_column: prepared.target_name.clone(),
        class_labels: prepared.class_labels.clone(),
        metrics: metrics.clone(),
        split_ratio: request.split_percent as f64 / 100.0,
        created_at: Local::now().to_rfc3339(),
        model,
    };
    let artifact_path = store.save(&artifact, &request.user_id, &request.dataset_id)?;

    info!(
        algorithm = %request.algorithm,
        problem_type = %prepared.problem_type,
        accuracy_pct = metrics.accuracy_pct(),
        "training complete"
    );

    Ok(TrainingOutcome {
        algorithm: request.algorithm.clone(),
        problem_type: prepared.problem_type,
        accuracy_pct: metrics.accuracy_pct(),
        metrics,
        artifact_path,
        train_rows: train_idx.len(),
        test_rows: test_idx.len(),
        feature_names: prepared.feature_names,
        target_column: prepared.target_name,
    })
}

/// Train several algorithms against one frame, isolating per-algorithm
/// failures. Independent fits run in parallel.
pub fn train_many(
    df: &DataFrame,
    request: &TrainingRequest,
    algorithms: &[String],
    store: &ArtifactStore,
) -> Vec<(String, Result<TrainingOutcome>)> {
    algorithms
        .par_iter()
        .map(|algorithm| {
            let mut req = request.clone();
            req.algorithm = algorithm.clone();
            (algorithm.clone(), train(df, &req, store))
        })
        .collect()
}

struct PreparedData {
    x: Array2<f64>,
    y: Array1<f64>,
    feature_names: Vec<String>,
    class_labels: Option<Vec<String>>,
    problem_type: ProblemType,
    target_name: String,
}

/// Resolve the target, drop rows with a missing target, and turn every
/// usable column into an f64 feature.
fn prepare(df: &DataFrame, target: Option<&str>) -> Result<PreparedData> {
    let headers: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let target_name = match target {
        Some(name) => {
            if !headers.iter().any(|h| h == name) {
                return Err(DataFlowError::ColumnNotFound(name.to_string()));
            }
            name.to_string()
        }
        None => headers
            .last()
            .cloned()
            .ok_or_else(|| DataFlowError::DataError("dataset has no columns".to_string()))?,
    };

    let target_col = df
        .column(&target_name)
        .map_err(|_| DataFlowError::ColumnNotFound(target_name.clone()))?;
    let mask = target_col.as_materialized_series().is_not_null();
    let df = df
        .filter(&mask)
        .map_err(|e| DataFlowError::DataError(e.to_string()))?;
    if df.height() == 0 {
        return Err(DataFlowError::DataError(
            "no rows with a target value".to_string(),
        ));
    }

    let target_col = df
        .column(&target_name)
        .map_err(|_| DataFlowError::ColumnNotFound(target_name.clone()))?;
    let problem_type = detect_problem_type(target_col)?;
    let (y, class_labels) = encode_target(target_col, problem_type)?;

    let mut feature_names = Vec::new();
    let mut feature_columns: Vec<Vec<f64>> = Vec::new();
    for name in &headers {
        if *name == target_name {
            continue;
        }
        let col = df
            .column(name)
            .map_err(|_| DataFlowError::ColumnNotFound(name.clone()))?;
        if let Some(values) = extract_feature(col)? {
            feature_names.push(name.clone());
            feature_columns.push(values);
        }
    }
    if feature_names.is_empty() {
        return Err(DataFlowError::NoUsableFeatures);
    }

    let n_rows = df.height();
    let mut x = Array2::zeros((n_rows, feature_columns.len()));
    for (j, column) in feature_columns.iter().enumerate() {
        for (i, v) in column.iter().enumerate() {
            x[[i, j]] = *v;
        }
    }

    Ok(PreparedData {
        x,
        y,
        feature_names,
        class_labels,
        problem_type,
        target_name,
    })
}

fn encode_target(col: &Column, problem_type: ProblemType) -> Result<(Array1<f64>, Option<Vec<String>>)> {
    if is_numeric_dtype(col.dtype()) {
        let values: Vec<f64> = numeric_values(col)?.into_iter().flatten().collect();
        return Ok((Array1::from_vec(values), None));
    }

    let values: Vec<String> = match col.dtype() {
        DataType::String => string_values(col)?.into_iter().flatten().collect(),
        DataType::Boolean => {
            let ca = col
                .as_materialized_series()
                .bool()
                .map_err(|e| DataFlowError::DataError(e.to_string()))?;
            ca.into_iter().flatten().map(|b| b.to_string()).collect()
        }
        other => {
            return Err(DataFlowError::DataError(format!(
                "unsupported target type {other}"
            )))
        }
    };

    let mut labels: Vec<String> = values.clone();
    labels.sort();
    labels.dedup();
    let encoded: Vec<f64> = values
        .iter()
        .map(|v| labels.iter().position(|l| l == v).unwrap_or(0) as f64)
        .collect();

    let class_labels = match problem_type {
        ProblemType::Classification => Some(labels),
        ProblemType::Regression => None,
    };
    Ok((Array1::from_vec(encoded), class_labels))
}

/// Turn one column into f64 feature values, or `None` when the column is
/// unusable. Text columns with any parseable number are coerced to
/// numeric; purely categorical text is label-encoded with missing values
/// treated as the `"Unknown"` category.
fn extract_feature(col: &Column) -> Result<Option<Vec<f64>>> {
    if is_numeric_dtype(col.dtype()) {
        return Ok(Some(impute_median(numeric_values(col)?)));
    }

    match col.dtype() {
        DataType::String => {
            let values = string_values(col)?;
            let parsed: Vec<Option<f64>> = values
                .iter()
                .map(|v| v.as_deref().and_then(|s| s.trim().parse::<f64>().ok()))
                .collect();
            if parsed.iter().any(|v| v.is_some()) {
                return Ok(Some(impute_median(parsed)));
            }

            let filled: Vec<String> = values
                .into_iter()
                .map(|v| v.unwrap_or_else(|| "Unknown".to_string()))
                .collect();
            let mut labels = filled.clone();
            labels.sort();
            labels.dedup();
            let encoded: Vec<f64> = filled
                .iter()
                .map(|v| labels.iter().position(|l| l == v).unwrap_or(0) as f64)
                .collect();
            Ok(Some(encoded))
        }
        DataType::Boolean => {
            let ca = col
                .as_materialized_series()
                .bool()
                .map_err(|e| DataFlowError::DataError(e.to_string()))?;
            Ok(Some(
                ca.into_iter()
                    .map(|v| v.map_or(0.0, |b| if b { 1.0 } else { 0.0 }))
                    .collect(),
            ))
        }
        DataType::Date | DataType::Datetime(_, _) => {
            let millis = col
                .as_materialized_series()
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
                .and_then(|s| s.cast(&DataType::Float64))
                .map_err(|e| DataFlowError::DataError(e.to_string()))?;
            let ca = millis
                .f64()
                .map_err(|e| DataFlowError::DataError(e.to_string()))?;
            Ok(Some(impute_median(ca.into_iter().collect())))
        }
        _ => Ok(None),
    }
}

fn impute_median(values: Vec<Option<f64>>) -> Vec<f64> {
    let present: Vec<f64> = values.iter().filter_map(|v| *v).collect();
    let median = median_of(&present).unwrap_or(0.0);
    values.into_iter().map(|v| v.unwrap_or(median)).collect()
}

/// Seeded Fisher-Yates shuffle; the first `ceil(n * test_frac)` shuffled
/// indices form the holdout.
fn train_test_split(n: usize, test_frac: f64) -> Result<(Vec<usize>, Vec<usize>)> {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(SPLIT_SEED);
    for i in (1..n).rev() {
        let j = rng.gen_range(0..=i);
        indices.swap(i, j);
    }

    let test_n = (n as f64 * test_frac).ceil() as usize;
    if test_n >= n {
        return Err(DataFlowError::DataError(format!(
            "not enough rows to split: {n} rows with a {test_frac:.2} holdout"
        )));
    }
    let (test, train) = indices.split_at(test_n);
    Ok((train.to_vec(), test.to_vec()))
}

/// Instantiate and fit the registry entry for `algorithm`, falling back
/// to a random forest when the requested algorithm has no variant for the
/// detected problem type.
fn fit_model(
    algorithm: &str,
    problem_type: ProblemType,
    x: &Array2<f64>,
    y: &Array1<f64>,
) -> Result<ModelKind> {
    let classification = problem_type == ProblemType::Classification;

    match (algorithm, classification) {
        ("Random Forest", true) => {
            let mut model = RandomForest::new_classifier(FALLBACK_FOREST_TREES, FALLBACK_FOREST_SEED);
            model.fit(x, y)?;
            Ok(ModelKind::RandomForest(model))
        }
        ("Random Forest", false) => {
            let mut model = RandomForest::new_regressor(FALLBACK_FOREST_TREES, FALLBACK_FOREST_SEED);
            model.fit(x, y)?;
            Ok(ModelKind::RandomForest(model))
        }
        ("Linear Regression", false) => {
            let mut model = LinearRegression::new();
            model.fit(x, y)?;
            Ok(ModelKind::LinearRegression(model))
        }
        ("Logistic Regression", true) => {
            let mut model = LogisticRegression::new();
            model.fit(x, y)?;
            Ok(ModelKind::LogisticRegression(model))
        }
        ("Decision Tree", true) => {
            let mut model = DecisionTree::new_classifier();
            model.fit(x, y)?;
            Ok(ModelKind::DecisionTree(model))
        }
        ("Decision Tree", false) => {
            let mut model = DecisionTree::new_regressor();
            model.fit(x, y)?;
            Ok(ModelKind::DecisionTree(model))
        }
        ("K-Nearest Neighbors", _) => {
            let mut model = if classification {
                Knn::new_classifier(5)
            } else {
                Knn::new_regressor(5)
            };
            model.fit(x, y)?;
            Ok(ModelKind::Knn(model))
        }
        ("SVM", true) => {
            let mut model = SvmClassifier::new();
            model.fit(x, y)?;
            Ok(ModelKind::SvmClassifier(model))
        }
        ("SVM", false) => {
            let mut model = SvmRegressor::new();
            model.fit(x, y)?;
            Ok(ModelKind::SvmRegressor(model))
        }
        // no variant for this problem type
        (_, _) => {
            warn!(
                algorithm,
                problem_type = %problem_type,
                "algorithm has no variant for this problem type, using random forest"
            );
            let mut model = if classification {
                RandomForest::new_classifier(FALLBACK_FOREST_TREES, FALLBACK_FOREST_SEED)
            } else {
                RandomForest::new_regressor(FALLBACK_FOREST_TREES, FALLBACK_FOREST_SEED)
            };
            model.fit(x, y)?;
            Ok(ModelKind::RandomForest(model))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        (dir, store)
    }

    fn numeric_frame(rows: usize) -> DataFrame {
        let a: Vec<f64> = (0..rows).map(|i| i as f64).collect();
        let b: Vec<f64> = (0..rows).map(|i| (i * i) as f64 * 0.1).collect();
        let y: Vec<f64> = (0..rows).map(|i| 2.0 * i as f64 + 1.0).collect();
        df!("a" => &a, "b" => &b, "y" => &y).unwrap()
    }

    #[test]
    fn test_split_sizes() {
        let (train, test) = train_test_split(100, 0.2).unwrap();
        assert_eq!(test.len(), 20);
        assert_eq!(train.len(), 80);

        let mut all: Vec<usize> = train.iter().chain(test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_deterministic() {
        assert_eq!(train_test_split(50, 0.3).unwrap(), train_test_split(50, 0.3).unwrap());
    }

    #[test]
    fn test_unsupported_algorithm_writes_nothing() {
        let (dir, store) = store();
        let df = numeric_frame(30);
        let request = TrainingRequest::new("u", "d", "Gradient Boosting");

        let result = train(&df, &request, &store);
        assert!(matches!(result, Err(DataFlowError::UnsupportedAlgorithm(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_last_column_is_default_target() {
        let (_dir, store) = store();
        let df = numeric_frame(40);
        let request = TrainingRequest::new("u", "d", "Linear Regression");

        let outcome = train(&df, &request, &store).unwrap();
        assert_eq!(outcome.target_column, "y");
        assert_eq!(outcome.feature_names, vec!["a", "b"]);
    }

    #[test]
    fn test_explicit_target_column() {
        let (_dir, store) = store();
        let df = numeric_frame(40);
        let request =
            TrainingRequest::new("u", "d", "Linear Regression").with_target_column("a");

        let outcome = train(&df, &request, &store).unwrap();
        assert_eq!(outcome.target_column, "a");
        assert!(outcome.feature_names.contains(&"y".to_string()));
    }

    #[test]
    fn test_missing_explicit_target() {
        let (_dir, store) = store();
        let df = numeric_frame(20);
        let request =
            TrainingRequest::new("u", "d", "Linear Regression").with_target_column("nope");
        assert!(matches!(
            train(&df, &request, &store),
            Err(DataFlowError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_regression_fallback_for_logistic() {
        let (_dir, store) = store();
        let df = numeric_frame(40);
        let request = TrainingRequest::new("u", "d", "Logistic Regression");

        let outcome = train(&df, &request, &store).unwrap();
        assert_eq!(outcome.problem_type, ProblemType::Regression);
        // requested name is kept even though a forest was trained
        assert_eq!(outcome.algorithm, "Logistic Regression");

        let artifact = store.load(&outcome.artifact_path).unwrap();
        assert!(matches!(artifact.model, ModelKind::RandomForest(_)));
    }

    #[test]
    fn test_text_feature_coercion_and_encoding() {
        let heights: Vec<String> = (0..30).map(|i| format!("{}", 150 + i)).collect();
        let cities: Vec<&str> = (0..30)
            .map(|i| if i % 2 == 0 { "Lyon" } else { "Paris" })
            .collect();
        let y: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let df = df!("height" => &heights, "city" => &cities, "y" => &y).unwrap();

        let prepared = prepare(&df, None).unwrap();
        assert_eq!(prepared.feature_names, vec!["height", "city"]);
        // the height strings were coerced to their numeric values
        assert!((prepared.x[[0, 0]] - 150.0).abs() < 1e-9);
        // Lyon sorts before Paris
        assert!((prepared.x[[0, 1]] - 0.0).abs() < 1e-9);
        assert!((prepared.x[[1, 1]] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_rows_with_missing_target_dropped() {
        let df = df!(
            "a" => &[1.0, 2.0, 3.0, 4.0],
            "y" => &[Some(1.0), None, Some(3.0), Some(4.0)],
        )
        .unwrap();

        let prepared = prepare(&df, None).unwrap();
        assert_eq!(prepared.x.nrows(), 3);
        assert_eq!(prepared.y.len(), 3);
    }

    #[test]
    fn test_no_usable_features() {
        let df = df!("y" => &[1.0, 2.0, 3.0]).unwrap();
        assert!(matches!(
            prepare(&df, None),
            Err(DataFlowError::NoUsableFeatures)
        ));
    }

    #[test]
    fn test_text_target_gets_class_labels() {
        let labels: Vec<&str> = (0..30)
            .map(|i| if i % 2 == 0 { "no" } else { "yes" })
            .collect();
        let a: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let df = df!("a" => &a, "label" => &labels).unwrap();

        let prepared = prepare(&df, None).unwrap();
        assert_eq!(prepared.problem_type, ProblemType::Classification);
        assert_eq!(
            prepared.class_labels,
            Some(vec!["no".to_string(), "yes".to_string()])
        );
        assert_eq!(prepared.y[0], 0.0);
        assert_eq!(prepared.y[1], 1.0);
    }

    #[test]
    fn test_train_many_isolates_failures() {
        let (_dir, store) = store();
        let df = numeric_frame(40);
        let request = TrainingRequest::new("u", "d", "");
        let algorithms = vec![
            "Linear Regression".to_string(),
            "Quantum Boost".to_string(),
            "Decision Tree".to_string(),
        ];

        let results = train_many(&df, &request, &algorithms, &store);
        assert_eq!(results.len(), 3);

        let by_name = |name: &str| {
            results
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, r)| r)
                .unwrap()
        };
        assert!(by_name("Linear Regression").is_ok());
        assert!(matches!(
            by_name("Quantum Boost"),
            Err(DataFlowError::UnsupportedAlgorithm(_))
        ));
        assert!(by_name("Decision Tree").is_ok());

        let path_a = by_name("Linear Regression").as_ref().unwrap().artifact_path.clone();
        let path_b = by_name("Decision Tree").as_ref().unwrap().artifact_path.clone();
        assert_ne!(path_a, path_b);
    }
}
