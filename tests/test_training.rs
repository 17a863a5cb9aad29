//! Integration test: training pipeline end-to-end

use dataflow_automl::error::DataFlowError;
use dataflow_automl::training::{
    train, train_many, ArtifactStore, EvaluationMetrics, ProblemType, TrainingRequest,
};
use polars::prelude::*;

/// 100 rows, two informative numeric features, a text label.
fn classification_df() -> DataFrame {
    let f1: Vec<f64> = (0..100)
        .map(|i| if i < 50 { i as f64 * 0.1 } else { 20.0 + i as f64 * 0.1 })
        .collect();
    let f2: Vec<f64> = (0..100)
        .map(|i| if i < 50 { 5.0 - i as f64 * 0.05 } else { -10.0 + i as f64 * 0.05 })
        .collect();
    let label: Vec<&str> = (0..100)
        .map(|i| if i < 50 { "low" } else { "high" })
        .collect();
    df!("f1" => &f1, "f2" => &f2, "label" => &label).unwrap()
}

fn regression_df() -> DataFrame {
    let x1: Vec<f64> = (0..60).map(|i| i as f64).collect();
    let x2: Vec<f64> = (0..60).map(|i| (i % 7) as f64).collect();
    let y: Vec<f64> = (0..60).map(|i| 3.0 * i as f64 + (i % 7) as f64 + 1.0).collect();
    df!("x1" => &x1, "x2" => &x2, "y" => &y).unwrap()
}

fn store() -> (tempfile::TempDir, ArtifactStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path().join("models")).unwrap();
    (dir, store)
}

#[test]
fn test_decision_tree_classification_end_to_end() {
    let (_dir, store) = store();
    let df = classification_df();
    let request = TrainingRequest::new("alice", "sensors", "Decision Tree");

    let outcome = train(&df, &request, &store).unwrap();

    assert_eq!(outcome.problem_type, ProblemType::Classification);
    // 80/20 split of 100 rows
    assert_eq!(outcome.train_rows, 80);
    assert_eq!(outcome.test_rows, 20);

    let EvaluationMetrics::Classification {
        accuracy,
        precision,
        recall,
        f1,
    } = outcome.metrics
    else {
        panic!("expected classification metrics");
    };
    for v in [accuracy, precision, recall, f1] {
        assert!((0.0..=1.0).contains(&v), "metric out of range: {v}");
    }
    // clean separation, the tree should nail the holdout
    assert!(accuracy > 0.9);
    assert!(outcome.artifact_path.is_file());
}

#[test]
fn test_each_registered_algorithm_classification() {
    let (_dir, store) = store();
    let df = classification_df();

    for algorithm in [
        "Random Forest",
        "Logistic Regression",
        "Decision Tree",
        "K-Nearest Neighbors",
        "SVM",
    ] {
        let request = TrainingRequest::new("u", "d", algorithm);
        let outcome = train(&df, &request, &store)
            .unwrap_or_else(|e| panic!("{algorithm} failed: {e}"));
        assert_eq!(outcome.algorithm, algorithm);
        assert!(outcome.artifact_path.is_file());
    }
}

#[test]
fn test_each_registered_algorithm_regression() {
    let (_dir, store) = store();
    let df = regression_df();

    for algorithm in [
        "Random Forest",
        "Linear Regression",
        "Decision Tree",
        "K-Nearest Neighbors",
        "SVM",
    ] {
        let request = TrainingRequest::new("u", "d", algorithm);
        let outcome = train(&df, &request, &store)
            .unwrap_or_else(|e| panic!("{algorithm} failed: {e}"));
        assert_eq!(outcome.problem_type, ProblemType::Regression);

        let EvaluationMetrics::Regression { mse, rmse, mae, .. } = outcome.metrics else {
            panic!("expected regression metrics");
        };
        assert!(mse >= 0.0 && rmse >= 0.0 && mae >= 0.0);
    }
}

#[test]
fn test_linear_regression_recovers_line() {
    let (_dir, store) = store();
    let df = regression_df();
    let request = TrainingRequest::new("u", "d", "Linear Regression");

    let outcome = train(&df, &request, &store).unwrap();
    let EvaluationMetrics::Regression { r2, .. } = outcome.metrics else {
        panic!("expected regression metrics");
    };
    // exact linear relationship
    assert!(r2 > 0.99, "r2 was {r2}");
    assert!((outcome.accuracy_pct - r2 * 100.0).abs() < 1e-9);
}

#[test]
fn test_unsupported_algorithm_leaves_no_artifact() {
    let (dir, _) = store();
    let store = ArtifactStore::new(dir.path().join("empty")).unwrap();
    let df = classification_df();
    let request = TrainingRequest::new("u", "d", "AutoGluon");

    let result = train(&df, &request, &store);
    assert!(matches!(result, Err(DataFlowError::UnsupportedAlgorithm(_))));
    assert_eq!(std::fs::read_dir(store.root()).unwrap().count(), 0);
}

#[test]
fn test_train_many_parallel_batch() {
    let (_dir, store) = store();
    let df = classification_df();
    let request = TrainingRequest::new("u", "d", "");
    let algorithms: Vec<String> = [
        "Random Forest",
        "Decision Tree",
        "K-Nearest Neighbors",
        "Nonexistent Model",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let results = train_many(&df, &request, &algorithms, &store);
    assert_eq!(results.len(), 4);

    let ok_paths: Vec<_> = results
        .iter()
        .filter_map(|(_, r)| r.as_ref().ok())
        .map(|o| o.artifact_path.clone())
        .collect();
    assert_eq!(ok_paths.len(), 3);

    // every successful run got its own artifact file
    let mut unique = ok_paths.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 3);

    let failed = results
        .iter()
        .find(|(name, _)| name == "Nonexistent Model")
        .unwrap();
    assert!(matches!(
        failed.1,
        Err(DataFlowError::UnsupportedAlgorithm(_))
    ));
}

#[test]
fn test_custom_split_percent() {
    let (_dir, store) = store();
    let df = classification_df();
    let request = TrainingRequest::new("u", "d", "Decision Tree").with_split_percent(70);

    let outcome = train(&df, &request, &store).unwrap();
    assert_eq!(outcome.test_rows, 30);
    assert_eq!(outcome.train_rows, 70);
}

#[test]
fn test_split_is_reproducible_across_runs() {
    let (_dir, store) = store();
    let df = regression_df();
    let request = TrainingRequest::new("u", "d", "Linear Regression");

    let first = train(&df, &request, &store).unwrap();
    let second = train(&df, &request, &store).unwrap();

    let (EvaluationMetrics::Regression { r2: a, .. }, EvaluationMetrics::Regression { r2: b, .. }) =
        (first.metrics, second.metrics)
    else {
        panic!("expected regression metrics");
    };
    assert_eq!(a, b);
}

#[test]
fn test_artifact_records_run_metadata() {
    let (_dir, store) = store();
    let df = classification_df();
    let request = TrainingRequest::new("bob", "churn", "Random Forest");

    let outcome = train(&df, &request, &store).unwrap();
    let artifact = store.load(&outcome.artifact_path).unwrap();

    assert_eq!(artifact.algorithm, "Random Forest");
    assert_eq!(artifact.problem_type, ProblemType::Classification);
    assert_eq!(artifact.feature_names, vec!["f1", "f2"]);
    assert_eq!(artifact.target_column, "label");
    assert_eq!(
        artifact.class_labels,
        Some(vec!["high".to_string(), "low".to_string()])
    );
    assert!((artifact.split_ratio - 0.8).abs() < 1e-9);
    assert!(!artifact.created_at.is_empty());
}
