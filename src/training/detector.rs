//! Problem-type detection

use super::ProblemType;
use crate::error::{DataFlowError, Result};
use crate::pipeline::{is_numeric_dtype, numeric_values, string_values};
use polars::prelude::*;
use std::collections::HashSet;
use tracing::debug;

/// Text targets with at most this many distinct values are treated as
/// class labels; above it the column is assumed to be free-form and the
/// task falls through to regression.
const MAX_TEXT_CLASSES: usize = 20;
/// A numeric target is categorical when its distinct-to-total ratio is
/// strictly below this; the boundary itself is regression.
const NUMERIC_DISTINCT_RATIO: f64 = 0.1;

/// Infer whether a target column describes a classification or regression
/// task. Pure function of the column's values and the row count.
pub fn detect_problem_type(target: &Column) -> Result<ProblemType> {
    let total_rows = target.len();

    let detected = if is_numeric_dtype(target.dtype()) {
        let values = numeric_values(target)?;
        let distinct: HashSet<u64> = values
            .iter()
            .flatten()
            .map(|v| v.to_bits())
            .collect();
        let ratio = if total_rows == 0 {
            1.0
        } else {
            distinct.len() as f64 / total_rows as f64
        };
        if ratio < NUMERIC_DISTINCT_RATIO {
            ProblemType::Classification
        } else {
            ProblemType::Regression
        }
    } else {
        let distinct = match target.dtype() {
            DataType::String => string_values(target)?
                .into_iter()
                .flatten()
                .collect::<HashSet<String>>()
                .len(),
            DataType::Boolean => {
                let ca = target
                    .as_materialized_series()
                    .bool()
                    .map_err(|e| DataFlowError::DataError(e.to_string()))?;
                ca.into_iter().flatten().collect::<HashSet<bool>>().len()
            }
            other => {
                return Err(DataFlowError::DataError(format!(
                    "cannot detect problem type for target of type {other}"
                )))
            }
        };
        if distinct <= MAX_TEXT_CLASSES {
            ProblemType::Classification
        } else {
            ProblemType::Regression
        }
    };

    debug!(target = %target.name(), problem_type = %detected, "detected problem type");
    Ok(detected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_target_few_classes() {
        let df = df!("label" => &["yes", "no", "yes", "no"]).unwrap();
        let kind = detect_problem_type(df.column("label").unwrap()).unwrap();
        assert_eq!(kind, ProblemType::Classification);
    }

    #[test]
    fn test_text_target_many_distinct_values() {
        let values: Vec<String> = (0..25).map(|i| format!("name_{i}")).collect();
        let df = df!("label" => &values).unwrap();
        let kind = detect_problem_type(df.column("label").unwrap()).unwrap();
        assert_eq!(kind, ProblemType::Regression);
    }

    #[test]
    fn test_numeric_low_cardinality() {
        // 3 distinct over 100 rows, ratio 0.03
        let values: Vec<f64> = (0..100).map(|i| (i % 3) as f64).collect();
        let df = df!("y" => &values).unwrap();
        let kind = detect_problem_type(df.column("y").unwrap()).unwrap();
        assert_eq!(kind, ProblemType::Classification);
    }

    #[test]
    fn test_numeric_continuous() {
        let values: Vec<f64> = (0..50).map(|i| i as f64 * 1.7).collect();
        let df = df!("y" => &values).unwrap();
        let kind = detect_problem_type(df.column("y").unwrap()).unwrap();
        assert_eq!(kind, ProblemType::Regression);
    }

    #[test]
    fn test_ratio_exactly_ten_percent_is_regression() {
        // 10 distinct over 100 rows
        let values: Vec<f64> = (0..100).map(|i| (i % 10) as f64).collect();
        let df = df!("y" => &values).unwrap();
        let kind = detect_problem_type(df.column("y").unwrap()).unwrap();
        assert_eq!(kind, ProblemType::Regression);
    }

    #[test]
    fn test_bool_target() {
        let df = df!("flag" => &[true, false, true]).unwrap();
        let kind = detect_problem_type(df.column("flag").unwrap()).unwrap();
        assert_eq!(kind, ProblemType::Classification);
    }
}
