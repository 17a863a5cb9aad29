//! Data preparation pipeline
//!
//! Three additive stages over a loaded table: header/type standardization,
//! cleaning (deduplication, imputation, outlier winsorization), and feature
//! engineering. Each stage is a pure function of its input frame; the
//! file-level entry points re-read the source so stages stay independent of
//! any prior in-memory state.

mod clean;
mod features;
mod standardize;

pub use clean::{clean, CleaningReport, MissingStats};
pub use features::{engineer_features, FeatureReport};
pub use standardize::{standardize, StandardizeReport};

use crate::dataset::{DatasetLoader, FileKind};
use crate::error::{DataFlowError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Standardize a source file from scratch.
pub fn standardize_file(path: &Path, kind: FileKind) -> Result<(DataFrame, StandardizeReport)> {
    let (df, _) = DatasetLoader::new().load(path, kind)?;
    standardize(&df)
}

/// Clean a source file from scratch.
pub fn clean_file(path: &Path, kind: FileKind) -> Result<(DataFrame, CleaningReport)> {
    let (df, _) = DatasetLoader::new().load(path, kind)?;
    clean(&df)
}

/// Engineer features for a source file from scratch.
pub fn engineer_file(path: &Path, kind: FileKind) -> Result<(DataFrame, FeatureReport)> {
    let (df, _) = DatasetLoader::new().load(path, kind)?;
    engineer_features(&df)
}

/// Semantic kind of a column as the preparation stages see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Datetime,
    Other,
}

/// Per-column profile: semantic kind, missing count, and quartiles for
/// numeric columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    pub kind: ColumnKind,
    pub missing_count: usize,
    /// (Q1, median, Q3) over non-missing values; numeric columns only
    pub quartiles: Option<(f64, f64, f64)>,
}

/// Profile every column of a frame.
pub fn summarize_columns(df: &DataFrame) -> Result<Vec<ColumnSummary>> {
    let mut summaries = Vec::with_capacity(df.width());
    for col in df.get_columns() {
        let kind = match col.dtype() {
            dt if is_numeric_dtype(dt) => ColumnKind::Numeric,
            DataType::String | DataType::Boolean => ColumnKind::Categorical,
            DataType::Date | DataType::Datetime(_, _) => ColumnKind::Datetime,
            _ => ColumnKind::Other,
        };

        let quartiles = if kind == ColumnKind::Numeric {
            let mut values: Vec<f64> = numeric_values(col)?.into_iter().flatten().collect();
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            match (
                quantile_sorted(&values, 0.25),
                quantile_sorted(&values, 0.5),
                quantile_sorted(&values, 0.75),
            ) {
                (Some(q1), Some(q2), Some(q3)) => Some((q1, q2, q3)),
                _ => None,
            }
        } else {
            None
        };

        summaries.push(ColumnSummary {
            name: col.name().to_string(),
            kind,
            missing_count: col.as_materialized_series().null_count(),
            quartiles,
        });
    }
    Ok(summaries)
}

pub(crate) fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Column values as f64 with nulls preserved.
pub(crate) fn numeric_values(col: &Column) -> Result<Vec<Option<f64>>> {
    let casted = col
        .as_materialized_series()
        .cast(&DataType::Float64)
        .map_err(|e| DataFlowError::DataError(e.to_string()))?;
    let ca = casted
        .f64()
        .map_err(|e| DataFlowError::DataError(e.to_string()))?;
    Ok(ca.into_iter().collect())
}

/// String column values with nulls preserved.
pub(crate) fn string_values(col: &Column) -> Result<Vec<Option<String>>> {
    let ca = col
        .as_materialized_series()
        .str()
        .map_err(|e| DataFlowError::DataError(e.to_string()))?;
    Ok(ca.into_iter().map(|v| v.map(|s| s.to_string())).collect())
}

/// Linear-interpolated quantile over an ascending-sorted slice.
pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    if sorted.len() == 1 {
        return Some(sorted[0]);
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = pos - lo as f64;
    Some(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}

pub(crate) fn median_of(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    quantile_sorted(&sorted, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_quantile_interpolation() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(quantile_sorted(&values, 0.25).unwrap(), 1.75);
        assert_relative_eq!(quantile_sorted(&values, 0.5).unwrap(), 2.5);
        assert_relative_eq!(quantile_sorted(&values, 0.75).unwrap(), 3.25);
        assert_relative_eq!(quantile_sorted(&values, 1.0).unwrap(), 4.0);
    }

    #[test]
    fn test_quantile_edge_cases() {
        assert!(quantile_sorted(&[], 0.5).is_none());
        assert_relative_eq!(quantile_sorted(&[7.0], 0.25).unwrap(), 7.0);
    }

    #[test]
    fn test_median() {
        assert_relative_eq!(median_of(&[3.0, 1.0, 2.0]).unwrap(), 2.0);
        assert_relative_eq!(median_of(&[4.0, 1.0, 3.0, 2.0]).unwrap(), 2.5);
        assert!(median_of(&[]).is_none());
    }

    #[test]
    fn test_summarize_columns() {
        let df = df!(
            "age" => &[Some(1.0), Some(2.0), Some(3.0), None],
            "city" => &["a", "b", "c", "d"],
        )
        .unwrap();

        let summaries = summarize_columns(&df).unwrap();
        assert_eq!(summaries.len(), 2);

        let age = &summaries[0];
        assert_eq!(age.name, "age");
        assert_eq!(age.kind, ColumnKind::Numeric);
        assert_eq!(age.missing_count, 1);
        let (q1, q2, q3) = age.quartiles.unwrap();
        assert_relative_eq!(q1, 1.5);
        assert_relative_eq!(q2, 2.0);
        assert_relative_eq!(q3, 2.5);

        let city = &summaries[1];
        assert_eq!(city.kind, ColumnKind::Categorical);
        assert_eq!(city.missing_count, 0);
        assert!(city.quartiles.is_none());
    }
}
