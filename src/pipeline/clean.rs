//! Cleaning stage: deduplication, imputation, outlier winsorization

use super::{
    is_numeric_dtype, median_of, numeric_values, quantile_sorted, string_values,
    summarize_columns,
};
use crate::dataset::sample_records;
use crate::error::{DataFlowError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use tracing::{debug, info};

const IQR_FACTOR: f64 = 1.5;

/// Missing-value stats for one column, measured after deduplication and
/// before imputation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingStats {
    pub count: usize,
    pub percentage: f64,
}

/// Outcome report of the cleaning stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningReport {
    pub original_rows: usize,
    pub cleaned_rows: usize,
    pub duplicates_removed: usize,
    /// Columns that had missing values, with pre-imputation counts
    pub missing_values: BTreeMap<String, MissingStats>,
    /// Numeric columns to count of values clipped to the IQR fences
    pub outliers_handled: BTreeMap<String, usize>,
    /// Up to 10 head rows of the cleaned frame as JSON records
    pub sample_data: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Clean a frame: drop exact duplicate rows (first kept, order preserved),
/// impute missing values (numeric median; text mode with `"Unknown"`
/// fallback; boolean and date columns take their mode), then winsorize
/// numeric columns to their IQR fences.
///
/// Data content never fails this stage.
pub fn clean(df: &DataFrame) -> Result<(DataFrame, CleaningReport)> {
    let original_rows = df.height();

    let mut out = drop_duplicate_rows(df)?;
    let duplicates_removed = original_rows - out.height();

    // Missing stats are measured on the deduplicated frame so imputation
    // statistics and the report agree on the same rows.
    let mut missing_values = BTreeMap::new();
    let row_count = out.height();
    for summary in summarize_columns(&out)? {
        if summary.missing_count > 0 {
            missing_values.insert(
                summary.name,
                MissingStats {
                    count: summary.missing_count,
                    percentage: if row_count == 0 {
                        0.0
                    } else {
                        summary.missing_count as f64 / row_count as f64 * 100.0
                    },
                },
            );
        }
    }

    impute_missing(&mut out)?;
    let outliers_handled = winsorize_numeric(&mut out)?;

    let report = CleaningReport {
        original_rows,
        cleaned_rows: out.height(),
        duplicates_removed,
        missing_values,
        outliers_handled,
        sample_data: sample_records(&out, 10),
    };

    info!(
        original_rows,
        cleaned_rows = report.cleaned_rows,
        duplicates_removed,
        "cleaning complete"
    );

    Ok((out, report))
}

/// Remove exact full-row duplicates, keeping the first occurrence.
fn drop_duplicate_rows(df: &DataFrame) -> Result<DataFrame> {
    let mut seen = HashSet::with_capacity(df.height());
    let mut keep = Vec::with_capacity(df.height());

    for row_idx in 0..df.height() {
        let mut key = String::new();
        for col in df.get_columns() {
            let av = col
                .as_materialized_series()
                .get(row_idx)
                .map_err(|e| DataFlowError::DataError(e.to_string()))?;
            // unit separator keeps ("ab","c") distinct from ("a","bc")
            let _ = write!(key, "{av:?}\u{1f}");
        }
        keep.push(seen.insert(key));
    }

    let mask = BooleanChunked::from_slice("keep".into(), &keep);
    df.filter(&mask)
        .map_err(|e| DataFlowError::DataError(e.to_string()))
}

fn impute_missing(df: &mut DataFrame) -> Result<()> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    for name in names {
        let col = df
            .column(&name)
            .map_err(|_| DataFlowError::ColumnNotFound(name.clone()))?;
        if col.as_materialized_series().null_count() == 0 {
            continue;
        }

        if is_numeric_dtype(col.dtype()) {
            let values = numeric_values(col)?;
            let present: Vec<f64> = values.iter().filter_map(|v| *v).collect();
            let Some(median) = median_of(&present) else {
                continue;
            };
            let filled: Vec<f64> = values.into_iter().map(|v| v.unwrap_or(median)).collect();
            debug!(column = %name, median, "imputed numeric column with median");
            df.replace(&name, Series::new(name.as_str().into(), filled))
                .map_err(|e| DataFlowError::DataError(e.to_string()))?;
        } else if col.dtype() == &DataType::String {
            let values = string_values(col)?;
            let fill = mode_of(&values).unwrap_or_else(|| "Unknown".to_string());
            let filled: Vec<String> = values
                .into_iter()
                .map(|v| v.unwrap_or_else(|| fill.clone()))
                .collect();
            debug!(column = %name, fill = %fill, "imputed categorical column with mode");
            df.replace(&name, Series::new(name.as_str().into(), filled))
                .map_err(|e| DataFlowError::DataError(e.to_string()))?;
        } else if col.dtype() == &DataType::Boolean {
            let ca = col
                .as_materialized_series()
                .bool()
                .map_err(|e| DataFlowError::DataError(e.to_string()))?;
            let values: Vec<Option<bool>> = ca.into_iter().collect();
            let trues = values.iter().flatten().filter(|&&v| v).count();
            let falses = values.iter().flatten().filter(|&&v| !v).count();
            if trues + falses == 0 {
                continue;
            }
            // tie breaks to false, matching the smallest-label rule
            let fill = trues > falses;
            let filled: Vec<bool> = values.into_iter().map(|v| v.unwrap_or(fill)).collect();
            debug!(column = %name, fill, "imputed boolean column with mode");
            df.replace(&name, Series::new(name.as_str().into(), filled))
                .map_err(|e| DataFlowError::DataError(e.to_string()))?;
        } else if matches!(col.dtype(), DataType::Date | DataType::Datetime(_, _)) {
            let dtype = col.dtype().clone();
            let millis = col
                .as_materialized_series()
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
                .and_then(|s| s.cast(&DataType::Int64))
                .map_err(|e| DataFlowError::DataError(e.to_string()))?;
            let ca = millis
                .i64()
                .map_err(|e| DataFlowError::DataError(e.to_string()))?;
            let values: Vec<Option<i64>> = ca.into_iter().collect();
            let Some(fill) = mode_i64(&values) else {
                continue;
            };
            let filled: Vec<i64> = values.into_iter().map(|v| v.unwrap_or(fill)).collect();
            let series = Series::new(name.as_str().into(), filled)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
                .and_then(|s| s.cast(&dtype))
                .map_err(|e| DataFlowError::DataError(e.to_string()))?;
            debug!(column = %name, "imputed date column with mode");
            df.replace(&name, series)
                .map_err(|e| DataFlowError::DataError(e.to_string()))?;
        }
    }
    Ok(())
}

/// Most frequent value; ties break to the smallest.
fn mode_i64(values: &[Option<i64>]) -> Option<i64> {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for v in values.iter().flatten() {
        *counts.entry(*v).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(v, _)| v)
}

/// Most frequent non-missing value; ties break to the smallest label.
fn mode_of(values: &[Option<String>]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in values.iter().flatten() {
        *counts.entry(v.as_str()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(v, _)| v.to_string())
}

/// Clip each numeric column to `[Q1 - 1.5*IQR, Q3 + 1.5*IQR]`, returning
/// clipped-value counts for the columns that had any. Runs on
/// post-imputation values, so a zero IQR collapses the column onto its
/// median.
fn winsorize_numeric(df: &mut DataFrame) -> Result<BTreeMap<String, usize>> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut handled = BTreeMap::new();
    for name in names {
        let col = df
            .column(&name)
            .map_err(|_| DataFlowError::ColumnNotFound(name.clone()))?;
        if !is_numeric_dtype(col.dtype()) {
            continue;
        }

        let values = numeric_values(col)?;
        let mut sorted: Vec<f64> = values.iter().filter_map(|v| *v).collect();
        if sorted.is_empty() {
            continue;
        }
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let q1 = quantile_sorted(&sorted, 0.25).unwrap_or(0.0);
        let q3 = quantile_sorted(&sorted, 0.75).unwrap_or(0.0);
        let iqr = q3 - q1;
        let lower = q1 - IQR_FACTOR * iqr;
        let upper = q3 + IQR_FACTOR * iqr;

        let mut clipped = 0usize;
        let adjusted: Vec<Option<f64>> = values
            .into_iter()
            .map(|v| {
                v.map(|x| {
                    if x < lower {
                        clipped += 1;
                        lower
                    } else if x > upper {
                        clipped += 1;
                        upper
                    } else {
                        x
                    }
                })
            })
            .collect();

        if clipped > 0 {
            debug!(column = %name, clipped, lower, upper, "winsorized outliers");
            df.replace(&name, Series::new(name.as_str().into(), adjusted))
                .map_err(|e| DataFlowError::DataError(e.to_string()))?;
            handled.insert(name, clipped);
        }
    }
    Ok(handled)
}
