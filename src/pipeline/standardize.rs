//! Header and type standardization

use crate::dataset::sample_records;
use crate::error::{DataFlowError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Share of non-missing values that must parse as numbers before a text
/// column is promoted to f64.
const NUMERIC_PROMOTION_THRESHOLD: f64 = 0.8;

/// Outcome report of the standardization stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardizeReport {
    pub row_count: usize,
    pub column_count: usize,
    /// Normalized header names in column order
    pub headers: Vec<String>,
    /// Header name to dtype string, post-promotion
    pub dtypes: Vec<(String, String)>,
    /// Text columns promoted to numeric
    pub promoted_columns: Vec<String>,
    /// Up to 10 head rows as JSON records
    pub sample_data: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Standardize headers and column types.
///
/// Headers are lower-cased with whitespace runs collapsed to a single `_`.
/// A text column is promoted to f64 when at least 80% of its non-missing
/// values parse as numbers; unparseable stragglers become nulls. No rows
/// are added or removed.
pub fn standardize(df: &DataFrame) -> Result<(DataFrame, StandardizeReport)> {
    let mut out = df.clone();

    let normalized: Vec<String> = out
        .get_column_names()
        .iter()
        .map(|name| normalize_header(name))
        .collect();
    out.set_column_names(normalized.iter().map(|s| s.as_str()))
        .map_err(|e| DataFlowError::DataError(e.to_string()))?;

    let mut promoted_columns = Vec::new();
    for name in normalized.clone() {
        let col = out
            .column(&name)
            .map_err(|_| DataFlowError::ColumnNotFound(name.clone()))?;
        if col.dtype() != &DataType::String {
            continue;
        }
        if let Some(parsed) = try_promote(col)? {
            debug!(column = %name, "promoted text column to numeric");
            out.replace(&name, parsed)
                .map_err(|e| DataFlowError::DataError(e.to_string()))?;
            promoted_columns.push(name);
        }
    }

    let report = StandardizeReport {
        row_count: out.height(),
        column_count: out.width(),
        headers: normalized,
        dtypes: out
            .get_columns()
            .iter()
            .map(|c| (c.name().to_string(), c.dtype().to_string()))
            .collect(),
        promoted_columns,
        sample_data: sample_records(&out, 10),
    };

    info!(
        rows = report.row_count,
        columns = report.column_count,
        promoted = report.promoted_columns.len(),
        "standardization complete"
    );

    Ok((out, report))
}

fn normalize_header(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Parse a text column as f64, returning the replacement series only when
/// the parse rate over non-missing values clears the promotion threshold.
fn try_promote(col: &Column) -> Result<Option<Series>> {
    let ca = col
        .as_materialized_series()
        .str()
        .map_err(|e| DataFlowError::DataError(e.to_string()))?;

    let mut non_missing = 0usize;
    let mut parseable = 0usize;
    let parsed: Vec<Option<f64>> = ca
        .into_iter()
        .map(|v| match v {
            Some(s) => {
                non_missing += 1;
                match s.trim().parse::<f64>() {
                    Ok(f) => {
                        parseable += 1;
                        Some(f)
                    }
                    Err(_) => None,
                }
            }
            None => None,
        })
        .collect();

    if non_missing == 0 {
        return Ok(None);
    }
    let rate = parseable as f64 / non_missing as f64;
    if rate >= NUMERIC_PROMOTION_THRESHOLD {
        Ok(Some(Series::new(col.name().clone(), parsed)))
    } else {
        Ok(None)
    }
}
