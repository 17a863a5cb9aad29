//! Feature engineering stage
//!
//! Purely additive: date parts, ordinal encodings, one interaction term,
//! and z-score siblings. Existing columns are never modified or removed.

use super::{is_numeric_dtype, numeric_values, string_values};
use crate::dataset::sample_records;
use crate::error::{DataFlowError, Result};
use chrono::{DateTime, Datelike};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// Only the first this-many text columns get ordinal encodings.
const MAX_ENCODED_COLUMNS: usize = 10;
/// The interaction term is taken from the first two of this-many numeric
/// columns.
const INTERACTION_SCAN_WIDTH: usize = 5;

/// Outcome report of the feature-engineering stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureReport {
    pub row_count: usize,
    pub column_count: usize,
    /// All added column names, in creation order
    pub new_features: Vec<String>,
    pub date_features: Vec<String>,
    pub encoded_features: Vec<String>,
    pub interaction_feature: Option<String>,
    pub normalized_features: Vec<String>,
    /// Up to 10 head rows of the expanded frame as JSON records
    pub sample_data: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Expand a frame with derived features.
///
/// Order matters: date parts first, then ordinal encodings, then the
/// interaction term over the numeric columns visible at that point, then
/// z-score siblings for numeric columns (excluding the date parts and the
/// interaction added in this same pass).
pub fn engineer_features(df: &DataFrame) -> Result<(DataFrame, FeatureReport)> {
    let mut out = df.clone();
    let mut new_features = Vec::new();

    let date_features = add_date_parts(&mut out, &mut new_features)?;
    let encoded_features = add_ordinal_encodings(&mut out, &mut new_features)?;
    let interaction_feature =
        add_interaction(&mut out, &mut new_features)?;
    let normalized_features = add_normalized(
        &mut out,
        &mut new_features,
        &date_features,
        interaction_feature.as_deref(),
    )?;

    let report = FeatureReport {
        row_count: out.height(),
        column_count: out.width(),
        new_features,
        date_features,
        encoded_features,
        interaction_feature,
        normalized_features,
        sample_data: sample_records(&out, 10),
    };

    info!(
        rows = report.row_count,
        columns = report.column_count,
        added = report.new_features.len(),
        "feature engineering complete"
    );

    Ok((out, report))
}

/// For each date/datetime column add `{col}_year`, `{col}_month`,
/// `{col}_day`.
fn add_date_parts(df: &mut DataFrame, new_features: &mut Vec<String>) -> Result<Vec<String>> {
    let date_cols: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|c| matches!(c.dtype(), DataType::Date | DataType::Datetime(_, _)))
        .map(|c| c.name().to_string())
        .collect();

    let mut added = Vec::new();
    for name in date_cols {
        let col = df
            .column(&name)
            .map_err(|_| DataFlowError::ColumnNotFound(name.clone()))?;
        let millis = col
            .as_materialized_series()
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .and_then(|s| s.cast(&DataType::Int64))
            .map_err(|e| DataFlowError::DataError(e.to_string()))?;
        let millis = millis
            .i64()
            .map_err(|e| DataFlowError::DataError(e.to_string()))?;

        let mut years = Vec::with_capacity(df.height());
        let mut months = Vec::with_capacity(df.height());
        let mut days = Vec::with_capacity(df.height());
        for ms in millis {
            match ms.and_then(DateTime::from_timestamp_millis) {
                Some(dt) => {
                    years.push(Some(dt.year()));
                    months.push(Some(dt.month() as i32));
                    days.push(Some(dt.day() as i32));
                }
                None => {
                    years.push(None);
                    months.push(None);
                    days.push(None);
                }
            }
        }

        for (suffix, values) in [("year", years), ("month", months), ("day", days)] {
            let feature = format!("{name}_{suffix}");
            df.with_column(Series::new(feature.as_str().into(), values))
                .map_err(|e| DataFlowError::DataError(e.to_string()))?;
            new_features.push(feature.clone());
            added.push(feature);
        }
        debug!(column = %name, "extracted date parts");
    }
    Ok(added)
}

/// Ordinal-encode the first [`MAX_ENCODED_COLUMNS`] text columns: codes
/// follow sorted label order, missing values map to -1.
fn add_ordinal_encodings(df: &mut DataFrame, new_features: &mut Vec<String>) -> Result<Vec<String>> {
    let text_cols: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|c| c.dtype() == &DataType::String)
        .map(|c| c.name().to_string())
        .take(MAX_ENCODED_COLUMNS)
        .collect();

    let mut added = Vec::new();
    for name in text_cols {
        let col = df
            .column(&name)
            .map_err(|_| DataFlowError::ColumnNotFound(name.clone()))?;
        let values = string_values(col)?;

        let labels: HashSet<&str> = values.iter().flatten().map(|s| s.as_str()).collect();
        let mut labels: Vec<&str> = labels.into_iter().collect();
        labels.sort_unstable();
        let codes: BTreeMap<&str, i32> = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (*l, i as i32))
            .collect();

        let encoded: Vec<i32> = values
            .iter()
            .map(|v| v.as_deref().map_or(-1, |s| codes[s]))
            .collect();

        let feature = format!("{name}_encoded");
        df.with_column(Series::new(feature.as_str().into(), encoded))
            .map_err(|e| DataFlowError::DataError(e.to_string()))?;
        debug!(column = %name, categories = labels.len(), "ordinal-encoded text column");
        new_features.push(feature.clone());
        added.push(feature);
    }
    Ok(added)
}

/// Add one product feature over the first two of the first
/// [`INTERACTION_SCAN_WIDTH`] numeric columns, when at least two exist.
fn add_interaction(df: &mut DataFrame, new_features: &mut Vec<String>) -> Result<Option<String>> {
    let numeric: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|c| is_numeric_dtype(c.dtype()))
        .map(|c| c.name().to_string())
        .take(INTERACTION_SCAN_WIDTH)
        .collect();

    if numeric.len() < 2 {
        return Ok(None);
    }
    let (a, b) = (&numeric[0], &numeric[1]);

    let left = numeric_values(
        df.column(a)
            .map_err(|_| DataFlowError::ColumnNotFound(a.clone()))?,
    )?;
    let right = numeric_values(
        df.column(b)
            .map_err(|_| DataFlowError::ColumnNotFound(b.clone()))?,
    )?;
    let product: Vec<Option<f64>> = left
        .into_iter()
        .zip(right)
        .map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => Some(x * y),
            _ => None,
        })
        .collect();

    let feature = format!("{a}_x_{b}");
    df.with_column(Series::new(feature.as_str().into(), product))
        .map_err(|e| DataFlowError::DataError(e.to_string()))?;
    new_features.push(feature.clone());
    Ok(Some(feature))
}

/// Add `{col}_normalized` z-score siblings for numeric columns, skipping
/// the date parts and the interaction added earlier in the same pass, and
/// any column whose sample standard deviation is zero.
fn add_normalized(
    df: &mut DataFrame,
    new_features: &mut Vec<String>,
    date_features: &[String],
    interaction: Option<&str>,
) -> Result<Vec<String>> {
    let skip: HashSet<&str> = date_features
        .iter()
        .map(|s| s.as_str())
        .chain(interaction)
        .collect();

    let candidates: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|c| is_numeric_dtype(c.dtype()) && !skip.contains(c.name().as_str()))
        .map(|c| c.name().to_string())
        .collect();

    let mut added = Vec::new();
    for name in candidates {
        let values = numeric_values(
            df.column(&name)
                .map_err(|_| DataFlowError::ColumnNotFound(name.clone()))?,
        )?;
        let present: Vec<f64> = values.iter().filter_map(|v| *v).collect();
        if present.len() < 2 {
            continue;
        }

        let n = present.len() as f64;
        let mean = present.iter().sum::<f64>() / n;
        let var = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let std = var.sqrt();
        if std == 0.0 || !std.is_finite() {
            continue;
        }

        let normalized: Vec<Option<f64>> =
            values.into_iter().map(|v| v.map(|x| (x - mean) / std)).collect();
        let feature = format!("{name}_normalized");
        df.with_column(Series::new(feature.as_str().into(), normalized))
            .map_err(|e| DataFlowError::DataError(e.to_string()))?;
        new_features.push(feature.clone());
        added.push(feature);
    }
    Ok(added)
}
