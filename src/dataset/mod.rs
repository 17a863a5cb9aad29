//! Dataset loading
//!
//! Parses an uploaded tabular file (CSV or spreadsheet) into a Polars
//! `DataFrame` plus a summary the caller can persist or hand to the
//! insight collaborator.

mod loader;

pub use loader::DatasetLoader;

use crate::error::{DataFlowError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Declared kind of an uploaded file.
///
/// The kind is declared by the caller (from the upload filename), not
/// sniffed from content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    Csv,
    Spreadsheet,
}

impl FileKind {
    /// Parse a declared kind string (typically a file extension).
    pub fn parse(kind: &str) -> Result<Self> {
        match kind.to_lowercase().as_str() {
            "csv" => Ok(FileKind::Csv),
            "xlsx" | "xls" => Ok(FileKind::Spreadsheet),
            other => Err(DataFlowError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileKind::Csv => write!(f, "csv"),
            FileKind::Spreadsheet => write!(f, "spreadsheet"),
        }
    }
}

/// Summary of a loaded dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    /// Source file name
    pub name: String,
    /// Declared file kind
    pub file_kind: String,
    /// Header names in column order
    pub headers: Vec<String>,
    pub row_count: usize,
    pub column_count: usize,
    /// Up to 10 head rows as JSON records
    pub sample_data: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl DatasetSummary {
    /// Short textual brief for the external insight collaborator.
    ///
    /// The core never calls that collaborator; it only produces this text.
    pub fn describe(&self) -> String {
        format!(
            "Dataset '{}' ({}): {} rows, {} columns. Columns: {}.",
            self.name,
            self.file_kind,
            self.row_count,
            self.column_count,
            self.headers.join(", ")
        )
    }
}

/// Render up to `n` head rows of a frame as JSON records.
pub(crate) fn sample_records(
    df: &DataFrame,
    n: usize,
) -> Vec<serde_json::Map<String, serde_json::Value>> {
    let take = n.min(df.height());
    let mut rows = Vec::with_capacity(take);
    for row_idx in 0..take {
        let mut record = serde_json::Map::new();
        for col in df.get_columns() {
            let value = match col.as_materialized_series().get(row_idx) {
                Ok(av) => any_value_to_json(&av),
                Err(_) => serde_json::Value::Null,
            };
            record.insert(col.name().to_string(), value);
        }
        rows.push(record);
    }
    rows
}

fn any_value_to_json(av: &AnyValue<'_>) -> serde_json::Value {
    match av {
        AnyValue::Null => serde_json::Value::Null,
        AnyValue::Boolean(b) => serde_json::Value::Bool(*b),
        AnyValue::String(s) => serde_json::Value::String((*s).to_string()),
        AnyValue::StringOwned(s) => serde_json::Value::String(s.to_string()),
        AnyValue::Int8(v) => serde_json::json!(*v),
        AnyValue::Int16(v) => serde_json::json!(*v),
        AnyValue::Int32(v) => serde_json::json!(*v),
        AnyValue::Int64(v) => serde_json::json!(*v),
        AnyValue::UInt8(v) => serde_json::json!(*v),
        AnyValue::UInt16(v) => serde_json::json!(*v),
        AnyValue::UInt32(v) => serde_json::json!(*v),
        AnyValue::UInt64(v) => serde_json::json!(*v),
        AnyValue::Float32(v) => serde_json::json!(*v),
        AnyValue::Float64(v) => serde_json::json!(*v),
        other => serde_json::Value::String(format!("{other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kind_parse() {
        assert_eq!(FileKind::parse("csv").unwrap(), FileKind::Csv);
        assert_eq!(FileKind::parse("XLSX").unwrap(), FileKind::Spreadsheet);
        assert_eq!(FileKind::parse("xls").unwrap(), FileKind::Spreadsheet);
        assert!(matches!(
            FileKind::parse("parquet"),
            Err(DataFlowError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_sample_records() {
        let df = df!(
            "a" => &[1.0, 2.0, 3.0],
            "b" => &["x", "y", "z"],
        )
        .unwrap();

        let rows = sample_records(&df, 2);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["a"], serde_json::json!(1.0));
        assert_eq!(rows[0]["b"], serde_json::json!("x"));
    }

    #[test]
    fn test_describe() {
        let summary = DatasetSummary {
            name: "sales.csv".to_string(),
            file_kind: "csv".to_string(),
            headers: vec!["age".to_string(), "city".to_string()],
            row_count: 100,
            column_count: 2,
            sample_data: Vec::new(),
        };
        let brief = summary.describe();
        assert!(brief.contains("100 rows"));
        assert!(brief.contains("age, city"));
    }
}
