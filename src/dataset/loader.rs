//! File parsing for CSV and spreadsheet sources

use crate::dataset::{sample_records, DatasetSummary, FileKind};
use crate::error::{DataFlowError, Result};
use calamine::{open_workbook_auto, Data, Reader};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::info;

/// Loader for uploaded dataset files.
///
/// Reads the file fresh on every call; no state is shared between
/// invocations.
#[derive(Debug, Clone, Default)]
pub struct DatasetLoader {
    infer_schema_rows: usize,
}

impl DatasetLoader {
    pub fn new() -> Self {
        Self {
            infer_schema_rows: 100,
        }
    }

    /// Load a file of the declared kind into a frame plus summary.
    pub fn load(&self, path: &Path, kind: FileKind) -> Result<(DataFrame, DatasetSummary)> {
        let df = match kind {
            FileKind::Csv => self.load_csv(path)?,
            FileKind::Spreadsheet => self.load_spreadsheet(path)?,
        };

        let headers: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();

        let summary = DatasetSummary {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
            file_kind: kind.to_string(),
            row_count: df.height(),
            column_count: df.width(),
            sample_data: sample_records(&df, 10),
            headers,
        };

        info!(
            rows = summary.row_count,
            columns = summary.column_count,
            kind = %kind,
            "dataset loaded"
        );

        Ok((df, summary))
    }

    fn load_csv(&self, path: &Path) -> Result<DataFrame> {
        let file = File::open(path)?;

        let parse_opts = CsvParseOptions::default().with_try_parse_dates(true);

        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_rows))
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| DataFlowError::ParseError(e.to_string()))
    }

    fn load_spreadsheet(&self, path: &Path) -> Result<DataFrame> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| DataFlowError::ParseError(format!("cannot open workbook: {e}")))?;

        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| DataFlowError::ParseError("workbook has no worksheets".to_string()))?;

        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| DataFlowError::ParseError(format!("cannot read worksheet: {e}")))?;

        let mut rows = range.rows();
        let header_row = rows
            .next()
            .ok_or_else(|| DataFlowError::ParseError("worksheet is empty".to_string()))?;

        let headers: Vec<String> = header_row
            .iter()
            .enumerate()
            .map(|(i, cell)| match cell {
                Data::String(s) if !s.trim().is_empty() => s.trim().to_string(),
                _ => format!("column_{}", i + 1),
            })
            .collect();

        let data_rows: Vec<&[Data]> = rows.collect();
        let columns: Vec<Column> = headers
            .iter()
            .enumerate()
            .map(|(col_idx, name)| Self::build_column(name, col_idx, &data_rows))
            .collect();

        DataFrame::new(columns).map_err(|e| DataFlowError::ParseError(e.to_string()))
    }

    /// Build one typed column from worksheet cells: numeric when every
    /// non-empty cell is a number, text otherwise.
    fn build_column(name: &str, col_idx: usize, rows: &[&[Data]]) -> Column {
        let cells = rows.iter().map(|row| row.get(col_idx));

        let all_numeric = cells.clone().all(|cell| {
            matches!(
                cell,
                None | Some(Data::Empty) | Some(Data::Float(_)) | Some(Data::Int(_))
            )
        });

        if all_numeric {
            let values: Vec<Option<f64>> = cells
                .map(|cell| match cell {
                    Some(Data::Float(f)) => Some(*f),
                    Some(Data::Int(i)) => Some(*i as f64),
                    _ => None,
                })
                .collect();
            Column::new(name.into(), values)
        } else {
            let values: Vec<Option<String>> = cells
                .map(|cell| match cell {
                    None | Some(Data::Empty) | Some(Data::Error(_)) => None,
                    Some(Data::String(s)) => Some(s.clone()),
                    Some(Data::Float(f)) => Some(f.to_string()),
                    Some(Data::Int(i)) => Some(i.to_string()),
                    Some(Data::Bool(b)) => Some(b.to_string()),
                    Some(Data::DateTime(dt)) => Some(
                        dt.as_datetime()
                            .map(|d| d.to_string())
                            .unwrap_or_else(|| dt.as_f64().to_string()),
                    ),
                    Some(other) => Some(other.to_string()),
                })
                .collect();
            Column::new(name.into(), values)
        }
    }
}
