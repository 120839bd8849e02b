//! CSV and TSV document driver.
//!
//! Delimited files are monotable: the whole file becomes one scratch table
//! named `data`. Cells are plain text on the wire, so each one is parsed
//! into its best-fitting value (bool, int, float, datetime, date, then
//! text); the importer's kind inference does the rest.

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use crate::driver::{local_document_path, Database, Driver, DriverMetadata};
use crate::error::{Error, Result};
use crate::importer::{self, Grid};
use crate::record::{parse_datetime, Value};
use crate::scratch;
use crate::source::{Source, SourceType, MONOTABLE_NAME};

pub struct CsvDriver {
    ty: SourceType,
    delimiter: u8,
}

impl CsvDriver {
    pub fn comma() -> Self {
        Self {
            ty: SourceType::Csv,
            delimiter: b',',
        }
    }

    pub fn tab() -> Self {
        Self {
            ty: SourceType::Tsv,
            delimiter: b'\t',
        }
    }
}

#[async_trait]
impl Driver for CsvDriver {
    fn metadata(&self) -> DriverMetadata {
        DriverMetadata {
            ty: self.ty,
            monotable: true,
            supports_sql: false,
            description: match self.ty {
                SourceType::Tsv => "Tab-separated values",
                _ => "Comma-separated values",
            },
        }
    }

    async fn open(&self, src: &Source, cancel: &CancellationToken) -> Result<Database> {
        let path = local_document_path(src).await?;
        let delimiter = match src.options.get("delimiter") {
            Some(d) if d.len() == 1 => d.as_bytes()[0],
            Some(d) => {
                return Err(Error::InvalidOption(format!(
                    "delimiter must be a single character, got {d:?}"
                )))
            }
            None => self.delimiter,
        };

        let grid = read_grid(&path, delimiter)?;
        let db = scratch::open(src).await?;
        importer::import_grids(&db, &[grid], src.has_header()?, cancel).await?;
        Ok(db)
    }

    async fn ping(&self, src: &Source) -> Result<()> {
        if src.location.starts_with("http://") || src.location.starts_with("https://") {
            return Ok(());
        }
        std::fs::metadata(&src.location).map_err(|e| Error::Connect {
            handle: src.handle.clone(),
            message: format!("{}: {e}", src.location),
        })?;
        Ok(())
    }
}

fn read_grid(path: &std::path::Path, delimiter: u8) -> Result<Grid> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::Driver(format!("{}: {e}", path.display())))?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| Error::Driver(e.to_string()))?;
        rows.push(record.iter().map(parse_cell).collect());
    }
    Ok(Grid {
        name: MONOTABLE_NAME.to_string(),
        rows,
    })
}

/// Best-fitting typed value for a delimited-text cell.
fn parse_cell(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    match cell {
        "true" | "TRUE" | "True" => return Value::Bool(true),
        "false" | "FALSE" | "False" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = cell.parse::<i64>() {
        return Value::Int(n);
    }
    if let Ok(f) = cell.parse::<f64>() {
        return Value::Float(f);
    }
    if let Some(dt) = parse_datetime(cell) {
        return Value::Datetime(dt);
    }
    if let Ok(d) = NaiveDate::parse_from_str(cell, "%Y-%m-%d") {
        return Value::Date(d);
    }
    Value::Text(cell.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::Kind;

    #[test]
    fn cells_parse_to_best_fit() {
        assert_eq!(parse_cell("42").kind(), Kind::Int);
        assert_eq!(parse_cell("4.5").kind(), Kind::Float);
        assert_eq!(parse_cell("true").kind(), Kind::Bool);
        assert_eq!(parse_cell("2020-05-01").kind(), Kind::Date);
        assert_eq!(parse_cell("2020-05-01 13:00:00").kind(), Kind::Datetime);
        assert_eq!(parse_cell("hello").kind(), Kind::Text);
        assert!(parse_cell("").is_null());
    }
}
