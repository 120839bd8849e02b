//! XLSX document driver.
//!
//! A workbook is not monotable: each sheet becomes one scratch table, named
//! after the sheet, in workbook order. Cell values arrive typed from the
//! spreadsheet (numeric, bool, datetime), so unlike delimited text there is
//! no string re-parsing; integral floats are narrowed to ints the way the
//! kind inference expects.

use async_trait::async_trait;
use calamine::{open_workbook_auto, Data, Reader};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::driver::{local_document_path, Database, Driver, DriverMetadata};
use crate::error::{Error, Result};
use crate::importer::{self, Grid};
use crate::record::Value;
use crate::scratch;
use crate::source::{Source, SourceType};

pub struct XlsxDriver;

#[async_trait]
impl Driver for XlsxDriver {
    fn metadata(&self) -> DriverMetadata {
        DriverMetadata {
            ty: SourceType::Xlsx,
            monotable: false,
            supports_sql: false,
            description: "Excel XLSX workbook",
        }
    }

    async fn open(&self, src: &Source, cancel: &CancellationToken) -> Result<Database> {
        let path = local_document_path(src).await?;
        let grids = read_workbook(&path)?;
        let db = scratch::open(src).await?;
        importer::import_grids(&db, &grids, src.has_header()?, cancel).await?;
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

fn read_workbook(path: &std::path::Path) -> Result<Vec<Grid>> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| Error::Driver(format!("{}: {e}", path.display())))?;

    let sheet_names = workbook.sheet_names().to_owned();
    let mut grids = Vec::with_capacity(sheet_names.len());
    for name in sheet_names {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| Error::Driver(format!("sheet {name}: {e}")))?;
        let rows = range
            .rows()
            .enumerate()
            .map(|(i, row)| {
                row.iter()
                    .map(|cell| cell_value(cell, &name, i))
                    .collect()
            })
            .collect();
        grids.push(Grid { name, rows });
    }
    Ok(grids)
}

fn cell_value(cell: &Data, sheet: &str, row: usize) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Bool(b) => Value::Bool(*b),
        Data::Int(n) => Value::Int(*n),
        Data::Float(f) => {
            // Spreadsheets store most numerics as floats; keep whole values
            // as ints so inference matches what the user sees.
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                Value::Int(*f as i64)
            } else {
                Value::Float(*f)
            }
        }
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => Value::Datetime(naive.and_utc()),
            None => {
                warn!(sheet, row, "unreadable datetime cell, importing null");
                Value::Null
            }
        },
        Data::DateTimeIso(s) => match crate::record::parse_datetime(s) {
            Some(dt) => Value::Datetime(dt),
            None => Value::Text(s.clone()),
        },
        Data::DurationIso(s) => Value::Text(s.clone()),
        Data::String(s) => {
            if s.is_empty() {
                Value::Null
            } else {
                Value::Text(s.clone())
            }
        }
        Data::Error(e) => {
            warn!(sheet, row, error = %e, "error cell, importing null");
            Value::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::Kind;

    #[test]
    fn integral_floats_narrow_to_int() {
        assert_eq!(cell_value(&Data::Float(3.0), "s", 0).kind(), Kind::Int);
        assert_eq!(cell_value(&Data::Float(3.5), "s", 0).kind(), Kind::Float);
    }

    #[test]
    fn empty_cells_are_null() {
        assert!(cell_value(&Data::Empty, "s", 0).is_null());
        assert!(cell_value(&Data::String(String::new()), "s", 0).is_null());
    }
}
