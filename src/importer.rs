//! The document importer: sheet and delimited-file grids become typed
//! scratch tables.
//!
//! # Import pipeline
//!
//! 1. **Collect**: the document driver reads its native shape into one
//!    [`Grid`] per sheet or stream, with cells already parsed into their
//!    best-fitting [`Value`].
//! 2. **Infer**: [`build_table_def`] names the columns (header row or
//!    generated `A, B, …` names) and infers each column's [`Kind`] across
//!    all data rows. Inference only ever widens: once a column disagrees
//!    with its inferred kind it becomes `Text` and stays there.
//! 3. **Create**: the table definitions are created in the scratch
//!    database. Definition building fans out per sheet and fails fast.
//! 4. **Insert**: each grid streams through a [`BatchInserter`] in
//!    driver-sized batches. Short rows are right-padded with nulls; the
//!    inserter munges cells to the inferred column kinds.
//!
//! Cancellation closes the insert channel and tears down both sides.

use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::driver::{max_batch_rows, ColDef, Database, TableDef};
use crate::error::{Error, Result};
use crate::insert::BatchInserter;
use crate::kind::Kind;
use crate::record::{Record, Value};

/// One sheet or stream of a document source, cells parsed but untyped as a
/// table.
#[derive(Debug, Clone)]
pub struct Grid {
    pub name: String,
    pub rows: Vec<Record>,
}

/// Spreadsheet-style column name for index `i`: `A, B, … Z, AA, AB, …`.
pub fn generate_alpha_col_name(mut i: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push((b'A' + (i % 26) as u8) as char);
        if i < 26 {
            break;
        }
        i = i / 26 - 1;
    }
    name.into_iter().rev().collect()
}

/// Builds the table definition for a grid, returning it along with the index
/// of the first data row (1 when a header row was consumed).
///
/// Edge cases: an empty grid produces a one-column `Text` table with zero
/// data rows; the column count is the maximum over all rows; empty and
/// colliding column names are replaced with generated alphabetic names.
pub fn build_table_def(grid: &Grid, has_header: bool) -> (TableDef, usize) {
    let width = grid.rows.iter().map(Vec::len).max().unwrap_or(0).max(1);
    let first_data_row = usize::from(has_header && !grid.rows.is_empty());

    let mut names: Vec<String> = Vec::with_capacity(width);
    for i in 0..width {
        let header_name = if has_header {
            grid.rows.first().and_then(|r| r.get(i)).and_then(|v| match v {
                Value::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            })
        } else {
            None
        };
        let name = match header_name {
            Some(n) if !names.contains(&n) => n,
            // Missing, empty, or colliding header cell.
            _ => generate_alpha_col_name(i),
        };
        names.push(name);
    }

    let mut kinds = vec![Kind::Null; width];
    for row in &grid.rows[first_data_row..] {
        for (i, kind) in kinds.iter_mut().enumerate() {
            let cell_kind = match row.get(i) {
                None | Some(Value::Null) => continue,
                Some(v) => v.kind(),
            };
            *kind = match *kind {
                Kind::Null => cell_kind,
                k if k == cell_kind => k,
                // Mixed kinds degrade to text, permanently.
                _ => Kind::Text,
            };
        }
    }

    let cols = names
        .into_iter()
        .zip(kinds)
        .map(|(name, kind)| {
            ColDef::new(
                name,
                if kind == Kind::Null { Kind::Text } else { kind },
            )
        })
        .collect();

    (
        TableDef {
            name: grid.name.clone(),
            cols,
        },
        first_data_row,
    )
}

/// Materializes `grids` into `db`, returning the total rows inserted.
pub async fn import_grids(
    db: &Database,
    grids: &[Grid],
    has_header: bool,
    cancel: &CancellationToken,
) -> Result<u64> {
    // Table definitions are built per sheet in a fail-fast join.
    let defs = try_join_all(
        grids
            .iter()
            .map(|g| async move { Ok::<_, Error>(build_table_def(g, has_header)) }),
    )
    .await?;

    for (def, _) in &defs {
        db.create_table(def).await?;
    }
    debug!(tables = defs.len(), "scratch tables created");

    let mut total = 0u64;
    for (grid, (def, first_data_row)) in grids.iter().zip(&defs) {
        total += import_grid(db, grid, def, *first_data_row, cancel).await?;
    }
    Ok(total)
}

async fn import_grid(
    db: &Database,
    grid: &Grid,
    def: &TableDef,
    first_data_row: usize,
    cancel: &CancellationToken,
) -> Result<u64> {
    let width = def.cols.len();
    let batch_size = max_batch_rows(db.dialect(), width);
    let inserter = BatchInserter::new(
        db.clone(),
        def.name.clone(),
        def.record_meta(),
        batch_size,
        cancel.clone(),
    );
    let tx = inserter.sender();

    for row in &grid.rows[first_data_row..] {
        let mut rec = row.clone();
        rec.resize(width, Value::Null);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                drop(tx);
                return Err(Error::Cancelled);
            }
            sent = tx.send(rec) => {
                if sent.is_err() {
                    // Inserter bailed; its wait() has the real error.
                    break;
                }
            }
        }
    }

    drop(tx);
    let written = inserter.wait().await?;
    debug!(table = %def.name, rows = written, "sheet imported");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn alpha_names_wrap_past_z() {
        let got: Vec<String> = [0, 1, 25, 26, 27, 51, 52]
            .iter()
            .map(|&i| generate_alpha_col_name(i))
            .collect();
        assert_eq!(got, ["A", "B", "Z", "AA", "AB", "AZ", "BA"]);
    }

    #[test]
    fn header_row_names_columns() {
        let grid = Grid {
            name: "data".to_string(),
            rows: vec![
                vec![text("a"), text("b"), text("c")],
                vec![Value::Int(1), text("x"), Value::Float(0.5)],
            ],
        };
        let (def, first) = build_table_def(&grid, true);
        assert_eq!(first, 1);
        assert_eq!(def.col_names(), ["a", "b", "c"]);
        assert_eq!(
            def.cols.iter().map(|c| c.kind).collect::<Vec<_>>(),
            [Kind::Int, Kind::Text, Kind::Float]
        );
    }

    #[test]
    fn headerless_grid_gets_alpha_names() {
        let grid = Grid {
            name: "data".to_string(),
            rows: vec![vec![Value::Int(1), Value::Int(2)]],
        };
        let (def, first) = build_table_def(&grid, false);
        assert_eq!(first, 0);
        assert_eq!(def.col_names(), ["A", "B"]);
    }

    #[test]
    fn kind_degradation_is_monotonic() {
        let grid = Grid {
            name: "data".to_string(),
            rows: vec![
                vec![Value::Int(1)],
                vec![text("oops")],
                // Back to ints, but the column must stay text.
                vec![Value::Int(2)],
                vec![Value::Int(3)],
            ],
        };
        let (def, _) = build_table_def(&grid, false);
        assert_eq!(def.cols[0].kind, Kind::Text);
    }

    #[test]
    fn nulls_do_not_degrade_kind() {
        let grid = Grid {
            name: "data".to_string(),
            rows: vec![vec![Value::Int(1)], vec![Value::Null], vec![Value::Int(2)]],
        };
        let (def, _) = build_table_def(&grid, false);
        assert_eq!(def.cols[0].kind, Kind::Int);
    }

    #[test]
    fn empty_grid_is_single_text_column() {
        let grid = Grid {
            name: "data".to_string(),
            rows: vec![],
        };
        let (def, first) = build_table_def(&grid, true);
        assert_eq!(first, 0);
        assert_eq!(def.col_names(), ["A"]);
        assert_eq!(def.cols[0].kind, Kind::Text);
    }

    #[test]
    fn width_is_max_over_rows() {
        let grid = Grid {
            name: "data".to_string(),
            rows: vec![
                vec![Value::Int(1)],
                vec![Value::Int(2), text("x"), text("y")],
            ],
        };
        let (def, _) = build_table_def(&grid, false);
        assert_eq!(def.cols.len(), 3);
    }

    #[test]
    fn colliding_header_names_are_substituted() {
        let grid = Grid {
            name: "data".to_string(),
            rows: vec![
                vec![text("id"), text("id"), text("")],
                vec![Value::Int(1), Value::Int(2), Value::Int(3)],
            ],
        };
        let (def, _) = build_table_def(&grid, true);
        assert_eq!(def.col_names(), ["id", "B", "C"]);
    }
}
