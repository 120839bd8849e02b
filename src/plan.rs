//! Lowers a parsed SLQ pipeline to backend SQL.
//!
//! The planner is a pure function: the same AST and dialect always produce
//! the same SQL string. It resolves nothing at runtime: handle resolution
//! and metadata lookup happen in the engine, which passes table metadata in
//! when it has it (always, for scratch-backed document sources) so that
//! unknown tables and columns fail here rather than deep in the driver.

use crate::driver::SourceMetadata;
use crate::error::{Error, Result};
use crate::slq::{Ast, CmpOp, Func, Literal, Node, LIMIT_UNBOUNDED};

/// SQL dialect of a target backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Mysql,
    Postgres,
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Mysql => "mysql",
            Dialect::Postgres => "postgres",
        }
    }

    /// Quotes an identifier: backticks for MySQL, double quotes otherwise.
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Dialect::Mysql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Sqlite | Dialect::Postgres => {
                format!("\"{}\"", ident.replace('"', "\"\""))
            }
        }
    }
}

/// Output of planning: the handle the query targets and the SQL to run
/// against it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedQuery {
    pub handle: String,
    pub table: String,
    pub sql: String,
}

/// Walks `ast` and produces dialect SQL.
///
/// When `meta` is provided, table and column references are validated
/// against it, surfacing [`Error::UnknownTable`] / [`Error::UnknownColumn`].
pub fn plan(ast: &Ast, dialect: Dialect, meta: Option<&SourceMetadata>) -> Result<PlannedQuery> {
    let mut handle: Option<String> = None;
    let mut table: Option<String> = None;
    let mut cols: Vec<String> = Vec::new();
    let mut func: Option<Func> = None;
    let mut range: Option<(u64, i64)> = None;
    let mut conds: Vec<String> = Vec::new();

    for (si, seg) in ast.segments.iter().enumerate() {
        let Node::Segment(elems) = seg else {
            return Err(Error::Parse("malformed pipeline".to_string()));
        };
        let mut seg_cols: Vec<String> = Vec::new();

        for elem in elems {
            match elem {
                Node::Handle(h) => {
                    if si != 0 || handle.is_some() {
                        return Err(Error::Parse(format!(
                            "handle {h} must be the first element of the query"
                        )));
                    }
                    handle = Some(h.clone());
                }
                Node::Selector(parts) => match (table.is_some(), parts.len()) {
                    (false, 1) => table = Some(parts[0].clone()),
                    (false, 2) => {
                        table = Some(parts[0].clone());
                        seg_cols.push(parts[1].clone());
                    }
                    (true, 1) => seg_cols.push(parts[0].clone()),
                    (true, _) => seg_cols.push(parts[1].clone()),
                    _ => unreachable!("selector parts are 1 or 2"),
                },
                Node::Func(f) => func = Some(*f),
                Node::RowRange { offset, limit } => range = Some((*offset, *limit)),
                Node::Expr { lhs, op, rhs } => {
                    conds.push(render_cond(dialect, lhs, *op, rhs)?);
                }
                Node::Segment(_) | Node::Literal(_) => {
                    return Err(Error::Parse("misplaced element".to_string()));
                }
            }
        }

        // Within the pipeline, the last column-bearing segment decides the
        // projection.
        if !seg_cols.is_empty() {
            cols = seg_cols;
        }
    }

    let handle = handle.ok_or_else(|| {
        Error::Parse("query must begin with a @handle segment".to_string())
    })?;
    let table = table.ok_or_else(|| Error::Parse("query selects no table".to_string()))?;

    if let Some(meta) = meta {
        validate(meta, &table, &cols)?;
    }

    let projection = match func {
        Some(Func::Count) => "COUNT(*)".to_string(),
        Some(other) => return Err(Error::UnsupportedFunc(other.as_str().to_string())),
        None if cols.is_empty() => "*".to_string(),
        None => cols
            .iter()
            .map(|c| dialect.quote(c))
            .collect::<Vec<_>>()
            .join(", "),
    };

    let mut sql = format!("SELECT {projection} FROM {}", dialect.quote(&table));
    if !conds.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conds.join(" AND "));
    }
    if let Some((offset, limit)) = range {
        push_range(&mut sql, dialect, offset, limit);
    }

    Ok(PlannedQuery { handle, table, sql })
}

fn push_range(sql: &mut String, dialect: Dialect, offset: u64, limit: i64) {
    if limit != LIMIT_UNBOUNDED {
        sql.push_str(&format!(" LIMIT {limit}"));
    } else if offset > 0 {
        // An offset with no limit needs a dialect-specific LIMIT form.
        match dialect {
            Dialect::Sqlite => sql.push_str(" LIMIT -1"),
            Dialect::Mysql => sql.push_str(" LIMIT 18446744073709551615"),
            Dialect::Postgres => {}
        }
    }
    if offset > 0 {
        sql.push_str(&format!(" OFFSET {offset}"));
    }
}

fn render_cond(dialect: Dialect, lhs: &Node, op: CmpOp, rhs: &Node) -> Result<String> {
    let Node::Selector(parts) = lhs else {
        return Err(Error::Parse("expression must compare a column".to_string()));
    };
    let Some(col) = parts.last() else {
        return Err(Error::Parse("expression selector is empty".to_string()));
    };
    let Node::Literal(lit) = rhs else {
        return Err(Error::Parse("expression must compare to a literal".to_string()));
    };
    let rendered = match lit {
        Literal::Int(n) => n.to_string(),
        Literal::Float(f) => f.to_string(),
        Literal::Text(s) => format!("'{}'", s.replace('\'', "''")),
    };
    Ok(format!("{} {} {}", dialect.quote(col), op.sql(), rendered))
}

fn validate(meta: &SourceMetadata, table: &str, cols: &[String]) -> Result<()> {
    let tbl = meta
        .tables
        .iter()
        .find(|t| t.name == table)
        .ok_or_else(|| Error::UnknownTable(table.to_string()))?;
    for col in cols {
        if !tbl.cols.iter().any(|c| &c.name == col) {
            return Err(Error::UnknownColumn(format!("{table}.{col}")));
        }
    }
    Ok(())
}
