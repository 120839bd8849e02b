//! SQLite driver.
//!
//! Serves double duty: the driver for user-registered SQLite sources, and
//! the backing store for scratch databases holding materialized document
//! sources. SQLite is dynamically typed, so records are decoded from each
//! value's runtime type rather than the column declaration; declared types
//! still drive the column kinds reported by [`describe`].

use std::str::FromStr;

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, Row, SqlitePool, TypeInfo, ValueRef};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::driver::{
    insert_sql, DbPool, Database, Driver, DriverMetadata, SourceMetadata, TableMeta,
};
use crate::error::{Error, Result};
use crate::kind::Kind;
use crate::plan::Dialect;
use crate::record::{FieldMeta, Record, RecordMeta, Value};
use crate::source::{Source, SourceType};

pub struct SqliteDriver;

#[async_trait]
impl Driver for SqliteDriver {
    fn metadata(&self) -> DriverMetadata {
        DriverMetadata {
            ty: SourceType::Sqlite,
            monotable: false,
            supports_sql: true,
            description: "SQLite",
        }
    }

    async fn open(&self, src: &Source, _cancel: &CancellationToken) -> Result<Database> {
        let pool = connect(&file_path(&src.location), true).await.map_err(|e| {
            Error::Connect {
                handle: src.handle.clone(),
                message: e.to_string(),
            }
        })?;
        Ok(Database::new(src.clone(), DbPool::Sqlite(pool)))
    }

    async fn ping(&self, src: &Source) -> Result<()> {
        let pool = connect(&file_path(&src.location), false)
            .await
            .map_err(|e| Error::Connect {
                handle: src.handle.clone(),
                message: e.to_string(),
            })?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        pool.close().await;
        Ok(())
    }
}

fn file_path(location: &str) -> String {
    location
        .strip_prefix("sqlite3://")
        .or_else(|| location.strip_prefix("sqlite://"))
        .unwrap_or(location)
        .to_string()
}

async fn connect(path: &str, create: bool) -> sqlx::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{path}"))?
        .create_if_missing(create)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

pub(crate) async fn describe(pool: &SqlitePool, sql: &str) -> Result<RecordMeta> {
    let d = pool.describe(sql).await?;
    let mut meta = Vec::with_capacity(d.columns().len());
    for (i, col) in d.columns().iter().enumerate() {
        meta.push(FieldMeta {
            name: col.name().to_string(),
            kind: kind_from_type(col.type_info().name()),
            nullable: d.nullable(i).unwrap_or(true),
        });
    }
    Ok(meta)
}

pub(crate) fn kind_from_type(name: &str) -> Kind {
    match name.to_ascii_uppercase().as_str() {
        "INTEGER" | "INT" | "BIGINT" => Kind::Int,
        "REAL" | "FLOAT" | "DOUBLE" => Kind::Float,
        "NUMERIC" | "DECIMAL" => Kind::Decimal,
        "BOOLEAN" => Kind::Bool,
        "BLOB" => Kind::Bytes,
        "DATETIME" | "TIMESTAMP" => Kind::Datetime,
        "DATE" => Kind::Date,
        "TIME" => Kind::Time,
        _ => Kind::Text,
    }
}

pub(crate) async fn stream(
    pool: &SqlitePool,
    sql: &str,
    tx: mpsc::Sender<Record>,
    cancel: &CancellationToken,
) -> Result<u64> {
    let mut rows = sqlx::query(sql).fetch(pool);
    let mut sent = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            next = rows.try_next() => match next.map_err(Error::from)? {
                Some(row) => {
                    let rec = row_to_record(&row)?;
                    if tx.send(rec).await.is_err() {
                        break;
                    }
                    sent += 1;
                }
                None => break,
            },
        }
    }
    Ok(sent)
}

fn row_to_record(row: &SqliteRow) -> Result<Record> {
    let mut rec = Vec::with_capacity(row.columns().len());
    for i in 0..row.columns().len() {
        let (is_null, tname) = {
            let raw = row.try_get_raw(i)?;
            (raw.is_null(), raw.type_info().name().to_string())
        };
        if is_null {
            rec.push(Value::Null);
            continue;
        }
        let val = match tname.as_str() {
            "INTEGER" => Value::Int(row.try_get::<i64, _>(i)?),
            "REAL" => Value::Float(row.try_get::<f64, _>(i)?),
            "BLOB" => Value::Bytes(row.try_get::<Vec<u8>, _>(i)?),
            "BOOLEAN" => Value::Bool(row.try_get::<bool, _>(i)?),
            _ => Value::Text(row.try_get::<String, _>(i)?),
        };
        rec.push(val);
    }
    Ok(rec)
}

pub(crate) async fn source_metadata(pool: &SqlitePool) -> Result<SourceMetadata> {
    // sqlite_master rows come back in creation order, which preserves e.g.
    // workbook sheet order for scratch databases.
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    )
    .fetch_all(pool)
    .await?;

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let rows = sqlx::query(&format!(
            "PRAGMA table_info({})",
            Dialect::Sqlite.quote(&name)
        ))
        .fetch_all(pool)
        .await?;
        let cols = rows
            .iter()
            .map(|r| {
                Ok(FieldMeta {
                    name: r.try_get::<String, _>("name")?,
                    kind: kind_from_type(&r.try_get::<String, _>("type")?),
                    nullable: r.try_get::<i64, _>("notnull")? == 0,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        tables.push(TableMeta { name, cols });
    }
    Ok(SourceMetadata { tables })
}

pub(crate) async fn insert_batch(
    pool: &SqlitePool,
    table: &str,
    cols: &[String],
    recs: &[Record],
) -> Result<u64> {
    let sql = insert_sql(Dialect::Sqlite, table, cols, recs.len());
    let mut q = sqlx::query(&sql);
    for rec in recs {
        for val in rec {
            q = match val.clone() {
                Value::Null => q.bind(Option::<String>::None),
                Value::Text(s) => q.bind(s),
                Value::Int(n) => q.bind(n),
                Value::Float(f) => q.bind(f),
                // sqlx has no sqlite Decimal codec; store the exact text.
                Value::Decimal(d) => q.bind(d.to_string()),
                Value::Bool(b) => q.bind(b),
                Value::Bytes(b) => q.bind(b),
                Value::Datetime(dt) => q.bind(dt),
                Value::Date(d) => q.bind(d),
                Value::Time(t) => q.bind(t),
            };
        }
    }
    let res = q.execute(pool).await?;
    Ok(res.rows_affected())
}
