//! PostgreSQL driver.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, Executor, PgPool, Row, TypeInfo, ValueRef};
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

pub struct PostgresDriver;

#[async_trait]
impl Driver for PostgresDriver {
    fn metadata(&self) -> DriverMetadata {
        DriverMetadata {
            ty: SourceType::Postgres,
            monotable: false,
            supports_sql: true,
            description: "PostgreSQL",
        }
    }

    async fn open(&self, src: &Source, _cancel: &CancellationToken) -> Result<Database> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&src.location)
            .await
            .map_err(|e| Error::Connect {
                handle: src.handle.clone(),
                message: e.to_string(),
            })?;
        Ok(Database::new(src.clone(), DbPool::Postgres(pool)))
    }

    async fn ping(&self, src: &Source) -> Result<()> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(&src.location)
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

/// Postgres type name → kind. Accepts both wire-protocol names (`INT8`,
/// `TIMESTAMPTZ`) and information-schema names (`bigint`, `timestamp with
/// time zone`).
pub(crate) fn kind_from_type(name: &str) -> Kind {
    let name = name.to_ascii_uppercase();
    if name.contains("BOOL") {
        Kind::Bool
    } else if name.contains("BYTEA") {
        Kind::Bytes
    } else if name.contains("TIMESTAMP") {
        Kind::Datetime
    } else if name == "DATE" {
        Kind::Date
    } else if name.starts_with("TIME") {
        Kind::Time
    } else if name.contains("INT") {
        Kind::Int
    } else if name.contains("FLOAT") || name.contains("DOUBLE") || name.contains("REAL") {
        Kind::Float
    } else if name.contains("NUMERIC") || name.contains("DECIMAL") {
        Kind::Decimal
    } else {
        Kind::Text
    }
}

pub(crate) async fn describe(pool: &PgPool, sql: &str) -> Result<RecordMeta> {
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

pub(crate) async fn stream(
    pool: &PgPool,
    sql: &str,
    meta: &RecordMeta,
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
                    let rec = row_to_record(&row, meta)?;
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

fn row_to_record(row: &PgRow, meta: &RecordMeta) -> Result<Record> {
    let mut rec = Vec::with_capacity(meta.len());
    for (i, field) in meta.iter().enumerate() {
        if row.try_get_raw(i)?.is_null() {
            rec.push(Value::Null);
            continue;
        }
        rec.push(decode(row, i, field.kind)?);
    }
    Ok(rec)
}

fn decode(row: &PgRow, i: usize, kind: Kind) -> Result<Value> {
    let val = match kind {
        Kind::Int => match row.try_get::<i64, _>(i) {
            Ok(n) => Value::Int(n),
            Err(_) => match row.try_get::<i32, _>(i) {
                Ok(n) => Value::Int(n as i64),
                Err(_) => Value::Int(row.try_get::<i16, _>(i)? as i64),
            },
        },
        Kind::Float => match row.try_get::<f64, _>(i) {
            Ok(f) => Value::Float(f),
            Err(_) => Value::Float(row.try_get::<f32, _>(i)? as f64),
        },
        Kind::Decimal => Value::Decimal(row.try_get::<Decimal, _>(i)?),
        Kind::Bool => Value::Bool(row.try_get::<bool, _>(i)?),
        Kind::Bytes => Value::Bytes(row.try_get::<Vec<u8>, _>(i)?),
        Kind::Datetime => match row.try_get::<DateTime<Utc>, _>(i) {
            Ok(dt) => Value::Datetime(dt),
            Err(_) => Value::Datetime(row.try_get::<NaiveDateTime, _>(i)?.and_utc()),
        },
        Kind::Date => Value::Date(row.try_get::<NaiveDate, _>(i)?),
        Kind::Time => Value::Time(row.try_get::<NaiveTime, _>(i)?),
        Kind::Text | Kind::Null => Value::Text(row.try_get::<String, _>(i)?),
    };
    Ok(val)
}

pub(crate) async fn source_metadata(pool: &PgPool) -> Result<SourceMetadata> {
    let rows = sqlx::query(
        "SELECT table_name AS tbl, column_name AS col, data_type AS typ, is_nullable AS nullable \
         FROM information_schema.columns \
         WHERE table_schema = 'public' \
         ORDER BY table_name, ordinal_position",
    )
    .fetch_all(pool)
    .await?;

    let mut tables: Vec<TableMeta> = Vec::new();
    for row in rows {
        let tbl: String = row.try_get("tbl")?;
        let col: String = row.try_get("col")?;
        let typ: String = row.try_get("typ")?;
        let nullable: String = row.try_get("nullable")?;
        let field = FieldMeta {
            name: col,
            kind: kind_from_type(&typ),
            nullable: nullable.eq_ignore_ascii_case("yes"),
        };
        match tables.last_mut() {
            Some(t) if t.name == tbl => t.cols.push(field),
            _ => tables.push(TableMeta {
                name: tbl,
                cols: vec![field],
            }),
        }
    }
    Ok(SourceMetadata { tables })
}

pub(crate) async fn insert_batch(
    pool: &PgPool,
    table: &str,
    cols: &[String],
    recs: &[Record],
) -> Result<u64> {
    let sql = insert_sql(Dialect::Postgres, table, cols, recs.len());
    let mut q = sqlx::query(&sql);
    for rec in recs {
        for val in rec {
            q = match val.clone() {
                Value::Null => q.bind(Option::<String>::None),
                Value::Text(s) => q.bind(s),
                Value::Int(n) => q.bind(n),
                Value::Float(f) => q.bind(f),
                Value::Decimal(d) => q.bind(d),
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
