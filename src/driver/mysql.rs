//! MySQL driver.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Executor, MySqlPool, Row, TypeInfo, ValueRef};
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

pub struct MysqlDriver;

#[async_trait]
impl Driver for MysqlDriver {
    fn metadata(&self) -> DriverMetadata {
        DriverMetadata {
            ty: SourceType::Mysql,
            monotable: false,
            supports_sql: true,
            description: "MySQL",
        }
    }

    async fn open(&self, src: &Source, _cancel: &CancellationToken) -> Result<Database> {
        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .connect(&src.location)
            .await
            .map_err(|e| Error::Connect {
                handle: src.handle.clone(),
                message: e.to_string(),
            })?;
        Ok(Database::new(src.clone(), DbPool::Mysql(pool)))
    }

    async fn ping(&self, src: &Source) -> Result<()> {
        let pool = MySqlPoolOptions::new()
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

/// MySQL native type name → kind.
pub(crate) fn kind_from_type(name: &str) -> Kind {
    let name = name.to_ascii_uppercase();
    match name.as_str() {
        "BOOLEAN" => Kind::Bool,
        "FLOAT" | "DOUBLE" => Kind::Float,
        "DECIMAL" | "NEWDECIMAL" => Kind::Decimal,
        "DATETIME" | "TIMESTAMP" => Kind::Datetime,
        "DATE" => Kind::Date,
        "TIME" => Kind::Time,
        _ if name.contains("BLOB") || name.contains("BINARY") => Kind::Bytes,
        _ if name.contains("INT") || name == "YEAR" => Kind::Int,
        _ => Kind::Text,
    }
}

pub(crate) async fn describe(pool: &MySqlPool, sql: &str) -> Result<RecordMeta> {
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
    pool: &MySqlPool,
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

fn row_to_record(row: &MySqlRow, meta: &RecordMeta) -> Result<Record> {
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

fn decode(row: &MySqlRow, i: usize, kind: Kind) -> Result<Value> {
    let val = match kind {
        Kind::Int => match row.try_get::<i64, _>(i) {
            Ok(n) => Value::Int(n),
            // Unsigned BIGINT needs the u64 path.
            Err(_) => {
                let n = row.try_get::<u64, _>(i)?;
                Value::Int(i64::try_from(n).map_err(|_| {
                    Error::Driver(format!("unsigned value at column {i} overflows int"))
                })?)
            }
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

pub(crate) async fn source_metadata(pool: &MySqlPool) -> Result<SourceMetadata> {
    let rows = sqlx::query(
        "SELECT table_name AS tbl, column_name AS col, data_type AS typ, is_nullable AS nullable \
         FROM information_schema.columns \
         WHERE table_schema = DATABASE() \
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
    pool: &MySqlPool,
    table: &str,
    cols: &[String],
    recs: &[Record],
) -> Result<u64> {
    let sql = insert_sql(Dialect::Mysql, table, cols, recs.len());
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
                Value::Datetime(dt) => q.bind(dt.naive_utc()),
                Value::Date(d) => q.bind(d),
                Value::Time(t) => q.bind(t),
            };
        }
    }
    let res = q.execute(pool).await?;
    Ok(res.rows_affected())
}
