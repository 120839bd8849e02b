//! The driver abstraction: one streaming-record interface over
//! heterogeneous backends.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               DriverRegistry                 │
//! │  ┌────────┐ ┌──────────┐ ┌────────────────┐  │
//! │  │ SQL    │ │ Document │ │ ext/ aliases   │  │
//! │  │ my/pg/ │ │ csv/tsv/ │ │ (parameterized │  │
//! │  │ sqlite │ │ xlsx     │ │  doc drivers)  │  │
//! │  └────────┘ └──────────┘ └────────────────┘  │
//! └──────────────────┬───────────────────────────┘
//!                    ▼
//!      open(Source) → Database → records
//! ```
//!
//! A [`Driver`] knows how to open and ping one [`SourceType`]. Opening a SQL
//! source yields a [`Database`] over a live connection pool; opening a
//! document source materializes the file into an in-memory scratch database
//! first, and the returned [`Database`] serves queries from there. Either
//! way, callers see the same interface: describe a query, stream its records,
//! create tables, insert batches.

mod csv;
mod mysql;
mod postgres;
mod sqlite;
mod xlsx;

pub use csv::CsvDriver;
pub use mysql::MysqlDriver;
pub use postgres::PostgresDriver;
pub use sqlite::SqliteDriver;
pub use xlsx::XlsxDriver;

use std::collections::HashMap;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{MySqlPool, PgPool, SqlitePool};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::kind::Kind;
use crate::plan::Dialect;
use crate::record::{Record, RecordMeta};
use crate::source::{Source, SourceType};

/// Capability record for a driver.
#[derive(Debug, Clone)]
pub struct DriverMetadata {
    pub ty: SourceType,
    /// The source presents exactly one implicit table named `data`.
    pub monotable: bool,
    /// The backend executes SQL directly; document drivers answer through
    /// the scratch database instead.
    pub supports_sql: bool,
    pub description: &'static str,
}

/// Metadata for one table of an opened source.
#[derive(Debug, Clone)]
pub struct TableMeta {
    pub name: String,
    pub cols: Vec<crate::record::FieldMeta>,
}

/// Metadata for an opened source: its tables, in the source's own order.
#[derive(Debug, Clone)]
pub struct SourceMetadata {
    pub tables: Vec<TableMeta>,
}

/// Definition of a table to create, produced by the importer and by the
/// insert path when the destination table is absent.
#[derive(Debug, Clone)]
pub struct TableDef {
    pub name: String,
    pub cols: Vec<ColDef>,
}

#[derive(Debug, Clone)]
pub struct ColDef {
    pub name: String,
    pub kind: Kind,
    pub not_null: bool,
    pub primary_key: bool,
}

impl ColDef {
    pub fn new(name: impl Into<String>, kind: Kind) -> Self {
        Self {
            name: name.into(),
            kind,
            not_null: false,
            primary_key: false,
        }
    }
}

impl TableDef {
    pub fn col_names(&self) -> Vec<String> {
        self.cols.iter().map(|c| c.name.clone()).collect()
    }

    /// The record meta a stream feeding this table must munge to.
    pub fn record_meta(&self) -> RecordMeta {
        self.cols
            .iter()
            .map(|c| crate::record::FieldMeta {
                name: c.name.clone(),
                kind: c.kind,
                nullable: !c.not_null,
            })
            .collect()
    }
}

/// A driver opens and pings sources of one type.
#[async_trait]
pub trait Driver: Send + Sync {
    fn metadata(&self) -> DriverMetadata;

    /// Opens the source. For document drivers this materializes the file
    /// into a scratch database, honoring `cancel` during the import.
    async fn open(&self, src: &Source, cancel: &CancellationToken) -> Result<Database>;

    /// Cheap health check. Does not materialize document sources.
    async fn ping(&self, src: &Source) -> Result<()>;
}

/// Maps source types to driver singletons.
pub struct DriverRegistry {
    drivers: HashMap<SourceType, Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// A registry with all built-in drivers registered.
    pub fn with_defaults() -> Self {
        let mut reg = Self {
            drivers: HashMap::new(),
        };
        reg.register(Arc::new(SqliteDriver));
        reg.register(Arc::new(MysqlDriver));
        reg.register(Arc::new(PostgresDriver));
        reg.register(Arc::new(CsvDriver::comma()));
        reg.register(Arc::new(CsvDriver::tab()));
        reg.register(Arc::new(XlsxDriver));
        reg
    }

    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        self.drivers.insert(driver.metadata().ty, driver);
    }

    pub fn driver_for(&self, ty: SourceType) -> Result<Arc<dyn Driver>> {
        self.drivers
            .get(&ty)
            .cloned()
            .ok_or_else(|| Error::UnknownDriver(ty.as_str().to_string()))
    }
}

/// An opened source: a connection pool plus the source it came from.
///
/// Cloning is cheap (pools are reference-counted); the process-wide pool in
/// [`crate::pool::DatabasePool`] hands out clones and closes the underlying
/// pool exactly once at shutdown.
#[derive(Clone)]
pub struct Database {
    src: Source,
    pool: DbPool,
}

#[derive(Clone)]
pub(crate) enum DbPool {
    Sqlite(SqlitePool),
    Mysql(MySqlPool),
    Postgres(PgPool),
}

impl Database {
    pub(crate) fn new(src: Source, pool: DbPool) -> Self {
        Self { src, pool }
    }

    pub fn source(&self) -> &Source {
        &self.src
    }

    /// The SQL dialect queries against this database are lowered to.
    /// Document sources answer in the scratch database's dialect.
    pub fn dialect(&self) -> Dialect {
        match self.pool {
            DbPool::Sqlite(_) => Dialect::Sqlite,
            DbPool::Mysql(_) => Dialect::Mysql,
            DbPool::Postgres(_) => Dialect::Postgres,
        }
    }

    /// Prepares `sql` server-side and returns the output column metadata
    /// without executing it.
    pub async fn describe(&self, sql: &str) -> Result<RecordMeta> {
        match &self.pool {
            DbPool::Sqlite(p) => sqlite::describe(p, sql).await,
            DbPool::Mysql(p) => mysql::describe(p, sql).await,
            DbPool::Postgres(p) => postgres::describe(p, sql).await,
        }
    }

    /// Executes `sql`, sending each row as a [`Record`] on `tx` in result
    /// order. Returns the number of records sent. Suspends when the channel
    /// is full; stops with [`Error::Cancelled`] when `cancel` fires.
    pub async fn stream_records(
        &self,
        sql: &str,
        meta: &RecordMeta,
        tx: mpsc::Sender<Record>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        debug!(sql, handle = %self.src.handle, "streaming records");
        match &self.pool {
            DbPool::Sqlite(p) => sqlite::stream(p, sql, tx, cancel).await,
            DbPool::Mysql(p) => mysql::stream(p, sql, meta, tx, cancel).await,
            DbPool::Postgres(p) => postgres::stream(p, sql, meta, tx, cancel).await,
        }
    }

    /// Tables (with columns) of this source, in the source's order.
    pub async fn source_metadata(&self) -> Result<SourceMetadata> {
        match &self.pool {
            DbPool::Sqlite(p) => sqlite::source_metadata(p).await,
            DbPool::Mysql(p) => mysql::source_metadata(p).await,
            DbPool::Postgres(p) => postgres::source_metadata(p).await,
        }
    }

    pub async fn create_table(&self, def: &TableDef) -> Result<()> {
        let sql = create_table_sql(self.dialect(), def);
        debug!(sql = %sql, "creating table");
        match &self.pool {
            DbPool::Sqlite(p) => sqlx::query(&sql).execute(p).await.map(|_| ())?,
            DbPool::Mysql(p) => sqlx::query(&sql).execute(p).await.map(|_| ())?,
            DbPool::Postgres(p) => sqlx::query(&sql).execute(p).await.map(|_| ())?,
        }
        Ok(())
    }

    /// Inserts `recs` into `table` in one multi-row statement. Values must
    /// already be munged to the destination kinds.
    pub async fn insert_batch(
        &self,
        table: &str,
        cols: &[String],
        recs: &[Record],
    ) -> Result<u64> {
        if recs.is_empty() {
            return Ok(0);
        }
        match &self.pool {
            DbPool::Sqlite(p) => sqlite::insert_batch(p, table, cols, recs).await,
            DbPool::Mysql(p) => mysql::insert_batch(p, table, cols, recs).await,
            DbPool::Postgres(p) => postgres::insert_batch(p, table, cols, recs).await,
        }
    }

    pub async fn close(&self) {
        match &self.pool {
            DbPool::Sqlite(p) => p.close().await,
            DbPool::Mysql(p) => p.close().await,
            DbPool::Postgres(p) => p.close().await,
        }
    }
}

/// Largest number of records per insert batch: the backend's bind-parameter
/// budget divided by the column count, capped to keep statements reasonable.
pub fn max_batch_rows(dialect: Dialect, num_cols: usize) -> usize {
    let max_params = match dialect {
        Dialect::Sqlite => 999,
        Dialect::Mysql => 65_535,
        Dialect::Postgres => 32_767,
    };
    (max_params / num_cols.max(1)).clamp(1, 1000)
}

/// Multi-row `INSERT INTO t (cols…) VALUES …` with the dialect's
/// placeholder style.
pub(crate) fn insert_sql(dialect: Dialect, table: &str, cols: &[String], rows: usize) -> String {
    let col_list = cols
        .iter()
        .map(|c| dialect.quote(c))
        .collect::<Vec<_>>()
        .join(", ");
    let mut param = 0usize;
    let row_groups = (0..rows)
        .map(|_| {
            let placeholders = (0..cols.len())
                .map(|_| match dialect {
                    Dialect::Postgres => {
                        param += 1;
                        format!("${param}")
                    }
                    _ => "?".to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("({placeholders})")
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({col_list}) VALUES {row_groups}",
        dialect.quote(table)
    )
}

fn create_table_sql(dialect: Dialect, def: &TableDef) -> String {
    let cols = def
        .cols
        .iter()
        .map(|c| {
            let mut s = format!("{} {}", dialect.quote(&c.name), ddl_type(dialect, c.kind));
            if c.primary_key {
                s.push_str(" PRIMARY KEY");
            }
            if c.not_null {
                s.push_str(" NOT NULL");
            }
            s
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({cols})",
        dialect.quote(&def.name)
    )
}

fn ddl_type(dialect: Dialect, kind: Kind) -> &'static str {
    match dialect {
        Dialect::Sqlite => match kind {
            Kind::Int => "INTEGER",
            Kind::Float => "REAL",
            Kind::Decimal => "NUMERIC",
            Kind::Bool => "BOOLEAN",
            Kind::Bytes => "BLOB",
            Kind::Datetime => "DATETIME",
            Kind::Date => "DATE",
            Kind::Time => "TIME",
            Kind::Text | Kind::Null => "TEXT",
        },
        Dialect::Mysql => match kind {
            Kind::Int => "BIGINT",
            Kind::Float => "DOUBLE",
            Kind::Decimal => "DECIMAL(38,9)",
            Kind::Bool => "BOOLEAN",
            Kind::Bytes => "BLOB",
            Kind::Datetime => "DATETIME",
            Kind::Date => "DATE",
            Kind::Time => "TIME",
            Kind::Text | Kind::Null => "TEXT",
        },
        Dialect::Postgres => match kind {
            Kind::Int => "BIGINT",
            Kind::Float => "DOUBLE PRECISION",
            Kind::Decimal => "NUMERIC",
            Kind::Bool => "BOOLEAN",
            Kind::Bytes => "BYTEA",
            Kind::Datetime => "TIMESTAMPTZ",
            Kind::Date => "DATE",
            Kind::Time => "TIME",
            Kind::Text | Kind::Null => "TEXT",
        },
    }
}

/// Resolves a document source's location to a local path, downloading HTTPS
/// URLs to a temp file first. The temp file lives until process exit.
pub(crate) async fn local_document_path(src: &Source) -> Result<PathBuf> {
    let loc = &src.location;
    if !loc.starts_with("http://") && !loc.starts_with("https://") {
        return Ok(PathBuf::from(loc));
    }

    debug!(url = loc, "fetching remote document");
    let resp = reqwest::get(loc)
        .await
        .map_err(|e| Error::Connect {
            handle: src.handle.clone(),
            message: e.to_string(),
        })?
        .error_for_status()
        .map_err(|e| Error::Connect {
            handle: src.handle.clone(),
            message: e.to_string(),
        })?;
    let bytes = resp.bytes().await.map_err(|e| Error::Connect {
        handle: src.handle.clone(),
        message: e.to_string(),
    })?;

    let mut tmp = tempfile::NamedTempFile::new()?;
    tmp.write_all(&bytes)?;
    let (_file, path) = tmp.keep().map_err(|e| Error::Write(e.to_string()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_rows_respect_param_budget() {
        assert_eq!(max_batch_rows(Dialect::Sqlite, 3), 333);
        assert_eq!(max_batch_rows(Dialect::Sqlite, 2000), 1);
        assert_eq!(max_batch_rows(Dialect::Mysql, 100), 655);
        assert_eq!(max_batch_rows(Dialect::Postgres, 4), 1000);
    }

    #[test]
    fn create_table_ddl_per_dialect() {
        let def = TableDef {
            name: "people".to_string(),
            cols: vec![
                ColDef::new("id", Kind::Int),
                ColDef::new("name", Kind::Text),
                ColDef::new("born", Kind::Datetime),
            ],
        };
        assert_eq!(
            create_table_sql(Dialect::Sqlite, &def),
            "CREATE TABLE IF NOT EXISTS \"people\" (\"id\" INTEGER, \"name\" TEXT, \"born\" DATETIME)"
        );
        assert_eq!(
            create_table_sql(Dialect::Mysql, &def),
            "CREATE TABLE IF NOT EXISTS `people` (`id` BIGINT, `name` TEXT, `born` DATETIME)"
        );
    }

    #[test]
    fn registry_resolves_known_types() {
        let reg = DriverRegistry::with_defaults();
        let meta = reg.driver_for(SourceType::Csv).unwrap().metadata();
        assert!(meta.monotable);
        assert!(!meta.supports_sql);
        let meta = reg.driver_for(SourceType::Postgres).unwrap().metadata();
        assert!(!meta.monotable);
        assert!(meta.supports_sql);
    }
}
