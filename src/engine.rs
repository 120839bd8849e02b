//! Query execution orchestration.
//!
//! The engine owns the shared state of an invocation (the source set, the
//! driver registry, and the database pool) and drives the full flow:
//!
//! ```text
//! args → preprocess → parse → plan → open source → describe
//!      → producer task ──(bounded channel)──→ writer / batch inserter
//! ```
//!
//! The source set allows concurrent readers; mutations take the write lock.
//! Locks are never held across an await: source data is cloned out first.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{Config, Defaults};
use crate::driver::{max_batch_rows, ColDef, DriverRegistry, SourceMetadata, TableDef};
use crate::error::{Error, Result};
use crate::insert::BatchInserter;
use crate::kind::Kind;
use crate::output::{new_writer, Format, WriterOptions};
use crate::pipeline::{spawn_producer_into, WriterAdapter, DEFAULT_RECORD_CH_SIZE};
use crate::plan::plan;
use crate::pool::DatabasePool;
use crate::slq;
use crate::source::{parse_table_handle, Source, SourceSet, MONOTABLE_NAME, STDIN_HANDLE};

/// Options for one query invocation, mirroring the CLI surface.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Write to this file instead of stdout.
    pub output: Option<PathBuf>,
    /// Output format; falls back to the configured default.
    pub format: Option<Format>,
    /// Include a header row; falls back to the configured default.
    pub header: Option<bool>,
    /// Pretty-print where the format supports it.
    pub pretty: bool,
    /// Insert records into `@dest.tbl` instead of printing.
    pub insert: Option<String>,
    /// Override the active source for this invocation.
    pub active_src: Option<String>,
}

/// What a query invocation did.
#[derive(Debug)]
pub enum QueryOutcome {
    /// Records were rendered to the output stream.
    Printed { records: u64 },
    /// Records were inserted into another source.
    Inserted { rows: u64, target: String },
}

pub struct Engine {
    sources: RwLock<SourceSet>,
    registry: Arc<DriverRegistry>,
    pool: DatabasePool,
    defaults: Defaults,
}

impl Engine {
    pub fn new(config: &Config) -> Self {
        Self::with_registry(config, DriverRegistry::with_defaults())
    }

    pub fn with_registry(config: &Config, registry: DriverRegistry) -> Self {
        let registry = Arc::new(registry);
        Self {
            sources: RwLock::new(config.sources.clone()),
            registry: registry.clone(),
            pool: DatabasePool::new(registry),
            defaults: config.defaults.clone(),
        }
    }

    /// Runs a closure against the source set under the read lock.
    pub fn with_sources<T>(&self, f: impl FnOnce(&SourceSet) -> T) -> T {
        f(&self.sources.read())
    }

    /// Runs a closure against the source set under the write lock.
    pub fn with_sources_mut<T>(&self, f: impl FnOnce(&mut SourceSet) -> T) -> T {
        f(&mut self.sources.write())
    }

    /// Executes the SLQ query in `args` and renders or inserts the records.
    pub async fn execute_query(
        &self,
        args: &[String],
        opts: &QueryOptions,
        cancel: &CancellationToken,
    ) -> Result<QueryOutcome> {
        if let Some(handle) = &opts.active_src {
            self.with_sources_mut(|s| s.set_active(handle).map(|_| ()))?;
        }

        let query = self.preprocess(args, cancel).await?;
        debug!(query = %query, "preprocessed query");
        let ast = slq::parse(&query)?;

        let handle = slq::leading_handle(&query).ok_or(Error::NoActiveSource)?;
        let src = self.with_sources(|s| s.get(&handle).cloned())?;
        let db = self.pool.open(&src, cancel).await?;

        // Scratch-backed sources have cheap, authoritative metadata; use it
        // to fail on unknown tables and columns before touching the backend.
        let src_meta: Option<SourceMetadata> = if src.ty.is_document() {
            Some(db.source_metadata().await?)
        } else {
            None
        };

        let planned = plan(&ast, db.dialect(), src_meta.as_ref())?;
        debug!(sql = %planned.sql, dialect = db.dialect().name(), "planned query");
        let rec_meta = db.describe(&planned.sql).await?;

        match &opts.insert {
            Some(dest) => {
                let (dest_handle, dest_table) = parse_table_handle(dest)?;
                let dest_src = self.with_sources(|s| s.get(&dest_handle).cloned())?;
                if dest_src.ty.is_document() {
                    return Err(Error::DialectUnsupported {
                        dialect: dest_src.ty.as_str(),
                        operation: "insert".to_string(),
                    });
                }
                let dest_db = self.pool.open(&dest_src, cancel).await?;

                // Create the destination table if absent, shaped like the
                // query output.
                let def = TableDef {
                    name: dest_table.clone(),
                    cols: rec_meta
                        .iter()
                        .map(|f| {
                            ColDef::new(
                                f.name.clone(),
                                if f.kind == Kind::Null { Kind::Text } else { f.kind },
                            )
                        })
                        .collect(),
                };
                dest_db.create_table(&def).await?;

                let dest_meta = def.record_meta();
                let batch_size = max_batch_rows(dest_db.dialect(), dest_meta.len());
                let inserter = BatchInserter::new(
                    dest_db,
                    dest_table.clone(),
                    dest_meta,
                    batch_size,
                    cancel.clone(),
                );
                let mut err_rx = spawn_producer_into(
                    db.clone(),
                    planned.sql.clone(),
                    rec_meta,
                    inserter.sender(),
                    cancel.clone(),
                );

                let res = inserter.wait().await;
                if let Ok(err) = err_rx.try_recv() {
                    // The producer's error came first.
                    return Err(err);
                }
                let rows = res?;
                Ok(QueryOutcome::Inserted {
                    rows,
                    target: format!("{dest_handle}.{dest_table}"),
                })
            }
            None => {
                let format = opts.format.unwrap_or(self.defaults.format);
                let writer_opts = WriterOptions {
                    header: opts.header.unwrap_or(self.defaults.header),
                    pretty: opts.pretty,
                };
                let out: Box<dyn Write + Send> = match &opts.output {
                    Some(path) => Box::new(std::fs::File::create(path)?),
                    None => Box::new(std::io::stdout()),
                };
                let writer = new_writer(format, out, writer_opts);

                let (tx, rx) = tokio::sync::mpsc::channel(DEFAULT_RECORD_CH_SIZE);
                let err_rx = spawn_producer_into(
                    db.clone(),
                    planned.sql.clone(),
                    rec_meta.clone(),
                    tx,
                    cancel.clone(),
                );
                let adapter = WriterAdapter::spawn(writer, rec_meta, rx, err_rx);
                let records = adapter.wait().await?;
                Ok(QueryOutcome::Printed { records })
            }
        }
    }

    /// Applies the CLI rewrites: active-handle prepending for bare queries,
    /// and first-table synthesis for empty invocations with piped stdin.
    async fn preprocess(&self, args: &[String], cancel: &CancellationToken) -> Result<String> {
        let query = args
            .iter()
            .map(|a| a.trim())
            .collect::<Vec<_>>()
            .join(" ");

        if query.trim().is_empty() {
            return self.stdin_selector(cancel).await;
        }

        let active = self.with_sources(|s| s.active().map(|a| a.handle.clone()));
        let query = slq::ensure_handle(&query, active.as_deref())?;

        // The leading handle must refer to a registered source.
        if let Some(handle) = slq::leading_handle(&query) {
            self.with_sources(|s| s.get(&handle).map(|_| ()))?;
        }
        Ok(query)
    }

    /// For `cat file | qv` with no query text: select the pipe source's
    /// first table, `@stdin.data` for monotable drivers.
    async fn stdin_selector(&self, cancel: &CancellationToken) -> Result<String> {
        let active = self.with_sources(|s| s.active().cloned());
        let Some(src) = active else {
            return Err(Error::EmptyQuery);
        };
        if src.handle != STDIN_HANDLE {
            return Err(Error::EmptyQuery);
        }

        let driver = self.registry.driver_for(src.ty)?;
        if driver.metadata().monotable {
            return Ok(format!("{STDIN_HANDLE}.{MONOTABLE_NAME}"));
        }

        let db = self.pool.open(&src, cancel).await?;
        let meta = db.source_metadata().await?;
        let first = meta
            .tables
            .first()
            .ok_or_else(|| Error::SourceHasNoTables(src.handle.clone()))?;
        if first.name.is_empty() {
            return Err(Error::SourceEmptyTableName(src.handle.clone()));
        }
        Ok(format!("{STDIN_HANDLE}.{}", first.name))
    }

    /// Health-checks a source, retrying once on transient connect failures.
    /// Honors the configured ping timeout.
    pub async fn ping(&self, handle: Option<&str>) -> Result<()> {
        let src: Source = match handle {
            Some(h) => self.with_sources(|s| s.get(h).cloned())?,
            None => self
                .with_sources(|s| s.active().cloned())
                .ok_or(Error::NoActiveSource)?,
        };
        let driver = self.registry.driver_for(src.ty)?;
        let timeout = Duration::from_secs(self.defaults.ping_timeout_secs);

        let first = match tokio::time::timeout(timeout, driver.ping(&src)).await {
            Err(_) => Err(Error::Timeout(src.handle.clone())),
            Ok(res) => res,
        };
        match first {
            // One retry for transient connect-time failures; query errors
            // are never retried.
            Err(e) if e.is_transient_connect() => {
                match tokio::time::timeout(timeout, driver.ping(&src)).await {
                    Err(_) => Err(Error::Timeout(src.handle.clone())),
                    Ok(res) => res,
                }
            }
            other => other,
        }
    }

    /// Closes every opened database. Call once, at shutdown.
    pub async fn shutdown(&self) {
        self.pool.close_all().await;
    }
}
