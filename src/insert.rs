//! The batch inserter: a pipeline consumer that buffers records and flushes
//! them to a destination table in driver-sized batches.
//!
//! Inserts are best-effort, not transactional: a failure partway through
//! surfaces [`Error::InsertFailed`] carrying the number of rows that did
//! land, and nothing is rolled back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::driver::Database;
use crate::error::{Error, Result};
use crate::pipeline::DEFAULT_RECORD_CH_SIZE;
use crate::record::{munge, Record, RecordMeta};

/// Consumes records from a channel and inserts them into `table` on `db`.
///
/// Records are munged to `meta` (the destination column kinds) before
/// buffering. The buffer flushes whenever it reaches `batch_size`, and once
/// more on channel close. [`BatchInserter::wait`] joins the consumer task
/// and returns the affected-row count.
pub struct BatchInserter {
    tx: mpsc::Sender<Record>,
    handle: JoinHandle<Result<u64>>,
    written: Arc<AtomicU64>,
}

impl BatchInserter {
    pub fn new(
        db: Database,
        table: String,
        meta: RecordMeta,
        batch_size: usize,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(DEFAULT_RECORD_CH_SIZE);
        let written = Arc::new(AtomicU64::new(0));
        let counter = written.clone();
        let target = format!("{}.{}", db.source().handle, table);
        let handle = tokio::spawn(run(db, table, meta, batch_size, cancel, rx, counter, target));
        Self {
            tx,
            handle,
            written,
        }
    }

    /// A sender feeding this inserter. Drop all senders to finish the insert.
    pub fn sender(&self) -> mpsc::Sender<Record> {
        self.tx.clone()
    }

    /// Rows inserted so far.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Closes this side's sender, joins the consumer, and returns the
    /// affected-row count.
    pub async fn wait(self) -> Result<u64> {
        drop(self.tx);
        self.handle
            .await
            .map_err(|e| Error::Driver(format!("inserter task failed: {e}")))?
    }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    db: Database,
    table: String,
    meta: RecordMeta,
    batch_size: usize,
    cancel: CancellationToken,
    mut rx: mpsc::Receiver<Record>,
    written: Arc<AtomicU64>,
    target: String,
) -> Result<u64> {
    let cols: Vec<String> = meta.iter().map(|f| f.name.clone()).collect();
    let mut buf: Vec<Record> = Vec::with_capacity(batch_size);
    let mut total = 0u64;

    let failed = |total: u64, e: Error| match e {
        Error::Cancelled => Error::Cancelled,
        e => Error::InsertFailed {
            target: target.clone(),
            written: total,
            message: e.to_string(),
        },
    };

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            rec = rx.recv() => match rec {
                Some(mut rec) => {
                    munge(&mut rec, &meta).map_err(|e| failed(total, e))?;
                    buf.push(rec);
                    if buf.len() >= batch_size {
                        let n = db
                            .insert_batch(&table, &cols, &buf)
                            .await
                            .map_err(|e| failed(total, e))?;
                        total += n;
                        written.store(total, Ordering::Relaxed);
                        buf.clear();
                    }
                }
                None => break,
            },
        }
    }

    if !buf.is_empty() {
        let n = db
            .insert_batch(&table, &cols, &buf)
            .await
            .map_err(|e| failed(total, e))?;
        total += n;
        written.store(total, Ordering::Relaxed);
    }

    debug!(target = %target, rows = total, "batch insert complete");
    Ok(total)
}
