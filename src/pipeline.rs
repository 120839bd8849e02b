//! The record pipeline: producer → bounded channel → consumer.
//!
//! One producer task streams rows from a driver; one consumer task (a
//! [`WriterAdapter`] wrapping a [`RecordWriter`], or a
//! [`crate::insert::BatchInserter`]) drains them. The channel is bounded, so
//! a slow consumer suspends the producer and vice versa. Records arrive in
//! producer order; nothing reorders them.
//!
//! Errors travel on a dedicated one-slot channel: the producer queues the
//! error first, then closes the record channel, so the consumer always
//! drains whatever arrived before observing the failure. Cancellation stops
//! the producer with [`Error::Cancelled`] through the same path.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::driver::Database;
use crate::error::{Error, Result};
use crate::output::RecordWriter;
use crate::record::{munge, Record, RecordMeta};

/// Capacity of the record channel between producer and consumer.
pub const DEFAULT_RECORD_CH_SIZE: usize = 1024;

/// Records per `write_records` call on the consumer side.
const WRITE_BATCH: usize = 64;

/// Spawns the producer task for `sql` against `db`, feeding records into
/// `tx`. The consumer on the other side may be a [`WriterAdapter`] or a
/// [`crate::insert::BatchInserter`]'s sender.
///
/// Returns the error channel. It yields at most one error, and the error is
/// always queued before the record channel closes, so a consumer that sees
/// the channel close can poll it without racing.
pub fn spawn_producer_into(
    db: Database,
    sql: String,
    meta: RecordMeta,
    tx: mpsc::Sender<Record>,
    cancel: CancellationToken,
) -> mpsc::Receiver<Error> {
    let (err_tx, err_rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let stream_tx = tx.clone();
        let res = db.stream_records(&sql, &meta, stream_tx, &cancel).await;
        match res {
            Ok(n) => debug!(records = n, "producer finished"),
            Err(e) => {
                // Queue the error before the record channel closes.
                let _ = err_tx.send(e).await;
            }
        }
        drop(tx);
    });

    err_rx
}

/// A consumer task formatting records through a [`RecordWriter`].
pub struct WriterAdapter {
    handle: JoinHandle<Result<u64>>,
}

impl WriterAdapter {
    /// Spawns the consumer. `meta` is the writer's record meta; incoming
    /// records are munged to it before writing.
    pub fn spawn(
        mut writer: Box<dyn RecordWriter + Send>,
        meta: RecordMeta,
        mut rx: mpsc::Receiver<Record>,
        mut err_rx: mpsc::Receiver<Error>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            writer.open(&meta)?;
            let mut buf: Vec<Record> = Vec::with_capacity(WRITE_BATCH);
            let mut count = 0u64;

            // Drain until the producer closes the channel; an error, if any,
            // is waiting on err_rx afterwards.
            while let Some(mut rec) = rx.recv().await {
                munge(&mut rec, &meta)?;
                buf.push(rec);
                count += 1;
                if buf.len() >= WRITE_BATCH {
                    writer.write_records(&buf)?;
                    writer.flush()?;
                    buf.clear();
                }
            }
            if !buf.is_empty() {
                writer.write_records(&buf)?;
            }

            if let Ok(err) = err_rx.try_recv() {
                writer.flush()?;
                return Err(err);
            }

            writer.close()?;
            Ok(count)
        });
        Self { handle }
    }

    /// Joins the consumer, returning the number of records written.
    pub async fn wait(self) -> Result<u64> {
        self.handle
            .await
            .map_err(|e| Error::Driver(format!("writer task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FieldMeta, Value};
    use crate::kind::Kind;

    /// Writer that records what it sees, for pipeline assertions.
    struct Probe {
        opened: bool,
        closed: bool,
        sink: std::sync::Arc<std::sync::Mutex<Vec<Record>>>,
    }

    impl Probe {
        fn new(sink: std::sync::Arc<std::sync::Mutex<Vec<Record>>>) -> Self {
            Self {
                opened: false,
                closed: false,
                sink,
            }
        }
    }

    impl RecordWriter for Probe {
        fn open(&mut self, _meta: &RecordMeta) -> Result<()> {
            self.opened = true;
            Ok(())
        }

        fn write_records(&mut self, recs: &[Record]) -> Result<()> {
            assert!(self.opened && !self.closed);
            self.sink.lock().unwrap().extend_from_slice(recs);
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    fn int_meta() -> RecordMeta {
        vec![FieldMeta::new("n", Kind::Int)]
    }

    #[tokio::test]
    async fn n_records_in_order_no_error() {
        let (tx, rx) = mpsc::channel(DEFAULT_RECORD_CH_SIZE);
        let (_err_tx, err_rx) = mpsc::channel::<Error>(1);
        let sink = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let adapter = WriterAdapter::spawn(Box::new(Probe::new(sink.clone())), int_meta(), rx, err_rx);

        for i in 0..500i64 {
            tx.send(vec![Value::Int(i)]).await.unwrap();
        }
        drop(tx);

        let count = adapter.wait().await.unwrap();
        assert_eq!(count, 500);
        let got = sink.lock().unwrap();
        assert_eq!(got.len(), 500);
        for (i, rec) in got.iter().enumerate() {
            assert_eq!(rec[0], Value::Int(i as i64));
        }
    }

    #[tokio::test]
    async fn cancellation_surfaces_after_drain() {
        let (tx, rx) = mpsc::channel(DEFAULT_RECORD_CH_SIZE);
        let (err_tx, err_rx) = mpsc::channel::<Error>(1);
        let sink = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let adapter = WriterAdapter::spawn(Box::new(Probe::new(sink.clone())), int_meta(), rx, err_rx);

        // Producer sends k records, then fails as if cancelled mid-query.
        for i in 0..3i64 {
            tx.send(vec![Value::Int(i)]).await.unwrap();
        }
        err_tx.send(Error::Cancelled).await.unwrap();
        drop(tx);

        let err = adapter.wait().await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        // Everything sent before cancellation was still delivered.
        assert_eq!(sink.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn backpressure_bounds_the_channel() {
        let (tx, mut rx) = mpsc::channel::<Record>(4);
        for i in 0..4i64 {
            tx.send(vec![Value::Int(i)]).await.unwrap();
        }
        // A fifth send would suspend; try_send makes that observable.
        assert!(tx.try_send(vec![Value::Int(4)]).is_err());
        rx.recv().await.unwrap();
        assert!(tx.try_send(vec![Value::Int(4)]).is_ok());
    }
}
