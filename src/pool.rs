//! The process-wide database pool.
//!
//! Opened databases are cached by source handle: the second open of a handle
//! returns the first instance, which matters doubly for document sources
//! (re-opening would re-import the file into a fresh scratch database).
//! Everything is closed exactly once at shutdown.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::driver::{Database, DriverRegistry};
use crate::error::Result;
use crate::source::Source;

pub struct DatabasePool {
    registry: Arc<DriverRegistry>,
    dbs: Mutex<HashMap<String, Database>>,
}

impl DatabasePool {
    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self {
            registry,
            dbs: Mutex::new(HashMap::new()),
        }
    }

    /// Opens `src`, or returns the cached database if this handle was opened
    /// before. The lock is held across the open so concurrent callers never
    /// materialize the same source twice.
    pub async fn open(&self, src: &Source, cancel: &CancellationToken) -> Result<Database> {
        let mut dbs = self.dbs.lock().await;
        if let Some(db) = dbs.get(&src.handle) {
            return Ok(db.clone());
        }
        let driver = self.registry.driver_for(src.ty)?;
        debug!(handle = %src.handle, ty = %src.ty, "opening source");
        let db = driver.open(src, cancel).await?;
        dbs.insert(src.handle.clone(), db.clone());
        Ok(db)
    }

    /// Closes every cached database. Called once at shutdown.
    pub async fn close_all(&self) {
        let mut dbs = self.dbs.lock().await;
        for (_, db) in dbs.drain() {
            db.close().await;
        }
    }
}
