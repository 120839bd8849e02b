//! Scratch databases for document sources.
//!
//! Each opened document source gets one private in-memory SQLite database
//! holding its materialized tables. The scratch database is fully populated
//! before the first query runs against it, and is dropped with the pool at
//! process exit.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::driver::{Database, DbPool};
use crate::error::Result;
use crate::source::Source;

pub(crate) async fn open(src: &Source) -> Result<Database> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

    // A single connection: each in-memory connection is its own database,
    // and the pool must never recycle it or the data vanishes.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    Ok(Database::new(src.clone(), DbPool::Sqlite(pool)))
}
