//! Error types shared across the query engine.
//!
//! Every fallible operation in the library returns [`Result`]. The [`Error`]
//! enum is deliberately flat: each variant is a distinct failure kind that the
//! CLI can map to an exit code and a user-facing message. Native driver
//! failures are wrapped in [`Error::Driver`] rather than leaking `sqlx` types
//! through the public API.

use thiserror::Error;

use crate::kind::Kind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("empty query")]
    EmptyQuery,

    #[error("invalid handle {0:?}: want @name with name matching [a-z][a-z0-9_]*")]
    InvalidHandle(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("unknown handle: {0}")]
    UnknownHandle(String),

    #[error("duplicate handle: {0}")]
    DuplicateHandle(String),

    #[error("no active source, and the query does not name one")]
    NoActiveSource,

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("unsupported function: {0}")]
    UnsupportedFunc(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("unknown driver type: {0}")]
    UnknownDriver(String),

    #[error("connect {handle}: {message}")]
    Connect { handle: String, message: String },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("source {0} has no tables")]
    SourceHasNoTables(String),

    #[error("source {0} reported an empty table name")]
    SourceEmptyTableName(String),

    #[error("{dialect} does not support {operation}")]
    DialectUnsupported {
        dialect: &'static str,
        operation: String,
    },

    #[error("kind mismatch for {col}: cannot coerce {actual} to {expected}")]
    KindMismatch {
        col: String,
        expected: Kind,
        actual: Kind,
    },

    #[error("driver: {0}")]
    Driver(String),

    #[error("cancelled")]
    Cancelled,

    #[error("write: {0}")]
    Write(String),

    #[error("insert into {target} failed after {written} row(s): {message}")]
    InsertFailed {
        target: String,
        written: u64,
        message: String,
    },
}

impl Error {
    /// Process exit code for this failure: 2 for usage and configuration
    /// errors, 1 for query and runtime errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::EmptyQuery
            | Error::InvalidHandle(_)
            | Error::Parse(_)
            | Error::UnknownHandle(_)
            | Error::DuplicateHandle(_)
            | Error::NoActiveSource
            | Error::InvalidOption(_)
            | Error::UnknownDriver(_) => 2,
            _ => 1,
        }
    }

    /// True for connect-time failures that are worth a single retry at ping.
    pub fn is_transient_connect(&self) -> bool {
        matches!(self, Error::Connect { .. } | Error::Timeout(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.message().to_lowercase().contains("access denied") => {
                Error::Auth(db.message().to_string())
            }
            sqlx::Error::Database(db)
                if db.message().to_lowercase().contains("authentication") =>
            {
                Error::Auth(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut => Error::Timeout("connection pool".to_string()),
            _ => Error::Driver(err.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Write(err.to_string())
    }
}
