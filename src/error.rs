//! Error types for pos-backup
//!
//! Three failure classes matter to an operator:
//! - connectivity: the database file or remote store can't be reached, the run aborts
//! - per-record: one insert or delete failed, it is logged and the run continues
//! - malformed input: a snapshot or config file can't be trusted, the run aborts

use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Database file missing, pool could not hand out a connection, remote store unreachable
    #[error("connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(#[from] diesel::result::Error),

    /// A single row or document could not be written or deleted
    #[error("{table} record {key}: {message}")]
    Record {
        table: String,
        key: String,
        message: String,
    },

    #[error("table not found: {0}")]
    MissingTable(String),

    /// Snapshot, config or remote payload that doesn't have the expected shape
    #[error("malformed input: {0}")]
    Malformed(String),

    /// Remote store answered, but not with success
    #[error("remote store error: {0}")]
    Remote(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build a per-record failure
    pub fn record(table: &str, key: &str, message: impl std::fmt::Display) -> Self {
        Error::Record {
            table: table.to_string(),
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    /// True for failures that abort a run because nothing could be reached
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// True for failures scoped to a single record
    pub fn is_per_record(&self) -> bool {
        matches!(self, Error::Record { .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            Error::Connection(e.to_string())
        } else {
            Error::Remote(e.to_string())
        }
    }
}
