use std::time::Duration;

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The engine rejected or could not execute a statement.
    #[error("database error: {0}")]
    Database(String),

    #[error("save_hits requires at least one hit")]
    EmptyBatch,

    #[error("{op} timed out after {after:?} waiting for the connection")]
    Timeout { op: &'static str, after: Duration },

    /// Committing a transaction the store opened itself failed. The logical
    /// write did not happen.
    #[error("commit failed: {0}")]
    Commit(String),

    #[error("negative delta {value} for {table}.{column}")]
    InvalidDelta {
        table: &'static str,
        column: &'static str,
        value: i64,
    },

    #[error("counter {table}.{column} would overflow")]
    CounterOverflow {
        table: &'static str,
        column: &'static str,
    },

    #[error("invalid stored row: {0}")]
    InvalidRow(String),
}
