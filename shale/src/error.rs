//! Error types shared across the storage engine.

use std::io;
use thiserror::Error;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    /// Disk read/write failure or missing file.
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),

    /// Contract violation: schema mismatch, missing tuple, exhausted pool.
    #[error("{0}")]
    Invalid(String),

    /// The transaction was picked as a deadlock victim or aborted externally.
    /// The caller must complete the transaction with `commit = false` and
    /// may then retry with a fresh one.
    #[error("transaction aborted")]
    Aborted,

    /// Construction-time misuse of an API.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
}

impl DbError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        DbError::Invalid(msg.into())
    }
}
