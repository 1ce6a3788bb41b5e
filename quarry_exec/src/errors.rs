//! Operator-level errors.

use shale::DbError;
use thiserror::Error;

pub type ExecResult<T> = Result<T, ExecError>;

#[derive(Debug, Error)]
pub enum ExecError {
    /// A storage-layer failure, including transaction aborts.
    #[error(transparent)]
    Storage(#[from] DbError),

    /// Operator misuse caught at construction time.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
}
