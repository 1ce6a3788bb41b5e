//! The pull-based operator contract.

use crate::errors::ExecResult;
use shale::{Tuple, TupleDesc};

/// A volcano-style operator: `open` prepares it, `next` pulls one tuple at
/// a time until `None`, `rewind` restarts the stream. Operators run on
/// behalf of one transaction and reach storage through the shared
/// `Database` handle.
pub trait Executor {
    fn open(&mut self) -> ExecResult<()>;

    fn next(&mut self) -> ExecResult<Option<Tuple>>;

    fn rewind(&mut self) -> ExecResult<()>;

    /// Schema of the tuples this operator emits.
    fn tuple_desc(&self) -> &TupleDesc;
}
