//! An operator over materialized tuples.

use crate::errors::ExecResult;
use crate::executor::Executor;
use shale::{DbError, Tuple, TupleDesc};

/// Serves a fixed vector of tuples through the operator contract. The
/// aggregation operator emits its groups through one of these; tests use it
/// as a child source.
pub struct TupleIterator {
    desc: TupleDesc,
    tuples: Vec<Tuple>,
    cursor: Option<usize>,
}

impl TupleIterator {
    pub fn new(desc: TupleDesc, tuples: Vec<Tuple>) -> Self {
        Self {
            desc,
            tuples,
            cursor: None,
        }
    }
}

impl Executor for TupleIterator {
    fn open(&mut self) -> ExecResult<()> {
        self.cursor = Some(0);
        Ok(())
    }

    fn next(&mut self) -> ExecResult<Option<Tuple>> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Err(DbError::invalid("operator is not open").into());
        };
        let next = self.tuples.get(*cursor).cloned();
        if next.is_some() {
            *cursor += 1;
        }
        Ok(next)
    }

    fn rewind(&mut self) -> ExecResult<()> {
        self.cursor = Some(0);
        Ok(())
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}
