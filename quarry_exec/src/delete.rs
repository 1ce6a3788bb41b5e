//! The delete driver operator.

use crate::errors::ExecResult;
use crate::executor::Executor;
use shale::{Database, DataType, Field, TransactionId, Tuple, TupleDesc};

/// Removes every child tuple from its table through the buffer pool, then
/// emits a single one-field tuple carrying the deleted count. One-shot:
/// subsequent pulls yield end-of-stream.
pub struct Delete<'a> {
    db: &'a Database,
    tid: TransactionId,
    child: Box<dyn Executor + 'a>,
    desc: TupleDesc,
    done: bool,
}

impl<'a> Delete<'a> {
    pub fn new(db: &'a Database, tid: TransactionId, child: Box<dyn Executor + 'a>) -> Self {
        Self {
            db,
            tid,
            child,
            desc: TupleDesc::new(vec![DataType::Int]),
            done: false,
        }
    }
}

impl Executor for Delete<'_> {
    fn open(&mut self) -> ExecResult<()> {
        self.done = false;
        self.child.open()
    }

    fn next(&mut self) -> ExecResult<Option<Tuple>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let mut count = 0;
        while let Some(t) = self.child.next()? {
            self.db.buffer_pool().delete_tuple(self.tid, &t)?;
            count += 1;
        }
        let result = Tuple::new(self.desc.clone(), vec![Field::Int(count)])?;
        Ok(Some(result))
    }

    fn rewind(&mut self) -> ExecResult<()> {
        self.done = false;
        self.child.rewind()
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}
