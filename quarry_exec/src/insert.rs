//! The insert driver operator.

use crate::errors::{ExecError, ExecResult};
use crate::executor::Executor;
use shale::{Database, DataType, Field, TransactionId, Tuple, TupleDesc};

/// Routes every child tuple into a table through the buffer pool, then
/// emits a single one-field tuple carrying the inserted count. One-shot:
/// subsequent pulls yield end-of-stream.
pub struct Insert<'a> {
    db: &'a Database,
    tid: TransactionId,
    child: Box<dyn Executor + 'a>,
    table_id: u32,
    desc: TupleDesc,
    done: bool,
}

impl<'a> Insert<'a> {
    pub fn new(
        db: &'a Database,
        tid: TransactionId,
        child: Box<dyn Executor + 'a>,
        table_id: u32,
    ) -> ExecResult<Self> {
        let table_desc = db.catalog().tuple_desc(table_id)?;
        if table_desc != *child.tuple_desc() {
            return Err(ExecError::IllegalArgument(
                "child schema does not match the target table".to_string(),
            ));
        }
        Ok(Self {
            db,
            tid,
            child,
            table_id,
            desc: TupleDesc::new(vec![DataType::Int]),
            done: false,
        })
    }
}

impl Executor for Insert<'_> {
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
        while let Some(mut t) = self.child.next()? {
            self.db
                .buffer_pool()
                .insert_tuple(self.tid, self.table_id, &mut t)?;
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
