//! Sequential table scan.

use crate::errors::ExecResult;
use crate::executor::Executor;
use shale::heap_file::HeapFileIter;
use shale::{Database, DbError, TransactionId, Tuple, TupleDesc};

/// The leaf of every plan: walks a table's heap file page by page through
/// the buffer pool, so page locking happens as a side effect of pulling.
pub struct SeqScan<'a> {
    db: &'a Database,
    tid: TransactionId,
    table_id: u32,
    desc: TupleDesc,
    iter: Option<HeapFileIter<'a>>,
}

impl<'a> SeqScan<'a> {
    /// Field names in the emitted schema are prefixed with `alias`, the way
    /// a FROM-clause alias scopes them.
    pub fn new(
        db: &'a Database,
        tid: TransactionId,
        table_id: u32,
        alias: &str,
    ) -> ExecResult<Self> {
        let base = db.catalog().tuple_desc(table_id)?;
        let items = (0..base.num_fields())
            .map(|i| {
                let name = base
                    .field_name(i)
                    .map(|n| format!("{}.{}", alias, n));
                (base.field_type(i), name)
            })
            .collect();
        Ok(Self {
            db,
            tid,
            table_id,
            desc: TupleDesc::with_names(items),
            iter: None,
        })
    }
}

impl Executor for SeqScan<'_> {
    fn open(&mut self) -> ExecResult<()> {
        let file = self.db.catalog().db_file(self.table_id)?;
        self.iter = Some(file.iter(self.tid, self.db.buffer_pool())?);
        Ok(())
    }

    fn next(&mut self) -> ExecResult<Option<Tuple>> {
        match self.iter.as_mut() {
            Some(iter) => Ok(iter.next()?),
            None => Err(DbError::invalid("operator is not open").into()),
        }
    }

    fn rewind(&mut self) -> ExecResult<()> {
        match self.iter.as_mut() {
            Some(iter) => Ok(iter.rewind()?),
            None => Err(DbError::invalid("operator is not open").into()),
        }
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}
