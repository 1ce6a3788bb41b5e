//! Heap files: one table as an ordered sequence of fixed-size pages.

use crate::buffer_pool::{BufferPool, Permissions};
use crate::config;
use crate::error::{DbError, DbResult};
use crate::page::{HeapPage, HeapPageId};
use crate::transaction::TransactionId;
use crate::tuple::{Tuple, TupleDesc};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A table stored as page 0, page 1, ... in a single file, with no ordering
/// among tuples. All page traffic goes through the buffer pool; the file
/// itself only reads and writes whole pages.
pub struct HeapFile {
    file: Mutex<File>,
    path: PathBuf,
    desc: TupleDesc,
    id: u32,
}

impl HeapFile {
    /// Opens (or creates) the backing file.
    ///
    /// The table id is the crc32 of the canonical path bytes, so the same
    /// physical file maps to the same id across process runs on the same
    /// host.
    pub fn open<P: AsRef<Path>>(path: P, desc: TupleDesc) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;
        let canonical = path.as_ref().canonicalize()?;
        let id = crc32fast::hash(canonical.to_string_lossy().as_bytes());
        crate::shale_debug_log!("[HeapFile] opened {:?} as table {}", canonical, id);
        Ok(Self {
            file: Mutex::new(file),
            path: canonical,
            desc,
            id,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn desc(&self) -> &TupleDesc {
        &self.desc
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whole pages in the file. A partial tail page is a corruption error.
    pub fn num_pages(&self) -> DbResult<usize> {
        let len = self.file.lock().unwrap().metadata()?.len() as usize;
        let page_size = config::page_size();
        if len % page_size != 0 {
            return Err(DbError::invalid(format!(
                "heap file {:?} has a partial tail page ({} bytes)",
                self.path, len
            )));
        }
        Ok(len / page_size)
    }

    /// Reads and parses the page at `pid`'s offset.
    pub fn read_page(&self, pid: HeapPageId) -> DbResult<HeapPage> {
        let page_size = config::page_size();
        let offset = (pid.page_no * page_size) as u64;
        let mut file = self.file.lock().unwrap();
        let len = file.metadata()?.len();
        if offset + page_size as u64 > len {
            return Err(DbError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("page {} is past the end of the heap file", pid.page_no),
            )));
        }
        crate::shale_debug_log!("[HeapFile] read page {} of table {}", pid.page_no, self.id);
        let mut buf = vec![0u8; page_size];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        drop(file);
        HeapPage::new(pid, self.desc.clone(), &buf)
    }

    /// Writes the page at its offset, extending the file when the page is
    /// the next one past the current tail.
    pub fn write_page(&self, page: &HeapPage) -> DbResult<()> {
        let page_size = config::page_size();
        let offset = (page.id().page_no * page_size) as u64;
        let mut file = self.file.lock().unwrap();
        crate::shale_debug_log!(
            "[HeapFile] write page {} of table {}",
            page.id().page_no,
            self.id
        );
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&page.page_data())?;
        file.sync_all()?;
        Ok(())
    }

    /// Finds room for `t`, preferring existing pages over growth.
    ///
    /// Every page is probed under a READ lock first; pages without room get
    /// the probe lock dropped again so a full scan does not pin the whole
    /// table. When no page has room, the file grows by one page which is
    /// written through immediately to reserve the slot against a racing
    /// insert; the buffer pool copy, dirtied by `tid`, is what commit
    /// replays.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        t: &mut Tuple,
        pool: &BufferPool,
    ) -> DbResult<Vec<HeapPage>> {
        let num_pages = self.num_pages()?;
        for page_no in 0..num_pages {
            let pid = HeapPageId::new(self.id, page_no);
            // Only a lock this probe itself acquired may be dropped again;
            // releasing a lock the transaction already held would break
            // two-phase locking for its earlier writes.
            let already_held = pool.holds_lock(tid, pid);
            let probe = pool.get_page(tid, pid, Permissions::ReadOnly)?;
            if probe.empty_slots() == 0 {
                if !already_held {
                    pool.unsafe_release_page(tid, pid);
                }
                continue;
            }
            let mut page = pool.get_page(tid, pid, Permissions::ReadWrite)?;
            page.insert_tuple(t)?;
            return Ok(vec![page]);
        }

        // Grow by one page at the tail.
        let pid = HeapPageId::new(self.id, num_pages);
        crate::shale_debug_log!(
            "[HeapFile] table {} grows to page {}",
            self.id,
            pid.page_no
        );
        let mut fresh = HeapPage::new(pid, self.desc.clone(), &HeapPage::empty_page_data())?;
        fresh.insert_tuple(t)?;
        self.write_page(&fresh)?;
        let page = pool.get_page(tid, pid, Permissions::ReadWrite)?;
        Ok(vec![page])
    }

    /// Clears the slot holding `t`. The tuple must carry a record id of
    /// this table.
    pub fn delete_tuple(
        &self,
        tid: TransactionId,
        t: &Tuple,
        pool: &BufferPool,
    ) -> DbResult<Vec<HeapPage>> {
        let rid = t
            .record_id()
            .ok_or_else(|| DbError::invalid("tuple has no record id"))?;
        if rid.page_id.table_id != self.id {
            return Err(DbError::invalid("tuple not in this table"));
        }
        let mut page = pool.get_page(tid, rid.page_id, Permissions::ReadWrite)?;
        page.delete_tuple(t)?;
        Ok(vec![page])
    }

    /// A restartable scan over every tuple, one page in memory at a time.
    /// The page bound is taken at open time; pages added by concurrent
    /// inserts may or may not be visible.
    pub fn iter<'p>(
        self: &Arc<Self>,
        tid: TransactionId,
        pool: &'p BufferPool,
    ) -> DbResult<HeapFileIter<'p>> {
        Ok(HeapFileIter {
            file: Arc::clone(self),
            pool,
            tid,
            num_pages: self.num_pages()?,
            next_page_no: 0,
            current: Vec::new().into_iter(),
        })
    }
}

/// Pull-based tuple iterator over one heap file. Holds no page state beyond
/// the tuples of the page it is currently draining; each page is fetched
/// through the buffer pool so locking is implicit.
pub struct HeapFileIter<'p> {
    file: Arc<HeapFile>,
    pool: &'p BufferPool,
    tid: TransactionId,
    num_pages: usize,
    next_page_no: usize,
    current: std::vec::IntoIter<Tuple>,
}

impl HeapFileIter<'_> {
    pub fn next(&mut self) -> DbResult<Option<Tuple>> {
        loop {
            if let Some(t) = self.current.next() {
                return Ok(Some(t));
            }
            if self.next_page_no >= self.num_pages {
                return Ok(None);
            }
            let pid = HeapPageId::new(self.file.id(), self.next_page_no);
            self.next_page_no += 1;
            let page = self.pool.get_page(self.tid, pid, Permissions::ReadOnly)?;
            self.current = page.iter().cloned().collect::<Vec<_>>().into_iter();
        }
    }

    /// Restarts the scan at page 0 with a fresh page bound.
    pub fn rewind(&mut self) -> DbResult<()> {
        self.num_pages = self.file.num_pages()?;
        self.next_page_no = 0;
        self.current = Vec::new().into_iter();
        Ok(())
    }
}
