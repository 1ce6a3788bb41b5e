//! The shared buffer pool: a bounded cache of heap pages that every tuple
//! access in the system flows through.
//!
//! The pool enforces page locking (via the lock manager) before any page is
//! handed out, tracks which transaction dirtied each cached page, and runs
//! a NO-STEAL / FORCE discipline: dirty pages are never evicted, and commit
//! flushes every page the transaction holds, logging each write first.

use crate::catalog::Catalog;
use crate::error::{DbError, DbResult};
use crate::lock_manager::LockManager;
use crate::page::{HeapPage, HeapPageId};
use crate::transaction::TransactionId;
use crate::tuple::Tuple;
use crate::wal::LogManager;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Access mode requested for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permissions {
    ReadOnly,
    ReadWrite,
}

struct PoolState {
    pages: HashMap<HeapPageId, HeapPage>,
    /// Insertion/recency order; the back is the most recently touched.
    order: VecDeque<HeapPageId>,
}

/// The buffer pool manager.
pub struct BufferPool {
    capacity: usize,
    catalog: Arc<Catalog>,
    log: Arc<Mutex<LogManager>>,
    locks: LockManager,
    state: Mutex<PoolState>,
}

impl BufferPool {
    pub fn new(capacity: usize, catalog: Arc<Catalog>, log: Arc<Mutex<LogManager>>) -> Self {
        Self {
            capacity,
            catalog,
            log,
            locks: LockManager::new(),
            state: Mutex::new(PoolState {
                pages: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Retrieves a page under the requested permission. Acquires the page
    /// lock first, so this may block on another transaction or abort the
    /// caller as a deadlock victim.
    pub fn get_page(
        &self,
        tid: TransactionId,
        pid: HeapPageId,
        perm: Permissions,
    ) -> DbResult<HeapPage> {
        match perm {
            Permissions::ReadOnly => self.locks.acquire_read(tid, pid)?,
            Permissions::ReadWrite => self.locks.acquire_write(tid, pid)?,
        }

        let mut state = self.state.lock().unwrap();
        if let Some(page) = state.pages.get(&pid) {
            let page = page.clone();
            Self::touch(&mut state.order, pid);
            return Ok(page);
        }

        let file = self.catalog.db_file(pid.table_id)?;
        let page = file.read_page(pid)?;
        if state.pages.len() >= self.capacity {
            Self::evict(&mut state)?;
        }
        state.pages.insert(pid, page.clone());
        state.order.push_back(pid);
        Ok(page)
    }

    /// Adds `t` to the table, marking every modified page dirty by `tid`
    /// and installing it in the cache.
    pub fn insert_tuple(&self, tid: TransactionId, table_id: u32, t: &mut Tuple) -> DbResult<()> {
        let file = self.catalog.db_file(table_id)?;
        let pages = file.insert_tuple(tid, t, self)?;
        self.install_dirty(tid, pages)
    }

    /// Removes `t` from the table that owns its record id.
    pub fn delete_tuple(&self, tid: TransactionId, t: &Tuple) -> DbResult<()> {
        let rid = t
            .record_id()
            .ok_or_else(|| DbError::invalid("tuple has no record id"))?;
        let file = self.catalog.db_file(rid.page_id.table_id)?;
        let pages = file.delete_tuple(tid, t, self)?;
        self.install_dirty(tid, pages)
    }

    fn install_dirty(&self, tid: TransactionId, pages: Vec<HeapPage>) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        for mut page in pages {
            page.mark_dirty(Some(tid));
            let pid = page.id();
            if !state.pages.contains_key(&pid) && state.pages.len() >= self.capacity {
                Self::evict(&mut state)?;
            }
            state.pages.insert(pid, page);
            Self::touch(&mut state.order, pid);
        }
        Ok(())
    }

    /// Writes a cached dirty page through to disk: log record first, forced,
    /// then the page itself. Clean or absent pages are a no-op.
    pub fn flush_page(&self, pid: HeapPageId) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        self.flush_page_locked(&mut state, pid)
    }

    /// Flushes every dirty page. Breaks NO-STEAL for uncommitted data, so
    /// this is a shutdown/test aid, not part of the transaction protocol.
    pub fn flush_all_pages(&self) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        let pids: Vec<HeapPageId> = state.order.iter().copied().collect();
        for pid in pids {
            self.flush_page_locked(&mut state, pid)?;
        }
        Ok(())
    }

    /// Flushes every page held by `tid`.
    pub fn flush_pages(&self, tid: TransactionId) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        for pid in self.locks.pages_held_by(tid) {
            self.flush_page_locked(&mut state, pid)?;
        }
        Ok(())
    }

    /// Drops a page from the cache without writing it back.
    pub fn discard_page(&self, pid: HeapPageId) {
        let mut state = self.state.lock().unwrap();
        state.pages.remove(&pid);
        state.order.retain(|p| *p != pid);
    }

    /// Releases `tid`'s lock on one page early, outside two-phase order.
    /// Only the heap-file insert scan uses this, to drop probe locks on
    /// pages it found full.
    pub fn unsafe_release_page(&self, tid: TransactionId, pid: HeapPageId) {
        self.locks.release(tid, pid);
    }

    /// Commits or aborts `tid`: on commit, every held page is flushed
    /// (FORCE) and a commit record is logged; on abort, held pages are
    /// discarded so the on-disk state becomes the rollback image
    /// (NO-STEAL). Either way all of `tid`'s locks are released last.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> DbResult<()> {
        let held = self.locks.pages_held_by(tid);
        crate::shale_debug_log!(
            "[BufferPool] tx {} {} with {} pages held",
            tid.id(),
            if commit { "commit" } else { "abort" },
            held.len()
        );
        {
            let mut state = self.state.lock().unwrap();
            for pid in held {
                if commit {
                    self.flush_page_locked(&mut state, pid)?;
                } else {
                    state.pages.remove(&pid);
                    state.order.retain(|p| *p != pid);
                }
            }
        }
        {
            let mut log = self.log.lock().unwrap();
            let marker = if commit {
                log.log_commit(tid)
            } else {
                log.log_abort(tid)
            };
            marker.and_then(|_| log.force()).map_err(|e| {
                DbError::invalid(format!("transaction log record failed: {e}"))
            })?;
        }
        self.locks.release_all(tid);
        Ok(())
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: HeapPageId) -> bool {
        self.locks.holds(tid, pid)
    }

    pub fn pages_held_by(&self, tid: TransactionId) -> Vec<HeapPageId> {
        self.locks.pages_held_by(tid)
    }

    fn flush_page_locked(&self, state: &mut PoolState, pid: HeapPageId) -> DbResult<()> {
        let Some(page) = state.pages.get_mut(&pid) else {
            return Ok(());
        };
        let Some(owner) = page.dirtied_by() else {
            return Ok(());
        };

        let after = page.page_data();
        {
            let mut log = self.log.lock().unwrap();
            log.log_write(owner, pid, page.before_image_data(), &after)
                .and_then(|_| log.force())
                .map_err(|e| DbError::invalid(format!("write-ahead log failed: {e}")))?;
        }
        let file = self.catalog.db_file(pid.table_id)?;
        file.write_page(page)?;
        page.mark_dirty(None);
        page.set_before_image();
        crate::shale_debug_log!("[BufferPool] flushed page {:?}", pid);
        Ok(())
    }

    /// NO-STEAL eviction: only clean pages may leave the pool. Among the
    /// clean pages the most recently inserted one goes.
    fn evict(state: &mut PoolState) -> DbResult<()> {
        let victim = state
            .order
            .iter()
            .rev()
            .find(|pid| {
                state
                    .pages
                    .get(*pid)
                    .is_some_and(|p| p.dirtied_by().is_none())
            })
            .copied();
        let Some(pid) = victim else {
            return Err(DbError::invalid("no evictable page"));
        };
        crate::shale_debug_log!("[BufferPool] evicting clean page {:?}", pid);
        state.pages.remove(&pid);
        state.order.retain(|p| *p != pid);
        Ok(())
    }

    fn touch(order: &mut VecDeque<HeapPageId>, pid: HeapPageId) {
        order.retain(|p| *p != pid);
        order.push_back(pid);
    }
}
