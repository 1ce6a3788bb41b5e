//! Page-level locks for strict two-phase locking.
//!
//! Shared/exclusive locks at page granularity with sole-holder upgrade. A
//! blocked request records waits-for edges and runs deadlock detection; on a
//! cycle the requester aborts. Waiters park on one condition variable and
//! re-evaluate their grant condition on every release, so no FIFO fairness
//! is promised, but detection keeps the system live.

use crate::error::{DbError, DbResult};
use crate::page::HeapPageId;
use crate::transaction::TransactionId;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard};

/// Lock state for one page: shared holders plus an optional exclusive
/// holder. Both populated never happens; an upgrade removes the holder from
/// the shared set in the same critical section that makes it exclusive.
#[derive(Debug, Default)]
struct LockState {
    shared: HashSet<TransactionId>,
    exclusive: Option<TransactionId>,
}

impl LockState {
    fn is_free(&self) -> bool {
        self.shared.is_empty() && self.exclusive.is_none()
    }

    fn holders(&self) -> impl Iterator<Item = TransactionId> + '_ {
        self.shared.iter().copied().chain(self.exclusive)
    }
}

#[derive(Debug, Default)]
struct LockTables {
    locks: HashMap<HeapPageId, LockState>,
    /// Pages each transaction currently holds in any mode.
    held: HashMap<TransactionId, HashSet<HeapPageId>>,
    /// Waits-for edges, populated only while a request is blocked.
    waits_for: HashMap<TransactionId, HashSet<TransactionId>>,
}

/// The lock manager. One mutex guards the lock table, held set and
/// waits-for graph together; it is released while a waiter parks, never
/// across a blocking wait.
#[derive(Debug, Default)]
pub struct LockManager {
    tables: Mutex<LockTables>,
    cvar: Condvar,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a shared lock on `pid`, blocking while another transaction
    /// holds it exclusively. Re-entrant: returns immediately when `tid`
    /// already holds the page in any mode.
    pub fn acquire_read(&self, tid: TransactionId, pid: HeapPageId) -> DbResult<()> {
        let mut tables = self.tables.lock().unwrap();
        loop {
            let state = tables.locks.entry(pid).or_default();
            if state.shared.contains(&tid) || state.exclusive == Some(tid) {
                return Ok(());
            }
            match state.exclusive {
                None => {
                    state.shared.insert(tid);
                    Self::grant(&mut tables, tid, pid);
                    return Ok(());
                }
                Some(holder) => {
                    tables = self.block_or_abort(tables, tid, pid, [holder].into())?;
                }
            }
        }
    }

    /// Takes an exclusive lock on `pid`. A sole shared holder upgrades in
    /// place; any other holder blocks the request.
    pub fn acquire_write(&self, tid: TransactionId, pid: HeapPageId) -> DbResult<()> {
        let mut tables = self.tables.lock().unwrap();
        loop {
            let state = tables.locks.entry(pid).or_default();
            if state.exclusive == Some(tid) {
                return Ok(());
            }
            let blockers: HashSet<TransactionId> =
                state.holders().filter(|h| *h != tid).collect();
            if blockers.is_empty() {
                state.shared.remove(&tid);
                state.exclusive = Some(tid);
                Self::grant(&mut tables, tid, pid);
                return Ok(());
            }
            tables = self.block_or_abort(tables, tid, pid, blockers)?;
        }
    }

    /// Drops whatever `tid` holds on `pid` and wakes all waiters.
    pub fn release(&self, tid: TransactionId, pid: HeapPageId) {
        let mut tables = self.tables.lock().unwrap();
        Self::release_locked(&mut tables, tid, pid);
        self.cvar.notify_all();
    }

    /// Releases every page held by `tid`. Called at commit and abort.
    pub fn release_all(&self, tid: TransactionId) {
        let mut tables = self.tables.lock().unwrap();
        let pages: Vec<HeapPageId> = tables
            .held
            .get(&tid)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        for pid in pages {
            Self::release_locked(&mut tables, tid, pid);
        }
        Self::drop_edges(&mut tables, tid);
        self.cvar.notify_all();
    }

    pub fn holds(&self, tid: TransactionId, pid: HeapPageId) -> bool {
        let tables = self.tables.lock().unwrap();
        tables.held.get(&tid).is_some_and(|s| s.contains(&pid))
    }

    pub fn pages_held_by(&self, tid: TransactionId) -> Vec<HeapPageId> {
        let tables = self.tables.lock().unwrap();
        tables
            .held
            .get(&tid)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Records the grant in the held map and clears the waiter's edges.
    fn grant(tables: &mut LockTables, tid: TransactionId, pid: HeapPageId) {
        tables.held.entry(tid).or_default().insert(pid);
        tables.waits_for.remove(&tid);
    }

    /// Publishes `tid`'s waits-for edges, checks for a deadlock and either
    /// aborts the requester or parks until the next release.
    fn block_or_abort<'a>(
        &'a self,
        mut tables: MutexGuard<'a, LockTables>,
        tid: TransactionId,
        pid: HeapPageId,
        blockers: HashSet<TransactionId>,
    ) -> DbResult<MutexGuard<'a, LockTables>> {
        crate::shale_debug_log!(
            "[LockManager] tx {} blocked on {:?} by {:?}",
            tid.id(),
            pid,
            blockers
        );
        tables.waits_for.insert(tid, blockers);
        if Self::deadlocked(&tables.waits_for, tid) {
            crate::shale_debug_log!("[LockManager] deadlock: aborting requester tx {}", tid.id());
            Self::drop_edges(&mut tables, tid);
            if tables.locks.get(&pid).is_some_and(LockState::is_free) {
                tables.locks.remove(&pid);
            }
            self.cvar.notify_all();
            return Err(DbError::Aborted);
        }
        Ok(self.cvar.wait(tables).unwrap())
    }

    fn release_locked(tables: &mut LockTables, tid: TransactionId, pid: HeapPageId) {
        if let Some(state) = tables.locks.get_mut(&pid) {
            state.shared.remove(&tid);
            if state.exclusive == Some(tid) {
                state.exclusive = None;
            }
            if state.is_free() {
                tables.locks.remove(&pid);
            }
        }
        if let Some(pages) = tables.held.get_mut(&tid) {
            pages.remove(&pid);
            if pages.is_empty() {
                tables.held.remove(&tid);
            }
        }
    }

    /// Removes `tid` from both sides of the waits-for graph.
    fn drop_edges(tables: &mut LockTables, tid: TransactionId) {
        tables.waits_for.remove(&tid);
        for blockers in tables.waits_for.values_mut() {
            blockers.remove(&tid);
        }
    }

    /// Breadth-first reachability from `start` over the waits-for graph.
    /// Any revisited node counts as a cycle through the requester; the
    /// conservative answer aborts the requester, which simply retries.
    fn deadlocked(
        waits_for: &HashMap<TransactionId, HashSet<TransactionId>>,
        start: TransactionId,
    ) -> bool {
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            let Some(next) = waits_for.get(&current) else {
                continue;
            };
            for &adjacent in next {
                if adjacent == current {
                    continue;
                }
                if !visited.insert(adjacent) {
                    return true;
                }
                queue.push_back(adjacent);
            }
        }
        false
    }
}
