//! Transaction identifiers and the transaction handle.

use crate::db::Database;
use crate::error::DbResult;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TID: AtomicU64 = AtomicU64::new(1);

/// Opaque unique transaction identifier. Compared by identity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Vends a fresh, process-unique id.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(NEXT_TID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A running transaction. Commit flushes every page the transaction holds
/// (FORCE) before its locks are released; abort discards them (NO-STEAL),
/// so the on-disk state is the rollback image.
#[derive(Debug, Clone, Copy)]
pub struct Transaction {
    id: TransactionId,
}

impl Transaction {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            id: TransactionId::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn commit(&self, db: &Database) -> DbResult<()> {
        db.buffer_pool().transaction_complete(self.id, true)
    }

    pub fn abort(&self, db: &Database) -> DbResult<()> {
        db.buffer_pool().transaction_complete(self.id, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_ordered() {
        let a = TransactionId::new();
        let b = TransactionId::new();
        assert_ne!(a, b);
        assert!(a < b);
    }
}
