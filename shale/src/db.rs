//! The process-wide database handle.

use crate::buffer_pool::BufferPool;
use crate::catalog::Catalog;
use crate::config;
use crate::error::DbResult;
use crate::wal::LogManager;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Owns the catalog, the update log and the buffer pool, wired together
/// once. Construct a single `Database` and pass it by reference; every
/// component that needs a singleton reaches it through here.
pub struct Database {
    catalog: Arc<Catalog>,
    log: Arc<Mutex<LogManager>>,
    buffer_pool: BufferPool,
}

impl Database {
    /// Opens a database whose buffer pool holds the default page count.
    pub fn new<P: AsRef<Path>>(log_path: P) -> DbResult<Self> {
        Self::with_pool_capacity(log_path, config::DEFAULT_POOL_PAGES)
    }

    pub fn with_pool_capacity<P: AsRef<Path>>(log_path: P, capacity: usize) -> DbResult<Self> {
        let catalog = Arc::new(Catalog::new());
        let log = Arc::new(Mutex::new(LogManager::open(log_path)?));
        let buffer_pool = BufferPool::new(capacity, Arc::clone(&catalog), Arc::clone(&log));
        Ok(Self {
            catalog,
            log,
            buffer_pool,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    pub fn log(&self) -> &Arc<Mutex<LogManager>> {
        &self.log
    }
}
