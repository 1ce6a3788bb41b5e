//! Process-wide storage configuration.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Bytes per page, including the slot bitmap header.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default buffer pool capacity, in pages.
pub const DEFAULT_POOL_PAGES: usize = 50;

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_PAGE_SIZE);

/// Returns the current page size in bytes.
pub fn page_size() -> usize {
    PAGE_SIZE.load(Ordering::SeqCst)
}

/// Overrides the page size. For tests only; files written under a different
/// page size keep their old layout and will fail to parse.
pub fn set_page_size(bytes: usize) {
    PAGE_SIZE.store(bytes, Ordering::SeqCst);
}

/// Restores the default page size. For tests only.
pub fn reset_page_size() {
    PAGE_SIZE.store(DEFAULT_PAGE_SIZE, Ordering::SeqCst);
}
