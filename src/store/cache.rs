//! Transaction-scoped page cache.
//!
//! Holds decoded committed pages keyed by storage address. Committed pages
//! are immutable, so an entry can never go stale; clearing the cache only
//! costs performance.

use std::sync::Arc;

use rustc_hash::FxBuildHasher;

use crate::FastHashMap;

use super::{Page, StorageKey};

/// Bounded map of decoded pages.
#[derive(Debug)]
pub struct PageCache {
    pages: FastHashMap<StorageKey, Arc<Page>>,
    capacity: usize,
    closed: bool,
}

impl PageCache {
    /// Creates a cache holding at most `capacity` pages (0 = unbounded).
    pub fn new(capacity: usize) -> Self {
        Self {
            pages: FastHashMap::with_hasher(FxBuildHasher),
            capacity,
            closed: false,
        }
    }

    pub fn get(&self, key: StorageKey) -> Option<Arc<Page>> {
        self.pages.get(&key).cloned()
    }

    /// Caches a page. When full, the cache is emptied before inserting.
    pub fn put(&mut self, key: StorageKey, page: Arc<Page>) {
        if self.closed || key.is_null() {
            return;
        }
        if self.capacity != 0 && self.pages.len() >= self.capacity && !self.pages.contains_key(&key) {
            self.pages.clear();
        }
        self.pages.insert(key, page);
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }

    /// Empties the cache and stops it from accepting new pages.
    pub fn close(&mut self) {
        self.pages = FastHashMap::with_hasher(FxBuildHasher);
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
