//! Indirect page trie traversal.
//!
//! [`TrieReader`] walks a trie from a start reference down to a leaf,
//! resolving every level through the intent log (if any) and the page
//! source. [`TrieWriter`] prepares the copy-on-write path: every page from
//! the start reference to the leaf is staged in the intent log and its
//! parent slot re-pointed at the staged copy. Pages off the path are never
//! touched.

use std::sync::Arc;

use tracing::trace;

use crate::data::{KeyPath, TrieGeometry};

use super::{
    DbError, DbMetrics, IndexRootPage, IndexType, IndirectPage, LogKey, Page, PageContainer,
    PageKind, PageLayout, PageReference, PageSource, RecordPage, Result, RevisionRootPage,
    StorageKey, TransactionIntentLog,
};

/// Read-only view of the tries reachable from one revision.
pub(crate) struct TrieReader<'t> {
    pub geometry: &'t TrieGeometry,
    pub log: Option<&'t TransactionIntentLog>,
    pub source: &'t dyn PageSource,
}

impl<'t> TrieReader<'t> {
    /// Follows `page_key` from the top indirect page at `start` down to the
    /// leaf reference. Returns `None` as soon as a level has no reference.
    pub fn find_leaf(&self, start: &PageReference, page_key: u64) -> Result<Option<PageReference>> {
        if !start.is_set() {
            return Ok(None);
        }
        let mut current = start.clone();
        for level in 0..self.geometry.depth() {
            let page = current.resolve(PageKind::Indirect, self.log, self.source)?;
            let slot = self.geometry.index_at(page_key, level);
            let next = match page.references().get(slot) {
                Some(reference) if reference.is_set() => reference.clone(),
                _ => return Ok(None),
            };
            drop(page);
            current = next;
        }
        Ok(Some(current))
    }

    /// Index root page stored in `revision_root` for `index`.
    pub fn index_root(
        &self,
        revision_root: &RevisionRootPage,
        index: IndexType,
    ) -> Result<Option<IndexRootPage>> {
        let Some(kind) = index.root_kind() else {
            return Ok(None);
        };
        let reference = match revision_root.index_reference(index) {
            Some(reference) if reference.is_set() => reference,
            _ => return Ok(None),
        };
        let page = reference.resolve(kind, self.log, self.source)?;
        let root = page
            .as_index_root()
            .ok_or_else(|| DbError::unexpected(kind, page.kind()))?;
        Ok(Some(root.clone()))
    }

    /// Reference to the top indirect page of `index`'s trie, if it exists.
    pub fn index_trie(
        &self,
        revision_root: &RevisionRootPage,
        index: IndexType,
    ) -> Result<Option<PageReference>> {
        if index.root_kind().is_none() {
            return Ok(revision_root
                .index_reference(index)
                .filter(|r| r.is_set())
                .cloned());
        }
        match self.index_root(revision_root, index)? {
            Some(root) if root.trie_depth() > 0 => {
                Ok(root.trie_reference().filter(|r| r.is_set()).cloned())
            }
            _ => Ok(None),
        }
    }

    /// Runs `f` on the record page holding `page_key` in `index`.
    pub fn with_record_page<R>(
        &self,
        revision_root: &RevisionRootPage,
        index: IndexType,
        page_key: u64,
        f: impl FnOnce(&RecordPage) -> R,
    ) -> Result<Option<R>> {
        let Some(start) = self.index_trie(revision_root, index)? else {
            return Ok(None);
        };
        let Some(leaf) = self.find_leaf(&start, page_key)? else {
            return Ok(None);
        };
        let page = leaf.resolve(PageKind::Record, self.log, self.source)?;
        let record = page
            .as_record()
            .ok_or_else(|| DbError::unexpected(PageKind::Record, page.kind()))?;
        debug_assert_eq!(record.page_key(), page_key);
        Ok(Some(f(record)))
    }

    /// Container for the record page holding `page_key` in `index`.
    ///
    /// A page staged in the intent log is returned with its working copy;
    /// a committed page is returned with `complete == modified`.
    pub fn record_page_container(
        &self,
        revision_root: &RevisionRootPage,
        index: IndexType,
        page_key: u64,
    ) -> Result<Option<PageContainer>> {
        let Some(start) = self.index_trie(revision_root, index)? else {
            return Ok(None);
        };
        let Some(leaf) = self.find_leaf(&start, page_key)? else {
            return Ok(None);
        };
        if let Some(container) = self.log.and_then(|log| log.get(leaf.log_key())) {
            return Ok(Some(container.clone()));
        }
        let page = match leaf.page() {
            Some(page) => Arc::new(page.clone()),
            None if !leaf.storage_key().is_null() => self.source.load_page(&leaf, PageKind::Record)?,
            None => return Err(DbError::PageNotFound(leaf.storage_key())),
        };
        if page.kind() != PageKind::Record {
            return Err(DbError::unexpected(PageKind::Record, page.kind()));
        }
        Ok(Some(PageContainer::from_complete(page)))
    }
}

/// Copy-on-write path preparation inside one intent log.
pub(crate) struct TrieWriter<'t> {
    pub log: &'t mut TransactionIntentLog,
    pub source: &'t dyn PageSource,
    pub metrics: &'t DbMetrics,
    pub layout: &'t PageLayout,
}

impl<'t> TrieWriter<'t> {
    /// Stages the child at `slot` of the staged page `parent` and returns its
    /// log key.
    ///
    /// A child already in the log is reused. A committed child is copied into
    /// the log. A missing child is produced by `create`.
    pub fn prepare_child(
        &mut self,
        parent: LogKey,
        slot: usize,
        kind: PageKind,
        create: impl FnOnce() -> PageContainer,
    ) -> Result<LogKey> {
        let (resident, durable) = {
            let reference = self.parent_reference(parent, slot)?;
            if !reference.log_key().is_null() {
                return Ok(reference.log_key());
            }
            let resident = reference.take_page();
            let durable = (!reference.storage_key().is_null()).then(|| reference.clone());
            (resident, durable)
        };

        let container = match (resident, durable) {
            (Some(page), _) => PageContainer::new(page),
            (None, Some(reference)) => {
                let complete = self.source.load_page(&reference, kind)?;
                if complete.kind() != kind {
                    return Err(DbError::unexpected(kind, complete.kind()));
                }
                self.metrics.inc_cow_copies();
                trace!(?kind, key = %reference.storage_key(), "page copied");
                PageContainer::from_complete(complete)
            }
            (None, None) => create(),
        };

        let key = self.log.put(container);
        self.parent_reference(parent, slot)?.set_log_key(key);
        Ok(key)
    }

    /// Stages every page from the top indirect page (`slot` of `parent`)
    /// down to the leaf of `path` and returns the leaf's log key.
    pub fn prepare_path(
        &mut self,
        parent: LogKey,
        slot: usize,
        path: &KeyPath,
        leaf_kind: PageKind,
        create_leaf: impl FnOnce() -> PageContainer,
    ) -> Result<LogKey> {
        let layout = *self.layout;
        let new_indirect = || PageContainer::new(Page::Indirect(IndirectPage::new(&layout)));

        let mut key = self.prepare_child(parent, slot, PageKind::Indirect, new_indirect)?;
        for level in 0..path.len() - 1 {
            key = self.prepare_child(key, path.get(level), PageKind::Indirect, new_indirect)?;
        }
        self.prepare_child(key, path.get(path.len() - 1), leaf_kind, create_leaf)
    }

    /// Stages the record page for `path` in the trie below `parent`/`slot`.
    pub fn prepare_record_page(&mut self, parent: LogKey, slot: usize, path: &KeyPath) -> Result<LogKey> {
        let layout = *self.layout;
        let page_key = path.page_key();
        self.prepare_path(parent, slot, path, PageKind::Record, || {
            PageContainer::new(Page::Record(RecordPage::new(page_key, &layout)))
        })
    }

    fn parent_reference(&mut self, parent: LogKey, slot: usize) -> Result<&mut PageReference> {
        self.log
            .get_mut(parent)
            .ok_or(DbError::PageNotFound(StorageKey::NULL))?
            .modified_mut()
            .references_mut()
            .get_or_create_reference(slot)
    }
}
