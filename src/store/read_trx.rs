//! Read transactions.
//!
//! A `PageReadTrx` is bound to the UberPage generation and revision current
//! when it was opened. Later commits never change what it sees.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::data::{DecodeError, TrieGeometry};

use super::names::{decode_name, probe_name, NameSlot, Probe};
use super::{
    DbError, IndexRootPage, IndexType, Page, PageCache, PageContainer, PageKind, PageReference,
    PageSource, ResourceManager, Result, RevisionRootPage, UberPage, UberSnapshot,
};

/// A read-only view of one revision.
pub struct PageReadTrx<'a> {
    pub(crate) resource: &'a ResourceManager,
    trx_id: u64,
    snapshot: Arc<UberSnapshot>,
    revision_root: RevisionRootPage,
    cache: Mutex<PageCache>,
}

impl<'a> PageReadTrx<'a> {
    pub(crate) fn open(
        resource: &'a ResourceManager,
        snapshot: Arc<UberSnapshot>,
        revision: u32,
    ) -> Result<Self> {
        let mut trx = Self {
            resource,
            trx_id: resource.next_trx_id(),
            snapshot: snapshot.clone(),
            revision_root: RevisionRootPage::new(revision, resource.layout()),
            cache: Mutex::new(PageCache::new(resource.config().cache_capacity)),
        };
        let revision_root = resource.load_revision_root(snapshot.uber(), revision, &trx)?;
        trx.revision_root = revision_root;
        trace!(trx_id = trx.trx_id, revision, "read transaction opened");
        Ok(trx)
    }

    /// Resource-scoped transaction id.
    pub fn trx_id(&self) -> u64 {
        self.trx_id
    }

    /// The resource this transaction reads.
    pub fn resource(&self) -> &'a ResourceManager {
        self.resource
    }

    /// UberPage generation this transaction is bound to.
    pub fn uber_page(&self) -> &UberPage {
        self.snapshot.uber()
    }

    pub(crate) fn snapshot(&self) -> &Arc<UberSnapshot> {
        &self.snapshot
    }

    /// Revision root of the bound revision.
    pub fn actual_revision_root(&self) -> &RevisionRootPage {
        &self.revision_root
    }

    /// Bound revision number.
    pub fn get_revision_number(&self) -> u32 {
        self.revision_root.revision()
    }

    /// Commit time of the bound revision in milliseconds since the Unix epoch.
    pub fn revision_timestamp(&self) -> u64 {
        self.revision_root.timestamp_ms()
    }

    /// Leaf page key holding `record_key`.
    pub fn page_key(&self, record_key: u64) -> u64 {
        self.resource.record_geometry().page_key(record_key)
    }

    fn view(&self) -> TrieView<'_> {
        TrieView {
            reader: super::TrieReader {
                geometry: self.resource.record_geometry(),
                log: None,
                source: self,
            },
            revision_root: &self.revision_root,
        }
    }

    /// Record stored under `key` in `index`, or `None` if absent.
    pub fn get_record(&self, key: u64, index: IndexType) -> Result<Option<Vec<u8>>> {
        self.view().get_record(key, index)
    }

    /// Container of the record page `page_key` in `index`.
    pub fn get_record_page_container(
        &self,
        page_key: u64,
        index: IndexType,
    ) -> Result<Option<PageContainer>> {
        self.view()
            .reader
            .record_page_container(&self.revision_root, index, page_key)
    }

    /// Leaf reference for `page_key` below the top indirect page `start`.
    pub fn get_page_reference_for_page(
        &self,
        start: &PageReference,
        page_key: u64,
    ) -> Result<Option<PageReference>> {
        self.view().reader.find_leaf(start, page_key)
    }

    /// Highest key issued in `index`.
    pub fn max_node_key(&self, index: IndexType) -> Result<u64> {
        self.view().max_node_key(index)
    }

    /// Index root page of `index` in `revision_root`.
    pub fn get_index_root(
        &self,
        revision_root: &RevisionRootPage,
        index: IndexType,
    ) -> Result<Option<IndexRootPage>> {
        self.view().reader.index_root(revision_root, index)
    }

    pub fn get_name_page(&self, revision_root: &RevisionRootPage) -> Result<Option<IndexRootPage>> {
        self.get_index_root(revision_root, IndexType::Name)
    }

    pub fn get_path_summary_page(
        &self,
        revision_root: &RevisionRootPage,
    ) -> Result<Option<IndexRootPage>> {
        self.get_index_root(revision_root, IndexType::PathSummary)
    }

    pub fn get_text_value_page(
        &self,
        revision_root: &RevisionRootPage,
    ) -> Result<Option<IndexRootPage>> {
        self.get_index_root(revision_root, IndexType::TextValue)
    }

    pub fn get_attribute_value_page(
        &self,
        revision_root: &RevisionRootPage,
    ) -> Result<Option<IndexRootPage>> {
        self.get_index_root(revision_root, IndexType::AttributeValue)
    }

    pub fn get_dewey_id_page(
        &self,
        revision_root: &RevisionRootPage,
    ) -> Result<Option<IndexRootPage>> {
        self.get_index_root(revision_root, IndexType::DeweyId)
    }

    /// Name stored under `name_key`.
    pub fn get_name(&self, name_key: u64) -> Result<Option<String>> {
        self.view().get_name(name_key)
    }

    /// Raw name bytes stored under `name_key`.
    pub fn get_raw_name(&self, name_key: u64) -> Result<Option<Vec<u8>>> {
        self.view().get_raw_name(name_key)
    }

    /// Number of references to the name under `name_key` (0 if absent).
    pub fn get_name_count(&self, name_key: u64) -> Result<u32> {
        self.view().get_name_count(name_key)
    }

    /// Key under which `name` is stored, if present.
    pub fn name_key(&self, name: &str) -> Result<Option<u64>> {
        self.view().find_name(name)
    }

    /// Cached page for `reference`, if any.
    pub fn get_from_page_cache(&self, reference: &PageReference) -> Option<Arc<Page>> {
        self.cache.lock().get(reference.storage_key())
    }

    /// Caches `page` under `reference`'s storage address.
    pub fn put_page_cache(&self, reference: &PageReference, page: Arc<Page>) {
        self.cache.lock().put(reference.storage_key(), page);
    }

    /// Drops every cached page.
    pub fn clear_caches(&self) {
        self.cache.lock().clear();
    }

    /// Drops every cached page and stops caching.
    pub fn close_caches(&self) {
        self.cache.lock().close();
    }

    /// Number of cached pages.
    pub fn cached_pages(&self) -> usize {
        self.cache.lock().len()
    }

    /// Closes the transaction, releasing its caches.
    pub fn close(self) {
        self.close_caches();
        trace!(trx_id = self.trx_id, "read transaction closed");
    }
}

impl PageSource for PageReadTrx<'_> {
    fn load_page(&self, reference: &PageReference, kind: PageKind) -> Result<Arc<Page>> {
        let key = reference.storage_key();
        let cached = self.cache.lock().get(key).filter(|page| page.kind() == kind);
        if let Some(page) = cached {
            self.resource.metrics().inc_cache_hits();
            return Ok(page);
        }
        self.resource.metrics().inc_cache_misses();

        let page = Arc::new(self.resource.read_page(reference, kind)?);
        self.cache.lock().put(key, page.clone());
        Ok(page)
    }
}

/// Record-level reads over one revision root, shared by both transaction kinds.
pub(crate) struct TrieView<'t> {
    pub reader: super::TrieReader<'t>,
    pub revision_root: &'t RevisionRootPage,
}

impl TrieView<'_> {
    pub fn geometry(&self) -> &TrieGeometry {
        self.reader.geometry
    }

    pub fn get_record(&self, key: u64, index: IndexType) -> Result<Option<Vec<u8>>> {
        check_key(self.geometry(), key)?;
        let page_key = self.geometry().page_key(key);
        let record = self.reader.with_record_page(self.revision_root, index, page_key, |page| {
            page.get(key).map(|value| value.to_vec())
        })?;
        Ok(record.flatten())
    }

    pub fn probe(&self, key: u64, index: IndexType) -> Result<Probe> {
        let page_key = self.geometry().page_key(key);
        let probe = self.reader.with_record_page(self.revision_root, index, page_key, |page| {
            match page.get(key) {
                Some(value) => Probe::Occupied(value.to_vec()),
                None if page.is_deleted(key) => Probe::Deleted,
                None => Probe::Empty,
            }
        })?;
        Ok(probe.unwrap_or(Probe::Empty))
    }

    pub fn max_node_key(&self, index: IndexType) -> Result<u64> {
        if index.root_kind().is_none() {
            return Ok(self.revision_root.max_node_key());
        }
        Ok(self
            .reader
            .index_root(self.revision_root, index)?
            .map_or(0, |root| root.max_node_key()))
    }

    pub fn find_name(&self, name: &str) -> Result<Option<u64>> {
        match self.find_name_slot(name)? {
            NameSlot::Found { key, .. } => Ok(Some(key)),
            NameSlot::Vacant { .. } => Ok(None),
        }
    }

    pub fn find_name_slot(&self, name: &str) -> Result<NameSlot> {
        probe_name(name.as_bytes(), self.geometry(), |key| {
            self.probe(key, IndexType::Name)
        })
    }

    pub fn get_raw_name(&self, name_key: u64) -> Result<Option<Vec<u8>>> {
        match self.get_record(name_key, IndexType::Name)? {
            Some(record) => Ok(Some(decode_name(&record)?.1.to_vec())),
            None => Ok(None),
        }
    }

    pub fn get_name(&self, name_key: u64) -> Result<Option<String>> {
        match self.get_raw_name(name_key)? {
            Some(raw) => String::from_utf8(raw)
                .map(Some)
                .map_err(|e| DecodeError::Malformed(e.to_string()).into()),
            None => Ok(None),
        }
    }

    pub fn get_name_count(&self, name_key: u64) -> Result<u32> {
        match self.get_record(name_key, IndexType::Name)? {
            Some(record) => Ok(decode_name(&record)?.0),
            None => Ok(0),
        }
    }
}

/// Rejects keys outside the key space of `geometry`.
pub(crate) fn check_key(geometry: &TrieGeometry, key: u64) -> Result<()> {
    if !geometry.contains(key) {
        return Err(DbError::KeyOutOfRange {
            key,
            max: geometry.max_key(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ResourceConfig;

    #[test]
    fn test_empty_revision() {
        let resource = ResourceManager::in_memory(ResourceConfig::default()).unwrap();
        let rtx = resource.begin_read_trx().unwrap();

        assert_eq!(rtx.get_revision_number(), 0);
        assert!(rtx.revision_timestamp() > 0);
        assert_eq!(rtx.uber_page().revision_count(), 1);
        for index in IndexType::ALL {
            assert!(rtx.get_record(42, index).unwrap().is_none());
            assert_eq!(rtx.max_node_key(index).unwrap(), 0);
        }
        let root = rtx.actual_revision_root().clone();
        assert!(rtx.get_name_page(&root).unwrap().is_none());
        assert!(rtx.get_dewey_id_page(&root).unwrap().is_none());
        assert!(rtx.name_key("missing").unwrap().is_none());
        assert_eq!(rtx.get_name_count(7).unwrap(), 0);
    }

    #[test]
    fn test_key_out_of_range() {
        let config = ResourceConfig::new().with_key_bits(16).with_record_page_bits(2).with_level_bits(4);
        let resource = ResourceManager::in_memory(config).unwrap();
        let rtx = resource.begin_read_trx().unwrap();
        assert!(rtx.get_record(0xFFFF, IndexType::Record).unwrap().is_none());
        assert!(matches!(
            rtx.get_record(0x1_0000, IndexType::Record),
            Err(DbError::KeyOutOfRange { key: 0x1_0000, max: 0xFFFF })
        ));
    }

    #[test]
    fn test_page_key() {
        let resource = ResourceManager::in_memory(ResourceConfig::default()).unwrap();
        let rtx = resource.begin_read_trx().unwrap();
        assert_eq!(rtx.page_key(0), 0);
        assert_eq!(rtx.page_key(127), 0);
        assert_eq!(rtx.page_key(128), 1);
    }

    #[test]
    fn test_trx_ids_are_resource_scoped() {
        let a = ResourceManager::in_memory(ResourceConfig::default()).unwrap();
        let b = ResourceManager::in_memory(ResourceConfig::default()).unwrap();
        let first = a.begin_read_trx().unwrap().trx_id();
        let second = a.begin_read_trx().unwrap().trx_id();
        assert!(second > first);
        assert_eq!(b.begin_read_trx().unwrap().trx_id(), first);
    }

    #[test]
    fn test_caches_are_optional() {
        let resource = ResourceManager::in_memory(ResourceConfig::default()).unwrap();
        let mut wtx = resource.begin_write_trx().unwrap();
        wtx.set_record(3, b"x".to_vec(), IndexType::Record).unwrap();
        wtx.commit().unwrap();
        drop(wtx);

        let rtx = resource.begin_read_trx().unwrap();
        assert_eq!(rtx.get_record(3, IndexType::Record).unwrap(), Some(b"x".to_vec()));
        assert!(rtx.cached_pages() > 0);

        rtx.clear_caches();
        assert_eq!(rtx.cached_pages(), 0);
        assert_eq!(rtx.get_record(3, IndexType::Record).unwrap(), Some(b"x".to_vec()));

        rtx.close_caches();
        assert_eq!(rtx.get_record(3, IndexType::Record).unwrap(), Some(b"x".to_vec()));
        assert_eq!(rtx.cached_pages(), 0);
        rtx.close();
    }

    #[test]
    fn test_manual_cache_entries() {
        let resource = ResourceManager::in_memory(ResourceConfig::default()).unwrap();
        let rtx = resource.begin_read_trx().unwrap();
        let start = rtx.uber_page().trie_reference().unwrap().clone();
        let page = resource.load_page(&start, PageKind::Indirect).unwrap();

        rtx.clear_caches();
        assert!(rtx.get_from_page_cache(&start).is_none());
        rtx.put_page_cache(&start, page.clone());
        assert_eq!(rtx.get_from_page_cache(&start), Some(page));
    }
}
