//! ResourceManager - One open versioned resource.
//!
//! Owns the storage backend and publishes the current UberPage. Transactions
//! borrow the manager; readers bind to the UberPage generation current when
//! they open, and a single writer builds the next generation off to the side.
//!
//! ## Publishing
//!
//! A commit appends every staged page (children before parents), syncs,
//! writes the storage beacon, and only then swaps the in-memory snapshot.
//! Readers never observe a half-written generation: an error before the swap
//! rolls the storage back to the previous beacon, which stays authoritative
//! in memory and on disk.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::data::{keccak256, DecodeError, PageHash, TrieGeometry};

use super::{
    CommitOptions, DbMetrics, MmapStorage, Page, PageContainer, PageKind, PageLayout,
    PageReadTrx, PageReference, PageSource, PageWriteTrx, ResourceConfig, RevisionRootPage,
    Storage, StorageKey, TransactionIntentLog, TrieReader, TrieWriter, UberPage,
};

/// Resource errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Page not found: {0}")]
    PageNotFound(StorageKey),
    #[error("Hash mismatch for page {0}")]
    HashMismatch(StorageKey),
    #[error("Unexpected page kind: expected {expected:?}, found tag {found}")]
    UnexpectedPageKind { expected: PageKind, found: u8 },
    #[error("Key {key} outside key space (max {max})")]
    KeyOutOfRange { key: u64, max: u64 },
    #[error("Slot {slot} outside fan-out {fanout}")]
    SlotOutOfRange { slot: usize, fanout: usize },
    #[error("A write transaction is already open")]
    WriterActive,
    #[error("Revision {0} not found")]
    RevisionNotFound(u32),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Resource is full")]
    Full,
}

impl DbError {
    pub(crate) fn unexpected(expected: PageKind, found: PageKind) -> Self {
        DbError::UnexpectedPageKind {
            expected,
            found: found as u8,
        }
    }

    /// Returns true for storage and page decoding failures.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            DbError::Io(_)
                | DbError::Decode(_)
                | DbError::HashMismatch(_)
                | DbError::UnexpectedPageKind { .. }
                | DbError::PageNotFound(_)
        )
    }
}

/// Result type for resource operations.
pub type Result<T> = std::result::Result<T, DbError>;

/// A published UberPage generation.
#[derive(Clone, Debug)]
pub struct UberSnapshot {
    uber: UberPage,
    storage_key: StorageKey,
}

impl UberSnapshot {
    pub fn uber(&self) -> &UberPage {
        &self.uber
    }

    /// Storage address of the UberPage (null before the first commit).
    pub fn storage_key(&self) -> StorageKey {
        self.storage_key
    }
}

/// One open resource.
pub struct ResourceManager {
    storage: Box<dyn Storage>,
    config: ResourceConfig,
    record_geometry: TrieGeometry,
    revision_geometry: TrieGeometry,
    layout: PageLayout,
    snapshot: RwLock<Arc<UberSnapshot>>,
    writer_active: AtomicBool,
    next_trx_id: AtomicU64,
    metrics: DbMetrics,
}

impl ResourceManager {
    /// Opens or creates a file-backed resource.
    pub fn open<P: AsRef<Path>>(path: P, config: ResourceConfig) -> Result<Self> {
        config.validate()?;
        let storage = MmapStorage::open(path, config.initial_size)?;
        Self::with_storage(Box::new(storage), config)
    }

    /// Creates a resource backed by anonymous memory.
    pub fn in_memory(config: ResourceConfig) -> Result<Self> {
        config.validate()?;
        let storage = MmapStorage::anonymous(config.initial_size)?;
        Self::with_storage(Box::new(storage), config)
    }

    /// Opens a resource on an arbitrary storage backend.
    ///
    /// An empty backend is bootstrapped with revision 0. Otherwise the
    /// geometry stored in the UberPage replaces `config.geometry`.
    pub fn with_storage(storage: Box<dyn Storage>, mut config: ResourceConfig) -> Result<Self> {
        config.validate()?;

        let existing = match storage.read_beacon()? {
            Some(key) => {
                let bytes = storage.read_page(key)?;
                let page = Page::deserialize(PageKind::Uber, &bytes, &PageLayout::default())?;
                let uber = match page {
                    Page::Uber(uber) => uber,
                    other => return Err(DbError::unexpected(PageKind::Uber, other.kind())),
                };
                config.geometry = uber.geometry();
                config.geometry.validate()?;
                Some(UberSnapshot {
                    uber,
                    storage_key: key,
                })
            }
            None => None,
        };

        let is_new = existing.is_none();
        let snapshot = existing.unwrap_or_else(|| UberSnapshot {
            uber: UberPage::new(config.geometry),
            storage_key: StorageKey::NULL,
        });

        let resource = Self {
            record_geometry: config.geometry.record_trie()?,
            revision_geometry: config.geometry.revision_trie()?,
            layout: config.geometry.layout(),
            storage,
            config,
            snapshot: RwLock::new(Arc::new(snapshot)),
            writer_active: AtomicBool::new(false),
            next_trx_id: AtomicU64::new(0),
            metrics: DbMetrics::new(),
        };

        if is_new {
            resource.bootstrap()?;
        }

        debug!(
            is_new,
            revisions = resource.revision_count(),
            geometry = ?resource.config.geometry,
            "resource opened"
        );
        Ok(resource)
    }

    /// Writes revision 0: an empty revision root under a fresh UberPage.
    fn bootstrap(&self) -> Result<()> {
        let mut log = TransactionIntentLog::new();
        let uber_lk = log.put(PageContainer::new(Page::Uber(UberPage::new(
            self.config.geometry,
        ))));

        let layout = self.layout;
        let path = self.revision_geometry.page_path(0);
        let rr_lk = TrieWriter {
            log: &mut log,
            source: self,
            metrics: &self.metrics,
            layout: &self.layout,
        }
        .prepare_path(uber_lk, UberPage::TRIE_SLOT, &path, PageKind::RevisionRoot, || {
            PageContainer::new(Page::RevisionRoot(RevisionRootPage::new(0, &layout)))
        })?;

        if let Some(rr) = log
            .get_mut(rr_lk)
            .and_then(|c| c.modified_mut().as_revision_root_mut())
        {
            rr.set_timestamp_ms(now_millis());
        }
        let mut uber = log
            .take(uber_lk)
            .map(PageContainer::into_modified)
            .ok_or(DbError::PageNotFound(StorageKey::NULL))?;
        if let Some(uber) = uber.as_uber_mut() {
            uber.set_revision_count(1);
        }

        self.publish(uber, &mut log, self.config.commit_options)?;
        debug!("bootstrapped revision 0");
        Ok(())
    }

    /// Begins a read transaction on the latest revision.
    pub fn begin_read_trx(&self) -> Result<PageReadTrx<'_>> {
        let snapshot = self.snapshot();
        let revision = snapshot.uber().latest_revision();
        self.metrics.inc_read_trxs();
        PageReadTrx::open(self, snapshot, revision)
    }

    /// Begins a read transaction on `revision`.
    pub fn begin_read_trx_at(&self, revision: u32) -> Result<PageReadTrx<'_>> {
        self.metrics.inc_read_trxs();
        PageReadTrx::open(self, self.snapshot(), revision)
    }

    /// Begins the write transaction.
    ///
    /// Fails with [`DbError::WriterActive`] while another writer is open.
    pub fn begin_write_trx(&self) -> Result<PageWriteTrx<'_>> {
        if self
            .writer_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DbError::WriterActive);
        }
        PageWriteTrx::begin(self).inspect_err(|_| self.release_writer())
    }

    /// Returns true while a write transaction is open.
    pub fn has_writer(&self) -> bool {
        self.writer_active.load(Ordering::Acquire)
    }

    /// Current published UberPage generation.
    pub fn snapshot(&self) -> Arc<UberSnapshot> {
        self.snapshot.read().clone()
    }

    /// Number of committed revisions, bootstrap revision included.
    pub fn revision_count(&self) -> u32 {
        self.snapshot.read().uber().revision_count()
    }

    /// Most recent committed revision.
    pub fn latest_revision(&self) -> u32 {
        self.snapshot.read().uber().latest_revision()
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    pub fn metrics(&self) -> &DbMetrics {
        &self.metrics
    }

    /// Geometry of record tries.
    pub fn record_geometry(&self) -> &TrieGeometry {
        &self.record_geometry
    }

    /// Geometry of the revision trie.
    pub fn revision_geometry(&self) -> &TrieGeometry {
        &self.revision_geometry
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    pub(crate) fn next_trx_id(&self) -> u64 {
        self.next_trx_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn release_writer(&self) {
        self.writer_active.store(false, Ordering::Release);
    }

    /// Loads the revision root page for `revision` of `uber`.
    pub(crate) fn load_revision_root(
        &self,
        uber: &UberPage,
        revision: u32,
        source: &dyn PageSource,
    ) -> Result<RevisionRootPage> {
        if revision >= uber.revision_count() {
            return Err(DbError::RevisionNotFound(revision));
        }
        let start = uber
            .trie_reference()
            .ok_or(DbError::RevisionNotFound(revision))?;
        let reader = TrieReader {
            geometry: &self.revision_geometry,
            log: None,
            source,
        };
        let leaf = reader
            .find_leaf(start, revision as u64)?
            .ok_or(DbError::RevisionNotFound(revision))?;
        let page = source.load_page(&leaf, PageKind::RevisionRoot)?;
        page.as_revision_root()
            .cloned()
            .ok_or_else(|| DbError::unexpected(PageKind::RevisionRoot, page.kind()))
    }

    /// Reads and decodes the durable page behind `reference`.
    pub(crate) fn read_page(&self, reference: &PageReference, kind: PageKind) -> Result<Page> {
        let key = reference.storage_key();
        if key.is_null() {
            return Err(DbError::PageNotFound(key));
        }
        let bytes = self.storage.read_page(key)?;
        self.metrics.inc_page_reads();
        self.metrics.add_bytes_read(bytes.len() as u64);

        if self.config.verify_hashes {
            if let Some(expected) = reference.hash() {
                if keccak256(&bytes) != *expected {
                    return Err(DbError::HashMismatch(key));
                }
            }
        }
        trace!(?kind, %key, len = bytes.len(), "page loaded");
        Page::deserialize(kind, &bytes, &self.layout)
    }

    /// Flushes `uber` and everything it reaches in `log`, then publishes it.
    ///
    /// Nothing becomes visible unless every write, both syncs, and the beacon
    /// update succeed. On failure the storage is rolled back to the beacon of
    /// the current snapshot.
    pub(crate) fn publish(
        &self,
        uber: Page,
        log: &mut TransactionIntentLog,
        options: CommitOptions,
    ) -> Result<Arc<UberSnapshot>> {
        let previous = self.snapshot.read().storage_key();
        let (key, uber) = match self.write_generation(uber, log, options) {
            Ok(written) => written,
            Err(err) => {
                if let Err(rollback) = self.storage.rollback(previous) {
                    warn!(%previous, error = %rollback, "storage rollback failed");
                }
                return Err(err);
            }
        };

        let snapshot = Arc::new(UberSnapshot {
            uber,
            storage_key: key,
        });
        *self.snapshot.write() = snapshot.clone();
        log.clear();
        Ok(snapshot)
    }

    /// Appends the new generation and points the beacon at its UberPage.
    fn write_generation(
        &self,
        uber: Page,
        log: &mut TransactionIntentLog,
        options: CommitOptions,
    ) -> Result<(StorageKey, UberPage)> {
        let (key, _, page) = self.flush_page(uber, log)?;
        let uber = match page {
            Page::Uber(uber) => uber,
            other => return Err(DbError::unexpected(PageKind::Uber, other.kind())),
        };

        self.storage.sync(options)?;
        self.storage.write_beacon(key)?;
        if options == CommitOptions::FlushDataAndRoot {
            self.storage.sync(options)?;
        }
        Ok((key, uber))
    }

    /// Writes `page` after flushing every staged or resident child.
    fn flush_page(
        &self,
        mut page: Page,
        log: &mut TransactionIntentLog,
    ) -> Result<(StorageKey, PageHash, Page)> {
        for reference in page.references_mut().iter_mut() {
            self.flush_reference(reference, log)?;
        }

        let bytes = page.serialize();
        let hash = keccak256(&bytes);
        let key = self.storage.write_page(&bytes)?;
        self.metrics.inc_page_writes();
        self.metrics.add_bytes_written(bytes.len() as u64);
        trace!(kind = ?page.kind(), %key, len = bytes.len(), "page written");
        Ok((key, hash, page))
    }

    fn flush_reference(
        &self,
        reference: &mut PageReference,
        log: &mut TransactionIntentLog,
    ) -> Result<()> {
        let page = if !reference.log_key().is_null() {
            log.take(reference.log_key())
                .map(PageContainer::into_modified)
                .ok_or(DbError::PageNotFound(reference.storage_key()))?
        } else if let Some(page) = reference.take_page() {
            page
        } else {
            return Ok(());
        };

        let (key, hash, _) = self.flush_page(page, log)?;
        reference.persisted(key, hash);
        Ok(())
    }
}

impl PageSource for ResourceManager {
    fn load_page(&self, reference: &PageReference, kind: PageKind) -> Result<Arc<Page>> {
        self.read_page(reference, kind).map(Arc::new)
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::IndexType;

    #[test]
    fn test_in_memory_bootstrap() {
        let resource = ResourceManager::in_memory(ResourceConfig::default()).unwrap();
        assert_eq!(resource.revision_count(), 1);
        assert_eq!(resource.latest_revision(), 0);
        assert!(!resource.snapshot().storage_key().is_null());

        let rtx = resource.begin_read_trx().unwrap();
        assert_eq!(rtx.get_revision_number(), 0);
        assert_eq!(rtx.max_node_key(IndexType::Record).unwrap(), 0);
        assert!(rtx.get_record(0, IndexType::Record).unwrap().is_none());
    }

    #[test]
    fn test_create_database_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        let resource = ResourceManager::open(&path, ResourceConfig::default()).unwrap();
        assert_eq!(resource.revision_count(), 1);
        drop(resource);

        let resource = ResourceManager::open(&path, ResourceConfig::default()).unwrap();
        assert_eq!(resource.revision_count(), 1);
    }

    #[test]
    fn test_stored_geometry_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geometry.db");

        let config = ResourceConfig::new().with_key_bits(20).with_level_bits(6);
        drop(ResourceManager::open(&path, config).unwrap());

        let resource = ResourceManager::open(&path, ResourceConfig::default()).unwrap();
        assert_eq!(resource.record_geometry().key_bits(), 20);
        assert_eq!(resource.layout().indirect_fanout, 64);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ResourceConfig::new().with_direct_capacity(0);
        assert!(matches!(
            ResourceManager::in_memory(config),
            Err(DbError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_unknown_revision() {
        let resource = ResourceManager::in_memory(ResourceConfig::default()).unwrap();
        assert!(matches!(
            resource.begin_read_trx_at(1),
            Err(DbError::RevisionNotFound(1))
        ));
    }

    #[test]
    fn test_single_writer() {
        let resource = ResourceManager::in_memory(ResourceConfig::default()).unwrap();
        let wtx = resource.begin_write_trx().unwrap();
        assert!(resource.has_writer());
        assert!(matches!(resource.begin_write_trx(), Err(DbError::WriterActive)));
        wtx.abort();
        assert!(!resource.has_writer());
        assert!(resource.begin_write_trx().is_ok());
    }

    #[test]
    fn test_error_categories() {
        assert!(DbError::Io(io::Error::other("disk")).is_io());
        assert!(DbError::Decode(DecodeError::Version(9)).is_io());
        assert!(!DbError::WriterActive.is_io());
        assert!(!DbError::KeyOutOfRange { key: 1, max: 0 }.is_io());
    }
}
