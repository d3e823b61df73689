//! Write transactions.
//!
//! At most one `PageWriteTrx` is open per resource. It stages the next
//! revision in its intent log: on begin the UberPage and the path to the new
//! revision root are copied in, and every record write copies the path from
//! the revision root to the touched record page. Committing flushes the log
//! and publishes the new UberPage; aborting drops the log.

use std::sync::Arc;

use tracing::{debug, warn};

use super::names::{encode_name, NameSlot};
use super::read_trx::{check_key, TrieView};
use super::resource::now_millis;
use super::{
    CommitOptions, DbError, IndexRootPage, IndexType, LogKey, Page, PageContainer, PageKind,
    PageReadTrx, RecordPage, ResourceManager, Result, RevisionRootPage, StorageKey,
    TransactionIntentLog, TrieReader, TrieWriter, UberPage,
};

/// The single writer of a resource.
pub struct PageWriteTrx<'a> {
    reader: PageReadTrx<'a>,
    log: TransactionIntentLog,
    uber_lk: LogKey,
    rr_lk: LogKey,
    revision: u32,
}

impl<'a> PageWriteTrx<'a> {
    pub(crate) fn begin(resource: &'a ResourceManager) -> Result<Self> {
        let snapshot = resource.snapshot();
        let latest = snapshot.uber().latest_revision();
        let reader = PageReadTrx::open(resource, snapshot, latest)?;

        let mut trx = Self {
            reader,
            log: TransactionIntentLog::new(),
            uber_lk: LogKey::NULL,
            rr_lk: LogKey::NULL,
            revision: 0,
        };
        trx.stage_revision()?;
        resource.metrics().inc_write_trxs();
        debug!(
            trx_id = trx.reader.trx_id(),
            revision = trx.revision,
            "write transaction started"
        );
        Ok(trx)
    }

    /// Copies the UberPage into the log and stages the next revision root
    /// as a clone of the latest one.
    fn stage_revision(&mut self) -> Result<()> {
        self.log.clear();
        self.uber_lk = LogKey::NULL;
        self.rr_lk = LogKey::NULL;

        let resource = self.reader.resource;
        let uber = self.reader.snapshot().uber().clone();
        let revision = uber.revision_count();
        if revision == u32::MAX {
            return Err(DbError::KeyOutOfRange {
                key: revision as u64,
                max: u32::MAX as u64 - 1,
            });
        }

        let previous = self.reader.actual_revision_root().clone();
        let mut next = previous.clone();
        next.set_revision(revision);
        next.set_timestamp_ms(0);
        let complete = Arc::new(Page::RevisionRoot(previous));

        let uber_lk = self.log.put(PageContainer::from_complete(Arc::new(Page::Uber(uber))));
        let path = resource.revision_geometry().page_path(revision as u64);
        let rr_lk = self.trie_writer().prepare_path(
            uber_lk,
            UberPage::TRIE_SLOT,
            &path,
            PageKind::RevisionRoot,
            move || PageContainer::with_parts(Some(complete), Page::RevisionRoot(next)),
        )?;

        self.uber_lk = uber_lk;
        self.rr_lk = rr_lk;
        self.revision = revision;
        Ok(())
    }

    fn trie_writer(&mut self) -> TrieWriter<'_> {
        let resource = self.reader.resource;
        TrieWriter {
            log: &mut self.log,
            source: &self.reader,
            metrics: resource.metrics(),
            layout: resource.layout(),
        }
    }

    fn view(&self) -> Result<TrieView<'_>> {
        Ok(TrieView {
            reader: TrieReader {
                geometry: self.reader.resource.record_geometry(),
                log: Some(&self.log),
                source: &self.reader,
            },
            revision_root: self.revision_root()?,
        })
    }

    /// Resource-scoped transaction id.
    pub fn trx_id(&self) -> u64 {
        self.reader.trx_id()
    }

    /// Revision this transaction will commit.
    pub fn get_revision_number(&self) -> u32 {
        self.revision
    }

    /// Revision root under construction.
    pub fn revision_root(&self) -> Result<&RevisionRootPage> {
        let page = staged(&self.log, self.rr_lk)?;
        page.as_revision_root()
            .ok_or_else(|| DbError::unexpected(PageKind::RevisionRoot, page.kind()))
    }

    fn revision_root_mut(&mut self) -> Result<&mut RevisionRootPage> {
        let page = staged_mut(&mut self.log, self.rr_lk)?;
        let kind = page.kind();
        page.as_revision_root_mut()
            .ok_or_else(|| DbError::unexpected(PageKind::RevisionRoot, kind))
    }

    /// UberPage under construction.
    pub fn uber_page(&self) -> Result<&UberPage> {
        let page = staged(&self.log, self.uber_lk)?;
        page.as_uber()
            .ok_or_else(|| DbError::unexpected(PageKind::Uber, page.kind()))
    }

    /// Record under `key` in `index`, including uncommitted writes.
    pub fn get_record(&self, key: u64, index: IndexType) -> Result<Option<Vec<u8>>> {
        self.view()?.get_record(key, index)
    }

    /// Container of the record page `page_key` in `index`.
    pub fn get_record_page_container(
        &self,
        page_key: u64,
        index: IndexType,
    ) -> Result<Option<PageContainer>> {
        let view = self.view()?;
        view.reader
            .record_page_container(view.revision_root, index, page_key)
    }

    /// Index root page of `index` in the revision under construction.
    pub fn get_index_root(&self, index: IndexType) -> Result<Option<IndexRootPage>> {
        let view = self.view()?;
        view.reader.index_root(view.revision_root, index)
    }

    /// Highest key issued in `index`.
    pub fn max_node_key(&self, index: IndexType) -> Result<u64> {
        self.view()?.max_node_key(index)
    }

    pub fn get_name(&self, name_key: u64) -> Result<Option<String>> {
        self.view()?.get_name(name_key)
    }

    pub fn get_raw_name(&self, name_key: u64) -> Result<Option<Vec<u8>>> {
        self.view()?.get_raw_name(name_key)
    }

    pub fn get_name_count(&self, name_key: u64) -> Result<u32> {
        self.view()?.get_name_count(name_key)
    }

    /// Key under which `name` is stored, if present.
    pub fn name_key(&self, name: &str) -> Result<Option<u64>> {
        self.view()?.find_name(name)
    }

    /// Number of pages staged in the intent log.
    pub fn staged_pages(&self) -> usize {
        self.log.len()
    }

    /// Stages the record page holding `key` in `index`.
    ///
    /// For an auxiliary index the index root page is staged first and its
    /// trie is created on first use.
    fn stage_record_page(&mut self, key: u64, index: IndexType) -> Result<LogKey> {
        let geometry = *self.reader.resource.record_geometry();
        let path = geometry.path(key);
        let rr_lk = self.rr_lk;
        let mut writer = self.trie_writer();

        let (parent, slot) = match index.root_kind() {
            None => (rr_lk, index.slot()),
            Some(kind) => {
                let root_lk = writer.prepare_child(rr_lk, index.slot(), kind, || {
                    PageContainer::new(Page::IndexRoot(IndexRootPage::new(kind)))
                })?;
                let root = index_root_mut(&mut *writer.log, root_lk, kind)?;
                if root.trie_depth() == 0 {
                    root.set_trie_depth(geometry.depth() as u8);
                    debug!(?index, depth = geometry.depth(), "index trie created");
                }
                (root_lk, IndexRootPage::TRIE_SLOT)
            }
        };
        writer.prepare_record_page(parent, slot, &path)
    }

    /// Raises the max key of `index` to at least `key`.
    fn raise_max_node_key(&mut self, key: u64, index: IndexType) -> Result<()> {
        match index.root_kind() {
            None => {
                let root = self.revision_root_mut()?;
                if key > root.max_node_key() {
                    root.set_max_node_key(key);
                }
            }
            Some(kind) => {
                let root_lk = self
                    .revision_root()?
                    .index_reference(index)
                    .map_or(LogKey::NULL, |r| r.log_key());
                let root = index_root_mut(&mut self.log, root_lk, kind)?;
                if key > root.max_node_key() {
                    root.set_max_node_key(key);
                }
            }
        }
        Ok(())
    }

    /// Stores `value` under `key` in `index`, returning the previous value.
    pub fn set_record(
        &mut self,
        key: u64,
        value: Vec<u8>,
        index: IndexType,
    ) -> Result<Option<Vec<u8>>> {
        check_key(self.reader.resource.record_geometry(), key)?;
        let leaf = self.stage_record_page(key, index)?;
        let previous = record_page_mut(&mut self.log, leaf)?.insert(key, value);
        self.raise_max_node_key(key, index)?;
        Ok(previous)
    }

    /// Stores `value` under a freshly issued key (max key + 1).
    pub fn create_record(&mut self, value: Vec<u8>, index: IndexType) -> Result<u64> {
        let resource = self.reader.resource;
        let geometry = resource.record_geometry();
        let max = self.max_node_key(index)?;
        let key = max.checked_add(1).ok_or(DbError::KeyOutOfRange {
            key: max,
            max: geometry.max_key(),
        })?;
        self.set_record(key, value, index)?;
        Ok(key)
    }

    /// Removes the record under `key` in `index`, returning it.
    ///
    /// Removing an absent record stages nothing.
    pub fn remove_record(&mut self, key: u64, index: IndexType) -> Result<Option<Vec<u8>>> {
        if self.get_record(key, index)?.is_none() {
            return Ok(None);
        }
        let leaf = self.stage_record_page(key, index)?;
        Ok(record_page_mut(&mut self.log, leaf)?.remove(key))
    }

    /// Adds a reference to `name`, storing it if new. Returns its key.
    pub fn create_name(&mut self, name: &str) -> Result<u64> {
        let slot = self.view()?.find_name_slot(name)?;
        match slot {
            NameSlot::Found { key, count } => {
                let record = encode_name(count.saturating_add(1), name.as_bytes());
                self.set_record(key, record, IndexType::Name)?;
                Ok(key)
            }
            NameSlot::Vacant { key: Some(key) } => {
                self.set_record(key, encode_name(1, name.as_bytes()), IndexType::Name)?;
                Ok(key)
            }
            NameSlot::Vacant { key: None } => Err(DbError::Full),
        }
    }

    /// Drops a reference to `name`; the name is removed with its last
    /// reference. Returns false if the name is unknown.
    pub fn remove_name(&mut self, name: &str) -> Result<bool> {
        let slot = self.view()?.find_name_slot(name)?;
        match slot {
            NameSlot::Found { key, count } if count > 1 => {
                self.set_record(key, encode_name(count - 1, name.as_bytes()), IndexType::Name)?;
                Ok(true)
            }
            NameSlot::Found { key, .. } => {
                self.remove_record(key, IndexType::Name)?;
                Ok(true)
            }
            NameSlot::Vacant { .. } => Ok(false),
        }
    }

    /// Commits with the resource's configured [`CommitOptions`].
    pub fn commit(&mut self) -> Result<u32> {
        let options = self.reader.resource.config().commit_options;
        self.commit_with(options)
    }

    /// Commits the staged revision and returns its number.
    ///
    /// Afterwards the transaction stages the following revision. On failure
    /// the previous revision stays authoritative and the transaction is reset
    /// to it, discarding staged changes.
    pub fn commit_with(&mut self, options: CommitOptions) -> Result<u32> {
        let resource = self.reader.resource;
        let revision = self.revision;

        match self.try_commit(options) {
            Ok(()) => {
                resource.metrics().inc_commits();
                debug!(trx_id = self.trx_id(), revision, "revision committed");
                self.restart()?;
                Ok(revision)
            }
            Err(err) => {
                resource.metrics().inc_failed_commits();
                warn!(trx_id = self.trx_id(), revision, error = %err, "commit failed, writer reset");
                if let Err(reset) = self.restart() {
                    warn!(error = %reset, "writer reset failed");
                }
                Err(err)
            }
        }
    }

    fn try_commit(&mut self, options: CommitOptions) -> Result<()> {
        let root = self.revision_root_mut()?;
        root.set_timestamp_ms(now_millis());
        let max_node_key = root.max_node_key();

        let mut uber = self
            .log
            .take(self.uber_lk)
            .map(PageContainer::into_modified)
            .ok_or(DbError::PageNotFound(StorageKey::NULL))?;
        let kind = uber.kind();
        let page = uber
            .as_uber_mut()
            .ok_or_else(|| DbError::unexpected(PageKind::Uber, kind))?;
        page.set_revision_count(page.revision_count() + 1);
        page.set_max_node_key(page.max_node_key().max(max_node_key));

        self.reader.resource.publish(uber, &mut self.log, options)?;
        Ok(())
    }

    /// Rebinds to the latest published revision and stages the next one.
    fn restart(&mut self) -> Result<()> {
        let resource = self.reader.resource;
        self.log.clear();
        let snapshot = resource.snapshot();
        let latest = snapshot.uber().latest_revision();
        self.reader = PageReadTrx::open(resource, snapshot, latest)?;
        self.stage_revision()
    }

    /// Discards every uncommitted change and closes the transaction.
    pub fn abort(mut self) {
        self.log.clear();
        self.reader.resource.metrics().inc_aborts();
        debug!(trx_id = self.trx_id(), revision = self.revision, "write transaction aborted");
    }

    /// Closes the transaction, discarding uncommitted changes.
    pub fn close(mut self) {
        self.log.clear();
        self.reader.close_caches();
        debug!(trx_id = self.trx_id(), "write transaction closed");
    }
}

impl Drop for PageWriteTrx<'_> {
    fn drop(&mut self) {
        self.reader.resource.release_writer();
    }
}

fn staged(log: &TransactionIntentLog, key: LogKey) -> Result<&Page> {
    log.get(key)
        .map(PageContainer::modified)
        .ok_or(DbError::PageNotFound(StorageKey::NULL))
}

fn staged_mut(log: &mut TransactionIntentLog, key: LogKey) -> Result<&mut Page> {
    log.get_mut(key)
        .map(PageContainer::modified_mut)
        .ok_or(DbError::PageNotFound(StorageKey::NULL))
}

fn record_page_mut(log: &mut TransactionIntentLog, key: LogKey) -> Result<&mut RecordPage> {
    let page = staged_mut(log, key)?;
    let kind = page.kind();
    page.as_record_mut()
        .ok_or_else(|| DbError::unexpected(PageKind::Record, kind))
}

fn index_root_mut(
    log: &mut TransactionIntentLog,
    key: LogKey,
    expected: PageKind,
) -> Result<&mut IndexRootPage> {
    let page = staged_mut(log, key)?;
    let kind = page.kind();
    if kind != expected {
        return Err(DbError::unexpected(expected, kind));
    }
    page.as_index_root_mut()
        .ok_or_else(|| DbError::unexpected(expected, kind))
}
