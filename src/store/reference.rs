//! Page references.
//!
//! Parent pages never embed their children. They hold `PageReference`s that
//! can be resolved to a page through one of three sources, tried in order:
//! the resident page owned by the reference, the write transaction's intent
//! log, and durable storage.

use std::ops::Deref;
use std::sync::Arc;

use crate::data::{DecodeError, PageHash, PageReader, PageWriter, HASH_SIZE};

use super::{DbError, LogKey, Page, PageKind, Result, StorageKey, TransactionIntentLog};

/// Loads committed pages from durable storage.
///
/// Implemented by the read transaction, which puts its page cache in front
/// of the storage backend.
pub trait PageSource {
    /// Loads the durable page `reference` points at.
    fn load_page(&self, reference: &PageReference, kind: PageKind) -> Result<Arc<Page>>;
}

/// A resolvable handle to a page.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageReference {
    storage_key: StorageKey,
    log_key: LogKey,
    page: Option<Box<Page>>,
    hash: Option<PageHash>,
}

impl PageReference {
    /// Size of an encoded reference without hash.
    pub const MIN_ENCODED_SIZE: usize = StorageKey::SIZE + 1;

    /// Creates an unset reference.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a reference to a durable page.
    pub fn from_storage(storage_key: StorageKey, hash: Option<PageHash>) -> Self {
        Self {
            storage_key,
            hash,
            ..Self::default()
        }
    }

    /// Creates a reference to an intent-log slot.
    pub fn from_log(log_key: LogKey) -> Self {
        Self {
            log_key,
            ..Self::default()
        }
    }

    /// Creates a reference owning a resident page.
    pub fn with_page(page: Page) -> Self {
        Self {
            page: Some(Box::new(page)),
            ..Self::default()
        }
    }

    /// Durable address (null if not yet flushed).
    #[inline]
    pub fn storage_key(&self) -> StorageKey {
        self.storage_key
    }

    pub fn set_storage_key(&mut self, key: StorageKey) {
        self.storage_key = key;
    }

    /// Intent-log slot (null if not staged).
    #[inline]
    pub fn log_key(&self) -> LogKey {
        self.log_key
    }

    pub fn set_log_key(&mut self, key: LogKey) {
        self.log_key = key;
    }

    /// Content hash of the durable page.
    #[inline]
    pub fn hash(&self) -> Option<&PageHash> {
        self.hash.as_ref()
    }

    pub fn set_hash(&mut self, hash: Option<PageHash>) {
        self.hash = hash;
    }

    /// Resident page, if any.
    #[inline]
    pub fn page(&self) -> Option<&Page> {
        self.page.as_deref()
    }

    pub fn set_page(&mut self, page: Page) {
        self.page = Some(Box::new(page));
    }

    /// Removes and returns the resident page.
    pub fn take_page(&mut self) -> Option<Page> {
        self.page.take().map(|p| *p)
    }

    /// Returns true if any of the three sources is populated.
    #[inline]
    pub fn is_set(&self) -> bool {
        !self.storage_key.is_null() || !self.log_key.is_null() || self.page.is_some()
    }

    /// Returns true if the reference points only at durable storage.
    #[inline]
    pub fn is_durable(&self) -> bool {
        !self.storage_key.is_null() && self.log_key.is_null() && self.page.is_none()
    }

    /// Marks the reference as flushed to `storage_key`.
    pub fn persisted(&mut self, storage_key: StorageKey, hash: PageHash) {
        self.storage_key = storage_key;
        self.hash = Some(hash);
        self.log_key = LogKey::NULL;
        self.page = None;
    }

    /// Resolves the reference to a page.
    ///
    /// The resident page wins, then the intent log, then durable storage.
    pub fn resolve<'a>(
        &'a self,
        kind: PageKind,
        log: Option<&'a TransactionIntentLog>,
        source: &dyn PageSource,
    ) -> Result<Resolved<'a>> {
        if let Some(page) = self.page.as_deref() {
            return Ok(Resolved::Borrowed(page));
        }
        if !self.log_key.is_null() {
            if let Some(container) = log.and_then(|log| log.get(self.log_key)) {
                return Ok(Resolved::Borrowed(container.modified()));
            }
        }
        if !self.storage_key.is_null() {
            return source.load_page(self, kind).map(Resolved::Shared);
        }
        Err(DbError::PageNotFound(self.storage_key))
    }

    /// Encodes the durable part of the reference.
    ///
    /// Only flushed references are encoded; the commit path persists children
    /// before the parents that point at them.
    pub fn encode(&self, w: &mut PageWriter) {
        debug_assert!(
            self.log_key.is_null() && self.page.is_none(),
            "encoding an unflushed reference"
        );
        w.put_u64(self.storage_key.raw());
        match &self.hash {
            Some(hash) => {
                w.put_u8(1);
                w.put_raw(hash);
            }
            None => w.put_u8(0),
        }
    }

    /// Decodes a reference written by [`encode`](Self::encode).
    pub fn decode(r: &mut PageReader<'_>) -> std::result::Result<Self, DecodeError> {
        let storage_key = StorageKey::new(r.get_u64()?);
        let hash = match r.get_u8()? {
            0 => None,
            1 => Some(r.get_array::<HASH_SIZE>()?),
            tag => return Err(DecodeError::InvalidTag { what: "reference hash", tag }),
        };
        Ok(Self::from_storage(storage_key, hash))
    }
}

/// A page obtained through [`PageReference::resolve`].
pub enum Resolved<'a> {
    /// Resident or intent-log page.
    Borrowed(&'a Page),
    /// Page loaded from the cache or durable storage.
    Shared(Arc<Page>),
}

impl Deref for Resolved<'_> {
    type Target = Page;

    fn deref(&self) -> &Page {
        match self {
            Resolved::Borrowed(page) => page,
            Resolved::Shared(page) => page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{IndirectPage, PageContainer, PageLayout};

    struct NoStorage;

    impl PageSource for NoStorage {
        fn load_page(&self, reference: &PageReference, _kind: PageKind) -> Result<Arc<Page>> {
            Err(DbError::PageNotFound(reference.storage_key()))
        }
    }

    struct FixedStorage(Arc<Page>);

    impl PageSource for FixedStorage {
        fn load_page(&self, _reference: &PageReference, _kind: PageKind) -> Result<Arc<Page>> {
            Ok(self.0.clone())
        }
    }

    fn indirect() -> Page {
        Page::Indirect(IndirectPage::new(&PageLayout::default()))
    }

    #[test]
    fn test_unset_reference() {
        let reference = PageReference::new();
        assert!(!reference.is_set());
        assert!(matches!(
            reference.resolve(PageKind::Indirect, None, &NoStorage),
            Err(DbError::PageNotFound(_))
        ));
    }

    #[test]
    fn test_resident_page_wins() {
        let mut reference = PageReference::with_page(indirect());
        reference.set_storage_key(StorageKey::new(64));
        let resolved = reference.resolve(PageKind::Indirect, None, &NoStorage).unwrap();
        assert!(matches!(resolved, Resolved::Borrowed(_)));
    }

    #[test]
    fn test_log_before_storage() {
        let mut log = TransactionIntentLog::new();
        let key = log.put(PageContainer::new(indirect()));
        let mut reference = PageReference::from_log(key);
        reference.set_storage_key(StorageKey::new(64));

        let resolved = reference.resolve(PageKind::Indirect, Some(&log), &NoStorage).unwrap();
        assert!(matches!(resolved, Resolved::Borrowed(_)));
    }

    #[test]
    fn test_storage_fallback() {
        let reference = PageReference::from_storage(StorageKey::new(64), None);
        let source = FixedStorage(Arc::new(indirect()));
        let resolved = reference.resolve(PageKind::Indirect, None, &source).unwrap();
        assert!(matches!(resolved, Resolved::Shared(_)));
        assert_eq!(resolved.kind(), PageKind::Indirect);
    }

    #[test]
    fn test_encode_decode() {
        for hash in [None, Some([7u8; HASH_SIZE])] {
            let reference = PageReference::from_storage(StorageKey::new(123), hash);
            let mut w = PageWriter::new();
            reference.encode(&mut w);
            let bytes = w.into_bytes();
            let mut r = PageReader::new(&bytes);
            assert_eq!(PageReference::decode(&mut r).unwrap(), reference);
            r.finish().unwrap();
        }
    }

    #[test]
    fn test_persisted_clears_transient_state() {
        let mut reference = PageReference::from_log(LogKey::new(3));
        reference.set_page(indirect());
        reference.persisted(StorageKey::new(99), [1u8; HASH_SIZE]);
        assert!(reference.is_durable());
        assert_eq!(reference.hash(), Some(&[1u8; HASH_SIZE]));
    }
}
