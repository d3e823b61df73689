//! Transaction intent log.
//!
//! Arena of pages staged by the open writer. Entries are addressed by
//! [`LogKey`] and live until the writer commits (entries are moved out and
//! flushed) or aborts (the arena is dropped).

use super::{LogKey, PageContainer};

/// In-memory staging area for uncommitted pages.
#[derive(Debug, Default)]
pub struct TransactionIntentLog {
    entries: Vec<Option<PageContainer>>,
}

impl TransactionIntentLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a container and returns its key.
    pub fn put(&mut self, container: PageContainer) -> LogKey {
        let key = LogKey::new(self.entries.len() as u32);
        self.entries.push(Some(container));
        key
    }

    /// Replaces the container stored at `key`.
    pub fn put_at(&mut self, key: LogKey, container: PageContainer) {
        if let Some(slot) = self.entries.get_mut(key.index()) {
            *slot = Some(container);
        }
    }

    pub fn get(&self, key: LogKey) -> Option<&PageContainer> {
        if key.is_null() {
            return None;
        }
        self.entries.get(key.index()).and_then(|e| e.as_ref())
    }

    pub fn get_mut(&mut self, key: LogKey) -> Option<&mut PageContainer> {
        if key.is_null() {
            return None;
        }
        self.entries.get_mut(key.index()).and_then(|e| e.as_mut())
    }

    /// Moves a container out of the log, leaving its slot empty.
    pub fn take(&mut self, key: LogKey) -> Option<PageContainer> {
        if key.is_null() {
            return None;
        }
        self.entries.get_mut(key.index()).and_then(|e| e.take())
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every staged page.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{IndirectPage, Page, PageLayout, PageKind, RecordPage};

    fn container(kind: PageKind) -> PageContainer {
        let layout = PageLayout::default();
        match kind {
            PageKind::Record => PageContainer::new(Page::Record(RecordPage::new(0, &layout))),
            _ => PageContainer::new(Page::Indirect(IndirectPage::new(&layout))),
        }
    }

    #[test]
    fn test_put_get_take() {
        let mut log = TransactionIntentLog::new();
        let a = log.put(container(PageKind::Indirect));
        let b = log.put(container(PageKind::Record));
        assert_ne!(a, b);
        assert_eq!(log.len(), 2);
        assert_eq!(log.get(b).unwrap().modified().kind(), PageKind::Record);

        assert!(log.take(a).is_some());
        assert!(log.get(a).is_none());
        assert!(log.take(a).is_none());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_put_at_replaces() {
        let mut log = TransactionIntentLog::new();
        let key = log.put(container(PageKind::Indirect));
        log.put_at(key, container(PageKind::Record));
        assert_eq!(log.get(key).unwrap().modified().kind(), PageKind::Record);
    }

    #[test]
    fn test_null_key_and_clear() {
        let mut log = TransactionIntentLog::new();
        log.put(container(PageKind::Indirect));
        assert!(log.get(LogKey::NULL).is_none());
        log.clear();
        assert!(log.is_empty());
    }
}
