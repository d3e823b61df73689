//! Copy-on-write page containers.

use std::sync::Arc;

use super::Page;

/// A page staged by the writer: the committed view and its working copy.
///
/// `complete` is shared with readers of older revisions and never mutated.
/// `modified` starts as a clone of it and receives every change.
#[derive(Clone, Debug)]
pub struct PageContainer {
    complete: Option<Arc<Page>>,
    modified: Page,
}

impl PageContainer {
    /// Wraps a page created by this transaction.
    pub fn new(page: Page) -> Self {
        Self {
            complete: None,
            modified: page,
        }
    }

    /// Wraps a committed page, cloning it into the working copy.
    pub fn from_complete(complete: Arc<Page>) -> Self {
        let modified = (*complete).clone();
        Self {
            complete: Some(complete),
            modified,
        }
    }

    /// Pairs a working copy with an explicit predecessor.
    ///
    /// Used for revision roots, whose working copy descends from the previous
    /// revision's root rather than from a page at the same address.
    pub fn with_parts(complete: Option<Arc<Page>>, modified: Page) -> Self {
        Self { complete, modified }
    }

    /// The pre-mutation view, if the page existed before this transaction.
    pub fn complete(&self) -> Option<&Arc<Page>> {
        self.complete.as_ref()
    }

    /// The working copy.
    pub fn modified(&self) -> &Page {
        &self.modified
    }

    pub fn modified_mut(&mut self) -> &mut Page {
        &mut self.modified
    }

    /// Consumes the container, returning the working copy.
    pub fn into_modified(self) -> Page {
        self.modified
    }
}
