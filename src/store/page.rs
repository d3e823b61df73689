//! Page abstraction.
//!
//! A page is one of five kinds. All kinds serialize through the same frame:
//! a [`PageHeader`] followed by the kind's body (reference delegate first,
//! trailing fields after).

use crate::data::{PageReader, PageWriter};

use super::page_header::PageHeader;
use super::{
    DbError, IndexRootPage, IndirectPage, PageKind, RecordPage, References, Result,
    RevisionRootPage, UberPage,
};

/// Shape parameters needed to build and decode pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageLayout {
    /// References per indirect page.
    pub indirect_fanout: usize,
    /// Entries a direct delegate holds before it is promoted to a bitmap.
    pub direct_capacity: usize,
    /// Low key bits resolved inside a record page.
    pub record_page_bits: u8,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            indirect_fanout: 1024,
            direct_capacity: 4,
            record_page_bits: 7,
        }
    }
}

/// A decoded page.
#[derive(Clone, Debug, PartialEq)]
pub enum Page {
    Uber(UberPage),
    RevisionRoot(RevisionRootPage),
    Indirect(IndirectPage),
    Record(RecordPage),
    IndexRoot(IndexRootPage),
}

impl Page {
    /// Kind of this page.
    pub fn kind(&self) -> PageKind {
        match self {
            Page::Uber(_) => PageKind::Uber,
            Page::RevisionRoot(_) => PageKind::RevisionRoot,
            Page::Indirect(_) => PageKind::Indirect,
            Page::Record(_) => PageKind::Record,
            Page::IndexRoot(p) => p.kind(),
        }
    }

    /// Outgoing references.
    pub fn references(&self) -> &References {
        match self {
            Page::Uber(p) => p.references(),
            Page::RevisionRoot(p) => p.references(),
            Page::Indirect(p) => p.references(),
            Page::Record(p) => p.references(),
            Page::IndexRoot(p) => p.references(),
        }
    }

    /// Mutable outgoing references.
    pub fn references_mut(&mut self) -> &mut References {
        match self {
            Page::Uber(p) => p.references_mut(),
            Page::RevisionRoot(p) => p.references_mut(),
            Page::Indirect(p) => p.references_mut(),
            Page::Record(p) => p.references_mut(),
            Page::IndexRoot(p) => p.references_mut(),
        }
    }

    pub fn as_uber(&self) -> Option<&UberPage> {
        match self {
            Page::Uber(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_uber_mut(&mut self) -> Option<&mut UberPage> {
        match self {
            Page::Uber(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_revision_root(&self) -> Option<&RevisionRootPage> {
        match self {
            Page::RevisionRoot(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_revision_root_mut(&mut self) -> Option<&mut RevisionRootPage> {
        match self {
            Page::RevisionRoot(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&RecordPage> {
        match self {
            Page::Record(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut RecordPage> {
        match self {
            Page::Record(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_index_root(&self) -> Option<&IndexRootPage> {
        match self {
            Page::IndexRoot(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_index_root_mut(&mut self) -> Option<&mut IndexRootPage> {
        match self {
            Page::IndexRoot(p) => Some(p),
            _ => None,
        }
    }

    /// Serializes the page into a framed byte vector.
    ///
    /// Every outgoing reference must already be flushed.
    pub fn serialize(&self) -> Vec<u8> {
        let mut w = PageWriter::with_capacity(64);
        let mut header = [0u8; PageHeader::SIZE];
        PageHeader::new(self.kind()).write(&mut header);
        w.put_raw(&header);
        match self {
            Page::Uber(p) => p.encode(&mut w),
            Page::RevisionRoot(p) => p.encode(&mut w),
            Page::Indirect(p) => p.encode(&mut w),
            Page::Record(p) => p.encode(&mut w),
            Page::IndexRoot(p) => p.encode(&mut w),
        }
        w.into_bytes()
    }

    /// Decodes a framed page of the `expected` kind.
    pub fn deserialize(expected: PageKind, bytes: &[u8], layout: &PageLayout) -> Result<Page> {
        let header = PageHeader::read(bytes)?;
        if header.kind != expected as u8 {
            return Err(DbError::UnexpectedPageKind {
                expected,
                found: header.kind,
            });
        }

        let mut r = PageReader::new(&bytes[PageHeader::SIZE..]);
        let page = match expected {
            PageKind::Uber => Page::Uber(UberPage::decode(&mut r)?),
            PageKind::RevisionRoot => Page::RevisionRoot(RevisionRootPage::decode(&mut r, layout)?),
            PageKind::Indirect => Page::Indirect(IndirectPage::decode(&mut r, layout)?),
            PageKind::Record => Page::Record(RecordPage::decode(&mut r, layout)?),
            kind => Page::IndexRoot(IndexRootPage::decode(&mut r, kind)?),
        };
        r.finish()?;
        Ok(page)
    }
}
