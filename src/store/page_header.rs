//! Frame header shared across all page kinds.

use crate::data::DecodeError;

/// The current version of the page format.
pub const CURRENT_VERSION: u8 = 1;

/// Kinds of pages in a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PageKind {
    /// Resource anchor referencing the revision trie.
    Uber = 0,
    /// Per-revision anchor referencing every index trie.
    RevisionRoot = 1,
    /// Inner trie node.
    Indirect = 2,
    /// Trie leaf holding records.
    Record = 3,
    /// Root of the name index.
    Name = 4,
    /// Root of the path summary index.
    PathSummary = 5,
    /// Root of the text value index.
    TextValue = 6,
    /// Root of the attribute value index.
    AttributeValue = 7,
    /// Root of the structural id (DeweyID) index.
    DeweyId = 8,
}

impl PageKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PageKind::Uber),
            1 => Some(PageKind::RevisionRoot),
            2 => Some(PageKind::Indirect),
            3 => Some(PageKind::Record),
            4 => Some(PageKind::Name),
            5 => Some(PageKind::PathSummary),
            6 => Some(PageKind::TextValue),
            7 => Some(PageKind::AttributeValue),
            8 => Some(PageKind::DeweyId),
            _ => None,
        }
    }

    /// Returns true for the auxiliary index root kinds.
    pub fn is_index_root(&self) -> bool {
        matches!(
            self,
            PageKind::Name
                | PageKind::PathSummary
                | PageKind::TextValue
                | PageKind::AttributeValue
                | PageKind::DeweyId
        )
    }
}

/// Header prefixed to every serialized page.
///
/// Layout (2 bytes):
/// - version: u8 - Page format version
/// - kind: u8 - Kind of the page
///
/// The header frames the page body; decoding never dispatches on it. The
/// caller supplies the expected kind and the header is checked against it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageHeader {
    pub version: u8,
    pub kind: u8,
}

impl PageHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 2;

    /// Creates a header for the current format version.
    pub fn new(kind: PageKind) -> Self {
        Self {
            version: CURRENT_VERSION,
            kind: kind as u8,
        }
    }

    /// Returns the page kind.
    pub fn page_kind(&self) -> Option<PageKind> {
        PageKind::from_u8(self.kind)
    }

    /// Reads a header from the front of `data`.
    pub fn read(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < Self::SIZE {
            return Err(DecodeError::UnexpectedEof {
                needed: Self::SIZE,
                remaining: data.len(),
            });
        }
        let header = Self {
            version: data[0],
            kind: data[1],
        };
        if header.version != CURRENT_VERSION {
            return Err(DecodeError::Version(header.version));
        }
        Ok(header)
    }

    /// Writes the header to the front of `dest`.
    pub fn write(&self, dest: &mut [u8]) {
        assert!(dest.len() >= Self::SIZE);
        dest[0] = self.version;
        dest[1] = self.kind;
    }
}
