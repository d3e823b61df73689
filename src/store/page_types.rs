//! Specialized page types.
//!
//! Every page kind carries a reference delegate (possibly empty) followed by
//! its own trailing fields, so all kinds share one serialized envelope.

use std::collections::{BTreeMap, BTreeSet};

use crate::data::{DecodeError, PageReader, PageWriter};

use super::{PageKind, PageLayout, PageReference, References, ResourceGeometry};

/// The tries a revision exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexType {
    /// Primary record space.
    Record,
    /// Name index.
    Name,
    /// Path summary index.
    PathSummary,
    /// Text value index.
    TextValue,
    /// Attribute value index.
    AttributeValue,
    /// Structural id (DeweyID) index.
    DeweyId,
}

impl IndexType {
    /// All index types, in revision-root slot order.
    pub const ALL: [IndexType; 6] = [
        IndexType::Record,
        IndexType::Name,
        IndexType::PathSummary,
        IndexType::TextValue,
        IndexType::AttributeValue,
        IndexType::DeweyId,
    ];

    /// Slot of this index in the revision root page.
    pub const fn slot(&self) -> usize {
        match self {
            IndexType::Record => 0,
            IndexType::Name => 1,
            IndexType::PathSummary => 2,
            IndexType::TextValue => 3,
            IndexType::AttributeValue => 4,
            IndexType::DeweyId => 5,
        }
    }

    /// Kind of the index root page between the revision root and the trie.
    ///
    /// The primary record trie hangs directly off the revision root.
    pub const fn root_kind(&self) -> Option<PageKind> {
        match self {
            IndexType::Record => None,
            IndexType::Name => Some(PageKind::Name),
            IndexType::PathSummary => Some(PageKind::PathSummary),
            IndexType::TextValue => Some(PageKind::TextValue),
            IndexType::AttributeValue => Some(PageKind::AttributeValue),
            IndexType::DeweyId => Some(PageKind::DeweyId),
        }
    }
}

// ============================================================================
// IndirectPage - Inner trie node
// ============================================================================

/// Inner trie page: references only.
#[derive(Clone, Debug, PartialEq)]
pub struct IndirectPage {
    references: References,
}

impl IndirectPage {
    /// Creates an empty indirect page.
    pub fn new(layout: &PageLayout) -> Self {
        Self {
            references: References::new(layout.indirect_fanout, layout.direct_capacity),
        }
    }

    pub fn references(&self) -> &References {
        &self.references
    }

    pub fn references_mut(&mut self) -> &mut References {
        &mut self.references
    }

    pub(crate) fn encode(&self, w: &mut PageWriter) {
        self.references.encode(w);
    }

    pub(crate) fn decode(r: &mut PageReader<'_>, layout: &PageLayout) -> Result<Self, DecodeError> {
        let references = References::decode(r, layout.indirect_fanout, layout.direct_capacity)?;
        Ok(Self { references })
    }
}

// ============================================================================
// RecordPage - Trie leaf
// ============================================================================

/// Trie leaf mapping record keys to record bytes.
///
/// Layout after the (empty) delegate:
/// - page_key: u64
/// - record count: u32, then per record key: u64, value: u32-prefixed bytes
/// - deleted count: u32, then per tombstone key: u64
#[derive(Clone, Debug, PartialEq)]
pub struct RecordPage {
    references: References,
    page_key: u64,
    leaf_bits: u8,
    records: BTreeMap<u64, Vec<u8>>,
    deleted: BTreeSet<u64>,
}

impl RecordPage {
    /// Creates an empty leaf for `page_key`.
    pub fn new(page_key: u64, layout: &PageLayout) -> Self {
        Self {
            references: References::new(0, layout.direct_capacity),
            page_key,
            leaf_bits: layout.record_page_bits,
            records: BTreeMap::new(),
            deleted: BTreeSet::new(),
        }
    }

    /// Leaf page key (record key >> leaf bits).
    pub fn page_key(&self) -> u64 {
        self.page_key
    }

    /// Returns true if `key` belongs to this leaf.
    pub fn covers(&self, key: u64) -> bool {
        key.checked_shr(self.leaf_bits as u32).unwrap_or(0) == self.page_key
    }

    /// Record bytes for `key`.
    pub fn get(&self, key: u64) -> Option<&[u8]> {
        self.records.get(&key).map(|v| v.as_slice())
    }

    /// Inserts or replaces a record, returning the previous value.
    ///
    /// `key` must belong to this leaf.
    pub fn insert(&mut self, key: u64, value: Vec<u8>) -> Option<Vec<u8>> {
        debug_assert!(self.covers(key), "key {key} outside record page {}", self.page_key);
        self.deleted.remove(&key);
        self.records.insert(key, value)
    }

    /// Removes a record and remembers it as deleted in this leaf.
    pub fn remove(&mut self, key: u64) -> Option<Vec<u8>> {
        let old = self.records.remove(&key);
        if old.is_some() {
            self.deleted.insert(key);
        }
        old
    }

    /// Returns true if `key` was deleted within this leaf.
    pub fn is_deleted(&self, key: u64) -> bool {
        self.deleted.contains(&key)
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Live records in key order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[u8])> {
        self.records.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Tombstoned keys in key order.
    pub fn deleted_keys(&self) -> impl Iterator<Item = u64> + '_ {
        self.deleted.iter().copied()
    }

    pub fn references(&self) -> &References {
        &self.references
    }

    pub fn references_mut(&mut self) -> &mut References {
        &mut self.references
    }

    pub(crate) fn encode(&self, w: &mut PageWriter) {
        self.references.encode(w);
        w.put_u64(self.page_key);
        w.put_u32(self.records.len() as u32);
        for (key, value) in &self.records {
            w.put_u64(*key);
            w.put_bytes(value);
        }
        w.put_u32(self.deleted.len() as u32);
        for key in &self.deleted {
            w.put_u64(*key);
        }
    }

    pub(crate) fn decode(r: &mut PageReader<'_>, layout: &PageLayout) -> Result<Self, DecodeError> {
        let references = References::decode(r, 0, layout.direct_capacity)?;
        let mut page = Self {
            references,
            page_key: r.get_u64()?,
            leaf_bits: layout.record_page_bits,
            records: BTreeMap::new(),
            deleted: BTreeSet::new(),
        };

        let count = r.get_u32()?;
        for _ in 0..count {
            let key = page.checked_key(r.get_u64()?)?;
            let value = r.get_bytes()?.to_vec();
            if page.records.insert(key, value).is_some() {
                return Err(DecodeError::Malformed(format!("duplicate record key {key}")));
            }
        }

        let count = r.get_u32()?;
        for _ in 0..count {
            let key = page.checked_key(r.get_u64()?)?;
            if page.records.contains_key(&key) {
                return Err(DecodeError::Malformed(format!("tombstoned key {key} is live")));
            }
            page.deleted.insert(key);
        }

        Ok(page)
    }

    fn checked_key(&self, key: u64) -> Result<u64, DecodeError> {
        if self.covers(key) {
            Ok(key)
        } else {
            Err(DecodeError::Malformed(format!(
                "key {key} outside record page {}",
                self.page_key
            )))
        }
    }
}

// ============================================================================
// IndexRootPage - Root of an auxiliary index
// ============================================================================

/// Root page of an auxiliary index (name, path summary, text value,
/// attribute value, DeweyID).
///
/// Layout after the delegate:
/// - max_node_key: u64
/// - trie_depth: u8 (0 until the index trie is created)
#[derive(Clone, Debug, PartialEq)]
pub struct IndexRootPage {
    kind: PageKind,
    references: References,
    max_node_key: u64,
    trie_depth: u8,
}

impl IndexRootPage {
    /// Slot of the index trie reference.
    pub const TRIE_SLOT: usize = 0;

    /// Creates an index root without a trie.
    ///
    /// `kind` must be one of the auxiliary index kinds.
    pub(crate) fn new(kind: PageKind) -> Self {
        debug_assert!(kind.is_index_root());
        Self {
            kind,
            references: References::new(1, 1),
            max_node_key: 0,
            trie_depth: 0,
        }
    }

    pub fn kind(&self) -> PageKind {
        self.kind
    }

    /// Reference to the top indirect page of the index trie.
    pub fn trie_reference(&self) -> Option<&PageReference> {
        self.references.get(Self::TRIE_SLOT)
    }

    /// Highest key issued in this index.
    pub fn max_node_key(&self) -> u64 {
        self.max_node_key
    }

    pub fn set_max_node_key(&mut self, key: u64) {
        self.max_node_key = key;
    }

    /// Number of indirect levels of the index trie (0 if not created yet).
    pub fn trie_depth(&self) -> u8 {
        self.trie_depth
    }

    pub fn set_trie_depth(&mut self, depth: u8) {
        self.trie_depth = depth;
    }

    pub fn references(&self) -> &References {
        &self.references
    }

    pub fn references_mut(&mut self) -> &mut References {
        &mut self.references
    }

    pub(crate) fn encode(&self, w: &mut PageWriter) {
        self.references.encode(w);
        w.put_u64(self.max_node_key);
        w.put_u8(self.trie_depth);
    }

    pub(crate) fn decode(r: &mut PageReader<'_>, kind: PageKind) -> Result<Self, DecodeError> {
        let references = References::decode(r, 1, 1)?;
        let max_node_key = r.get_u64()?;
        let trie_depth = r.get_u8()?;
        Ok(Self {
            kind,
            references,
            max_node_key,
            trie_depth,
        })
    }
}

// ============================================================================
// RevisionRootPage - Per-revision anchor
// ============================================================================

/// Anchor of one revision: the primary record trie plus one reference per
/// auxiliary index root.
///
/// Layout after the delegate:
/// - revision: u32
/// - timestamp_ms: u64 (milliseconds since the Unix epoch)
/// - max_node_key: u64
#[derive(Clone, Debug, PartialEq)]
pub struct RevisionRootPage {
    references: References,
    revision: u32,
    timestamp_ms: u64,
    max_node_key: u64,
}

impl RevisionRootPage {
    /// Creates an empty revision root.
    pub fn new(revision: u32, layout: &PageLayout) -> Self {
        Self {
            references: References::new(IndexType::ALL.len(), layout.direct_capacity),
            revision,
            timestamp_ms: 0,
            max_node_key: 0,
        }
    }

    /// Reference stored for `index`: the record trie for
    /// [`IndexType::Record`], the index root page otherwise.
    pub fn index_reference(&self, index: IndexType) -> Option<&PageReference> {
        self.references.get(index.slot())
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn set_revision(&mut self, revision: u32) {
        self.revision = revision;
    }

    /// Commit time in milliseconds since the Unix epoch.
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn set_timestamp_ms(&mut self, timestamp_ms: u64) {
        self.timestamp_ms = timestamp_ms;
    }

    /// Highest primary record key issued.
    pub fn max_node_key(&self) -> u64 {
        self.max_node_key
    }

    pub fn set_max_node_key(&mut self, key: u64) {
        self.max_node_key = key;
    }

    pub fn references(&self) -> &References {
        &self.references
    }

    pub fn references_mut(&mut self) -> &mut References {
        &mut self.references
    }

    pub(crate) fn encode(&self, w: &mut PageWriter) {
        self.references.encode(w);
        w.put_u32(self.revision);
        w.put_u64(self.timestamp_ms);
        w.put_u64(self.max_node_key);
    }

    pub(crate) fn decode(r: &mut PageReader<'_>, layout: &PageLayout) -> Result<Self, DecodeError> {
        let references = References::decode(r, IndexType::ALL.len(), layout.direct_capacity)?;
        Ok(Self {
            references,
            revision: r.get_u32()?,
            timestamp_ms: r.get_u64()?,
            max_node_key: r.get_u64()?,
        })
    }
}

// ============================================================================
// UberPage - Resource anchor
// ============================================================================

/// Resource anchor: the trie of revision roots.
///
/// Layout after the delegate:
/// - revision_count: u32
/// - max_node_key: u64 (highest primary key over all revisions)
/// - geometry: key_bits u8, record_page_bits u8, level_bits u8, direct_capacity u8
#[derive(Clone, Debug, PartialEq)]
pub struct UberPage {
    references: References,
    revision_count: u32,
    max_node_key: u64,
    geometry: ResourceGeometry,
}

impl UberPage {
    /// Slot of the revision trie reference.
    pub const TRIE_SLOT: usize = 0;

    /// Creates an anchor with no revisions.
    pub fn new(geometry: ResourceGeometry) -> Self {
        Self {
            references: References::new(1, 1),
            revision_count: 0,
            max_node_key: 0,
            geometry,
        }
    }

    /// Reference to the top indirect page of the revision trie.
    pub fn trie_reference(&self) -> Option<&PageReference> {
        self.references.get(Self::TRIE_SLOT)
    }

    /// Number of committed revisions (including the bootstrap revision 0).
    pub fn revision_count(&self) -> u32 {
        self.revision_count
    }

    pub fn set_revision_count(&mut self, count: u32) {
        self.revision_count = count;
    }

    /// Most recent revision number.
    pub fn latest_revision(&self) -> u32 {
        self.revision_count.saturating_sub(1)
    }

    pub fn max_node_key(&self) -> u64 {
        self.max_node_key
    }

    pub fn set_max_node_key(&mut self, key: u64) {
        self.max_node_key = key;
    }

    /// Geometry fixed at resource creation.
    pub fn geometry(&self) -> ResourceGeometry {
        self.geometry
    }

    pub fn references(&self) -> &References {
        &self.references
    }

    pub fn references_mut(&mut self) -> &mut References {
        &mut self.references
    }

    pub(crate) fn encode(&self, w: &mut PageWriter) {
        self.references.encode(w);
        w.put_u32(self.revision_count);
        w.put_u64(self.max_node_key);
        w.put_u8(self.geometry.key_bits);
        w.put_u8(self.geometry.record_page_bits);
        w.put_u8(self.geometry.level_bits);
        w.put_u8(self.geometry.direct_capacity);
    }

    pub(crate) fn decode(r: &mut PageReader<'_>) -> Result<Self, DecodeError> {
        let references = References::decode(r, 1, 1)?;
        let revision_count = r.get_u32()?;
        let max_node_key = r.get_u64()?;
        let geometry = ResourceGeometry {
            key_bits: r.get_u8()?,
            record_page_bits: r.get_u8()?,
            level_bits: r.get_u8()?,
            direct_capacity: r.get_u8()?,
        };
        Ok(Self {
            references,
            revision_count,
            max_node_key,
            geometry,
        })
    }
}
