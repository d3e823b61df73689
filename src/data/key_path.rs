//! Trie geometry and key paths.
//!
//! A key is routed through a fixed number of indirect levels. The low
//! `leaf_bits` of a key select the slot inside a leaf page; the remaining
//! high bits (the *page key*) are consumed `level_bits` at a time, most
//! significant chunk first, to pick one reference per level.

use thiserror::Error;

/// Deepest trie any geometry may produce.
pub const MAX_DEPTH: usize = 64;

/// Largest per-level fan-out exponent (slot offsets are encoded as `u16`).
pub const MAX_LEVEL_BITS: u8 = 16;

/// Invalid geometry parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("key bits must be in 1..=64, got {0}")]
    KeyBits(u8),
    #[error("level bits must be in 1..={MAX_LEVEL_BITS}, got {0}")]
    LevelBits(u8),
    #[error("leaf bits ({leaf_bits}) must be smaller than key bits ({key_bits})")]
    LeafBits { leaf_bits: u8, key_bits: u8 },
}

/// Shape of one indirect-page trie.
///
/// The shape is fixed when a resource is created; the depth never changes
/// afterwards, so the smallest and the largest key travel the same number of
/// levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrieGeometry {
    key_bits: u8,
    leaf_bits: u8,
    level_bits: u8,
    depth: u8,
}

impl TrieGeometry {
    /// Creates a geometry covering `key_bits` bits of key space.
    pub fn new(key_bits: u8, leaf_bits: u8, level_bits: u8) -> Result<Self, GeometryError> {
        if key_bits == 0 || key_bits > 64 {
            return Err(GeometryError::KeyBits(key_bits));
        }
        if level_bits == 0 || level_bits > MAX_LEVEL_BITS {
            return Err(GeometryError::LevelBits(level_bits));
        }
        if leaf_bits >= key_bits {
            return Err(GeometryError::LeafBits { leaf_bits, key_bits });
        }

        let routed = (key_bits - leaf_bits) as usize;
        let depth = routed.div_ceil(level_bits as usize);

        Ok(Self {
            key_bits,
            leaf_bits,
            level_bits,
            depth: depth as u8,
        })
    }

    /// Number of key bits covered.
    #[inline]
    pub const fn key_bits(&self) -> u8 {
        self.key_bits
    }

    /// Number of low key bits resolved inside a leaf.
    #[inline]
    pub const fn leaf_bits(&self) -> u8 {
        self.leaf_bits
    }

    /// Number of page-key bits consumed per indirect level.
    #[inline]
    pub const fn level_bits(&self) -> u8 {
        self.level_bits
    }

    /// Number of indirect levels between the trie root and a leaf.
    #[inline]
    pub const fn depth(&self) -> usize {
        self.depth as usize
    }

    /// References per indirect page.
    #[inline]
    pub const fn fanout(&self) -> usize {
        1 << self.level_bits
    }

    /// Keys per leaf page.
    #[inline]
    pub const fn leaf_capacity(&self) -> u64 {
        1 << self.leaf_bits
    }

    /// Largest addressable key.
    #[inline]
    pub const fn max_key(&self) -> u64 {
        if self.key_bits == 64 {
            u64::MAX
        } else {
            (1u64 << self.key_bits) - 1
        }
    }

    /// Returns true if `key` lies inside the key space.
    #[inline]
    pub const fn contains(&self, key: u64) -> bool {
        key <= self.max_key()
    }

    /// Key of the leaf page holding `key`.
    #[inline]
    pub const fn page_key(&self, key: u64) -> u64 {
        key >> self.leaf_bits
    }

    /// Position of `key` inside its leaf page.
    #[inline]
    pub const fn leaf_offset(&self, key: u64) -> u64 {
        key & (self.leaf_capacity() - 1)
    }

    /// First key stored in the leaf page `page_key`.
    #[inline]
    pub const fn first_key(&self, page_key: u64) -> u64 {
        page_key << self.leaf_bits
    }

    /// Slot index used at `level` (0 = root) when routing `page_key`.
    #[inline]
    pub fn index_at(&self, page_key: u64, level: usize) -> usize {
        debug_assert!(level < self.depth());
        let shift = (self.depth() - 1 - level) * self.level_bits as usize;
        ((page_key >> shift) as usize) & (self.fanout() - 1)
    }

    /// Full routing path for the leaf page containing `key`.
    pub fn path(&self, key: u64) -> KeyPath {
        self.page_path(self.page_key(key))
    }

    /// Full routing path for `page_key`.
    pub fn page_path(&self, page_key: u64) -> KeyPath {
        let mut path = KeyPath {
            page_key,
            offsets: [0; MAX_DEPTH],
            len: self.depth,
        };
        for level in 0..self.depth() {
            path.offsets[level] = self.index_at(page_key, level) as u16;
        }
        path
    }
}

/// Slot offsets from the trie root down to a leaf.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KeyPath {
    page_key: u64,
    offsets: [u16; MAX_DEPTH],
    len: u8,
}

impl KeyPath {
    /// Leaf page key this path leads to.
    pub fn page_key(&self) -> u64 {
        self.page_key
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Returns true for a zero-depth path.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slot offset at `level`.
    ///
    /// # Panics
    /// Panics if level >= len.
    pub fn get(&self, level: usize) -> usize {
        assert!(level < self.len(), "level out of bounds");
        self.offsets[level] as usize
    }

    /// Offset taken at the last indirect level.
    pub fn last(&self) -> Option<usize> {
        self.len().checked_sub(1).map(|level| self.get(level))
    }

    /// Iterates over the offsets, root level first.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = usize> + '_ {
        self.offsets[..self.len()].iter().map(|&o| o as usize)
    }
}

impl std::fmt::Debug for KeyPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPath")
            .field("page_key", &self.page_key)
            .field("offsets", &&self.offsets[..self.len()])
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth() {
        let g = TrieGeometry::new(64, 7, 10).unwrap();
        assert_eq!(g.depth(), 6);
        assert_eq!(g.fanout(), 1024);
        assert_eq!(g.leaf_capacity(), 128);

        let g = TrieGeometry::new(32, 0, 8).unwrap();
        assert_eq!(g.depth(), 4);
    }

    #[test]
    fn test_invalid_geometry() {
        assert_eq!(TrieGeometry::new(0, 0, 4), Err(GeometryError::KeyBits(0)));
        assert_eq!(TrieGeometry::new(65, 0, 4), Err(GeometryError::KeyBits(65)));
        assert_eq!(TrieGeometry::new(64, 0, 17), Err(GeometryError::LevelBits(17)));
        assert!(matches!(
            TrieGeometry::new(16, 16, 4),
            Err(GeometryError::LeafBits { .. })
        ));
    }

    #[test]
    fn test_boundary_keys() {
        let g = TrieGeometry::new(64, 7, 10).unwrap();

        let zero = g.path(0);
        assert!(zero.iter().all(|o| o == 0));

        let max = g.path(u64::MAX);
        // 57 routed bits: the top level only sees 7 of them.
        assert_eq!(max.get(0), 127);
        for level in 1..max.len() {
            assert_eq!(max.get(level), 1023);
        }
        assert_eq!(g.leaf_offset(u64::MAX), 127);
    }

    #[test]
    fn test_path_reassembles_page_key() {
        let g = TrieGeometry::new(40, 4, 6).unwrap();
        let key = 0x12_3456_789A;
        let path = g.path(key);

        let mut rebuilt = 0u64;
        for offset in path.iter() {
            rebuilt = (rebuilt << g.level_bits()) | offset as u64;
        }
        assert_eq!(rebuilt, g.page_key(key));
        assert_eq!(g.first_key(path.page_key()) + g.leaf_offset(key), key);
    }

    #[test]
    fn test_contains() {
        let g = TrieGeometry::new(16, 2, 4).unwrap();
        assert!(g.contains(0xFFFF));
        assert!(!g.contains(0x1_0000));
        assert_eq!(g.max_key(), 0xFFFF);
    }
}
