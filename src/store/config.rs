//! Resource configuration.

use crate::data::{TrieGeometry, MAX_LEVEL_BITS};

use super::{DbError, PageLayout, Result};

/// Options for committing a write transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOptions {
    /// Flush data pages and the beacon (slower, fully durable).
    FlushDataAndRoot,
    /// Flush data pages asynchronously, leave the beacon to the OS.
    FlushDataOnly,
    /// Don't flush (fastest, not durable until the next flush).
    DangerNoFlush,
}

/// Trie shape fixed when a resource is created.
///
/// Persisted in the UberPage; a reopened resource always uses the stored
/// geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceGeometry {
    /// Width of record keys.
    pub key_bits: u8,
    /// Low key bits resolved inside a record page.
    pub record_page_bits: u8,
    /// Page-key bits consumed per indirect level.
    pub level_bits: u8,
    /// Direct delegate capacity before promotion to a bitmap.
    pub direct_capacity: u8,
}

impl Default for ResourceGeometry {
    fn default() -> Self {
        Self {
            key_bits: 64,
            record_page_bits: 7,
            level_bits: 10,
            direct_capacity: 4,
        }
    }
}

impl ResourceGeometry {
    /// Width of revision numbers.
    pub const REVISION_KEY_BITS: u8 = 32;

    /// Geometry of record tries (primary and auxiliary indexes).
    pub fn record_trie(&self) -> Result<TrieGeometry> {
        TrieGeometry::new(self.key_bits, self.record_page_bits, self.level_bits)
            .map_err(|e| DbError::InvalidConfig(e.to_string()))
    }

    /// Geometry of the revision trie: one revision root per leaf slot.
    pub fn revision_trie(&self) -> Result<TrieGeometry> {
        TrieGeometry::new(Self::REVISION_KEY_BITS, 0, self.level_bits)
            .map_err(|e| DbError::InvalidConfig(e.to_string()))
    }

    /// Page layout derived from this geometry.
    pub fn layout(&self) -> PageLayout {
        PageLayout {
            indirect_fanout: 1usize << self.level_bits.min(MAX_LEVEL_BITS),
            direct_capacity: self.direct_capacity as usize,
            record_page_bits: self.record_page_bits,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.direct_capacity == 0 {
            return Err(DbError::InvalidConfig("direct capacity must be at least 1".into()));
        }
        self.record_trie()?;
        self.revision_trie()?;
        Ok(())
    }
}

/// Configuration for opening or creating a resource.
#[derive(Clone, Debug)]
pub struct ResourceConfig {
    /// Trie shape, used only when the resource is created.
    pub geometry: ResourceGeometry,
    /// Pages cached per read transaction (0 = unbounded).
    pub cache_capacity: usize,
    /// Check page hashes when loading from storage.
    pub verify_hashes: bool,
    /// Flush policy used by `commit()`.
    pub commit_options: CommitOptions,
    /// Initial size of the storage map in bytes.
    pub initial_size: usize,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            geometry: ResourceGeometry::default(),
            cache_capacity: 4096,
            verify_hashes: true,
            commit_options: CommitOptions::FlushDataAndRoot,
            initial_size: 1 << 20,
        }
    }
}

impl ResourceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_bits(mut self, key_bits: u8) -> Self {
        self.geometry.key_bits = key_bits;
        self
    }

    pub fn with_record_page_bits(mut self, bits: u8) -> Self {
        self.geometry.record_page_bits = bits;
        self
    }

    pub fn with_level_bits(mut self, bits: u8) -> Self {
        self.geometry.level_bits = bits;
        self
    }

    pub fn with_direct_capacity(mut self, capacity: u8) -> Self {
        self.geometry.direct_capacity = capacity;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_verify_hashes(mut self, verify: bool) -> Self {
        self.verify_hashes = verify;
        self
    }

    pub fn with_commit_options(mut self, options: CommitOptions) -> Self {
        self.commit_options = options;
        self
    }

    pub fn with_initial_size(mut self, size: usize) -> Self {
        self.initial_size = size;
        self
    }

    /// Checks the configuration for invalid combinations.
    pub fn validate(&self) -> Result<()> {
        self.geometry.validate()?;
        if self.initial_size == 0 {
            return Err(DbError::InvalidConfig("initial size must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResourceConfig::default();
        config.validate().unwrap();

        let record = config.geometry.record_trie().unwrap();
        assert_eq!(record.depth(), 6);
        assert_eq!(record.leaf_capacity(), 128);

        let revision = config.geometry.revision_trie().unwrap();
        assert_eq!(revision.depth(), 4);
        assert_eq!(revision.leaf_capacity(), 1);

        assert_eq!(config.geometry.layout(), PageLayout::default());
    }

    #[test]
    fn test_builder() {
        let config = ResourceConfig::new()
            .with_key_bits(16)
            .with_record_page_bits(2)
            .with_level_bits(4)
            .with_direct_capacity(2)
            .with_cache_capacity(8)
            .with_verify_hashes(false)
            .with_commit_options(CommitOptions::DangerNoFlush);
        config.validate().unwrap();
        assert_eq!(config.geometry.record_trie().unwrap().depth(), 4);
        assert_eq!(config.geometry.layout().indirect_fanout, 16);
        assert!(!config.verify_hashes);
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(
            ResourceConfig::new().with_direct_capacity(0).validate(),
            Err(DbError::InvalidConfig(_))
        ));
        assert!(matches!(
            ResourceConfig::new().with_level_bits(0).validate(),
            Err(DbError::InvalidConfig(_))
        ));
        assert!(matches!(
            ResourceConfig::new().with_record_page_bits(64).validate(),
            Err(DbError::InvalidConfig(_))
        ));
        assert!(matches!(
            ResourceConfig::new().with_initial_size(0).validate(),
            Err(DbError::InvalidConfig(_))
        ));
    }
}
