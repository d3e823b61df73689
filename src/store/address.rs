//! Page addresses.
//!
//! A `StorageKey` locates a durable page frame; a `LogKey` locates an
//! uncommitted page in the write transaction's intent log.

use std::fmt;

/// Durable address of a page: the byte offset of its frame in storage.
///
/// Offset 0 holds the storage header and never a page, so it doubles as
/// the unset sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct StorageKey(u64);

impl StorageKey {
    /// The null address.
    pub const NULL: StorageKey = StorageKey(0);

    /// Size of the address in bytes.
    pub const SIZE: usize = std::mem::size_of::<u64>();

    /// Creates an address pointing at a frame offset.
    #[inline]
    pub const fn new(offset: u64) -> Self {
        StorageKey(offset)
    }

    /// Returns the raw offset.
    #[inline]
    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Returns true if this is the null address.
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "StorageKey(null)")
        } else {
            write!(f, "StorageKey(offset={})", self.0)
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "@{}", self.0)
        }
    }
}

impl From<u64> for StorageKey {
    fn from(value: u64) -> Self {
        StorageKey(value)
    }
}

impl From<StorageKey> for u64 {
    fn from(key: StorageKey) -> Self {
        key.0
    }
}

/// Slot of a page in the transaction intent log.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogKey(u32);

impl LogKey {
    /// The null slot.
    pub const NULL: LogKey = LogKey(u32::MAX);

    /// Creates a log key for an arena index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        LogKey(index)
    }

    /// Arena index.
    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }

    /// Returns true if this is the null slot.
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.0 == u32::MAX
    }
}

impl Default for LogKey {
    fn default() -> Self {
        LogKey::NULL
    }
}

impl fmt::Debug for LogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "LogKey(null)")
        } else {
            write!(f, "LogKey({})", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_storage_key() {
        let key = StorageKey::NULL;
        assert!(key.is_null());
        assert_eq!(key.raw(), 0);
        assert_eq!(StorageKey::default(), StorageKey::NULL);
    }

    #[test]
    fn test_storage_key() {
        let key = StorageKey::new(4096);
        assert!(!key.is_null());
        assert_eq!(u64::from(key), 4096);
        assert_eq!(key.to_string(), "@4096");
    }

    #[test]
    fn test_log_key() {
        assert!(LogKey::default().is_null());
        let key = LogKey::new(0);
        assert!(!key.is_null());
        assert_eq!(key.index(), 0);
    }
}
