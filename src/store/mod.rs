//! Versioned page store.
//!
//! A resource is an append-only sequence of immutable pages anchored by an
//! UberPage. Every commit writes a new revision: the pages changed by the
//! write transaction are copied, flushed children first, and the new UberPage
//! is published by rewriting the beacon in the file header. Readers pin the
//! UberPage generation they started on and are never blocked by the writer.

mod address;
mod cache;
mod config;
mod container;
mod delegate;
mod intent_log;
mod metrics;
mod names;
mod page;
mod page_header;
mod page_types;
mod read_trx;
mod reference;
mod resource;
mod storage;
mod trie;
mod write_trx;

#[cfg(test)]
mod tests;

pub use address::{LogKey, StorageKey};
pub use cache::PageCache;
pub use config::{CommitOptions, ResourceConfig, ResourceGeometry};
pub use container::PageContainer;
pub use delegate::{BitmapReferences, DirectReferences, References, BITMAP_TAG, DIRECT_TAG};
pub use intent_log::TransactionIntentLog;
pub use metrics::{DbMetrics, MetricsSnapshot};
pub use names::{decode_name, encode_name, name_key, NAME_PROBE_LIMIT};
pub use page::{Page, PageLayout};
pub use page_header::{PageHeader, PageKind, CURRENT_VERSION};
pub use page_types::{IndexRootPage, IndexType, IndirectPage, RecordPage, RevisionRootPage, UberPage};
pub use read_trx::PageReadTrx;
pub use reference::{PageReference, PageSource, Resolved};
pub use resource::{DbError, ResourceManager, Result, UberSnapshot};
pub use storage::{MmapStorage, Storage, HEADER_SIZE};
pub use write_trx::PageWriteTrx;

pub(crate) use trie::{TrieReader, TrieWriter};
