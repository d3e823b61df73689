//! # strata_db
//!
//! A versioned, copy-on-write page store. Every commit produces a new
//! immutable revision; any committed revision can be read at any time.
//!
//! ## Architecture
//!
//! 1. **Revisions** - an UberPage anchors a trie of revision root pages,
//!    one per committed revision.
//! 2. **Index tries** - each revision root references the record trie and
//!    up to five auxiliary index tries (names, path summary, text values,
//!    attribute values, structural ids).
//! 3. **Transactions** - any number of read transactions run alongside at
//!    most one write transaction per resource.
//!
//! ## Modules
//!
//! - `data` - Key routing geometry, bitmaps, hashing and the page codec
//! - `store` - Pages, storage, intent log and transactions

pub mod data;
pub mod store;

/// Hash map keyed by integers on hot paths.
pub(crate) type FastHashMap<K, V> = hashbrown::HashMap<K, V, rustc_hash::FxBuildHasher>;
