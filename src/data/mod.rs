//! Core data structures for trie routing and page encoding.

mod bitmap;
mod codec;
mod hash;
mod key_path;

#[cfg(test)]
mod tests;

pub use bitmap::Bitmap;
pub use codec::{DecodeError, PageReader, PageWriter};
pub use hash::{keccak256, PageHash, HASH_SIZE};
pub use key_path::{GeometryError, KeyPath, TrieGeometry, MAX_DEPTH, MAX_LEVEL_BITS};
