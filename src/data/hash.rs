//! Page content hashing.

use tiny_keccak::{Hasher, Keccak};

/// Hash size (Keccak-256).
pub const HASH_SIZE: usize = 32;

/// Content hash stored next to a page's durable address.
pub type PageHash = [u8; HASH_SIZE];

/// Computes the Keccak-256 hash of `data`.
pub fn keccak256(data: &[u8]) -> PageHash {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; HASH_SIZE];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}
