//! Name index records.
//!
//! Names live in the [`IndexType::Name`](super::IndexType::Name) trie. A
//! name's key is derived from the keccak hash of its bytes; collisions are
//! resolved by probing the following keys. Each record stores a reference
//! count followed by the raw name:
//!
//! ```text
//! [count u32][raw name bytes]
//! ```

use crate::data::{keccak256, DecodeError, TrieGeometry};

/// Keys probed before a name insert gives up.
pub const NAME_PROBE_LIMIT: u64 = 32;

/// Key probed on `attempt` for `name`.
pub fn name_key(name: &[u8], attempt: u64, geometry: &TrieGeometry) -> u64 {
    let hash = keccak256(name);
    let mut base = [0u8; 8];
    base.copy_from_slice(&hash[..8]);
    u64::from_le_bytes(base).wrapping_add(attempt) & geometry.max_key()
}

pub fn encode_name(count: u32, raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + raw.len());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(raw);
    out
}

/// Splits a name record into its reference count and raw name.
pub fn decode_name(record: &[u8]) -> Result<(u32, &[u8]), DecodeError> {
    if record.len() < 4 {
        return Err(DecodeError::UnexpectedEof {
            needed: 4,
            remaining: record.len(),
        });
    }
    let mut count = [0u8; 4];
    count.copy_from_slice(&record[..4]);
    Ok((u32::from_le_bytes(count), &record[4..]))
}

/// Outcome of probing the name index for one name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum NameSlot {
    /// The name is stored at `key` with `count` references.
    Found { key: u64, count: u32 },
    /// The name is absent; `key` is the first reusable slot, if any.
    Vacant { key: Option<u64> },
}

/// State of one probed key.
pub(crate) enum Probe {
    Occupied(Vec<u8>),
    Deleted,
    Empty,
}

/// Probes keys for `name` until it is found or an empty key ends the chain.
///
/// Deleted keys do not end the chain, since the name may have been placed
/// beyond them.
pub(crate) fn probe_name(
    name: &[u8],
    geometry: &TrieGeometry,
    mut lookup: impl FnMut(u64) -> super::Result<Probe>,
) -> super::Result<NameSlot> {
    let mut vacant = None;
    for attempt in 0..NAME_PROBE_LIMIT {
        let key = name_key(name, attempt, geometry);
        match lookup(key)? {
            Probe::Occupied(record) => {
                let (count, raw) = decode_name(&record)?;
                if raw == name {
                    return Ok(NameSlot::Found { key, count });
                }
            }
            Probe::Deleted => {
                vacant.get_or_insert(key);
            }
            Probe::Empty => {
                return Ok(NameSlot::Vacant {
                    key: Some(vacant.unwrap_or(key)),
                });
            }
        }
    }
    Ok(NameSlot::Vacant { key: vacant })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn geometry() -> TrieGeometry {
        TrieGeometry::new(64, 7, 10).unwrap()
    }

    #[test]
    fn test_encode_decode() {
        let record = encode_name(3, b"item");
        assert_eq!(decode_name(&record).unwrap(), (3, &b"item"[..]));
        assert!(decode_name(&[1, 2]).is_err());
    }

    #[test]
    fn test_name_key_is_stable() {
        let g = geometry();
        assert_eq!(name_key(b"a", 0, &g), name_key(b"a", 0, &g));
        assert_eq!(name_key(b"a", 1, &g), name_key(b"a", 0, &g).wrapping_add(1));
        assert_ne!(name_key(b"a", 0, &g), name_key(b"b", 0, &g));

        let narrow = TrieGeometry::new(12, 2, 5).unwrap();
        assert!(name_key(b"anything", 0, &narrow) <= narrow.max_key());
    }

    #[test]
    fn test_probe_skips_collisions_and_tombstones() {
        let g = geometry();
        let k0 = name_key(b"target", 0, &g);
        let mut records: HashMap<u64, Option<Vec<u8>>> = HashMap::new();
        records.insert(k0, Some(encode_name(1, b"other")));
        records.insert(k0.wrapping_add(1), None);
        records.insert(k0.wrapping_add(2), Some(encode_name(4, b"target")));

        let lookup = |key: u64| -> crate::store::Result<Probe> {
            Ok(match records.get(&key) {
                Some(Some(record)) => Probe::Occupied(record.clone()),
                Some(None) => Probe::Deleted,
                None => Probe::Empty,
            })
        };
        assert_eq!(
            probe_name(b"target", &g, lookup).unwrap(),
            NameSlot::Found {
                key: k0.wrapping_add(2),
                count: 4
            }
        );

        records.remove(&k0.wrapping_add(2));
        let lookup = |key: u64| -> crate::store::Result<Probe> {
            Ok(match records.get(&key) {
                Some(Some(record)) => Probe::Occupied(record.clone()),
                Some(None) => Probe::Deleted,
                None => Probe::Empty,
            })
        };
        assert_eq!(
            probe_name(b"target", &g, lookup).unwrap(),
            NameSlot::Vacant {
                key: Some(k0.wrapping_add(1))
            }
        );
    }
}
