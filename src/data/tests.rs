//! Property-based tests for data structures.

#[cfg(test)]
mod proptest_tests {
    use proptest::prelude::*;
    use crate::data::{Bitmap, PageReader, PageWriter, TrieGeometry};

    proptest! {
        #[test]
        fn key_path_reassembles_page_key(
            key in any::<u64>(),
            leaf_bits in 0u8..12,
            level_bits in 1u8..=16,
        ) {
            let g = TrieGeometry::new(64, leaf_bits, level_bits).unwrap();
            let path = g.path(key);
            prop_assert_eq!(path.len(), g.depth());

            let mut rebuilt = 0u128;
            for offset in path.iter() {
                prop_assert!(offset < g.fanout());
                rebuilt = (rebuilt << level_bits) | offset as u128;
            }
            prop_assert_eq!(rebuilt as u64, g.page_key(key));
        }

        #[test]
        fn keys_in_same_leaf_share_path(key in any::<u64>(), other in 0u64..128) {
            let g = TrieGeometry::new(64, 7, 10).unwrap();
            let sibling = g.first_key(g.page_key(key)) + other;
            prop_assert_eq!(g.path(key), g.path(sibling));
        }

        #[test]
        fn bitmap_rank_matches_naive(bits in proptest::collection::btree_set(0usize..1024, 0..64)) {
            let mut bm = Bitmap::new(1024);
            for &b in &bits {
                bm.set(b);
            }
            for probe in [0usize, 1, 63, 64, 65, 511, 512, 1023, 1024] {
                let naive = bits.iter().filter(|&&b| b < probe).count();
                prop_assert_eq!(bm.rank(probe), naive);
            }
            let ones: Vec<usize> = bm.iter_ones().collect();
            let expected: Vec<usize> = bits.iter().copied().collect();
            prop_assert_eq!(ones, expected);
        }

        #[test]
        fn codec_never_panics_on_garbage(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let mut r = PageReader::new(&bytes);
            while r.remaining() > 0 {
                if r.get_bytes().is_err() {
                    break;
                }
            }
        }

        #[test]
        fn codec_bytes_roundtrip(chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..32), 0..8)) {
            let mut w = PageWriter::new();
            for chunk in &chunks {
                w.put_bytes(chunk);
            }
            let bytes = w.into_bytes();
            let mut r = PageReader::new(&bytes);
            for chunk in &chunks {
                prop_assert_eq!(r.get_bytes().unwrap(), chunk.as_slice());
            }
            prop_assert!(r.finish().is_ok());
        }
    }
}
