//! Property-based tests for the page store.

#[cfg(test)]
mod proptest_tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use crate::data::{PageReader, PageWriter};
    use crate::store::{
        IndexType, Page, PageKind, PageLayout, PageReference, RecordPage, References,
        ResourceConfig, ResourceManager, StorageKey,
    };

    #[derive(Clone, Debug)]
    enum Op {
        Set(u64, Vec<u8>),
        Remove(u64),
        Commit,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (0u64..600, proptest::collection::vec(any::<u8>(), 0..16))
                .prop_map(|(k, v)| Op::Set(k, v)),
            2 => (0u64..600).prop_map(Op::Remove),
            1 => Just(Op::Commit),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Every committed revision keeps answering with the state it had
        /// when it was committed.
        #[test]
        fn revisions_match_model(ops in proptest::collection::vec(op(), 1..80)) {
            let resource = ResourceManager::in_memory(ResourceConfig::default()).unwrap();
            let mut committed: Vec<BTreeMap<u64, Vec<u8>>> = vec![BTreeMap::new()];
            let mut model = BTreeMap::new();

            let mut wtx = resource.begin_write_trx().unwrap();
            for op in ops {
                match op {
                    Op::Set(key, value) => {
                        let previous = wtx.set_record(key, value.clone(), IndexType::Record).unwrap();
                        prop_assert_eq!(previous, model.insert(key, value));
                    }
                    Op::Remove(key) => {
                        let previous = wtx.remove_record(key, IndexType::Record).unwrap();
                        prop_assert_eq!(previous, model.remove(&key));
                    }
                    Op::Commit => {
                        let revision = wtx.commit().unwrap();
                        prop_assert_eq!(revision as usize, committed.len());
                        committed.push(model.clone());
                    }
                }
            }
            drop(wtx);

            for (revision, expected) in committed.iter().enumerate() {
                let rtx = resource.begin_read_trx_at(revision as u32).unwrap();
                for key in 0..600 {
                    let stored = rtx.get_record(key, IndexType::Record).unwrap();
                    prop_assert_eq!(stored.as_ref(), expected.get(&key));
                }
            }
        }

        #[test]
        fn delegate_matches_naive(slots in proptest::collection::btree_set(0usize..1024, 0..40)) {
            let mut refs = References::new(1024, 4);
            for &slot in &slots {
                refs.set_or_create_reference(
                    slot,
                    PageReference::from_storage(StorageKey::new(slot as u64 + 1), None),
                ).unwrap();
            }
            prop_assert_eq!(refs.count(), slots.len());
            prop_assert_eq!(refs.is_bitmap(), slots.len() > 4);
            for slot in [0usize, 1, 511, 512, 1023] {
                let found = refs.get(slot).map(|r| r.storage_key().raw());
                let expected = slots.contains(&slot).then_some(slot as u64 + 1);
                prop_assert_eq!(found, expected);
            }
            let listed: Vec<usize> = refs.iter().map(|(slot, _)| slot).collect();
            let expected: Vec<usize> = slots.iter().copied().collect();
            prop_assert_eq!(listed, expected);

            let mut w = PageWriter::new();
            refs.encode(&mut w);
            let bytes = w.into_bytes();
            let mut r = PageReader::new(&bytes);
            let decoded = References::decode(&mut r, 1024, 4).unwrap();
            prop_assert!(r.finish().is_ok());
            prop_assert_eq!(decoded, refs);
        }

        #[test]
        fn record_page_survives_serialization(
            records in proptest::collection::btree_map(0u64..128, proptest::collection::vec(any::<u8>(), 0..24), 0..32),
            removed in proptest::collection::btree_set(0u64..128, 0..8),
        ) {
            let layout = PageLayout::default();
            let mut page = RecordPage::new(3, &layout);
            for (key, value) in &records {
                page.insert(384 + key, value.clone());
            }
            for key in &removed {
                page.remove(384 + key);
            }
            let page = Page::Record(page);
            let decoded = Page::deserialize(PageKind::Record, &page.serialize(), &layout).unwrap();
            prop_assert_eq!(decoded, page);
        }

        #[test]
        fn page_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..96)) {
            let layout = PageLayout::default();
            for kind in [PageKind::Uber, PageKind::RevisionRoot, PageKind::Indirect, PageKind::Record, PageKind::Name] {
                let _ = Page::deserialize(kind, &bytes, &layout);
            }
        }
    }
}
