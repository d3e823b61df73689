#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use strata_db::store::{IndexType, ResourceConfig, ResourceGeometry, ResourceManager};

#[derive(Arbitrary, Debug)]
enum TrxOp {
    Set { key: u16, value: Vec<u8> },
    Remove { key: u16 },
    Create { value: Vec<u8> },
    Commit,
    Abort,
}

fuzz_target!(|ops: Vec<TrxOp>| {
    // Limit operations
    if ops.len() > 300 {
        return;
    }

    // Small pages and fan-out so a few keys span several leaves
    let geometry = ResourceGeometry {
        key_bits: 16,
        record_page_bits: 2,
        level_bits: 3,
        direct_capacity: 2,
    };
    let config = ResourceConfig {
        geometry,
        ..ResourceConfig::default()
    };
    let resource = ResourceManager::in_memory(config).unwrap();

    let mut committed: Vec<BTreeMap<u64, Vec<u8>>> = vec![BTreeMap::new()];
    let mut model = BTreeMap::new();
    let mut wtx = Some(resource.begin_write_trx().unwrap());

    for op in ops {
        let trx = wtx.get_or_insert_with(|| resource.begin_write_trx().unwrap());
        match op {
            TrxOp::Set { key, value } => {
                let key = key as u64;
                let previous = trx.set_record(key, value.clone(), IndexType::Record).unwrap();
                assert_eq!(previous, model.insert(key, value));
            }
            TrxOp::Remove { key } => {
                let key = key as u64;
                let previous = trx.remove_record(key, IndexType::Record).unwrap();
                assert_eq!(previous, model.remove(&key));
            }
            TrxOp::Create { value } => {
                let expected = trx.max_node_key(IndexType::Record).unwrap() + 1;
                if expected > u16::MAX as u64 {
                    continue;
                }
                let key = trx.create_record(value.clone(), IndexType::Record).unwrap();
                assert_eq!(key, expected);
                model.insert(key, value);
            }
            TrxOp::Commit => {
                trx.commit().unwrap();
                committed.push(model.clone());
            }
            TrxOp::Abort => {
                if let Some(trx) = wtx.take() {
                    trx.abort();
                }
                model = committed.last().cloned().unwrap_or_default();
            }
        }
    }
    drop(wtx);

    for (revision, expected) in committed.iter().enumerate() {
        let rtx = resource.begin_read_trx_at(revision as u32).unwrap();
        for (key, value) in expected {
            assert_eq!(rtx.get_record(*key, IndexType::Record).unwrap().as_ref(), Some(value));
        }
    }
});
