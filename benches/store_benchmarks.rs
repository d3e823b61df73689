//! Store module benchmarks for strata_db
//!
//! Run with: cargo bench --bench store_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;

use strata_db::store::{
    CommitOptions, IndexType, Page, PageKind, PageLayout, RecordPage, ResourceConfig,
    ResourceManager,
};

/// Generate a random record value of `len` bytes
fn random_value(len: usize) -> Vec<u8> {
    let mut value = vec![0u8; len];
    rand::thread_rng().fill(&mut value[..]);
    value
}

/// Resource holding `count` sequential records committed in one revision
fn populated(count: u64) -> ResourceManager {
    let resource = ResourceManager::in_memory(ResourceConfig::default()).unwrap();
    let mut wtx = resource.begin_write_trx().unwrap();
    for key in 1..=count {
        wtx.set_record(key, random_value(32), IndexType::Record).unwrap();
    }
    wtx.commit().unwrap();
    drop(wtx);
    resource
}

// ============================================================================
// Write Benchmarks
// ============================================================================

fn bench_set_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("WriteTrx_SetRecord");

    for count in [100u64, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*count));
        group.bench_with_input(BenchmarkId::new("sequential", count), count, |b, &count| {
            let resource = ResourceManager::in_memory(ResourceConfig::default()).unwrap();
            b.iter(|| {
                let mut wtx = resource.begin_write_trx().unwrap();
                for key in 1..=count {
                    wtx.set_record(key, vec![0xAB; 32], IndexType::Record).unwrap();
                }
                wtx.abort();
            })
        });

        group.bench_with_input(BenchmarkId::new("random", count), count, |b, &count| {
            let resource = ResourceManager::in_memory(ResourceConfig::default()).unwrap();
            let mut rng = rand::thread_rng();
            let keys: Vec<u64> = (0..count).map(|_| rng.gen_range(0..1 << 40)).collect();
            b.iter(|| {
                let mut wtx = resource.begin_write_trx().unwrap();
                for &key in &keys {
                    wtx.set_record(key, vec![0xCD; 32], IndexType::Record).unwrap();
                }
                wtx.abort();
            })
        });
    }

    group.finish();
}

fn bench_commit_options(c: &mut Criterion) {
    let mut group = c.benchmark_group("WriteTrx_Commit");

    for (name, options) in [
        ("danger_no_flush", CommitOptions::DangerNoFlush),
        ("flush_data_only", CommitOptions::FlushDataOnly),
        ("flush_data_and_root", CommitOptions::FlushDataAndRoot),
    ] {
        group.bench_function(name, |b| {
            let resource = ResourceManager::in_memory(ResourceConfig::default()).unwrap();
            let mut wtx = resource.begin_write_trx().unwrap();
            let mut key = 0u64;
            b.iter(|| {
                for _ in 0..100 {
                    key += 1;
                    wtx.set_record(key, vec![0x11; 32], IndexType::Record).unwrap();
                }
                black_box(wtx.commit_with(options).unwrap())
            })
        });
    }

    group.finish();
}

// ============================================================================
// Read Benchmarks
// ============================================================================

fn bench_get_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("ReadTrx_GetRecord");
    let resource = populated(10_000);

    group.bench_function("warm_cache", |b| {
        let rtx = resource.begin_read_trx().unwrap();
        let mut rng = rand::thread_rng();
        b.iter(|| {
            let key = rng.gen_range(1..=10_000);
            black_box(rtx.get_record(key, IndexType::Record).unwrap())
        })
    });

    group.bench_function("no_cache", |b| {
        let rtx = resource.begin_read_trx().unwrap();
        rtx.close_caches();
        let mut rng = rand::thread_rng();
        b.iter(|| {
            let key = rng.gen_range(1..=10_000);
            black_box(rtx.get_record(key, IndexType::Record).unwrap())
        })
    });

    group.bench_function("missing", |b| {
        let rtx = resource.begin_read_trx().unwrap();
        b.iter(|| black_box(rtx.get_record(1 << 50, IndexType::Record).unwrap()))
    });

    group.finish();
}

fn bench_names(c: &mut Criterion) {
    let mut group = c.benchmark_group("Names");

    group.bench_function("create_name", |b| {
        let resource = ResourceManager::in_memory(ResourceConfig::default()).unwrap();
        let mut wtx = resource.begin_write_trx().unwrap();
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            black_box(wtx.create_name(&format!("element-{}", i % 512)).unwrap())
        })
    });

    group.finish();
}

// ============================================================================
// Serialization Benchmarks
// ============================================================================

fn bench_record_page_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("RecordPage_Codec");
    let layout = PageLayout::default();

    let mut page = RecordPage::new(0, &layout);
    for key in 0..128 {
        page.insert(key, random_value(48));
    }
    let page = Page::Record(page);
    let bytes = page.serialize();
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    group.bench_function("serialize", |b| b.iter(|| black_box(page.serialize())));
    group.bench_function("deserialize", |b| {
        b.iter(|| Page::deserialize(PageKind::Record, black_box(&bytes), &layout).unwrap())
    });

    group.finish();
}

criterion_group!(
    store_benches,
    bench_set_record,
    bench_commit_options,
    bench_get_record,
    bench_names,
    bench_record_page_codec,
);

criterion_main!(store_benches);
