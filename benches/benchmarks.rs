//! Performance benchmarks for DXI
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dxi::index::{parse_shard, IndexLoader, LazyIndex, ShardName};
use dxi::query::{normalize, QueryEngine, SearchOptions};
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const SECTIONS: [&str; 4] = ["all", "classes", "functions", "variables"];

/// One shard payload with `records` entries, each carrying a few references
fn shard_payload(bucket: usize, records: usize) -> String {
    let mut out = String::from("var searchData=\n[\n");
    for i in 0..records {
        let name = format!("symbol{}_{}", bucket, i);
        let key = name.replace('_', "_5f");
        let _ = write!(out, "  ['{}_{}',['{}'", key, bucket * records + i, name);
        for r in 0..3 {
            let _ = write!(
                out,
                ",['../classns_1_1Type{}.html#a{:x}',1,'ns::Type{}']",
                r, i, r
            );
        }
        out.push_str("]]");
        if i + 1 < records {
            out.push(',');
        }
        out.push('\n');
    }
    out.push_str("];\n");
    out
}

/// Create a search directory holding `shards` shard files
fn create_benchmark_fixtures(shards: usize, records: usize) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let search_dir = temp_dir.path().join("search");
    fs::create_dir_all(&search_dir).expect("Failed to create search dir");

    for bucket in 0..shards {
        let section = SECTIONS[bucket % SECTIONS.len()];
        fs::write(
            search_dir.join(format!("{}_{:x}.js", section, bucket)),
            shard_payload(bucket, records),
        )
        .expect("Failed to write shard");
    }

    (temp_dir, search_dir)
}

fn bench_shard_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("shard_parsing");
    for records in [10, 100, 1000] {
        let payload = shard_payload(0, records);
        group.bench_with_input(BenchmarkId::from_parameter(records), &payload, |b, p| {
            b.iter(|| parse_shard(ShardName::parse("all_0"), black_box(p)))
        });
    }
    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let inputs = [
        "keep_alive",
        "TaggedCache&lt; SHAMapHash, Blob &gt;",
        "<a class=\"el\">basic_string</a>::  npos",
    ];

    let mut group = c.benchmark_group("normalize");
    for input in inputs {
        group.bench_with_input(BenchmarkId::from_parameter(input), &input, |b, &s| {
            b.iter(|| normalize(black_box(s)))
        });
    }
    group.finish();
}

fn bench_load(c: &mut Criterion) {
    let (_temp_dir, search_dir) = create_benchmark_fixtures(64, 200);

    c.bench_function("load_eager_64_shards", |b| {
        b.iter(|| {
            let mut loader = IndexLoader::new();
            loader.add_dir(&search_dir);
            loader.load().expect("Failed to load")
        })
    });

    c.bench_function("discover_lazy_64_shards", |b| {
        let dirs = vec![search_dir.clone()];
        let patterns = vec!["*.js".to_string()];
        b.iter(|| LazyIndex::discover(black_box(&dirs), &patterns).expect("Failed to discover"))
    });
}

fn bench_search(c: &mut Criterion) {
    let (_temp_dir, search_dir) = create_benchmark_fixtures(64, 200);
    let mut loader = IndexLoader::new();
    loader.add_dir(&search_dir);
    let index = loader.load().expect("Failed to load").index;
    let engine = QueryEngine::new(&index);

    let mut group = c.benchmark_group("search");

    group.bench_function("exact", |b| b.iter(|| engine.search(black_box("symbol7_42"))));
    group.bench_function("prefix", |b| b.iter(|| engine.search(black_box("symbol7_4"))));
    group.bench_function("substring", |b| b.iter(|| engine.search(black_box("_199"))));

    let limited = SearchOptions::with_limit(50);
    group.bench_function("broad_limited", |b| {
        b.iter(|| engine.search_with(black_box("symbol"), &limited))
    });

    group.finish();
}

fn bench_lazy_first_query(c: &mut Criterion) {
    let (_temp_dir, search_dir) = create_benchmark_fixtures(64, 200);
    let dirs = vec![search_dir];
    let patterns = vec!["*.js".to_string()];
    let options = SearchOptions {
        section: Some(dxi::index::Section::Classes),
        ..Default::default()
    };

    // Fresh index per iteration so the section's shards are parsed each time
    c.bench_function("lazy_first_section_query", |b| {
        b.iter(|| {
            let lazy = LazyIndex::discover(&dirs, &patterns).expect("Failed to discover");
            QueryEngine::new(&lazy).search_with(black_box("symbol1_"), &options)
        })
    });
}

criterion_group!(
    benches,
    bench_shard_parsing,
    bench_normalize,
    bench_load,
    bench_search,
    bench_lazy_first_query,
);

criterion_main!(benches);
