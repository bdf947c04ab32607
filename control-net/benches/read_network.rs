use std::fs::File;
use std::io::BufReader;

use control_net::codec;
use control_net::{ConcurrentNetworkReader, NetworkGraph, ReaderConfig};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

#[path = "../tests/common/mod.rs"]
mod common;

fn bench_decode(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let (header, points) = common::synthetic_network(42, 20_000, 200);
    let path = common::write_container(dir.path(), "bench.cnet", &header, &points);

    c.bench_function("decode_20k_points", |b| {
        b.iter(|| {
            let file = File::open(black_box(&path)).unwrap();
            codec::decode(BufReader::new(file)).unwrap()
        })
    });
}

fn bench_sequential_build(c: &mut Criterion) {
    let (_, points) = common::synthetic_network(42, 20_000, 200);

    c.bench_function("sequential_build_20k_points", |b| {
        b.iter(|| {
            let mut graph = NetworkGraph::new();
            for record in black_box(&points) {
                graph.add_point(record.to_point(None).unwrap()).unwrap();
            }
            graph
        })
    });
}

fn bench_full_read(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let (header, points) = common::synthetic_network(42, 20_000, 200);
    let path = common::write_container(dir.path(), "bench.cnet", &header, &points);

    let mut group = c.benchmark_group("full_read_20k_points");
    group.sample_size(20);
    for threads in [1, 4] {
        let config = ReaderConfig::default().with_map_threads(threads);
        group.bench_function(format!("{threads}_threads"), |b| {
            b.iter(|| {
                let mut reader = ConcurrentNetworkReader::new(config.clone());
                reader.read(&path).unwrap();
                reader.wait().unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_decode,
    bench_sequential_build,
    bench_full_read
);
criterion_main!(benches);
