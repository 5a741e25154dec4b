//! Ring lookup and rebuild cost for typical cluster sizes

use cluster_ring::{ClusterNode, ConsistentHashRing, NodeId};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn members(count: usize) -> Vec<ClusterNode> {
    (0..count)
        .map(|i| ClusterNode::new(NodeId::new(format!("node-{}", i)).unwrap(), format!("10.0.0.{}:7000", i)))
        .collect()
}

fn bench_locate(c: &mut Criterion) {
    let mut group = c.benchmark_group("locate");
    for nodes in [3usize, 10, 50] {
        let ring = ConsistentHashRing::new();
        ring.rebuild(members(nodes));
        let keys: Vec<String> = (0..1024).map(|i| format!("player:{}", i)).collect();

        group.bench_with_input(BenchmarkId::from_parameter(nodes), &keys, |b, keys| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % keys.len();
                black_box(ring.locate(black_box(&keys[i])))
            })
        });
    }
    group.finish();
}

fn bench_rebuild(c: &mut Criterion) {
    let nodes = members(10);
    c.bench_function("rebuild_10_nodes", |b| {
        let ring = ConsistentHashRing::new();
        b.iter(|| ring.rebuild(black_box(nodes.clone())))
    });
}

criterion_group!(benches, bench_locate, bench_rebuild);
criterion_main!(benches);
