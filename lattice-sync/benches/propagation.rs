//! # Propagation Benchmarks
//!
//! Performance benchmarks for diffing trees and pushing changes through the
//! signal graph.
//!
//! Run with: `cargo bench -p lattice-sync`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use lattice_sync::{path, Lifetime, MapModel, Model, ReactGraph, ReactiveModel};
use std::hint::black_box;

/// A map with `size` panels, each holding a few fields.
fn create_tree(size: usize) -> Model {
    let panels: MapModel = (0..size)
        .map(|i| {
            let panel = MapModel::new()
                .with("title", format!("panel {i}"))
                .with("visible", true)
                .with("order", i as i64);
            (format!("p{i}"), panel)
        })
        .collect();
    Model::Map(MapModel::new().with("panels", panels))
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_diff_single_change(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_single_change");

    for size in [100, 1000, 10000].iter() {
        let old = create_tree(*size);
        let new = path!["panels", "p0", "title"].put_in(old.clone(), "renamed");
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(old.diff(&new)));
        });
    }

    group.finish();
}

fn bench_chain_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_propagation");

    for depth in [10, 100, 1000].iter() {
        let graph = ReactGraph::new();
        let lifetime = Lifetime::new();
        let source = graph.variable(&lifetime, 0i64);
        let mut tail = source.signal().clone();
        for _ in 0..*depth {
            tail = graph.reaction(&lifetime, &[&tail], |v| v[0] + 1);
        }

        let mut next = 0i64;
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, _| {
            b.iter(|| {
                next += 1;
                source.set(next);
                black_box(tail.get())
            });
        });
    }

    group.finish();
}

fn bench_wide_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("wide_fan_out");

    for width in [10, 100, 1000].iter() {
        let graph = ReactGraph::new();
        let lifetime = Lifetime::new();
        let source = graph.variable(&lifetime, 0i64);
        let leaves: Vec<_> = (0..*width)
            .map(|i| graph.reaction(&lifetime, &[source.signal()], move |v| v[0] * i))
            .collect();

        let mut next = 0i64;
        group.bench_with_input(BenchmarkId::from_parameter(width), width, |b, _| {
            b.iter(|| {
                next += 1;
                source.set(next);
                black_box(leaves.len())
            });
        });
    }

    group.finish();
}

fn bench_transaction_with_subscribers(c: &mut Criterion) {
    let mut group = c.benchmark_group("transaction_with_subscribers");

    for subscribers in [10, 100, 1000].iter() {
        let lifetime = Lifetime::new();
        let model = ReactiveModel::new(lifetime.clone());
        let tree = create_tree(*subscribers);
        model.transaction(move |_| tree).expect("seed");
        let _signals: Vec<_> = (0..*subscribers)
            .map(|i| model.subscribe(&lifetime, path!["panels", format!("p{i}"), "order"]))
            .collect();

        let mut next = 0i64;
        group.bench_with_input(BenchmarkId::from_parameter(subscribers), subscribers, |b, _| {
            b.iter(|| {
                next += 1;
                let value = next;
                model
                    .transaction(move |m| path!["panels", "p0", "order"].put_in(m, value))
                    .expect("transaction");
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_diff_single_change,
    bench_chain_propagation,
    bench_wide_fan_out,
    bench_transaction_with_subscribers,
);
criterion_main!(benches);
