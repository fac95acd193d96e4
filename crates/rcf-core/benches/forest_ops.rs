//! Criterion benchmarks for the forest hot paths.
//!
//! Streaming cost is dominated by `observe`: one score plus up to `T`
//! tree updates per point.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rcf_common::ForestConfig;
use rcf_core::{RandomCutForest, RandomCutTree};

fn points(n: usize, dims: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| {
            (0..dims)
                .map(|d| ((i * (d + 1)) as f64 * 0.037).sin() * (d + 1) as f64)
                .collect()
        })
        .collect()
}

fn bench_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree");
    let data = points(256, 4);

    group.bench_function("insert_delete_256", |b| {
        let mut tree = RandomCutTree::with_seed(4, 1);
        for p in &data {
            tree.insert(p).unwrap();
        }
        let mut i = 0usize;
        b.iter(|| {
            let p = &data[i % data.len()];
            tree.delete(black_box(p)).unwrap();
            tree.insert(black_box(p)).unwrap();
            i += 1;
        });
    });

    let mut tree = RandomCutTree::with_seed(4, 1);
    for p in &data {
        tree.insert(p).unwrap();
    }
    group.bench_function("score_256", |b| {
        let q = [0.3, -1.2, 2.5, 0.0];
        b.iter(|| black_box(tree.score(black_box(&q)).unwrap()));
    });

    group.finish();
}

fn bench_forest(c: &mut Criterion) {
    let mut group = c.benchmark_group("forest");
    let training = points(2048, 4);

    for parallel in [false, true] {
        let config = ForestConfig::new(100, 256, 4)
            .with_seed(7)
            .with_parallel(parallel);
        let forest = RandomCutForest::train(config, &training).unwrap();
        let label = if parallel { "parallel" } else { "sequential" };

        group.bench_with_input(BenchmarkId::new("score", label), &forest, |b, f| {
            let q = [1.0, 0.5, -2.0, 3.0];
            b.iter(|| black_box(f.score(black_box(&q)).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("observe", label), &forest, |b, f| {
            let mut forest = f.clone();
            let stream = points(4096, 4);
            let mut i = 0usize;
            b.iter(|| {
                let result = forest.observe(black_box(&stream[i % stream.len()])).unwrap();
                i += 1;
                black_box(result)
            });
        });
    }

    for trees in [50usize, 200] {
        group.bench_with_input(BenchmarkId::new("train", trees), &trees, |b, &t| {
            let config = ForestConfig::new(t, 256, 4).with_seed(3);
            b.iter(|| RandomCutForest::train(config.clone(), black_box(&training)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tree, bench_forest);
criterion_main!(benches);
