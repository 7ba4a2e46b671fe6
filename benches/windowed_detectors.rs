//! Benchmarks for the windowed anomaly detectors.

use anofox_operators::core::Table;
use anofox_operators::operators::{
    Estimator, GaussianGraphicalModel, WindowedConfig, WindowedIsolationForest, WindowedLOF,
    WindowedNN, WindowedPCA,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn generate_signal(n: usize, cols: usize) -> Table {
    let rows = (0..n)
        .map(|i| {
            (0..cols)
                .map(|c| {
                    let period = 12.0 + 5.0 * c as f64;
                    (2.0 * std::f64::consts::PI * i as f64 / period).sin()
                })
                .collect()
        })
        .collect();
    Table::from_rows(rows).unwrap()
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("windowed_fit");
    let config = WindowedConfig::default().with_lookback(20);

    for size in [128, 256, 512].iter() {
        let data = generate_signal(*size, 3);

        group.bench_with_input(BenchmarkId::new("WindowedPCA", size), size, |b, _| {
            b.iter(|| {
                let mut op = WindowedPCA::new(config.clone()).unwrap();
                op.fit(black_box(&data), None).unwrap();
            })
        });

        group.bench_with_input(BenchmarkId::new("WindowedNN", size), size, |b, _| {
            b.iter(|| {
                let mut op = WindowedNN::new(config.clone()).unwrap();
                op.fit(black_box(&data), None).unwrap();
            })
        });

        group.bench_with_input(BenchmarkId::new("WindowedLOF", size), size, |b, _| {
            b.iter(|| {
                let mut op = WindowedLOF::new(config.clone()).unwrap();
                op.fit(black_box(&data), None).unwrap();
            })
        });

        group.bench_with_input(
            BenchmarkId::new("WindowedIsolationForest", size),
            size,
            |b, _| {
                b.iter(|| {
                    let mut op = WindowedIsolationForest::new(config.clone()).unwrap();
                    op.fit(black_box(&data), None).unwrap();
                })
            },
        );
    }

    group.finish();
}

fn bench_predict(c: &mut Criterion) {
    let mut group = c.benchmark_group("windowed_predict");
    let train = generate_signal(400, 3);
    let test = generate_signal(100, 3);

    let mut pca = WindowedPCA::new(WindowedConfig::default().with_lookback(20)).unwrap();
    pca.fit(&train, None).unwrap();
    group.bench_function("WindowedPCA", |b| {
        b.iter(|| pca.predict(Some(black_box(&test))).unwrap())
    });

    let mut ggm = GaussianGraphicalModel::default();
    ggm.fit(&train, None).unwrap();
    group.bench_function("GaussianGraphicalModel", |b| {
        b.iter(|| ggm.predict(Some(black_box(&test))).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_fit, bench_predict);
criterion_main!(benches);
