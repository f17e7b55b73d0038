//! Fit and evaluation benchmarks
//!
//! Measures the ElasticNet solver and metric computation at a few table sizes
//! typical of tabular regression datasets.
//!
//! Run with: cargo bench --bench fit_evaluate

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use train_eval::dataset::SplitDataset;
use train_eval::metrics::{MetricsEvaluator, RegressionEvaluator};
use train_eval::model::{ElasticNetFitter, Fittable, Hyperparameters};

const FEATURES: usize = 11; // wine-quality width
const SIZES: [usize; 3] = [100, 1_000, 10_000];

fn synthetic_split(rows: usize) -> SplitDataset {
    let mut rng = StdRng::seed_from_u64(42);
    let weights: Vec<f64> = (0..FEATURES).map(|_| rng.gen_range(-2.0..2.0)).collect();
    let x = Array2::from_shape_fn((rows, FEATURES), |_| rng.gen_range(0.0..10.0));
    let y = Array1::from_shape_fn(rows, |i| {
        x.row(i).iter().zip(&weights).map(|(a, w)| a * w).sum::<f64>() + rng.gen_range(-0.5..0.5)
    });
    let names = (0..FEATURES).map(|i| format!("x{i}")).collect();
    SplitDataset::new(names, x, y).unwrap()
}

/// Benchmark ElasticNet fitting
fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("elasticnet_fit");
    let fitter = ElasticNetFitter::default();
    let hp = Hyperparameters {
        alpha: 0.5,
        l1_ratio: 0.5,
    };

    for rows in SIZES {
        let split = synthetic_split(rows);
        group.bench_with_input(BenchmarkId::new("coordinate_descent", rows), &split, |b, split| {
            b.iter(|| fitter.fit(black_box(&hp), 42, black_box(split)).unwrap());
        });
    }

    group.finish();
}

/// Benchmark prediction plus rmse/mae/r2
fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("predict_evaluate");
    let hp = Hyperparameters {
        alpha: 0.5,
        l1_ratio: 0.5,
    };

    for rows in SIZES {
        let split = synthetic_split(rows);
        let model = ElasticNetFitter::default().fit(&hp, 42, &split).unwrap();
        group.bench_with_input(BenchmarkId::new("regression_metrics", rows), &split, |b, split| {
            b.iter(|| {
                let predicted = model.predict(black_box(split.features())).unwrap();
                RegressionEvaluator
                    .evaluate(predicted.view(), split.target())
                    .unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fit, bench_evaluate);
criterion_main!(benches);
