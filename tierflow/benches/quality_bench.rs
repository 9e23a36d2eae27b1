//! Benchmarks for the quality gate and the scaler.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tierflow::ml::{make_classification, ClassificationSpec, StandardScaler};
use tierflow::prelude::*;

fn dataset() -> ndarray::Array2<f64> {
    let spec = ClassificationSpec::new(1000, 10, 3, 42);
    make_classification(&spec).map(|(x, _)| x).unwrap_or_default()
}

fn quality_benchmark(c: &mut Criterion) {
    let x = dataset();
    let names: Vec<String> = (0..x.ncols()).map(|i| format!("feature_{i}")).collect();
    let Ok(frame) = DataFrame::from_matrix(&names, &x) else {
        return;
    };
    let gate = QualityGate::enabled();

    c.bench_function("quality_gate_1000x10", |b| {
        b.iter(|| black_box(gate.validate(Some(black_box(&frame)), "bench")))
    });
}

fn scaler_benchmark(c: &mut Criterion) {
    let x = dataset();

    c.bench_function("scaler_fit_transform_1000x10", |b| {
        b.iter(|| black_box(StandardScaler::fit_transform(black_box(&x)).is_ok()))
    });
}

criterion_group!(benches, quality_benchmark, scaler_benchmark);
criterion_main!(benches);
