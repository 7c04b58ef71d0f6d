//! Benchmarks of single-queue kernel launches on the host device

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use offload_rs::apps::{transpose, vector_add};
use offload_rs::prelude::*;

fn context(units: usize) -> Context {
    let config = Config::builder().compute_units(units).build().expect("config");
    Context::host(&config).expect("host context")
}

fn bench_vector_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_add");

    for units in [1, 2, 4].iter() {
        let ctx = context(*units);
        let (a, b) = vector_add::default_inputs(vector_add::DEFAULT_ELEMENTS);
        group.bench_with_input(BenchmarkId::new("compute_units", units), units, |bench, _| {
            bench.iter(|| vector_add::device(&ctx, "", black_box(&a), black_box(&b)).expect("run"))
        });
    }

    group.finish();
}

fn bench_transpose(c: &mut Criterion) {
    let ctx = context(4);
    let n = 256;
    let input: Vec<f32> = (0..n * n).map(|v| v as f32).collect();
    let mut group = c.benchmark_group("transpose");

    for which in [transpose::TransposeKernel::PerElement, transpose::TransposeKernel::Tiled] {
        group.bench_function(which.entry_point(), |b| {
            b.iter(|| transpose::device(&ctx, "", which, black_box(&input), n, 16).expect("run"))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_vector_add, bench_transpose);
criterion_main!(benches);
