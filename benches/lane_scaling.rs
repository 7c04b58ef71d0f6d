//! Benchmarks of the multi-queue pipeline as the lane count grows

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use offload_rs::apps::{multi_queue, random_ints};
use offload_rs::kernels::MULTI_QUEUE_SOURCE;
use offload_rs::prelude::*;

const ELEMENTS: usize = 1 << 18;

fn bench_lanes(c: &mut Criterion) {
    let input = random_ints(ELEMENTS, Some(42));
    let mut group = c.benchmark_group("pipeline_lanes");
    group.throughput(Throughput::Elements(ELEMENTS as u64));

    for lanes in [1, 2, 4, 8, 16].iter() {
        let config = Config::builder()
            .elements(ELEMENTS)
            .lanes(*lanes)
            .work_group_size(256)
            .build()
            .expect("config");
        let context = Context::host(&config).expect("host context");
        let program = context.build_program(MULTI_QUEUE_SOURCE, "").expect("build");
        let kernel = program.kernel(multi_queue::KERNEL_NAME).expect("kernel");
        let mut pipeline = MultiQueuePipeline::new(&context, kernel, &config).expect("pipeline");

        group.bench_with_input(BenchmarkId::new("lanes", lanes), &input, |b, input| {
            b.iter(|| pipeline.run(black_box(input)).expect("run"))
        });
    }

    group.finish();
}

fn bench_host_reference(c: &mut Criterion) {
    let input = random_ints(ELEMENTS, Some(42));
    c.bench_function("host_reference", |b| {
        b.iter(|| multi_queue::host_reference(black_box(&input)))
    });
}

criterion_group!(benches, bench_lanes, bench_host_reference);
criterion_main!(benches);
