//! FIFO Runtime benchmarks.
//!
//! Measures `GenericFifo::push`/`pop` throughput for the flow-control and
//! no-flow-control paths across a range of entry sizes and capacities,
//! the two knobs that change per-operation cost (§4.8 capacity formulas).

use cascade::fifo::GenericFifo;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn benchmark_push_pop_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("fifo_push_pop_round_trip");
    for &entry_size in &[4u32, 64, 256] {
        let capacity = 16;
        let entry = vec![0xABu8; entry_size as usize];
        group.bench_with_input(BenchmarkId::from_parameter(entry_size), &entry_size, |b, _| {
            let mut fifo = GenericFifo::ring(capacity, entry_size, 0, true);
            b.iter(|| {
                black_box(fifo.push(&entry));
                black_box(fifo.pop());
            });
        });
    }
    group.finish();
}

fn benchmark_flow_control_vs_none(c: &mut Criterion) {
    let mut group = c.benchmark_group("fifo_flow_control");
    let entry = vec![0u8; 16];

    group.bench_function("with_flow_control_delay2", |b| {
        let mut fifo = GenericFifo::ring(9, 16, 2, true);
        b.iter(|| {
            black_box(fifo.push(&entry));
            fifo.complete_scheduled_push();
            black_box(fifo.pop());
            fifo.complete_scheduled_free();
        });
    });

    group.bench_function("without_flow_control_delay2", |b| {
        let mut fifo = GenericFifo::ring(5, 16, 2, false);
        b.iter(|| {
            black_box(fifo.push(&entry));
            fifo.complete_scheduled_push();
            black_box(fifo.pop());
        });
    });

    group.finish();
}

fn benchmark_capacity_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("fifo_capacity_scaling");
    let entry = vec![0u8; 8];
    for &capacity in &[4u32, 64, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, &capacity| {
            let mut fifo = GenericFifo::ring(capacity, 8, 0, true);
            b.iter(|| {
                for _ in 0..capacity {
                    black_box(fifo.push(&entry));
                }
                for _ in 0..capacity {
                    black_box(fifo.pop());
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    fifo_benches,
    benchmark_push_pop_round_trip,
    benchmark_flow_control_vs_none,
    benchmark_capacity_scaling
);
criterion_main!(fifo_benches);
