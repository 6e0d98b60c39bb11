//! Benchmarks for the indexed timeout heap
//!
//! The dispatcher re-arms a timer on every readiness event, so `adjust`
//! dominates in practice.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use reactor_core::timer::{HeapTimer, TimerId};
use std::time::{Duration, Instant};

const TIMERS: u64 = 10_000;

fn filled_heap(base: Instant) -> HeapTimer {
    let mut heap = HeapTimer::with_capacity(TIMERS as usize);
    for id in 0..TIMERS {
        // Interleave deadlines so the heap is not already sorted
        let offset = (id * 7919) % TIMERS;
        heap.add_at(TimerId(id), base + Duration::from_millis(offset), || {});
    }
    heap
}

fn bench_add(c: &mut Criterion) {
    let base = Instant::now();
    c.bench_function("timer_add_10k", |b| {
        b.iter(|| black_box(filled_heap(base)).len())
    });
}

fn bench_adjust(c: &mut Criterion) {
    let base = Instant::now();
    let mut heap = filled_heap(base);
    let mut id = 0u64;
    let mut offset = TIMERS;

    c.bench_function("timer_adjust", |b| {
        b.iter(|| {
            id = (id + 1) % TIMERS;
            offset += 1;
            let _ = heap.adjust_at(TimerId(id), base + Duration::from_millis(offset));
        })
    });
}

fn bench_cancel(c: &mut Criterion) {
    let base = Instant::now();
    c.bench_function("timer_cancel_middle", |b| {
        b.iter_batched(
            || filled_heap(base),
            |mut heap| heap.cancel(black_box(TimerId(TIMERS / 2))),
            BatchSize::LargeInput,
        )
    });
}

fn bench_expire_all(c: &mut Criterion) {
    let base = Instant::now();
    let end = base + Duration::from_millis(TIMERS);
    c.bench_function("timer_expire_10k", |b| {
        b.iter_batched(
            || filled_heap(base),
            |mut heap| heap.expire_ready(black_box(end)),
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_add, bench_adjust, bench_cancel, bench_expire_all);
criterion_main!(benches);
