//! Benchmarks for the reactive core.
//!
//! Run with: cargo bench -p ripple-core --bench reactive

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use ripple_core::queue::{ManualFrameClock, MiniHeap};
use ripple_core::reactive::{PlainObject, Runtime, Watcher};

// =============================================================================
// Heap churn
// =============================================================================

fn bench_heap(c: &mut Criterion) {
    let mut group = c.benchmark_group("heap/churn");

    for size in [64u64, 1024, 16384] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let mut heap = MiniHeap::new(|a: &u64, b: &u64| a.cmp(b));
                for i in 0..size {
                    heap.add(i.wrapping_mul(2_654_435_761) % size);
                }
                while let Some(item) = heap.remove_head() {
                    black_box(item);
                }
            })
        });
    }

    group.finish();
}

// =============================================================================
// Tracked evaluation
// =============================================================================

fn bench_watcher_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("watcher/create");

    for fields in [1usize, 16, 128] {
        let runtime = Runtime::new(Arc::new(ManualFrameClock::new()));
        let object: PlainObject = (0..fields).map(|i| (format!("f{i}"), i as i64)).collect();
        let state = runtime.observe(&object);

        group.throughput(Throughput::Elements(fields as u64));
        group.bench_with_input(BenchmarkId::from_parameter(fields), &fields, |b, &fields| {
            b.iter(|| {
                let reader = state.clone();
                let watcher = Watcher::new(
                    &runtime,
                    None,
                    move || {
                        (0..fields)
                            .filter_map(|i| reader.get(&format!("f{i}")).as_int())
                            .sum::<i64>()
                    },
                    |_, _| {},
                );
                black_box(watcher.value())
            })
        });
    }

    group.finish();
}

// =============================================================================
// Change fan-out and flush
// =============================================================================

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("watcher/fan_out");
    let executor = match tokio::runtime::Builder::new_current_thread().build() {
        Ok(executor) => executor,
        Err(err) => panic!("failed to build executor: {err}"),
    };

    for watchers in [1usize, 32, 256] {
        let clock = Arc::new(ManualFrameClock::new());
        let runtime = Runtime::new(clock.clone());
        let cell = runtime.tracked(0i64);

        for _ in 0..watchers {
            let reader = cell.clone();
            runtime.watch(move || reader.get(), |_, _| {});
        }

        group.throughput(Throughput::Elements(watchers as u64));
        group.bench_with_input(BenchmarkId::from_parameter(watchers), &watchers, |b, _| {
            b.iter(|| {
                cell.update(|v| v + 1);
                black_box(executor.block_on(clock.tick()))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_heap, bench_watcher_creation, bench_fan_out);
criterion_main!(benches);
