//! Timer queue and promise-chain benchmarks.
//!
//! These benchmarks measure:
//! - Timer insertion (O(1) for increasing deadlines, O(n) worst case)
//! - Timer cancellation (O(1) unlink)
//! - Draining due timers
//! - Promise chain dispatch through the tick scheduler

#![allow(missing_docs)]
#![allow(clippy::semicolon_if_nothing_returned)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use promissory::runtime;
use promissory::time::{delay, TimerCallback, TimerKey, TimerQueue};
use promissory::types::Time;
use promissory::util::DetRng;
use promissory::{all, Promise, SchedulerConfig};

fn noop() -> TimerCallback {
    Box::new(|_| {})
}

// =============================================================================
// INSERTION BENCHMARKS
// =============================================================================

fn bench_timer_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("timer_queue/insert");

    for count in [100_u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(count));

        group.bench_with_input(BenchmarkId::new("increasing", count), &count, |b, &count| {
            b.iter(|| {
                let mut queue = TimerQueue::new();
                for ms in 0..count {
                    black_box(queue.insert_at(Time::ZERO, Time::from_millis(ms), noop()));
                }
                queue
            });
        });

        group.bench_with_input(BenchmarkId::new("random", count), &count, |b, &count| {
            let mut rng = DetRng::new(0x5EED);
            let dues: Vec<Time> = (0..count)
                .map(|_| Time::from_millis(rng.next_u64() % 60_000))
                .collect();
            b.iter(|| {
                let mut queue = TimerQueue::new();
                for &due in &dues {
                    black_box(queue.insert_at(Time::ZERO, due, noop()));
                }
                queue
            });
        });
    }

    group.finish();
}

// =============================================================================
// CANCELLATION BENCHMARKS
// =============================================================================

fn bench_timer_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("timer_queue/cancel");

    for count in [1_000_u64, 10_000] {
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::new("shuffled", count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let mut queue = TimerQueue::new();
                    let mut keys: Vec<TimerKey> = (0..count)
                        .map(|ms| queue.insert_at(Time::ZERO, Time::from_millis(ms), noop()))
                        .collect();
                    DetRng::new(count).shuffle(&mut keys);
                    (queue, keys)
                },
                |(mut queue, keys)| {
                    for key in keys {
                        black_box(queue.cancel(key));
                    }
                    queue
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

// =============================================================================
// EXPIRY BENCHMARKS
// =============================================================================

fn bench_pop_due(c: &mut Criterion) {
    let mut group = c.benchmark_group("timer_queue/pop_due");

    group.bench_function("drain_10k", |b| {
        b.iter_batched(
            || {
                let mut queue = TimerQueue::new();
                for ms in 0..10_000 {
                    queue.insert_at(Time::ZERO, Time::from_millis(ms), noop());
                }
                queue
            },
            |mut queue| {
                let mut fired = 0_u32;
                while let Some(expired) = queue.pop_due(Time::from_secs(60)) {
                    (expired.callback)(expired.elapsed);
                    fired += 1;
                }
                black_box(fired)
            },
            criterion::BatchSize::LargeInput,
        );
    });

    group.bench_function("nothing_due", |b| {
        let mut queue = TimerQueue::new();
        for ms in 1_000..2_000 {
            queue.insert_at(Time::ZERO, Time::from_millis(ms), noop());
        }
        b.iter(|| black_box(queue.pop_due(Time::from_millis(500)).is_none()));
    });

    group.finish();
}

// =============================================================================
// SCHEDULER BENCHMARKS
// =============================================================================

fn bench_promise_chains(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler/chains");

    for depth in [10_u32, 100, 1_000] {
        group.throughput(Throughput::Elements(u64::from(depth)));
        group.bench_with_input(BenchmarkId::new("map_depth", depth), &depth, |b, &depth| {
            runtime::install(SchedulerConfig::virtual_time()).expect("install");
            b.iter(|| {
                let mut promise = Promise::resolved(0_u32);
                for _ in 0..depth {
                    promise = promise.map(|v| v + 1);
                }
                black_box(runtime::block_on(&promise).expect("fulfilled"))
            });
        });
    }

    group.bench_function("all_of_1000_delays", |b| {
        runtime::install(SchedulerConfig::virtual_time()).expect("install");
        b.iter(|| {
            let delays: Vec<_> = (0..1_000_u64)
                .map(|i| delay(Duration::from_millis(20 + i % 100)))
                .collect();
            black_box(runtime::block_on(&all(delays)).expect("fulfilled").len())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_timer_insert,
    bench_timer_cancel,
    bench_pop_due,
    bench_promise_chains,
);
criterion_main!(benches);
