//! # Sync Bus Benchmarks
//!
//! Performance validation for the synchronous dispatch path:
//!
//! | Path | Claim | Target |
//! |------|-------|--------|
//! | publish, no subscribers | middleware + buffer only | < 5µs |
//! | publish fan-out | linear in matching subscribers | < 2µs per subscriber |
//! | replay catch-up | bounded by buffer capacity | < 1ms at capacity 50 |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use parking_lot::Mutex;
use rand::Rng;
use serde_json::json;
use std::sync::Arc;
use sync_bus::{BusConfig, SubscribeOptions, SyncBus};

fn bench_publish_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish-fanout");

    for subscribers in [1usize, 10, 100] {
        let bus = SyncBus::new();
        let delivered: Arc<Mutex<u64>> = Arc::new(Mutex::new(0));
        for _ in 0..subscribers {
            let counter = Arc::clone(&delivered);
            let _handle = bus.subscribe(
                "bench:*",
                move |_| {
                    *counter.lock() += 1;
                    Ok(())
                },
                SubscribeOptions::new(),
            );
        }

        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::new("matching_subscribers", subscribers),
            &subscribers,
            |b, _| {
                b.iter(|| bus.publish("bench:tick", black_box(json!({"n": 1}))));
            },
        );
    }

    group.finish();
}

fn bench_publish_no_subscribers(c: &mut Criterion) {
    let bus = SyncBus::new();

    c.bench_function("publish_no_subscribers", |b| {
        b.iter(|| bus.publish("bench:tick", black_box(json!({"n": 1}))));
    });
}

fn bench_replay_catchup(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay-catchup");
    let mut rng = rand::thread_rng();

    for capacity in [10usize, 50, 500] {
        let bus = SyncBus::with_config(BusConfig::new(capacity, 3_600_000))
            .expect("bench config is valid");
        for _ in 0..capacity {
            let n: u64 = rng.gen();
            bus.publish("bench:item", json!({"n": n}));
        }

        group.throughput(Throughput::Elements(capacity as u64));
        group.bench_with_input(BenchmarkId::new("at_capacity", capacity), &capacity, |b, _| {
            b.iter(|| {
                let seen: Arc<Mutex<usize>> = Arc::new(Mutex::new(0));
                let counter = Arc::clone(&seen);
                let handle = bus.subscribe(
                    "bench:*",
                    move |_| {
                        *counter.lock() += 1;
                        Ok(())
                    },
                    SubscribeOptions::replay(),
                );
                handle.unsubscribe();
                let total = *seen.lock();
                black_box(total)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_publish_no_subscribers,
    bench_publish_fanout,
    bench_replay_catchup
);
criterion_main!(benches);
