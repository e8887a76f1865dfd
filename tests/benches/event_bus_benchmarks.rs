//! # Event Bus Benchmarks
//!
//! | Scenario | Target |
//! |----------|--------|
//! | 10,000 emits, no subscribers waiting | < 100ms |
//! | 10,000 emits dispatched to N handlers | linear in N |
//! | 2,000 emits into a 1,000-entry history | constant per emit |

use blueprint_bus::{BusConfig, EventBus};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::time::Duration;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn bench_emit_only(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("event-bus-emit");
    group.measurement_time(Duration::from_secs(10));
    group.throughput(Throughput::Elements(10_000));

    group.bench_function("emit_10k", |b| {
        b.iter(|| {
            let _guard = rt.enter();
            let bus = EventBus::new(BusConfig::default()).unwrap();
            for i in 0..10_000u64 {
                black_box(bus.emit("TASK_CREATED", json!({ "taskId": i }), "bench").unwrap());
            }
            bus
        })
    });

    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("event-bus-fan-out");
    group.measurement_time(Duration::from_secs(10));

    for handlers in [1usize, 3, 10] {
        group.throughput(Throughput::Elements(10_000 * handlers as u64));
        group.bench_with_input(BenchmarkId::new("dispatch_10k", handlers), &handlers, |b, &handlers| {
            b.iter(|| {
                rt.block_on(async {
                    let bus = EventBus::new(BusConfig::default()).unwrap();
                    let _subs: Vec<_> = (0..handlers)
                        .map(|_| bus.on("TASK_CREATED", |event| async move {
                            black_box(event);
                            Ok(())
                        }))
                        .collect();
                    for i in 0..10_000u64 {
                        bus.emit("TASK_CREATED", json!({ "taskId": i }), "bench").unwrap();
                    }
                    bus.flush().await;
                    bus.shutdown().await;
                })
            })
        });
    }

    group.finish();
}

fn bench_history_eviction(c: &mut Criterion) {
    let rt = runtime();
    let _guard = rt.enter();
    let bus = EventBus::new(BusConfig::default()).unwrap();
    for i in 0..1_000u64 {
        bus.emit("WARMUP", json!(i), "bench").unwrap();
    }

    c.bench_function("emit_with_full_history", |b| {
        b.iter(|| black_box(bus.emit("TASK_CREATED", json!({ "taskId": 1 }), "bench").unwrap()))
    });

    assert_eq!(bus.history_len(), 1_000);
}

criterion_group!(benches, bench_emit_only, bench_fan_out, bench_history_eviction);
criterion_main!(benches);
