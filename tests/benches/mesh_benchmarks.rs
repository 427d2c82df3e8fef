//! # Mesh Benchmarks
//!
//! Throughput checks for the hot paths a node exercises on every event:
//!
//! | Path | Claim | Target |
//! |------|-------|--------|
//! | Topic matching | Segment walk, no allocation | < 1us |
//! | Broker publish | Route + enqueue per bound queue | < 10us |
//! | Admission check | One read plus one compare-and-swap | < 10us |
//! | Fan-out notify | Registry scan + bounded sends | < 1ms at 128 subscribers |

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use fm_fanout::FanoutHub;
use fm_gateway::{FixedWindowLimiter, RateLimitPolicy};
use shared_bus::{Broker, BusConnection, ConnectionConfig, FnHandler, TopicPattern};
use shared_cache::{CacheClient, MemoryStore};
use shared_types::{topics, EventEnvelope, ShipmentEvent, ShipmentId, ShipmentStatus};

fn created_envelope(id: &str) -> EventEnvelope {
    let event = ShipmentEvent::Created {
        shipment_id: ShipmentId::from(id),
        status: ShipmentStatus::Pending,
    };
    EventEnvelope::new(event.topic(), event.payload())
}

// ============================================================================
// Topic matching
// ============================================================================

fn bench_topic_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus-topic-matching");

    for (name, raw) in [
        ("exact", "shipment.created"),
        ("one-word", "shipment.*"),
        ("rest", "shipment.#"),
    ] {
        let pattern = TopicPattern::parse(raw).expect("pattern");
        group.bench_function(BenchmarkId::new("matches", name), |b| {
            b.iter(|| black_box(pattern.matches(black_box("shipment.created"))));
        });
    }

    group.finish();
}

// ============================================================================
// Broker publish
// ============================================================================

fn bench_broker_publish(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let broker = Arc::new(Broker::new());
    let connection = BusConnection::new(Arc::clone(&broker), ConnectionConfig::default());

    // A draining consumer keeps the queue from growing without bound.
    let _consumer = rt.block_on(async {
        connection
            .declare_topic(topics::SHIPMENT_CREATED, true)
            .await
            .expect("declare");
        connection
            .subscribe(
                "bench-audit",
                topics::SHIPMENT_LIFECYCLE,
                Arc::new(FnHandler(|_: EventEnvelope| async { Ok(()) })),
            )
            .await
            .expect("subscribe")
    });

    let envelope = created_envelope("S-bench");

    let mut group = c.benchmark_group("bus-publish");
    group.throughput(Throughput::Elements(1));
    group.bench_function("publish_one_bound_queue", |b| {
        b.iter(|| {
            rt.block_on(connection.publish(envelope.clone()))
                .expect("publish");
        });
    });
    group.finish();
}

// ============================================================================
// Admission check
// ============================================================================

fn bench_admission(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let cache = CacheClient::with_default_timeout(Arc::new(MemoryStore::new()));
    let limiter = FixedWindowLimiter::new(
        cache,
        RateLimitPolicy {
            window: Duration::from_secs(900),
            max: u32::MAX,
        },
    );

    let mut group = c.benchmark_group("gateway-admission");
    group.throughput(Throughput::Elements(1));

    group.bench_function("allow_warm_window", |b| {
        b.iter(|| {
            let decision = rt.block_on(limiter.allow("bench-client"));
            black_box(decision.is_admit());
        });
    });

    let mut n = 0u64;
    group.bench_function("allow_fresh_window", |b| {
        b.iter(|| {
            n += 1;
            let client = format!("bench-client-{n}");
            let decision = rt.block_on(limiter.allow(&client));
            black_box(decision.is_admit());
        });
    });

    group.finish();
}

// ============================================================================
// Fan-out notify
// ============================================================================

fn bench_fanout_notify(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let shipment_id = ShipmentId::from("S-fanout");

    let mut group = c.benchmark_group("fanout-notify");

    for subscribers in [1usize, 16, 128] {
        let hub = Arc::new(FanoutHub::new(1024, 4096));
        for _ in 0..subscribers {
            let (connection_id, mut rx) = hub.register();
            hub.subscribe(&shipment_id, connection_id).expect("subscribe");
            // Drain in the background so sends never hit a full buffer.
            rt.spawn(async move { while rx.recv().await.is_some() {} });
        }

        let payload = created_envelope("S-fanout").payload;
        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::new("notify", subscribers),
            &subscribers,
            |b, _| {
                b.iter(|| black_box(hub.notify(&shipment_id, payload.clone())));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_topic_matching,
    bench_broker_publish,
    bench_admission,
    bench_fanout_notify
);
criterion_main!(benches);
