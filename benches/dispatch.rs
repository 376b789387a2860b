//! Dispatch benchmark suite.
//!
//! Measures the in-process cost of the multiplexer:
//! - Command round-trips (send, reply, settle) over the channel transport
//! - Event fan-out to 1, 8 and 64 listeners
//! - Frame parsing and rejection of malformed input
//!
//! Run with: cargo bench --bench dispatch
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use futures_util::FutureExt;
use inspector_protocol::protocol::Incoming;
use inspector_protocol::{
    ChannelTransport, Multiplexer, MultiplexerOptions, RemoteEnd, Schema, SessionId,
};
use serde_json::json;
use tokio::runtime::Runtime;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const LISTENER_COUNTS: &[usize] = &[1, 8, 64];
const BATCH_SIZES: &[usize] = &[1, 32, 256];

// ============================================================================
// Fixtures
// ============================================================================

fn schema() -> Schema {
    Schema::builder()
        .command("Page.enable", [])
        .event("Network.requestWillBeSent", ["requestId", "request"])
        .build()
        .unwrap()
}

fn setup() -> (Arc<Multiplexer>, RemoteEnd) {
    let (transport, remote) = ChannelTransport::pair();
    let mux = Multiplexer::new(
        Arc::new(transport),
        schema(),
        MultiplexerOptions::new().with_suppress_request_errors(),
    )
    .unwrap();
    (mux, remote)
}

// ============================================================================
// Benchmark: Command Round-Trip
// ============================================================================

fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip");
    let root = SessionId::root();

    for &batch in BATCH_SIZES {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("sync", batch), &batch, |b, &batch| {
            let (mux, mut remote) = setup();
            b.iter(|| {
                let calls: Vec<_> = (0..batch)
                    .map(|_| mux.send_command(&root, "Page", "enable", json!({})).unwrap())
                    .collect();
                for call in &calls {
                    remote.try_next_frame();
                    remote.deliver(format!(r#"{{"id":{},"result":{{}}}}"#, call.id()));
                }
                for call in calls {
                    black_box(call.now_or_never());
                }
            });
        });
    }

    let rt = Runtime::new().unwrap();
    group.throughput(Throughput::Elements(1));
    group.bench_function("awaited", |b| {
        let (mux, remote) = setup();
        let remote = Arc::new(parking_lot::Mutex::new(remote));
        b.to_async(&rt).iter(|| {
            let mux = Arc::clone(&mux);
            let remote = Arc::clone(&remote);
            async move {
                let call = mux
                    .send_command(&SessionId::root(), "Page", "enable", json!({}))
                    .unwrap();
                {
                    let mut remote = remote.lock();
                    remote.try_next_frame();
                    remote.deliver(format!(r#"{{"id":{},"result":{{}}}}"#, call.id()));
                }
                black_box(call.await.unwrap());
            }
        });
    });

    group.finish();
}

// ============================================================================
// Benchmark: Event Fan-out
// ============================================================================

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    let frame = json!({
        "method": "Network.requestWillBeSent",
        "params": { "requestId": "R1", "request": { "url": "https://example.com" } }
    })
    .to_string();

    for &count in LISTENER_COUNTS {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("listeners", count), &count, |b, &count| {
            let (mux, remote) = setup();
            let hits = Arc::new(AtomicUsize::new(0));
            for _ in 0..count {
                let hits = Arc::clone(&hits);
                mux.add_listener(&SessionId::root(), "Network", "requestWillBeSent", move |_| {
                    hits.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                })
                .unwrap();
            }
            b.iter(|| remote.deliver(black_box(frame.as_str())));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Parsing
// ============================================================================

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    let response = r#"{"id":42,"result":{"frameId":"F1","loaderId":"L1"},"sessionId":"S1"}"#;
    let event = r#"{"method":"Page.loadEventFired","params":{"timestamp":12.5},"sessionId":"S1"}"#;
    let garbage = r#"{"id":42,"method":"Page.enable"#;

    group.bench_function("response", |b| b.iter(|| Incoming::parse(black_box(response))));
    group.bench_function("event", |b| b.iter(|| Incoming::parse(black_box(event))));
    group.bench_function("malformed", |b| b.iter(|| Incoming::parse(black_box(garbage))));

    group.finish();
}

criterion_group!(benches, bench_round_trip, bench_fan_out, bench_parse);
criterion_main!(benches);
