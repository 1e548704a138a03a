//! Frame codec and routing benchmark suite.
//!
//! Benchmarks the wire codec and end-to-end fan-out over the in-memory
//! transport:
//! - Codec: encode/decode of `subscribe` and `next` frames
//! - Fan-out: subscription counts 1, 10, 100 with 100 frames each
//!
//! Run with: cargo bench --bench frame_codec
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use gql_transport_ws::protocol::{decode, encode};
use gql_transport_ws::{ChannelTransport, Client, Frame, SubscribePayload, SubscriptionId};
use serde_json::json;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const SUBSCRIPTION_COUNTS: &[usize] = &[1, 10, 100];
const FRAMES_PER_SUBSCRIPTION: usize = 100;

// ============================================================================
// Benchmark: Codec
// ============================================================================

fn bench_codec(c: &mut Criterion) {
    let id = SubscriptionId::generate();
    let subscribe = Frame::subscribe(
        id.clone(),
        json!({
            "query": "subscription OnMessage($room: ID!) { message(room: $room) { id body author { name } } }",
            "variables": { "room": "general" },
            "operationName": "OnMessage"
        }),
    );
    let next = Frame::next(
        id,
        json!({
            "data": {
                "message": {
                    "id": "42",
                    "body": "hello",
                    "author": { "name": "ada" }
                }
            }
        }),
    );
    let next_text = encode(&next).unwrap();

    let mut group = c.benchmark_group("codec");

    group.bench_function("encode_subscribe", |b| {
        b.iter(|| encode(black_box(&subscribe)).unwrap());
    });
    group.bench_function("encode_next", |b| {
        b.iter(|| encode(black_box(&next)).unwrap());
    });
    group.bench_function("decode_next", |b| {
        b.iter(|| decode(black_box(&next_text)).unwrap());
    });

    group.finish();
}

// ============================================================================
// Benchmark: Fan-out
// ============================================================================

fn bench_fan_out(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("fan_out");
    group.sample_size(20);

    for &count in SUBSCRIPTION_COUNTS {
        group.throughput(Throughput::Elements((count * FRAMES_PER_SUBSCRIPTION) as u64));
        group.bench_with_input(BenchmarkId::new("next", count), &count, |b, &count| {
            b.to_async(&rt)
                .iter(|| async move { fan_out(count, FRAMES_PER_SUBSCRIPTION).await });
        });
    }

    group.finish();
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Opens `subscriptions` subscriptions and routes `frames` frames to each.
async fn fan_out(subscriptions: usize, frames: usize) -> usize {
    let (transport, mut server) = ChannelTransport::new();
    let client = Client::new(transport).expect("client");

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let tokens: Vec<_> = (0..subscriptions)
        .map(|_| {
            let events_tx = events_tx.clone();
            client.subscribe(SubscribePayload::new("subscription { tick }"), move |event| {
                let _ = events_tx.send(event.is_ok());
            })
        })
        .collect();
    drop(events_tx);

    let mut peer = server.accept().await.expect("connection");
    let _init = peer.recv_frame().await;
    peer.send_frame(&Frame::connection_ack()).expect("ack");

    let mut ids = Vec::with_capacity(subscriptions);
    for _ in 0..subscriptions {
        let frame = peer.recv_frame().await.expect("link").expect("frame");
        ids.push(frame.id.expect("id"));
    }

    for _ in 0..frames {
        for id in &ids {
            peer.send_frame(&Frame::next(id.clone(), json!({ "data": { "tick": 1 } })))
                .expect("next");
        }
    }

    let mut delivered = 0;
    for _ in 0..subscriptions * frames {
        if events_rx.recv().await == Some(true) {
            delivered += 1;
        }
    }

    drop(tokens);
    client.stop();
    delivered
}

// ============================================================================
// Criterion Setup
// ============================================================================

criterion_group!(benches, bench_codec, bench_fan_out);
criterion_main!(benches);
