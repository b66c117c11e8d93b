//! Consumer shutdown behaviour against the in-memory broker.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tally_bus::{
    Consumer, ConsumerConfig, ConsumerState, ListenerRegistry, MemoryBroker, RawRecord,
};
use tally_types::Topic;

fn counting_registry(delay: Duration) -> (Arc<ListenerRegistry>, Arc<AtomicUsize>) {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let mut registry = ListenerRegistry::new();
    registry.register(Topic::PlayerPayload, "slow-counter", move |_| {
        std::thread::sleep(delay);
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    (Arc::new(registry), seen)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_mid_stream_halts_dispatch() {
    let broker = MemoryBroker::new();
    let (registry, seen) = counting_registry(Duration::from_millis(2));
    let config = ConsumerConfig {
        poll_window: Duration::from_millis(200),
        idle_backoff: Duration::from_millis(10),
        max_batch: 1_000,
    };
    let mut consumer = Consumer::new(broker.source(), registry, config);
    consumer.start().await.unwrap();

    for i in 0..1_000 {
        broker.deliver(RawRecord::new(Topic::PlayerPayload.channel(), format!("k{i}"), "{}"));
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    let stopped = tokio::time::timeout(Duration::from_secs(3), consumer.stop()).await;
    assert!(stopped.is_ok(), "stop must complete within the poll bound");
    assert_eq!(consumer.state(), ConsumerState::Closed);

    let at_stop = seen.load(Ordering::SeqCst);
    assert!(at_stop > 0, "some records dispatched before stop");
    assert!(at_stop < 1_000, "stop interrupted the stream");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(seen.load(Ordering::SeqCst), at_stop, "no dispatch after stop");
    assert_eq!(broker.open_sources(), 0);
}

#[tokio::test]
async fn stop_while_idle_returns_within_poll_window() {
    let broker = MemoryBroker::new();
    let (registry, _seen) = counting_registry(Duration::ZERO);
    let config = ConsumerConfig {
        poll_window: Duration::from_millis(500),
        ..ConsumerConfig::default()
    };
    let mut consumer = Consumer::new(broker.source(), registry, config);
    consumer.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = std::time::Instant::now();
    consumer.stop().await;
    assert!(started.elapsed() < Duration::from_millis(750));
    assert_eq!(consumer.stats().poll_errors(), 0);
}

#[tokio::test]
async fn both_topics_reach_their_handlers() {
    let broker = MemoryBroker::new();
    let payloads = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(AtomicUsize::new(0));
    let mut registry = ListenerRegistry::new();
    let p = Arc::clone(&payloads);
    registry.register(Topic::PlayerPayload, "payloads", move |event| {
        assert_eq!(event.topic(), Topic::PlayerPayload);
        p.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let r = Arc::clone(&requests);
    registry.register(Topic::SyncRequest, "requests", move |event| {
        assert_eq!(event.key(), "*");
        r.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let config = ConsumerConfig {
        poll_window: Duration::from_millis(20),
        idle_backoff: Duration::from_millis(5),
        max_batch: 10,
    };
    let mut consumer = Consumer::new(broker.source(), Arc::new(registry), config);
    consumer.start().await.unwrap();
    broker.deliver(RawRecord::new("player-payload", "k", "{}"));
    broker.deliver(RawRecord::new("SYNC-REQUEST", "*", ""));

    for _ in 0..100 {
        if consumer.stats().dispatched() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    consumer.stop().await;
    assert_eq!(payloads.load(Ordering::SeqCst), 1);
    assert_eq!(requests.load(Ordering::SeqCst), 1);
}
