use microthrottler::application::consumer::{
    ConsumerService, ConsumptionLoop, LoopState, RunningConsumer, StatsSnapshot,
};
use microthrottler::application::ledger::Ledger;
use microthrottler::config::ThrottlerConfig;
use microthrottler::domain::balance::Balance;
use microthrottler::domain::payment::PaymentRequest;
use microthrottler::infrastructure::memory_queue::InMemoryQueue;
use microthrottler::interfaces::codec;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

mod common;
use common::InstrumentedStore;

const QUEUE: &str = "appQueue";

fn config() -> ThrottlerConfig {
    ThrottlerConfig::default()
        .rate(1000.0)
        .timeout(None)
        .error_backoff(Duration::ZERO)
}

fn payload(client: u64, payment: u64, sum: rust_decimal::Decimal) -> Vec<u8> {
    codec::encode(&PaymentRequest::new(client, payment, sum).unwrap())
}

async fn wait_until(running: &RunningConsumer, check: impl Fn(&StatsSnapshot) -> bool) {
    while !check(&running.stats()) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_pop_timeout_causes_one_reconnect_and_no_processing() {
    let queue = InMemoryQueue::new();
    let store = InstrumentedStore::new();
    let ledger = Arc::new(Ledger::new(Box::new(store.clone())));
    let consumer = ConsumptionLoop::new(
        config().timeout(Some(Duration::from_secs(1))),
        Box::new(queue.clone()),
        ledger,
    )
    .unwrap();

    let (shutdown, signal) = watch::channel(false);
    let task = tokio::spawn(consumer.run(signal));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    shutdown.send(true).unwrap();
    let stats = task.await.unwrap();

    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.reconnects, 1);
    assert_eq!(stats.connections, 2);
    assert_eq!(queue.connections(), 2);
    assert_eq!(stats.decoded, 0);
    assert_eq!(stats.decode_failures, 0);
    assert_eq!(store.begins(), 0);
}

#[tokio::test]
async fn test_undecodable_payload_is_dropped_and_loop_continues() {
    let queue = InMemoryQueue::new();
    let ledger = Arc::new(Ledger::new(Box::new(InstrumentedStore::new())));
    queue.push(QUEUE, b"garbage".to_vec());
    queue.push(QUEUE, payload(1, 1, dec!(2.5)));

    let running = ConsumerService::start(config(), Box::new(queue.clone()), ledger.clone()).unwrap();
    wait_until(&running, |s| s.applied == 1).await;
    let stats = running.stop().await.unwrap();

    assert_eq!(stats.decode_failures, 1);
    assert_eq!(stats.reconnects, 1);
    assert_eq!(stats.connections, 2);
    assert!(queue.is_empty(QUEUE));
    let row = ledger.balance(1).await.unwrap().unwrap();
    assert_eq!(row.balance, Balance::new(dec!(2.5)));
}

#[tokio::test]
async fn test_store_outage_drops_payload_without_requeue() {
    let queue = InMemoryQueue::new();
    let store = InstrumentedStore::new();
    let ledger = Arc::new(Ledger::new(Box::new(store.clone())));
    store.set_unavailable(true);
    queue.push(QUEUE, payload(1, 1, dec!(10)));

    let running = ConsumerService::start(config(), Box::new(queue.clone()), ledger.clone()).unwrap();
    wait_until(&running, |s| s.persistence_failures == 1).await;
    assert!(queue.is_empty(QUEUE));

    store.set_unavailable(false);
    queue.push(QUEUE, payload(1, 2, dec!(5)));
    wait_until(&running, |s| s.applied == 1).await;
    let stats = running.stop().await.unwrap();

    assert!(stats.reconnects >= 1);
    assert!(ledger.payment(1).await.unwrap().is_none());
    let row = ledger.balance(1).await.unwrap().unwrap();
    assert_eq!(row.balance, Balance::new(dec!(5)));
}

#[tokio::test]
async fn test_transport_outage_retries_until_queue_returns() {
    let queue = InMemoryQueue::new();
    let ledger = Arc::new(Ledger::new(Box::new(InstrumentedStore::new())));
    queue.set_offline(true);
    queue.push(QUEUE, payload(2, 7, dec!(1)));

    let running = ConsumerService::start(
        config().error_backoff(Duration::from_millis(5)),
        Box::new(queue.clone()),
        ledger.clone(),
    )
    .unwrap();
    wait_until(&running, |s| s.transport_failures >= 3).await;
    assert_eq!(running.stats().applied, 0);

    queue.set_offline(false);
    wait_until(&running, |s| s.applied == 1).await;
    let stats = running.stop().await.unwrap();

    assert!(stats.reconnects >= 3);
    assert!(ledger.balance(2).await.unwrap().is_some());
}

#[tokio::test]
async fn test_replayed_payload_leaves_balance_and_consumes_retry_entries() {
    let queue = InMemoryQueue::new();
    let ledger = Arc::new(Ledger::new(Box::new(InstrumentedStore::new())));
    for _ in 0..2 {
        queue.push("5", b"attempt".to_vec());
        queue.push(QUEUE, payload(5, 11, dec!(3)));
    }
    queue.push("5", b"spare".to_vec());

    let running = ConsumerService::start(config(), Box::new(queue.clone()), ledger.clone()).unwrap();
    wait_until(&running, |s| s.handled() == 2).await;
    let stats = running.stop().await.unwrap();

    assert_eq!(stats.applied, 1);
    assert_eq!(stats.replayed, 1);
    assert_eq!(queue.len("5"), 1);
    let row = ledger.balance(5).await.unwrap().unwrap();
    assert_eq!(row.balance, Balance::new(dec!(3)));
}

#[tokio::test(start_paused = true)]
async fn test_admissions_are_rate_limited() {
    let queue = InMemoryQueue::new();
    let ledger = Arc::new(Ledger::new(Box::new(InstrumentedStore::new())));
    for id in 1..=11 {
        queue.push(QUEUE, payload(1, id, dec!(1)));
    }

    let started = Instant::now();
    let running =
        ConsumerService::start(config().rate(5.0), Box::new(queue), ledger.clone()).unwrap();
    wait_until(&running, |s| s.applied == 11).await;
    let elapsed = started.elapsed();
    running.stop().await.unwrap();

    assert!(elapsed >= Duration::from_millis(1990), "elapsed {:?}", elapsed);
    let row = ledger.balance(1).await.unwrap().unwrap();
    assert_eq!(row.balance, Balance::new(dec!(11)));
}

#[tokio::test]
async fn test_stop_while_waiting_reports_stopped() {
    let queue = InMemoryQueue::new();
    let ledger = Arc::new(Ledger::new(Box::new(InstrumentedStore::new())));
    let running = ConsumerService::start(config(), Box::new(queue.clone()), ledger).unwrap();

    while running.state() != LoopState::Waiting {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    let stats = tokio::time::timeout(Duration::from_secs(1), running.stop())
        .await
        .expect("blocked pop must be interrupted")
        .unwrap();

    assert_eq!(stats.connections, 1);
    assert_eq!(stats.handled(), 0);

    // Elements pushed after the stop stay queued.
    queue.push(QUEUE, payload(1, 1, dec!(1)));
    assert_eq!(queue.len(QUEUE), 1);
}
