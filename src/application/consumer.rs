use super::gate::AdmissionGate;
use super::ledger::{Ledger, Recorded};
use crate::config::ThrottlerConfig;
use crate::domain::ports::{QueueConnectionBox, QueueConnectorBox};
use crate::error::{Result, ThrottlerError, TransportError};
use crate::interfaces::codec;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Where the consumption loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    Connecting = 0,
    Waiting = 1,
    Processing = 2,
    Backoff = 3,
    Stopped = 4,
}

impl LoopState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LoopState::Connecting,
            1 => LoopState::Waiting,
            2 => LoopState::Processing,
            3 => LoopState::Backoff,
            _ => LoopState::Stopped,
        }
    }
}

/// Counters published by a running loop.
#[derive(Debug)]
pub struct LoopStats {
    state: AtomicU8,
    connections: AtomicU64,
    reconnects: AtomicU64,
    timeouts: AtomicU64,
    decoded: AtomicU64,
    applied: AtomicU64,
    replayed: AtomicU64,
    decode_failures: AtomicU64,
    persistence_failures: AtomicU64,
    transport_failures: AtomicU64,
    queue_length: AtomicU64,
}

impl Default for LoopStats {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(LoopState::Connecting as u8),
            connections: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            decoded: AtomicU64::new(0),
            applied: AtomicU64::new(0),
            replayed: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            persistence_failures: AtomicU64::new(0),
            transport_failures: AtomicU64::new(0),
            queue_length: AtomicU64::new(0),
        }
    }
}

/// Point-in-time copy of [`LoopStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub connections: u64,
    pub reconnects: u64,
    pub timeouts: u64,
    pub decoded: u64,
    pub applied: u64,
    pub replayed: u64,
    pub decode_failures: u64,
    pub persistence_failures: u64,
    pub transport_failures: u64,
    /// Queue length reported before the most recent pop.
    pub queue_length: u64,
}

impl StatsSnapshot {
    /// Popped payloads that reached a final outcome, successful or not.
    pub fn handled(&self) -> u64 {
        self.applied + self.replayed + self.decode_failures + self.persistence_failures
    }
}

impl LoopStats {
    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections: self.connections.load(Ordering::SeqCst),
            reconnects: self.reconnects.load(Ordering::SeqCst),
            timeouts: self.timeouts.load(Ordering::SeqCst),
            decoded: self.decoded.load(Ordering::SeqCst),
            applied: self.applied.load(Ordering::SeqCst),
            replayed: self.replayed.load(Ordering::SeqCst),
            decode_failures: self.decode_failures.load(Ordering::SeqCst),
            persistence_failures: self.persistence_failures.load(Ordering::SeqCst),
            transport_failures: self.transport_failures.load(Ordering::SeqCst),
            queue_length: self.queue_length.load(Ordering::SeqCst),
        }
    }

    fn enter(&self, state: LoopState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

enum Step {
    Connecting,
    Waiting(QueueConnectionBox),
    Processing(QueueConnectionBox, Vec<u8>),
    Backoff(Duration),
}

/// Drains the work queue into the ledger at a bounded rate.
///
/// A single task walks CONNECTING -> WAITING -> PROCESSING -> WAITING. A pop
/// timeout or any failure drops the connection and goes through BACKOFF back
/// to CONNECTING, forever. Failed payloads are logged and dropped, never
/// requeued; producers are expected to redeliver.
pub struct ConsumptionLoop {
    config: ThrottlerConfig,
    connector: QueueConnectorBox,
    gate: AdmissionGate,
    ledger: Arc<Ledger>,
    stats: Arc<LoopStats>,
}

impl ConsumptionLoop {
    pub fn new(
        config: ThrottlerConfig,
        connector: QueueConnectorBox,
        ledger: Arc<Ledger>,
    ) -> Result<Self> {
        config.validate()?;
        let gate = AdmissionGate::new(config.rate_limit_per_second)?;
        Ok(Self {
            config,
            connector,
            gate,
            ledger,
            stats: Arc::new(LoopStats::default()),
        })
    }

    pub fn stats(&self) -> Arc<LoopStats> {
        self.stats.clone()
    }

    /// Runs until `shutdown` turns `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> StatsSnapshot {
        info!(
            queue = %self.config.queue_key,
            rate = self.config.rate_limit_per_second,
            "Service started!"
        );
        let mut step = Step::Connecting;

        loop {
            if *shutdown.borrow() {
                break;
            }

            step = match step {
                Step::Connecting => {
                    self.stats.enter(LoopState::Connecting);
                    match self.connector.connect(self.config.connection_timeout).await {
                        Ok(conn) => {
                            LoopStats::bump(&self.stats.connections);
                            match self.config.connection_timeout {
                                Some(timeout) => {
                                    info!("Timeout set: {} seconds.", timeout.as_secs_f64())
                                }
                                None => info!("Timeout disabled, waiting indefinitely."),
                            }
                            Step::Waiting(conn)
                        }
                        Err(e) => self.fail(e.into()),
                    }
                }
                Step::Waiting(mut conn) => {
                    self.stats.enter(LoopState::Waiting);
                    let popped = tokio::select! {
                        biased;
                        _ = shutdown.changed() => None,
                        popped = self.next_payload(&mut conn) => Some(popped),
                    };
                    match popped {
                        None => break,
                        Some(Ok(Some(payload))) => Step::Processing(conn, payload),
                        Some(Ok(None)) => {
                            LoopStats::bump(&self.stats.timeouts);
                            info!("Timed out. Retrying!");
                            Step::Backoff(Duration::ZERO)
                        }
                        Some(Err(e)) => self.fail(e.into()),
                    }
                }
                Step::Processing(mut conn, payload) => {
                    self.stats.enter(LoopState::Processing);
                    match self.process(&mut conn, &payload).await {
                        Ok(()) => Step::Waiting(conn),
                        Err(e) => self.fail(e),
                    }
                }
                Step::Backoff(delay) => {
                    self.stats.enter(LoopState::Backoff);
                    if !delay.is_zero() {
                        tokio::select! {
                            biased;
                            _ = shutdown.changed() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    LoopStats::bump(&self.stats.reconnects);
                    Step::Connecting
                }
            };
        }

        self.stats.enter(LoopState::Stopped);
        info!("Service stopped.");
        self.stats.snapshot()
    }

    async fn next_payload(
        &self,
        conn: &mut QueueConnectionBox,
    ) -> std::result::Result<Option<Vec<u8>>, TransportError> {
        let key = self.config.queue_key.as_str();
        let length = conn.length(key).await?;
        self.stats.queue_length.store(length, Ordering::SeqCst);
        info!("Current queue size {}.", length);
        conn.blocking_pop_tail(key).await
    }

    async fn process(&self, conn: &mut QueueConnectionBox, payload: &[u8]) -> Result<()> {
        let request = codec::decode(payload)?;
        LoopStats::bump(&self.stats.decoded);
        info!(%request, "Element obtained");

        let waited = self.gate.acquire().await;
        info!(%request, waited_ms = waited.as_millis() as u64, "Processing payment request");

        let recorded = self.ledger.record_payment(request).await?;
        let client_key = recorded.request().client_id().to_string();
        match recorded {
            Recorded::Applied(_) => LoopStats::bump(&self.stats.applied),
            Recorded::Replayed(_) => LoopStats::bump(&self.stats.replayed),
        }

        // One delivery attempt used up from the client's retry budget.
        conn.pop_head(&client_key).await?;
        Ok(())
    }

    fn fail(&self, err: ThrottlerError) -> Step {
        match &err {
            ThrottlerError::Decode(_) => {
                LoopStats::bump(&self.stats.decode_failures);
                warn!(error = %err, "Dropping undecodable payload, reconnecting");
            }
            ThrottlerError::Persistence(_) => {
                LoopStats::bump(&self.stats.persistence_failures);
                error!(error = %err, "Payment not recorded, reconnecting");
            }
            _ => {
                LoopStats::bump(&self.stats.transport_failures);
                error!(error = %err, "Queue failure, reconnecting");
            }
        }
        Step::Backoff(self.config.error_backoff)
    }
}

/// Entry point used by the process bootstrap.
pub struct ConsumerService;

impl ConsumerService {
    /// Spawns the consumption loop on the current tokio runtime.
    pub fn start(
        config: ThrottlerConfig,
        connector: QueueConnectorBox,
        ledger: Arc<Ledger>,
    ) -> Result<RunningConsumer> {
        let consumer = ConsumptionLoop::new(config, connector, ledger)?;
        let stats = consumer.stats();
        let (shutdown, signal) = watch::channel(false);
        let handle = tokio::spawn(consumer.run(signal));
        Ok(RunningConsumer {
            shutdown,
            handle,
            stats,
        })
    }
}

/// Handle to a consumer started with [`ConsumerService::start`].
pub struct RunningConsumer {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<StatsSnapshot>,
    stats: Arc<LoopStats>,
}

impl RunningConsumer {
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn state(&self) -> LoopState {
        self.stats.state()
    }

    /// `true` once the loop task has exited, normally or by panicking.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits until `expected` payloads have been handled, then stops the loop.
    ///
    /// Returns early with an error if the loop task dies before that.
    pub async fn drain(self, expected: u64) -> Result<StatsSnapshot> {
        while self.stats().handled() < expected {
            if self.is_finished() {
                let stats = self.stop().await?;
                return Err(ThrottlerError::TaskError(format!(
                    "consumer exited after handling {} of {} payloads",
                    stats.handled(),
                    expected
                )));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.stop().await
    }

    /// Signals the loop to stop, interrupting a blocked pop, and waits for it.
    pub async fn stop(self) -> Result<StatsSnapshot> {
        // The loop may already have exited; a closed channel is fine.
        let _ = self.shutdown.send(true);
        self.handle
            .await
            .map_err(|e| ThrottlerError::TaskError(e.to_string()))
    }
}
