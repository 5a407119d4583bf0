use clap::Parser;
use microthrottler::application::consumer::ConsumerService;
use microthrottler::application::ledger::Ledger;
use microthrottler::config::{DEFAULT_QUEUE_KEY, ThrottlerConfig};
use microthrottler::domain::ports::LedgerStoreBox;
use microthrottler::infrastructure::in_memory::InMemoryLedgerStore;
use microthrottler::infrastructure::memory_queue::InMemoryQueue;
use microthrottler::interfaces::codec;
use microthrottler::interfaces::csv::balance_writer::BalanceWriter;
use microthrottler::interfaces::csv::payment_reader::PaymentReader;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Payments CSV (client, payment, amount) to push through the consumer.
    /// Without it the service drains the configured queue until Ctrl-C.
    input: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Queue connection endpoint
    #[arg(long, env = "MICROTHROTTLER_QUEUE_URL", default_value = "redis://127.0.0.1:6379")]
    queue_url: String,

    /// Name of the list payments are drained from
    #[arg(long, env = "MICROTHROTTLER_QUEUE_KEY", default_value = DEFAULT_QUEUE_KEY)]
    queue_key: String,

    /// Inactivity timeout for the blocking pop, in seconds (0 = wait forever)
    #[arg(long, env = "MICROTHROTTLER_CONNECTION_TIMEOUT_SECS", default_value_t = 30)]
    connection_timeout_secs: u64,

    /// Sustained admissions per second into the ledger
    #[arg(long, env = "MICROTHROTTLER_RATE_LIMIT", default_value_t = 10.0)]
    rate_limit_per_second: f64,
}

impl Cli {
    fn config(&self) -> ThrottlerConfig {
        ThrottlerConfig::default()
            .queue_url(self.queue_url.clone())
            .queue_key(self.queue_key.clone())
            .timeout_secs(self.connection_timeout_secs)
            .rate(self.rate_limit_per_second)
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();
}

fn open_store(db_path: Option<PathBuf>) -> Result<LedgerStoreBox> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = microthrottler::infrastructure::rocksdb::RocksDBStore::open(path)
                .into_diagnostic()?;
            Ok(Box::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            warn!(
                "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
            );
            Ok(Box::new(InMemoryLedgerStore::new()))
        }
        None => Ok(Box::new(InMemoryLedgerStore::new())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.config();
    config.validate().into_diagnostic()?;

    let ledger = Arc::new(Ledger::new(open_store(cli.db_path.clone())?));

    match cli.input {
        Some(input) => run_batch(input, config, ledger).await,
        None => run_service(config, ledger).await,
    }
}

/// Plays the producer for every CSV row, drains the queue, then prints balances.
async fn run_batch(input: PathBuf, config: ThrottlerConfig, ledger: Arc<Ledger>) -> Result<()> {
    let queue = InMemoryQueue::new();
    let file = File::open(input).into_diagnostic()?;

    let mut pushed = 0u64;
    for payment in PaymentReader::new(file).payments() {
        match payment {
            Ok(request) => {
                queue.push(&request.client_id().to_string(), b"attempt".to_vec());
                queue.push(&config.queue_key, codec::encode(&request));
                pushed += 1;
            }
            Err(e) => {
                warn!("Error reading payment: {}", e);
            }
        }
    }
    info!(pushed, "Queued payments from input");

    let running =
        ConsumerService::start(config, Box::new(queue), ledger.clone()).into_diagnostic()?;
    let stats = running.drain(pushed).await.into_diagnostic()?;
    info!(?stats, "Consumer drained the input");

    let balances = ledger.balances().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = BalanceWriter::new(stdout.lock());
    writer.write_balances(balances).into_diagnostic()?;

    Ok(())
}

#[cfg(feature = "queue-redis")]
async fn run_service(config: ThrottlerConfig, ledger: Arc<Ledger>) -> Result<()> {
    let connector = microthrottler::infrastructure::redis::RedisConnector::open(&config.queue_url)
        .into_diagnostic()?;
    let running = ConsumerService::start(config, Box::new(connector), ledger).into_diagnostic()?;

    tokio::signal::ctrl_c().await.into_diagnostic()?;
    info!("Shutdown requested");
    let stats = running.stop().await.into_diagnostic()?;
    info!(?stats, "Consumer stopped");
    Ok(())
}

#[cfg(not(feature = "queue-redis"))]
async fn run_service(_config: ThrottlerConfig, _ledger: Arc<Ledger>) -> Result<()> {
    Err(miette::miette!(
        "No INPUT given and the 'queue-redis' feature is not enabled; nothing to consume."
    ))
}
