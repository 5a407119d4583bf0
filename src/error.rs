use thiserror::Error;

/// Failure to turn a queue payload back into a `PaymentRequest`.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("payload truncated: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("payload tag mismatch: found {found:?}")]
    TagMismatch { found: [u8; 4] },
    #[error("unsupported payload version {0}")]
    UnsupportedVersion(u8),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("decoded payment is invalid: {0}")]
    Invalid(String),
}

/// The backing store is unavailable or the unit of work was aborted.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    Backend(#[from] rocksdb::Error),
}

/// Connectivity failures against the queue transport.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("could not connect to queue: {0}")]
    Connect(String),
    #[error("queue command failed: {0}")]
    Command(String),
    #[error("queue connection closed")]
    Closed,
}

#[cfg(feature = "queue-redis")]
impl From<redis::RedisError> for TransportError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Command(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum ThrottlerError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Consumer task failed: {0}")]
    TaskError(String),
}

pub type Result<T> = std::result::Result<T, ThrottlerError>;
