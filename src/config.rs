//! Configuration for the throttled consumer.

use crate::error::ThrottlerError;
use std::time::Duration;

/// Default name of the shared work queue.
pub const DEFAULT_QUEUE_KEY: &str = "appQueue";

/// Values consumed by the consumer service. Loading them is the caller's job.
#[derive(Debug, Clone)]
pub struct ThrottlerConfig {
    /// Queue connection endpoint.
    pub queue_url: String,

    /// Name of the list payments are drained from.
    pub queue_key: String,

    /// Inactivity timeout for a blocking pop. `None` waits forever.
    pub connection_timeout: Option<Duration>,

    /// Sustained admissions per second into the ledger.
    pub rate_limit_per_second: f64,

    /// Pause before reconnecting after a failure. Timeout-driven reconnects
    /// do not wait.
    pub error_backoff: Duration,
}

impl Default for ThrottlerConfig {
    fn default() -> Self {
        Self {
            queue_url: "redis://127.0.0.1:6379".to_string(),
            queue_key: DEFAULT_QUEUE_KEY.to_string(),
            connection_timeout: Some(Duration::from_secs(30)),
            rate_limit_per_second: 10.0,
            error_backoff: Duration::from_millis(500),
        }
    }
}

impl ThrottlerConfig {
    /// Builder-style: set the sustained admission rate
    pub fn rate(mut self, rate_limit_per_second: f64) -> Self {
        self.rate_limit_per_second = rate_limit_per_second;
        self
    }

    /// Builder-style: set the inactivity timeout in whole seconds (0 = disabled)
    pub fn timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout = (seconds > 0).then(|| Duration::from_secs(seconds));
        self
    }

    /// Builder-style: set the inactivity timeout
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connection_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    /// Builder-style: set the queue key
    pub fn queue_key(mut self, key: impl Into<String>) -> Self {
        self.queue_key = key.into();
        self
    }

    /// Builder-style: set the queue endpoint
    pub fn queue_url(mut self, url: impl Into<String>) -> Self {
        self.queue_url = url.into();
        self
    }

    /// Builder-style: set the failure backoff
    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ThrottlerError> {
        if !self.rate_limit_per_second.is_finite() || self.rate_limit_per_second <= 0.0 {
            return Err(ThrottlerError::ConfigError(format!(
                "rate limit must be a positive number, got {}",
                self.rate_limit_per_second
            )));
        }
        if Duration::try_from_secs_f64(1.0 / self.rate_limit_per_second).is_err() {
            return Err(ThrottlerError::ConfigError(format!(
                "rate limit {} is too small to schedule",
                self.rate_limit_per_second
            )));
        }
        if self.queue_key.is_empty() {
            return Err(ThrottlerError::ConfigError(
                "queue key must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
