use crate::error::ThrottlerError;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

// Absorbs float drift from converting deficits to sleep durations and back.
const TOKEN_EPSILON: f64 = 1e-9;

/// Token bucket state for the gate.
#[derive(Debug)]
struct TokenBucket {
    /// Accumulated (fractional) tokens, never above capacity.
    tokens: f64,
    /// Last time tokens were credited.
    last_refill: Instant,
}

impl TokenBucket {
    fn refill(&mut self, now: Instant, rate: f64, capacity: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.last_refill = now;
    }

    fn take(&mut self) -> bool {
        if self.tokens >= 1.0 - TOKEN_EPSILON {
            self.tokens = (self.tokens - 1.0).max(0.0);
            true
        } else {
            false
        }
    }
}

/// Token-bucket admission gate in front of the ledger.
///
/// Tokens accrue continuously at `rate` per second into a reservoir holding
/// one second's worth (at least one token), so idle periods buy a short
/// burst while long-run admissions converge to `rate`. Admission is delayed,
/// never refused. Waiters are served in arrival order.
#[derive(Debug)]
pub struct AdmissionGate {
    rate: f64,
    capacity: f64,
    bucket: Mutex<TokenBucket>,
}

impl AdmissionGate {
    /// Creates a gate admitting `rate_per_second` calls per second on average.
    /// The first call is admitted immediately.
    pub fn new(rate_per_second: f64) -> Result<Self, ThrottlerError> {
        if !rate_per_second.is_finite() || rate_per_second <= 0.0 {
            return Err(ThrottlerError::ConfigError(format!(
                "admission rate must be a positive number, got {}",
                rate_per_second
            )));
        }
        // One token's refill time must be representable as a sleep.
        if Duration::try_from_secs_f64(1.0 / rate_per_second).is_err() {
            return Err(ThrottlerError::ConfigError(format!(
                "admission rate {} is too small to schedule",
                rate_per_second
            )));
        }
        Ok(Self {
            rate: rate_per_second,
            capacity: rate_per_second.max(1.0),
            bucket: Mutex::new(TokenBucket {
                tokens: 1.0,
                last_refill: Instant::now(),
            }),
        })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Size of the reservoir in tokens.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Waits until a token is available and consumes it. Returns how long the
    /// caller was held back.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();
        let mut bucket = self.bucket.lock().await;
        loop {
            bucket.refill(Instant::now(), self.rate, self.capacity);
            if bucket.take() {
                let waited = started.elapsed();
                trace!(?waited, tokens = bucket.tokens, "Admission granted");
                return waited;
            }
            let deficit = 1.0 - bucket.tokens;
            let pause = Duration::try_from_secs_f64(deficit / self.rate).unwrap_or(Duration::MAX);
            tokio::time::sleep(pause).await;
        }
    }

    /// Consumes a token only if one is available right now and nobody is
    /// already waiting for one.
    pub fn try_acquire(&self) -> bool {
        match self.bucket.try_lock() {
            Ok(mut bucket) => {
                bucket.refill(Instant::now(), self.rate, self.capacity);
                bucket.take()
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_rejects_invalid_rates() {
        assert!(AdmissionGate::new(0.0).is_err());
        assert!(AdmissionGate::new(-5.0).is_err());
        assert!(AdmissionGate::new(f64::NAN).is_err());
    }

    #[test]
    fn test_rejects_rates_too_small_to_schedule() {
        assert!(matches!(
            AdmissionGate::new(1e-20),
            Err(ThrottlerError::ConfigError(_))
        ));
        assert!(AdmissionGate::new(1e-6).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slowest_accepted_rate_waits_instead_of_panicking() {
        let gate = Arc::new(AdmissionGate::new(1e-6).unwrap());
        gate.acquire().await;

        let waiter = tokio::spawn({
            let gate = gate.clone();
            async move { gate.acquire().await }
        });
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(!waiter.is_finished());
        waiter.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_is_immediate() {
        let gate = AdmissionGate::new(1.0).unwrap();
        assert_eq!(gate.acquire().await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_acquires_respect_rate() {
        let gate = AdmissionGate::new(10.0).unwrap();
        let started = Instant::now();
        for _ in 0..21 {
            gate.acquire().await;
        }
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1990), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(2100), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fractional_rate() {
        let gate = AdmissionGate::new(0.5).unwrap();
        assert_eq!(gate.capacity(), 1.0);
        gate.acquire().await;
        let waited = gate.acquire().await;
        assert!(waited >= Duration::from_millis(1990));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_gate_allows_burst_up_to_capacity() {
        let gate = AdmissionGate::new(4.0).unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;

        for _ in 0..4 {
            assert!(gate.try_acquire());
        }
        assert!(!gate.try_acquire());

        let waited = gate.acquire().await;
        assert!(waited >= Duration::from_millis(245));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_share_the_rate() {
        let gate = Arc::new(AdmissionGate::new(5.0).unwrap());
        let started = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..10 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move { gate.acquire().await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(started.elapsed() >= Duration::from_millis(1800));
    }
}
