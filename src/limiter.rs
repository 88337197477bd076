// src/limiter.rs

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LimiterError {
    #[error("requested {requested} tokens exceeds limiter burst {burst}")]
    ExceedsBurst { requested: u64, burst: u64 },
}

/// Admission gate consumed by the read loops.
///
/// `acquire` resolves once `cost` units have been granted. Callers that need
/// cancellation race it against their own token; dropping the future before it
/// resolves must not consume anything.
pub trait RateLimiter: Send + Sync {
    fn acquire(&self, cost: u64) -> impl Future<Output = Result<(), LimiterError>> + Send;
}

/// A token bucket for rate limiting, shared across multiple tasks.
#[derive(Clone)]
pub struct SpeedLimiter {
    state: Arc<Mutex<TokenBucket>>,
    granted: Arc<AtomicU64>,
}

/// The internal state of the token bucket.
struct TokenBucket {
    /// The maximum number of tokens (bytes) the bucket can hold. This controls burstiness.
    capacity: u64,
    /// The current number of tokens (bytes) in the bucket.
    tokens: u64,
    /// The rate at which tokens are added to the bucket, in tokens per second.
    rate: u64,
    /// The last time the bucket was refilled with tokens.
    last_refill: Instant,
}

impl SpeedLimiter {
    /// Creates a limiter whose burst equals its rate.
    /// A rate of 0 means the limiter is disabled (unlimited speed).
    pub fn new(rate_bytes_per_sec: u64) -> Self {
        Self::with_burst(rate_bytes_per_sec, rate_bytes_per_sec)
    }

    /// Creates a limiter refilling at `rate_bytes_per_sec` and holding at most `burst` tokens.
    pub fn with_burst(rate_bytes_per_sec: u64, burst: u64) -> Self {
        let capacity = if rate_bytes_per_sec == 0 {
            u64::MAX // Effectively infinite capacity if unlimited
        } else {
            burst
        };

        Self {
            state: Arc::new(Mutex::new(TokenBucket {
                capacity,
                tokens: capacity, // Start with a full bucket
                rate: rate_bytes_per_sec,
                last_refill: Instant::now(),
            })),
            granted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Total tokens handed out since creation.
    pub fn granted(&self) -> u64 {
        self.granted.load(Ordering::Relaxed)
    }

    /// Asynchronously takes `amount` tokens from the bucket, waiting if necessary.
    ///
    /// Fails immediately if `amount` could never fit in the bucket.
    pub async fn take(&self, amount: u64) -> Result<(), LimiterError> {
        if amount == 0 {
            return Ok(());
        }

        loop {
            let mut bucket = self.state.lock().await;

            if amount > bucket.capacity {
                return Err(LimiterError::ExceedsBurst {
                    requested: amount,
                    burst: bucket.capacity,
                });
            }

            bucket.refill();

            if bucket.tokens >= amount {
                bucket.tokens -= amount;
                self.granted.fetch_add(amount, Ordering::Relaxed);
                return Ok(());
            }

            let tokens_needed = amount - bucket.tokens;
            let wait_time = if bucket.rate > 0 {
                Duration::from_secs_f64(tokens_needed as f64 / bucket.rate as f64)
            } else {
                Duration::from_secs(0)
            };

            // Never sleep while holding the bucket.
            drop(bucket);
            tokio::time::sleep(wait_time).await;
        }
    }
}

impl RateLimiter for SpeedLimiter {
    fn acquire(&self, cost: u64) -> impl Future<Output = Result<(), LimiterError>> + Send {
        self.take(cost)
    }
}

impl TokenBucket {
    /// Adds tokens to the bucket based on elapsed time.
    fn refill(&mut self) {
        if self.rate == 0 {
            self.tokens = self.capacity;
            return;
        }

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        let tokens_to_add = (elapsed.as_secs_f64() * self.rate as f64) as u64;

        if tokens_to_add > 0 {
            self.tokens = self.tokens.saturating_add(tokens_to_add).min(self.capacity);
            self.last_refill = now;
        }
    }
}
