//! Per-source admission control.
//!
//! Each external source gets its own token bucket: `capacity` permits may be
//! taken in a burst, after which permits come back at `refill_rate` per second.
//! The bucket is backed by a `governor` GCRA limiter, which is the token bucket
//! expressed as a single atomically updated timestamp, so refill-and-take is one
//! indivisible step even with many concurrent callers.
//!
//! Waiting is poll-with-sleep: a caller that finds the bucket empty sleeps a
//! short interval and retries until its timeout. There is no fairness between
//! waiters; under heavy contention a caller may starve until its timeout.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as Gcra};
use nonzero_ext::nonzero;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{BucketConfig, ConfigError};

/// Interval between acquisition attempts while waiting for a permit
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A single-resource rate limiter
pub struct TokenBucket {
    limiter: DefaultDirectRateLimiter,
    capacity: u32,
    refill_rate: f64,
}

impl TokenBucket {
    /// Create a full bucket
    pub fn new(config: BucketConfig) -> Result<Self, ConfigError> {
        if !(config.refill_rate.is_finite() && config.refill_rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "refill rate must be positive, got {}",
                config.refill_rate
            )));
        }
        let burst = NonZeroU32::new(config.capacity).unwrap_or(nonzero!(1u32));
        let period = Duration::from_secs_f64(1.0 / config.refill_rate);
        let quota = Quota::with_period(period)
            .ok_or_else(|| ConfigError::Invalid("refill period rounds to zero".to_string()))?
            .allow_burst(burst);

        Ok(Self {
            limiter: Gcra::direct(quota),
            capacity: burst.get(),
            refill_rate: config.refill_rate,
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Take a permit if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Wait up to `timeout` for a permit; returns whether one was granted
    ///
    /// At least one attempt is always made, so a zero timeout still succeeds
    /// when a permit is immediately available.
    pub async fn acquire(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_acquire() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.capacity)
            .field("refill_rate", &self.refill_rate)
            .finish()
    }
}

/// Routes acquisitions to the bucket configured for each source
///
/// Sources without a configured bucket are never throttled.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: HashMap<String, TokenBucket>,
}

impl RateLimiter {
    /// Build one bucket per configured source
    pub fn new(limits: &HashMap<String, BucketConfig>) -> Result<Self, ConfigError> {
        let buckets = limits
            .iter()
            .map(|(source, config)| Ok((source.clone(), TokenBucket::new(*config)?)))
            .collect::<Result<HashMap<_, _>, ConfigError>>()?;
        Ok(Self { buckets })
    }

    /// A limiter that throttles nothing
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Wait up to `timeout` for a permit for `source`
    pub async fn acquire(&self, source: &str, timeout: Duration) -> bool {
        match self.buckets.get(source) {
            Some(bucket) => bucket.acquire(timeout).await,
            None => true,
        }
    }

    /// Bucket for a source, if one is configured
    pub fn bucket(&self, source: &str) -> Option<&TokenBucket> {
        self.buckets.get(source)
    }
}
