//! Token-bucket rate limiting for provider API calls.
//!
//! Each named resource (typically one per provider) gets an independent
//! bucket holding up to `burst` tokens, refilled continuously at
//! `requests_per_second`. Waiting callers block until a token is available,
//! their configured timeout elapses, or their cancellation token fires — the
//! three outcomes are distinguishable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};

/// Parameters for one token bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    /// Steady-state refill rate.
    pub requests_per_second: f64,

    /// Maximum number of tokens the bucket can hold.
    pub burst: u32,

    /// How long `wait` may block before giving up.
    pub timeout: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 5.0,
            burst: 10,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Observable state of one limiter, for diagnostics.
#[derive(Debug, Clone)]
pub struct RateLimiterState {
    pub name: String,
    pub requests_per_second: f64,
    pub burst: u32,
    pub timeout: Duration,
    pub current_tokens: f64,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    config: RateLimiterConfig,
}

impl Bucket {
    /// Credits tokens accrued since the last refill, clamped to burst.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        let burst = f64::from(self.config.burst);
        self.tokens = (self.tokens + elapsed * self.config.requests_per_second).min(burst);
        self.last_refill = now;
    }
}

/// A token-bucket rate limiter for one named resource.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Creates a limiter with a full bucket.
    pub fn new(name: impl Into<String>, config: RateLimiterConfig) -> Self {
        Self {
            name: name.into(),
            bucket: Mutex::new(Bucket {
                tokens: f64::from(config.burst),
                last_refill: Instant::now(),
                config,
            }),
        }
    }

    /// The resource name this limiter guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Non-blocking probe: takes a token if one is available.
    pub fn allow(&self) -> bool {
        let mut bucket = self.bucket.lock().expect("rate limiter lock poisoned");
        bucket.refill(Instant::now());
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Current token count, after refill.
    pub fn tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock().expect("rate limiter lock poisoned");
        bucket.refill(Instant::now());
        bucket.tokens
    }

    /// Snapshot of the limiter's configuration and fill level.
    pub fn state(&self) -> RateLimiterState {
        let mut bucket = self.bucket.lock().expect("rate limiter lock poisoned");
        bucket.refill(Instant::now());
        RateLimiterState {
            name: self.name.clone(),
            requests_per_second: bucket.config.requests_per_second,
            burst: bucket.config.burst,
            timeout: bucket.config.timeout,
            current_tokens: bucket.tokens,
        }
    }

    /// Replaces the limiter's configuration in place.
    ///
    /// Accumulated tokens are preserved, clamped to the new burst.
    pub fn update(&self, config: RateLimiterConfig) {
        let mut bucket = self.bucket.lock().expect("rate limiter lock poisoned");
        bucket.refill(Instant::now());
        bucket.tokens = bucket.tokens.min(f64::from(config.burst));
        bucket.config = config;
    }

    /// Blocks until a token is available.
    ///
    /// Returns [`Error::RateLimitTimeout`] when the configured timeout
    /// elapses first, or [`Error::Cancelled`] when the token fires first.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        let started = Instant::now();

        loop {
            let (acquired, deficit, config) = {
                let mut bucket = self.bucket.lock().expect("rate limiter lock poisoned");
                bucket.refill(Instant::now());
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    (true, 0.0, bucket.config.clone())
                } else {
                    (false, 1.0 - bucket.tokens, bucket.config.clone())
                }
            };
            if acquired {
                return Ok(());
            }

            let waited = started.elapsed();
            let Some(remaining) = config.timeout.checked_sub(waited) else {
                debug!(limiter = %self.name, waited_ms = waited.as_millis() as u64, "rate limiter wait timed out");
                return Err(Error::RateLimitTimeout {
                    name: self.name.clone(),
                    waited_ms: waited.as_millis() as u64,
                });
            };

            // Sleep until the deficit should be refilled, but never past the
            // deadline; re-check the bucket afterwards since other waiters
            // compete for the same tokens.
            let until_token = (deficit / config.requests_per_second.max(f64::MIN_POSITIVE))
                .min(remaining.as_secs_f64());
            let sleep_for = Duration::from_secs_f64(until_token).max(Duration::from_millis(1));

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
    }
}

/// Indexes rate limiters by resource name.
///
/// Each provider (or finer-grained endpoint) gets an independent bucket;
/// reconfiguring an existing name updates the bucket in place without losing
/// accumulated tokens.
#[derive(Debug)]
pub struct RateLimiterManager {
    default_config: RateLimiterConfig,
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl RateLimiterManager {
    pub fn new(default_config: RateLimiterConfig) -> Self {
        Self {
            default_config,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the limiter for `name`, creating it with the default
    /// configuration on first use.
    pub fn get(&self, name: &str) -> Arc<RateLimiter> {
        let mut limiters = self.limiters.lock().expect("limiter map lock poisoned");
        limiters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::new(name, self.default_config.clone())))
            .clone()
    }

    /// Creates or reconfigures the limiter for `name`.
    pub fn configure(&self, name: &str, config: RateLimiterConfig) -> Arc<RateLimiter> {
        let mut limiters = self.limiters.lock().expect("limiter map lock poisoned");
        match limiters.get(name) {
            Some(limiter) => {
                limiter.update(config);
                limiter.clone()
            }
            None => {
                let limiter = Arc::new(RateLimiter::new(name, config));
                limiters.insert(name.to_string(), limiter.clone());
                limiter
            }
        }
    }

    /// Snapshots every managed limiter.
    pub fn states(&self) -> Vec<RateLimiterState> {
        let limiters = self.limiters.lock().expect("limiter map lock poisoned");
        limiters.values().map(|l| l.state()).collect()
    }
}
