//! Exponential backoff retry for provider API calls.
//!
//! Backoff grows as `initial_backoff * backoff_factor^(attempt-1)`, capped at
//! `max_backoff`, with optional jitter. The backoff sleep is cancellable: a
//! fired cancellation token aborts the loop mid-sleep with
//! [`Error::Cancelled`].

use std::future::Future;
use std::hash::{Hash, Hasher};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};

/// Configuration for exponential backoff retry.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the initial one.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub initial_backoff: Duration,

    /// Multiplier for exponential growth (typically 2.0).
    pub backoff_factor: f64,

    /// Cap on the computed backoff.
    pub max_backoff: Duration,

    /// Apply ±5-10% jitter to each backoff.
    pub jitter: bool,
}

impl RetryConfig {
    /// Default retry configuration for provider API calls:
    /// 3 attempts with 1s, 2s backoffs, capped at 30s, jittered.
    pub const DEFAULT: Self = Self {
        max_attempts: 3,
        initial_backoff: Duration::from_secs(1),
        backoff_factor: 2.0,
        max_backoff: Duration::from_secs(30),
        jitter: true,
    };

    /// Computes the backoff before retry number `attempt` (1-based, i.e. the
    /// number of attempts already made), without jitter.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let multiplier = self.backoff_factor.powi(exponent as i32);
        let backoff = self.initial_backoff.as_secs_f64() * multiplier;
        Duration::from_secs_f64(backoff.min(self.max_backoff.as_secs_f64()))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Invokes `operation` up to `config.max_attempts` times.
///
/// The loop stops immediately, with no further attempts, when:
/// - `should_retry` returns false for the most recent error, or
/// - the cancellation token fires (including mid-backoff-sleep).
///
/// On exhaustion the last error is wrapped in [`Error::RetryExhausted`] with
/// the attempt count.
pub async fn retry<T, F, Fut, P>(
    cancel: &CancellationToken,
    config: &RetryConfig,
    should_retry: P,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&Error) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err) => {
                if !should_retry(&err) {
                    return Err(err);
                }
                if attempt >= max_attempts {
                    return Err(Error::RetryExhausted {
                        attempts: attempt,
                        source: Box::new(err),
                    });
                }

                let mut backoff = config.backoff_for_attempt(attempt);
                if config.jitter {
                    backoff = apply_jitter(backoff, attempt);
                }
                debug!(
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "retrying after backoff"
                );

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }
}

/// Applies ±5-10% jitter to a backoff.
///
/// The offset is derived from a hash of the attempt number and the current
/// wall clock's sub-second component, spreading concurrent retry loops apart
/// without a dedicated RNG.
fn apply_jitter(backoff: Duration, attempt: u32) -> Duration {
    let mut hasher = std::hash::DefaultHasher::new();
    attempt.hash(&mut hasher);
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos()
        .hash(&mut hasher);
    let hash = hasher.finish();

    // magnitude in [0.05, 0.10), sign from the low bit
    let magnitude = 0.05 + ((hash >> 1) % 1000) as f64 / 1000.0 * 0.05;
    let factor = if hash & 1 == 0 {
        1.0 + magnitude
    } else {
        1.0 - magnitude
    };
    Duration::from_secs_f64(backoff.as_secs_f64() * factor)
}
