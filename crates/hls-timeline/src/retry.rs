// Caller-side retry with exponential backoff and jitter. The sequencer never
// retries on its own; the follower and fetcher wrap their calls with this.

use rand::RngExt;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{FetchError, SequencerError};

/// Backoff schedule for caller-side retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// First delay; doubles with every retry.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Spread delays by up to half the base delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Wait before retry `attempt`, counting from zero. Never exceeds
    /// `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        if !self.jitter {
            return backoff;
        }

        let spread = (self.base_delay / 2).min(self.max_delay.saturating_sub(backoff));
        if spread.is_zero() {
            return backoff;
        }
        backoff + spread.mul_f64(rand::rng().random_range(0.0..1.0))
    }
}

/// Outcome of a single attempt.
pub enum RetryAction<T, E> {
    Success(T),
    /// Transient failure, worth another attempt.
    Retry(E),
    /// Permanent failure.
    Fail(E),
}

/// Errors that have a "cancelled" form.
pub trait Cancellable {
    fn cancelled() -> Self;
}

impl Cancellable for FetchError {
    fn cancelled() -> Self {
        Self::Cancelled
    }
}

impl Cancellable for SequencerError {
    fn cancelled() -> Self {
        Self::Cancelled
    }
}

/// Runs `operation` until it succeeds, fails permanently, runs out of
/// retries or `token` is cancelled.
///
/// The closure receives the current attempt number (0-indexed).
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: F,
) -> Result<T, E>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = RetryAction<T, E>>,
    E: Cancellable + Display,
{
    let mut attempt = 0;
    loop {
        if token.is_cancelled() {
            return Err(E::cancelled());
        }

        let err = match operation(attempt).await {
            RetryAction::Success(value) => return Ok(value),
            RetryAction::Fail(err) => return Err(err),
            RetryAction::Retry(err) if attempt >= policy.max_retries => return Err(err),
            RetryAction::Retry(err) => err,
        };

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            attempt = attempt + 1,
            max = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying after transient error"
        );
        tokio::select! {
            _ = token.cancelled() => return Err(E::cancelled()),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
