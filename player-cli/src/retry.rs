// Engine-side reload policy. A failed load is tried again only when the
// loader marked it retryable, spaced out by the delays from the loader
// configuration the engine was given.

use std::future::Future;
use std::time::Duration;

use rand::RngExt;
use segment_loader::LoaderConfig;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Reloads allowed after the first load.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
    /// Draw each delay from its upper half instead of using it as is.
    pub jitter: bool,
}

impl From<&LoaderConfig> for RetryPolicy {
    fn from(config: &LoaderConfig) -> Self {
        Self {
            max_retries: config.max_retry,
            retry_delay: config.retry_delay,
            max_retry_delay: config.max_retry_delay,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before reload number `retry` (1-based):
    /// `retry_delay * 2^(retry - 1)`, capped at `max_retry_delay`.
    pub fn delay_before(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let delay = self
            .retry_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_retry_delay);

        if !self.jitter {
            return delay;
        }

        let floor = delay / 2;
        let spread_ms = u64::try_from((delay - floor).as_millis()).unwrap_or(u64::MAX);
        if spread_ms == 0 {
            return delay;
        }
        let jitter_ms = rand::rng().random_range(0..=spread_ms);
        (floor + Duration::from_millis(jitter_ms)).min(delay)
    }
}

/// Run `load` until it succeeds, fails with a non-retryable error, runs out of
/// reloads, or `token` is cancelled. `load` receives the reload count, `0` for
/// the first attempt.
pub async fn reload_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    mut load: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0;
    loop {
        if token.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let err = match load(retry).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_retryable() || retry >= policy.max_retries {
            return Err(err);
        }

        retry += 1;
        let delay = policy.delay_before(retry);
        warn!(
            retry,
            max_retry = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Reloading after retryable failure"
        );
        tokio::select! {
            _ = token.cancelled() => return Err(AppError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
