use std::{future::Future, time::Duration};

use log::*;

use crate::RazorpayApiError;

/// Bounded exponential backoff. Only indeterminate failures (timeouts, transport errors, 5xx) are retried.
///
/// This must only wrap idempotent requests. Creating orders and refunds is never retried automatically.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(250), max_delay: Duration::from_secs(2) }
    }
}

impl RetryPolicy {
    pub fn no_retries() -> Self {
        Self { max_attempts: 1, ..Default::default() }
    }

    /// The delay before the given retry (1-based), capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub async fn run<T, F, Fut>(&self, label: &str, mut f: F) -> Result<T, RazorpayApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RazorpayApiError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_indeterminate() && attempt < attempts => {
                    let delay = self.delay_for(attempt);
                    warn!("💳️ {label} failed on attempt {attempt}/{attempts}: {e}. Retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }
}
