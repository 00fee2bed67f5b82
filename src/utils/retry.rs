// src/utils/retry.rs

//! Exponential backoff with jitter for transient failures.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::{AppError, Result};
use crate::models::RetryConfig;
use crate::services::ExecutionBudget;

/// Bounded retry for one unit of work.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    rate_limit_delay: Duration,
    budget: Option<Arc<ExecutionBudget>>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            rate_limit_delay: max_delay,
            budget: None,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
        .with_rate_limit_delay(Duration::from_millis(config.rate_limit_delay_ms))
    }

    /// Base delay after a throttling response that carries no retry hint.
    pub fn with_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_delay = delay;
        self
    }

    /// Stop retrying once a backoff would sleep past the run budget.
    pub fn bounded_by(mut self, budget: Arc<ExecutionBudget>) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `attempt` (0-based), jittered into
    /// `[d/2, d]` where `d = base * 2^attempt` capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        jittered(self.base_delay, self.max_delay, attempt)
    }

    /// Delay before retry number `attempt` after an unhinted throttle.
    ///
    /// Starts at `rate_limit_delay` and doubles, capped at the larger of
    /// `max_delay` and four times the rate-limit base. Never shorter than
    /// half the rate-limit base.
    pub fn rate_limit_backoff(&self, attempt: u32) -> Duration {
        let cap = self.max_delay.max(self.rate_limit_delay.saturating_mul(4));
        jittered(self.rate_limit_delay, cap, attempt)
    }

    /// Wait before retrying `err`. A server hint is taken as given; the run
    /// budget is the only bound on it.
    fn delay_for(&self, err: &AppError, attempt: u32) -> Duration {
        match (err, err.retry_after()) {
            (_, Some(hint)) => hint,
            (AppError::RateLimited { .. }, None) => self.rate_limit_backoff(attempt),
            _ => self.backoff_delay(attempt),
        }
    }

    /// Run `op` until it succeeds, fails permanently or attempts run out.
    pub async fn retry<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            attempt += 1;
            if !err.is_retryable() || attempt >= self.max_attempts {
                return Err(err);
            }

            let delay = self.delay_for(&err, attempt - 1);
            if let Some(budget) = &self.budget
                && budget.remaining() <= delay
            {
                log::debug!("{label}: no budget left to retry after {err}");
                return Err(err);
            }

            log::warn!(
                "{label}: attempt {attempt}/{} failed ({err}); retrying in {}ms",
                self.max_attempts,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// `base * 2^attempt`, capped at `cap`, jittered into `[d/2, d]`.
fn jittered(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let base = base.as_millis() as u64;
    let cap = cap.as_millis() as u64;
    let exp = base.saturating_mul(2u64.saturating_pow(attempt.min(16)));
    let ceiling = exp.min(cap);
    let floor = ceiling / 2;
    Duration::from_millis(rand::rng().random_range(floor..=ceiling))
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
