//! Exponential backoff with jitter for transient backend failures.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Retry behaviour for backend calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = single attempt)
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8000,
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay_ms(mut self, delay_ms: u64) -> Self {
        self.initial_delay_ms = delay_ms;
        self
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Delay before retry number `attempt` (1-indexed; 0 yields no delay).
    ///
    /// `initial * base^(attempt-1)`, capped at `max_delay_ms`, plus up to 50%
    /// random jitter.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay =
            self.initial_delay_ms as f64 * self.exponential_base.powi((attempt - 1) as i32);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let jitter = rand::rng().random_range(0.0..0.5) * capped_delay;
        Duration::from_millis((capped_delay + jitter) as u64)
    }
}

/// Outcome of [`with_retry`] plus the number of attempts it took.
#[derive(Debug, Clone)]
pub struct RetryResult<T, E> {
    pub result: Result<T, E>,
    pub attempts: usize,
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy runs out of retries.
///
/// `on_retry(attempt, &error, delay)` is called before each backoff sleep.
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: impl Fn(&E) -> bool,
    mut on_retry: impl FnMut(usize, &E, Duration),
) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_retries + 1;
    let mut attempts = 0;

    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => {
                return RetryResult {
                    result: Ok(value),
                    attempts,
                };
            }
            Err(error) if attempts < max_attempts && is_retryable(&error) => {
                let delay = policy.delay_for_attempt(attempts);
                on_retry(attempts, &error, delay);
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                return RetryResult {
                    result: Err(error),
                    attempts,
                };
            }
        }
    }
}
