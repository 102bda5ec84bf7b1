use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Exponential backoff retry.
///
/// Every error is retryable. The wait before attempt `k` (`k >= 2`) is
/// `min(base * 2^(k-2), max)`; there is no wait before the first attempt.
/// The policy holds no per-call state, so one value can serve every chunk.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

/// A value produced by [`RetryPolicy::run`] and what it cost.
#[derive(Debug)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
    /// Error of the attempt preceding the successful one, if any failed.
    pub last_error: Option<Error>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait imposed before attempt number `attempt` (1-based).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = attempt - 2;
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay)
    }

    /// The full wait schedule, one entry per retry.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (2..=self.max_attempts).map(|attempt| self.delay_before(attempt))
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// `op` receives the 1-based attempt number. Exhaustion yields
    /// [`Error::RetryExhausted`] wrapping the last error.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<Attempted<T>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1u32;
        let mut last_error = None;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                        last_error,
                    })
                }
                Err(error) => {
                    #[cfg(feature = "tracing")]
                    tracing::event!(
                        tracing::Level::WARN,
                        event = "bulkpipe.retry.attempt_failed",
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        error = %error,
                        "bulkpipe.retry.attempt_failed"
                    );

                    if attempt >= self.max_attempts {
                        #[cfg(feature = "tracing")]
                        tracing::event!(
                            tracing::Level::ERROR,
                            event = "bulkpipe.retry.exhausted",
                            attempts = attempt,
                            error = %error,
                            "bulkpipe.retry.exhausted"
                        );
                        return Err(Error::RetryExhausted {
                            attempts: attempt,
                            source: Box::new(error),
                        });
                    }

                    attempt += 1;
                    let delay = self.delay_before(attempt);
                    if !delay.is_zero() {
                        #[cfg(feature = "tracing")]
                        tracing::event!(
                            tracing::Level::WARN,
                            event = "bulkpipe.retry.sleep",
                            attempt = attempt,
                            delay_ms = delay.as_millis() as u64,
                            "bulkpipe.retry.sleep"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(error);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}
