//! Rate-limit retry policy
//!
//! A plain value (attempts + fixed backoff) applied around each external
//! price call. Only rate-limit errors are retried; everything else surfaces
//! immediately.

use std::future::Future;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};

use crate::error::{PipelineError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: usize,

    /// Fixed wait between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(65),
        }
    }
}

impl RetryPolicy {
    pub const fn new(max_attempts: usize, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Run `op`, retrying on rate-limit errors.
    ///
    /// `on_backoff` is called before each wait with the error that caused it.
    /// After `max_attempts` the last error is returned.
    pub async fn run<T, F, Fut>(
        &self,
        op: F,
        mut on_backoff: impl FnMut(&PipelineError, Duration),
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let backoff = ConstantBuilder::default()
            .with_delay(self.backoff)
            .with_max_times(self.max_attempts.saturating_sub(1));

        let mut attempt = 0_usize;
        op.retry(backoff)
            .sleep(tokio::time::sleep)
            .when(PipelineError::is_rate_limited)
            .notify(|err, delay| {
                attempt += 1;
                tracing::warn!(
                    attempt,
                    max_attempts = self.max_attempts,
                    delay_secs = delay.as_secs(),
                    error = %err,
                    "Rate limit hit, backing off"
                );
                on_backoff(err, delay);
            })
            .await
    }
}
