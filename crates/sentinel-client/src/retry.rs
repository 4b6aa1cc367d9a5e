//! Bounded exponential retry for transient record-store failures.

use backon::{ExponentialBuilder, Retryable};
use sentinel_types::ClientError;
use std::future::Future;
use std::time::Duration;

/// Retry configuration for outbound calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// No retries; every error is returned as is.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
    }

    /// Run `op`, retrying only errors classified as transient.
    pub async fn run<T, F, Fut>(&self, op_name: &str, op: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        op.retry(self.backoff())
            .when(ClientError::is_transient)
            .notify(|err: &ClientError, delay: Duration| {
                tracing::warn!(op = op_name, error = %err, ?delay, "transient failure, retrying");
            })
            .await
    }
}
