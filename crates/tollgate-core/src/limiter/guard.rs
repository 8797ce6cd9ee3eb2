//! Deadlines and bounded retries around store calls.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::ports::StoreError;

/// Applies the per-call deadline and the transient-failure retry budget.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallGuard {
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl CallGuard {
    pub(crate) fn new(timeout: Duration, max_retries: u32, backoff: Duration) -> Self {
        Self {
            timeout,
            max_retries,
            backoff,
        }
    }

    /// One attempt, aborted once the deadline passes.
    ///
    /// Used for writes that must not be replayed blindly.
    pub(crate) async fn once<T, Fut>(&self, call: Fut) -> Result<T, StoreError>
    where
        Fut: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    /// Idempotent call, retried on transient failures with exponential backoff.
    pub(crate) async fn retrying<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0u32;
        loop {
            match self.once(call()).await {
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff.saturating_mul(2u32.saturating_pow(attempt));
                    debug!(op, attempt, error = %err, delay_ms = delay.as_millis() as u64, "Retrying store call");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
