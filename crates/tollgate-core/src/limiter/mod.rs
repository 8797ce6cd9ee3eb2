//! Strategy engines, the facade that dispatches to them, and the stats reporter.

mod config;
mod facade;
mod guard;
mod leaky_bucket;
mod sliding_window;
mod stats;
mod token_bucket;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::{CodecError, RateLimitKey};
use crate::ports::{Clock, StateStore, StoreError};

pub use config::{
    FailurePolicy, LeakyBucketParams, LimiterConfig, ScopePolicy, SlidingWindowParams,
    StrategyConfig, TokenBucketParams,
};
pub use facade::{RateLimiterBuilder, ScopedRateLimiter};
pub use leaky_bucket::LeakyBucketEngine;
pub use sliding_window::SlidingWindowEngine;
pub use stats::StatsReporter;
pub use token_bucket::TokenBucketEngine;

use guard::CallGuard;

/// Uniform admission capability shared by all strategies.
#[async_trait]
pub trait StrategyEngine: Send + Sync {
    type Params: Send + Sync;

    /// Decide whether the call identified by `key` is admitted, recording it
    /// in the shared store when it is. Rejections leave the store unchanged.
    async fn is_allowed_and_record(
        &self,
        key: &RateLimitKey,
        params: &Self::Params,
    ) -> Result<bool, StoreError>;
}

/// Store handle and call settings shared by the engines and the reporter.
pub(crate) struct StoreContext {
    pub(crate) store: Arc<dyn StateStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) guard: CallGuard,
    pub(crate) key_prefix: String,
    pub(crate) state_ttl: Duration,
    pub(crate) max_cas_attempts: u32,
}

impl StoreContext {
    pub(crate) fn new(config: &LimiterConfig, store: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            guard: CallGuard::new(config.store_timeout, config.max_retries, config.retry_backoff),
            key_prefix: config.key_prefix.clone(),
            state_ttl: config.state_ttl,
            max_cas_attempts: config.max_cas_attempts.max(1),
        }
    }
}

/// Whole milliseconds in `duration`, at least 1.
pub(crate) fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX).max(1)
}

/// Parse stored state, treating absent or malformed values as a fresh bucket.
pub(crate) fn decode_or_reset<S>(key: &RateLimitKey, raw: Option<&str>, fresh: impl FnOnce() -> S) -> S
where
    S: FromStr<Err = CodecError>,
{
    match raw.map(str::parse::<S>) {
        None => fresh(),
        Some(Ok(state)) => state,
        Some(Err(err)) => {
            warn!(key = %key, error = %err, "Malformed limiter state, resetting to defaults");
            fresh()
        }
    }
}
