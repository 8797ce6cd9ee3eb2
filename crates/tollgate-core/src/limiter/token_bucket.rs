//! Token bucket.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use super::{StoreContext, StrategyEngine, TokenBucketParams, decode_or_reset, duration_ms};
use crate::domain::{RateLimitKey, TokenBucketState};
use crate::ports::StoreError;

/// Token bucket with lazy refill, stored as `<tokens>:<lastRefillMillis>`.
///
/// Updates are optimistic: read, advance, then compare-and-set against the
/// value read. A lost race re-reads and tries again, up to the configured
/// attempt budget. Rejections never write.
pub struct TokenBucketEngine {
    ctx: Arc<StoreContext>,
}

impl TokenBucketEngine {
    pub(crate) fn new(ctx: Arc<StoreContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StrategyEngine for TokenBucketEngine {
    type Params = TokenBucketParams;

    async fn is_allowed_and_record(
        &self,
        key: &RateLimitKey,
        params: &TokenBucketParams,
    ) -> Result<bool, StoreError> {
        let store_key = key.storage_key(&self.ctx.key_prefix);
        let period_ms = duration_ms(params.refill_period);

        for attempt in 1..=self.ctx.max_cas_attempts {
            let raw = self
                .ctx
                .guard
                .retrying("get", || self.ctx.store.get(&store_key))
                .await?;

            let now_ms = self.ctx.clock.now_millis();
            let current = decode_or_reset(key, raw.as_deref(), || {
                TokenBucketState::full(params.capacity, now_ms)
            });
            let refilled = current.advance(now_ms, params.capacity, period_ms);

            let Some(next) = refilled.try_consume() else {
                trace!(key = %key, "Token bucket empty");
                return Ok(false);
            };

            let written = self
                .ctx
                .guard
                .once(self.ctx.store.compare_and_set(
                    &store_key,
                    raw.as_deref(),
                    &next.to_string(),
                    self.ctx.state_ttl,
                ))
                .await?;

            if written {
                trace!(key = %key, tokens = next.tokens, "Token consumed");
                return Ok(true);
            }
            debug!(key = %key, attempt, "Token bucket update lost a race, retrying");
        }

        Err(StoreError::Conflict {
            key: store_key,
            attempts: self.ctx.max_cas_attempts,
        })
    }
}
