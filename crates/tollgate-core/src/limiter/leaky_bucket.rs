//! Leaky bucket.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use super::{LeakyBucketParams, StoreContext, StrategyEngine, decode_or_reset, duration_ms};
use crate::domain::{LeakyBucketState, RateLimitKey};
use crate::ports::StoreError;

/// Leaky bucket with lazy leak, stored as `<level>:<lastLeakMillis>`.
///
/// Each admitted call adds one droplet; a call whose droplet would push the
/// level over capacity is rejected. Same optimistic update scheme as the
/// token bucket.
pub struct LeakyBucketEngine {
    ctx: Arc<StoreContext>,
}

impl LeakyBucketEngine {
    pub(crate) fn new(ctx: Arc<StoreContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StrategyEngine for LeakyBucketEngine {
    type Params = LeakyBucketParams;

    async fn is_allowed_and_record(
        &self,
        key: &RateLimitKey,
        params: &LeakyBucketParams,
    ) -> Result<bool, StoreError> {
        let store_key = key.storage_key(&self.ctx.key_prefix);
        let period_ms = duration_ms(params.leak_period);

        for attempt in 1..=self.ctx.max_cas_attempts {
            let raw = self
                .ctx
                .guard
                .retrying("get", || self.ctx.store.get(&store_key))
                .await?;

            let now_ms = self.ctx.clock.now_millis();
            let current = decode_or_reset(key, raw.as_deref(), || LeakyBucketState::empty(now_ms));
            let drained = current.advance(now_ms, period_ms);

            let Some(next) = drained.try_fill(params.capacity) else {
                trace!(key = %key, level = drained.level, "Leaky bucket full");
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
                trace!(key = %key, level = next.level, "Droplet added");
                return Ok(true);
            }
            debug!(key = %key, attempt, "Leaky bucket update lost a race, retrying");
        }

        Err(StoreError::Conflict {
            key: store_key,
            attempts: self.ctx.max_cas_attempts,
        })
    }
}
