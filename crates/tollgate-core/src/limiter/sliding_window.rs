//! Sliding-window counter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;
use uuid::Uuid;

use super::{SlidingWindowParams, StoreContext, StrategyEngine, duration_ms};
use crate::domain::RateLimitKey;
use crate::ports::{StoreError, WindowAdmission};

/// Counts admitted calls in a trailing window, kept as an ordered set of
/// timestamps in the store.
///
/// Trim, count and insert run as one atomic store operation, so concurrent
/// callers cannot both claim the last slot. Each call carries a unique member
/// that doubles as an idempotency token: a retry after a lost reply finds its
/// own entry and is not counted twice.
pub struct SlidingWindowEngine {
    ctx: Arc<StoreContext>,
}

impl SlidingWindowEngine {
    pub(crate) fn new(ctx: Arc<StoreContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StrategyEngine for SlidingWindowEngine {
    type Params = SlidingWindowParams;

    async fn is_allowed_and_record(
        &self,
        key: &RateLimitKey,
        params: &SlidingWindowParams,
    ) -> Result<bool, StoreError> {
        let store_key = key.storage_key(&self.ctx.key_prefix);
        let window_ms = duration_ms(params.window);
        let now_ms = self.ctx.clock.now_millis();
        let member = format!("{now_ms}-{}", Uuid::new_v4().simple());

        let admission = WindowAdmission {
            key: &store_key,
            window_start_ms: now_ms.saturating_sub(window_ms),
            now_ms,
            member: &member,
            max_requests: params.max_requests,
            ttl: params.window.max(Duration::from_millis(1)),
        };

        let outcome = self
            .ctx
            .guard
            .retrying("sliding_window_admit", || {
                self.ctx.store.sliding_window_admit(&admission)
            })
            .await?;

        trace!(
            key = %key,
            count = outcome.count,
            limit = params.max_requests,
            admitted = outcome.admitted,
            "Sliding window evaluated"
        );

        Ok(outcome.admitted)
    }
}
