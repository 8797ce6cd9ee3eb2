//! Stats reporter - read-only view of per-key consumption.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{LimiterConfig, StoreContext, StrategyConfig, decode_or_reset, duration_ms};
use crate::domain::{LeakyBucketState, RateLimitKey, RateLimitStats, Scope, TokenBucketState};
use crate::error::StatsError;
use crate::ports::TelemetrySink;

/// Answers "how much of its limit is this key using right now".
///
/// Snapshots never write to the store. A key without recorded traffic yields
/// zero-valued stats.
pub struct StatsReporter {
    config: Arc<LimiterConfig>,
    ctx: Arc<StoreContext>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl StatsReporter {
    pub(crate) fn new(
        config: Arc<LimiterConfig>,
        ctx: Arc<StoreContext>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            config,
            ctx,
            telemetry,
        }
    }

    /// Snapshot for a (scope, principal, api) triple.
    pub async fn snapshot_for(
        &self,
        scope: &Scope,
        principal: &str,
        api: &str,
    ) -> Result<RateLimitStats, StatsError> {
        let key = self
            .config
            .key_for(scope, principal, api)
            .ok_or_else(|| StatsError::UnknownScope(scope.clone()))?;
        self.snapshot(&key).await
    }

    /// Snapshot for `key` and publish its consumption gauge.
    pub async fn snapshot(&self, key: &RateLimitKey) -> Result<RateLimitStats, StatsError> {
        let strategy = self
            .config
            .policy(&key.scope)
            .filter(|policy| policy.strategy.kind() == key.strategy)
            .map(|policy| policy.strategy)
            .ok_or_else(|| StatsError::UnknownScope(key.scope.clone()))?;

        let store_key = key.storage_key(&self.ctx.key_prefix);
        let now_ms = self.ctx.clock.now_millis();

        let (consumption, last_ms) = match strategy {
            StrategyConfig::SlidingWindow(params) => {
                let window_start = now_ms.saturating_sub(duration_ms(params.window));
                let count = self
                    .ctx
                    .guard
                    .retrying("zcount", || self.ctx.store.zcount(&store_key, window_start, now_ms))
                    .await?;
                let last = self
                    .ctx
                    .guard
                    .retrying("zmax_score", || self.ctx.store.zmax_score(&store_key))
                    .await?;
                (count as f64, last)
            }
            StrategyConfig::TokenBucket(params) => {
                let raw = self
                    .ctx
                    .guard
                    .retrying("get", || self.ctx.store.get(&store_key))
                    .await?;
                match raw {
                    None => (0.0, None),
                    Some(raw) => {
                        let state = decode_or_reset(key, Some(&raw), || {
                            TokenBucketState::full(params.capacity, now_ms)
                        });
                        let refilled =
                            state.advance(now_ms, params.capacity, duration_ms(params.refill_period));
                        // the refill stamp lags admissions; only the
                        // recorded admission time is reported
                        (params.capacity.saturating_sub(refilled.tokens) as f64, None)
                    }
                }
            }
            StrategyConfig::LeakyBucket(params) => {
                let raw = self
                    .ctx
                    .guard
                    .retrying("get", || self.ctx.store.get(&store_key))
                    .await?;
                match raw {
                    None => (0.0, None),
                    Some(raw) => {
                        let state = decode_or_reset(key, Some(&raw), || LeakyBucketState::empty(now_ms));
                        let drained = state.advance(now_ms, duration_ms(params.leak_period));
                        (drained.level, Some(state.last_leak_ms))
                    }
                }
            }
        };

        let counter_key = key.counter_key(&self.ctx.key_prefix);
        let request_count = self
            .ctx
            .guard
            .retrying("get", || self.ctx.store.get(&counter_key))
            .await?
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(0);

        let last_key = key.last_request_key(&self.ctx.key_prefix);
        let recorded_ms = self
            .ctx
            .guard
            .retrying("get", || self.ctx.store.get(&last_key))
            .await?
            .and_then(|raw| raw.parse::<i64>().ok());

        let mut stats = RateLimitStats::empty(
            key.clone(),
            strategy.capacity(),
            strategy.allowed_rate_per_sec(),
        );
        stats.request_count = request_count;
        stats.consumption = consumption;
        stats.last_request_at = recorded_ms
            .or(last_ms)
            .and_then(DateTime::<Utc>::from_timestamp_millis);

        self.telemetry.record_consumption(&stats);
        Ok(stats)
    }
}
