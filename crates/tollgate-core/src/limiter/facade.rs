//! Rate limiter facade - the call surface used by request handlers.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::{
    FailurePolicy, LeakyBucketEngine, LimiterConfig, ScopePolicy, SlidingWindowEngine,
    StatsReporter, StoreContext, StrategyConfig, StrategyEngine, TokenBucketEngine,
};
use crate::domain::{RateLimitKey, Scope};
use crate::error::{RateLimitError, StoreFault};
use crate::ports::{
    Clock, DecisionOutcome, NoopTelemetry, StateStore, StoreError, SystemClock, TelemetrySink,
};

/// Builder for [`ScopedRateLimiter`].
pub struct RateLimiterBuilder {
    config: LimiterConfig,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl RateLimiterBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn build(self) -> ScopedRateLimiter {
        let ctx = Arc::new(StoreContext::new(&self.config, self.store, self.clock));

        ScopedRateLimiter {
            sliding_window: SlidingWindowEngine::new(ctx.clone()),
            token_bucket: TokenBucketEngine::new(ctx.clone()),
            leaky_bucket: LeakyBucketEngine::new(ctx.clone()),
            config: Arc::new(self.config),
            telemetry: self.telemetry,
            ctx,
        }
    }
}

/// Routes calls to the strategy configured for their scope and runs the
/// wrapped operation only when admitted.
///
/// The facade never queues, delays or retries a rejected call; that is the
/// caller's decision. All limiter state lives in the shared store, so any
/// number of instances in any number of processes can share one store.
pub struct ScopedRateLimiter {
    config: Arc<LimiterConfig>,
    ctx: Arc<StoreContext>,
    sliding_window: SlidingWindowEngine,
    token_bucket: TokenBucketEngine,
    leaky_bucket: LeakyBucketEngine,
    telemetry: Arc<dyn TelemetrySink>,
}

impl ScopedRateLimiter {
    /// Limiter on the system clock with no telemetry.
    pub fn new(config: LimiterConfig, store: Arc<dyn StateStore>) -> Self {
        Self::builder(config, store).build()
    }

    pub fn builder(config: LimiterConfig, store: Arc<dyn StateStore>) -> RateLimiterBuilder {
        RateLimiterBuilder {
            config,
            store,
            clock: Arc::new(SystemClock),
            telemetry: Arc::new(NoopTelemetry),
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Read-only reporter sharing this limiter's store, clock and telemetry.
    pub fn stats_reporter(&self) -> StatsReporter {
        StatsReporter::new(self.config.clone(), self.ctx.clone(), self.telemetry.clone())
    }

    pub fn sliding_window(&self) -> &SlidingWindowEngine {
        &self.sliding_window
    }

    pub fn token_bucket(&self) -> &TokenBucketEngine {
        &self.token_bucket
    }

    pub fn leaky_bucket(&self) -> &LeakyBucketEngine {
        &self.leaky_bucket
    }

    /// Run `operation` if the scope's limit admits the call.
    pub async fn execute_with_scope_limit<T, F, Fut>(
        &self,
        scope: &Scope,
        principal: &str,
        api: &str,
        operation: F,
    ) -> Result<T, RateLimitError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.acquire(scope, principal, api).await?;
        Ok(operation().await)
    }

    /// Run `operation` under an explicit policy instead of the scope's configured one.
    pub async fn execute<T, F, Fut>(
        &self,
        scope: &Scope,
        principal: &str,
        api: &str,
        policy: &ScopePolicy,
        operation: F,
    ) -> Result<T, RateLimitError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let key = RateLimitKey::new(scope.clone(), principal, api, policy.strategy.kind());
        self.admit(&key, policy).await?;
        Ok(operation().await)
    }

    /// Admission decision alone, for callers that run the guarded work themselves.
    /// Returns the key the decision was made for.
    pub async fn acquire(
        &self,
        scope: &Scope,
        principal: &str,
        api: &str,
    ) -> Result<RateLimitKey, RateLimitError> {
        let policy = self
            .config
            .policy(scope)
            .ok_or_else(|| RateLimitError::UnknownScope(scope.clone()))?;
        let key = RateLimitKey::new(scope.clone(), principal, api, policy.strategy.kind());

        self.admit(&key, policy).await?;
        Ok(key)
    }

    async fn admit(&self, key: &RateLimitKey, policy: &ScopePolicy) -> Result<(), RateLimitError> {
        let decision = match &policy.strategy {
            StrategyConfig::SlidingWindow(params) => {
                self.sliding_window.is_allowed_and_record(key, params).await
            }
            StrategyConfig::TokenBucket(params) => {
                self.token_bucket.is_allowed_and_record(key, params).await
            }
            StrategyConfig::LeakyBucket(params) => {
                self.leaky_bucket.is_allowed_and_record(key, params).await
            }
        };

        match decision {
            Ok(true) => {
                self.report(key, DecisionOutcome::Admitted);
                self.record_request(key).await;
                Ok(())
            }
            Ok(false) => {
                debug!(key = %key, strategy = %key.strategy, "Rate limit exceeded");
                self.report(key, DecisionOutcome::Rejected);
                Err(RateLimitError::Exceeded { key: key.clone() })
            }
            Err(err) => self.resolve_store_failure(key, policy.on_store_failure, err),
        }
    }

    fn resolve_store_failure(
        &self,
        key: &RateLimitKey,
        policy: FailurePolicy,
        err: StoreError,
    ) -> Result<(), RateLimitError> {
        match policy {
            FailurePolicy::FailOpen => {
                warn!(key = %key, error = %err, "Rate limit store failed, admitting call (fail-open)");
                self.report(key, DecisionOutcome::FailedOpen);
                Ok(())
            }
            FailurePolicy::FailClosed => {
                let fault = StoreFault::from(&err);
                error!(key = %key, error = %err, %fault, "Rate limit store failed, rejecting call (fail-closed)");
                self.report(key, DecisionOutcome::FailedClosed);
                Err(RateLimitError::StoreRejected {
                    key: key.clone(),
                    fault,
                })
            }
            FailurePolicy::FailClosedWithError => {
                error!(key = %key, error = %err, "Rate limit store failed");
                self.report(key, DecisionOutcome::StoreError);
                Err(RateLimitError::Store {
                    key: key.clone(),
                    source: err,
                })
            }
        }
    }

    fn report(&self, key: &RateLimitKey, outcome: DecisionOutcome) {
        self.telemetry.record_decision(&key.scope, &key.api, outcome);
    }

    /// Bump the request counter and stamp the admission time. Best effort; a
    /// failed write never changes the decision.
    async fn record_request(&self, key: &RateLimitKey) {
        if !self.config.track_request_counts {
            return;
        }

        let counter_key = key.counter_key(&self.ctx.key_prefix);
        let last_key = key.last_request_key(&self.ctx.key_prefix);
        let now_ms = self.ctx.clock.now_millis().to_string();
        let (counted, stamped) = tokio::join!(
            self.ctx
                .guard
                .once(self.ctx.store.increment(&counter_key, self.ctx.state_ttl)),
            self.ctx
                .guard
                .once(self.ctx.store.set(&last_key, &now_ms, self.ctx.state_ttl)),
        );
        if let Err(err) = counted {
            debug!(key = %key, error = %err, "Failed to update request counter");
        }
        if let Err(err) = stamped {
            debug!(key = %key, error = %err, "Failed to record last request time");
        }
    }
}
