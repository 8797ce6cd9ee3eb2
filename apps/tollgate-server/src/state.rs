//! Application state - shared across all handlers.

use std::sync::Arc;

use tollgate_core::ports::{StateStore, TelemetrySink};
use tollgate_core::{LimiterConfig, ScopedRateLimiter, StatsReporter};
use tollgate_infra::{InMemoryStateStore, RedisStateStore};

use crate::config::AppConfig;
use crate::telemetry::decision_sink;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<ScopedRateLimiter>,
    pub stats: Arc<StatsReporter>,
    pub store: Arc<dyn StateStore>,
}

impl AppState {
    /// Build the application state, connecting to Redis when configured.
    pub async fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn StateStore> = match &config.redis {
            Some(redis) => match RedisStateStore::new(redis).await {
                Ok(store) => Arc::new(store),
                Err(e) if redis.fallback_to_memory => {
                    tracing::error!(
                        error = %e,
                        "Failed to connect to Redis. Using in-memory store; limits are not shared across instances."
                    );
                    Arc::new(InMemoryStateStore::new())
                }
                Err(e) => return Err(anyhow::anyhow!("failed to connect to Redis: {e}")),
            },
            None => {
                tracing::warn!("REDIS_URL not set. Running with an in-memory store (single instance).");
                Arc::new(InMemoryStateStore::new())
            }
        };

        let state = Self::with_store(config.limiter.clone(), store, decision_sink());
        tracing::info!(scopes = config.limiter.scopes.len(), "Application state initialized");
        Ok(state)
    }

    pub fn with_store(
        config: LimiterConfig,
        store: Arc<dyn StateStore>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let limiter = ScopedRateLimiter::builder(config, store.clone())
            .telemetry(telemetry)
            .build();

        Self {
            stats: Arc::new(limiter.stats_reporter()),
            limiter: Arc::new(limiter),
            store,
        }
    }
}
