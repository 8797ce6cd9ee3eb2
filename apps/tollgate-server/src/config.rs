//! Application configuration loaded from environment variables.

use std::env;

use tollgate_core::LimiterConfig;
use tollgate_infra::RedisConfig;

use crate::telemetry::TelemetryConfig;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Shared store; `None` runs on the in-memory store.
    pub redis: Option<RedisConfig>,
    pub limiter: LimiterConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            redis: env::var("REDIS_URL").ok().map(|_| RedisConfig::from_env()),
            limiter: LimiterConfig::from_env(),
            telemetry: TelemetryConfig::from_env(),
        }
    }
}
