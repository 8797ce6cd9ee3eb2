//! # Tollgate Core
//!
//! The domain layer of Tollgate: rate limiting whose state lives in a shared store.
//! This crate holds the strategy math, the engines that drive it through the store
//! port, the facade callers use, and the stats reporter. It has no infrastructure
//! dependencies; adapters live in `tollgate-infra`.

pub mod domain;
pub mod error;
pub mod limiter;
pub mod ports;

pub use domain::{RateLimitKey, RateLimitStats, Scope, StrategyKind};
pub use error::{RateLimitError, StatsError, StoreFault};
pub use limiter::{
    FailurePolicy, LimiterConfig, ScopePolicy, ScopedRateLimiter, StatsReporter, StrategyConfig,
};
