//! # Tollgate Infrastructure
//!
//! Concrete implementations of the ports defined in `tollgate-core`.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external dependencies, in-memory only
//! - `redis` - Redis-backed shared state store
//! - `otel` - OpenTelemetry metrics sink

pub mod store;
pub mod telemetry;

#[cfg(test)]
mod tests;

// Re-exports - In-Memory
pub use store::InMemoryStateStore;
pub use telemetry::{CompositeTelemetry, InMemoryTelemetry, TracingTelemetry};

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use store::{RedisConfig, RedisStateStore};

#[cfg(feature = "otel")]
pub use telemetry::OtelTelemetry;
