//! Shared state store implementations - Redis and in-memory.

mod memory;

pub use memory::InMemoryStateStore;

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::{RedisConfig, RedisStateStore};
