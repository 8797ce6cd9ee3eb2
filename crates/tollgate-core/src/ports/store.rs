//! Shared state store port.

use std::time::Duration;

use async_trait::async_trait;

/// Shared key-value store holding all limiter state.
///
/// The store is the single synchronisation point between processes. Besides
/// the primitive commands, it exposes two compound operations that must run
/// atomically on the server: `compare_and_set` for bucket read-modify-write
/// and `sliding_window_admit` for the trim-count-insert sequence.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get a string value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set a string value with a TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Set `value` only if the current value equals `expected`
    /// (`None` meaning the key must be absent). Returns whether it was written.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Increment an integer counter and refresh its TTL. Returns the new value.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, StoreError>;

    /// Add `member` to the ordered set at `key` with `score`.
    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<(), StoreError>;

    /// Remove members with `min <= score <= max`. Returns how many were removed.
    async fn zrem_range_by_score(&self, key: &str, min: i64, max: i64) -> Result<u64, StoreError>;

    /// Count members with `min <= score <= max`.
    async fn zcount(&self, key: &str, min: i64, max: i64) -> Result<u64, StoreError>;

    /// Highest score in the ordered set, if any.
    async fn zmax_score(&self, key: &str) -> Result<Option<i64>, StoreError>;

    /// Set a TTL on an existing key. Returns `false` if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Atomically trim, count and conditionally insert into a sliding window.
    async fn sliding_window_admit(
        &self,
        admission: &WindowAdmission<'_>,
    ) -> Result<WindowOutcome, StoreError>;

    /// Round trip used for readiness checks.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Arguments of one atomic sliding-window admission.
///
/// The store must, as one step: drop members scored below `window_start_ms`;
/// report admitted if `member` is already present (a retried call); otherwise
/// count members in `[window_start_ms, now_ms]` and, when the count is below
/// `max_requests`, add `member` at `now_ms` and reset the TTL to `ttl`.
#[derive(Debug, Clone)]
pub struct WindowAdmission<'a> {
    pub key: &'a str,
    pub window_start_ms: i64,
    pub now_ms: i64,
    /// Unique per logical call; makes retries idempotent.
    pub member: &'a str,
    pub max_requests: u64,
    pub ttl: Duration,
}

/// Result of a sliding-window admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOutcome {
    pub admitted: bool,
    /// Members in the window after the operation.
    pub count: u64,
}

/// Store operation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store operation failed: {0}")]
    Operation(String),

    #[error("Concurrent updates kept conflicting on {key} after {attempts} attempts")]
    Conflict { key: String, attempts: u32 },
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Unavailable(_))
    }
}
