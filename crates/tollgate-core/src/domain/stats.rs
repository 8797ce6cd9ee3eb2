//! Read-only consumption snapshot for a rate limit key.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::key::RateLimitKey;

/// Point-in-time view of one key's consumption.
///
/// Produced on demand by the stats reporter; never written back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStats {
    pub key: RateLimitKey,
    /// Admitted calls counted since the counter last expired. Zero when
    /// request tracking is disabled.
    pub request_count: u64,
    /// Current consumption: calls in the window, tokens spent, or bucket level.
    pub consumption: f64,
    pub capacity: u64,
    /// Time of the last admitted call. Token buckets only know it while
    /// request tracking is enabled.
    pub last_request_at: Option<DateTime<Utc>>,
    /// Sustained rate the configuration allows, in calls per second.
    pub allowed_rate_per_sec: f64,
}

impl RateLimitStats {
    /// Stats for a key with no recorded traffic.
    pub fn empty(key: RateLimitKey, capacity: u64, allowed_rate_per_sec: f64) -> Self {
        Self {
            key,
            request_count: 0,
            consumption: 0.0,
            capacity,
            last_request_at: None,
            allowed_rate_per_sec,
        }
    }

    /// Fraction of capacity in use, in `[0, 1]`.
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        (self.consumption / self.capacity as f64).clamp(0.0, 1.0)
    }
}
