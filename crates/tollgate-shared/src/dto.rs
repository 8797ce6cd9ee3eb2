//! Data Transfer Objects - request/response types for the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of an admitted call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquireResponse {
    /// Rendered rate limit key the decision was made for.
    pub key: String,
    pub strategy: String,
    pub admitted: bool,
}

/// Consumption snapshot for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub key: String,
    pub scope: String,
    pub principal: String,
    pub api: String,
    pub strategy: String,
    pub request_count: u64,
    pub consumption: f64,
    pub capacity: u64,
    pub utilization: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_request_at: Option<DateTime<Utc>>,
    pub allowed_rate_per_sec: f64,
}

/// Liveness payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// Readiness payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub status: String,
    pub store: String,
}
