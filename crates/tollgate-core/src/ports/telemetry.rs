//! Telemetry sink port.

use std::fmt;

use crate::domain::{RateLimitStats, Scope};

/// How an admission attempt ended, as reported to telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionOutcome {
    Admitted,
    /// Over the configured limit.
    Rejected,
    /// Store failed; admitted under fail-open.
    FailedOpen,
    /// Store failed; rejected under fail-closed.
    FailedClosed,
    /// Store failed; error surfaced to the caller.
    StoreError,
}

impl DecisionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionOutcome::Admitted => "admitted",
            DecisionOutcome::Rejected => "rejected",
            DecisionOutcome::FailedOpen => "failed_open",
            DecisionOutcome::FailedClosed => "failed_closed",
            DecisionOutcome::StoreError => "store_error",
        }
    }
}

impl fmt::Display for DecisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Narrow interface to an external metrics pipeline.
///
/// Called on the admission path, so implementations must not block.
pub trait TelemetrySink: Send + Sync {
    /// Count one decision tagged with scope, API name and outcome.
    fn record_decision(&self, scope: &Scope, api: &str, outcome: DecisionOutcome);

    /// Publish the current consumption gauge for a key.
    fn record_consumption(&self, stats: &RateLimitStats);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn record_decision(&self, _scope: &Scope, _api: &str, _outcome: DecisionOutcome) {}

    fn record_consumption(&self, _stats: &RateLimitStats) {}
}
