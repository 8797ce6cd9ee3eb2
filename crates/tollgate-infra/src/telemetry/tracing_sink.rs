//! Telemetry as structured log events.

use tracing::{debug, info};

use tollgate_core::domain::{RateLimitStats, Scope};
use tollgate_core::ports::{DecisionOutcome, TelemetrySink};

/// Emits one `tracing` event per record. Admissions log at debug so busy
/// services stay quiet at the default level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn record_decision(&self, scope: &Scope, api: &str, outcome: DecisionOutcome) {
        match outcome {
            DecisionOutcome::Admitted => {
                debug!(scope = %scope, api, outcome = %outcome, "Rate limit decision")
            }
            _ => info!(scope = %scope, api, outcome = %outcome, "Rate limit decision"),
        }
    }

    fn record_consumption(&self, stats: &RateLimitStats) {
        debug!(
            key = %stats.key,
            consumption = stats.consumption,
            capacity = stats.capacity,
            utilization = stats.utilization(),
            "Rate limit consumption"
        );
    }
}
