//! In-memory telemetry, mainly for tests and the stats endpoint's own checks.

use std::collections::HashMap;
use std::sync::Mutex;

use tollgate_core::domain::{RateLimitStats, Scope};
use tollgate_core::ports::{DecisionOutcome, TelemetrySink};

type DecisionKey = (Scope, String, DecisionOutcome);

/// Keeps decision counters and the latest consumption per key in memory.
#[derive(Default)]
pub struct InMemoryTelemetry {
    decisions: Mutex<HashMap<DecisionKey, u64>>,
    consumption: Mutex<HashMap<String, f64>>,
}

impl InMemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decisions recorded for one (scope, api, outcome) tag set.
    pub fn count(&self, scope: &Scope, api: &str, outcome: DecisionOutcome) -> u64 {
        let decisions = self.decisions.lock().unwrap_or_else(|e| e.into_inner());
        decisions
            .get(&(scope.clone(), api.to_string(), outcome))
            .copied()
            .unwrap_or(0)
    }

    /// Decisions recorded with `outcome` across all scopes and APIs.
    pub fn total(&self, outcome: DecisionOutcome) -> u64 {
        let decisions = self.decisions.lock().unwrap_or_else(|e| e.into_inner());
        decisions
            .iter()
            .filter(|((_, _, o), _)| *o == outcome)
            .map(|(_, n)| n)
            .sum()
    }

    /// Last consumption gauge published for a key, by its display form.
    pub fn consumption(&self, key: &str) -> Option<f64> {
        let gauges = self.consumption.lock().unwrap_or_else(|e| e.into_inner());
        gauges.get(key).copied()
    }
}

impl TelemetrySink for InMemoryTelemetry {
    fn record_decision(&self, scope: &Scope, api: &str, outcome: DecisionOutcome) {
        let mut decisions = self.decisions.lock().unwrap_or_else(|e| e.into_inner());
        *decisions
            .entry((scope.clone(), api.to_string(), outcome))
            .or_insert(0) += 1;
    }

    fn record_consumption(&self, stats: &RateLimitStats) {
        let mut gauges = self.consumption.lock().unwrap_or_else(|e| e.into_inner());
        gauges.insert(stats.key.to_string(), stats.consumption);
    }
}
