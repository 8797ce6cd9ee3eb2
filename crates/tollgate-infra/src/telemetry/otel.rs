//! OpenTelemetry metrics sink.

use opentelemetry::metrics::{Counter, Gauge, Meter};
use opentelemetry::{KeyValue, global};

use tollgate_core::domain::{RateLimitStats, Scope};
use tollgate_core::ports::{DecisionOutcome, TelemetrySink};

/// Publishes a `tollgate.decisions` counter and a `tollgate.consumption`
/// gauge through an OpenTelemetry meter.
///
/// Exporting is left to whatever meter provider the process installs.
pub struct OtelTelemetry {
    decisions: Counter<u64>,
    consumption: Gauge<f64>,
}

impl OtelTelemetry {
    pub fn new(meter: &Meter) -> Self {
        Self {
            decisions: meter
                .u64_counter("tollgate.decisions")
                .with_description("Rate limit decisions by scope, api and outcome")
                .build(),
            consumption: meter
                .f64_gauge("tollgate.consumption")
                .with_description("Current consumption per rate limit key")
                .build(),
        }
    }

    /// Sink on the globally installed meter provider.
    pub fn from_global() -> Self {
        Self::new(&global::meter("tollgate"))
    }
}

impl TelemetrySink for OtelTelemetry {
    fn record_decision(&self, scope: &Scope, api: &str, outcome: DecisionOutcome) {
        self.decisions.add(
            1,
            &[
                KeyValue::new("scope", scope.as_str().to_string()),
                KeyValue::new("api", api.to_string()),
                KeyValue::new("outcome", outcome.as_str()),
            ],
        );
    }

    fn record_consumption(&self, stats: &RateLimitStats) {
        self.consumption.record(
            stats.consumption,
            &[
                KeyValue::new("scope", stats.key.scope.as_str().to_string()),
                KeyValue::new("strategy", stats.key.strategy.as_str()),
                KeyValue::new("principal", stats.key.principal.clone()),
                KeyValue::new("api", stats.key.api.clone()),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::domain::{RateLimitKey, StrategyKind};

    #[test]
    fn test_records_without_a_provider() {
        // the global no-op provider accepts records silently
        let sink = OtelTelemetry::from_global();
        sink.record_decision(&Scope::CORPORATE, "orders", DecisionOutcome::Admitted);

        let key = RateLimitKey::new(Scope::CORPORATE, "acme", "orders", StrategyKind::SlidingWindow);
        sink.record_consumption(&RateLimitStats::empty(key, 100, 1.0));
    }
}
