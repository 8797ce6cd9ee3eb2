//! Telemetry sinks for limiter decisions and consumption gauges.

mod memory;
#[cfg(feature = "otel")]
mod otel;
mod tracing_sink;

use std::sync::Arc;

use tollgate_core::domain::{RateLimitStats, Scope};
use tollgate_core::ports::{DecisionOutcome, TelemetrySink};

pub use memory::InMemoryTelemetry;
#[cfg(feature = "otel")]
pub use otel::OtelTelemetry;
pub use tracing_sink::TracingTelemetry;

/// Fans every record out to several sinks.
#[derive(Default, Clone)]
pub struct CompositeTelemetry {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl CompositeTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl TelemetrySink for CompositeTelemetry {
    fn record_decision(&self, scope: &Scope, api: &str, outcome: DecisionOutcome) {
        for sink in &self.sinks {
            sink.record_decision(scope, api, outcome);
        }
    }

    fn record_consumption(&self, stats: &RateLimitStats) {
        for sink in &self.sinks {
            sink.record_consumption(stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_fans_out() {
        let first = Arc::new(InMemoryTelemetry::new());
        let second = Arc::new(InMemoryTelemetry::new());
        let composite = CompositeTelemetry::new()
            .with(first.clone())
            .with(second.clone())
            .with(Arc::new(TracingTelemetry));

        composite.record_decision(&Scope::CORPORATE, "orders", DecisionOutcome::Rejected);

        assert_eq!(composite.len(), 3);
        assert_eq!(first.count(&Scope::CORPORATE, "orders", DecisionOutcome::Rejected), 1);
        assert_eq!(second.total(DecisionOutcome::Rejected), 1);
    }
}
