//! Telemetry initialization - tracing subscriber and, with `otel`, the metrics pipeline.

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use tollgate_core::ports::TelemetrySink;
use tollgate_infra::{CompositeTelemetry, TracingTelemetry};

/// Telemetry configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Enable JSON logging (for production).
    pub json_logs: bool,
    /// Service name reported with metrics.
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            json_logs: false,
            service_name: "tollgate".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            json_logs: std::env::var("LOG_FORMAT")
                .map(|v| v.to_lowercase() == "json")
                .unwrap_or(false),
            service_name: std::env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "tollgate".to_string()),
        }
    }
}

/// Keeps the metrics pipeline alive; flushes on drop.
pub struct TelemetryGuard {
    #[cfg(feature = "otel")]
    meter_provider: opentelemetry_sdk::metrics::SdkMeterProvider,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otel")]
        {
            if let Err(e) = self.meter_provider.shutdown() {
                tracing::warn!(error = %e, "Failed to shut down meter provider");
            }
        }
    }
}

/// Initialize telemetry (tracing and metrics).
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,tollgate_server=debug,tollgate_infra=debug,tollgate_core=debug")
    });

    // Build and init subscriber based on log format
    if config.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()?;
    }

    #[cfg(feature = "otel")]
    let guard = TelemetryGuard {
        meter_provider: init_metrics(config)?,
    };
    #[cfg(not(feature = "otel"))]
    let guard = TelemetryGuard {};

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        otel = cfg!(feature = "otel"),
        "Telemetry initialized"
    );

    Ok(guard)
}

#[cfg(feature = "otel")]
fn init_metrics(
    config: &TelemetryConfig,
) -> anyhow::Result<opentelemetry_sdk::metrics::SdkMeterProvider> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
    use opentelemetry_sdk::{Resource, runtime};

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .build()?;
    let reader = PeriodicReader::builder(exporter, runtime::Tokio).build();

    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(Resource::new([
            KeyValue::new("service.name", config.service_name.clone()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ]))
        .build();

    opentelemetry::global::set_meter_provider(provider.clone());
    Ok(provider)
}

/// Sink for limiter decisions: structured logs, plus OpenTelemetry metrics with `otel`.
pub fn decision_sink() -> Arc<dyn TelemetrySink> {
    let sink = CompositeTelemetry::new().with(Arc::new(TracingTelemetry));

    #[cfg(feature = "otel")]
    let sink = sink.with(Arc::new(tollgate_infra::OtelTelemetry::from_global()));

    Arc::new(sink)
}
