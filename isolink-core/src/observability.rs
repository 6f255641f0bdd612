//! OpenTelemetry observability configuration and initialization
//!
//! This module wires the `tracing` macros used across isolink to a
//! `tracing-subscriber` registry and, when enabled, to an OTLP collector for
//! traces and metrics.
//!
//! # Usage Pattern
//!
//! Initialize observability once at startup, before building isolates or
//! testers:
//!
//! ```rust,no_run
//! use isolink_core::ObservabilityConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ObservabilityConfig::new("ping-pong")
//!         .with_endpoint("http://localhost:4317")
//!         .with_log_level("debug");
//!
//!     isolink_core::init_observability(config).expect("Failed to init observability");
//!
//!     // ... run isolates and testers ...
//!
//!     isolink_core::shutdown_observability();
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: Collector endpoint. `ObservabilityConfig::from_env`
//!   only enables OTLP export when this is set.
//! - `RUST_LOG`: Log level filter (e.g., "info", "debug", "isolink_host=trace")

use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_ENDPOINT: &str = "http://localhost:4317";

// Kept so `shutdown_observability` can flush what the batch exporters hold
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();
static METER_PROVIDER: OnceLock<SdkMeterProvider> = OnceLock::new();

/// Observability configuration
///
/// # Defaults
///
/// - Service name: "isolink"
/// - Service version: current crate version
/// - OTLP endpoint: `$OTEL_EXPORTER_OTLP_ENDPOINT` or "http://localhost:4317"
/// - Traces, metrics and logs enabled
/// - Log level: `$RUST_LOG` or "info"
///
/// # Examples
///
/// ```rust
/// use isolink_core::ObservabilityConfig;
///
/// let custom = ObservabilityConfig::new("isolate-host")
///     .with_endpoint("http://collector:4317")
///     .with_log_level("debug")
///     .with_metrics(false);
/// assert!(!custom.enable_metrics);
/// ```
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Service name attached to every span and metric
    pub service_name: String,

    /// Service version attached to every span and metric
    pub service_version: String,

    /// gRPC endpoint of the OpenTelemetry collector
    pub otlp_endpoint: String,

    /// Export spans over OTLP
    pub enable_traces: bool,

    /// Export metrics over OTLP
    pub enable_metrics: bool,

    /// Write structured JSON logs to stdout
    pub enable_logs: bool,

    /// Log level filter used when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "isolink".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            enable_traces: true,
            enable_metrics: true,
            enable_logs: true,
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl ObservabilityConfig {
    /// Create a new configuration with a custom service name
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Local logging only: no OTLP traces or metrics
    pub fn local(service_name: impl Into<String>) -> Self {
        Self::new(service_name).with_traces(false).with_metrics(false)
    }

    /// Configuration driven by the environment
    ///
    /// OTLP export (traces and metrics) is turned on only when
    /// `OTEL_EXPORTER_OTLP_ENDPOINT` is present; otherwise this is `local`.
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let export = std::env::var_os("OTEL_EXPORTER_OTLP_ENDPOINT").is_some();
        Self::new(service_name)
            .with_traces(export)
            .with_metrics(export)
    }

    /// Set the OTLP collector endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = endpoint.into();
        self
    }

    /// Set the log level filter ("error", "warn", "info", "debug", "trace")
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set the service version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    /// Enable or disable distributed tracing
    pub fn with_traces(mut self, enable: bool) -> Self {
        self.enable_traces = enable;
        self
    }

    /// Enable or disable metrics collection
    pub fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }

    /// Enable or disable structured logs
    pub fn with_logs(mut self, enable: bool) -> Self {
        self.enable_logs = enable;
        self
    }

    fn resource(&self) -> opentelemetry_sdk::Resource {
        opentelemetry_sdk::Resource::builder_empty()
            .with_attributes(vec![
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                    self.service_name.clone(),
                ),
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                    self.service_version.clone(),
                ),
            ])
            .build()
    }
}

/// Initialize observability with the given configuration
///
/// Sets up, in order: the OTLP tracer provider (if traces are enabled), the
/// OTLP meter provider (if metrics are enabled), and the global `tracing`
/// subscriber.
///
/// Call this **once** per process. A second call fails because the global
/// subscriber is already installed.
pub fn init_observability(
    config: ObservabilityConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // The subscriber needs the tracer, so the tracer comes first
    let tracer = if config.enable_traces {
        Some(init_tracer(&config)?)
    } else {
        None
    };

    if config.enable_metrics {
        init_metrics(&config)?;
    }

    init_tracing_subscriber(&config, tracer)?;

    tracing::info!(
        service_name = %config.service_name,
        otlp_endpoint = %config.otlp_endpoint,
        traces = config.enable_traces,
        metrics = config.enable_metrics,
        logs = config.enable_logs,
        "Observability initialized"
    );

    Ok(())
}

/// Build the OTLP span pipeline, register it globally and return its tracer
fn init_tracer(
    config: &ObservabilityConfig,
) -> Result<opentelemetry_sdk::trace::Tracer, Box<dyn std::error::Error + Send + Sync>> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler};

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(config.resource())
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .build();

    let tracer = provider.tracer(config.service_name.clone());
    let _ = TRACER_PROVIDER.set(provider.clone());
    global::set_tracer_provider(provider);

    Ok(tracer)
}

/// Build the OTLP metric pipeline (30s periodic export) and register it globally
fn init_metrics(
    config: &ObservabilityConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use opentelemetry_otlp::WithExportConfig;

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let reader = opentelemetry_sdk::metrics::PeriodicReader::builder(exporter)
        .with_interval(Duration::from_secs(30))
        .build();

    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(config.resource())
        .build();

    let _ = METER_PROVIDER.set(provider.clone());
    global::set_meter_provider(provider);
    Ok(())
}

/// Install the global subscriber
///
/// Layers: OpenTelemetry (when a tracer is given), `EnvFilter` from
/// `RUST_LOG` falling back to `config.log_level`, and a JSON fmt layer when
/// logs are enabled.
fn init_tracing_subscriber(
    config: &ObservabilityConfig,
    tracer: Option<opentelemetry_sdk::trace::Tracer>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let telemetry_layer = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    let fmt_layer = config.enable_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .json()
    });

    tracing_subscriber::registry()
        .with(telemetry_layer)
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Flush and stop observability
///
/// Shuts down the tracer and meter providers installed by
/// `init_observability`, exporting whatever spans and metrics are still
/// batched. Call it before the process exits; `std::process::exit` skips
/// destructors. Later calls are no-ops.
pub fn shutdown_observability() {
    tracing::info!("Shutting down observability");
    let stopped = shutdown_providers(TRACER_PROVIDER.get(), METER_PROVIDER.get());
    tracing::info!(providers = stopped, "Observability shutdown complete");
}

/// Shut down the given providers, returning how many actually stopped
fn shutdown_providers(
    tracer: Option<&SdkTracerProvider>,
    meter: Option<&SdkMeterProvider>,
) -> usize {
    let mut stopped = 0;
    if let Some(provider) = tracer {
        match provider.shutdown() {
            Ok(()) => stopped += 1,
            Err(e) => tracing::debug!(error = %e, "Tracer provider not shut down"),
        }
    }
    if let Some(provider) = meter {
        match provider.shutdown() {
            Ok(()) => stopped += 1,
            Err(e) => tracing::debug!(error = %e, "Meter provider not shut down"),
        }
    }
    stopped
}
