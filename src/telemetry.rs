// SPDX-License-Identifier: MIT
//! Telemetry pipelines: resource, OTLP exporters and the three SDK providers.
//!
//! This module owns everything between an instrument call and the collector:
//!
//! * [`build_resource`] – service identity attached to every signal.
//! * [`OtlpExporters`] – one OTLP/HTTP exporter per signal, all pointed at the same host.
//! * [`Telemetry`] – tracer, meter and logger providers, owned explicitly instead of
//!   being registered in `opentelemetry::global`.
//!
//! Feature flags (Cargo features) influence [`Telemetry::install_subscriber`]:
//!
//! * `console-log` – add a compact console formatting layer.
//! * `otlp-log` – bridge `tracing` events into the OTLP log pipeline.
//!
//! # Example
//! ```no_run
//! use hello_otel::config::TelemetryConfig;
//! use hello_otel::telemetry::Telemetry;
//! # async fn run() -> anyhow::Result<()> {
//! let telemetry = Telemetry::init(&TelemetryConfig::default())?;
//! telemetry.install_subscriber()?;
//! // ... application logic ...
//! telemetry.shutdown(std::time::Duration::from_secs(10)).await;
//! # Ok(()) }
//! ```
//!
//! # Threading Model
//! Batch processors and the periodic metric reader each run on a dedicated worker thread
//! using the blocking HTTP client, so handlers never wait on the network. Shutdown is blocking
//! in the SDK and is therefore driven from `lifecycle` on detached threads.
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::logs::LoggerProvider as _;
use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(feature = "otlp-log")]
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, MetricExporter, Protocol, SpanExporter, WithExportConfig};
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::logs::{SdkLogger, SdkLoggerProvider};
use opentelemetry_sdk::metrics::exporter::PushMetricExporter;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use tokio::time::Instant;
use tracing_opentelemetry::OpenTelemetryLayer;
#[cfg(feature = "console-log")]
use tracing_subscriber::fmt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

use crate::config::TelemetryConfig;
use crate::error::{Signal, TelemetryError};
use crate::lifecycle::{shutdown_pipelines, PipelineOutcome, ProviderShutdown};

/// Instrumentation scope shared by the tracer, meter and logger.
pub const SCOPE_NAME: &str = "hello-otel";

/// Build the resource shared by all three providers.
///
/// The SDK default detectors (SDK name/version/language, `OTEL_RESOURCE_ATTRIBUTES`) are
/// merged underneath the explicit attributes below.
pub fn build_resource(cfg: &TelemetryConfig) -> Resource {
    Resource::builder()
        .with_service_name(cfg.service_name.clone())
        .with_attributes([
            KeyValue::new("service.version", cfg.service_version.clone()),
            KeyValue::new("deployment.environment", cfg.environment.clone()),
        ])
        .build()
}

/// The three OTLP exporters, one per signal.
pub struct OtlpExporters {
    pub spans: SpanExporter,
    pub metrics: MetricExporter,
    pub logs: LogExporter,
}

impl OtlpExporters {
    /// Build HTTP binary exporters for `host` (no scheme, e.g. `localhost:4318`).
    ///
    /// # Errors
    /// * [`TelemetryError::Config`] if `host` is not a bare authority or `insecure` is off.
    /// * [`TelemetryError::Construction`] if an exporter builder rejects its settings.
    pub fn new(host: &str, insecure: bool) -> Result<Self, TelemetryError> {
        let host = crate::config::parse_host(host)?;
        if !insecure {
            return Err(TelemetryError::Config {
                endpoint: host,
                reason: "TLS export is not supported; unset OTEL_EXPORTER_OTLP_INSECURE".into(),
            });
        }
        let endpoint = |signal: Signal| format!("http://{host}/{}", signal.path());

        let spans = SpanExporter::builder()
            .with_http()
            .with_protocol(Protocol::HttpBinary)
            .with_endpoint(endpoint(Signal::Traces))
            .build()
            .map_err(|source| TelemetryError::Construction {
                signal: Signal::Traces,
                source,
            })?;

        let metrics = MetricExporter::builder()
            .with_http()
            .with_protocol(Protocol::HttpBinary)
            .with_endpoint(endpoint(Signal::Metrics))
            .build()
            .map_err(|source| TelemetryError::Construction {
                signal: Signal::Metrics,
                source,
            })?;

        let logs = LogExporter::builder()
            .with_http()
            .with_protocol(Protocol::HttpBinary)
            .with_endpoint(endpoint(Signal::Logs))
            .build()
            .map_err(|source| TelemetryError::Construction {
                signal: Signal::Logs,
                source,
            })?;

        Ok(Self {
            spans,
            metrics,
            logs,
        })
    }
}

/// Owner of the tracer, meter and logger providers.
///
/// There is exactly one `Telemetry` per process; handlers get scoped tracers, meters and
/// loggers from it instead of from global state. [`Telemetry::shutdown`] consumes the value
/// so each provider is flushed and closed once.
pub struct Telemetry {
    resource: Resource,
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
    logger_provider: SdkLoggerProvider,
}

impl Telemetry {
    /// Build the OTLP pipelines described by `cfg`.
    ///
    /// # Errors
    /// Returns an error if the endpoint is invalid or any exporter builder fails.
    pub fn init(cfg: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let host = cfg.endpoint_host()?;
        let exporters = OtlpExporters::new(&host, cfg.insecure)?;
        Ok(Self::from_exporters(
            build_resource(cfg),
            exporters.spans,
            exporters.metrics,
            exporters.logs,
            cfg.metric_interval,
        ))
    }

    /// Wire arbitrary SDK exporters into batching providers.
    pub fn from_exporters<S, M, L>(
        resource: Resource,
        spans: S,
        metrics: M,
        logs: L,
        metric_interval: Duration,
    ) -> Self
    where
        S: opentelemetry_sdk::trace::SpanExporter + 'static,
        M: PushMetricExporter + 'static,
        L: opentelemetry_sdk::logs::LogExporter + 'static,
    {
        // Providers (batch exporter convenience builders spawn their worker threads)
        let tracer_provider = SdkTracerProvider::builder()
            .with_batch_exporter(spans)
            .with_resource(resource.clone())
            .build();

        let reader = PeriodicReader::builder(metrics)
            .with_interval(metric_interval)
            .build();
        let meter_provider = SdkMeterProvider::builder()
            .with_reader(reader)
            .with_resource(resource.clone())
            .build();

        let logger_provider = SdkLoggerProvider::builder()
            .with_batch_exporter(logs)
            .with_resource(resource.clone())
            .build();

        Self {
            resource,
            tracer_provider,
            meter_provider,
            logger_provider,
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn tracer(&self) -> SdkTracer {
        self.tracer_provider.tracer_with_scope(scope())
    }

    pub fn meter(&self) -> Meter {
        self.meter_provider.meter_with_scope(scope())
    }

    pub fn logger(&self) -> SdkLogger {
        self.logger_provider.logger_with_scope(scope())
    }

    /// Install the global `tracing` subscriber for diagnostics.
    ///
    /// Layers: env filter, optional console formatter (`console-log`), optional OTLP log bridge
    /// (`otlp-log`), and a `tracing-opentelemetry` layer backed by this tracer provider.
    ///
    /// # Errors
    /// [`TelemetryError::Subscriber`] if a global subscriber is already set.
    pub fn install_subscriber(&self) -> Result<(), TelemetryError> {
        // The exporters' own HTTP stack must not feed back into the log pipeline.
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,hyper=off,h2=off,reqwest=off"));

        // Console formatting: plain compact single-line output.
        #[cfg(feature = "console-log")]
        let console = Some(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        );
        #[cfg(not(feature = "console-log"))]
        let console: Option<tracing_subscriber::layer::Identity> = None;

        #[cfg(feature = "otlp-log")]
        let bridge = Some(OpenTelemetryTracingBridge::new(&self.logger_provider));
        #[cfg(not(feature = "otlp-log"))]
        let bridge: Option<tracing_subscriber::layer::Identity> = None;

        let otel_trace_layer = OpenTelemetryLayer::new(self.tracer());

        Registry::default()
            .with(filter)
            .with(console)
            .with(bridge)
            .with(otel_trace_layer)
            .try_init()?;
        Ok(())
    }

    /// Push everything buffered so far to the exporters.
    ///
    /// Failures are logged; flushing is best effort and never fails the caller.
    pub fn force_flush(&self) {
        if let Err(e) = self.tracer_provider.force_flush() {
            tracing::warn!(signal = %Signal::Traces, error = %e, "flush failed");
        }
        if let Err(e) = self.meter_provider.force_flush() {
            tracing::warn!(signal = %Signal::Metrics, error = %e, "flush failed");
        }
        if let Err(e) = self.logger_provider.force_flush() {
            tracing::warn!(signal = %Signal::Logs, error = %e, "flush failed");
        }
    }

    /// The providers in shutdown order: traces, metrics, logs.
    pub fn pipelines(&self) -> Vec<Arc<dyn ProviderShutdown>> {
        vec![
            Arc::new(self.tracer_provider.clone()),
            Arc::new(self.meter_provider.clone()),
            Arc::new(self.logger_provider.clone()),
        ]
    }

    /// Flush and shut down all providers, each bounded by the same `timeout` window.
    pub async fn shutdown(self, timeout: Duration) -> Vec<PipelineOutcome> {
        self.shutdown_until(Instant::now() + timeout, timeout).await
    }

    /// Shut down against an absolute `deadline` shared with other components.
    pub async fn shutdown_until(self, deadline: Instant, window: Duration) -> Vec<PipelineOutcome> {
        shutdown_pipelines(self.pipelines(), deadline, window).await
    }
}

fn scope() -> InstrumentationScope {
    InstrumentationScope::builder(SCOPE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .build()
}

impl ProviderShutdown for SdkTracerProvider {
    fn signal(&self) -> Signal {
        Signal::Traces
    }

    fn close(&self) -> OTelSdkResult {
        self.shutdown()
    }
}

impl ProviderShutdown for SdkMeterProvider {
    fn signal(&self) -> Signal {
        Signal::Metrics
    }

    fn close(&self) -> OTelSdkResult {
        self.shutdown()
    }
}

impl ProviderShutdown for SdkLoggerProvider {
    fn signal(&self) -> Signal {
        Signal::Logs
    }

    fn close(&self) -> OTelSdkResult {
        self.shutdown()
    }
}
