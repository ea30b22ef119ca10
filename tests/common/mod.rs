// SPDX-License-Identifier: MIT
//! Shared fixtures: telemetry wired to the SDK's in-memory exporters.
#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::Response;
use hello_otel::config::TelemetryConfig;
use hello_otel::telemetry::{build_resource, Telemetry};
use opentelemetry::logs::AnyValue;
use opentelemetry::trace::TraceId;
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::logs::{LogBatch, LogExporter, SdkLogRecord};
use opentelemetry_sdk::metrics::data::{AggregatedMetrics, MetricData};
use opentelemetry_sdk::metrics::InMemoryMetricExporter;
use opentelemetry_sdk::trace::{InMemorySpanExporter, InMemorySpanExporterBuilder, SpanData};

/// Log exporter that keeps every exported record, including across `shutdown`.
#[derive(Clone, Debug, Default)]
pub struct RecordingLogs {
    records: Arc<Mutex<Vec<SdkLogRecord>>>,
}

impl RecordingLogs {
    pub fn records(&self) -> Vec<SdkLogRecord> {
        self.records.lock().expect("log records").clone()
    }
}

impl LogExporter for RecordingLogs {
    fn export(&self, batch: LogBatch<'_>) -> impl Future<Output = OTelSdkResult> + Send {
        self.records
            .lock()
            .expect("log records")
            .extend(batch.iter().map(|(record, _scope)| record.clone()));
        std::future::ready(Ok(()))
    }
}

pub struct Harness {
    pub telemetry: Telemetry,
    pub spans: InMemorySpanExporter,
    pub metrics: InMemoryMetricExporter,
    pub logs: RecordingLogs,
}

impl Harness {
    pub fn new() -> Self {
        let spans = InMemorySpanExporterBuilder::new().build();
        let metrics = InMemoryMetricExporter::default();
        let logs = RecordingLogs::default();
        let cfg = TelemetryConfig {
            service_name: "hello-otel-test".into(),
            ..TelemetryConfig::default()
        };
        let telemetry = Telemetry::from_exporters(
            build_resource(&cfg),
            spans.clone(),
            metrics.clone(),
            logs.clone(),
            Duration::from_secs(60),
        );
        Self {
            telemetry,
            spans,
            metrics,
            logs,
        }
    }

    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.spans.get_finished_spans().expect("finished spans")
    }

    /// `(body, trace id)` for every exported log record.
    pub fn emitted_logs(&self) -> Vec<(String, Option<TraceId>)> {
        self.logs
            .records()
            .iter()
            .map(|record| {
                let body = match record.body() {
                    Some(AnyValue::String(s)) => s.as_str().to_string(),
                    other => format!("{other:?}"),
                };
                (body, record.trace_context().map(|tc| tc.trace_id))
            })
            .collect()
    }

    /// Latest cumulative value of the `u64` sum `name`, across all data points.
    pub fn counter_total(&self, name: &str) -> u64 {
        let exported = self.metrics.get_finished_metrics().expect("finished metrics");
        exported
            .iter()
            .rev()
            .find_map(|resource_metrics| {
                resource_metrics
                    .scope_metrics()
                    .flat_map(|scope| scope.metrics())
                    .find(|metric| metric.name() == name)
                    .map(|metric| match metric.data() {
                        AggregatedMetrics::U64(MetricData::Sum(sum)) => {
                            sum.data_points().map(|dp| dp.value()).sum()
                        }
                        _ => 0,
                    })
            })
            .unwrap_or(0)
    }
}

pub async fn body_string(resp: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}
