// SPDX-License-Identifier: MIT
//! The instrumented `/hello` handler.
//!
//! Each request opens a `hello-handler` span (child of any inbound `traceparent`), bumps the
//! `hello.requests` counter and emits one log record, all tied together by a
//! [`RequestContext`]. The span ends when that context is dropped, on every exit path.
use std::sync::Arc;
use std::time::SystemTime;

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use opentelemetry::logs::{AnyValue, LogRecord as _, Logger as _, Severity};
use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::logs::SdkLogger;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracer;
use serde::Serialize;

use crate::error::TelemetryError;
use crate::instruments::HelloInstruments;
use crate::telemetry::Telemetry;

pub const HELLO_ROUTE: &str = "/hello";
pub const HANDLER_SPAN: &str = "hello-handler";
pub const LOG_BODY: &str = "Hello endpoint called";

/// Shared, read-only handler state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    tracer: SdkTracer,
    logger: SdkLogger,
    instruments: HelloInstruments,
    propagator: TraceContextPropagator,
    greeting: String,
}

impl AppState {
    /// Look up the tracer, meter and logger on `telemetry` and create the instruments.
    ///
    /// # Errors
    /// [`TelemetryError::InstrumentCreation`] if the counter cannot be created.
    pub fn new(telemetry: &Telemetry, greeting_source: &str) -> Result<Self, TelemetryError> {
        let instruments = HelloInstruments::new(&telemetry.meter())?;
        Ok(Self {
            inner: Arc::new(Inner {
                tracer: telemetry.tracer(),
                logger: telemetry.logger(),
                instruments,
                propagator: TraceContextPropagator::new(),
                greeting: format!("Hello from {greeting_source}!"),
            }),
        })
    }

    /// Start the request span as a child of whatever context `headers` carry.
    pub fn begin(&self, method: &Method, headers: &HeaderMap) -> RequestContext {
        let parent = self.inner.propagator.extract(&HeaderExtractor(headers));
        let span = self
            .inner
            .tracer
            .span_builder(HANDLER_SPAN)
            .with_kind(SpanKind::Server)
            .with_attributes([
                KeyValue::new("http.method", method.as_str().to_owned()),
                KeyValue::new("http.route", HELLO_ROUTE),
            ])
            .start_with_context(&self.inner.tracer, &parent);
        RequestContext {
            cx: parent.with_span(span),
        }
    }

    /// Record the counter increment and log record for one request.
    ///
    /// Both calls only enqueue into the SDK; nothing here can fail the request.
    pub fn record(&self, request: &RequestContext) {
        let _attached = request.context().clone().attach();

        let attributes = [KeyValue::new("endpoint", HELLO_ROUTE)];
        self.inner.instruments.requests.add(1, &attributes);

        let logger = &self.inner.logger;
        let now = SystemTime::now();
        let span_context = request.context().span().span_context().clone();
        let mut record = logger.create_log_record();
        record.set_timestamp(now);
        record.set_observed_timestamp(now);
        record.set_severity_number(Severity::Info);
        record.set_severity_text("INFO");
        record.set_body(AnyValue::String(LOG_BODY.into()));
        record.add_attribute("endpoint", AnyValue::String(HELLO_ROUTE.into()));
        record.set_trace_context(
            span_context.trace_id(),
            span_context.span_id(),
            Some(span_context.trace_flags()),
        );
        logger.emit(record);
    }

    pub fn greeting(&self) -> &str {
        &self.inner.greeting
    }
}

/// Per-request correlation token carrying the active span.
///
/// Dropping it ends the span; ending is idempotent, so an explicit end earlier is harmless.
pub struct RequestContext {
    cx: Context,
}

impl RequestContext {
    pub fn context(&self) -> &Context {
        &self.cx
    }

    pub fn set_status(&self, status: Status) {
        self.cx.span().set_status(status);
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        self.cx.span().end();
    }
}

#[derive(Debug, Serialize)]
pub struct HelloResponse<'a> {
    pub message: &'a str,
}

/// `GET`/`POST`/any `/hello`.
pub async fn hello(State(state): State<AppState>, method: Method, headers: HeaderMap) -> Response {
    let payload = HelloResponse {
        message: state.greeting(),
    };
    respond(&state, &method, &headers, &payload)
}

/// Run the full instrumented request flow around `payload`.
///
/// Encoding failures answer `500` and mark the span as errored; they are not retried.
pub fn respond<T: Serialize>(
    state: &AppState,
    method: &Method,
    headers: &HeaderMap,
    payload: &T,
) -> Response {
    let request = state.begin(method, headers);
    state.record(&request);

    match encode_json(payload) {
        Ok(response) => {
            request.set_status(Status::Ok);
            response
        }
        Err(err) => {
            tracing::error!(route = HELLO_ROUTE, error = %err, "response encoding failed");
            request.set_status(Status::error(err.to_string()));
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode response").into_response()
        }
    }
}

fn encode_json<T: Serialize>(payload: &T) -> Result<Response, TelemetryError> {
    let body = serde_json::to_vec(payload)?;
    Ok((
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        body,
    )
        .into_response())
}

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}
