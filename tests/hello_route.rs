// SPDX-License-Identifier: MIT
//! Request-level behaviour of `/hello`: response shape, span/metric/log correlation and
//! counter accuracy under concurrency.
//!
//! Requests go through `tower::ServiceExt::oneshot`; telemetry lands in the SDK's in-memory
//! exporters after an explicit flush.
mod common;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use common::{body_string, Harness};
use hello_otel::handler::{respond, AppState, HANDLER_SPAN, LOG_BODY};
use hello_otel::instruments::HELLO_REQUESTS;
use hello_otel::server::router;
use opentelemetry::trace::{SpanId, SpanKind, Status, TraceId};
use opentelemetry_sdk::trace::SpanData;
use serde::ser::{Error as _, Serialize, Serializer};
use tower::ServiceExt;

fn attribute(span: &SpanData, key: &str) -> Option<String> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.as_str().into_owned())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn get_hello_returns_json_greeting() {
    let harness = Harness::new();
    let app = router(AppState::new(&harness.telemetry, "Go").unwrap());

    let resp = app.oneshot(get("/hello")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    assert_eq!(body_string(resp).await, r#"{"message":"Hello from Go!"}"#);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn default_greeting_names_rust() {
    let harness = Harness::new();
    let app = router(AppState::new(&harness.telemetry, "Rust").unwrap());

    let resp = app.oneshot(get("/hello")).await.unwrap();
    assert_eq!(body_string(resp).await, r#"{"message":"Hello from Rust!"}"#);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn request_emits_span_counter_and_log() {
    let harness = Harness::new();
    let app = router(AppState::new(&harness.telemetry, "Rust").unwrap());

    let resp = app.oneshot(get("/hello")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    harness.telemetry.force_flush();

    let spans = harness.finished_spans();
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!(span.name, HANDLER_SPAN);
    assert_eq!(span.span_kind, SpanKind::Server);
    assert_eq!(span.status, Status::Ok);
    assert_eq!(attribute(span, "http.method"), Some("GET".to_string()));
    assert_eq!(attribute(span, "http.route"), Some("/hello".to_string()));

    assert_eq!(harness.counter_total(HELLO_REQUESTS), 1);

    let logs = harness.emitted_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].0, LOG_BODY);
    assert_eq!(logs[0].1, Some(span.span_context.trace_id()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn any_method_is_accepted_and_recorded() {
    let harness = Harness::new();
    let app = router(AppState::new(&harness.telemetry, "Rust").unwrap());

    let req = Request::builder()
        .method(Method::POST)
        .uri("/hello")
        .body(Body::from("ignored"))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    harness.telemetry.force_flush();
    let spans = harness.finished_spans();
    assert_eq!(attribute(&spans[0], "http.method"), Some("POST".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_route_is_not_instrumented() {
    let harness = Harness::new();
    let app = router(AppState::new(&harness.telemetry, "Rust").unwrap());

    let resp = app.oneshot(get("/goodbye")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    harness.telemetry.force_flush();
    assert!(harness.finished_spans().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn span_joins_inbound_trace() {
    let harness = Harness::new();
    let app = router(AppState::new(&harness.telemetry, "Rust").unwrap());

    let req = Request::builder()
        .uri("/hello")
        .header(
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        )
        .body(Body::empty())
        .unwrap();
    app.oneshot(req).await.unwrap();

    harness.telemetry.force_flush();
    let spans = harness.finished_spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(
        spans[0].span_context.trace_id(),
        TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap()
    );
    assert_eq!(
        spans[0].parent_span_id,
        SpanId::from_hex("00f067aa0ba902b7").unwrap()
    );
}

struct Unencodable;

impl Serialize for Unencodable {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(S::Error::custom("refusing to encode"))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn span_ends_even_when_encoding_fails() {
    let harness = Harness::new();
    let state = AppState::new(&harness.telemetry, "Rust").unwrap();

    let resp = respond(&state, &Method::GET, &HeaderMap::new(), &Unencodable);
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    harness.telemetry.force_flush();
    let spans = harness.finished_spans();
    assert_eq!(spans.len(), 1);
    assert!(matches!(spans[0].status, Status::Error { .. }));
    // Telemetry for the failed request is still recorded.
    assert_eq!(harness.counter_total(HELLO_REQUESTS), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_are_all_counted() {
    const N: usize = 64;
    let harness = Harness::new();
    let app = router(AppState::new(&harness.telemetry, "Rust").unwrap());

    let tasks: Vec<_> = (0..N)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move { app.oneshot(get("/hello")).await.unwrap().status() })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }

    harness.telemetry.force_flush();
    assert_eq!(harness.counter_total(HELLO_REQUESTS), N as u64);
    assert_eq!(harness.finished_spans().len(), N);
    assert_eq!(harness.emitted_logs().len(), N);
}
