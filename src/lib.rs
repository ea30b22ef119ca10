// SPDX-License-Identifier: MIT
//! A minimal HTTP service that emits correlated traces, metrics and logs over OTLP.
//!
//! Every request to `/hello` opens a span, increments a counter and emits a log record that
//! carries the span's trace id. All three signals are batched and pushed to one collector,
//! and the service drains them in a fixed order on SIGINT/SIGTERM.
//!
//! Modules, leaves first:
//! * [`config`] – endpoint, service identity and server settings from the environment.
//! * [`telemetry`] – resource, OTLP exporters and the three SDK providers.
//! * [`instruments`] – validated metric instruments.
//! * [`handler`] – the instrumented `/hello` handler and its [`handler::RequestContext`].
//! * [`server`] – routing, graceful serving and termination signals.
//! * [`lifecycle`] – [`lifecycle::Service`], which ties startup, serving and shutdown together.
//!
//! # Feature Flags
//! * `console-log` (default) – add a compact console formatter (file/line/thread id).
//! * `otlp-log` – also bridge `tracing` events into the OTLP log pipeline.
//!
//! # Quick Start
//! ```no_run
//! use hello_otel::config::AppConfig;
//! use hello_otel::lifecycle::Service;
//! use hello_otel::server::shutdown_signal;
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::default();
//!     let service = Service::build(&config)?;
//!     service.telemetry().install_subscriber()?;
//!     let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
//!     service.run(listener, shutdown_signal()).await;
//!     Ok(())
//! }
//! ```
pub mod config;
pub mod error;
pub mod handler;
pub mod instruments;
pub mod lifecycle;
pub mod server;
pub mod telemetry;

pub use error::{Signal, TelemetryError};
