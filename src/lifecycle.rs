// SPDX-License-Identifier: MIT
//! Startup and shutdown orchestration.
//!
//! [`Service`] moves through [`LifecycleState`]s: it builds every pipeline up front, serves
//! until a termination future resolves, then drains the transport and shuts the providers
//! down in the fixed order traces → metrics → logs. One absolute deadline bounds the whole
//! drain; an overrun is reported, never waited out.
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use axum::Router;
use opentelemetry_sdk::error::OTelSdkResult;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::error::{Signal, TelemetryError};
use crate::handler::AppState;
use crate::server;
use crate::telemetry::Telemetry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Initializing,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleState::Initializing => "initializing",
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        })
    }
}

/// A provider that can be flushed and closed.
///
/// `close` blocks until the provider's worker has exported what it holds.
pub trait ProviderShutdown: Send + Sync + 'static {
    fn signal(&self) -> Signal;
    fn close(&self) -> OTelSdkResult;
}

/// Result of shutting down one provider.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub signal: Signal,
    pub result: Result<(), TelemetryError>,
}

/// Shut down `pipelines` one after another, each bounded by `deadline`.
///
/// Every `close` runs on its own detached thread, so a provider that overruns keeps flushing
/// in the background but never holds up the next one or process exit. `window` is only used
/// to label timeouts.
pub async fn shutdown_pipelines(
    pipelines: Vec<Arc<dyn ProviderShutdown>>,
    deadline: Instant,
    window: Duration,
) -> Vec<PipelineOutcome> {
    let mut outcomes = Vec::with_capacity(pipelines.len());
    for pipeline in pipelines {
        let signal = pipeline.signal();
        let result = close_before(pipeline, deadline, window).await;
        match &result {
            Ok(()) => tracing::info!(signal = %signal, "provider shut down"),
            Err(e) => tracing::warn!(signal = %signal, error = %e, "provider shutdown incomplete"),
        }
        outcomes.push(PipelineOutcome { signal, result });
    }
    outcomes
}

async fn close_before(
    pipeline: Arc<dyn ProviderShutdown>,
    deadline: Instant,
    window: Duration,
) -> Result<(), TelemetryError> {
    let signal = pipeline.signal();
    let component = format!("{signal} provider");
    let (tx, rx) = oneshot::channel();

    thread::Builder::new()
        .name(format!("{signal}-shutdown"))
        .spawn(move || {
            let _ = tx.send(pipeline.close());
        })
        .map_err(|e| TelemetryError::Shutdown {
            component: component.clone(),
            reason: e.to_string(),
        })?;

    match timeout_at(deadline, rx).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => Err(TelemetryError::from_sdk(signal, e)),
        Ok(Err(_)) => Err(TelemetryError::Shutdown {
            component,
            reason: "shutdown worker exited without reporting".into(),
        }),
        Err(_) => Err(TelemetryError::ShutdownTimeout {
            component,
            timeout: window,
        }),
    }
}

/// What happened while draining.
#[derive(Debug)]
pub struct ShutdownSummary {
    pub transport: Result<(), TelemetryError>,
    pub pipelines: Vec<PipelineOutcome>,
}

impl ShutdownSummary {
    pub fn is_clean(&self) -> bool {
        self.transport.is_ok() && self.pipelines.iter().all(|p| p.result.is_ok())
    }
}

/// The service: telemetry pipelines plus the HTTP transport that feeds them.
pub struct Service {
    telemetry: Telemetry,
    router: Router,
    shutdown_timeout: Duration,
}

impl Service {
    /// Build the OTLP pipelines, instruments and router from `config`.
    ///
    /// # Errors
    /// Any configuration or construction error; the caller is expected to exit.
    pub fn build(config: &AppConfig) -> Result<Self, TelemetryError> {
        tracing::debug!(state = %LifecycleState::Initializing, "building telemetry pipelines");
        let telemetry = Telemetry::init(&config.telemetry)?;
        let state = AppState::new(&telemetry, &config.greeting_source)?;
        Ok(Self::new(telemetry, server::router(state), config.shutdown_timeout))
    }

    pub fn new(telemetry: Telemetry, router: Router, shutdown_timeout: Duration) -> Self {
        Self {
            telemetry,
            router,
            shutdown_timeout,
        }
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Serve on `listener` until `terminate` resolves, then drain everything.
    ///
    /// Returns once the transport and all three providers have stopped or overrun the
    /// shutdown deadline.
    pub async fn run<F>(self, listener: TcpListener, terminate: F) -> ShutdownSummary
    where
        F: Future<Output = ()> + Send,
    {
        let Service {
            telemetry,
            router,
            shutdown_timeout,
        } = self;

        let token = CancellationToken::new();
        let mut server = tokio::spawn(server::serve(listener, router, token.clone().cancelled_owned()));
        tracing::info!(state = %LifecycleState::Running, "service started");

        let exited_early = tokio::select! {
            () = terminate => None,
            joined = &mut server => Some(joined),
        };

        tracing::info!(state = %LifecycleState::Draining, "Shutting down...");
        let deadline = Instant::now() + shutdown_timeout;
        token.cancel();

        let transport = match exited_early {
            Some(joined) => {
                tracing::error!("HTTP server exited before shutdown was requested");
                transport_result(joined)
            }
            None => match timeout_at(deadline, &mut server).await {
                Ok(joined) => transport_result(joined),
                Err(_) => {
                    server.abort();
                    Err(TelemetryError::ShutdownTimeout {
                        component: "http server".into(),
                        timeout: shutdown_timeout,
                    })
                }
            },
        };
        if let Err(e) = &transport {
            tracing::warn!(error = %e, "transport shutdown incomplete");
        }

        let pipelines = telemetry.shutdown_until(deadline, shutdown_timeout).await;
        let summary = ShutdownSummary {
            transport,
            pipelines,
        };
        tracing::info!(
            state = %LifecycleState::Stopped,
            clean = summary.is_clean(),
            "Shutdown complete"
        );
        summary
    }
}

fn transport_result(joined: Result<std::io::Result<()>, JoinError>) -> Result<(), TelemetryError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TelemetryError::Shutdown {
            component: "http server".into(),
            reason: e.to_string(),
        }),
        Err(e) => Err(TelemetryError::Shutdown {
            component: "http server".into(),
            reason: e.to_string(),
        }),
    }
}
