// SPDX-License-Identifier: MIT
//! Error taxonomy for telemetry setup, request handling and shutdown.
//!
//! Startup variants ([`TelemetryError::Config`], [`TelemetryError::Construction`],
//! [`TelemetryError::InstrumentCreation`], [`TelemetryError::Subscriber`]) are fatal.
//! Shutdown variants are logged and never stop the remaining pipelines from draining.
//! [`TelemetryError::RequestEncoding`] stays local to the request that produced it.
use std::fmt;
use std::time::Duration;

use opentelemetry_otlp::ExporterBuildError;
use opentelemetry_sdk::error::OTelSdkError;
use thiserror::Error;

/// The three telemetry signals, each with its own exporter and provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    Traces,
    Metrics,
    Logs,
}

impl Signal {
    /// OTLP/HTTP path for this signal, relative to the collector base URL.
    pub fn path(self) -> &'static str {
        match self {
            Signal::Traces => "v1/traces",
            Signal::Metrics => "v1/metrics",
            Signal::Logs => "v1/logs",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Signal::Traces => "traces",
            Signal::Metrics => "metrics",
            Signal::Logs => "logs",
        })
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The collector endpoint could not be turned into a usable host.
    #[error("invalid collector endpoint `{endpoint}`: {reason}")]
    Config { endpoint: String, reason: String },

    #[error("failed to build {signal} exporter")]
    Construction {
        signal: Signal,
        #[source]
        source: ExporterBuildError,
    },

    #[error("invalid instrument `{name}`: {reason}")]
    InstrumentCreation { name: String, reason: &'static str },

    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),

    #[error("{component} did not shut down within {timeout:?}")]
    ShutdownTimeout { component: String, timeout: Duration },

    #[error("{component} shutdown failed: {reason}")]
    Shutdown { component: String, reason: String },

    #[error("failed to encode response body")]
    RequestEncoding(#[from] serde_json::Error),
}

impl TelemetryError {
    /// Map an SDK shutdown error for `signal` onto the crate taxonomy.
    ///
    /// SDK-side timeouts keep their own duration; anything else becomes [`TelemetryError::Shutdown`].
    pub fn from_sdk(signal: Signal, err: OTelSdkError) -> Self {
        let component = format!("{signal} provider");
        match err {
            OTelSdkError::Timeout(timeout) => TelemetryError::ShutdownTimeout { component, timeout },
            other => TelemetryError::Shutdown {
                component,
                reason: other.to_string(),
            },
        }
    }

    /// True for both transport and provider deadline overruns.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TelemetryError::ShutdownTimeout { .. })
    }
}
