// SPDX-License-Identifier: MIT
//! Process configuration sourced from environment variables.
//!
//! Values are read once in the `Default` impls; every field is an owned value so the
//! config can be moved into tasks freely.
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use url::Url;

use crate::error::TelemetryError;

/// Collector used when `OTEL_EXPORTER_OTLP_ENDPOINT` is unset.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:4318";
/// Port the `/hello` route is served on, on all interfaces.
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_METRIC_INTERVAL: Duration = Duration::from_secs(5);

const SCHEMES: [&str; 2] = ["http://", "https://"];

/// Configuration used when building the telemetry pipelines.
///
/// Values are sourced from environment variables if available:
/// * `OTEL_EXPORTER_OTLP_ENDPOINT` – base endpoint (e.g. `http://localhost:4318`).
/// * `OTEL_SERVICE_NAME` – service name resource attribute.
/// * `RUST_ENV` – deployment environment (added as `deployment.environment`).
/// * `OTEL_EXPORTER_OTLP_INSECURE` – must stay unset or `true`; exporters only speak plaintext HTTP.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Base OTLP endpoint, with or without scheme. Example: `http://localhost:4318`.
    pub endpoint: String,
    /// Service name reported in resource attributes (`service.name`).
    pub service_name: String,
    /// Service version reported in resource attributes (`service.version`).
    pub service_version: String,
    /// Deployment environment reported as `deployment.environment`.
    pub environment: String,
    /// Export over plaintext HTTP. `false` is rejected when the exporters are built.
    pub insecure: bool,
    /// How often the periodic reader pushes aggregated metrics.
    pub metric_interval: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            service_name: std::env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| env!("CARGO_PKG_NAME").to_string()),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: std::env::var("RUST_ENV").unwrap_or_else(|_| "dev".into()),
            insecure: std::env::var("OTEL_EXPORTER_OTLP_INSECURE")
                .map(|v| !v.trim().eq_ignore_ascii_case("false"))
                .unwrap_or(true),
            metric_interval: DEFAULT_METRIC_INTERVAL,
        }
    }
}

impl TelemetryConfig {
    /// Host (and optional port) the exporters connect to.
    ///
    /// # Errors
    /// [`TelemetryError::Config`] when the endpoint has no host or carries a path, query or fragment.
    pub fn endpoint_host(&self) -> Result<String, TelemetryError> {
        parse_host(&self.endpoint)
    }
}

/// Top-level service configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub telemetry: TelemetryConfig,
    pub listen_addr: SocketAddr,
    /// Upper bound for draining the transport and every provider.
    pub shutdown_timeout: Duration,
    /// Fills the `<source>` slot of `Hello from <source>!`.
    pub greeting_source: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            telemetry: TelemetryConfig::default(),
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            greeting_source: "Rust".to_string(),
        }
    }
}

/// Remove any leading `http://` / `https://`, trailing slashes and surrounding whitespace.
///
/// Repeated prefixes are all removed, so `strip_scheme(strip_scheme(x)) == strip_scheme(x)`.
pub fn strip_scheme(endpoint: &str) -> &str {
    let mut rest = endpoint.trim_start();
    while let Some(stripped) = SCHEMES.iter().find_map(|scheme| rest.strip_prefix(scheme)) {
        rest = stripped.trim_start();
    }
    rest.trim_end_matches(|c: char| c == '/' || c.is_whitespace())
}

/// Strip the scheme from `endpoint` and check that what remains is a bare authority.
pub fn parse_host(endpoint: &str) -> Result<String, TelemetryError> {
    let invalid = |reason: &str| TelemetryError::Config {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };

    let host = strip_scheme(endpoint);
    if host.is_empty() {
        return Err(invalid("no host"));
    }
    if host.contains(char::is_whitespace) {
        return Err(invalid("whitespace in host"));
    }
    let url = Url::parse(&format!("http://{host}")).map_err(|e| invalid(&e.to_string()))?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("no host"));
    }
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("path, query and fragment are not allowed"));
    }
    Ok(host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn strips_https_scheme() {
        assert_eq!(
            strip_scheme("https://collector.example:4318"),
            "collector.example:4318"
        );
    }

    #[test]
    fn strips_http_scheme_and_trailing_slash() {
        assert_eq!(strip_scheme("http://localhost:4318/"), "localhost:4318");
    }

    #[test]
    fn bare_host_is_untouched() {
        assert_eq!(strip_scheme("otel-collector:4318"), "otel-collector:4318");
    }

    #[test]
    fn stripping_is_idempotent() {
        for endpoint in [
            "http://localhost:4318",
            "https://collector.example:4318",
            "http://https://nested:1",
            "collector",
            "http://",
            "http://x /",
            "http:// http://x",
            " https://collector:4318/ / ",
        ] {
            let once = strip_scheme(endpoint);
            assert_eq!(strip_scheme(once), once, "endpoint {endpoint}");
            assert!(!once.starts_with("http://") && !once.starts_with("https://"));
            assert_eq!(once.trim(), once, "endpoint {endpoint}");
        }
        assert_eq!(strip_scheme("http:// http://x"), "x");
        assert_eq!(strip_scheme("http://x /"), "x");
    }

    #[test]
    fn parse_host_accepts_host_and_port() {
        assert_eq!(
            assert_ok!(parse_host("https://collector.example:4318")),
            "collector.example:4318"
        );
        assert_eq!(assert_ok!(parse_host("localhost")), "localhost");
    }

    #[test]
    fn parse_host_rejects_garbage() {
        for endpoint in [
            "",
            "http://",
            "https:///",
            "http://host:notaport",
            "http://host:4318/otel",
            "http://col lector:4318",
            "http://x\t:4318",
        ] {
            let err = assert_err!(parse_host(endpoint));
            assert!(matches!(err, TelemetryError::Config { .. }), "endpoint {endpoint:?}");
        }
    }

    #[test]
    fn endpoint_host_uses_configured_endpoint() {
        let cfg = TelemetryConfig {
            endpoint: "http://otel:4318".into(),
            ..TelemetryConfig::default()
        };
        assert_eq!(cfg.endpoint_host().unwrap(), "otel:4318");
    }
}
