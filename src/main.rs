// SPDX-License-Identifier: MIT
use anyhow::{Context, Result};
use hello_otel::config::AppConfig;
use hello_otel::lifecycle::Service;
use hello_otel::server::shutdown_signal;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::default();

    let service = Service::build(&config).context("failed to initialize telemetry")?;
    service
        .telemetry()
        .install_subscriber()
        .context("failed to initialize logging")?;

    info!(endpoint = %config.telemetry.endpoint, "Starting server with OTEL endpoint");
    info!(service_name = %config.telemetry.service_name, "Service name");

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    let summary = service.run(listener, shutdown_signal()).await;
    if !summary.is_clean() {
        info!("shutdown finished with errors; see warnings above");
    }
    Ok(())
}
