// SPDX-License-Identifier: MIT
//! HTTP transport: routing, graceful serving and termination signals.
use std::future::Future;

use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;

use crate::handler::{hello, AppState, HELLO_ROUTE};

/// The single instrumented route; any method is accepted.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(HELLO_ROUTE, any(hello))
        .with_state(state)
}

/// Serve `router` until `shutdown` resolves, then let in-flight requests finish.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM (Ctrl-C only on non-unix targets).
///
/// If a handler cannot be installed the error is logged and that source never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
