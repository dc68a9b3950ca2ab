//! HTTP surface: `POST /share` and `GET /share/{filename}`.
//!
//! The router carries an explicitly constructed [`Relay`] as state; there is
//! no process-global registry.

mod audit;
mod error;
mod handlers;

pub use audit::{AuditEvent, log_audit_event};
pub use error::AppError;

use std::future::Future;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tracing::info;

use crate::constants::{MULTIPART_ENVELOPE_BYTES, SHARE_ROUTE};
use crate::relay::Relay;

/// Builds the share router.
///
/// Request bodies are capped at the upload ceiling plus room for the
/// multipart envelope; the relay enforces the exact ceiling on file bytes.
pub fn router(relay: Relay) -> Router {
    let body_limit = usize::try_from(relay.config().max_upload_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_ENVELOPE_BYTES);

    Router::new()
        .route(SHARE_ROUTE, post(handlers::upload))
        .route(&format!("{SHARE_ROUTE}/{{filename}}"), get(handlers::download))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(relay)
}

/// Serves the share router on `listener` until `shutdown` resolves, then
/// drains in-flight requests and stops the relay's expiry timers.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve<F>(listener: TcpListener, relay: Relay, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().context("Failed to read listen address")?;
    info!(%addr, "Share service listening");

    let app = router(relay.clone()).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")?;

    relay.shutdown();
    info!("Share service stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}
