//! Restore API server

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;

use rewind_restore::RestoreWorkflow;

use crate::error::Error;
use crate::handlers;

/// Default listen address
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to bind the server
    pub addr: SocketAddr,
}

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    /// Workflow every endpoint delegates to
    pub workflow: Arc<RestoreWorkflow>,
}

impl AppState {
    /// Wrap a workflow
    pub fn new(workflow: RestoreWorkflow) -> Self {
        Self {
            workflow: Arc::new(workflow),
        }
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/backups", get(handlers::list_backups))
        .route("/namespace/check", get(handlers::check_namespace))
        .route("/namespace/create", post(handlers::create_namespace))
        .route("/restore", post(handlers::start_restore))
        .route("/restore/plan", post(handlers::plan_restore))
        .route("/restore/status", get(handlers::restore_status))
        .route("/restore/summary", get(handlers::restore_summary))
        .route("/cluster/status", get(handlers::cluster_status))
        // Health check
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

/// Serve the API until `cancel` fires
pub async fn start_server(
    config: ServerConfig,
    state: AppState,
    cancel: CancellationToken,
) -> Result<(), Error> {
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .map_err(|e| Error::Server(format!("failed to bind {}: {}", config.addr, e)))?;

    info!(addr = %config.addr, "Starting restore API server");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| Error::Server(e.to_string()))?;

    info!("Restore API server stopped");
    Ok(())
}
