//! HTTP server
//!
//! Starts and manages the axum-based webhook server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use wb_core::config::Config;
use wb_core::guard::TokenGuard;
use wb_core::sync::{SyncToChat, SyncToInbox};
use wb_core::{Error, Result};

use crate::routes::routes;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub to_inbox: Arc<SyncToInbox>,
    pub to_chat: Arc<SyncToChat>,
    pub guard: Arc<TokenGuard>,
    /// Name of the live cache backend, reported by `/health`.
    pub cache_backend: &'static str,
}

/// Start the webhook server; runs until the listener fails.
pub async fn start_server(state: AppState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port)
        .parse()
        .map_err(|e| Error::Config(format!("bad listen address: {}", e)))?;

    let app = Router::new()
        .merge(routes())
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!("webhook server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
