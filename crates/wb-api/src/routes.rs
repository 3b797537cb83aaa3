//! Route definitions

use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers::{chatwoot_webhook, health, root, wuzapi_webhook};
use crate::server::AppState;

/// Create the bridge router
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/webhook/wuzapi", post(wuzapi_webhook))
        .route("/webhook/chatwoot", post(chatwoot_webhook))
}
