//! Webhook and status handlers
//!
//! Both webhook endpoints acknowledge with 200 regardless of relay outcome.
//! The senders are external platforms: a non-2xx answer makes them retry or
//! eventually disable the webhook, and neither helps with a message the
//! bridge chose to skip or failed to relay. Processing detail goes to the
//! logs instead.

use axum::{Json, extract::State};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, error, info};

use wb_core::message::Message;
use wb_core::sync::SyncOutcome;

use crate::server::AppState;

/// What the webhook body handling decided, for logging and tests.
#[derive(Debug)]
pub enum Disposition {
    Relayed,
    Skipped(&'static str),
    Discarded(&'static str),
    Failed(String),
}

/// Health report payload
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub token_configured: bool,
    pub chatwoot_url: String,
    pub wuzapi_url: String,
    pub inbox_id: String,
    pub cache_backend: &'static str,
}

/// Service info root
pub async fn root() -> Json<Value> {
    Json(json!({
        "service": "wb-bridge",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/health", "/webhook/wuzapi", "/webhook/chatwoot"],
    }))
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        token_configured: !state.config.wuzapi.instance_token.is_empty(),
        chatwoot_url: state.config.chatwoot.url.clone(),
        wuzapi_url: state.config.wuzapi.url.clone(),
        inbox_id: state.config.chatwoot.inbox_id.clone(),
        cache_backend: state.cache_backend,
    })
}

/// WuzAPI webhook: WhatsApp-side events into the inbox.
pub async fn wuzapi_webhook(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    let disposition = process_wuzapi_event(&state, &payload).await;
    log_disposition("wuzapi", &disposition);
    Json(json!({ "status": "ok" }))
}

/// Chatwoot webhook: agent activity out to WhatsApp.
pub async fn chatwoot_webhook(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    let disposition = process_chatwoot_event(&state, &payload).await;
    log_disposition("chatwoot", &disposition);
    Json(json!({ "status": "ok" }))
}

/// WuzAPI event pipeline: token guard, event-type filter, parse, relay.
/// The guard runs before any payload interpretation.
pub async fn process_wuzapi_event(state: &AppState, payload: &Value) -> Disposition {
    let presented = payload.get("token").and_then(Value::as_str);
    if !state.guard.permits(presented) {
        return Disposition::Discarded("instance token rejected");
    }

    // WuzAPI also posts presence, read receipts and connection events.
    let event_type = payload.get("type").and_then(Value::as_str).unwrap_or("");
    if event_type != "Message" {
        return Disposition::Skipped("not a message event");
    }

    let message = match Message::from_inbound_event(payload) {
        Ok(m) => m,
        Err(e) => return Disposition::Failed(format!("unparseable event: {}", e)),
    };

    match state.to_inbox.execute(&message).await {
        Ok(SyncOutcome::Delivered) => Disposition::Relayed,
        Ok(SyncOutcome::Skipped(reason)) => Disposition::Skipped(reason),
        Err(e) => Disposition::Failed(e.to_string()),
    }
}

/// Chatwoot event pipeline: event-name filter, parse, relay. Chatwoot
/// webhooks carry no shared secret; exposure control is the deployment's
/// network boundary.
pub async fn process_chatwoot_event(state: &AppState, payload: &Value) -> Disposition {
    // Chatwoot also posts conversation_created, conversation_updated and
    // similar lifecycle events, which carry no message to relay.
    let event_name = payload.get("event").and_then(Value::as_str).unwrap_or("");
    if event_name != "message_created" {
        return Disposition::Skipped("not a message_created event");
    }

    let message = match Message::from_inbound_event(payload) {
        Ok(m) => m,
        Err(e) => return Disposition::Failed(format!("unparseable event: {}", e)),
    };

    match state.to_chat.execute(&message).await {
        Ok(SyncOutcome::Delivered) => Disposition::Relayed,
        Ok(SyncOutcome::Skipped(reason)) => Disposition::Skipped(reason),
        Err(e) => Disposition::Failed(e.to_string()),
    }
}

fn log_disposition(source: &str, disposition: &Disposition) {
    match disposition {
        Disposition::Relayed => info!(source, "message relayed"),
        Disposition::Skipped(reason) => debug!(source, reason, "event skipped"),
        Disposition::Discarded(reason) => debug!(source, reason, "event discarded"),
        Disposition::Failed(reason) => error!(source, reason, "relay failed"),
    }
}
