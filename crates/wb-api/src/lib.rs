//! wb-api: HTTP surface of the bridge
//!
//! Two webhook receivers (WuzAPI and Chatwoot), a health report and a
//! service-info root. Webhooks always acknowledge with 200 once the body
//! parses as JSON; relay failures are logged, never bounced back to the
//! sender, so neither platform disables the webhook over a transient error.

pub mod handlers;
pub mod routes;
pub mod server;

pub use server::{AppState, start_server};
