//! Outbound capability ports
//!
//! The sync engine talks to the outside world through these traits only.
//! `wb-chatwoot` and `wb-wuzapi` provide the HTTP-backed implementations;
//! tests substitute counting doubles.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::message::{Direction, MessageKind};
use crate::phone::PhoneNumber;

/// Decoded media fetched from the chat gateway.
#[derive(Debug, Clone)]
pub struct MediaBytes {
    pub data: Vec<u8>,
    pub mimetype: String,
}

/// Customer-support inbox platform (Chatwoot).
///
/// `ensure_*` operations must be idempotent: search by identifier before
/// create, so repeated calls for the same phone converge on one
/// contact/conversation pair. That contract absorbs concurrent cache misses
/// without cross-request locking.
#[async_trait]
pub trait InboxGateway: Send + Sync {
    /// Find or create a contact keyed by canonical phone. Returns the
    /// contact id.
    async fn ensure_contact(
        &self,
        phone: &PhoneNumber,
        display_name: &str,
        avatar_url: Option<&str>,
    ) -> Result<i64>;

    /// Find or create a conversation for the contact in the configured
    /// inbox. Returns the conversation id.
    async fn ensure_conversation(&self, contact_id: i64, source_id: &str) -> Result<i64>;

    /// Post a text message onto a conversation, tagged with the given
    /// direction so the platform attributes it to customer or agent.
    /// Returns the created message id.
    async fn post_message(
        &self,
        conversation_id: i64,
        content: &str,
        direction: Direction,
    ) -> Result<i64>;

    /// Post a message carrying one file attachment (multipart upload).
    /// Returns the created message id.
    async fn post_attachment(
        &self,
        conversation_id: i64,
        content: &str,
        direction: Direction,
        data: Vec<u8>,
        filename: &str,
        mimetype: &str,
    ) -> Result<i64>;
}

/// WhatsApp gateway (WuzAPI).
///
/// Send operations take the parsed phone and re-apply the gateway's own
/// addressing convention internally.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Send plain text. Returns the gateway-assigned message id when the
    /// gateway reports one (used for echo suppression).
    async fn send_text(&self, phone: &PhoneNumber, body: &str) -> Result<Option<String>>;

    /// Send an image by public URL with an optional caption.
    async fn send_image(&self, phone: &PhoneNumber, url: &str, caption: &str) -> Result<Option<String>>;

    /// Send a video by public URL with an optional caption.
    async fn send_video(&self, phone: &PhoneNumber, url: &str, caption: &str) -> Result<Option<String>>;

    /// Send an audio file by public URL.
    async fn send_audio(&self, phone: &PhoneNumber, url: &str) -> Result<Option<String>>;

    /// Send a document by public URL with a filename.
    async fn send_document(&self, phone: &PhoneNumber, url: &str, filename: &str) -> Result<Option<String>>;

    /// Download and decode the media object of a received message. The
    /// raw media descriptor is passed through untouched; the gateway needs
    /// its key material to decrypt the blob.
    async fn download_media(&self, kind: MessageKind, media: &Value) -> Result<MediaBytes>;

    /// Profile picture URL for a contact, when available. Best-effort.
    async fn fetch_avatar(&self, phone: &PhoneNumber) -> Result<Option<String>>;
}
