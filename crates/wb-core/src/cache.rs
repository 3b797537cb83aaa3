//! Conversation cache port
//!
//! A key-value capability with four key namespaces:
//!
//! - `conv:{phone}`  cached phone -> Chatwoot conversation id
//! - `seen:{id}`     WuzAPI message ids already relayed (duplicate webhooks)
//! - `sent:{id}`     WhatsApp message ids we pushed from the inbox side
//! - `posted:{id}`   Chatwoot message ids we created from the phone side
//!
//! The cache is an optimization, never authoritative: a miss means
//! "unknown", and a stale link is overwritten on the next resolution
//! (last-writer-wins). Backends: Redis (durable, shared) and an in-process
//! map (volatile fallback); the sync engine must not care which is live.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Key for a cached phone -> conversation link.
pub fn conversation_key(canonical: &str) -> String {
    format!("conv:{}", canonical)
}

/// Key marking a WuzAPI message id as already relayed to the inbox.
pub fn seen_key(message_id: &str) -> String {
    format!("seen:{}", message_id)
}

/// Key marking a WhatsApp message id as one we sent from the inbox side.
pub fn sent_key(message_id: &str) -> String {
    format!("sent:{}", message_id)
}

/// Key marking a Chatwoot message id as one we posted from the phone side.
pub fn posted_key(message_id: &str) -> String {
    format!("posted:{}", message_id)
}

/// Key-value cache capability.
#[async_trait]
pub trait ConversationCache: Send + Sync {
    /// Look up a key. `Ok(None)` is a miss, not an error.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, optionally expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Remove a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Backend label for the health endpoint (`"redis"`, `"memory"`).
    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_namespaces_are_disjoint() {
        assert_eq!(conversation_key("573001234567"), "conv:573001234567");
        assert_eq!(seen_key("ABC"), "seen:ABC");
        assert_eq!(sent_key("ABC"), "sent:ABC");
        assert_eq!(posted_key("42"), "posted:42");
    }
}
