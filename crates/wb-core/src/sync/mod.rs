//! Message synchronization use cases
//!
//! One use case per direction. Both report the outcome to the caller and
//! never retry internally: the upstream webhook sender's own redelivery is
//! the retry mechanism.

mod to_chat;
mod to_inbox;

pub use to_chat::SyncToChat;
pub use to_inbox::SyncToInbox;

use std::time::Duration;

use tracing::warn;

use crate::cache::ConversationCache;

/// Result of one sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The message was handed to the target platform.
    Delivered,
    /// The message was intentionally not relayed.
    Skipped(&'static str),
}

/// Cache read that degrades to a miss on backend failure.
///
/// The cache is never authoritative, so an unavailable backend must not
/// fail the message being processed.
pub(crate) async fn cache_get(cache: &dyn ConversationCache, key: &str) -> Option<String> {
    match cache.get(key).await {
        Ok(value) => value,
        Err(e) => {
            warn!(key, error = %e, "cache read failed, treating as miss");
            None
        }
    }
}

/// Cache write that logs and moves on when the backend is unavailable.
pub(crate) async fn cache_set(
    cache: &dyn ConversationCache,
    key: &str,
    value: &str,
    ttl: Option<Duration>,
) {
    if let Err(e) = cache.set(key, value, ttl).await {
        warn!(key, error = %e, "cache write failed, continuing");
    }
}
