//! WhatsApp -> inbox synchronization

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::{self, ConversationCache};
use crate::message::{Direction, Message, MessageKind, Source};
use crate::ports::{ChatGateway, InboxGateway};
use crate::{Result, SyncOutcome};

use super::{cache_get, cache_set};

/// How long a relayed WuzAPI message id stays marked (duplicate webhooks
/// typically arrive within seconds; a day covers delayed redeliveries).
const SEEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// How long an inbox message we created from the phone side stays marked,
/// so the Chatwoot webhook it triggers is recognized and not echoed back.
const POSTED_TTL: Duration = Duration::from_secs(60);

/// Relays one WhatsApp message into the configured inbox.
pub struct SyncToInbox {
    inbox: Arc<dyn InboxGateway>,
    chat: Arc<dyn ChatGateway>,
    cache: Arc<dyn ConversationCache>,
    conversation_ttl: Duration,
}

impl SyncToInbox {
    pub fn new(
        inbox: Arc<dyn InboxGateway>,
        chat: Arc<dyn ChatGateway>,
        cache: Arc<dyn ConversationCache>,
        conversation_ttl: Duration,
    ) -> Self {
        Self {
            inbox,
            chat,
            cache,
            conversation_ttl,
        }
    }

    /// Relay a parsed WuzAPI message.
    ///
    /// Failure is surfaced to the caller and never retried here; WuzAPI
    /// webhooks are at-least-once and will redeliver.
    pub async fn execute(&self, message: &Message) -> Result<SyncOutcome> {
        if message.source() != Source::Wuzapi {
            return Ok(SyncOutcome::Skipped("not a WhatsApp gateway event"));
        }

        // Duplicate webhook delivery for an id we already relayed.
        if cache_get(self.cache.as_ref(), &cache::seen_key(message.id()))
            .await
            .is_some()
        {
            debug!(message_id = message.id(), "duplicate delivery, already relayed");
            return Ok(SyncOutcome::Skipped("duplicate delivery"));
        }

        // A self-sent message that we ourselves pushed through the gateway
        // comes back mirrored on this webhook; relaying it would loop.
        if message.direction() == Direction::Outbound
            && cache_get(self.cache.as_ref(), &cache::sent_key(message.id()))
                .await
                .is_some()
        {
            debug!(message_id = message.id(), "echo of an inbox-sent message");
            return Ok(SyncOutcome::Skipped("echo of inbox-sent message"));
        }

        if matches!(message.kind(), MessageKind::Reaction | MessageKind::Unknown) {
            debug!(
                message_id = message.id(),
                kind = ?message.kind(),
                "unsupported message kind"
            );
            return Ok(SyncOutcome::Skipped("unsupported message kind"));
        }

        let conversation_id = self.resolve_conversation(message).await?;

        let inbox_message_id = match self.relay_media(message, conversation_id).await? {
            Some(id) => id,
            None => {
                let Some(content) = self.compose_content(message) else {
                    return Ok(SyncOutcome::Skipped("empty message"));
                };
                self.inbox
                    .post_message(conversation_id, &content, message.direction())
                    .await?
            }
        };

        info!(
            message_id = message.id(),
            conversation_id,
            direction = message.direction().as_message_type(),
            "message relayed to inbox"
        );

        cache_set(
            self.cache.as_ref(),
            &cache::seen_key(message.id()),
            "1",
            Some(SEEN_TTL),
        )
        .await;

        // Posting an outgoing message makes Chatwoot fire message_created;
        // mark it so SyncToChat does not send it back to WhatsApp.
        if message.direction() == Direction::Outbound {
            cache_set(
                self.cache.as_ref(),
                &cache::posted_key(&inbox_message_id.to_string()),
                "1",
                Some(POSTED_TTL),
            )
            .await;
        }

        Ok(SyncOutcome::Delivered)
    }

    /// Cache lookup, then idempotent find-or-create against the inbox.
    ///
    /// Two concurrent misses for the same phone both reach the gateway; its
    /// search-before-create contract converges them on one conversation id,
    /// and the last cache write wins.
    async fn resolve_conversation(&self, message: &Message) -> Result<i64> {
        let canonical = message.sender().canonical();
        let conv_key = cache::conversation_key(canonical);

        if let Some(id) = cache_get(self.cache.as_ref(), &conv_key)
            .await
            .and_then(|v| v.parse::<i64>().ok())
        {
            debug!(phone = canonical, conversation_id = id, "conversation cache hit");
            return Ok(id);
        }

        let avatar_url = if message.is_group() {
            None
        } else {
            // Best-effort; a missing avatar never blocks the relay.
            self.chat.fetch_avatar(message.sender()).await.unwrap_or(None)
        };

        let contact_id = self
            .inbox
            .ensure_contact(message.sender(), &message.display_name(), avatar_url.as_deref())
            .await?;

        // The source id round-trips through Chatwoot webhooks back into
        // PhoneNumber::parse, so groups must keep their marker here.
        let conversation_id = self
            .inbox
            .ensure_conversation(contact_id, &message.sender().source_id())
            .await?;

        cache_set(
            self.cache.as_ref(),
            &conv_key,
            &conversation_id.to_string(),
            Some(self.conversation_ttl),
        )
        .await;

        debug!(phone = canonical, contact_id, conversation_id, "conversation resolved");
        Ok(conversation_id)
    }

    /// Download a media message's bytes from the gateway and post them as a
    /// multipart attachment. `Ok(None)` means "not relayed as bytes": either
    /// the message carries no media or the download failed, and the caller
    /// falls back to posting the caption + reference line instead.
    async fn relay_media(&self, message: &Message, conversation_id: i64) -> Result<Option<i64>> {
        if !matches!(
            message.kind(),
            MessageKind::Image
                | MessageKind::Video
                | MessageKind::Audio
                | MessageKind::Document
                | MessageKind::Sticker
        ) {
            return Ok(None);
        }

        let (Some(payload), Some(media)) = (message.media_payload(), message.media_reference())
        else {
            return Ok(None);
        };

        let bytes = match self.chat.download_media(message.kind(), payload).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    message_id = message.id(),
                    error = %e,
                    "media download failed, posting reference instead"
                );
                return Ok(None);
            }
        };

        let mut caption = if media.caption.is_empty() {
            message.kind().placeholder().to_string()
        } else {
            media.caption.clone()
        };
        if message.is_group() {
            caption = format!("**{}:** {}", message.display_name(), caption);
        }

        let filename = media
            .filename
            .clone()
            .unwrap_or_else(|| generated_filename(message.id(), &bytes.mimetype));

        let id = self
            .inbox
            .post_attachment(
                conversation_id,
                &caption,
                message.direction(),
                bytes.data,
                &filename,
                &bytes.mimetype,
            )
            .await?;
        Ok(Some(id))
    }

    /// Build the inbox-side message body. `None` means nothing to post.
    fn compose_content(&self, message: &Message) -> Option<String> {
        let body = match message.kind() {
            MessageKind::Text => {
                let text = message.text_content();
                if text.is_empty() {
                    return None;
                }
                text
            }
            MessageKind::Image
            | MessageKind::Video
            | MessageKind::Audio
            | MessageKind::Document
            | MessageKind::Sticker => match message.media_reference() {
                Some(media) => {
                    let caption = if media.caption.is_empty() {
                        message.kind().placeholder().to_string()
                    } else {
                        media.caption.clone()
                    };
                    match &media.filename {
                        Some(name) => format!("{}\n{} ({}): {}", caption, name, media.mimetype, media.url),
                        None => format!("{}\n{}: {}", caption, media.mimetype, media.url),
                    }
                }
                None => message.kind().placeholder().to_string(),
            },
            MessageKind::Location | MessageKind::Contact => {
                message.kind().placeholder().to_string()
            }
            // Filtered out before composition.
            MessageKind::Reaction | MessageKind::Unknown => return None,
        };

        if message.is_group() {
            Some(format!("**{}:** {}", message.display_name(), body))
        } else {
            Some(body)
        }
    }
}

/// Filename for an attachment whose descriptor carries none, derived from
/// the mime subtype (`image/jpeg` -> `wa_<id>.jpeg`).
fn generated_filename(message_id: &str, mimetype: &str) -> String {
    let ext = mimetype
        .split('/')
        .nth(1)
        .and_then(|s| s.split(';').next())
        .filter(|s| !s.is_empty())
        .unwrap_or("bin");
    format!("wa_{}.{}", message_id, ext)
}
