//! Inbox -> WhatsApp synchronization

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::{self, ConversationCache};
use crate::message::{Direction, Message, Source};
use crate::ports::ChatGateway;
use crate::{Result, SyncOutcome};

use super::{cache_get, cache_set};

/// How long a gateway-assigned id of a message we sent stays marked, so the
/// mirrored WuzAPI webhook for it is recognized. Webhooks arrive within
/// seconds; half a minute is plenty.
const SENT_TTL: Duration = Duration::from_secs(30);

/// Relays one agent-authored inbox message out to WhatsApp.
pub struct SyncToChat {
    chat: Arc<dyn ChatGateway>,
    cache: Arc<dyn ConversationCache>,
}

impl SyncToChat {
    pub fn new(chat: Arc<dyn ChatGateway>, cache: Arc<dyn ConversationCache>) -> Self {
        Self { chat, cache }
    }

    /// Relay a parsed Chatwoot message.
    pub async fn execute(&self, message: &Message) -> Result<SyncOutcome> {
        if message.source() != Source::Chatwoot {
            return Ok(SyncOutcome::Skipped("not an inbox event"));
        }

        if message.event_name() != Some("message_created") {
            return Ok(SyncOutcome::Skipped("not a message_created event"));
        }

        // Incoming mirrors of the customer's own messages appear on this
        // webhook too; sending them would echo the customer back to
        // themselves.
        if message.direction() != Direction::Outbound {
            debug!(message_id = message.id(), "not agent-authored, ignoring");
            return Ok(SyncOutcome::Skipped("not agent-authored"));
        }

        if message.is_private() {
            return Ok(SyncOutcome::Skipped("private note"));
        }

        match message.sender_type() {
            Some("user") | Some("agent_bot") => {}
            other => {
                debug!(message_id = message.id(), sender_type = ?other, "ignoring sender type");
                return Ok(SyncOutcome::Skipped("sender is not an agent"));
            }
        }

        // Outgoing messages we posted ourselves (phone-side replies synced
        // into the inbox) come back on this webhook; don't send them again.
        if cache_get(self.cache.as_ref(), &cache::posted_key(message.id()))
            .await
            .is_some()
        {
            debug!(message_id = message.id(), "loop detected, already synced from phone side");
            return Ok(SyncOutcome::Skipped("already synced from phone side"));
        }

        let phone = message.sender();
        let content = message.text_content();

        let gateway_id = if let Some(attachment) = message.attachments().first() {
            if attachment.data_url.is_empty() {
                warn!(message_id = message.id(), "attachment without data_url");
                return Ok(SyncOutcome::Skipped("attachment without data_url"));
            }

            match attachment.file_type.as_str() {
                "image" => self.chat.send_image(phone, &attachment.data_url, &content).await?,
                "video" => self.chat.send_video(phone, &attachment.data_url, &content).await?,
                "audio" => self.chat.send_audio(phone, &attachment.data_url).await?,
                "file" => {
                    self.chat
                        .send_document(phone, &attachment.data_url, &attachment.file_name)
                        .await?
                }
                other => {
                    // Unsupported attachment kind: degrade to text with a
                    // file pointer rather than dropping the message.
                    debug!(file_type = other, "unsupported attachment kind, sending as text");
                    let fallback = if content.is_empty() {
                        format!("[File: {}]", attachment.file_name)
                    } else {
                        format!("{}\n\n[File: {}]", content, attachment.file_name)
                    };
                    self.chat.send_text(phone, &fallback).await?
                }
            }
        } else if !content.is_empty() {
            self.chat.send_text(phone, &content).await?
        } else {
            return Ok(SyncOutcome::Skipped("empty message"));
        };

        info!(
            message_id = message.id(),
            phone = phone.canonical(),
            "message relayed to WhatsApp"
        );

        // Mark the gateway id so the mirrored IsFromMe webhook is dropped.
        if let Some(id) = gateway_id {
            cache_set(self.cache.as_ref(), &cache::sent_key(&id), "1", Some(SENT_TTL)).await;
        }

        Ok(SyncOutcome::Delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testutil::{FakeChat, MapCache, SentItem};
    use serde_json::{Value, json};

    fn chatwoot_event(message_type: &str, content: &str) -> Value {
        json!({
            "event": "message_created",
            "account": {"id": 2},
            "conversation": {
                "id": 91,
                "inbox_id": 7,
                "contact_inbox": {"source_id": "573001234567"}
            },
            "message": {
                "id": 555,
                "content": content,
                "message_type": message_type,
                "private": false,
                "sender": {"type": "user"}
            }
        })
    }

    #[tokio::test]
    async fn test_outgoing_text_is_sent() {
        let chat = Arc::new(FakeChat::with_assigned_id("WA9"));
        let cache = Arc::new(MapCache::default());
        let sync = SyncToChat::new(chat.clone(), cache.clone());

        let payload = chatwoot_event("outgoing", "¿Cómo te ayudo?");
        let message = Message::from_inbound_event(&payload).unwrap();

        let outcome = sync.execute(&message).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Delivered);

        let sent = chat.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0],
            SentItem::Text {
                phone: "573001234567".to_string(),
                body: "¿Cómo te ayudo?".to_string(),
            }
        );

        // The gateway id is marked so the mirrored webhook is suppressed.
        assert!(cache.get_sync("sent:WA9").is_some());
    }

    #[tokio::test]
    async fn test_agent_reply_to_group_is_sent() {
        let chat = Arc::new(FakeChat::default());
        let sync = SyncToChat::new(chat.clone(), Arc::new(MapCache::default()));

        // Group conversations carry the marked source id stored when the
        // group's first message was synced in.
        let mut payload = chatwoot_event("outgoing", "hola a todos");
        payload["conversation"]["contact_inbox"]["source_id"] =
            json!("group_573187267705-1551282257");

        let message = Message::from_inbound_event(&payload).unwrap();
        assert_eq!(sync.execute(&message).await.unwrap(), SyncOutcome::Delivered);

        let sent = chat.sent.lock().unwrap();
        assert_eq!(
            sent[0],
            SentItem::Text {
                phone: "573187267705-1551282257".to_string(),
                body: "hola a todos".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_incoming_mirror_is_not_echoed() {
        let chat = Arc::new(FakeChat::default());
        let sync = SyncToChat::new(chat.clone(), Arc::new(MapCache::default()));

        let payload = chatwoot_event("incoming", "Hola");
        let message = Message::from_inbound_event(&payload).unwrap();

        let outcome = sync.execute(&message).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Skipped("not agent-authored"));
        assert_eq!(chat.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_private_note_is_not_sent() {
        let chat = Arc::new(FakeChat::default());
        let sync = SyncToChat::new(chat.clone(), Arc::new(MapCache::default()));

        let mut payload = chatwoot_event("outgoing", "nota interna");
        payload["message"]["private"] = json!(true);

        let message = Message::from_inbound_event(&payload).unwrap();
        assert_eq!(
            sync.execute(&message).await.unwrap(),
            SyncOutcome::Skipped("private note")
        );
        assert_eq!(chat.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_contact_sender_is_ignored() {
        let chat = Arc::new(FakeChat::default());
        let sync = SyncToChat::new(chat.clone(), Arc::new(MapCache::default()));

        let mut payload = chatwoot_event("outgoing", "hola");
        payload["message"]["sender"] = json!({"type": "contact"});

        let message = Message::from_inbound_event(&payload).unwrap();
        assert_eq!(
            sync.execute(&message).await.unwrap(),
            SyncOutcome::Skipped("sender is not an agent")
        );
        assert_eq!(chat.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_phone_side_message_not_sent_twice() {
        let chat = Arc::new(FakeChat::default());
        let cache = Arc::new(MapCache::default());
        // SyncToInbox marked the inbox message it created.
        cache.put_sync("posted:555", "1");
        let sync = SyncToChat::new(chat.clone(), cache);

        let payload = chatwoot_event("outgoing", "respondo yo");
        let message = Message::from_inbound_event(&payload).unwrap();

        assert_eq!(
            sync.execute(&message).await.unwrap(),
            SyncOutcome::Skipped("already synced from phone side")
        );
        assert_eq!(chat.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_image_attachment_sent_with_caption() {
        let chat = Arc::new(FakeChat::default());
        let sync = SyncToChat::new(chat.clone(), Arc::new(MapCache::default()));

        let mut payload = chatwoot_event("outgoing", "mira esta foto");
        payload["message"]["attachments"] = json!([
            {"file_type": "image", "data_url": "https://cw.example.com/a.jpg", "file_name": "a.jpg"}
        ]);

        let message = Message::from_inbound_event(&payload).unwrap();
        sync.execute(&message).await.unwrap();

        let sent = chat.sent.lock().unwrap();
        assert_eq!(
            sent[0],
            SentItem::Image {
                phone: "573001234567".to_string(),
                url: "https://cw.example.com/a.jpg".to_string(),
                caption: "mira esta foto".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_file_attachment_sent_as_document() {
        let chat = Arc::new(FakeChat::default());
        let sync = SyncToChat::new(chat.clone(), Arc::new(MapCache::default()));

        let mut payload = chatwoot_event("outgoing", "");
        payload["message"]["attachments"] = json!([
            {"file_type": "file", "data_url": "https://cw.example.com/f.pdf", "file_name": "factura.pdf"}
        ]);

        let message = Message::from_inbound_event(&payload).unwrap();
        sync.execute(&message).await.unwrap();

        let sent = chat.sent.lock().unwrap();
        assert_eq!(
            sent[0],
            SentItem::Document {
                phone: "573001234567".to_string(),
                url: "https://cw.example.com/f.pdf".to_string(),
                filename: "factura.pdf".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_unsupported_attachment_falls_back_to_text() {
        let chat = Arc::new(FakeChat::default());
        let sync = SyncToChat::new(chat.clone(), Arc::new(MapCache::default()));

        let mut payload = chatwoot_event("outgoing", "toma");
        payload["message"]["attachments"] = json!([
            {"file_type": "fax", "data_url": "https://cw.example.com/x", "file_name": "x.bin"}
        ]);

        let message = Message::from_inbound_event(&payload).unwrap();
        sync.execute(&message).await.unwrap();

        let sent = chat.sent.lock().unwrap();
        match &sent[0] {
            SentItem::Text { body, .. } => {
                assert!(body.contains("toma"));
                assert!(body.contains("x.bin"));
            }
            other => panic!("expected text fallback, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_message_skipped() {
        let chat = Arc::new(FakeChat::default());
        let sync = SyncToChat::new(chat.clone(), Arc::new(MapCache::default()));

        let payload = chatwoot_event("outgoing", "");
        let message = Message::from_inbound_event(&payload).unwrap();

        assert_eq!(
            sync.execute(&message).await.unwrap(),
            SyncOutcome::Skipped("empty message")
        );
        assert_eq!(chat.sent_count(), 0);
    }
}
