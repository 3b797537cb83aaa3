//! Unified message entity
//!
//! Two unrelated webhook shapes funnel into one read-only `Message`:
//! WuzAPI delivers `{type, token, event: {Info, Message}}` and Chatwoot
//! delivers `{event: "message_created", conversation, message}`. The
//! dispatcher probes the payload structure and hands off to the matching
//! parser; a payload matching neither shape is a recoverable drop, not a
//! fatal error.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::phone::PhoneNumber;

/// Which platform produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Wuzapi,
    Chatwoot,
}

/// Message direction relative to the WhatsApp customer.
///
/// A self-sent WhatsApp message (`IsFromMe`) is `Outbound` even though it
/// arrives on the inbound webhook path: it must never be echoed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    /// Chatwoot's `message_type` string for this direction.
    pub fn as_message_type(&self) -> &'static str {
        match self {
            Direction::Inbound => "incoming",
            Direction::Outbound => "outgoing",
        }
    }
}

/// Content classification, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Location,
    Contact,
    Reaction,
    Unknown,
}

impl MessageKind {
    /// Map WuzAPI's `Info.Type` / `Info.MediaType` strings.
    fn from_wuzapi_type(value: &str) -> Option<Self> {
        match value {
            "text" | "url" => Some(Self::Text),
            "image" | "imageMessage" => Some(Self::Image),
            "video" | "videoMessage" => Some(Self::Video),
            "audio" | "ptt" | "voiceMessage" | "audioMessage" => Some(Self::Audio),
            "document" | "documentMessage" | "documentWithCaptionMessage" => Some(Self::Document),
            "sticker" | "stickerMessage" => Some(Self::Sticker),
            "location" | "locationMessage" => Some(Self::Location),
            "contact" | "contactMessage" => Some(Self::Contact),
            "reaction" | "reactionMessage" => Some(Self::Reaction),
            _ => None,
        }
    }

    /// Infer the kind from the variant key of `event.Message`.
    fn infer_from_variant(message: &Value) -> Self {
        let Some(map) = message.as_object() else {
            return Self::Unknown;
        };

        if map.contains_key("conversation") || map.contains_key("extendedTextMessage") {
            Self::Text
        } else if map.contains_key("imageMessage") {
            Self::Image
        } else if map.contains_key("videoMessage") {
            Self::Video
        } else if map.contains_key("audioMessage") {
            Self::Audio
        } else if map.contains_key("documentMessage")
            || map.contains_key("documentWithCaptionMessage")
        {
            Self::Document
        } else if map.contains_key("stickerMessage") {
            Self::Sticker
        } else if map.contains_key("locationMessage") {
            Self::Location
        } else if map.contains_key("contactMessage") {
            Self::Contact
        } else if map.contains_key("reactionMessage") {
            Self::Reaction
        } else {
            Self::Unknown
        }
    }

    /// Uppercase placeholder tag for non-text content (`[IMAGE]`, ...).
    pub fn placeholder(&self) -> &'static str {
        match self {
            Self::Text => "[TEXT]",
            Self::Image => "[IMAGE]",
            Self::Video => "[VIDEO]",
            Self::Audio => "[AUDIO]",
            Self::Document => "[DOCUMENT]",
            Self::Sticker => "[STICKER]",
            Self::Location => "[LOCATION]",
            Self::Contact => "[CONTACT]",
            Self::Reaction => "[REACTION]",
            Self::Unknown => "[UNKNOWN]",
        }
    }
}

/// Reference to a media object carried by a WuzAPI message.
#[derive(Debug, Clone)]
pub struct MediaReference {
    pub url: String,
    pub mimetype: String,
    pub filename: Option<String>,
    pub caption: String,
}

/// Attachment metadata from a Chatwoot message.
#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub data_url: String,
    #[serde(default)]
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
struct WuzapiInfo {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Chat", default)]
    chat: String,
    #[serde(rename = "SenderAlt", default)]
    sender_alt: String,
    #[serde(rename = "IsFromMe", default)]
    is_from_me: bool,
    #[serde(rename = "IsGroup", default)]
    is_group: bool,
    #[serde(rename = "Timestamp", default)]
    timestamp: String,
    #[serde(rename = "Type", default)]
    kind: String,
    #[serde(rename = "MediaType", default)]
    media_type: String,
    #[serde(rename = "PushName", default)]
    push_name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ChatwootSender {
    #[serde(rename = "type", default)]
    sender_type: String,
}

#[derive(Debug, Default, Deserialize)]
struct ChatwootMessage {
    id: Option<i64>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    message_type: String,
    #[serde(default)]
    private: bool,
    #[serde(default)]
    sender: Option<ChatwootSender>,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

/// One inbound event, normalized.
///
/// Identity is (source, id). Read-only after construction; the raw payload
/// is retained for diagnostics and never persisted past the request.
#[derive(Debug, Clone)]
pub struct Message {
    source: Source,
    id: String,
    sender: PhoneNumber,
    direction: Direction,
    kind: MessageKind,
    timestamp: DateTime<Utc>,
    push_name: Option<String>,
    is_group: bool,
    // Chatwoot-only fields
    event_name: Option<String>,
    content: String,
    private: bool,
    sender_type: Option<String>,
    attachments: Vec<Attachment>,
    raw: Value,
}

impl Message {
    /// Parse either platform's webhook payload into a `Message`.
    ///
    /// Dispatch probes the root: an `event` object with an `Info` member is
    /// WuzAPI; an `event` string is Chatwoot. Anything else is
    /// `UnparseableMessage` and should be logged and dropped by the caller.
    pub fn from_inbound_event(payload: &Value) -> Result<Self> {
        match payload.get("event") {
            Some(Value::Object(event)) if event.contains_key("Info") => {
                Self::from_wuzapi_event(payload)
            }
            Some(Value::String(_)) => Self::from_chatwoot_event(payload),
            _ => Err(Error::UnparseableMessage(
                "payload matches neither WuzAPI nor Chatwoot shape".to_string(),
            )),
        }
    }

    /// Parse a WuzAPI `Message` event.
    pub fn from_wuzapi_event(payload: &Value) -> Result<Self> {
        let info_value = payload
            .get("event")
            .and_then(|e| e.get("Info"))
            .cloned()
            .ok_or_else(|| Error::UnparseableMessage("missing event.Info".to_string()))?;

        let info: WuzapiInfo = serde_json::from_value(info_value)
            .map_err(|e| Error::UnparseableMessage(format!("bad event.Info: {}", e)))?;

        if info.id.is_empty() {
            return Err(Error::UnparseableMessage("missing message id".to_string()));
        }

        // LID chats hide the real JID; fall back to SenderAlt when it is a
        // regular user JID, otherwise the sender cannot be resolved.
        let mut chat = info.chat.clone();
        if chat.contains("@lid") {
            if info.sender_alt.contains("@s.whatsapp.net") {
                chat = info.sender_alt.clone();
            } else {
                return Err(Error::UnparseableMessage(format!(
                    "LID chat without resolvable sender: {}",
                    chat
                )));
            }
        }
        if chat.is_empty() {
            return Err(Error::UnparseableMessage("missing event.Info.Chat".to_string()));
        }

        let sender = PhoneNumber::parse(&chat)?;

        let timestamp = DateTime::parse_from_rfc3339(&info.timestamp)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let message_body = payload
            .get("event")
            .and_then(|e| e.get("Message"))
            .cloned()
            .unwrap_or(Value::Null);

        // "media" is a wrapper; the concrete kind sits in MediaType.
        let type_str = if info.kind == "media" && !info.media_type.is_empty() {
            info.media_type.as_str()
        } else {
            info.kind.as_str()
        };
        let kind = MessageKind::from_wuzapi_type(type_str)
            .unwrap_or_else(|| MessageKind::infer_from_variant(&message_body));

        let direction = if info.is_from_me {
            Direction::Outbound
        } else {
            Direction::Inbound
        };

        let push_name = if info.push_name.is_empty() {
            None
        } else {
            Some(info.push_name.clone())
        };

        Ok(Self {
            source: Source::Wuzapi,
            id: info.id,
            sender,
            direction,
            kind,
            timestamp,
            push_name,
            is_group: info.is_group,
            event_name: None,
            content: String::new(),
            private: false,
            sender_type: None,
            attachments: Vec::new(),
            raw: payload.clone(),
        })
    }

    /// Parse a Chatwoot webhook payload.
    ///
    /// Prefers the nested `message` object; older payload layouts carry the
    /// same fields at the root, so those are the fallback.
    pub fn from_chatwoot_event(payload: &Value) -> Result<Self> {
        let event_name = payload
            .get("event")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::UnparseableMessage("missing event name".to_string()))?
            .to_string();

        let message_value = payload.get("message").cloned().unwrap_or_else(|| payload.clone());
        let message: ChatwootMessage = serde_json::from_value(message_value)
            .map_err(|e| Error::UnparseableMessage(format!("bad message object: {}", e)))?;

        let id = message
            .id
            .ok_or_else(|| Error::UnparseableMessage("missing message id".to_string()))?
            .to_string();

        let source_id = payload
            .get("conversation")
            .and_then(|c| c.get("contact_inbox"))
            .and_then(|ci| ci.get("source_id"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::UnparseableMessage("missing conversation.contact_inbox.source_id".to_string())
            })?;

        let sender = PhoneNumber::parse(source_id)?;

        let direction = if message.message_type == "outgoing" {
            Direction::Outbound
        } else {
            Direction::Inbound
        };

        let kind = if message.attachments.is_empty() {
            MessageKind::Text
        } else {
            match message.attachments[0].file_type.as_str() {
                "image" => MessageKind::Image,
                "video" => MessageKind::Video,
                "audio" => MessageKind::Audio,
                "file" => MessageKind::Document,
                _ => MessageKind::Unknown,
            }
        };

        let timestamp = payload
            .get("message")
            .and_then(|m| m.get("created_at"))
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(Self {
            source: Source::Chatwoot,
            id,
            sender,
            direction,
            kind,
            timestamp,
            push_name: None,
            is_group: false,
            event_name: Some(event_name),
            content: message.content,
            private: message.private,
            sender_type: message.sender.map(|s| s.sender_type),
            attachments: message.attachments,
            raw: payload.clone(),
        })
    }

    pub fn source(&self) -> Source {
        self.source
    }

    /// Source-platform message id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The WhatsApp peer this message belongs to. For Chatwoot events this
    /// is the recipient (the conversation's contact), for WuzAPI events the
    /// chat the message arrived in.
    pub fn sender(&self) -> &PhoneNumber {
        &self.sender
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_group(&self) -> bool {
        self.is_group
    }

    /// Contact display name: WhatsApp push name when present, otherwise the
    /// formatted phone number.
    pub fn display_name(&self) -> String {
        self.push_name
            .clone()
            .unwrap_or_else(|| self.sender.formatted())
    }

    /// Chatwoot event name (`message_created`, ...); `None` for WuzAPI.
    pub fn event_name(&self) -> Option<&str> {
        self.event_name.as_deref()
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    /// Chatwoot sender type (`user`, `agent_bot`, `contact`).
    pub fn sender_type(&self) -> Option<&str> {
        self.sender_type.as_deref()
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Text content of the message.
    ///
    /// Covers plain text, extended text and media captions. Returns an empty
    /// string (never `None`) when the message carries no text, so callers do
    /// not null-check.
    pub fn text_content(&self) -> String {
        match self.source {
            Source::Chatwoot => self.content.clone(),
            Source::Wuzapi => {
                let Some(body) = self.raw.get("event").and_then(|e| e.get("Message")) else {
                    return String::new();
                };

                if let Some(text) = body.get("conversation").and_then(Value::as_str) {
                    return text.to_string();
                }
                if let Some(text) = body
                    .get("extendedTextMessage")
                    .and_then(|m| m.get("text"))
                    .and_then(Value::as_str)
                {
                    return text.to_string();
                }
                for key in ["imageMessage", "videoMessage", "documentMessage"] {
                    if let Some(caption) = body
                        .get(key)
                        .and_then(|m| m.get("caption"))
                        .and_then(Value::as_str)
                    {
                        return caption.to_string();
                    }
                }
                if let Some(caption) = body
                    .get("documentWithCaptionMessage")
                    .and_then(|m| m.get("message"))
                    .and_then(|m| m.get("documentMessage"))
                    .and_then(|m| m.get("caption"))
                    .and_then(Value::as_str)
                {
                    return caption.to_string();
                }

                String::new()
            }
        }
    }

    /// Raw media descriptor of a WuzAPI media message. Passed untouched to
    /// the gateway's download endpoint, which needs the key material inside.
    pub fn media_payload(&self) -> Option<&Value> {
        let body = self.raw.get("event")?.get("Message")?;

        let key = match self.kind {
            MessageKind::Image => "imageMessage",
            MessageKind::Video => "videoMessage",
            MessageKind::Audio => "audioMessage",
            MessageKind::Sticker => "stickerMessage",
            MessageKind::Document => "documentMessage",
            _ => return None,
        };

        if self.kind == MessageKind::Document && body.get(key).is_none() {
            body.get("documentWithCaptionMessage")?
                .get("message")?
                .get("documentMessage")
        } else {
            body.get(key)
        }
    }

    /// Media object reference for WuzAPI media messages, when present.
    pub fn media_reference(&self) -> Option<MediaReference> {
        let media = self.media_payload()?;

        let url = media
            .get("URL")
            .or_else(|| media.get("url"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if url.is_empty() {
            return None;
        }

        Some(MediaReference {
            url,
            mimetype: media
                .get("mimetype")
                .and_then(Value::as_str)
                .unwrap_or("application/octet-stream")
                .to_string(),
            filename: media
                .get("fileName")
                .and_then(Value::as_str)
                .map(str::to_string),
            caption: media
                .get("caption")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wuzapi_text_event() -> Value {
        json!({
            "type": "Message",
            "token": "ABC",
            "event": {
                "Info": {
                    "ID": "3EB0C127B9E2",
                    "Chat": "573164973474@s.whatsapp.net",
                    "IsFromMe": false,
                    "IsGroup": false,
                    "Timestamp": "2024-05-14T12:30:00Z",
                    "Type": "text",
                    "PushName": "Carlos"
                },
                "Message": {
                    "conversation": "Hola"
                }
            }
        })
    }

    fn chatwoot_outgoing_event() -> Value {
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
                "content": "¿Cómo te ayudo?",
                "message_type": "outgoing",
                "private": false,
                "sender": {"type": "user"}
            }
        })
    }

    #[test]
    fn test_dispatch_wuzapi_shape() {
        let message = Message::from_inbound_event(&wuzapi_text_event()).unwrap();
        assert_eq!(message.source(), Source::Wuzapi);
        assert_eq!(message.id(), "3EB0C127B9E2");
        assert_eq!(message.sender().canonical(), "573164973474");
        assert_eq!(message.direction(), Direction::Inbound);
        assert_eq!(message.kind(), MessageKind::Text);
        assert_eq!(message.text_content(), "Hola");
        assert_eq!(message.display_name(), "Carlos");
    }

    #[test]
    fn test_dispatch_chatwoot_shape() {
        let message = Message::from_inbound_event(&chatwoot_outgoing_event()).unwrap();
        assert_eq!(message.source(), Source::Chatwoot);
        assert_eq!(message.id(), "555");
        assert_eq!(message.sender().canonical(), "573001234567");
        assert_eq!(message.direction(), Direction::Outbound);
        assert_eq!(message.text_content(), "¿Cómo te ayudo?");
        assert_eq!(message.sender_type(), Some("user"));
    }

    #[test]
    fn test_dispatch_unknown_shape() {
        let payload = json!({"hello": "world"});
        assert!(matches!(
            Message::from_inbound_event(&payload),
            Err(Error::UnparseableMessage(_))
        ));
    }

    #[test]
    fn test_self_sent_is_outbound() {
        let mut payload = wuzapi_text_event();
        payload["event"]["Info"]["IsFromMe"] = json!(true);

        let message = Message::from_inbound_event(&payload).unwrap();
        assert_eq!(message.direction(), Direction::Outbound);
    }

    #[test]
    fn test_media_kind_resolved_through_media_type() {
        let mut payload = wuzapi_text_event();
        payload["event"]["Info"]["Type"] = json!("media");
        payload["event"]["Info"]["MediaType"] = json!("image");
        payload["event"]["Message"] = json!({
            "imageMessage": {
                "url": "https://mmg.whatsapp.net/d/f/abc123",
                "mimetype": "image/jpeg",
                "caption": "mira esto"
            }
        });

        let message = Message::from_inbound_event(&payload).unwrap();
        assert_eq!(message.kind(), MessageKind::Image);
        assert_eq!(message.text_content(), "mira esto");

        let media = message.media_reference().unwrap();
        assert_eq!(media.mimetype, "image/jpeg");
        assert_eq!(media.caption, "mira esto");
    }

    #[test]
    fn test_kind_inferred_from_variant_key() {
        let mut payload = wuzapi_text_event();
        payload["event"]["Info"]["Type"] = json!("something-new");
        payload["event"]["Message"] = json!({
            "documentMessage": {
                "url": "https://mmg.whatsapp.net/d/f/doc",
                "mimetype": "application/pdf",
                "fileName": "factura.pdf"
            }
        });

        let message = Message::from_inbound_event(&payload).unwrap();
        assert_eq!(message.kind(), MessageKind::Document);
        let media = message.media_reference().unwrap();
        assert_eq!(media.filename.as_deref(), Some("factura.pdf"));
    }

    #[test]
    fn test_lid_chat_falls_back_to_sender_alt() {
        let mut payload = wuzapi_text_event();
        payload["event"]["Info"]["Chat"] = json!("98765432101@lid");
        payload["event"]["Info"]["SenderAlt"] = json!("573164973474@s.whatsapp.net");

        let message = Message::from_inbound_event(&payload).unwrap();
        assert_eq!(message.sender().canonical(), "573164973474");
    }

    #[test]
    fn test_lid_chat_without_sender_alt_is_dropped() {
        let mut payload = wuzapi_text_event();
        payload["event"]["Info"]["Chat"] = json!("98765432101@lid");

        assert!(matches!(
            Message::from_inbound_event(&payload),
            Err(Error::UnparseableMessage(_))
        ));
    }

    #[test]
    fn test_missing_sender_is_unparseable() {
        let mut payload = wuzapi_text_event();
        payload["event"]["Info"]["Chat"] = json!("");

        assert!(Message::from_inbound_event(&payload).is_err());
    }

    #[test]
    fn test_chatwoot_root_level_fallback() {
        // Older layout: message fields at the payload root
        let payload = json!({
            "event": "message_created",
            "id": 777,
            "content": "gracias",
            "message_type": "outgoing",
            "private": false,
            "sender": {"type": "agent_bot"},
            "conversation": {
                "contact_inbox": {"source_id": "+573001234567"}
            }
        });

        let message = Message::from_inbound_event(&payload).unwrap();
        assert_eq!(message.id(), "777");
        assert_eq!(message.sender().canonical(), "573001234567");
        assert_eq!(message.sender_type(), Some("agent_bot"));
    }

    #[test]
    fn test_chatwoot_attachment_classification() {
        let mut payload = chatwoot_outgoing_event();
        payload["message"]["attachments"] = json!([
            {"file_type": "image", "data_url": "https://cw.example.com/a.jpg", "file_name": "a.jpg"}
        ]);

        let message = Message::from_inbound_event(&payload).unwrap();
        assert_eq!(message.kind(), MessageKind::Image);
        assert_eq!(message.attachments().len(), 1);
        assert_eq!(message.attachments()[0].file_name, "a.jpg");
    }

    #[test]
    fn test_text_content_empty_for_non_text() {
        let mut payload = wuzapi_text_event();
        payload["event"]["Info"]["Type"] = json!("sticker");
        payload["event"]["Message"] = json!({"stickerMessage": {"url": "https://x"}});

        let message = Message::from_inbound_event(&payload).unwrap();
        assert_eq!(message.text_content(), "");
    }
}
