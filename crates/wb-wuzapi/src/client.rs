//! WuzAPI HTTP client
//!
//! WuzAPI speaks PascalCase JSON and authenticates with a bare `token`
//! header. Send endpoints live under `/chat/send/{kind}` and answer with
//! `{"data": {"Id": "..."}}` carrying the WhatsApp message id.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use wb_core::message::MessageKind;
use wb_core::phone::PhoneNumber;
use wb_core::ports::{ChatGateway, MediaBytes};
use wb_core::{Error, Result};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// WuzAPI REST client for a single WhatsApp instance.
#[derive(Debug, Clone)]
pub struct WuzapiClient {
    client: Client,
    base_url: String,
    /// Admin-level token, used for account endpoints such as avatar lookup.
    user_token: String,
    /// Per-instance token, used for send endpoints.
    instance_token: String,
}

#[derive(Debug, Serialize)]
struct TextPayload<'a> {
    #[serde(rename = "Phone")]
    phone: &'a str,
    #[serde(rename = "Body")]
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct ImagePayload<'a> {
    #[serde(rename = "Phone")]
    phone: &'a str,
    #[serde(rename = "Image")]
    image: &'a str,
    #[serde(rename = "Caption")]
    caption: &'a str,
}

#[derive(Debug, Serialize)]
struct VideoPayload<'a> {
    #[serde(rename = "Phone")]
    phone: &'a str,
    #[serde(rename = "Video")]
    video: &'a str,
    #[serde(rename = "Caption")]
    caption: &'a str,
}

#[derive(Debug, Serialize)]
struct AudioPayload<'a> {
    #[serde(rename = "Phone")]
    phone: &'a str,
    #[serde(rename = "Audio")]
    audio: &'a str,
}

#[derive(Debug, Serialize)]
struct DocumentPayload<'a> {
    #[serde(rename = "Phone")]
    phone: &'a str,
    #[serde(rename = "Document")]
    document: &'a str,
    #[serde(rename = "FileName")]
    file_name: &'a str,
}

impl WuzapiClient {
    pub fn new(
        base_url: impl Into<String>,
        user_token: impl Into<String>,
        instance_token: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_token: user_token.into(),
            instance_token: instance_token.into(),
        })
    }

    /// Download endpoint per media kind. Stickers decrypt through the image
    /// endpoint.
    fn download_path(kind: MessageKind) -> Option<&'static str> {
        match kind {
            MessageKind::Image | MessageKind::Sticker => Some("/chat/downloadimage"),
            MessageKind::Video => Some("/chat/downloadvideo"),
            MessageKind::Audio => Some("/chat/downloadaudio"),
            MessageKind::Document => Some("/chat/downloaddocument"),
            _ => None,
        }
    }

    /// Addressing form the gateway expects: bare digits for individuals,
    /// the full group JID for groups.
    fn recipient(phone: &PhoneNumber) -> String {
        if phone.is_group() {
            format!("{}@g.us", phone.canonical())
        } else {
            phone.canonical().to_string()
        }
    }

    async fn send<P: Serialize>(&self, path: &str, payload: &P) -> Result<Option<String>> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .header("token", &self.instance_token)
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "wuzapi {} failed: {} - {}",
                path,
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        let body: Value = response.json().await?;
        let message_id = body
            .pointer("/data/Id")
            .and_then(Value::as_str)
            .map(str::to_string);

        if message_id.is_none() {
            debug!(path, "send succeeded without a message id");
        }
        Ok(message_id)
    }
}

#[async_trait]
impl ChatGateway for WuzapiClient {
    async fn send_text(&self, phone: &PhoneNumber, body: &str) -> Result<Option<String>> {
        let recipient = Self::recipient(phone);
        debug!(phone = %phone, "sending text");
        self.send(
            "/chat/send/text",
            &TextPayload {
                phone: &recipient,
                body,
            },
        )
        .await
    }

    async fn send_image(
        &self,
        phone: &PhoneNumber,
        url: &str,
        caption: &str,
    ) -> Result<Option<String>> {
        let recipient = Self::recipient(phone);
        self.send(
            "/chat/send/image",
            &ImagePayload {
                phone: &recipient,
                image: url,
                caption,
            },
        )
        .await
    }

    async fn send_video(
        &self,
        phone: &PhoneNumber,
        url: &str,
        caption: &str,
    ) -> Result<Option<String>> {
        let recipient = Self::recipient(phone);
        self.send(
            "/chat/send/video",
            &VideoPayload {
                phone: &recipient,
                video: url,
                caption,
            },
        )
        .await
    }

    async fn send_audio(&self, phone: &PhoneNumber, url: &str) -> Result<Option<String>> {
        let recipient = Self::recipient(phone);
        self.send(
            "/chat/send/audio",
            &AudioPayload {
                phone: &recipient,
                audio: url,
            },
        )
        .await
    }

    async fn send_document(
        &self,
        phone: &PhoneNumber,
        url: &str,
        filename: &str,
    ) -> Result<Option<String>> {
        let recipient = Self::recipient(phone);
        self.send(
            "/chat/send/document",
            &DocumentPayload {
                phone: &recipient,
                document: url,
                file_name: filename,
            },
        )
        .await
    }

    /// Fetch and decode a media blob. The raw media descriptor goes back to
    /// the gateway verbatim; it holds the key material needed to decrypt the
    /// download. The gateway answers with the bytes base64-encoded under
    /// `data.Data`, sometimes behind a data-URL style `base64,` prefix.
    async fn download_media(&self, kind: MessageKind, media: &Value) -> Result<MediaBytes> {
        let path = Self::download_path(kind)
            .ok_or_else(|| Error::Upstream(format!("no download endpoint for {:?}", kind)))?;
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .header("token", &self.instance_token)
            .json(media)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "wuzapi {} failed: {} - {}",
                path,
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        let body: Value = response.json().await?;
        let encoded = body
            .pointer("/data/Data")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Upstream(format!("wuzapi {} returned no data", path)))?;
        let encoded = encoded
            .rsplit_once("base64,")
            .map_or(encoded, |(_, tail)| tail);

        let data = STANDARD
            .decode(encoded)
            .map_err(|e| Error::Upstream(format!("media payload is not valid base64: {}", e)))?;
        let mimetype = body
            .pointer("/data/Mimetype")
            .and_then(Value::as_str)
            .unwrap_or("application/octet-stream")
            .to_string();

        debug!(path, bytes = data.len(), mimetype, "media downloaded");
        Ok(MediaBytes { data, mimetype })
    }

    /// Profile picture lookup. Errors are reported as `Ok(None)`; an avatar
    /// is decoration, not something worth failing a relay for.
    async fn fetch_avatar(&self, phone: &PhoneNumber) -> Result<Option<String>> {
        let url = format!("{}/user/avatar", self.base_url);
        let result = self
            .client
            .post(&url)
            .header("token", &self.user_token)
            .json(&json!({ "Phone": phone.canonical(), "Preview": false }))
            .send()
            .await;

        let response = match result {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(phone = %phone, status = %r.status(), "avatar lookup rejected");
                return Ok(None);
            }
            Err(e) => {
                warn!(phone = %phone, error = %e, "avatar lookup failed");
                return Ok(None);
            }
        };

        let body: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(phone = %phone, error = %e, "avatar response unreadable");
                return Ok(None);
            }
        };

        Ok(body
            .pointer("/data/URL")
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation_normalizes_base_url() {
        let client = WuzapiClient::new("http://wuzapi:8080/", "admin", "inst").unwrap();
        assert_eq!(client.base_url, "http://wuzapi:8080");
    }

    #[test]
    fn test_recipient_forms() {
        let user = PhoneNumber::parse("573001234567@s.whatsapp.net").unwrap();
        assert_eq!(WuzapiClient::recipient(&user), "573001234567");

        let group = PhoneNumber::parse("573187267705-1551282257@g.us").unwrap();
        assert_eq!(
            WuzapiClient::recipient(&group),
            "573187267705-1551282257@g.us"
        );
    }

    #[test]
    fn test_download_path_per_kind() {
        assert_eq!(
            WuzapiClient::download_path(MessageKind::Image),
            Some("/chat/downloadimage")
        );
        assert_eq!(
            WuzapiClient::download_path(MessageKind::Sticker),
            Some("/chat/downloadimage")
        );
        assert_eq!(
            WuzapiClient::download_path(MessageKind::Document),
            Some("/chat/downloaddocument")
        );
        assert_eq!(WuzapiClient::download_path(MessageKind::Text), None);
    }

    #[test]
    fn test_text_payload_uses_gateway_casing() {
        let payload = TextPayload {
            phone: "573001234567",
            body: "Hola",
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["Phone"], "573001234567");
        assert_eq!(value["Body"], "Hola");
    }

    #[test]
    fn test_document_payload_fields() {
        let payload = DocumentPayload {
            phone: "573001234567",
            document: "https://files.example.com/factura.pdf",
            file_name: "factura.pdf",
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["Document"], "https://files.example.com/factura.pdf");
        assert_eq!(value["FileName"], "factura.pdf");
    }
}
