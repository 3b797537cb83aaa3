//! Chatwoot application API client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use wb_core::message::Direction;
use wb_core::phone::PhoneNumber;
use wb_core::ports::InboxGateway;
use wb_core::{Error, Result};

/// Request timeout for Chatwoot calls.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Header carrying the API token on every request.
const TOKEN_HEADER: &str = "api_access_token";

/// Chatwoot REST client, scoped to one account and one inbox.
#[derive(Debug, Clone)]
pub struct ChatwootClient {
    client: Client,
    base_url: String,
    api_key: String,
    account_id: String,
    inbox_id: String,
}

#[derive(Debug, Deserialize)]
struct ContactRecord {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct ContactSearchResponse {
    #[serde(default)]
    payload: Vec<ContactRecord>,
}

#[derive(Debug, Deserialize)]
struct ContactCreatePayload {
    contact: ContactRecord,
}

#[derive(Debug, Deserialize)]
struct ContactCreateResponse {
    payload: ContactCreatePayload,
}

#[derive(Debug, Deserialize)]
struct ConversationRecord {
    id: i64,
    #[serde(default)]
    inbox_id: i64,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct ConversationListResponse {
    #[serde(default)]
    payload: Vec<ConversationRecord>,
}

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    id: i64,
}

#[derive(Debug, Serialize)]
struct NewContact<'a> {
    name: &'a str,
    phone_number: String,
    identifier: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<&'a str>,
}

impl ChatwootClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        account_id: impl Into<String>,
        inbox_id: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            account_id: account_id.into(),
            inbox_id: inbox_id.into(),
        })
    }

    fn account_url(&self, path: &str) -> String {
        format!(
            "{}/api/v1/accounts/{}{}",
            self.base_url, self.account_id, path
        )
    }

    /// Refresh an existing contact's avatar. Best-effort: failure is logged,
    /// never propagated.
    async fn update_avatar(&self, contact_id: i64, avatar_url: &str) {
        let url = self.account_url(&format!("/contacts/{}", contact_id));
        let result = self
            .client
            .put(&url)
            .header(TOKEN_HEADER, &self.api_key)
            .json(&json!({ "avatar_url": avatar_url }))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(contact_id, "contact avatar refreshed");
            }
            Ok(response) => {
                warn!(contact_id, status = %response.status(), "avatar refresh rejected");
            }
            Err(e) => {
                warn!(contact_id, error = %e, "avatar refresh failed");
            }
        }
    }
}

#[async_trait]
impl InboxGateway for ChatwootClient {
    /// Search by canonical phone first, create only when absent. Repeated
    /// calls for the same phone return the same contact id.
    async fn ensure_contact(
        &self,
        phone: &PhoneNumber,
        display_name: &str,
        avatar_url: Option<&str>,
    ) -> Result<i64> {
        let search_url = self.account_url("/contacts/search");
        let response = self
            .client
            .get(&search_url)
            .header(TOKEN_HEADER, &self.api_key)
            .query(&[("q", phone.canonical())])
            .send()
            .await?;

        if response.status().is_success() {
            let found: ContactSearchResponse = response.json().await?;
            if let Some(contact) = found.payload.first() {
                debug!(phone = phone.canonical(), contact_id = contact.id, "contact exists");
                if let Some(url) = avatar_url {
                    self.update_avatar(contact.id, url).await;
                }
                return Ok(contact.id);
            }
        } else {
            warn!(
                status = %response.status(),
                "contact search failed, falling through to create"
            );
        }

        let create_url = self.account_url("/contacts");
        let new_contact = NewContact {
            name: display_name,
            phone_number: phone.formatted(),
            identifier: phone.canonical(),
            avatar_url,
        };

        let response = self
            .client
            .post(&create_url)
            .header(TOKEN_HEADER, &self.api_key)
            .json(&new_contact)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "contact create failed: {} - {}",
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        let created: ContactCreateResponse = response.json().await?;
        info!(
            phone = phone.canonical(),
            contact_id = created.payload.contact.id,
            "contact created"
        );
        Ok(created.payload.contact.id)
    }

    /// List the contact's conversations filtered to the configured inbox,
    /// preferring an open one; create only when none matches.
    async fn ensure_conversation(&self, contact_id: i64, source_id: &str) -> Result<i64> {
        let list_url = self.account_url(&format!("/contacts/{}/conversations", contact_id));
        let response = self
            .client
            .get(&list_url)
            .header(TOKEN_HEADER, &self.api_key)
            .send()
            .await?;

        if response.status().is_success() {
            let listing: ConversationListResponse = response.json().await?;
            let matching: Vec<&ConversationRecord> = listing
                .payload
                .iter()
                .filter(|c| c.inbox_id.to_string() == self.inbox_id)
                .collect();

            if let Some(conversation) = matching
                .iter()
                .find(|c| c.status == "open")
                .or_else(|| matching.first())
            {
                debug!(contact_id, conversation_id = conversation.id, "conversation exists");
                return Ok(conversation.id);
            }
        } else {
            warn!(
                status = %response.status(),
                "conversation listing failed, falling through to create"
            );
        }

        let create_url = self.account_url("/conversations");
        let response = self
            .client
            .post(&create_url)
            .header(TOKEN_HEADER, &self.api_key)
            .json(&json!({
                "source_id": source_id,
                "inbox_id": self.inbox_id,
                "contact_id": contact_id,
                "status": "open",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "conversation create failed: {} - {}",
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        let created: CreatedResponse = response.json().await?;
        info!(contact_id, conversation_id = created.id, "conversation created");
        Ok(created.id)
    }

    async fn post_message(
        &self,
        conversation_id: i64,
        content: &str,
        direction: Direction,
    ) -> Result<i64> {
        let url = self.account_url(&format!("/conversations/{}/messages", conversation_id));
        let response = self
            .client
            .post(&url)
            .header(TOKEN_HEADER, &self.api_key)
            .json(&json!({
                "content": content,
                "message_type": direction.as_message_type(),
                "private": false,
                // Marks bridge-created messages; useful when auditing loops.
                "external_source_ids": { "whatsapp_sync": "true" },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "message post failed: {} - {}",
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        let created: CreatedResponse = response.json().await?;
        Ok(created.id)
    }

    /// Multipart upload of a file with its caption as the message body.
    async fn post_attachment(
        &self,
        conversation_id: i64,
        content: &str,
        direction: Direction,
        data: Vec<u8>,
        filename: &str,
        mimetype: &str,
    ) -> Result<i64> {
        let url = self.account_url(&format!("/conversations/{}/messages", conversation_id));

        let part = reqwest::multipart::Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str(mimetype)
            .map_err(|e| Error::Upstream(format!("invalid attachment mimetype: {}", e)))?;
        let form = reqwest::multipart::Form::new()
            .text("content", content.to_string())
            .text("message_type", direction.as_message_type())
            .text("private", "false")
            .part("attachments[]", part);

        let response = self
            .client
            .post(&url)
            .header(TOKEN_HEADER, &self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "attachment post failed: {} - {}",
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        let created: CreatedResponse = response.json().await?;
        debug!(conversation_id, message_id = created.id, filename, "attachment posted");
        Ok(created.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation_normalizes_base_url() {
        let client =
            ChatwootClient::new("https://cw.example.com/", "key", "2", "7").unwrap();
        assert_eq!(client.base_url, "https://cw.example.com");
        assert_eq!(
            client.account_url("/contacts/search"),
            "https://cw.example.com/api/v1/accounts/2/contacts/search"
        );
    }

    #[test]
    fn test_new_contact_serialization() {
        let phone = PhoneNumber::parse("573001234567@s.whatsapp.net").unwrap();
        let contact = NewContact {
            name: "Carlos",
            phone_number: phone.formatted(),
            identifier: phone.canonical(),
            avatar_url: None,
        };

        let value = serde_json::to_value(&contact).unwrap();
        assert_eq!(value["phone_number"], "+573001234567");
        assert_eq!(value["identifier"], "573001234567");
        assert!(value.get("avatar_url").is_none());
    }

    #[test]
    fn test_contact_search_response_parsing() {
        let body = r#"{"meta":{},"payload":[{"id":12,"name":"Carlos"}]}"#;
        let parsed: ContactSearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.payload[0].id, 12);
    }

    #[test]
    fn test_conversation_list_response_parsing() {
        let body = r#"{"payload":[
            {"id":91,"inbox_id":7,"status":"open"},
            {"id":90,"inbox_id":3,"status":"resolved"}
        ]}"#;
        let parsed: ConversationListResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.payload.len(), 2);
        assert_eq!(parsed.payload[0].status, "open");
    }
}
