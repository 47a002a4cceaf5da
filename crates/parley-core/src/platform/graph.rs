//! Meta Graph API client
//!
//! One client per channel: WhatsApp Cloud API sends go to
//! `/{phone_number_id}/messages`, Messenger and Instagram DMs to
//! `/{page_id}/messages`, and replies to comment conversations to the
//! comment edge.

use async_trait::async_trait;
use parley_common::config::GraphConfig;
use parley_common::types::Platform;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::adapter::{AdapterError, MediaKind, PlatformSendAdapter, ProviderTemplate, SendReceipt};

/// Graph error codes that mean throttling
const RATE_LIMIT_CODES: &[i64] = &[4, 17, 32, 613, 80007, 130429, 131048, 131056];

/// Graph error code for an expired or invalid access token
const INVALID_TOKEN_CODE: i64 = 190;

/// Graph API client bound to one channel's credential
pub struct GraphApiClient {
    http: reqwest::Client,
    base_url: String,
    platform: Platform,
    sender_id: String,
    access_token: String,
    business_account_id: Option<String>,
}

impl GraphApiClient {
    /// Build an HTTP client with the configured timeout
    pub fn http_client(config: &GraphConfig) -> Result<reqwest::Client, AdapterError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(AdapterError::from)
    }

    pub fn new(
        http: reqwest::Client,
        config: &GraphConfig,
        platform: Platform,
        sender_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: format!(
                "{}/{}",
                config.base_url.trim_end_matches('/'),
                config.api_version
            ),
            platform,
            sender_id: sender_id.into(),
            access_token: access_token.into(),
            business_account_id: None,
        }
    }

    /// WhatsApp Business Account id used for template listing
    pub fn with_business_account(mut self, id: Option<String>) -> Self {
        self.business_account_id = id;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Comment conversations use `{platform}_comment:{commentId}` as participant id
    fn comment_target<'a>(&self, recipient: &'a str) -> Option<&'a str> {
        let prefix = format!("{}_comment:", self.platform);
        recipient.strip_prefix(prefix.as_str())
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, AdapterError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;

        Self::read_response(response).await
    }

    async fn read_response(response: reqwest::Response) -> Result<Value, AdapterError> {
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if status.is_success() {
            return Ok(body);
        }

        let error = &body["error"];
        let code = error["code"].as_i64();
        let message = error["message"]
            .as_str()
            .unwrap_or("no error message")
            .to_string();

        warn!(status = status.as_u16(), code = ?code, "Graph API request failed");

        if status.as_u16() == 429 || code.map(|c| RATE_LIMIT_CODES.contains(&c)).unwrap_or(false)
        {
            return Err(AdapterError::RateLimited);
        }
        if status.as_u16() == 401 || code == Some(INVALID_TOKEN_CODE) {
            return Err(AdapterError::Unauthorized);
        }
        if status.as_u16() == 400 {
            return Err(AdapterError::Rejected(message));
        }
        Err(AdapterError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// WhatsApp answers with `messages[0].id`, Messenger with `message_id`,
    /// comment edges with `id`
    fn receipt(body: &Value) -> Result<SendReceipt, AdapterError> {
        body["messages"][0]["id"]
            .as_str()
            .or_else(|| body["message_id"].as_str())
            .or_else(|| body["id"].as_str())
            .map(|id| SendReceipt {
                message_id: id.to_string(),
            })
            .ok_or_else(|| AdapterError::Api {
                status: 200,
                message: "response did not contain a message id".to_string(),
            })
    }

    fn whatsapp_body(recipient: &str, kind: &str, content: Value) -> Value {
        let mut body = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": recipient.strip_prefix('+').unwrap_or(recipient),
            "type": kind,
        });
        body[kind] = content;
        body
    }

    async fn reply_to_comment(&self, comment_id: &str, text: &str) -> Result<SendReceipt, AdapterError> {
        let edge = match self.platform {
            Platform::Instagram => "replies",
            _ => "comments",
        };
        let body = self
            .post(&format!("{}/{}", comment_id, edge), &json!({ "message": text }))
            .await?;
        Self::receipt(&body)
    }
}

#[async_trait]
impl PlatformSendAdapter for GraphApiClient {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<SendReceipt, AdapterError> {
        if let Some(comment_id) = self.comment_target(recipient) {
            return self.reply_to_comment(comment_id, text).await;
        }

        let body = match self.platform {
            Platform::Whatsapp => Self::whatsapp_body(
                recipient,
                "text",
                json!({ "preview_url": false, "body": text }),
            ),
            Platform::Facebook | Platform::Instagram => json!({
                "recipient": { "id": recipient },
                "messaging_type": "RESPONSE",
                "message": { "text": text },
            }),
        };

        debug!(platform = %self.platform, "Sending text message");
        let response = self
            .post(&format!("{}/messages", self.sender_id), &body)
            .await?;
        Self::receipt(&response)
    }

    async fn send_template(
        &self,
        recipient: &str,
        name: &str,
        language: &str,
        components: Value,
    ) -> Result<SendReceipt, AdapterError> {
        if self.platform != Platform::Whatsapp {
            return Err(AdapterError::Rejected(format!(
                "templates are not supported on {}",
                self.platform
            )));
        }

        let body = Self::whatsapp_body(
            recipient,
            "template",
            json!({
                "name": name,
                "language": { "code": language },
                "components": components,
            }),
        );

        debug!(template = name, "Sending template message");
        let response = self
            .post(&format!("{}/messages", self.sender_id), &body)
            .await?;
        Self::receipt(&response)
    }

    async fn send_media(
        &self,
        recipient: &str,
        kind: MediaKind,
        url: &str,
        caption: Option<&str>,
    ) -> Result<SendReceipt, AdapterError> {
        let body = match self.platform {
            Platform::Whatsapp => {
                let mut media = json!({ "link": url });
                // audio messages take no caption
                if let Some(caption) = caption.filter(|_| kind != MediaKind::Audio) {
                    media["caption"] = json!(caption);
                }
                Self::whatsapp_body(recipient, kind.as_str(), media)
            }
            Platform::Facebook | Platform::Instagram => {
                let attachment_type = match kind {
                    MediaKind::Document => "file",
                    other => other.as_str(),
                };
                json!({
                    "recipient": { "id": recipient },
                    "messaging_type": "RESPONSE",
                    "message": {
                        "attachment": {
                            "type": attachment_type,
                            "payload": { "url": url, "is_reusable": true },
                        }
                    },
                })
            }
        };

        let response = self
            .post(&format!("{}/messages", self.sender_id), &body)
            .await?;
        Self::receipt(&response)
    }

    async fn list_templates(&self) -> Result<Vec<ProviderTemplate>, AdapterError> {
        let account = self
            .business_account_id
            .as_deref()
            .ok_or_else(|| AdapterError::NotConfigured(self.sender_id.clone()))?;

        let mut templates = Vec::new();
        let mut next = Some(self.url(&format!("{}/message_templates?limit=100", account)));

        while let Some(url) = next.take() {
            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.access_token)
                .send()
                .await?;
            let page = Self::read_response(response).await?;

            if let Some(items) = page["data"].as_array() {
                for item in items {
                    match serde_json::from_value::<ProviderTemplate>(item.clone()) {
                        Ok(template) => templates.push(template),
                        Err(e) => warn!(error = %e, "Skipping malformed template entry"),
                    }
                }
            }

            next = page["paging"]["next"].as_str().map(str::to_string);
        }

        Ok(templates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, platform: Platform) -> GraphApiClient {
        let config = GraphConfig {
            base_url: server.uri(),
            api_version: "v18.0".to_string(),
            timeout_secs: 5,
        };
        GraphApiClient::new(reqwest::Client::new(), &config, platform, "10001", "token-abc")
            .with_business_account(Some("waba-1".to_string()))
    }

    #[tokio::test]
    async fn test_send_whatsapp_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v18.0/10001/messages"))
            .and(header("authorization", "Bearer token-abc"))
            .and(body_partial_json(json!({
                "messaging_product": "whatsapp",
                "to": "15551234567",
                "type": "text",
                "text": { "body": "hello" }
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "messages": [{ "id": "wamid.OUT1" }] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let receipt = client(&server, Platform::Whatsapp)
            .send_text("+15551234567", "hello")
            .await
            .unwrap();
        assert_eq!(receipt.message_id, "wamid.OUT1");
    }

    #[tokio::test]
    async fn test_send_template_components() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v18.0/10001/messages"))
            .and(body_partial_json(json!({
                "type": "template",
                "template": { "name": "order_update", "language": { "code": "en_US" } }
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "messages": [{ "id": "wamid.T1" }] })),
            )
            .mount(&server)
            .await;

        let receipt = client(&server, Platform::Whatsapp)
            .send_template("15550001111", "order_update", "en_US", json!([]))
            .await
            .unwrap();
        assert_eq!(receipt.message_id, "wamid.T1");
    }

    #[tokio::test]
    async fn test_messenger_text_uses_recipient_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v18.0/10001/messages"))
            .and(body_partial_json(json!({ "recipient": { "id": "psid-9" } })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "recipient_id": "psid-9", "message_id": "m_42" })),
            )
            .mount(&server)
            .await;

        let receipt = client(&server, Platform::Facebook)
            .send_text("psid-9", "thanks")
            .await
            .unwrap();
        assert_eq!(receipt.message_id, "m_42");
    }

    #[tokio::test]
    async fn test_comment_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v18.0/17890/replies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "17891" })))
            .mount(&server)
            .await;

        let receipt = client(&server, Platform::Instagram)
            .send_text("instagram_comment:17890", "Thanks for the comment!")
            .await
            .unwrap();
        assert_eq!(receipt.message_id, "17891");
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v18.0/10001/messages"))
            .and(body_partial_json(json!({ "to": "1" })))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "message": "slow down", "code": 130429 }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v18.0/10001/messages"))
            .and(body_partial_json(json!({ "to": "2" })))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "expired", "code": 190 }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v18.0/10001/messages"))
            .and(body_partial_json(json!({ "to": "3" })))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "message": "invalid recipient", "code": 131026 }
            })))
            .mount(&server)
            .await;

        let client = client(&server, Platform::Whatsapp);
        assert_eq!(
            client.send_text("1", "x").await.unwrap_err(),
            AdapterError::RateLimited
        );
        assert_eq!(
            client.send_text("2", "x").await.unwrap_err(),
            AdapterError::Unauthorized
        );
        assert_eq!(
            client.send_text("3", "x").await.unwrap_err(),
            AdapterError::Rejected("invalid recipient".to_string())
        );
    }

    #[tokio::test]
    async fn test_list_templates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v18.0/waba-1/message_templates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {
                        "id": "tpl-1",
                        "name": "order_update",
                        "language": "en_US",
                        "category": "UTILITY",
                        "status": "APPROVED",
                        "components": [{ "type": "BODY", "text": "Hi {{1}}" }]
                    },
                    { "broken": true }
                ]
            })))
            .mount(&server)
            .await;

        let templates = client(&server, Platform::Whatsapp)
            .list_templates()
            .await
            .unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].name, "order_update");
        assert_eq!(templates[0].status, "APPROVED");
    }
}
