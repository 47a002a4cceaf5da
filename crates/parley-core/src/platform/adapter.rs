//! Outbound send contract shared by every platform client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a platform adapter
///
/// The adapter decides which subtype a provider failure maps to.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error("Rate limited by provider")]
    RateLimited,

    #[error("Provider rejected the credential")]
    Unauthorized,

    #[error("{0}")]
    Rejected(String),

    #[error("Provider API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No credential configured for channel {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        AdapterError::Transport(e.to_string())
    }
}

/// Provider acknowledgement of a send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Provider message id; the delivery-tracking join key
    pub message_id: String,
}

/// Attachment kind for media sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
        }
    }
}

/// Template as listed by the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderTemplate {
    pub id: Option<String>,
    pub name: String,
    pub language: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub components: serde_json::Value,
}

/// Send primitives of one connected channel
#[async_trait]
pub trait PlatformSendAdapter: Send + Sync {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<SendReceipt, AdapterError>;

    async fn send_template(
        &self,
        recipient: &str,
        name: &str,
        language: &str,
        components: serde_json::Value,
    ) -> Result<SendReceipt, AdapterError>;

    async fn send_media(
        &self,
        recipient: &str,
        kind: MediaKind,
        url: &str,
        caption: Option<&str>,
    ) -> Result<SendReceipt, AdapterError>;

    /// Every template registered for the account
    async fn list_templates(&self) -> Result<Vec<ProviderTemplate>, AdapterError>;
}
