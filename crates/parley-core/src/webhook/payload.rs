//! Typed Meta webhook payloads
//!
//! The `object` discriminator and each change's `field` are matched once,
//! right after the body is parsed; handlers only ever see the typed variants.

use chrono::{DateTime, TimeZone, Utc};
use parley_common::types::Platform;
use serde::Deserialize;
use serde_json::Value;

/// Top-level webhook body, tagged by `object`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "object")]
pub enum WebhookPayload {
    #[serde(rename = "whatsapp_business_account")]
    WhatsAppBusinessAccount {
        #[serde(default)]
        entry: Vec<Entry>,
    },
    #[serde(rename = "page")]
    Page {
        #[serde(default)]
        entry: Vec<Entry>,
    },
    #[serde(rename = "instagram")]
    Instagram {
        #[serde(default)]
        entry: Vec<Entry>,
    },
    #[serde(rename = "commerce_account")]
    CommerceAccount {
        #[serde(default)]
        entry: Vec<Entry>,
    },
    #[serde(rename = "ad_account")]
    AdAccount {
        #[serde(default)]
        entry: Vec<Entry>,
    },
    #[serde(other)]
    Unsupported,
}

impl WebhookPayload {
    /// Value of the `object` discriminator
    pub fn object(&self) -> &'static str {
        match self {
            WebhookPayload::WhatsAppBusinessAccount { .. } => "whatsapp_business_account",
            WebhookPayload::Page { .. } => "page",
            WebhookPayload::Instagram { .. } => "instagram",
            WebhookPayload::CommerceAccount { .. } => "commerce_account",
            WebhookPayload::AdAccount { .. } => "ad_account",
            WebhookPayload::Unsupported => "unsupported",
        }
    }

    pub fn entries(&self) -> &[Entry] {
        match self {
            WebhookPayload::WhatsAppBusinessAccount { entry }
            | WebhookPayload::Page { entry }
            | WebhookPayload::Instagram { entry }
            | WebhookPayload::CommerceAccount { entry }
            | WebhookPayload::AdAccount { entry } => entry,
            WebhookPayload::Unsupported => &[],
        }
    }

    /// Platform whose channels receive this payload's messages
    pub fn platform(&self) -> Option<Platform> {
        match self {
            WebhookPayload::WhatsAppBusinessAccount { .. } => Some(Platform::Whatsapp),
            WebhookPayload::Page { .. } => Some(Platform::Facebook),
            WebhookPayload::Instagram { .. } => Some(Platform::Instagram),
            _ => None,
        }
    }

    /// Stable provider id for dedup: the first inbound message id, else the
    /// first comment id
    pub fn provider_event_id(&self) -> Option<String> {
        let entries = self.entries();

        let message_id = entries.iter().find_map(|entry| {
            entry
                .changes
                .iter()
                .find_map(|change| match change.route() {
                    RoutedChange::WhatsApp(value) => value.messages.first().map(|m| m.id.clone()),
                    RoutedChange::Messages(event) => event.message_id().map(str::to_string),
                    _ => None,
                })
                .or_else(|| {
                    entry
                        .messaging
                        .iter()
                        .find_map(|event| event.message_id().map(str::to_string))
                })
        });

        message_id.or_else(|| {
            entries.iter().find_map(|entry| {
                entry.changes.iter().find_map(|change| match change.route() {
                    RoutedChange::Comment(comment) => comment.comment_id().map(str::to_string),
                    _ => None,
                })
            })
        })
    }
}

/// One entry of a webhook payload
#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    /// Account id (WABA id, page id, Instagram account id, ...)
    #[serde(default)]
    pub id: String,
    pub time: Option<i64>,
    #[serde(default)]
    pub changes: Vec<Change>,
    /// Messenger-style direct messages
    #[serde(default)]
    pub messaging: Vec<MessagingEvent>,
}

/// Raw change as delivered
#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    pub field: String,
    #[serde(default)]
    pub value: Value,
}

/// A change after routing by `field`
#[derive(Debug, Clone)]
pub enum RoutedChange {
    WhatsApp(WhatsAppValue),
    Comment(CommentValue),
    Feed(Value),
    Messages(MessagingEvent),
    Unknown(String),
}

impl Change {
    pub fn route(&self) -> RoutedChange {
        match self.field.as_str() {
            "messages" => {
                if self.value.get("messaging_product").is_some()
                    || self.value.get("statuses").is_some()
                {
                    match serde_json::from_value(self.value.clone()) {
                        Ok(value) => RoutedChange::WhatsApp(value),
                        Err(_) => RoutedChange::Unknown(self.field.clone()),
                    }
                } else {
                    match serde_json::from_value(self.value.clone()) {
                        Ok(event) => RoutedChange::Messages(event),
                        Err(_) => RoutedChange::Unknown(self.field.clone()),
                    }
                }
            }
            "comments" => match serde_json::from_value(self.value.clone()) {
                Ok(comment) => RoutedChange::Comment(comment),
                Err(_) => RoutedChange::Unknown(self.field.clone()),
            },
            "feed" => RoutedChange::Feed(self.value.clone()),
            other => RoutedChange::Unknown(other.to_string()),
        }
    }
}

/// Value of a WhatsApp `messages` change
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppValue {
    pub messaging_product: Option<String>,
    pub metadata: WhatsAppMetadata,
    #[serde(default)]
    pub contacts: Vec<WhatsAppContact>,
    #[serde(default)]
    pub messages: Vec<WhatsAppMessage>,
    #[serde(default)]
    pub statuses: Vec<WhatsAppStatus>,
}

impl WhatsAppValue {
    /// Profile name the provider reported for a sender
    pub fn contact_name(&self, wa_id: &str) -> Option<String> {
        self.contacts
            .iter()
            .find(|c| c.wa_id == wa_id)
            .and_then(|c| c.profile.as_ref())
            .and_then(|p| p.name.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppMetadata {
    pub display_phone_number: Option<String>,
    pub phone_number_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppContact {
    pub wa_id: String,
    pub profile: Option<WhatsAppProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppProfile {
    pub name: Option<String>,
}

/// Inbound WhatsApp message
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppMessage {
    pub from: String,
    pub id: String,
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<TextBody>,
    pub image: Option<MediaBody>,
    pub video: Option<MediaBody>,
    pub audio: Option<MediaBody>,
    pub document: Option<MediaBody>,
    pub sticker: Option<MediaBody>,
    pub button: Option<ButtonBody>,
    pub interactive: Option<InteractiveBody>,
}

impl WhatsAppMessage {
    /// Text the classifier should see: body, reply title or media caption
    pub fn text_content(&self) -> Option<String> {
        if let Some(text) = &self.text {
            return Some(text.body.clone());
        }
        if let Some(button) = &self.button {
            return button.text.clone();
        }
        if let Some(interactive) = &self.interactive {
            let reply = interactive
                .button_reply
                .as_ref()
                .or(interactive.list_reply.as_ref());
            if let Some(reply) = reply {
                return Some(reply.title.clone());
            }
        }
        self.media().and_then(|m| m.caption.clone())
    }

    pub fn media(&self) -> Option<&MediaBody> {
        self.image
            .as_ref()
            .or(self.video.as_ref())
            .or(self.audio.as_ref())
            .or(self.document.as_ref())
            .or(self.sticker.as_ref())
    }

    pub fn sent_at(&self) -> DateTime<Utc> {
        parse_unix_timestamp(self.timestamp.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextBody {
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaBody {
    pub id: Option<String>,
    pub link: Option<String>,
    pub caption: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ButtonBody {
    pub text: Option<String>,
    pub payload: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InteractiveBody {
    pub button_reply: Option<ReplyBody>,
    pub list_reply: Option<ReplyBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplyBody {
    pub id: String,
    pub title: String,
}

/// Delivery status callback for an outbound WhatsApp message
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppStatus {
    pub id: String,
    pub status: String,
    pub timestamp: Option<String>,
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub errors: Vec<Value>,
}

impl WhatsAppStatus {
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .as_deref()
            .and_then(|t| t.parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }
}

/// Value of an Instagram or Facebook `comments` change
#[derive(Debug, Clone, Deserialize)]
pub struct CommentValue {
    /// Instagram comment id
    pub id: Option<String>,
    /// Facebook comment id
    pub comment_id: Option<String>,
    pub text: Option<String>,
    pub message: Option<String>,
    pub from: Option<CommentAuthor>,
    pub media: Option<Value>,
    pub post_id: Option<String>,
    pub created_time: Option<Value>,
}

impl CommentValue {
    pub fn comment_id(&self) -> Option<&str> {
        self.comment_id.as_deref().or(self.id.as_deref())
    }

    pub fn body(&self) -> Option<&str> {
        self.text.as_deref().or(self.message.as_deref())
    }

    pub fn author_name(&self) -> Option<String> {
        self.from
            .as_ref()
            .and_then(|f| f.username.clone().or_else(|| f.name.clone()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentAuthor {
    pub id: Option<String>,
    pub username: Option<String>,
    pub name: Option<String>,
}

/// Messenger / Instagram direct message event
#[derive(Debug, Clone, Deserialize)]
pub struct MessagingEvent {
    pub sender: Party,
    pub recipient: Party,
    /// Milliseconds since the epoch
    pub timestamp: Option<i64>,
    pub message: Option<MessagingMessage>,
}

impl MessagingEvent {
    pub fn message_id(&self) -> Option<&str> {
        self.message.as_ref().map(|m| m.mid.as_str())
    }

    pub fn sent_at(&self) -> DateTime<Utc> {
        self.timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Party {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagingMessage {
    pub mid: String,
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Copies of messages the page itself sent
    #[serde(default)]
    pub is_echo: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Option<AttachmentPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentPayload {
    pub url: Option<String>,
}

/// Provider timestamps are unix seconds as strings; fall back to now
pub fn parse_unix_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|t| t.parse::<i64>().ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_unknown_object_is_unsupported() {
        let payload: WebhookPayload =
            serde_json::from_value(json!({ "object": "user", "entry": [] })).unwrap();
        assert!(matches!(payload, WebhookPayload::Unsupported));
        assert!(payload.entries().is_empty());
    }

    #[test]
    fn test_whatsapp_message_routing() {
        let payload: WebhookPayload = serde_json::from_value(json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "waba-1",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": { "phone_number_id": "10001" },
                        "contacts": [{ "wa_id": "15551234567", "profile": { "name": "Ana" } }],
                        "messages": [{
                            "from": "15551234567",
                            "id": "wamid.IN1",
                            "timestamp": "1700000000",
                            "type": "interactive",
                            "interactive": { "button_reply": { "id": "b1", "title": "Yes please" } }
                        }]
                    }
                }]
            }]
        }))
        .unwrap();

        assert_eq!(payload.platform(), Some(Platform::Whatsapp));
        assert_eq!(payload.provider_event_id().as_deref(), Some("wamid.IN1"));

        match payload.entries()[0].changes[0].route() {
            RoutedChange::WhatsApp(value) => {
                assert_eq!(value.metadata.phone_number_id, "10001");
                assert_eq!(value.contact_name("15551234567").as_deref(), Some("Ana"));
                assert_eq!(value.messages[0].text_content().as_deref(), Some("Yes please"));
            }
            other => panic!("unexpected route: {:?}", other),
        }
    }

    #[test]
    fn test_comment_id_used_for_dedup() {
        let payload: WebhookPayload = serde_json::from_value(json!({
            "object": "instagram",
            "entry": [{
                "id": "ig-1",
                "changes": [{
                    "field": "comments",
                    "value": { "id": "17890", "text": "Love this!", "from": { "id": "u1", "username": "ana" } }
                }]
            }]
        }))
        .unwrap();

        assert_eq!(payload.provider_event_id().as_deref(), Some("17890"));
    }

    #[test]
    fn test_status_only_payload_has_no_provider_id() {
        let payload: WebhookPayload = serde_json::from_value(json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "waba-1",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": { "phone_number_id": "10001" },
                        "statuses": [{ "id": "wamid.OUT1", "status": "delivered", "timestamp": "1700000100" }]
                    }
                }]
            }]
        }))
        .unwrap();

        assert_eq!(payload.provider_event_id(), None);
    }

    #[test]
    fn test_unknown_field() {
        let change = Change {
            field: "mentions".to_string(),
            value: json!({}),
        };
        assert!(matches!(change.route(), RoutedChange::Unknown(field) if field == "mentions"));
    }
}
