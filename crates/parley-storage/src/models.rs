//! Database models

use chrono::{DateTime, Utc};
use parley_common::types::{
    CampaignId, ChannelId, ConversationId, MessageDirection, MessageId, MessageStatus, Platform,
    Priority, RuleId, Sentiment, TemplateId, WebhookEventId,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Stored webhook event (audit trail and dedup record)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: WebhookEventId,
    pub provider: String,
    pub event_type: String,
    pub external_id: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub error: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Create webhook event input
#[derive(Debug, Clone)]
pub struct CreateWebhookEvent {
    pub provider: String,
    pub event_type: String,
    pub external_id: String,
    pub payload: serde_json::Value,
}

/// Connected external account
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub platform: String,
    pub platform_id: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    pub fn platform_enum(&self) -> Option<Platform> {
        self.platform.parse().ok()
    }
}

/// Create channel input
#[derive(Debug, Clone)]
pub struct CreateChannel {
    pub platform: Platform,
    pub platform_id: String,
    pub name: String,
}

/// Conversation with one external participant
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub channel_id: ChannelId,
    pub platform: String,
    pub participant_id: String,
    pub participant_name: Option<String>,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread: bool,
    pub priority: String,
    pub sentiment: String,
    pub tags: Vec<String>,
    pub status: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Find-or-create input for a conversation, keyed by (channel_id, participant_id)
#[derive(Debug, Clone)]
pub struct UpsertConversation {
    pub channel_id: ChannelId,
    pub platform: Platform,
    pub participant_id: String,
    pub participant_name: Option<String>,
    pub last_message: Option<String>,
    pub last_message_at: DateTime<Utc>,
    /// Inbound traffic sets the unread flag; outbound leaves it as is
    pub mark_unread: bool,
}

/// Result of tagging a conversation after classification
#[derive(Debug, Clone)]
pub struct ConversationClassification {
    pub priority: Priority,
    pub sentiment: Sentiment,
    pub tags: Vec<String>,
    /// Merged into the conversation's metadata bag
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Message model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub channel_id: ChannelId,
    pub platform: String,
    pub direction: String,
    pub message_type: String,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: String,
    pub platform_message_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn status_enum(&self) -> Option<MessageStatus> {
        self.status.parse().ok()
    }

    /// Campaign this message was sent for, if any
    pub fn campaign_id(&self) -> Option<&str> {
        self.metadata
            .get(parley_common::metadata::CAMPAIGN_ID)
            .and_then(|v| v.as_str())
    }
}

/// Create message input
#[derive(Debug, Clone)]
pub struct CreateMessage {
    pub conversation_id: ConversationId,
    pub channel_id: ChannelId,
    pub platform: Platform,
    pub direction: MessageDirection,
    pub message_type: String,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    pub platform_message_id: Option<String>,
    pub metadata: serde_json::Value,
}

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Completed,
    Failed,
}

impl CampaignStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Failed)
    }

    /// Statuses a run may start from
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            CampaignStatus::Draft | CampaignStatus::Scheduled | CampaignStatus::Failed
        )
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "draft"),
            CampaignStatus::Scheduled => write!(f, "scheduled"),
            CampaignStatus::Sending => write!(f, "sending"),
            CampaignStatus::Completed => write!(f, "completed"),
            CampaignStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "sending" => Ok(CampaignStatus::Sending),
            "completed" => Ok(CampaignStatus::Completed),
            "failed" => Ok(CampaignStatus::Failed),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Broadcast campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BroadcastCampaign {
    pub id: CampaignId,
    pub channel_id: ChannelId,
    pub name: String,
    pub template_id: Option<TemplateId>,
    pub message: Option<String>,
    pub template_params: Vec<String>,
    pub recipients: Vec<String>,
    pub status: String,
    pub sent_count: i32,
    pub failed_count: i32,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BroadcastCampaign {
    pub fn status_enum(&self) -> Option<CampaignStatus> {
        self.status.parse().ok()
    }
}

/// Create campaign input
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateCampaign {
    pub channel_id: ChannelId,
    pub name: String,
    pub template_id: Option<TemplateId>,
    pub message: Option<String>,
    #[serde(default)]
    pub template_params: Vec<String>,
    pub recipients: Vec<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Template approval status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateStatus {
    Pending,
    Approved,
    Rejected,
}

impl TemplateStatus {
    /// Map a provider status string; anything unrecognised is still pending review
    pub fn from_provider(status: &str) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "APPROVED" => TemplateStatus::Approved,
            "REJECTED" | "DISABLED" | "PAUSED" => TemplateStatus::Rejected,
            _ => TemplateStatus::Pending,
        }
    }
}

impl std::fmt::Display for TemplateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateStatus::Pending => write!(f, "pending"),
            TemplateStatus::Approved => write!(f, "approved"),
            TemplateStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// Provider-approved message template
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub id: TemplateId,
    pub channel_id: ChannelId,
    pub platform: String,
    pub template_name: String,
    pub provider_template_id: Option<String>,
    pub category: String,
    pub language: String,
    pub components: serde_json::Value,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Template sync input, keyed by (channel_id, template_name, language)
#[derive(Debug, Clone)]
pub struct UpsertTemplate {
    pub channel_id: ChannelId,
    pub platform: Platform,
    pub template_name: String,
    pub provider_template_id: Option<String>,
    pub category: String,
    pub language: String,
    pub components: serde_json::Value,
    pub status: TemplateStatus,
}

/// Auto-response trigger type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Keyword,
    Time,
    Absence,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerType::Keyword => write!(f, "keyword"),
            TriggerType::Time => write!(f, "time"),
            TriggerType::Absence => write!(f, "absence"),
        }
    }
}

/// Auto-response rule model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AutoResponseRule {
    pub id: RuleId,
    pub channel_id: ChannelId,
    pub trigger_type: String,
    pub trigger_value: String,
    pub response: String,
    pub is_active: bool,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

impl AutoResponseRule {
    pub fn is_keyword(&self) -> bool {
        self.trigger_type == "keyword"
    }

    /// Comma-separated trigger keywords, trimmed and lowercased
    pub fn keywords(&self) -> Vec<String> {
        self.trigger_value
            .split(',')
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect()
    }
}

/// Create rule input
#[derive(Debug, Clone)]
pub struct CreateAutoResponseRule {
    pub channel_id: ChannelId,
    pub trigger_type: TriggerType,
    pub trigger_value: String,
    pub response: String,
    pub priority: i32,
}
