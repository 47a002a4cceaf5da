//! Campaign Manager - Campaign lifecycle, template sync and batch sends

use super::rate_limiter::TokenBucket;
use crate::metrics::Metrics;
use crate::platform::{AdapterError, ChannelClients, PlatformSendAdapter};
use chrono::{DateTime, Utc};
use parley_common::metadata;
use parley_common::types::{CampaignId, ChannelId, MessageDirection, MessageStatus, Platform};
use parley_storage::models::{
    BroadcastCampaign, CampaignStatus, Channel, CreateCampaign, CreateMessage, MessageTemplate,
    TemplateStatus, UpsertConversation, UpsertTemplate,
};
use parley_storage::{
    CampaignRepository, ChannelRepository, ConversationRepository, MessageRepository, Stores,
    TemplateRepository,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const NO_CONTENT: &str = "no template or message provided";

/// Campaign manager errors
#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Campaign not found")]
    NotFound,

    #[error("Campaign is not in draft status")]
    NotDraft,

    #[error("Campaign already completed")]
    AlreadyCompleted,

    #[error("Campaign is already sending")]
    AlreadySending,

    #[error("Channel not found")]
    ChannelNotFound,

    #[error("Template not found")]
    TemplateNotFound,

    #[error("Invalid campaign: {0}")]
    Invalid(String),

    #[error("Provider client error: {0}")]
    Client(#[from] AdapterError),

    #[error(transparent)]
    Storage(#[from] parley_common::Error),
}

impl CampaignError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            CampaignError::NotFound
            | CampaignError::ChannelNotFound
            | CampaignError::TemplateNotFound => 404,
            CampaignError::NotDraft
            | CampaignError::AlreadyCompleted
            | CampaignError::AlreadySending => 409,
            CampaignError::Invalid(_) => 422,
            CampaignError::Client(AdapterError::RateLimited) => 429,
            CampaignError::Client(_) => 502,
            CampaignError::Storage(e) => e.status_code(),
        }
    }
}

/// Per-run overrides for a campaign execution
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteOptions {
    /// Template body parameters, used in key order
    pub template_params: Option<Map<String, Value>>,
    /// Custom text replacing the stored message
    pub message: Option<String>,
}

/// A recipient that could not be reached
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipientError {
    pub recipient: String,
    pub error: String,
}

/// Aggregate result of one campaign execution
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignRunResult {
    pub campaign_id: CampaignId,
    pub status: CampaignStatus,
    pub sent: i32,
    pub failed: i32,
    pub errors: Vec<RecipientError>,
}

/// What every recipient of a run receives
enum Outbound {
    Template {
        template: MessageTemplate,
        components: Value,
    },
    Text(String),
    Nothing,
}

/// Campaign Manager - Manages campaign lifecycle
pub struct CampaignManager {
    campaigns: Arc<dyn CampaignRepository>,
    channels: Arc<dyn ChannelRepository>,
    templates: Arc<dyn TemplateRepository>,
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    clients: Arc<dyn ChannelClients>,
    limiter: TokenBucket,
    metrics: Metrics,
}

impl CampaignManager {
    pub fn new(
        stores: &Stores,
        clients: Arc<dyn ChannelClients>,
        limiter: TokenBucket,
        metrics: Metrics,
    ) -> Self {
        Self {
            campaigns: stores.campaigns.clone(),
            channels: stores.channels.clone(),
            templates: stores.templates.clone(),
            conversations: stores.conversations.clone(),
            messages: stores.messages.clone(),
            clients,
            limiter,
            metrics,
        }
    }

    pub async fn get_campaign(&self, id: CampaignId) -> Result<BroadcastCampaign, CampaignError> {
        self.campaigns
            .get(id)
            .await?
            .ok_or(CampaignError::NotFound)
    }

    /// Create a campaign with zero counters
    pub async fn create_campaign(
        &self,
        input: CreateCampaign,
    ) -> Result<BroadcastCampaign, CampaignError> {
        if input.name.trim().is_empty() {
            return Err(CampaignError::Invalid("name is required".to_string()));
        }

        self.channels
            .get(input.channel_id)
            .await?
            .ok_or(CampaignError::ChannelNotFound)?;

        if let Some(template_id) = input.template_id {
            let template = self
                .templates
                .get(template_id)
                .await?
                .ok_or(CampaignError::TemplateNotFound)?;
            if template.channel_id != input.channel_id {
                return Err(CampaignError::Invalid(
                    "template belongs to another channel".to_string(),
                ));
            }
        }

        let campaign = self.campaigns.create(input).await?;
        info!(
            campaign_id = %campaign.id,
            recipients = campaign.recipients.len(),
            status = %campaign.status,
            "Campaign created"
        );
        Ok(campaign)
    }

    /// Move a draft campaign to scheduled
    pub async fn schedule_campaign(
        &self,
        id: CampaignId,
        at: DateTime<Utc>,
    ) -> Result<BroadcastCampaign, CampaignError> {
        let campaign = self.get_campaign(id).await?;
        if campaign.status_enum() != Some(CampaignStatus::Draft) {
            return Err(CampaignError::NotDraft);
        }

        let updated = self
            .campaigns
            .schedule(id, at)
            .await?
            .ok_or(CampaignError::NotFound)?;

        info!(campaign_id = %id, scheduled_at = %at, "Campaign scheduled");
        Ok(updated)
    }

    /// Pull every provider template for a channel and upsert it locally
    pub async fn sync_templates(
        &self,
        channel_id: ChannelId,
    ) -> Result<Vec<MessageTemplate>, CampaignError> {
        let channel = self
            .channels
            .get(channel_id)
            .await?
            .ok_or(CampaignError::ChannelNotFound)?;
        let platform: Platform = channel.platform.parse()?;
        let adapter = self.clients.client_for(&channel).await?;

        let provider_templates = adapter.list_templates().await?;
        let mut synced = Vec::with_capacity(provider_templates.len());

        for template in provider_templates {
            let stored = self
                .templates
                .upsert(UpsertTemplate {
                    channel_id,
                    platform,
                    template_name: template.name,
                    provider_template_id: template.id,
                    category: template.category,
                    language: template.language,
                    components: template.components,
                    status: TemplateStatus::from_provider(&template.status),
                })
                .await?;
            synced.push(stored);
        }

        info!(channel_id = %channel_id, count = synced.len(), "Templates synced");
        Ok(synced)
    }

    /// Send a campaign to every recipient, in order.
    ///
    /// Recipient failures are collected, never raised. Counters are stored
    /// after each recipient.
    pub async fn execute_campaign(
        &self,
        id: CampaignId,
        options: ExecuteOptions,
    ) -> Result<CampaignRunResult, CampaignError> {
        let campaign = self.get_campaign(id).await?;
        match campaign.status_enum() {
            Some(CampaignStatus::Completed) => return Err(CampaignError::AlreadyCompleted),
            Some(CampaignStatus::Sending) => return Err(CampaignError::AlreadySending),
            _ => {}
        }

        let channel = self
            .channels
            .get(campaign.channel_id)
            .await?
            .ok_or(CampaignError::ChannelNotFound)?;
        let platform: Platform = channel.platform.parse()?;
        let outbound = self.resolve_outbound(&campaign, &options).await?;
        let adapter = self.clients.client_for(&channel).await?;

        let Some(campaign) = self.campaigns.start_sending(id).await? else {
            return Err(match self.get_campaign(id).await?.status_enum() {
                Some(CampaignStatus::Completed) => CampaignError::AlreadyCompleted,
                _ => CampaignError::AlreadySending,
            });
        };

        info!(
            campaign_id = %id,
            recipients = campaign.recipients.len(),
            "Campaign sending"
        );

        let mut sent = 0i32;
        let mut failed = 0i32;
        let mut errors = Vec::new();

        for recipient in &campaign.recipients {
            match self
                .send_one(adapter.as_ref(), &channel, platform, &campaign, &outbound, recipient)
                .await
            {
                Ok(()) => {
                    sent += 1;
                    self.metrics
                        .campaign_sends
                        .with_label_values(&["sent"])
                        .inc();
                }
                Err(reason) => {
                    debug!(campaign_id = %id, recipient = %recipient, error = %reason, "Recipient failed");
                    failed += 1;
                    errors.push(RecipientError {
                        recipient: recipient.clone(),
                        error: reason,
                    });
                    self.metrics
                        .campaign_sends
                        .with_label_values(&["failed"])
                        .inc();
                }
            }

            if let Err(e) = self.campaigns.update_counters(id, sent, failed).await {
                warn!(campaign_id = %id, error = %e, "Failed to persist campaign counters");
            }
        }

        let status = if !campaign.recipients.is_empty() && failed as usize == campaign.recipients.len()
        {
            CampaignStatus::Failed
        } else {
            CampaignStatus::Completed
        };

        self.campaigns.update_counters(id, sent, failed).await?;
        self.campaigns
            .update_status(id, status)
            .await?
            .ok_or(CampaignError::NotFound)?;

        info!(campaign_id = %id, sent, failed, status = %status, "Campaign finished");

        Ok(CampaignRunResult {
            campaign_id: id,
            status,
            sent,
            failed,
            errors,
        })
    }

    /// Execute every scheduled campaign whose time has passed
    pub async fn run_due_campaigns(&self) -> Result<Vec<CampaignRunResult>, CampaignError> {
        let due = self.campaigns.list_due(Utc::now()).await?;
        if due.is_empty() {
            return Ok(Vec::new());
        }

        debug!(count = due.len(), "Running due campaigns");

        let mut results = Vec::with_capacity(due.len());
        for campaign in due {
            match self
                .execute_campaign(campaign.id, ExecuteOptions::default())
                .await
            {
                Ok(result) => results.push(result),
                Err(e) => error!(campaign_id = %campaign.id, error = %e, "Scheduled campaign failed"),
            }
        }
        Ok(results)
    }

    async fn resolve_outbound(
        &self,
        campaign: &BroadcastCampaign,
        options: &ExecuteOptions,
    ) -> Result<Outbound, CampaignError> {
        if let Some(template_id) = campaign.template_id {
            let template = self
                .templates
                .get(template_id)
                .await?
                .ok_or(CampaignError::TemplateNotFound)?;

            let params: Vec<String> = match &options.template_params {
                Some(map) => map.values().map(param_text).collect(),
                None => campaign.template_params.clone(),
            };

            return Ok(Outbound::Template {
                template,
                components: body_components(&params),
            });
        }

        let text = options
            .message
            .as_ref()
            .or(campaign.message.as_ref())
            .filter(|m| !m.trim().is_empty());

        Ok(match text {
            Some(text) => Outbound::Text(text.clone()),
            None => Outbound::Nothing,
        })
    }

    async fn send_one(
        &self,
        adapter: &dyn PlatformSendAdapter,
        channel: &Channel,
        platform: Platform,
        campaign: &BroadcastCampaign,
        outbound: &Outbound,
        recipient: &str,
    ) -> Result<(), String> {
        let (result, message_type, content) = match outbound {
            Outbound::Nothing => return Err(NO_CONTENT.to_string()),
            Outbound::Template {
                template,
                components,
            } => {
                self.limiter.acquire().await;
                let result = adapter
                    .send_template(
                        recipient,
                        &template.template_name,
                        &template.language,
                        components.clone(),
                    )
                    .await;
                (result, "template", template.template_name.clone())
            }
            Outbound::Text(text) => {
                self.limiter.acquire().await;
                (adapter.send_text(recipient, text).await, "text", text.clone())
            }
        };

        let receipt = result.map_err(|e| e.to_string())?;

        // The send went out; bookkeeping failures are logged only
        if let Err(e) = self
            .record_sent(channel, platform, campaign, recipient, message_type, content, receipt.message_id)
            .await
        {
            warn!(campaign_id = %campaign.id, recipient, error = %e, "Failed to record campaign message");
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_sent(
        &self,
        channel: &Channel,
        platform: Platform,
        campaign: &BroadcastCampaign,
        recipient: &str,
        message_type: &str,
        content: String,
        platform_message_id: String,
    ) -> parley_common::Result<()> {
        let now = Utc::now();
        let conversation = self
            .conversations
            .upsert(UpsertConversation {
                channel_id: channel.id,
                platform,
                participant_id: recipient.to_string(),
                participant_name: None,
                last_message: Some(content.clone()),
                last_message_at: now,
                mark_unread: false,
            })
            .await?;

        self.messages
            .create(CreateMessage {
                conversation_id: conversation.id,
                channel_id: channel.id,
                platform,
                direction: MessageDirection::Outbound,
                message_type: message_type.to_string(),
                content: Some(content),
                media_url: None,
                timestamp: now,
                status: MessageStatus::Sent,
                platform_message_id: Some(platform_message_id),
                metadata: json!({ metadata::CAMPAIGN_ID: campaign.id.to_string() }),
            })
            .await?;
        Ok(())
    }
}

fn param_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Template components carrying positional body parameters
fn body_components(params: &[String]) -> Value {
    if params.is_empty() {
        return json!([]);
    }
    let parameters: Vec<Value> = params
        .iter()
        .map(|p| json!({ "type": "text", "text": p }))
        .collect();
    json!([{ "type": "body", "parameters": parameters }])
}
