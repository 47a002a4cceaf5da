//! In-memory store for tests and local runs.
//!
//! Implements every repository trait with the same observable semantics as
//! the PostgreSQL repositories, including the uniqueness constraints.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_common::metadata;
use parley_common::types::{
    CampaignId, ChannelId, ConversationId, MessageId, MessageStatus, Platform, TemplateId,
    WebhookEventId,
};
use parley_common::{Error, Result};
use uuid::Uuid;

use crate::models::*;
use crate::repository::{
    AutoResponseRuleRepository, CampaignRepository, ChannelRepository, ConversationRepository,
    MessageRepository, TemplateRepository, WebhookEventRepository,
};

/// Mutex-guarded maps, one per table. Nothing is persisted.
#[derive(Default)]
pub struct MemoryStore {
    webhook_events: Mutex<Vec<WebhookEvent>>,
    channels: Mutex<HashMap<ChannelId, Channel>>,
    conversations: Mutex<HashMap<ConversationId, Conversation>>,
    messages: Mutex<Vec<Message>>,
    campaigns: Mutex<HashMap<CampaignId, BroadcastCampaign>>,
    templates: Mutex<Vec<MessageTemplate>>,
    rules: Mutex<Vec<AutoResponseRule>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored webhook event, in insertion order
    pub fn webhook_events(&self) -> Vec<WebhookEvent> {
        self.webhook_events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Every stored message, in insertion order
    pub fn messages(&self) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Every stored conversation
    pub fn conversations(&self) -> Vec<Conversation> {
        self.conversations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl WebhookEventRepository for MemoryStore {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<WebhookEvent>> {
        let events = self.webhook_events.lock().unwrap_or_else(|e| e.into_inner());
        Ok(events.iter().find(|e| e.external_id == external_id).cloned())
    }

    async fn insert(&self, input: CreateWebhookEvent) -> Result<Option<WebhookEvent>> {
        let mut events = self.webhook_events.lock().unwrap_or_else(|e| e.into_inner());
        if events.iter().any(|e| e.external_id == input.external_id) {
            return Ok(None);
        }
        let event = WebhookEvent {
            id: Uuid::now_v7(),
            provider: input.provider,
            event_type: input.event_type,
            external_id: input.external_id,
            payload: input.payload,
            status: "received".to_string(),
            error: None,
            received_at: Utc::now(),
            processed_at: None,
        };
        events.push(event.clone());
        Ok(Some(event))
    }

    async fn mark_processed(&self, id: WebhookEventId) -> Result<()> {
        let mut events = self.webhook_events.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(event) = events.iter_mut().find(|e| e.id == id) {
            event.status = "processed".to_string();
            event.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_failed(&self, id: WebhookEventId, error: &str) -> Result<()> {
        let mut events = self.webhook_events.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(event) = events.iter_mut().find(|e| e.id == id) {
            event.status = "failed".to_string();
            event.error = Some(error.to_string());
            event.processed_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelRepository for MemoryStore {
    async fn get(&self, id: ChannelId) -> Result<Option<Channel>> {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        Ok(channels.get(&id).cloned())
    }

    async fn find_by_platform_id(
        &self,
        platform: Platform,
        platform_id: &str,
    ) -> Result<Option<Channel>> {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        Ok(channels
            .values()
            .find(|c| c.is_active && c.platform == platform.as_str() && c.platform_id == platform_id)
            .cloned())
    }

    async fn create(&self, input: CreateChannel) -> Result<Channel> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        if channels
            .values()
            .any(|c| c.platform == input.platform.as_str() && c.platform_id == input.platform_id)
        {
            return Err(Error::Conflict(format!(
                "channel {} already exists",
                input.platform_id
            )));
        }
        let channel = Channel {
            id: Uuid::now_v7(),
            platform: input.platform.to_string(),
            platform_id: input.platform_id,
            name: input.name,
            is_active: true,
            created_at: Utc::now(),
        };
        channels.insert(channel.id, channel.clone());
        Ok(channel)
    }
}

#[async_trait]
impl ConversationRepository for MemoryStore {
    async fn upsert(&self, input: UpsertConversation) -> Result<Conversation> {
        let mut conversations = self.conversations.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();

        if let Some(existing) = conversations
            .values_mut()
            .find(|c| c.channel_id == input.channel_id && c.participant_id == input.participant_id)
        {
            if input.participant_name.is_some() {
                existing.participant_name = input.participant_name;
            }
            if input.last_message.is_some() {
                existing.last_message = input.last_message;
            }
            existing.last_message_at = Some(input.last_message_at);
            existing.unread = existing.unread || input.mark_unread;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let conversation = Conversation {
            id: Uuid::now_v7(),
            channel_id: input.channel_id,
            platform: input.platform.to_string(),
            participant_id: input.participant_id,
            participant_name: input.participant_name,
            last_message: input.last_message,
            last_message_at: Some(input.last_message_at),
            unread: input.mark_unread,
            priority: "normal".to_string(),
            sentiment: "neutral".to_string(),
            tags: Vec::new(),
            status: "open".to_string(),
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };
        conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn get(&self, id: ConversationId) -> Result<Option<Conversation>> {
        let conversations = self.conversations.lock().unwrap_or_else(|e| e.into_inner());
        Ok(conversations.get(&id).cloned())
    }

    async fn find_by_participant(
        &self,
        channel_id: ChannelId,
        participant_id: &str,
    ) -> Result<Option<Conversation>> {
        let conversations = self.conversations.lock().unwrap_or_else(|e| e.into_inner());
        Ok(conversations
            .values()
            .find(|c| c.channel_id == channel_id && c.participant_id == participant_id)
            .cloned())
    }

    async fn apply_classification(
        &self,
        id: ConversationId,
        classification: ConversationClassification,
    ) -> Result<()> {
        let mut conversations = self.conversations.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(conversation) = conversations.get_mut(&id) {
            conversation.priority = classification.priority.to_string();
            conversation.sentiment = classification.sentiment.to_string();
            conversation.tags = classification.tags;
            metadata::merge(&mut conversation.metadata, &classification.metadata);
            conversation.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_read(&self, id: ConversationId) -> Result<bool> {
        let mut conversations = self.conversations.lock().unwrap_or_else(|e| e.into_inner());
        match conversations.get_mut(&id) {
            Some(conversation) => {
                conversation.unread = false;
                conversation.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn create(&self, input: CreateMessage) -> Result<Message> {
        let mut messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pid) = input.platform_message_id.as_deref() {
            if messages
                .iter()
                .any(|m| m.platform_message_id.as_deref() == Some(pid))
            {
                return Err(Error::Conflict(format!("message {} already stored", pid)));
            }
        }
        let message = Message {
            id: Uuid::now_v7(),
            conversation_id: input.conversation_id,
            channel_id: input.channel_id,
            platform: input.platform.to_string(),
            direction: input.direction.to_string(),
            message_type: input.message_type,
            content: input.content,
            media_url: input.media_url,
            timestamp: input.timestamp,
            status: input.status.to_string(),
            platform_message_id: input.platform_message_id,
            metadata: input.metadata,
            created_at: Utc::now(),
        };
        messages.push(message.clone());
        Ok(message)
    }

    async fn get(&self, id: MessageId) -> Result<Option<Message>> {
        let messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        Ok(messages.iter().find(|m| m.id == id).cloned())
    }

    async fn find_by_platform_message_id(
        &self,
        platform_message_id: &str,
    ) -> Result<Option<Message>> {
        let messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        Ok(messages
            .iter()
            .find(|m| m.platform_message_id.as_deref() == Some(platform_message_id))
            .cloned())
    }

    async fn update_status(
        &self,
        id: MessageId,
        status: MessageStatus,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let mut messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(message) = messages.iter_mut().find(|m| m.id == id) {
            message.status = status.to_string();
            metadata::merge(&mut message.metadata, &patch);
        }
        Ok(())
    }

    async fn list_outbound_for_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>> {
        let messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        let mut outbound: Vec<Message> = messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id && m.direction == "outbound")
            .cloned()
            .collect();
        outbound.sort_by_key(|m| m.timestamp);
        Ok(outbound)
    }
}

#[async_trait]
impl CampaignRepository for MemoryStore {
    async fn create(&self, input: CreateCampaign) -> Result<BroadcastCampaign> {
        let mut campaigns = self.campaigns.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        let status = if input.scheduled_at.is_some() {
            CampaignStatus::Scheduled
        } else {
            CampaignStatus::Draft
        };
        let campaign = BroadcastCampaign {
            id: Uuid::now_v7(),
            channel_id: input.channel_id,
            name: input.name,
            template_id: input.template_id,
            message: input.message,
            template_params: input.template_params,
            recipients: input.recipients,
            status: status.to_string(),
            sent_count: 0,
            failed_count: 0,
            scheduled_at: input.scheduled_at,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        campaigns.insert(campaign.id, campaign.clone());
        Ok(campaign)
    }

    async fn get(&self, id: CampaignId) -> Result<Option<BroadcastCampaign>> {
        let campaigns = self.campaigns.lock().unwrap_or_else(|e| e.into_inner());
        Ok(campaigns.get(&id).cloned())
    }

    async fn start_sending(&self, id: CampaignId) -> Result<Option<BroadcastCampaign>> {
        let mut campaigns = self.campaigns.lock().unwrap_or_else(|e| e.into_inner());
        let Some(campaign) = campaigns.get_mut(&id) else {
            return Ok(None);
        };
        if !campaign.status_enum().is_some_and(|s| s.can_start()) {
            return Ok(None);
        }
        let now = Utc::now();
        campaign.status = CampaignStatus::Sending.to_string();
        campaign.sent_count = 0;
        campaign.failed_count = 0;
        campaign.started_at = Some(now);
        campaign.completed_at = None;
        campaign.updated_at = now;
        Ok(Some(campaign.clone()))
    }

    async fn update_status(
        &self,
        id: CampaignId,
        status: CampaignStatus,
    ) -> Result<Option<BroadcastCampaign>> {
        let mut campaigns = self.campaigns.lock().unwrap_or_else(|e| e.into_inner());
        let Some(campaign) = campaigns.get_mut(&id) else {
            return Ok(None);
        };
        let now = Utc::now();
        campaign.status = status.to_string();
        if status.is_terminal() {
            campaign.completed_at = Some(now);
        }
        campaign.updated_at = now;
        Ok(Some(campaign.clone()))
    }

    async fn update_counters(&self, id: CampaignId, sent: i32, failed: i32) -> Result<()> {
        let mut campaigns = self.campaigns.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(campaign) = campaigns.get_mut(&id) {
            campaign.sent_count = sent;
            campaign.failed_count = failed;
            campaign.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn schedule(
        &self,
        id: CampaignId,
        at: DateTime<Utc>,
    ) -> Result<Option<BroadcastCampaign>> {
        let mut campaigns = self.campaigns.lock().unwrap_or_else(|e| e.into_inner());
        let Some(campaign) = campaigns.get_mut(&id) else {
            return Ok(None);
        };
        campaign.status = CampaignStatus::Scheduled.to_string();
        campaign.scheduled_at = Some(at);
        campaign.updated_at = Utc::now();
        Ok(Some(campaign.clone()))
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<BroadcastCampaign>> {
        let campaigns = self.campaigns.lock().unwrap_or_else(|e| e.into_inner());
        let mut due: Vec<BroadcastCampaign> = campaigns
            .values()
            .filter(|c| {
                c.status == "scheduled" && c.scheduled_at.map(|at| at <= now).unwrap_or(false)
            })
            .cloned()
            .collect();
        due.sort_by_key(|c| c.scheduled_at);
        Ok(due)
    }
}

#[async_trait]
impl TemplateRepository for MemoryStore {
    async fn upsert(&self, input: UpsertTemplate) -> Result<MessageTemplate> {
        let mut templates = self.templates.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();

        if let Some(existing) = templates.iter_mut().find(|t| {
            t.channel_id == input.channel_id
                && t.template_name == input.template_name
                && t.language == input.language
        }) {
            existing.provider_template_id = input.provider_template_id;
            existing.category = input.category;
            existing.components = input.components;
            existing.status = input.status.to_string();
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let template = MessageTemplate {
            id: Uuid::now_v7(),
            channel_id: input.channel_id,
            platform: input.platform.to_string(),
            template_name: input.template_name,
            provider_template_id: input.provider_template_id,
            category: input.category,
            language: input.language,
            components: input.components,
            status: input.status.to_string(),
            created_at: now,
            updated_at: now,
        };
        templates.push(template.clone());
        Ok(template)
    }

    async fn get(&self, id: TemplateId) -> Result<Option<MessageTemplate>> {
        let templates = self.templates.lock().unwrap_or_else(|e| e.into_inner());
        Ok(templates.iter().find(|t| t.id == id).cloned())
    }

    async fn list_by_channel(&self, channel_id: ChannelId) -> Result<Vec<MessageTemplate>> {
        let templates = self.templates.lock().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<MessageTemplate> = templates
            .iter()
            .filter(|t| t.channel_id == channel_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            (a.template_name.as_str(), a.language.as_str())
                .cmp(&(b.template_name.as_str(), b.language.as_str()))
        });
        Ok(list)
    }
}

#[async_trait]
impl AutoResponseRuleRepository for MemoryStore {
    async fn list_active_for_channel(
        &self,
        channel_id: ChannelId,
    ) -> Result<Vec<AutoResponseRule>> {
        let rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        let mut active: Vec<AutoResponseRule> = rules
            .iter()
            .filter(|r| r.channel_id == channel_id && r.is_active)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal priority and timestamp.
        active.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(active)
    }

    async fn create(&self, input: CreateAutoResponseRule) -> Result<AutoResponseRule> {
        let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        let rule = AutoResponseRule {
            id: Uuid::now_v7(),
            channel_id: input.channel_id,
            trigger_type: input.trigger_type.to_string(),
            trigger_value: input.trigger_value,
            response: input.response,
            is_active: true,
            priority: input.priority,
            created_at: Utc::now(),
        };
        rules.push(rule.clone());
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_common::types::MessageDirection;
    use pretty_assertions::assert_eq;

    async fn channel(store: &MemoryStore) -> Channel {
        ChannelRepository::create(
            store,
            CreateChannel {
                platform: Platform::Whatsapp,
                platform_id: "10001".to_string(),
                name: "Support line".to_string(),
            },
        )
        .await
        .unwrap()
    }

    fn upsert_input(channel_id: ChannelId, participant: &str, unread: bool) -> UpsertConversation {
        UpsertConversation {
            channel_id,
            platform: Platform::Whatsapp,
            participant_id: participant.to_string(),
            participant_name: None,
            last_message: Some("hello".to_string()),
            last_message_at: Utc::now(),
            mark_unread: unread,
        }
    }

    #[tokio::test]
    async fn test_webhook_event_insert_is_conflict_tolerant() {
        let store = MemoryStore::new();
        let input = CreateWebhookEvent {
            provider: "meta".to_string(),
            event_type: "whatsapp_business_account".to_string(),
            external_id: "wamid.1".to_string(),
            payload: serde_json::json!({}),
        };

        assert!(store.insert(input.clone()).await.unwrap().is_some());
        assert!(store.insert(input).await.unwrap().is_none());
        assert_eq!(store.webhook_events().len(), 1);
    }

    #[tokio::test]
    async fn test_conversation_upsert_is_keyed_by_participant() {
        let store = MemoryStore::new();
        let channel = channel(&store).await;

        let first = ConversationRepository::upsert(&store, upsert_input(channel.id, "15551234567", true))
            .await
            .unwrap();
        store.mark_read(first.id).await.unwrap();
        let second =
            ConversationRepository::upsert(&store, upsert_input(channel.id, "15551234567", false))
                .await
                .unwrap();

        assert_eq!(first.id, second.id);
        assert!(!second.unread);
        assert_eq!(store.conversations().len(), 1);
    }

    #[tokio::test]
    async fn test_message_platform_id_is_unique() {
        let store = MemoryStore::new();
        let channel = channel(&store).await;
        let conversation =
            ConversationRepository::upsert(&store, upsert_input(channel.id, "15551234567", true))
                .await
                .unwrap();

        let input = CreateMessage {
            conversation_id: conversation.id,
            channel_id: channel.id,
            platform: Platform::Whatsapp,
            direction: MessageDirection::Outbound,
            message_type: "text".to_string(),
            content: Some("hi".to_string()),
            media_url: None,
            timestamp: Utc::now(),
            status: MessageStatus::Sent,
            platform_message_id: Some("wamid.X".to_string()),
            metadata: serde_json::json!({}),
        };

        MessageRepository::create(&store, input.clone()).await.unwrap();
        let err = MessageRepository::create(&store, input).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_rules_ordered_by_priority_then_creation() {
        let store = MemoryStore::new();
        let channel = channel(&store).await;
        for (value, priority) in [("a", 1), ("b", 5), ("c", 5)] {
            AutoResponseRuleRepository::create(
                &store,
                CreateAutoResponseRule {
                    channel_id: channel.id,
                    trigger_type: TriggerType::Keyword,
                    trigger_value: value.to_string(),
                    response: value.to_uppercase(),
                    priority,
                },
            )
            .await
            .unwrap();
        }

        let rules = store.list_active_for_channel(channel.id).await.unwrap();
        let order: Vec<&str> = rules.iter().map(|r| r.trigger_value.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_start_sending_claims_once() {
        let store = MemoryStore::new();
        let channel = channel(&store).await;
        let campaign = CampaignRepository::create(
            &store,
            CreateCampaign {
                channel_id: channel.id,
                name: "Launch".to_string(),
                message: Some("hello".to_string()),
                recipients: vec!["111".to_string()],
                ..CreateCampaign::default()
            },
        )
        .await
        .unwrap();

        let claimed = store.start_sending(campaign.id).await.unwrap().unwrap();
        assert_eq!(claimed.status, "sending");
        assert!(claimed.started_at.is_some());
        assert!(store.start_sending(campaign.id).await.unwrap().is_none());

        CampaignRepository::update_status(&store, campaign.id, CampaignStatus::Completed)
            .await
            .unwrap();
        assert!(store.start_sending(campaign.id).await.unwrap().is_none());

        CampaignRepository::update_status(&store, campaign.id, CampaignStatus::Failed)
            .await
            .unwrap();
        assert!(store.start_sending(campaign.id).await.unwrap().is_some());
    }
}
