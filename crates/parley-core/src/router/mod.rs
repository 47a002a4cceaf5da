//! Event Router - Dispatches typed webhook changes to their handlers
//!
//! Channel lookups that fail at the storage layer abort the whole payload.
//! Everything below that is handled change by change: a failing change is
//! logged and counted, and the rest of the payload still runs.

use crate::auto_response::AutoResponder;
use crate::delivery::DeliveryTracker;
use crate::intent::IntentClassifier;
use crate::metrics::Metrics;
use crate::platform::{ChannelClients, ExternalSync};
use crate::webhook::payload::{
    CommentValue, Entry, MessagingEvent, RoutedChange, WebhookPayload, WhatsAppMessage,
    WhatsAppStatus, WhatsAppValue,
};
use chrono::{DateTime, Utc};
use parley_common::types::{MessageDirection, MessageStatus, Platform};
use parley_common::{Config, Error};
use parley_storage::models::{Channel, CreateMessage, UpsertConversation};
use parley_storage::Stores;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Router errors that fail a whole payload
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Channel lookup failed: {0}")]
    Storage(#[from] Error),
}

/// Per-payload counts of change items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouteSummary {
    pub handled: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RouteSummary {
    fn record(&mut self, result: parley_common::Result<Handled>, what: &str) {
        match result {
            Ok(Handled::Yes) => self.handled += 1,
            Ok(Handled::Skipped) => self.skipped += 1,
            Err(e) => {
                warn!(item = what, error = %e, "Webhook change failed");
                self.failed += 1;
            }
        }
    }
}

enum Handled {
    Yes,
    Skipped,
}

/// Inbound message normalised across platforms
struct Inbound {
    platform: Platform,
    participant_id: String,
    participant_name: Option<String>,
    platform_message_id: String,
    message_type: String,
    text: Option<String>,
    media_url: Option<String>,
    timestamp: DateTime<Utc>,
    /// Run the classifier and auto-responder on the text
    classify: bool,
}

/// Routes webhook payloads to conversation, delivery and sync handlers
pub struct EventRouter {
    stores: Stores,
    classifier: Arc<IntentClassifier>,
    responder: Arc<AutoResponder>,
    tracker: Arc<DeliveryTracker>,
    sync: Arc<dyn ExternalSync>,
    metrics: Metrics,
}

impl EventRouter {
    pub fn new(
        stores: Stores,
        classifier: Arc<IntentClassifier>,
        responder: Arc<AutoResponder>,
        tracker: Arc<DeliveryTracker>,
        sync: Arc<dyn ExternalSync>,
        metrics: Metrics,
    ) -> Self {
        Self {
            stores,
            classifier,
            responder,
            tracker,
            sync,
            metrics,
        }
    }

    /// Wire a router with its own responder and tracker
    pub fn build(
        stores: Stores,
        clients: Arc<dyn ChannelClients>,
        config: &Config,
        sync: Arc<dyn ExternalSync>,
        metrics: Metrics,
    ) -> Self {
        let responder = AutoResponder::new(
            config.auto_response.clone(),
            stores.rules.clone(),
            stores.messages.clone(),
            stores.conversations.clone(),
            clients,
            metrics.clone(),
        );
        let tracker = DeliveryTracker::new(
            stores.messages.clone(),
            stores.conversations.clone(),
            stores.campaigns.clone(),
            config.delivery.enforce_monotonic,
            metrics.clone(),
        );
        Self::new(
            stores,
            Arc::new(IntentClassifier::new()),
            Arc::new(responder),
            Arc::new(tracker),
            sync,
            metrics,
        )
    }

    pub fn tracker(&self) -> Arc<DeliveryTracker> {
        self.tracker.clone()
    }

    pub async fn route(&self, payload: &WebhookPayload) -> Result<RouteSummary, RouterError> {
        let mut summary = RouteSummary::default();

        match payload {
            WebhookPayload::WhatsAppBusinessAccount { entry } => {
                for e in entry {
                    self.route_whatsapp_entry(e, &mut summary).await?;
                }
            }
            WebhookPayload::Page { entry } => {
                for e in entry {
                    self.route_social_entry(Platform::Facebook, e, &mut summary)
                        .await?;
                }
            }
            WebhookPayload::Instagram { entry } => {
                for e in entry {
                    self.route_social_entry(Platform::Instagram, e, &mut summary)
                        .await?;
                }
            }
            WebhookPayload::CommerceAccount { entry } => {
                for e in entry {
                    for change in &e.changes {
                        self.spawn_commerce_sync(e.id.clone(), change.value.clone());
                        summary.handled += 1;
                    }
                }
            }
            WebhookPayload::AdAccount { entry } => {
                for e in entry {
                    for change in &e.changes {
                        self.spawn_ad_sync(e.id.clone(), change.value.clone());
                        summary.handled += 1;
                    }
                }
            }
            WebhookPayload::Unsupported => {
                debug!("Ignoring webhook for unsupported object");
                summary.skipped += 1;
            }
        }

        info!(
            object = payload.object(),
            handled = summary.handled,
            skipped = summary.skipped,
            failed = summary.failed,
            "Webhook routed"
        );
        Ok(summary)
    }

    async fn route_whatsapp_entry(
        &self,
        entry: &Entry,
        summary: &mut RouteSummary,
    ) -> Result<(), RouterError> {
        for change in &entry.changes {
            let RoutedChange::WhatsApp(value) = change.route() else {
                debug!(field = %change.field, "Skipping non-message WhatsApp change");
                summary.skipped += 1;
                continue;
            };

            let Some(channel) = self
                .channel(Platform::Whatsapp, &value.metadata.phone_number_id)
                .await?
            else {
                summary.skipped += value.messages.len() + value.statuses.len();
                continue;
            };

            for status in &value.statuses {
                summary.record(self.handle_status(status).await, "status");
            }
            for message in &value.messages {
                let inbound = whatsapp_inbound(&value, message);
                summary.record(self.handle_inbound(&channel, inbound).await, "message");
            }
        }
        Ok(())
    }

    async fn route_social_entry(
        &self,
        platform: Platform,
        entry: &Entry,
        summary: &mut RouteSummary,
    ) -> Result<(), RouterError> {
        let Some(channel) = self.channel(platform, &entry.id).await? else {
            summary.skipped += entry.changes.len() + entry.messaging.len();
            return Ok(());
        };

        for change in &entry.changes {
            match change.route() {
                RoutedChange::Comment(comment) => {
                    let result = self.handle_comment(&channel, platform, &comment).await;
                    summary.record(result, "comment");
                }
                RoutedChange::Feed(_) => {
                    self.spawn_feed_resync(channel.clone());
                    summary.handled += 1;
                }
                RoutedChange::Messages(event) => {
                    let result = self.handle_direct(&channel, platform, &event).await;
                    summary.record(result, "direct_message");
                }
                RoutedChange::WhatsApp(_) | RoutedChange::Unknown(_) => {
                    debug!(field = %change.field, platform = %platform, "Skipping change");
                    summary.skipped += 1;
                }
            }
        }

        for event in &entry.messaging {
            let result = self.handle_direct(&channel, platform, event).await;
            summary.record(result, "direct_message");
        }

        Ok(())
    }

    async fn channel(
        &self,
        platform: Platform,
        platform_id: &str,
    ) -> Result<Option<Channel>, RouterError> {
        let channel = self
            .stores
            .channels
            .find_by_platform_id(platform, platform_id)
            .await?;
        if channel.is_none() {
            debug!(platform = %platform, platform_id, "No channel for webhook entry");
        }
        Ok(channel)
    }

    async fn handle_status(&self, status: &WhatsAppStatus) -> parley_common::Result<Handled> {
        let Ok(parsed) = status.status.parse::<MessageStatus>() else {
            debug!(status = %status.status, "Ignoring unknown delivery status");
            return Ok(Handled::Skipped);
        };

        if !status.errors.is_empty() {
            warn!(platform_message_id = %status.id, errors = ?status.errors, "Provider reported delivery errors");
        }

        self.tracker
            .update_delivery_status(&status.id, parsed, status.occurred_at())
            .await?;
        Ok(Handled::Yes)
    }

    async fn handle_comment(
        &self,
        channel: &Channel,
        platform: Platform,
        comment: &CommentValue,
    ) -> parley_common::Result<Handled> {
        let Some(comment_id) = comment.comment_id() else {
            return Err(Error::Validation("comment without id".to_string()));
        };

        let inbound = Inbound {
            platform,
            participant_id: format!("{}_comment:{}", platform, comment_id),
            participant_name: comment.author_name(),
            platform_message_id: comment_id.to_string(),
            message_type: "comment".to_string(),
            text: comment.body().map(str::to_string),
            media_url: None,
            timestamp: Utc::now(),
            classify: false,
        };
        self.handle_inbound(channel, inbound).await
    }

    async fn handle_direct(
        &self,
        channel: &Channel,
        platform: Platform,
        event: &MessagingEvent,
    ) -> parley_common::Result<Handled> {
        let Some(message) = event.message.as_ref().filter(|m| !m.is_echo) else {
            return Ok(Handled::Skipped);
        };

        let attachment = message.attachments.first();
        let message_type = match (&message.text, attachment) {
            (Some(_), _) | (None, None) => "text".to_string(),
            (None, Some(a)) => a.kind.clone(),
        };

        let inbound = Inbound {
            platform,
            participant_id: event.sender.id.clone(),
            participant_name: None,
            platform_message_id: message.mid.clone(),
            message_type,
            text: message.text.clone(),
            media_url: attachment
                .and_then(|a| a.payload.as_ref())
                .and_then(|p| p.url.clone()),
            timestamp: event.sent_at(),
            classify: true,
        };
        self.handle_inbound(channel, inbound).await
    }

    /// Conversation upsert, message append, then classification and reply
    async fn handle_inbound(
        &self,
        channel: &Channel,
        inbound: Inbound,
    ) -> parley_common::Result<Handled> {
        if self
            .stores
            .messages
            .find_by_platform_message_id(&inbound.platform_message_id)
            .await?
            .is_some()
        {
            debug!(platform_message_id = %inbound.platform_message_id, "Message already stored");
            return Ok(Handled::Skipped);
        }

        let preview = inbound
            .text
            .clone()
            .unwrap_or_else(|| format!("[{}]", inbound.message_type));

        let conversation = self
            .stores
            .conversations
            .upsert(UpsertConversation {
                channel_id: channel.id,
                platform: inbound.platform,
                participant_id: inbound.participant_id.clone(),
                participant_name: inbound.participant_name.clone(),
                last_message: Some(preview),
                last_message_at: inbound.timestamp,
                mark_unread: true,
            })
            .await?;

        let created = self
            .stores
            .messages
            .create(CreateMessage {
                conversation_id: conversation.id,
                channel_id: channel.id,
                platform: inbound.platform,
                direction: MessageDirection::Inbound,
                message_type: inbound.message_type.clone(),
                content: inbound.text.clone(),
                media_url: inbound.media_url.clone(),
                timestamp: inbound.timestamp,
                status: MessageStatus::Delivered,
                platform_message_id: Some(inbound.platform_message_id.clone()),
                metadata: json!({}),
            })
            .await;

        match created {
            Ok(message) => {
                debug!(
                    conversation_id = %conversation.id,
                    message_id = %message.id,
                    "Inbound message stored"
                );
            }
            Err(Error::Conflict(_)) => return Ok(Handled::Skipped),
            Err(e) => return Err(e),
        }

        if !inbound.classify {
            return Ok(Handled::Yes);
        }

        if let Some(text) = inbound.text.as_deref().filter(|t| !t.trim().is_empty()) {
            let classification = self.classifier.classify(text);
            self.metrics
                .classifications
                .with_label_values(&[classification.intent.as_str()])
                .inc();
            debug!(
                conversation_id = %conversation.id,
                intent = %classification.intent,
                confidence = classification.confidence,
                "Message classified"
            );
            self.responder
                .handle(channel, &conversation, text, &classification)
                .await?;
        }

        Ok(Handled::Yes)
    }

    fn spawn_feed_resync(&self, channel: Channel) {
        let sync = self.sync.clone();
        tokio::spawn(async move {
            if let Err(e) = sync.resync_feed(&channel).await {
                warn!(channel_id = %channel.id, error = %e, "Feed resync failed");
            }
        });
    }

    fn spawn_commerce_sync(&self, account_id: String, change: Value) {
        let sync = self.sync.clone();
        tokio::spawn(async move {
            if let Err(e) = sync.sync_commerce(&account_id, &change).await {
                warn!(account_id = %account_id, error = %e, "Commerce sync failed");
            }
        });
    }

    fn spawn_ad_sync(&self, account_id: String, change: Value) {
        let sync = self.sync.clone();
        tokio::spawn(async move {
            if let Err(e) = sync.sync_ad_account(&account_id, &change).await {
                warn!(account_id = %account_id, error = %e, "Ad account sync failed");
            }
        });
    }
}

fn whatsapp_inbound(value: &WhatsAppValue, message: &WhatsAppMessage) -> Inbound {
    Inbound {
        platform: Platform::Whatsapp,
        participant_id: message.from.clone(),
        participant_name: value.contact_name(&message.from),
        platform_message_id: message.id.clone(),
        message_type: message.kind.clone(),
        text: message.text_content(),
        media_url: message.media().and_then(|m| m.link.clone()),
        timestamp: message.sent_at(),
        classify: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::{MockAdapter, MockClients};
    use crate::platform::NoopExternalSync;
    use async_trait::async_trait;
    use parley_common::metadata;
    use parley_storage::models::CreateChannel;
    use parley_storage::{ChannelRepository, MemoryStore, MessageRepository};
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    struct Pipeline {
        store: Arc<MemoryStore>,
        adapter: Arc<MockAdapter>,
        router: EventRouter,
    }

    fn pipeline_with_sync(sync: Arc<dyn ExternalSync>) -> Pipeline {
        let store = Arc::new(MemoryStore::new());
        let adapter = Arc::new(MockAdapter::default());
        let router = EventRouter::build(
            Stores::from_memory(store.clone()),
            Arc::new(MockClients(adapter.clone())),
            &Config::default(),
            sync,
            Metrics::new().unwrap(),
        );
        Pipeline {
            store,
            adapter,
            router,
        }
    }

    fn pipeline() -> Pipeline {
        pipeline_with_sync(Arc::new(NoopExternalSync))
    }

    async fn channel(store: &MemoryStore, platform: Platform, platform_id: &str) -> Channel {
        ChannelRepository::create(
            store,
            CreateChannel {
                platform,
                platform_id: platform_id.to_string(),
                name: "Main".to_string(),
            },
        )
        .await
        .unwrap()
    }

    fn parse(value: Value) -> WebhookPayload {
        serde_json::from_value(value).unwrap()
    }

    fn whatsapp_text(phone_number_id: &str, wamid: &str, body: &str) -> WebhookPayload {
        parse(json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "waba-1",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": { "phone_number_id": phone_number_id },
                        "contacts": [{ "wa_id": "15551234567", "profile": { "name": "Ana" } }],
                        "messages": [{
                            "from": "15551234567",
                            "id": wamid,
                            "timestamp": "1700000000",
                            "type": "text",
                            "text": { "body": body }
                        }]
                    }
                }]
            }]
        }))
    }

    #[tokio::test]
    async fn test_whatsapp_message_creates_conversation() {
        let p = pipeline();
        channel(&p.store, Platform::Whatsapp, "10001").await;

        let summary = p
            .router
            .route(&whatsapp_text("10001", "wamid.IN1", "Where is my parcel? I need help"))
            .await
            .unwrap();
        assert_eq!(summary.handled, 1);

        let conversations = p.store.conversations();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].participant_name.as_deref(), Some("Ana"));
        assert_eq!(conversations[0].priority, "high");
        assert_eq!(conversations[0].metadata[metadata::LAST_INTENT], "support_request");
        assert!(conversations[0].unread);

        let messages = p.store.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].direction, "inbound");
        assert!(p.adapter.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_channel_is_skipped() {
        let p = pipeline();
        let summary = p
            .router
            .route(&whatsapp_text("99999", "wamid.IN1", "hi"))
            .await
            .unwrap();

        assert_eq!(summary, RouteSummary { handled: 0, skipped: 1, failed: 0 });
        assert!(p.store.conversations().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_message_id_is_not_stored_twice() {
        let p = pipeline();
        channel(&p.store, Platform::Whatsapp, "10001").await;
        let payload = whatsapp_text("10001", "wamid.IN1", "hi");

        p.router.route(&payload).await.unwrap();
        let second = p.router.route(&payload).await.unwrap();

        assert_eq!(second.skipped, 1);
        let inbound = p
            .store
            .messages()
            .into_iter()
            .filter(|m| m.direction == "inbound")
            .count();
        assert_eq!(inbound, 1);
        assert_eq!(p.adapter.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_status_updates_outbound_message() {
        let p = pipeline();
        channel(&p.store, Platform::Whatsapp, "10001").await;
        p.router
            .route(&whatsapp_text("10001", "wamid.IN1", "hello"))
            .await
            .unwrap();
        // The greeting reply went out as wamid.mock1
        let reply = MessageRepository::find_by_platform_message_id(p.store.as_ref(), "wamid.mock1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.status, "sent");

        let statuses = parse(json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "waba-1",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": { "phone_number_id": "10001" },
                        "statuses": [
                            { "id": "wamid.mock1", "status": "read", "timestamp": "1700000200" },
                            { "id": "wamid.mock1", "status": "deleted" }
                        ]
                    }
                }]
            }]
        }));
        let summary = p.router.route(&statuses).await.unwrap();
        assert_eq!(summary.handled, 1);
        assert_eq!(summary.skipped, 1);

        let reply = MessageRepository::get(p.store.as_ref(), reply.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.status, "read");
        assert!(reply.metadata.get("read_at").is_some());
    }

    #[tokio::test]
    async fn test_comment_is_stored_once() {
        let p = pipeline();
        channel(&p.store, Platform::Instagram, "ig-1").await;
        let payload = parse(json!({
            "object": "instagram",
            "entry": [{
                "id": "ig-1",
                "changes": [{
                    "field": "comments",
                    "value": { "id": "17890", "text": "Love this!", "from": { "id": "u1", "username": "ana" } }
                }]
            }]
        }));

        p.router.route(&payload).await.unwrap();
        p.router.route(&payload).await.unwrap();

        let conversations = p.store.conversations();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].participant_id, "instagram_comment:17890");
        assert_eq!(conversations[0].participant_name.as_deref(), Some("ana"));
        assert_eq!(p.store.messages().len(), 1);
        assert_eq!(p.store.messages()[0].message_type, "comment");
    }

    #[tokio::test]
    async fn test_failing_change_does_not_block_siblings() {
        let p = pipeline();
        channel(&p.store, Platform::Instagram, "ig-1").await;
        let payload = parse(json!({
            "object": "instagram",
            "entry": [{
                "id": "ig-1",
                "changes": [
                    {
                        "field": "comments",
                        "value": { "text": "no id here", "from": { "id": "u0", "username": "ghost" } }
                    },
                    {
                        "field": "comments",
                        "value": { "id": "17891", "text": "Nice", "from": { "id": "u2", "username": "bea" } }
                    }
                ]
            }]
        }));

        let summary = p.router.route(&payload).await.unwrap();
        assert_eq!(summary, RouteSummary { handled: 1, skipped: 0, failed: 1 });

        let conversations = p.store.conversations();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].participant_id, "instagram_comment:17891");
        let messages = p.store.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].platform_message_id.as_deref(), Some("17891"));
        assert_eq!(messages[0].content.as_deref(), Some("Nice"));
    }

    #[tokio::test]
    async fn test_page_direct_message_and_echo() {
        let p = pipeline();
        channel(&p.store, Platform::Facebook, "page-1").await;
        let payload = parse(json!({
            "object": "page",
            "entry": [{
                "id": "page-1",
                "messaging": [
                    {
                        "sender": { "id": "psid-1" },
                        "recipient": { "id": "page-1" },
                        "timestamp": 1700000000000i64,
                        "message": { "mid": "m_1", "text": "thanks, amazing service" }
                    },
                    {
                        "sender": { "id": "page-1" },
                        "recipient": { "id": "psid-1" },
                        "message": { "mid": "m_2", "text": "echo", "is_echo": true }
                    }
                ]
            }]
        }));

        let summary = p.router.route(&payload).await.unwrap();
        assert_eq!(summary, RouteSummary { handled: 1, skipped: 1, failed: 0 });

        let conversations = p.store.conversations();
        assert_eq!(conversations[0].participant_id, "psid-1");
        assert_eq!(conversations[0].sentiment, "positive");
        assert_eq!(p.adapter.sent().len(), 1);
    }

    struct RecordingSync(mpsc::UnboundedSender<String>);

    #[async_trait]
    impl ExternalSync for RecordingSync {
        async fn resync_feed(&self, channel: &Channel) -> parley_common::Result<()> {
            let _ = self.0.send(format!("feed:{}", channel.platform_id));
            Ok(())
        }

        async fn sync_commerce(&self, account_id: &str, _change: &Value) -> parley_common::Result<()> {
            let _ = self.0.send(format!("commerce:{}", account_id));
            Ok(())
        }

        async fn sync_ad_account(&self, account_id: &str, _change: &Value) -> parley_common::Result<()> {
            let _ = self.0.send(format!("ads:{}", account_id));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_delegated_changes_run_in_background() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let p = pipeline_with_sync(Arc::new(RecordingSync(tx)));
        channel(&p.store, Platform::Facebook, "page-1").await;

        p.router
            .route(&parse(json!({
                "object": "page",
                "entry": [{ "id": "page-1", "changes": [{ "field": "feed", "value": { "item": "post" } }] }]
            })))
            .await
            .unwrap();
        p.router
            .route(&parse(json!({
                "object": "commerce_account",
                "entry": [{ "id": "cms-1", "changes": [{ "field": "orders", "value": {} }] }]
            })))
            .await
            .unwrap();

        let mut seen = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        seen.sort();
        assert_eq!(seen, vec!["commerce:cms-1".to_string(), "feed:page-1".to_string()]);
    }

    #[tokio::test]
    async fn test_unsupported_object() {
        let p = pipeline();
        let summary = p
            .router
            .route(&parse(json!({ "object": "user", "entry": [] })))
            .await
            .unwrap();
        assert_eq!(summary.skipped, 1);
    }
}
