//! Auto-response dispatch
//!
//! Channel keyword rules are checked first. When none fires, intents whose
//! suggested action is `auto_respond` get the configured canned reply.

use super::tagger::ConversationTagger;
use crate::intent::{Classification, Intent, SuggestedAction};
use crate::metrics::Metrics;
use crate::platform::ChannelClients;
use chrono::Utc;
use parley_common::config::AutoResponseConfig;
use parley_common::metadata;
use parley_common::types::{MessageDirection, MessageStatus, Platform, RuleId};
use parley_common::Result;
use parley_storage::models::{AutoResponseRule, Channel, Conversation, CreateMessage, Message};
use parley_storage::{AutoResponseRuleRepository, ConversationRepository, MessageRepository};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Reply chosen for an inbound message
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedResponse {
    pub text: String,
    /// Rule that produced the reply, when one matched
    pub rule_id: Option<RuleId>,
    /// Action recorded on the conversation for this reply
    pub action: SuggestedAction,
}

/// Sends automatic replies and tags the conversation afterwards
pub struct AutoResponder {
    config: AutoResponseConfig,
    rules: Arc<dyn AutoResponseRuleRepository>,
    messages: Arc<dyn MessageRepository>,
    conversations: Arc<dyn ConversationRepository>,
    clients: Arc<dyn ChannelClients>,
    tagger: ConversationTagger,
    metrics: Metrics,
}

impl AutoResponder {
    pub fn new(
        config: AutoResponseConfig,
        rules: Arc<dyn AutoResponseRuleRepository>,
        messages: Arc<dyn MessageRepository>,
        conversations: Arc<dyn ConversationRepository>,
        clients: Arc<dyn ChannelClients>,
        metrics: Metrics,
    ) -> Self {
        let tagger = ConversationTagger::new(conversations.clone());
        Self {
            config,
            rules,
            messages,
            conversations,
            clients,
            tagger,
            metrics,
        }
    }

    /// Reply to an inbound message if a rule or the intent calls for it,
    /// then tag the conversation.
    ///
    /// Returns the stored outbound message when a reply went out. Send and
    /// post-send persistence failures are logged and do not fail the call.
    pub async fn handle(
        &self,
        channel: &Channel,
        conversation: &Conversation,
        text: &str,
        classification: &Classification,
    ) -> Result<Option<Message>> {
        let mut applied = classification.clone();
        let sent = if self.config.enabled {
            match self.resolve(channel, text, classification).await? {
                Some(response) => {
                    applied.suggested_action = response.action;
                    self.dispatch(channel, conversation, response).await
                }
                None => {
                    self.metrics
                        .auto_responses
                        .with_label_values(&["skipped"])
                        .inc();
                    None
                }
            }
        } else {
            None
        };

        self.tagger.tag(conversation.id, &applied).await?;

        Ok(sent)
    }

    /// Pick the reply text, if any
    pub async fn resolve(
        &self,
        channel: &Channel,
        text: &str,
        classification: &Classification,
    ) -> Result<Option<ResolvedResponse>> {
        let rules = self.rules.list_active_for_channel(channel.id).await?;
        if let Some(rule) = match_rule(&rules, text) {
            debug!(rule_id = %rule.id, channel_id = %channel.id, "Auto-response rule matched");
            return Ok(Some(ResolvedResponse {
                text: rule.response.clone(),
                rule_id: Some(rule.id),
                action: SuggestedAction::AutoRespond,
            }));
        }

        if classification.suggested_action != SuggestedAction::AutoRespond {
            return Ok(None);
        }

        let canned = match classification.intent {
            Intent::Greeting => &self.config.greeting_message,
            Intent::PositiveFeedback => &self.config.positive_feedback_message,
            Intent::OptOut => &self.config.opt_out_message,
            _ => return Ok(None),
        };

        Ok(Some(ResolvedResponse {
            text: canned.clone(),
            rule_id: None,
            action: classification.suggested_action,
        }))
    }

    async fn dispatch(
        &self,
        channel: &Channel,
        conversation: &Conversation,
        response: ResolvedResponse,
    ) -> Option<Message> {
        if response.text.trim().is_empty() {
            return None;
        }

        let adapter = match self.clients.client_for(channel).await {
            Ok(adapter) => adapter,
            Err(e) => {
                warn!(channel_id = %channel.id, error = %e, "No client for auto-response");
                self.metrics
                    .auto_responses
                    .with_label_values(&["failed"])
                    .inc();
                return None;
            }
        };

        let receipt = match adapter
            .send_text(&conversation.participant_id, &response.text)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(
                    conversation_id = %conversation.id,
                    error = %e,
                    "Auto-response send failed"
                );
                self.metrics
                    .auto_responses
                    .with_label_values(&["failed"])
                    .inc();
                return None;
            }
        };
        self.metrics
            .auto_responses
            .with_label_values(&["sent"])
            .inc();

        let mut bag = Map::new();
        bag.insert(metadata::AUTO_RESPONSE.to_string(), Value::Bool(true));
        if let Some(rule_id) = response.rule_id {
            bag.insert(
                metadata::RULE_ID.to_string(),
                Value::String(rule_id.to_string()),
            );
        }

        let platform = match conversation.platform.parse::<Platform>() {
            Ok(platform) => platform,
            Err(e) => {
                error!(conversation_id = %conversation.id, error = %e, "Unknown conversation platform");
                return None;
            }
        };
        let stored = self
            .messages
            .create(CreateMessage {
                conversation_id: conversation.id,
                channel_id: channel.id,
                platform,
                direction: MessageDirection::Outbound,
                message_type: "text".to_string(),
                content: Some(response.text),
                media_url: None,
                timestamp: Utc::now(),
                status: MessageStatus::Sent,
                platform_message_id: Some(receipt.message_id),
                metadata: Value::Object(bag),
            })
            .await;
        let message = match stored {
            Ok(message) => message,
            Err(e) => {
                error!(
                    conversation_id = %conversation.id,
                    error = %e,
                    "Auto-response sent but not stored"
                );
                return None;
            }
        };

        if let Err(e) = self.conversations.mark_read(conversation.id).await {
            warn!(conversation_id = %conversation.id, error = %e, "Failed to mark conversation read");
        }

        info!(
            conversation_id = %conversation.id,
            message_id = %message.id,
            "Auto-response sent"
        );

        Some(message)
    }
}

/// First active keyword rule with a keyword contained in `text`
fn match_rule<'a>(rules: &'a [AutoResponseRule], text: &str) -> Option<&'a AutoResponseRule> {
    let lowered = text.to_lowercase();
    rules.iter().filter(|r| r.is_active && r.is_keyword()).find(|rule| {
        rule.keywords()
            .iter()
            .any(|keyword| lowered.contains(keyword.as_str()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::IntentClassifier;
    use crate::platform::testing::{MockAdapter, MockClients, Sent};
    use crate::platform::AdapterError;
    use parley_storage::models::{
        CreateAutoResponseRule, CreateChannel, TriggerType, UpsertConversation,
    };
    use parley_storage::{ChannelRepository, MemoryStore};
    use pretty_assertions::assert_eq;

    struct Fixture {
        store: Arc<MemoryStore>,
        adapter: Arc<MockAdapter>,
        responder: AutoResponder,
        channel: Channel,
        conversation: Conversation,
    }

    async fn fixture(config: AutoResponseConfig) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let adapter = Arc::new(MockAdapter::default());
        let responder = AutoResponder::new(
            config,
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(MockClients(adapter.clone())),
            Metrics::new().unwrap(),
        );

        let channel = ChannelRepository::create(
            store.as_ref(),
            CreateChannel {
                platform: Platform::Whatsapp,
                platform_id: "10001".to_string(),
                name: "Support line".to_string(),
            },
        )
        .await
        .unwrap();

        let conversation = ConversationRepository::upsert(
            store.as_ref(),
            UpsertConversation {
                channel_id: channel.id,
                platform: Platform::Whatsapp,
                participant_id: "15551234567".to_string(),
                participant_name: None,
                last_message: Some("hi".to_string()),
                last_message_at: Utc::now(),
                mark_unread: true,
            },
        )
        .await
        .unwrap();

        Fixture {
            store,
            adapter,
            responder,
            channel,
            conversation,
        }
    }

    #[tokio::test]
    async fn test_greeting_sends_canned_reply() {
        let f = fixture(AutoResponseConfig::default()).await;
        let classification = IntentClassifier::new().classify("hi");

        let sent = f
            .responder
            .handle(&f.channel, &f.conversation, "hi", &classification)
            .await
            .unwrap()
            .expect("reply stored");

        assert_eq!(sent.direction, "outbound");
        assert_eq!(sent.status, "sent");
        assert_eq!(sent.metadata[metadata::AUTO_RESPONSE], Value::Bool(true));
        assert!(sent.metadata.get(metadata::RULE_ID).is_none());
        assert_eq!(
            f.adapter.sent(),
            vec![Sent::Text {
                to: "15551234567".to_string(),
                text: AutoResponseConfig::default().greeting_message,
            }]
        );

        let conversation = ConversationRepository::get(f.store.as_ref(), f.conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!conversation.unread);
        assert_eq!(conversation.priority, "low");
        assert_eq!(conversation.tags, vec!["greeting".to_string()]);
    }

    #[tokio::test]
    async fn test_opt_out_uses_configured_text() {
        let f = fixture(AutoResponseConfig::default()).await;
        let classification = IntentClassifier::new().classify("STOP");

        f.responder
            .handle(&f.channel, &f.conversation, "STOP", &classification)
            .await
            .unwrap();

        assert_eq!(
            f.adapter.sent(),
            vec![Sent::Text {
                to: "15551234567".to_string(),
                text: AutoResponseConfig::default().opt_out_message,
            }]
        );
    }

    #[tokio::test]
    async fn test_keyword_rule_wins() {
        let f = fixture(AutoResponseConfig::default()).await;
        let rule = AutoResponseRuleRepository::create(
            f.store.as_ref(),
            CreateAutoResponseRule {
                channel_id: f.channel.id,
                trigger_type: TriggerType::Keyword,
                trigger_value: "hours, Opening Times".to_string(),
                response: "We are open 9-5".to_string(),
                priority: 10,
            },
        )
        .await
        .unwrap();

        let text = "What are your OPENING TIMES?";
        let classification = IntentClassifier::new().classify(text);
        assert_eq!(classification.intent, Intent::GeneralInquiry);

        let sent = f
            .responder
            .handle(&f.channel, &f.conversation, text, &classification)
            .await
            .unwrap()
            .expect("rule reply stored");

        assert_eq!(sent.content.as_deref(), Some("We are open 9-5"));
        assert_eq!(
            sent.metadata[metadata::RULE_ID],
            Value::String(rule.id.to_string())
        );

        let conversation = ConversationRepository::get(f.store.as_ref(), f.conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            conversation.metadata[metadata::SUGGESTED_ACTION],
            "auto_respond"
        );
        assert_eq!(conversation.metadata[metadata::LAST_INTENT], "general_inquiry");
    }

    #[tokio::test]
    async fn test_escalation_is_tagged_without_reply() {
        let f = fixture(AutoResponseConfig::default()).await;
        let text = "This is terrible, where is my refund";
        let classification = IntentClassifier::new().classify(text);

        let sent = f
            .responder
            .handle(&f.channel, &f.conversation, text, &classification)
            .await
            .unwrap();

        assert!(sent.is_none());
        assert!(f.adapter.sent().is_empty());

        let conversation = ConversationRepository::get(f.store.as_ref(), f.conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.priority, "urgent");
        assert_eq!(conversation.sentiment, "negative");
        assert_eq!(conversation.metadata[metadata::LAST_INTENT], "complaint");
        assert!(conversation.unread);
    }

    #[tokio::test]
    async fn test_send_failure_still_tags() {
        let f = fixture(AutoResponseConfig::default()).await;
        f.adapter
            .fail_for("15551234567", AdapterError::RateLimited);
        let classification = IntentClassifier::new().classify("hello");

        let sent = f
            .responder
            .handle(&f.channel, &f.conversation, "hello", &classification)
            .await
            .unwrap();

        assert!(sent.is_none());
        assert!(f.store.messages().is_empty());
        let conversation = ConversationRepository::get(f.store.as_ref(), f.conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.metadata[metadata::LAST_INTENT], "greeting");
    }

    /// Message store that rejects every write
    struct BrokenMessages;

    #[async_trait::async_trait]
    impl MessageRepository for BrokenMessages {
        async fn create(&self, _input: CreateMessage) -> Result<Message> {
            Err(parley_common::Error::Database("connection reset".to_string()))
        }

        async fn get(&self, _id: parley_common::types::MessageId) -> Result<Option<Message>> {
            Ok(None)
        }

        async fn find_by_platform_message_id(
            &self,
            _platform_message_id: &str,
        ) -> Result<Option<Message>> {
            Ok(None)
        }

        async fn update_status(
            &self,
            _id: parley_common::types::MessageId,
            _status: MessageStatus,
            _metadata: Map<String, Value>,
        ) -> Result<()> {
            Ok(())
        }

        async fn list_outbound_for_conversation(
            &self,
            _conversation_id: parley_common::types::ConversationId,
        ) -> Result<Vec<Message>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_store_failure_after_send_still_tags() {
        let f = fixture(AutoResponseConfig::default()).await;
        let responder = AutoResponder::new(
            AutoResponseConfig::default(),
            f.store.clone(),
            Arc::new(BrokenMessages),
            f.store.clone(),
            Arc::new(MockClients(f.adapter.clone())),
            Metrics::new().unwrap(),
        );
        let classification = IntentClassifier::new().classify("hi");

        let sent = responder
            .handle(&f.channel, &f.conversation, "hi", &classification)
            .await
            .unwrap();

        assert!(sent.is_none());
        assert_eq!(f.adapter.sent().len(), 1);
        let conversation = ConversationRepository::get(f.store.as_ref(), f.conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.metadata[metadata::LAST_INTENT], "greeting");
        assert_eq!(conversation.tags, vec!["greeting".to_string()]);
    }

    #[tokio::test]
    async fn test_disabled_skips_send() {
        let config = AutoResponseConfig {
            enabled: false,
            ..AutoResponseConfig::default()
        };
        let f = fixture(config).await;
        let classification = IntentClassifier::new().classify("hi");

        let sent = f
            .responder
            .handle(&f.channel, &f.conversation, "hi", &classification)
            .await
            .unwrap();

        assert!(sent.is_none());
        assert!(f.adapter.sent().is_empty());
    }
}
