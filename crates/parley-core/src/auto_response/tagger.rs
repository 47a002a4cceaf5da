//! Conversation tagging from classification results

use crate::intent::{Classification, Intent};
use chrono::{DateTime, Utc};
use parley_common::metadata;
use parley_common::types::{ConversationId, Priority, Sentiment};
use parley_common::Result;
use parley_storage::models::ConversationClassification;
use parley_storage::ConversationRepository;
use serde_json::{json, Map};
use std::sync::Arc;
use tracing::debug;

/// Writes priority, sentiment, tags and classification metadata onto a conversation
pub struct ConversationTagger {
    conversations: Arc<dyn ConversationRepository>,
}

impl ConversationTagger {
    pub fn new(conversations: Arc<dyn ConversationRepository>) -> Self {
        Self { conversations }
    }

    pub async fn tag(
        &self,
        conversation_id: ConversationId,
        classification: &Classification,
    ) -> Result<()> {
        let update = classification_update(classification, Utc::now());
        debug!(
            conversation_id = %conversation_id,
            intent = %classification.intent,
            priority = %update.priority,
            "Tagging conversation"
        );
        self.conversations
            .apply_classification(conversation_id, update)
            .await
    }
}

pub fn priority_for(intent: Intent) -> Priority {
    match intent {
        Intent::Complaint => Priority::Urgent,
        Intent::SupportRequest | Intent::PurchaseIntent => Priority::High,
        Intent::Greeting | Intent::PositiveFeedback | Intent::OptOut => Priority::Low,
        _ => Priority::Normal,
    }
}

pub fn sentiment_for(intent: Intent) -> Sentiment {
    match intent {
        Intent::Complaint => Sentiment::Negative,
        Intent::PositiveFeedback => Sentiment::Positive,
        _ => Sentiment::Neutral,
    }
}

/// Conversation update for a classification made at `now`
pub fn classification_update(
    classification: &Classification,
    now: DateTime<Utc>,
) -> ConversationClassification {
    let mut bag = Map::new();
    bag.insert(
        metadata::LAST_INTENT.to_string(),
        json!(classification.intent.as_str()),
    );
    bag.insert(
        metadata::LAST_CONFIDENCE.to_string(),
        json!(classification.confidence),
    );
    bag.insert(
        metadata::SUGGESTED_ACTION.to_string(),
        json!(classification.suggested_action.as_str()),
    );
    bag.insert(metadata::CLASSIFIED_AT.to_string(), json!(now.to_rfc3339()));

    ConversationClassification {
        priority: priority_for(classification.intent),
        sentiment: sentiment_for(classification.intent),
        tags: vec![classification.intent.as_str().to_string()],
        metadata: bag,
    }
}
