//! Conversation repository

use crate::db::DatabasePool;
use crate::models::{Conversation, ConversationClassification, UpsertConversation};
use async_trait::async_trait;
use parley_common::types::{ChannelId, ConversationId};
use parley_common::{Error, Result};
use uuid::Uuid;

/// Conversation repository trait
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Atomic find-or-create on (channel_id, participant_id)
    async fn upsert(&self, input: UpsertConversation) -> Result<Conversation>;
    async fn get(&self, id: ConversationId) -> Result<Option<Conversation>>;
    async fn find_by_participant(
        &self,
        channel_id: ChannelId,
        participant_id: &str,
    ) -> Result<Option<Conversation>>;
    async fn apply_classification(
        &self,
        id: ConversationId,
        classification: ConversationClassification,
    ) -> Result<()>;
    /// Clear the unread flag; `false` when the conversation does not exist
    async fn mark_read(&self, id: ConversationId) -> Result<bool>;
}

/// Database conversation repository
pub struct DbConversationRepository {
    pool: DatabasePool,
}

impl DbConversationRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for DbConversationRepository {
    async fn upsert(&self, input: UpsertConversation) -> Result<Conversation> {
        sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (
                id, channel_id, platform, participant_id, participant_name,
                last_message, last_message_at, unread, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
            ON CONFLICT (channel_id, participant_id) DO UPDATE SET
                participant_name = COALESCE(EXCLUDED.participant_name, conversations.participant_name),
                last_message = COALESCE(EXCLUDED.last_message, conversations.last_message),
                last_message_at = EXCLUDED.last_message_at,
                unread = conversations.unread OR EXCLUDED.unread,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.channel_id)
        .bind(input.platform.as_str())
        .bind(&input.participant_id)
        .bind(&input.participant_name)
        .bind(&input.last_message)
        .bind(input.last_message_at)
        .bind(input.mark_unread)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: ConversationId) -> Result<Option<Conversation>> {
        sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn find_by_participant(
        &self,
        channel_id: ChannelId,
        participant_id: &str,
    ) -> Result<Option<Conversation>> {
        sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE channel_id = $1 AND participant_id = $2",
        )
        .bind(channel_id)
        .bind(participant_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn apply_classification(
        &self,
        id: ConversationId,
        classification: ConversationClassification,
    ) -> Result<()> {
        let patch = serde_json::Value::Object(classification.metadata);

        sqlx::query(
            r#"
            UPDATE conversations SET
                priority = $2,
                sentiment = $3,
                tags = $4,
                metadata = COALESCE(metadata, '{}'::jsonb) || $5::jsonb,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(classification.priority.to_string())
        .bind(classification.sentiment.to_string())
        .bind(&classification.tags)
        .bind(&patch)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn mark_read(&self, id: ConversationId) -> Result<bool> {
        let result =
            sqlx::query("UPDATE conversations SET unread = false, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .execute(self.pool.pool())
                .await
                .map_err(|e| Error::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }
}
