//! Message repository

use crate::db::DatabasePool;
use crate::models::{CreateMessage, Message};
use async_trait::async_trait;
use parley_common::types::{ConversationId, MessageId, MessageStatus};
use parley_common::{Error, Result};
use uuid::Uuid;

/// Message repository trait
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, input: CreateMessage) -> Result<Message>;
    async fn get(&self, id: MessageId) -> Result<Option<Message>>;
    async fn find_by_platform_message_id(&self, platform_message_id: &str)
        -> Result<Option<Message>>;
    /// Overwrite the status and merge `metadata` into the message's bag
    async fn update_status(
        &self,
        id: MessageId,
        status: MessageStatus,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<()>;
    async fn list_outbound_for_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>>;
}

/// Database message repository
pub struct DbMessageRepository {
    pool: DatabasePool,
}

impl DbMessageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for DbMessageRepository {
    async fn create(&self, input: CreateMessage) -> Result<Message> {
        sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (
                id, conversation_id, channel_id, platform, direction, message_type,
                content, media_url, timestamp, status, platform_message_id, metadata, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.conversation_id)
        .bind(input.channel_id)
        .bind(input.platform.as_str())
        .bind(input.direction.to_string())
        .bind(&input.message_type)
        .bind(&input.content)
        .bind(&input.media_url)
        .bind(input.timestamp)
        .bind(input.status.as_str())
        .bind(&input.platform_message_id)
        .bind(&input.metadata)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => Error::Conflict(format!(
                "message {} already stored",
                input.platform_message_id.as_deref().unwrap_or_default()
            )),
            other => Error::Database(other.to_string()),
        })
    }

    async fn get(&self, id: MessageId) -> Result<Option<Message>> {
        sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn find_by_platform_message_id(
        &self,
        platform_message_id: &str,
    ) -> Result<Option<Message>> {
        sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE platform_message_id = $1")
            .bind(platform_message_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn update_status(
        &self,
        id: MessageId,
        status: MessageStatus,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let patch = serde_json::Value::Object(metadata);

        sqlx::query(
            r#"
            UPDATE messages SET
                status = $2,
                metadata = COALESCE(metadata, '{}'::jsonb) || $3::jsonb
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(&patch)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn list_outbound_for_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>> {
        sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE conversation_id = $1 AND direction = 'outbound'
            ORDER BY timestamp ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
