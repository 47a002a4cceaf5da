//! Auto-response rule repository

use crate::db::DatabasePool;
use crate::models::{AutoResponseRule, CreateAutoResponseRule};
use async_trait::async_trait;
use parley_common::types::ChannelId;
use parley_common::{Error, Result};
use uuid::Uuid;

/// Auto-response rule repository trait
#[async_trait]
pub trait AutoResponseRuleRepository: Send + Sync {
    /// Active rules for a channel, highest priority first, then oldest first
    async fn list_active_for_channel(&self, channel_id: ChannelId)
        -> Result<Vec<AutoResponseRule>>;
    async fn create(&self, input: CreateAutoResponseRule) -> Result<AutoResponseRule>;
}

/// Database rule repository
pub struct DbAutoResponseRuleRepository {
    pool: DatabasePool,
}

impl DbAutoResponseRuleRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AutoResponseRuleRepository for DbAutoResponseRuleRepository {
    async fn list_active_for_channel(
        &self,
        channel_id: ChannelId,
    ) -> Result<Vec<AutoResponseRule>> {
        sqlx::query_as::<_, AutoResponseRule>(
            r#"
            SELECT * FROM auto_response_rules
            WHERE channel_id = $1 AND is_active = true
            ORDER BY priority DESC, created_at ASC
            "#,
        )
        .bind(channel_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn create(&self, input: CreateAutoResponseRule) -> Result<AutoResponseRule> {
        sqlx::query_as::<_, AutoResponseRule>(
            r#"
            INSERT INTO auto_response_rules (
                id, channel_id, trigger_type, trigger_value, response, is_active, priority, created_at
            )
            VALUES ($1, $2, $3, $4, $5, true, $6, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.channel_id)
        .bind(input.trigger_type.to_string())
        .bind(&input.trigger_value)
        .bind(&input.response)
        .bind(input.priority)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
