//! Message template repository

use crate::db::DatabasePool;
use crate::models::{MessageTemplate, UpsertTemplate};
use async_trait::async_trait;
use parley_common::types::{ChannelId, TemplateId};
use parley_common::{Error, Result};
use uuid::Uuid;

/// Template repository trait
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Insert or overwrite by (channel_id, template_name, language)
    async fn upsert(&self, input: UpsertTemplate) -> Result<MessageTemplate>;
    async fn get(&self, id: TemplateId) -> Result<Option<MessageTemplate>>;
    async fn list_by_channel(&self, channel_id: ChannelId) -> Result<Vec<MessageTemplate>>;
}

/// Database template repository
pub struct DbTemplateRepository {
    pool: DatabasePool,
}

impl DbTemplateRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateRepository for DbTemplateRepository {
    async fn upsert(&self, input: UpsertTemplate) -> Result<MessageTemplate> {
        sqlx::query_as::<_, MessageTemplate>(
            r#"
            INSERT INTO message_templates (
                id, channel_id, platform, template_name, provider_template_id,
                category, language, components, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
            ON CONFLICT (channel_id, template_name, language) DO UPDATE SET
                provider_template_id = EXCLUDED.provider_template_id,
                category = EXCLUDED.category,
                components = EXCLUDED.components,
                status = EXCLUDED.status,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.channel_id)
        .bind(input.platform.as_str())
        .bind(&input.template_name)
        .bind(&input.provider_template_id)
        .bind(&input.category)
        .bind(&input.language)
        .bind(&input.components)
        .bind(input.status.to_string())
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: TemplateId) -> Result<Option<MessageTemplate>> {
        sqlx::query_as::<_, MessageTemplate>("SELECT * FROM message_templates WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_by_channel(&self, channel_id: ChannelId) -> Result<Vec<MessageTemplate>> {
        sqlx::query_as::<_, MessageTemplate>(
            "SELECT * FROM message_templates WHERE channel_id = $1 ORDER BY template_name, language",
        )
        .bind(channel_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
