//! Webhook event repository

use crate::db::DatabasePool;
use crate::models::{CreateWebhookEvent, WebhookEvent};
use async_trait::async_trait;
use parley_common::types::WebhookEventId;
use parley_common::{Error, Result};
use uuid::Uuid;

/// Webhook event repository trait
///
/// Events form an audit trail and are never deleted.
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<WebhookEvent>>;
    /// Insert with status `received`; `None` when the external id already exists
    async fn insert(&self, input: CreateWebhookEvent) -> Result<Option<WebhookEvent>>;
    async fn mark_processed(&self, id: WebhookEventId) -> Result<()>;
    async fn mark_failed(&self, id: WebhookEventId, error: &str) -> Result<()>;
}

/// Database webhook event repository
pub struct DbWebhookEventRepository {
    pool: DatabasePool,
}

impl DbWebhookEventRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookEventRepository for DbWebhookEventRepository {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<WebhookEvent>> {
        sqlx::query_as::<_, WebhookEvent>("SELECT * FROM webhook_events WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn insert(&self, input: CreateWebhookEvent) -> Result<Option<WebhookEvent>> {
        sqlx::query_as::<_, WebhookEvent>(
            r#"
            INSERT INTO webhook_events (id, provider, event_type, external_id, payload, status, received_at)
            VALUES ($1, $2, $3, $4, $5, 'received', NOW())
            ON CONFLICT (external_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&input.provider)
        .bind(&input.event_type)
        .bind(&input.external_id)
        .bind(&input.payload)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn mark_processed(&self, id: WebhookEventId) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_events SET status = 'processed', processed_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn mark_failed(&self, id: WebhookEventId, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_events SET status = 'failed', error = $2, processed_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
