//! Broadcast campaign repository

use crate::db::DatabasePool;
use crate::models::{BroadcastCampaign, CampaignStatus, CreateCampaign};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_common::types::CampaignId;
use parley_common::{Error, Result};
use uuid::Uuid;

/// Campaign repository trait
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    /// Persist with zero counters; `scheduled` when `scheduled_at` is set, else `draft`
    async fn create(&self, input: CreateCampaign) -> Result<BroadcastCampaign>;
    async fn get(&self, id: CampaignId) -> Result<Option<BroadcastCampaign>>;
    /// Claim a draft, scheduled or failed campaign for a run: moves it to
    /// `sending`, resets the counters and stamps `started_at`. Returns `None`
    /// when the campaign is missing or in any other status.
    async fn start_sending(&self, id: CampaignId) -> Result<Option<BroadcastCampaign>>;
    /// Move to `status`; entering a terminal status stamps `completed_at`
    async fn update_status(
        &self,
        id: CampaignId,
        status: CampaignStatus,
    ) -> Result<Option<BroadcastCampaign>>;
    async fn update_counters(&self, id: CampaignId, sent: i32, failed: i32) -> Result<()>;
    async fn schedule(
        &self,
        id: CampaignId,
        at: DateTime<Utc>,
    ) -> Result<Option<BroadcastCampaign>>;
    /// Scheduled campaigns whose time has come, oldest first
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<BroadcastCampaign>>;
}

/// Database campaign repository
pub struct DbCampaignRepository {
    pool: DatabasePool,
}

impl DbCampaignRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignRepository for DbCampaignRepository {
    async fn create(&self, input: CreateCampaign) -> Result<BroadcastCampaign> {
        let status = if input.scheduled_at.is_some() {
            CampaignStatus::Scheduled
        } else {
            CampaignStatus::Draft
        };

        sqlx::query_as::<_, BroadcastCampaign>(
            r#"
            INSERT INTO broadcast_campaigns (
                id, channel_id, name, template_id, message, template_params, recipients,
                status, sent_count, failed_count, scheduled_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, 0, $9, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.channel_id)
        .bind(&input.name)
        .bind(input.template_id)
        .bind(&input.message)
        .bind(&input.template_params)
        .bind(&input.recipients)
        .bind(status.to_string())
        .bind(input.scheduled_at)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: CampaignId) -> Result<Option<BroadcastCampaign>> {
        sqlx::query_as::<_, BroadcastCampaign>("SELECT * FROM broadcast_campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn start_sending(&self, id: CampaignId) -> Result<Option<BroadcastCampaign>> {
        sqlx::query_as::<_, BroadcastCampaign>(
            r#"
            UPDATE broadcast_campaigns SET
                status = 'sending',
                sent_count = 0,
                failed_count = 0,
                started_at = NOW(),
                completed_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('draft', 'scheduled', 'failed')
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn update_status(
        &self,
        id: CampaignId,
        status: CampaignStatus,
    ) -> Result<Option<BroadcastCampaign>> {
        sqlx::query_as::<_, BroadcastCampaign>(
            r#"
            UPDATE broadcast_campaigns SET
                status = $2,
                completed_at = CASE WHEN $3 THEN NOW() ELSE completed_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(status.is_terminal())
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn update_counters(&self, id: CampaignId, sent: i32, failed: i32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE broadcast_campaigns
            SET sent_count = $2, failed_count = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(sent)
        .bind(failed)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn schedule(
        &self,
        id: CampaignId,
        at: DateTime<Utc>,
    ) -> Result<Option<BroadcastCampaign>> {
        sqlx::query_as::<_, BroadcastCampaign>(
            r#"
            UPDATE broadcast_campaigns
            SET status = 'scheduled', scheduled_at = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(at)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<BroadcastCampaign>> {
        sqlx::query_as::<_, BroadcastCampaign>(
            r#"
            SELECT * FROM broadcast_campaigns
            WHERE status = 'scheduled' AND scheduled_at <= $1
            ORDER BY scheduled_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
