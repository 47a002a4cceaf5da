//! Channel repository

use crate::db::DatabasePool;
use crate::models::{Channel, CreateChannel};
use async_trait::async_trait;
use parley_common::types::{ChannelId, Platform};
use parley_common::{Error, Result};
use uuid::Uuid;

/// Channel repository trait
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn get(&self, id: ChannelId) -> Result<Option<Channel>>;
    /// Active channel for a provider-side account id
    async fn find_by_platform_id(
        &self,
        platform: Platform,
        platform_id: &str,
    ) -> Result<Option<Channel>>;
    async fn create(&self, input: CreateChannel) -> Result<Channel>;
}

/// Database channel repository
pub struct DbChannelRepository {
    pool: DatabasePool,
}

impl DbChannelRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelRepository for DbChannelRepository {
    async fn get(&self, id: ChannelId) -> Result<Option<Channel>> {
        sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn find_by_platform_id(
        &self,
        platform: Platform,
        platform_id: &str,
    ) -> Result<Option<Channel>> {
        sqlx::query_as::<_, Channel>(
            "SELECT * FROM channels WHERE platform = $1 AND platform_id = $2 AND is_active = true",
        )
        .bind(platform.as_str())
        .bind(platform_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn create(&self, input: CreateChannel) -> Result<Channel> {
        sqlx::query_as::<_, Channel>(
            r#"
            INSERT INTO channels (id, platform, platform_id, name, is_active, created_at)
            VALUES ($1, $2, $3, $4, true, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.platform.as_str())
        .bind(&input.platform_id)
        .bind(&input.name)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
