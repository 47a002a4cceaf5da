//! Delegation points for systems that live outside the messaging core

use async_trait::async_trait;
use parley_common::Result;
use parley_storage::models::Channel;
use serde_json::Value;
use tracing::debug;

/// Feed, commerce and ad-account synchronisation
#[async_trait]
pub trait ExternalSync: Send + Sync {
    /// Full resync of a channel's posts and comments
    async fn resync_feed(&self, channel: &Channel) -> Result<()>;

    /// Catalog or order change on a commerce account
    async fn sync_commerce(&self, account_id: &str, change: &Value) -> Result<()>;

    /// Change on an ad account
    async fn sync_ad_account(&self, account_id: &str, change: &Value) -> Result<()>;
}

/// Logs and drops every delegation
#[derive(Debug, Default)]
pub struct NoopExternalSync;

#[async_trait]
impl ExternalSync for NoopExternalSync {
    async fn resync_feed(&self, channel: &Channel) -> Result<()> {
        debug!(channel_id = %channel.id, "Feed resync requested, no sync backend configured");
        Ok(())
    }

    async fn sync_commerce(&self, account_id: &str, _change: &Value) -> Result<()> {
        debug!(account_id, "Commerce change received, no sync backend configured");
        Ok(())
    }

    async fn sync_ad_account(&self, account_id: &str, _change: &Value) -> Result<()> {
        debug!(account_id, "Ad account change received, no sync backend configured");
        Ok(())
    }
}
