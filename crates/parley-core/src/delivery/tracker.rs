//! Delivery status reconciliation

use crate::metrics::Metrics;
use chrono::{DateTime, Utc};
use parley_common::metadata;
use parley_common::types::{CampaignId, MessageStatus};
use parley_common::{Error, Result};
use parley_storage::{CampaignRepository, ConversationRepository, MessageRepository};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Delivery figures for one campaign
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignDeliveryStats {
    pub campaign_id: CampaignId,
    pub total_recipients: usize,
    pub sent: i32,
    pub failed: i32,
    /// Messages delivered or read
    pub delivered: i64,
    pub read: i64,
    /// `delivered / sent`, 0 when nothing was sent
    pub delivery_rate: f64,
    /// `read / sent`, 0 when nothing was sent
    pub read_rate: f64,
}

/// Applies provider status callbacks to stored outbound messages
pub struct DeliveryTracker {
    messages: Arc<dyn MessageRepository>,
    conversations: Arc<dyn ConversationRepository>,
    campaigns: Arc<dyn CampaignRepository>,
    enforce_monotonic: bool,
    metrics: Metrics,
}

impl DeliveryTracker {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        conversations: Arc<dyn ConversationRepository>,
        campaigns: Arc<dyn CampaignRepository>,
        enforce_monotonic: bool,
        metrics: Metrics,
    ) -> Self {
        Self {
            messages,
            conversations,
            campaigns,
            enforce_monotonic,
            metrics,
        }
    }

    /// Record a status for the message carrying `platform_message_id`.
    ///
    /// Unknown ids are ignored. Returns whether a message was updated.
    pub async fn update_delivery_status(
        &self,
        platform_message_id: &str,
        status: MessageStatus,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let Some(message) = self
            .messages
            .find_by_platform_message_id(platform_message_id)
            .await?
        else {
            debug!(platform_message_id, status = %status, "Status for unknown message");
            return Ok(false);
        };

        if self.enforce_monotonic {
            if let Some(current) = message.status_enum() {
                if current == MessageStatus::Failed || status.rank() < current.rank() {
                    debug!(
                        message_id = %message.id,
                        current = %current,
                        incoming = %status,
                        "Ignoring out-of-order status"
                    );
                    return Ok(false);
                }
            }
        }

        let at = timestamp.unwrap_or_else(Utc::now);
        let mut patch = Map::new();
        patch.insert(
            metadata::status_at_key(status.as_str()),
            Value::String(at.to_rfc3339()),
        );

        self.messages.update_status(message.id, status, patch).await?;
        self.metrics
            .delivery_updates
            .with_label_values(&[status.as_str()])
            .inc();

        debug!(message_id = %message.id, status = %status, "Delivery status updated");
        Ok(true)
    }

    /// Recount delivered and read messages across a campaign's recipients
    pub async fn get_campaign_delivery_stats(
        &self,
        campaign_id: CampaignId,
    ) -> Result<CampaignDeliveryStats> {
        let campaign = self
            .campaigns
            .get(campaign_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("campaign {}", campaign_id)))?;

        let campaign_key = campaign_id.to_string();
        let mut delivered = 0i64;
        let mut read = 0i64;
        let mut seen = HashSet::new();

        for recipient in &campaign.recipients {
            if !seen.insert(recipient.as_str()) {
                continue;
            }
            let Some(conversation) = self
                .conversations
                .find_by_participant(campaign.channel_id, recipient)
                .await?
            else {
                continue;
            };

            let outbound = self
                .messages
                .list_outbound_for_conversation(conversation.id)
                .await?;
            for message in outbound
                .iter()
                .filter(|m| m.campaign_id() == Some(campaign_key.as_str()))
            {
                match message.status_enum() {
                    Some(MessageStatus::Read) => {
                        delivered += 1;
                        read += 1;
                    }
                    Some(MessageStatus::Delivered) => delivered += 1,
                    _ => {}
                }
            }
        }

        let rate = |n: i64| {
            if campaign.sent_count > 0 {
                n as f64 / campaign.sent_count as f64
            } else {
                0.0
            }
        };

        Ok(CampaignDeliveryStats {
            campaign_id,
            total_recipients: campaign.recipients.len(),
            sent: campaign.sent_count,
            failed: campaign.failed_count,
            delivered,
            read,
            delivery_rate: rate(delivered),
            read_rate: rate(read),
        })
    }
}
