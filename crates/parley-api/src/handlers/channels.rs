//! Channel handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use parley_core::CampaignError;
use parley_storage::models::MessageTemplate;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{api_error, ApiError};
use crate::auth::AppState;

/// Template sync response
#[derive(Debug, Serialize)]
pub struct TemplateSyncResponse {
    pub synced: usize,
    pub templates: Vec<MessageTemplate>,
}

/// Pull provider templates for a channel
///
/// POST /api/v1/channels/:channel_id/templates/sync
pub async fn sync_templates(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<Uuid>,
) -> Result<Json<TemplateSyncResponse>, ApiError> {
    let templates = state
        .campaigns
        .sync_templates(channel_id)
        .await
        .map_err(|e| match e {
            CampaignError::ChannelNotFound => {
                api_error(StatusCode::NOT_FOUND, "not_found", "Channel not found")
            }
            CampaignError::Client(e) => {
                warn!(channel_id = %channel_id, error = %e, "Template sync failed");
                api_error(StatusCode::BAD_GATEWAY, "provider_error", e.to_string())
            }
            other => {
                warn!(channel_id = %channel_id, error = %other, "Template sync failed");
                api_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Template sync failed",
                )
            }
        })?;

    info!(channel_id = %channel_id, count = templates.len(), "Templates synced via API");

    Ok(Json(TemplateSyncResponse {
        synced: templates.len(),
        templates,
    }))
}
