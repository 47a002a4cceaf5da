//! Campaign handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use parley_core::delivery::CampaignDeliveryStats;
use parley_core::{CampaignError, CampaignRunResult, ExecuteOptions};
use parley_storage::models::{BroadcastCampaign, CreateCampaign};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::{api_error, from_common, ApiError};
use crate::auth::AppState;

/// Campaign response
#[derive(Debug, Serialize)]
pub struct CampaignResponse {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub name: String,
    pub template_id: Option<Uuid>,
    pub message: Option<String>,
    pub template_params: Vec<String>,
    pub status: String,
    pub total_recipients: usize,
    pub sent_count: i32,
    pub failed_count: i32,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BroadcastCampaign> for CampaignResponse {
    fn from(c: BroadcastCampaign) -> Self {
        Self {
            id: c.id,
            channel_id: c.channel_id,
            name: c.name,
            template_id: c.template_id,
            message: c.message,
            template_params: c.template_params,
            status: c.status,
            total_recipients: c.recipients.len(),
            sent_count: c.sent_count,
            failed_count: c.failed_count,
            scheduled_at: c.scheduled_at,
            started_at: c.started_at,
            completed_at: c.completed_at,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// Request body for creating a campaign
#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub channel_id: Uuid,
    pub name: String,
    pub template_id: Option<Uuid>,
    pub message: Option<String>,
    #[serde(default)]
    pub template_params: Vec<String>,
    pub recipients: Vec<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Request body for scheduling a campaign
#[derive(Debug, Deserialize)]
pub struct ScheduleCampaignRequest {
    pub scheduled_at: DateTime<Utc>,
}

fn campaign_error(e: CampaignError) -> ApiError {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let code = match &e {
        CampaignError::NotFound | CampaignError::ChannelNotFound | CampaignError::TemplateNotFound => {
            "not_found"
        }
        CampaignError::NotDraft | CampaignError::AlreadyCompleted | CampaignError::AlreadySending => {
            "invalid_state"
        }
        CampaignError::Invalid(_) => "validation_error",
        CampaignError::Client(_) => "provider_error",
        CampaignError::Storage(_) => "internal_error",
    };

    if status.is_server_error() {
        error!(error = %e, "Campaign request failed");
    }
    let message = match &e {
        CampaignError::Storage(_) => "Internal server error".to_string(),
        other => other.to_string(),
    };
    api_error(status, code, message)
}

/// Create a new campaign
///
/// POST /api/v1/campaigns
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<CampaignResponse>), ApiError> {
    let campaign = state
        .campaigns
        .create_campaign(CreateCampaign {
            channel_id: input.channel_id,
            name: input.name,
            template_id: input.template_id,
            message: input.message,
            template_params: input.template_params,
            recipients: input.recipients,
            scheduled_at: input.scheduled_at,
        })
        .await
        .map_err(campaign_error)?;

    info!(campaign_id = %campaign.id, "Created campaign");

    Ok((StatusCode::CREATED, Json(CampaignResponse::from(campaign))))
}

/// Get a campaign by ID
///
/// GET /api/v1/campaigns/:campaign_id
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let campaign = state
        .campaigns
        .get_campaign(campaign_id)
        .await
        .map_err(campaign_error)?;

    Ok(Json(CampaignResponse::from(campaign)))
}

/// Schedule a draft campaign
///
/// POST /api/v1/campaigns/:campaign_id/schedule
pub async fn schedule_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
    Json(input): Json<ScheduleCampaignRequest>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let campaign = state
        .campaigns
        .schedule_campaign(campaign_id, input.scheduled_at)
        .await
        .map_err(campaign_error)?;

    Ok(Json(CampaignResponse::from(campaign)))
}

/// Send a campaign now and wait for the aggregate result
///
/// POST /api/v1/campaigns/:campaign_id/execute
pub async fn execute_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
    options: Option<Json<ExecuteOptions>>,
) -> Result<Json<CampaignRunResult>, ApiError> {
    let options = options.map(|Json(o)| o).unwrap_or_default();

    let result = state
        .campaigns
        .execute_campaign(campaign_id, options)
        .await
        .map_err(campaign_error)?;

    Ok(Json(result))
}

/// Delivery statistics for a campaign
///
/// GET /api/v1/campaigns/:campaign_id/stats
pub async fn get_campaign_stats(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignDeliveryStats>, ApiError> {
    let stats = state
        .tracker
        .get_campaign_delivery_stats(campaign_id)
        .await
        .map_err(from_common)?;

    Ok(Json(stats))
}
