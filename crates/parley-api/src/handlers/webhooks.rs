//! Meta webhook handlers

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use parley_core::webhook::SIGNATURE_HEADER;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use crate::auth::AppState;

/// Subscription handshake parameters
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode", alias = "mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token", alias = "token")]
    pub token: Option<String>,
    #[serde(rename = "hub.challenge", alias = "challenge")]
    pub challenge: Option<String>,
}

/// Webhook acknowledgement
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deduped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Subscription handshake
///
/// GET /webhooks/meta
pub async fn verify_subscription(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    match state.gateway.challenge(
        query.mode.as_deref(),
        query.token.as_deref(),
        query.challenge.as_deref(),
    ) {
        Ok(challenge) => (StatusCode::OK, challenge).into_response(),
        Err(_) => StatusCode::FORBIDDEN.into_response(),
    }
}

/// Event delivery
///
/// POST /webhooks/meta
pub async fn receive_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookAck>) {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    if let Err(e) = state.gateway.verify(&body, signature) {
        let status =
            StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (
            status,
            Json(WebhookAck {
                success: false,
                deduped: None,
                error: Some(e.to_string()),
            }),
        );
    }

    match state.gateway.ingest(&body).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(WebhookAck {
                success: true,
                deduped: outcome.deduped.then_some(true),
                error: None,
            }),
        ),
        Err(e) => {
            error!(error = %e, "Webhook processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WebhookAck {
                    success: false,
                    deduped: None,
                    error: Some("Processing failed".to_string()),
                }),
            )
        }
    }
}
