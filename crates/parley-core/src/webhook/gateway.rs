//! Webhook Gateway - Authentication, dedup and audit trail for provider callbacks

use super::payload::WebhookPayload;
use super::signature::{body_fingerprint, constant_time_eq, verify_signature};
use crate::metrics::Metrics;
use crate::router::{EventRouter, RouteSummary, RouterError};
use parley_common::config::WebhookConfig;
use parley_storage::models::CreateWebhookEvent;
use parley_storage::WebhookEventRepository;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const PROVIDER: &str = "meta";

/// Gateway errors
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Webhook secret is not configured")]
    NotConfigured,

    #[error("Missing signature header")]
    MissingSignature,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Subscription verification failed")]
    VerificationFailed,

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] parley_common::Error),

    #[error("Routing failed: {0}")]
    Routing(#[from] RouterError),
}

impl WebhookError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            WebhookError::MissingSignature | WebhookError::InvalidSignature => 401,
            WebhookError::VerificationFailed => 403,
            WebhookError::NotConfigured
            | WebhookError::Malformed(_)
            | WebhookError::Storage(_)
            | WebhookError::Routing(_) => 500,
        }
    }
}

/// Result of ingesting one webhook body
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub deduped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RouteSummary>,
}

/// Entry point for provider webhooks
pub struct WebhookGateway {
    config: WebhookConfig,
    events: Arc<dyn WebhookEventRepository>,
    router: Arc<EventRouter>,
    metrics: Metrics,
}

impl WebhookGateway {
    pub fn new(
        config: WebhookConfig,
        events: Arc<dyn WebhookEventRepository>,
        router: Arc<EventRouter>,
        metrics: Metrics,
    ) -> Self {
        Self {
            config,
            events,
            router,
            metrics,
        }
    }

    /// Check the body signature. Fails closed when no secret is configured.
    pub fn verify(&self, raw_body: &[u8], signature: Option<&str>) -> Result<(), WebhookError> {
        let secret = self
            .config
            .app_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(WebhookError::NotConfigured)?;

        let header = signature
            .filter(|h| !h.trim().is_empty())
            .ok_or(WebhookError::MissingSignature)?;

        if verify_signature(raw_body, header, secret) {
            Ok(())
        } else {
            self.metrics
                .webhook_events
                .with_label_values(&["rejected"])
                .inc();
            warn!("Webhook signature mismatch");
            Err(WebhookError::InvalidSignature)
        }
    }

    /// Answer a subscription handshake with the challenge, verbatim
    pub fn challenge(
        &self,
        mode: Option<&str>,
        token: Option<&str>,
        challenge: Option<&str>,
    ) -> Result<String, WebhookError> {
        let expected = self
            .config
            .verify_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(WebhookError::VerificationFailed)?;

        match (mode, token, challenge) {
            (Some("subscribe"), Some(token), Some(challenge))
                if constant_time_eq(token.as_bytes(), expected.as_bytes()) =>
            {
                info!("Webhook subscription verified");
                Ok(challenge.to_string())
            }
            _ => {
                warn!(mode = ?mode, "Webhook subscription verification failed");
                Err(WebhookError::VerificationFailed)
            }
        }
    }

    /// Persist, deduplicate and route an authenticated body
    pub async fn ingest(&self, raw_body: &[u8]) -> Result<IngestOutcome, WebhookError> {
        let value: Value = serde_json::from_slice(raw_body).map_err(|e| {
            self.count("failed");
            WebhookError::Malformed(e.to_string())
        })?;
        let payload: WebhookPayload = serde_json::from_value(value.clone()).map_err(|e| {
            self.count("failed");
            WebhookError::Malformed(e.to_string())
        })?;

        let external_id = payload
            .provider_event_id()
            .unwrap_or_else(|| body_fingerprint(raw_body));

        if self.events.find_by_external_id(&external_id).await?.is_some() {
            debug!(external_id = %external_id, "Duplicate webhook");
            self.count("deduped");
            return Ok(IngestOutcome {
                deduped: true,
                summary: None,
            });
        }

        let Some(event) = self
            .events
            .insert(CreateWebhookEvent {
                provider: PROVIDER.to_string(),
                event_type: payload.object().to_string(),
                external_id: external_id.clone(),
                payload: value,
            })
            .await?
        else {
            debug!(external_id = %external_id, "Duplicate webhook lost insert race");
            self.count("deduped");
            return Ok(IngestOutcome {
                deduped: true,
                summary: None,
            });
        };

        match self.router.route(&payload).await {
            Ok(summary) => {
                self.events.mark_processed(event.id).await?;
                self.count("processed");
                Ok(IngestOutcome {
                    deduped: false,
                    summary: Some(summary),
                })
            }
            Err(e) => {
                error!(event_id = %event.id, error = %e, "Webhook routing failed");
                if let Err(mark_err) = self.events.mark_failed(event.id, &e.to_string()).await {
                    error!(event_id = %event.id, error = %mark_err, "Failed to mark webhook event failed");
                }
                self.count("failed");
                Err(WebhookError::Routing(e))
            }
        }
    }

    fn count(&self, outcome: &str) {
        self.metrics
            .webhook_events
            .with_label_values(&[outcome])
            .inc();
    }
}
