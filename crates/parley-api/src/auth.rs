//! Authentication module

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use parley_core::{CampaignManager, DeliveryTracker, Metrics, WebhookGateway};
use parley_storage::{DatabasePool, Stores};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Absent when running on the in-memory store
    pub db_pool: Option<DatabasePool>,
    pub stores: Stores,
    pub gateway: Arc<WebhookGateway>,
    pub campaigns: Arc<CampaignManager>,
    pub tracker: Arc<DeliveryTracker>,
    pub metrics: Metrics,
    /// Accepted API key hashes (argon2 PHC strings or SHA-256 hex)
    pub api_key_hashes: Arc<Vec<String>>,
}

/// Extract API key from request
pub fn extract_api_key(req: &Request) -> Option<&str> {
    // Check Authorization header
    if let Some(auth) = req.headers().get("authorization") {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(key) = auth_str.strip_prefix("Bearer ") {
                return Some(key.trim());
            }
        }
    }

    // Check X-API-Key header
    if let Some(key) = req.headers().get("x-api-key") {
        if let Ok(key_str) = key.to_str() {
            return Some(key_str.trim());
        }
    }

    None
}

/// Hash an API key for comparison
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify an API key against a configured hash.
///
/// Supports Argon2 hashes (`$argon2...`) and SHA-256 hex hashes.
fn verify_api_key(api_key: &str, stored_hash: &str) -> bool {
    if stored_hash.starts_with("$argon2") {
        return PasswordHash::new(stored_hash)
            .ok()
            .and_then(|parsed_hash| {
                Argon2::default()
                    .verify_password(api_key.as_bytes(), &parsed_hash)
                    .ok()
            })
            .is_some();
    }

    hash_api_key(api_key).eq_ignore_ascii_case(stored_hash.trim())
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let api_key = extract_api_key(&request).ok_or_else(|| {
        warn!(path = %request.uri().path(), "Missing API key");
        StatusCode::UNAUTHORIZED
    })?;

    if api_key.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    if state.api_key_hashes.is_empty() {
        warn!("No API keys configured, rejecting request");
        return Err(StatusCode::UNAUTHORIZED);
    }

    if !state
        .api_key_hashes
        .iter()
        .any(|hash| verify_api_key(api_key, hash))
    {
        warn!(path = %request.uri().path(), "API key rejected");
        return Err(StatusCode::UNAUTHORIZED);
    }

    debug!(path = %request.uri().path(), "API key accepted");
    Ok(next.run(request).await)
}
