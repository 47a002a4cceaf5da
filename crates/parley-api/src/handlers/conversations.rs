//! Conversation handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use parley_storage::ConversationRepository;
use std::sync::Arc;
use uuid::Uuid;

use super::{api_error, from_common, ApiError};
use crate::auth::AppState;

/// Clear a conversation's unread flag
///
/// POST /api/v1/conversations/:conversation_id/read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let found = state
        .stores
        .conversations
        .mark_read(conversation_id)
        .await
        .map_err(from_common)?;

    if found {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(api_error(
            StatusCode::NOT_FOUND,
            "not_found",
            "Conversation not found",
        ))
    }
}
