//! Route handler functions.
//!
//! Handlers validate path and body input, delegate to the chat
//! orchestrator, and shape its results into JSON.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use medchat_chat::{ReplyKind, TurnReply};
use medchat_core::types::UserId;

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request / response types
// =============================================================================

/// Body of POST /users/{id}/chat.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Sanitized assistant reply.
    pub response: String,
    /// One of "answered", "fallback", "off_topic", "failed".
    pub kind: String,
    /// Why the model reply was replaced, for "fallback".
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
    /// When the turn was stored; absent for replies that are not persisted.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<TurnReply> for ChatResponse {
    fn from(reply: TurnReply) -> Self {
        let reason = match &reply.kind {
            ReplyKind::Fallback(failure) => Some(failure.code().to_string()),
            _ => None,
        };
        Self {
            kind: reply.kind.as_str().to_string(),
            reason,
            timestamp: reply.turn.map(|t| t.timestamp),
            response: reply.text,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub message: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub user_id: UserId,
    pub username: String,
    pub turns: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// Number of reference terms loaded; zero means every message is off-topic.
    pub corpus_terms: usize,
}

// =============================================================================
// Handler functions
// =============================================================================

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let corpus_terms = state.orchestrator.classifier().corpus_size();
    Json(HealthResponse {
        status: if corpus_terms > 0 { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        corpus_terms,
    })
}

/// POST /users/{id}/chat - run one chat turn.
pub async fn chat(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let reply = state
        .orchestrator
        .handle_turn(user_id, &request.message)
        .await?;

    if reply.kind == ReplyKind::InvalidInput {
        warn!(user_id, "Rejected blank chat message");
        return Err(ApiError::BadRequest(reply.text));
    }

    Ok(Json(reply.into()))
}

/// GET /users/{id}/history - live turns, oldest first.
pub async fn history(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Some(user) = state.users.find_by_id(user_id)? else {
        return Err(ApiError::NotFound(format!("User {} not found", user_id)));
    };

    let turns = state
        .orchestrator
        .history(user_id)?
        .into_iter()
        .map(|t| HistoryEntry {
            message: t.message,
            response: t.response,
            timestamp: t.timestamp,
        })
        .collect::<Vec<_>>();

    info!(user_id, turns = turns.len(), "History retrieved");
    Ok(Json(HistoryResponse {
        user_id,
        username: user.username,
        turns,
    }))
}

/// POST /users/{id}/clear - soft-delete the user's conversation.
pub async fn clear(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<ClearResponse>, ApiError> {
    if !state.users.exists(user_id)? {
        return Err(ApiError::NotFound(format!("User {} not found", user_id)));
    }

    let message = state.orchestrator.clear_history(user_id)?;
    Ok(Json(ClearResponse {
        message: message.to_string(),
    }))
}
