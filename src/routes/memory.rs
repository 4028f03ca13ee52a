//! Memory endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::core::DeleteOutcome;
use crate::AppState;

/// Upper bound on `topK` from clients
const MAX_TOP_K: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRequest {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StoreResponse {
    pub id: String,
    pub success: bool,
    /// False when the vector service was unavailable and `id` is a local fallback
    pub persisted: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct MemoryView {
    pub id: String,
    pub text: String,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub memories: Vec<MemoryView>,
    pub success: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub score: f32,
    /// Score as a percentage
    pub relevance: u8,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub success: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    #[serde(default)]
    pub memory_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    #[serde(flatten)]
    pub outcome: DeleteOutcome,
    pub success: bool,
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{} is required", field)))
}

fn top_k(state: &AppState, requested: Option<usize>) -> usize {
    requested
        .unwrap_or(state.memory.config().default_top_k)
        .clamp(1, MAX_TOP_K)
}

pub async fn store(
    State(state): State<AppState>,
    payload: Result<Json<StoreRequest>, JsonRejection>,
) -> Result<Json<StoreResponse>, ApiError> {
    let Json(request) = payload?;
    let agent_id = required(request.agent_id, "agentId")?;
    let text = required(request.text, "text")?;

    let max_len = state.memory.config().max_text_len;
    if text.chars().count() > max_len {
        return Err(ApiError::BadRequest(format!(
            "text must be at most {} characters",
            max_len
        )));
    }

    let stored = state.memory.store(&agent_id, &text).await;

    Ok(Json(StoreResponse {
        id: stored.id,
        success: true,
        persisted: stored.persisted,
    }))
}

pub async fn list(
    State(state): State<AppState>,
    payload: Result<Json<ListRequest>, JsonRejection>,
) -> Result<Json<ListResponse>, ApiError> {
    let Json(request) = payload?;
    let agent_id = required(request.agent_id, "agentId")?;
    let top_k = top_k(&state, request.top_k);

    let memories = state
        .memory
        .list(&agent_id, top_k)
        .await
        .into_iter()
        .map(|m| MemoryView {
            id: m.id,
            text: m.text,
            score: m.score,
            timestamp: m.created_at,
        })
        .collect();

    Ok(Json(ListResponse {
        memories,
        success: true,
    }))
}

pub async fn search(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(request) = payload?;
    let agent_id = required(request.agent_id, "agentId")?;
    let query = required(request.query, "query")?;
    let top_k = top_k(&state, request.top_k);

    let results = state
        .memory
        .search(&agent_id, &query, top_k)
        .await
        .into_iter()
        .map(|m| SearchHit {
            relevance: m.relevance(),
            id: m.id,
            text: m.text,
            score: m.score,
        })
        .collect();

    Ok(Json(SearchResponse {
        results,
        success: true,
    }))
}

pub async fn delete(
    State(state): State<AppState>,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let Json(request) = payload?;
    let memory_id = required(request.memory_id, "memoryId")?;

    let outcome = state.memory.delete(&memory_id).await.map_err(|e| {
        tracing::error!("Failed to delete memory {}: {}", memory_id, e);
        ApiError::Internal(format!("Failed to delete memory: {}", e))
    })?;

    Ok(Json(DeleteResponse {
        outcome,
        success: true,
    }))
}
