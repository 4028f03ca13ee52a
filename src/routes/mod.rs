//! API routes

mod error;
mod limit;
mod memory;

use axum::{
    extract::State,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;

use crate::core::RateLimitStats;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    vector_index: &'static str,
    embedding_provider: &'static str,
    /// False while the hashed fallback is in use
    semantic_embeddings: bool,
    embedding_dimension: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let embedder = state.memory.embedder();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        vector_index: state.memory.index_name(),
        embedding_provider: embedder.name(),
        semantic_embeddings: embedder.is_semantic(),
        embedding_dimension: embedder.dimension(),
    })
}

async fn rate_limit_stats(State(state): State<AppState>) -> Json<RateLimitStats> {
    Json(state.limiter.stats())
}

pub fn router(state: AppState) -> Router {
    let memory_routes = Router::new()
        .route("/api/memory/store", post(memory::store))
        .route("/api/memory/list", post(memory::list))
        .route("/api/memory/search", post(memory::search))
        .route("/api/memory/delete", post(memory::delete))
        .route_layer(middleware::from_fn_with_state(state.clone(), limit::enforce));

    Router::new()
        .route("/health", get(health))
        .route("/api/rate-limit/stats", get(rate_limit_stats))
        .merge(memory_routes)
        .with_state(state)
}
