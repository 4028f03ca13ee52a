//! Agent Memory API
//!
//! Stores short text memories per agent in a vector index and serves them
//! back by relevance, behind a per-caller fixed-window rate limiter.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod core;
mod providers;
mod routes;
mod vector;

use crate::config::Config;
use crate::core::{MemoryStore, RateLimiter};
use crate::providers::Embedder;
use crate::vector::{InMemoryIndex, PineconeConfig, PineconeIndex, VectorIndex};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub memory: Arc<MemoryStore>,
    pub limiter: Arc<RateLimiter>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_memory=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let index = build_index(&config)?;

    let embedder = Embedder::from_config(&config.embedding)?;
    if embedder.is_semantic() {
        tracing::info!(
            "Embeddings from '{}' ({} dimensions)",
            embedder.name(),
            embedder.dimension()
        );
    } else {
        tracing::warn!(
            "No embedding provider configured, using hashed fallback; search relevance is not semantic"
        );
    }

    let memory = Arc::new(MemoryStore::new(
        index,
        embedder,
        config.memory.memory_config(),
    ));

    let limiter = Arc::new(RateLimiter::new(config.rate_limit.limiter_config()));
    let sweeper = Arc::clone(&limiter).spawn_sweeper(config.rate_limit.sweep_interval());

    tracing::info!(
        "Rate limit: {} requests per {}ms",
        config.rate_limit.max_requests,
        config.rate_limit.window_ms
    );

    let state = AppState { memory, limiter };

    let app = Router::new()
        .merge(routes::router(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    tracing::info!("Agent memory API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    tracing::info!("Shut down");

    Ok(())
}

fn build_index(config: &Config) -> anyhow::Result<Arc<dyn VectorIndex>> {
    match (&config.vector.url, &config.vector.api_key) {
        (Some(url), Some(api_key)) => {
            tracing::info!("Using managed vector index at {}", url);
            let index = PineconeIndex::new(PineconeConfig {
                index_url: url.clone(),
                api_key: api_key.clone(),
                namespace: config.vector.namespace.clone(),
                timeout_secs: config.memory.timeout_secs,
            })?;
            Ok(Arc::new(index))
        }
        _ => {
            tracing::warn!("VECTOR_INDEX_URL not set, memories are kept in process and lost on restart");
            Ok(Arc::new(InMemoryIndex::new()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
