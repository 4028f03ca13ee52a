//! Agent memory storage over a vector index
//!
//! Memories are short texts owned by one agent. Writes and reads are
//! best-effort: a failing vector service or embedder degrades to a local id
//! or an empty result so the chat turn calling us is never blocked.
//! Deletion is the exception; once a memory is known to exist, a failed
//! delete is reported to the caller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::providers::{Embedder, ProviderError};
use crate::vector::{
    Metadata, MetadataFilter, QueryRequest, VectorError, VectorIndex, VectorMatch, VectorRecord,
};

const AGENT_ID_KEY: &str = "agentId";
const TEXT_KEY: &str = "text";
const TIMESTAMP_KEY: &str = "timestamp";

#[derive(Debug, Clone, Copy)]
pub struct MemoryConfig {
    /// Bound on each embedding or vector service call
    pub timeout: Duration,
    /// Longest text accepted at the HTTP layer, in characters
    pub max_text_len: usize,
    pub default_top_k: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_text_len: 1000,
            default_top_k: 20,
        }
    }
}

/// Errors from the memory store
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Vector service error: {0}")]
    Vector(#[from] VectorError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] ProviderError),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// A memory as written to the index
#[derive(Debug, Clone)]
pub struct Memory {
    pub id: String,
    pub agent_id: String,
    pub text: String,
    pub vector: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub metadata: Metadata,
}

impl Memory {
    fn new(agent_id: &str, text: &str, vector: Vec<f32>, created_at: DateTime<Utc>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(AGENT_ID_KEY.into(), json!(agent_id));
        metadata.insert(TEXT_KEY.into(), json!(text));
        metadata.insert(TIMESTAMP_KEY.into(), json!(created_at.to_rfc3339()));

        Self {
            id: memory_id(agent_id, created_at),
            agent_id: agent_id.to_string(),
            text: text.to_string(),
            vector,
            created_at,
            metadata,
        }
    }
}

impl From<Memory> for VectorRecord {
    fn from(memory: Memory) -> Self {
        VectorRecord {
            id: memory.id,
            values: memory.vector,
            metadata: memory.metadata,
        }
    }
}

/// Result of `store`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMemory {
    pub id: String,
    /// False when the write failed and `id` is a local fallback
    pub persisted: bool,
}

/// A retrieved memory with its relevance score
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredMemory {
    pub id: String,
    pub agent_id: String,
    pub text: String,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ScoredMemory {
    /// Score as a whole percentage, clamped to 0..=100
    pub fn relevance(&self) -> u8 {
        (self.score * 100.0).round().clamp(0.0, 100.0) as u8
    }

    fn from_match(found: VectorMatch) -> Option<Self> {
        let metadata = found.metadata?;
        Some(Self {
            agent_id: str_field(&metadata, AGENT_ID_KEY)?,
            text: str_field(&metadata, TEXT_KEY).unwrap_or_default(),
            created_at: timestamp_field(&metadata),
            score: found.score,
            id: found.id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub id: String,
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

/// Memory store facade over a vector index and an embedder
pub struct MemoryStore {
    index: Arc<dyn VectorIndex>,
    embedder: Embedder,
    config: MemoryConfig,
}

impl MemoryStore {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Embedder, config: MemoryConfig) -> Self {
        Self {
            index,
            embedder,
            config,
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    pub fn index_name(&self) -> &'static str {
        self.index.name()
    }

    /// Persist `text` for `agent_id`. Never fails: on error a local id is returned.
    pub async fn store(&self, agent_id: &str, text: &str) -> StoredMemory {
        match self.try_store(agent_id, text).await {
            Ok(id) => {
                tracing::debug!("Stored memory {}", id);
                StoredMemory {
                    id,
                    persisted: true,
                }
            }
            Err(e) => {
                let id = fallback_id(agent_id);
                tracing::warn!("Failed to store memory, returning fallback id {}: {}", id, e);
                StoredMemory {
                    id,
                    persisted: false,
                }
            }
        }
    }

    async fn try_store(&self, agent_id: &str, text: &str) -> Result<String, MemoryError> {
        let vector = self.bounded(self.embedder.embed(text)).await?;
        let memory = Memory::new(agent_id, text, vector, Utc::now());
        let id = memory.id.clone();
        tracing::debug!(
            agent_id = %memory.agent_id,
            chars = memory.text.chars().count(),
            created_at = %memory.created_at,
            "Upserting memory {}",
            id
        );

        self.bounded(self.index.upsert(vec![memory.into()])).await?;
        Ok(id)
    }

    /// Up to `top_k` memories of `agent_id`; empty when the service is unavailable
    pub async fn list(&self, agent_id: &str, top_k: usize) -> Vec<ScoredMemory> {
        let probe = neutral_probe(self.embedder.dimension());
        match self.query(agent_id, probe, top_k).await {
            Ok(memories) => memories,
            Err(e) => {
                tracing::warn!("Failed to list memories: {}", e);
                Vec::new()
            }
        }
    }

    /// Memories of `agent_id` ranked against `query`; empty when the service is unavailable
    pub async fn search(&self, agent_id: &str, query: &str, top_k: usize) -> Vec<ScoredMemory> {
        let result: Result<Vec<ScoredMemory>, MemoryError> = async {
            let vector = self.bounded(self.embedder.embed(query)).await?;
            self.query(agent_id, vector, top_k).await
        }
        .await;

        match result {
            Ok(memories) => memories,
            Err(e) => {
                tracing::warn!("Failed to search memories: {}", e);
                Vec::new()
            }
        }
    }

    async fn query(
        &self,
        agent_id: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<ScoredMemory>, MemoryError> {
        let request = QueryRequest {
            vector,
            top_k,
            filter: Some(MetadataFilter::eq(AGENT_ID_KEY, agent_id)),
            include_metadata: true,
        };

        let matches = self.bounded(self.index.query(request)).await?;

        // The filter runs remotely; never hand back another agent's memory
        Ok(matches
            .into_iter()
            .filter_map(ScoredMemory::from_match)
            .filter(|memory| memory.agent_id == agent_id)
            .collect())
    }

    /// Delete a memory after confirming it exists
    pub async fn delete(&self, memory_id: &str) -> Result<DeleteOutcome, MemoryError> {
        let ids = [memory_id.to_string()];
        let mut found = self.bounded(self.index.fetch(&ids)).await?;

        let existing = found
            .remove(memory_id)
            .filter(|record| record.metadata.contains_key(AGENT_ID_KEY));

        let Some(record) = existing else {
            tracing::debug!("Memory {} not found, nothing to delete", memory_id);
            return Ok(DeleteOutcome {
                id: memory_id.to_string(),
                deleted: false,
                text: None,
                agent_id: None,
            });
        };

        self.bounded(self.index.delete_one(memory_id)).await?;
        tracing::info!("Deleted memory {}", memory_id);

        Ok(DeleteOutcome {
            id: memory_id.to_string(),
            deleted: true,
            text: str_field(&record.metadata, TEXT_KEY),
            agent_id: str_field(&record.metadata, AGENT_ID_KEY),
        })
    }

    /// Run `fut` under the configured timeout
    async fn bounded<T, E>(&self, fut: impl Future<Output = Result<T, E>>) -> Result<T, MemoryError>
    where
        MemoryError: From<E>,
    {
        match tokio::time::timeout(self.config.timeout, fut).await {
            Ok(result) => result.map_err(MemoryError::from),
            Err(_) => Err(MemoryError::Timeout(self.config.timeout)),
        }
    }
}

/// `{agent}-{unix millis}-{8 hex}`
fn memory_id(agent_id: &str, created_at: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", agent_id, created_at.timestamp_millis(), &suffix[..8])
}

fn fallback_id(agent_id: &str) -> String {
    format!("{}-local-{}", agent_id, uuid::Uuid::new_v4())
}

/// Unit vector with equal weight in every dimension, used to list without a query
fn neutral_probe(dimension: usize) -> Vec<f32> {
    let dimension = dimension.max(1);
    vec![1.0 / (dimension as f32).sqrt(); dimension]
}

fn str_field(metadata: &Metadata, key: &str) -> Option<String> {
    metadata.get(key).and_then(Value::as_str).map(str::to_string)
}

fn timestamp_field(metadata: &Metadata) -> Option<DateTime<Utc>> {
    metadata
        .get(TIMESTAMP_KEY)
        .and_then(Value::as_str)
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::HashEmbedder;
    use crate::vector::testing::{unavailable, DownIndex};
    use crate::vector::InMemoryIndex;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    /// Index that finds records but refuses to delete them
    struct UndeletableIndex(InMemoryIndex);

    #[async_trait]
    impl VectorIndex for UndeletableIndex {
        async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), VectorError> {
            self.0.upsert(records).await
        }

        async fn query(&self, request: QueryRequest) -> Result<Vec<VectorMatch>, VectorError> {
            self.0.query(request).await
        }

        async fn fetch(&self, ids: &[String]) -> Result<HashMap<String, VectorRecord>, VectorError> {
            self.0.fetch(ids).await
        }

        async fn delete_one(&self, _id: &str) -> Result<(), VectorError> {
            Err(unavailable())
        }

        fn name(&self) -> &'static str {
            "undeletable"
        }
    }

    /// Index that never answers
    struct HangingIndex;

    #[async_trait]
    impl VectorIndex for HangingIndex {
        async fn upsert(&self, _records: Vec<VectorRecord>) -> Result<(), VectorError> {
            std::future::pending().await
        }

        async fn query(&self, _request: QueryRequest) -> Result<Vec<VectorMatch>, VectorError> {
            std::future::pending().await
        }

        async fn fetch(
            &self,
            _ids: &[String],
        ) -> Result<HashMap<String, VectorRecord>, VectorError> {
            std::future::pending().await
        }

        async fn delete_one(&self, _id: &str) -> Result<(), VectorError> {
            std::future::pending().await
        }

        fn name(&self) -> &'static str {
            "hanging"
        }
    }

    fn store_with(index: Arc<dyn VectorIndex>) -> MemoryStore {
        MemoryStore::new(
            index,
            Embedder::Hash(HashEmbedder::new(384)),
            MemoryConfig {
                timeout: Duration::from_millis(200),
                ..MemoryConfig::default()
            },
        )
    }

    fn local_store() -> MemoryStore {
        store_with(Arc::new(InMemoryIndex::new()))
    }

    #[tokio::test]
    async fn test_store_and_list_round_trip() {
        let store = local_store();

        let first = store.store("agent_1", "hello").await;
        let second = store.store("agent_1", "hello").await;
        assert!(first.persisted && second.persisted);
        assert_ne!(first.id, second.id);

        let memories = store.list("agent_1", 10).await;
        assert_eq!(memories.len(), 2);
        assert!(memories.iter().all(|m| m.text == "hello"));
        assert!(memories.iter().any(|m| m.id == first.id));
        assert!(memories.iter().any(|m| m.id == second.id));
        assert!(memories.iter().all(|m| m.created_at.is_some()));
    }

    #[tokio::test]
    async fn test_id_is_bound_to_agent() {
        let store = local_store();
        let stored = store.store("agent_1", "User likes spicy food").await;

        assert!(stored.id.starts_with("agent_1-"));
        let parts: Vec<&str> = stored.id.rsplitn(3, '-').collect();
        assert_eq!(parts[0].len(), 8);
        assert!(parts[1].parse::<i64>().is_ok());
    }

    #[tokio::test]
    async fn test_list_never_crosses_agents() {
        let store = local_store();
        store.store("agent_1", "likes jazz").await;
        store.store("agent_2", "likes metal").await;

        let memories = store.list("agent_1", 10).await;
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].agent_id, "agent_1");
        assert_eq!(memories[0].text, "likes jazz");
    }

    #[tokio::test]
    async fn test_list_respects_top_k() {
        let store = local_store();
        for i in 0..5 {
            store.store("agent_1", &format!("memory number {}", i)).await;
        }

        assert_eq!(store.list("agent_1", 3).await.len(), 3);
    }

    #[tokio::test]
    async fn test_search_ranks_shared_tokens_first() {
        let store = local_store();
        store.store("agent_1", "User likes spicy food").await;
        store.store("agent_1", "Prefers dark mode in the UI").await;

        let results = store.search("agent_1", "food preferences", 5).await;
        assert!(!results.is_empty());
        assert_eq!(results[0].text, "User likes spicy food");
        assert!(results[0].score > 0.0);
    }

    #[tokio::test]
    async fn test_delete_existing_then_list() {
        let store = local_store();
        let keep = store.store("agent_1", "keep me").await;
        let forget = store.store("agent_1", "forget me").await;

        let outcome = assert_ok!(store.delete(&forget.id).await);
        assert!(outcome.deleted);
        assert_eq!(outcome.text.as_deref(), Some("forget me"));
        assert_eq!(outcome.agent_id.as_deref(), Some("agent_1"));

        let ids: Vec<String> = store
            .list("agent_1", 10)
            .await
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![keep.id]);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_an_error() {
        let store = local_store();
        let outcome = assert_ok!(store.delete("agent_1-nope").await);
        assert!(!outcome.deleted);
        assert_eq!(outcome.id, "agent_1-nope");
        assert!(outcome.text.is_none());
    }

    #[tokio::test]
    async fn test_store_falls_back_when_service_down() {
        let store = store_with(Arc::new(DownIndex));
        let stored = store.store("agent_1", "hello").await;

        assert!(!stored.persisted);
        assert!(stored.id.starts_with("agent_1-local-"));
    }

    #[tokio::test]
    async fn test_reads_degrade_to_empty_when_service_down() {
        let store = store_with(Arc::new(DownIndex));
        assert!(store.list("agent_1", 10).await.is_empty());
        assert!(store.search("agent_1", "anything", 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_surfaces_service_errors() {
        let store = store_with(Arc::new(DownIndex));
        let err = assert_err!(store.delete("agent_1-1").await);
        assert!(matches!(err, MemoryError::Vector(_)));
    }

    #[tokio::test]
    async fn test_delete_failure_after_confirmation_is_surfaced() {
        let store = store_with(Arc::new(UndeletableIndex(InMemoryIndex::new())));
        let stored = store.store("agent_1", "stubborn").await;
        assert!(stored.persisted);

        let err = assert_err!(store.delete(&stored.id).await);
        assert!(matches!(err, MemoryError::Vector(_)));
    }

    #[tokio::test]
    async fn test_calls_are_bounded_by_timeout() {
        let store = store_with(Arc::new(HangingIndex));

        let stored = store.store("agent_1", "hello").await;
        assert!(!stored.persisted);
        assert!(store.list("agent_1", 10).await.is_empty());

        let err = assert_err!(store.delete("agent_1-1").await);
        assert!(matches!(err, MemoryError::Timeout(_)));
    }

    #[test]
    fn test_relevance_percentage() {
        let mut memory = ScoredMemory {
            id: "a-1".into(),
            agent_id: "a".into(),
            text: "t".into(),
            score: 0.876,
            created_at: None,
        };
        assert_eq!(memory.relevance(), 88);

        memory.score = -0.2;
        assert_eq!(memory.relevance(), 0);

        memory.score = 1.0000001;
        assert_eq!(memory.relevance(), 100);
    }

    #[test]
    fn test_neutral_probe_is_unit_length() {
        let probe = neutral_probe(384);
        let norm: f32 = probe.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_match_without_agent_is_dropped() {
        let found = VectorMatch {
            id: "x".into(),
            score: 0.5,
            metadata: Some(Metadata::new()),
        };
        assert!(ScoredMemory::from_match(found).is_none());
    }
}
