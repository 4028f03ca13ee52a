//! Process-local vector index
//!
//! Brute-force cosine similarity over a map. Upserts are visible to the next
//! query immediately.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{QueryRequest, VectorError, VectorIndex, VectorMatch, VectorRecord};

#[derive(Default)]
pub struct InMemoryIndex {
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), VectorError> {
        let mut stored = self.records.write().await;
        for record in records {
            stored.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn query(&self, request: QueryRequest) -> Result<Vec<VectorMatch>, VectorError> {
        let stored = self.records.read().await;

        let mut matches: Vec<VectorMatch> = stored
            .values()
            .filter(|record| {
                request
                    .filter
                    .as_ref()
                    .map_or(true, |filter| filter.matches(&record.metadata))
            })
            .map(|record| VectorMatch {
                id: record.id.clone(),
                score: cosine_similarity(&request.vector, &record.values),
                metadata: request.include_metadata.then(|| record.metadata.clone()),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(request.top_k);

        Ok(matches)
    }

    async fn fetch(&self, ids: &[String]) -> Result<HashMap<String, VectorRecord>, VectorError> {
        let stored = self.records.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| stored.get(id).map(|record| (id.clone(), record.clone())))
            .collect())
    }

    async fn delete_one(&self, id: &str) -> Result<(), VectorError> {
        self.records.write().await.remove(id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}

/// Cosine similarity; zero-length or mismatched vectors score 0
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
