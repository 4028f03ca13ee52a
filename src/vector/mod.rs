//! Vector index backends
//!
//! The memory store only talks to a [`VectorIndex`]. Two backends exist:
//! - [`PineconeIndex`] - managed vector service over HTTP
//! - [`InMemoryIndex`] - process-local index for development and tests

mod in_memory;
mod pinecone;
#[cfg(test)]
pub(crate) mod testing;

pub use in_memory::InMemoryIndex;
pub use pinecone::{PineconeConfig, PineconeIndex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Free-form record metadata
pub type Metadata = Map<String, Value>;

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Vector service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// A stored vector with its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Exact-match filter on one metadata field
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataFilter {
    pub field: String,
    pub equals: String,
}

impl MetadataFilter {
    pub fn eq(field: impl Into<String>, equals: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            equals: equals.into(),
        }
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        metadata.get(&self.field).and_then(Value::as_str) == Some(self.equals.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub filter: Option<MetadataFilter>,
    pub include_metadata: bool,
}

/// One query hit, best first
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace records by id
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), VectorError>;

    /// Nearest neighbours of `request.vector`, ordered by descending score
    async fn query(&self, request: QueryRequest) -> Result<Vec<VectorMatch>, VectorError>;

    /// Records for the ids that exist; missing ids are simply absent from the map
    async fn fetch(&self, ids: &[String]) -> Result<HashMap<String, VectorRecord>, VectorError>;

    async fn delete_one(&self, id: &str) -> Result<(), VectorError>;

    /// Backend name for logs and health output
    fn name(&self) -> &'static str;
}
