//! Test doubles for code that depends on a `VectorIndex`

use async_trait::async_trait;
use std::collections::HashMap;

use super::{QueryRequest, VectorError, VectorIndex, VectorMatch, VectorRecord};

pub fn unavailable() -> VectorError {
    VectorError::Status {
        status: 503,
        body: "service unavailable".into(),
    }
}

/// Index whose every call fails like an unreachable service
pub struct DownIndex;

#[async_trait]
impl VectorIndex for DownIndex {
    async fn upsert(&self, _records: Vec<VectorRecord>) -> Result<(), VectorError> {
        Err(unavailable())
    }

    async fn query(&self, _request: QueryRequest) -> Result<Vec<VectorMatch>, VectorError> {
        Err(unavailable())
    }

    async fn fetch(&self, _ids: &[String]) -> Result<HashMap<String, VectorRecord>, VectorError> {
        Err(unavailable())
    }

    async fn delete_one(&self, _id: &str) -> Result<(), VectorError> {
        Err(unavailable())
    }

    fn name(&self) -> &'static str {
        "down"
    }
}
