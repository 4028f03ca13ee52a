//! Pinecone-style managed index over HTTP
//!
//! Talks to the data plane of a single index host:
//! `POST /vectors/upsert`, `POST /query`, `GET /vectors/fetch`,
//! `POST /vectors/delete`. Upserts are eventually visible to queries.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use super::{QueryRequest, VectorError, VectorIndex, VectorMatch, VectorRecord};

#[derive(Debug, Clone)]
pub struct PineconeConfig {
    /// Index host, e.g. https://agent-memories-abc123.svc.us-east1.pinecone.io
    pub index_url: String,
    pub api_key: String,
    pub namespace: Option<String>,
    /// Transport-level timeout in seconds
    pub timeout_secs: u64,
}

pub struct PineconeIndex {
    config: PineconeConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody<'a> {
    vector: &'a [f32],
    top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<VectorMatch>,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<String, VectorRecord>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    ids: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

impl PineconeIndex {
    pub fn new(config: PineconeConfig) -> Result<Self, VectorError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.index_url.trim_end_matches('/'), path)
    }

    fn namespace(&self) -> Option<&str> {
        self.config.namespace.as_deref()
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Api-Key", &self.config.api_key)
            .header("X-Pinecone-API-Version", "2024-07")
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, VectorError> {
        let response = self.authorized(builder).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(VectorError::Status { status, body });
        }

        Ok(response)
    }
}

/// Translate an exact-match filter into the service's filter language
fn filter_json(request: &QueryRequest) -> Option<Value> {
    request
        .filter
        .as_ref()
        .map(|filter| json!({ filter.field.as_str(): { "$eq": filter.equals } }))
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), VectorError> {
        let body = UpsertRequest {
            vectors: &records,
            namespace: self.namespace(),
        };

        self.send(self.client.post(self.url("/vectors/upsert")).json(&body))
            .await?;
        Ok(())
    }

    async fn query(&self, request: QueryRequest) -> Result<Vec<VectorMatch>, VectorError> {
        let body = QueryBody {
            vector: &request.vector,
            top_k: request.top_k,
            filter: filter_json(&request),
            include_metadata: request.include_metadata,
            include_values: false,
            namespace: self.namespace(),
        };

        let response = self
            .send(self.client.post(self.url("/query")).json(&body))
            .await?;

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| VectorError::InvalidResponse(e.to_string()))?;
        Ok(parsed.matches)
    }

    async fn fetch(&self, ids: &[String]) -> Result<HashMap<String, VectorRecord>, VectorError> {
        let mut params: Vec<(&str, &str)> = ids.iter().map(|id| ("ids", id.as_str())).collect();
        if let Some(namespace) = self.namespace() {
            params.push(("namespace", namespace));
        }

        let response = self
            .send(self.client.get(self.url("/vectors/fetch")).query(&params))
            .await?;

        let parsed: FetchResponse = response
            .json()
            .await
            .map_err(|e| VectorError::InvalidResponse(e.to_string()))?;
        Ok(parsed.vectors)
    }

    async fn delete_one(&self, id: &str) -> Result<(), VectorError> {
        let body = DeleteRequest {
            ids: [id],
            namespace: self.namespace(),
        };

        self.send(self.client.post(self.url("/vectors/delete")).json(&body))
            .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "pinecone"
    }
}
