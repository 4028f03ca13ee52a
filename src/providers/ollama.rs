//! Ollama embedding provider

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{check_dimension, ProviderError};

pub const DEFAULT_MODEL: &str = "nomic-embed-text";

/// Native vector length of the common Ollama embedding models
pub fn model_dimension(model: &str) -> Option<usize> {
    // "nomic-embed-text:latest" and "nomic-embed-text" are the same model
    let name = model.split(':').next().unwrap_or(model);
    match name {
        "nomic-embed-text" => Some(768),
        "mxbai-embed-large" | "snowflake-arctic-embed" => Some(1024),
        "all-minilm" => Some(384),
        _ => None,
    }
}

pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(base_url: String, model: String, dimension: usize) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyInput);
        }

        let request = OllamaEmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::InvalidResponse(format!(
                "{}: {}",
                status, body
            )));
        }

        let ollama_response: OllamaEmbeddingResponse = response.json().await?;
        check_dimension(ollama_response.embedding, self.dimension)
    }
}
