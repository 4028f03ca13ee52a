//! OpenAI-compatible embedding provider
//!
//! Works with any API that implements the OpenAI embeddings format:
//! - OpenAI (api.openai.com)
//! - vLLM, LM Studio, LocalAI (local servers)
//! - Together AI, Fireworks AI
//!
//! # Configuration
//!
//! ```toml
//! [embedding]
//! provider = "openai"
//! url = "https://api.openai.com/v1"
//! model = "text-embedding-3-small"
//! dimension = 384
//! api_key_env = "OPENAI_API_KEY"
//! ```

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{check_dimension, ProviderError};

pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Native vector length of the OpenAI embedding models
pub fn model_dimension(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

/// The `dimensions` parameter, sent only to models that can shorten their output
fn requested_dimensions(model: &str, dimension: usize) -> Option<usize> {
    let shortens = model.starts_with("text-embedding-3-");
    (shortens && model_dimension(model) != Some(dimension)).then_some(dimension)
}

/// Embedding request
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

/// Embedding response
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Error response from API
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone)]
pub struct OpenAICompatConfig {
    /// Base URL for the API (e.g., https://api.openai.com/v1)
    pub base_url: String,
    /// API key (optional for local servers)
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl OpenAICompatConfig {
    /// Create config for OpenAI
    pub fn openai(api_key: impl Into<String>, dimension: usize) -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: Some(api_key.into()),
            model: DEFAULT_MODEL.to_string(),
            dimension,
            timeout_secs: 30,
        }
    }

    /// Create config for a local server (vLLM, LM Studio, etc.)
    pub fn local(base_url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            dimension,
            timeout_secs: 60,
        }
    }
}

/// OpenAI-compatible embeddings client
pub struct OpenAICompatEmbedder {
    config: OpenAICompatConfig,
    client: Client,
}

impl OpenAICompatEmbedder {
    pub fn new(config: OpenAICompatConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyInput);
        }

        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));

        let request = EmbeddingRequest {
            model: &self.config.model,
            input: text,
            dimensions: requested_dimensions(&self.config.model, self.config.dimension),
        };

        let mut req_builder = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder.json(&request).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(error_resp) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(ProviderError::InvalidResponse(format!(
                    "API error: {}",
                    error_resp.error.message
                )));
            }
            return Err(ProviderError::InvalidResponse(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        parse_embedding(&body, self.config.dimension)
    }
}

fn parse_embedding(body: &str, dimension: usize) -> Result<Vec<f32>, ProviderError> {
    let response: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

    let data = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse("No embedding in response".to_string()))?;

    check_dimension(data.embedding, dimension)
}
