//! Text embedding providers
//!
//! `Embedder::from_config` picks one implementation at startup:
//! - `hash`   - deterministic token hashing, no network (see [`hashed`])
//! - `ollama` - local Ollama `/api/embeddings`
//! - `openai` - any OpenAI-compatible `/embeddings` endpoint

mod hashed;
mod ollama;
mod openai_compat;

pub use hashed::HashEmbedder;
pub use ollama::OllamaEmbedder;
pub use openai_compat::{OpenAICompatConfig, OpenAICompatEmbedder};

use thiserror::Error;

use crate::config::EmbeddingSettings;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Empty input provided")]
    EmptyInput,
}

/// Vector length `provider` returns for `model` when no dimension is configured
pub fn default_dimension(provider: &str, model: Option<&str>) -> Option<usize> {
    match provider.to_lowercase().as_str() {
        "hash" => Some(hashed::DEFAULT_DIMENSION),
        "ollama" => ollama::model_dimension(model.unwrap_or(ollama::DEFAULT_MODEL)),
        "openai" => openai_compat::model_dimension(model.unwrap_or(openai_compat::DEFAULT_MODEL)),
        _ => None,
    }
}

pub enum Embedder {
    Hash(HashEmbedder),
    Ollama(OllamaEmbedder),
    OpenAICompat(OpenAICompatEmbedder),
}

impl Embedder {
    pub fn from_config(settings: &EmbeddingSettings) -> Result<Self, ProviderError> {
        let dimension = || {
            settings.resolved_dimension().ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "embedding dimension for model '{}'",
                    settings.model.as_deref().unwrap_or(&settings.provider)
                ))
            })
        };

        match settings.provider.to_lowercase().as_str() {
            "hash" => Ok(Embedder::Hash(HashEmbedder::new(dimension()?))),
            "ollama" => {
                let url = settings
                    .url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".into());
                let model = settings
                    .model
                    .clone()
                    .unwrap_or_else(|| ollama::DEFAULT_MODEL.into());
                Ok(Embedder::Ollama(OllamaEmbedder::new(url, model, dimension()?)))
            }
            "openai" => {
                let mut config = match (&settings.api_key, &settings.url) {
                    (Some(api_key), _) => OpenAICompatConfig::openai(api_key.clone(), dimension()?),
                    // Local OpenAI-compatible servers usually run without a key
                    (None, Some(url)) => {
                        OpenAICompatConfig::local(url.clone(), openai_compat::DEFAULT_MODEL, dimension()?)
                    }
                    (None, None) => return Err(ProviderError::NotConfigured("openai".into())),
                };
                if let Some(url) = &settings.url {
                    config.base_url = url.clone();
                }
                if let Some(model) = &settings.model {
                    config.model = model.clone();
                }
                Ok(Embedder::OpenAICompat(OpenAICompatEmbedder::new(config)?))
            }
            _ => Err(ProviderError::UnknownProvider(settings.provider.clone())),
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        match self {
            Embedder::Hash(p) => Ok(p.embed(text)),
            Embedder::Ollama(p) => p.embed(text).await,
            Embedder::OpenAICompat(p) => p.embed(text).await,
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            Embedder::Hash(p) => p.dimension(),
            Embedder::Ollama(p) => p.dimension(),
            Embedder::OpenAICompat(p) => p.dimension(),
        }
    }

    /// False for the hashed fallback, whose scores carry no meaning
    pub fn is_semantic(&self) -> bool {
        !matches!(self, Embedder::Hash(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Embedder::Hash(_) => "hash",
            Embedder::Ollama(_) => "ollama",
            Embedder::OpenAICompat(_) => "openai",
        }
    }
}

/// Reject vectors whose length does not match the configured index dimension
pub(crate) fn check_dimension(vector: Vec<f32>, expected: usize) -> Result<Vec<f32>, ProviderError> {
    if vector.len() != expected {
        return Err(ProviderError::InvalidResponse(format!(
            "expected {} dimensions, got {}",
            expected,
            vector.len()
        )));
    }
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(provider: &str) -> EmbeddingSettings {
        EmbeddingSettings {
            provider: provider.into(),
            ..EmbeddingSettings::default()
        }
    }

    #[test]
    fn test_from_config() {
        let hash = Embedder::from_config(&settings("hash")).unwrap();
        assert_eq!(hash.name(), "hash");
        assert!(!hash.is_semantic());
        assert_eq!(hash.dimension(), 384);

        let ollama = Embedder::from_config(&settings("Ollama")).unwrap();
        assert_eq!(ollama.name(), "ollama");
        assert!(ollama.is_semantic());
        assert_eq!(ollama.dimension(), 768);
    }

    #[test]
    fn test_dimension_follows_model_unless_configured() {
        let mut openai = settings("openai");
        openai.api_key = Some("sk-test".into());
        assert_eq!(Embedder::from_config(&openai).unwrap().dimension(), 1536);

        openai.dimension = Some(384);
        assert_eq!(Embedder::from_config(&openai).unwrap().dimension(), 384);

        let mut custom = settings("ollama");
        custom.model = Some("my-finetuned-embedder".into());
        assert!(matches!(
            Embedder::from_config(&custom),
            Err(ProviderError::NotConfigured(_))
        ));

        custom.dimension = Some(512);
        assert_eq!(Embedder::from_config(&custom).unwrap().dimension(), 512);
    }

    #[test]
    fn test_default_dimension() {
        assert_eq!(default_dimension("hash", None), Some(384));
        assert_eq!(default_dimension("ollama", None), Some(768));
        assert_eq!(default_dimension("openai", Some("text-embedding-3-large")), Some(3072));
        assert_eq!(default_dimension("word2vec", None), None);
    }

    #[test]
    fn test_openai_requires_key() {
        let result = Embedder::from_config(&settings("openai"));
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));

        let mut with_key = settings("openai");
        with_key.api_key = Some("sk-test".into());
        let embedder = Embedder::from_config(&with_key).unwrap();
        assert_eq!(embedder.name(), "openai");

        let mut local = settings("openai");
        local.url = Some("http://localhost:8000/v1".into());
        assert!(Embedder::from_config(&local).is_ok());
    }

    #[test]
    fn test_unknown_provider() {
        let result = Embedder::from_config(&settings("word2vec"));
        assert!(matches!(result, Err(ProviderError::UnknownProvider(_))));
    }

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(vec![0.0; 4], 4).is_ok());
        assert!(matches!(
            check_dimension(vec![0.0; 3], 4),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_hash_embedder_through_enum() {
        let embedder = Embedder::from_config(&settings("hash")).unwrap();
        let a = embedder.embed("hello world").await.unwrap();
        let b = embedder.embed("hello world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
    }
}
