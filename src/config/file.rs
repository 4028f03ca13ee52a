//! Deployment overrides loaded from TOML files
//!
//! Every section and field is optional; anything present replaces the value
//! taken from the environment. Secrets are never written into the file, only
//! the name of the environment variable holding them.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root of an override file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub rate_limit: Option<RateLimitSection>,

    #[serde(default)]
    pub memory: Option<MemorySection>,

    #[serde(default)]
    pub vector: Option<VectorSection>,

    #[serde(default)]
    pub embedding: Option<EmbeddingSection>,
}

impl FileConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig = toml::from_str(content)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitSection {
    /// Requests allowed per window and identity
    #[serde(default)]
    pub max_requests: Option<u32>,

    #[serde(default)]
    pub window_ms: Option<u64>,

    /// How often expired entries are swept
    #[serde(default)]
    pub sweep_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemorySection {
    /// Bound on every vector service / embedding call
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub max_text_len: Option<usize>,

    #[serde(default)]
    pub default_top_k: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorSection {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub namespace: Option<String>,

    /// Environment variable containing the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingSection {
    /// Provider name: "hash", "ollama", "openai"
    #[serde(default)]
    pub provider: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub dimension: Option<usize>,

    #[serde(default)]
    pub api_key_env: Option<String>,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
