//! Application configuration
//!
//! Values come from the environment first; an optional TOML file named by
//! `AGENT_MEMORY_CONFIG` overrides them. Everything is validated once at
//! startup so a misconfigured deployment never starts serving.

pub mod file;

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use file::{ConfigError, FileConfig};

use crate::core::{MemoryConfig, RateLimitConfig};
use crate::providers;

/// Longest accepted rate limit window (30 days)
pub const MAX_WINDOW_MS: u64 = 30 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub vector: VectorSettings,
    pub embedding: EmbeddingSettings,
    pub rate_limit: RateLimitSettings,
    pub memory: MemorySettings,
}

/// Managed vector service connection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorSettings {
    /// Index host URL. When absent the process-local index is used.
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// "hash", "ollama" or "openai"
    pub provider: String,
    pub url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    /// Expected vector length; `None` uses the model's known output size
    pub dimension: Option<usize>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "hash".into(),
            url: None,
            model: None,
            api_key: None,
            dimension: None,
        }
    }
}

impl EmbeddingSettings {
    pub fn resolved_dimension(&self) -> Option<usize> {
        self.dimension
            .or_else(|| providers::default_dimension(&self.provider, self.model.as_deref()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window_ms: u64,
    pub sweep_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_ms: 60_000,
            sweep_secs: 300,
        }
    }
}

impl RateLimitSettings {
    pub fn limiter_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.max_requests,
            window: i64::try_from(self.window_ms.min(MAX_WINDOW_MS))
                .map(chrono::Duration::milliseconds)
                .unwrap_or_else(|_| RateLimitConfig::default().window),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySettings {
    pub timeout_secs: u64,
    pub max_text_len: usize,
    pub default_top_k: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_text_len: 1000,
            default_top_k: 20,
        }
    }
}

impl MemorySettings {
    pub fn memory_config(&self) -> MemoryConfig {
        MemoryConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            max_text_len: self.max_text_len,
            default_top_k: self.default_top_k,
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Load from the environment, apply the optional TOML file and validate
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_env();

        if let Some(path) = env::var("AGENT_MEMORY_CONFIG").ok().map(PathBuf::from) {
            tracing::info!("Loading configuration overrides from {}", path.display());
            config.apply(FileConfig::from_file(&path)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup (the environment in production)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let rate_defaults = RateLimitSettings::default();
        let memory_defaults = MemorySettings::default();

        Self {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".into()),
            port: parse_var(&lookup, "PORT").unwrap_or(3000),
            vector: VectorSettings {
                url: lookup("VECTOR_INDEX_URL").filter(|v| !v.is_empty()),
                api_key: lookup("VECTOR_API_KEY").filter(|v| !v.is_empty()),
                namespace: lookup("VECTOR_NAMESPACE").filter(|v| !v.is_empty()),
            },
            embedding: EmbeddingSettings {
                provider: lookup("EMBEDDING_PROVIDER").unwrap_or_else(|| "hash".into()),
                url: lookup("EMBEDDING_URL"),
                model: lookup("EMBEDDING_MODEL"),
                api_key: lookup("OPENAI_API_KEY"),
                dimension: parse_var(&lookup, "EMBEDDING_DIMENSION"),
            },
            rate_limit: RateLimitSettings {
                max_requests: parse_var(&lookup, "RATE_LIMIT_MAX_REQUESTS")
                    .unwrap_or(rate_defaults.max_requests),
                window_ms: parse_var(&lookup, "RATE_LIMIT_WINDOW_MS").unwrap_or(rate_defaults.window_ms),
                sweep_secs: parse_var(&lookup, "RATE_LIMIT_SWEEP_SECS").unwrap_or(rate_defaults.sweep_secs),
            },
            memory: MemorySettings {
                timeout_secs: parse_var(&lookup, "MEMORY_TIMEOUT_SECS").unwrap_or(memory_defaults.timeout_secs),
                max_text_len: parse_var(&lookup, "MEMORY_MAX_TEXT_LEN").unwrap_or(memory_defaults.max_text_len),
                default_top_k: parse_var(&lookup, "MEMORY_DEFAULT_TOP_K")
                    .unwrap_or(memory_defaults.default_top_k),
            },
        }
    }

    /// Overlay values present in a config file
    pub fn apply(&mut self, file: FileConfig) {
        if let Some(rate) = file.rate_limit {
            if let Some(v) = rate.max_requests {
                self.rate_limit.max_requests = v;
            }
            if let Some(v) = rate.window_ms {
                self.rate_limit.window_ms = v;
            }
            if let Some(v) = rate.sweep_secs {
                self.rate_limit.sweep_secs = v;
            }
        }

        if let Some(memory) = file.memory {
            if let Some(v) = memory.timeout_secs {
                self.memory.timeout_secs = v;
            }
            if let Some(v) = memory.max_text_len {
                self.memory.max_text_len = v;
            }
            if let Some(v) = memory.default_top_k {
                self.memory.default_top_k = v;
            }
        }

        if let Some(vector) = file.vector {
            if vector.url.is_some() {
                self.vector.url = vector.url;
            }
            if vector.namespace.is_some() {
                self.vector.namespace = vector.namespace;
            }
            // The API key itself stays in the environment; the file only names the variable
            if let Some(key) = vector.api_key_env.and_then(|name| env::var(name).ok()) {
                self.vector.api_key = Some(key);
            }
        }

        if let Some(embedding) = file.embedding {
            if let Some(v) = embedding.provider {
                self.embedding.provider = v;
            }
            if embedding.url.is_some() {
                self.embedding.url = embedding.url;
            }
            if embedding.model.is_some() {
                self.embedding.model = embedding.model;
            }
            if embedding.dimension.is_some() {
                self.embedding.dimension = embedding.dimension;
            }
            if let Some(key) = embedding.api_key_env.and_then(|name| env::var(name).ok()) {
                self.embedding.api_key = Some(key);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::Validation(
                "rate_limit.max_requests must be at least 1".into(),
            ));
        }
        if self.rate_limit.window_ms == 0 || self.rate_limit.window_ms > MAX_WINDOW_MS {
            return Err(ConfigError::Validation(format!(
                "rate_limit.window_ms must be between 1 and {}",
                MAX_WINDOW_MS
            )));
        }
        if self.memory.max_text_len == 0 {
            return Err(ConfigError::Validation(
                "memory.max_text_len must be at least 1".into(),
            ));
        }
        if self.memory.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "memory.timeout_secs must be at least 1".into(),
            ));
        }
        if self.embedding.dimension == Some(0) {
            return Err(ConfigError::Validation(
                "embedding.dimension must be at least 1".into(),
            ));
        }

        match self.embedding.provider.to_lowercase().as_str() {
            "hash" | "ollama" => {}
            "openai" => {
                if self.embedding.api_key.is_none() && self.embedding.url.is_none() {
                    return Err(ConfigError::Validation(
                        "embedding provider 'openai' requires OPENAI_API_KEY or EMBEDDING_URL".into(),
                    ));
                }
            }
            other => {
                return Err(ConfigError::Validation(format!(
                    "unknown embedding provider '{}'",
                    other
                )))
            }
        }

        if self.embedding.resolved_dimension().is_none() {
            return Err(ConfigError::Validation(format!(
                "EMBEDDING_DIMENSION must be set for embedding model '{}'",
                self.embedding.model.as_deref().unwrap_or_default()
            )));
        }

        if self.vector.url.is_some() && self.vector.api_key.is_none() {
            return Err(ConfigError::Validation(
                "VECTOR_INDEX_URL is set but VECTOR_API_KEY is missing".into(),
            ));
        }

        Ok(())
    }
}
