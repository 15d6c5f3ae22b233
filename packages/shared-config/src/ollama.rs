//! Ollama AI configuration types

use crate::{get_env_or_default, parse_env, ConfigResult};

/// Ollama AI service configuration
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Ollama server URL
    pub url: String,

    /// LLM model for playlist suggestion (e.g., mistral, qwen3)
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Context window size passed as num_ctx
    pub num_ctx: u32,

    /// Temperature for generation (0.0 - 1.0)
    pub temperature: f32,
}

impl OllamaConfig {
    /// Load Ollama configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            url: get_env_or_default("OLLAMA_URL", "http://localhost:11434"),
            model: get_env_or_default("OLLAMA_MODEL", "mistral"),
            timeout_secs: parse_env("OLLAMA_TIMEOUT", 120)?,
            num_ctx: parse_env("OLLAMA_NUM_CTX", 8192)?,
            temperature: parse_env("OLLAMA_TEMPERATURE", 0.7)?,
        })
    }

    /// Create a configuration with a custom URL (useful for testing)
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            model: "mistral".to_string(),
            timeout_secs: 120,
            num_ctx: 8192,
            temperature: 0.7,
        }
    }

    /// Get the full URL for the generation endpoint
    pub fn generate_url(&self) -> String {
        format!("{}/api/generate", self.url.trim_end_matches('/'))
    }

    /// Get the full URL for the model listing endpoint
    pub fn tags_url(&self) -> String {
        format!("{}/api/tags", self.url.trim_end_matches('/'))
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
            model: "mistral".to_string(),
            timeout_secs: 120,
            num_ctx: 8192,
            temperature: 0.7,
        }
    }
}
