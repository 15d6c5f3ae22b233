//! Core Ollama HTTP client with retry logic and connection pooling

use std::future::Future;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use tracing::{debug, warn};
use tuneforge_shared_config::OllamaConfig;

use crate::error::{OllamaError, OllamaResult};
use crate::models::{
    suggestion_schema, GenerateOptions, GenerateRequest, GenerateResponse, ListModelsResponse,
    SuggestedTrack, SuggestionBatch,
};

/// Maximum error body size to prevent memory exhaustion
const MAX_ERROR_BODY_SIZE: usize = 1000;

/// Default retry configuration
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;

/// Reasoning models wrap deliberation in think tags before the JSON payload
static THINK_TAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap_or_else(|e| panic!("{e}")));

/// Ollama API client with retry logic and connection pooling
#[derive(Debug, Clone)]
pub struct OllamaClient {
    /// HTTP client with connection pool
    http_client: Client,
    /// Configuration
    config: OllamaConfig,
    /// Number of retry attempts for transient failures
    retry_attempts: u32,
    /// Base delay for exponential backoff (milliseconds)
    retry_base_delay_ms: u64,
}

impl OllamaClient {
    /// Create a new Ollama client from configuration
    pub fn new(config: &OllamaConfig) -> OllamaResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(OllamaError::HttpError)?;

        Ok(Self {
            http_client,
            config: config.clone(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
        })
    }

    /// Create a client with custom HTTP client (for testing)
    pub fn with_client(config: &OllamaConfig, http_client: Client) -> Self {
        Self {
            http_client,
            config: config.clone(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
        }
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, attempts: u32, base_delay_ms: u64) -> Self {
        self.retry_attempts = attempts;
        self.retry_base_delay_ms = base_delay_ms;
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Execute an async operation with retry logic
    async fn with_retry<T, F, Fut>(&self, operation: F) -> OllamaResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = OllamaResult<T>>,
    {
        // Handle edge case of 0 retry attempts - run operation once
        if self.retry_attempts == 0 {
            return operation().await;
        }

        let mut last_error = None;

        for attempt in 0..self.retry_attempts {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_retryable() {
                        // Non-retryable errors return immediately
                        return Err(e);
                    } else if attempt < self.retry_attempts - 1 {
                        // Retryable error, not last attempt - wait and retry
                        let delay = self.retry_base_delay_ms * 2_u64.pow(attempt);
                        warn!(
                            attempt = attempt + 1,
                            max_attempts = self.retry_attempts,
                            delay_ms = delay,
                            error = %e,
                            "Retrying after transient error"
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        last_error = Some(e);
                    } else {
                        // Retryable error on last attempt - exit loop to return RetriesExhausted
                        last_error = Some(e);
                        break;
                    }
                }
            }
        }

        Err(OllamaError::RetriesExhausted {
            attempts: self.retry_attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        })
    }

    /// Truncate error body to prevent memory exhaustion
    /// Safely handles UTF-8 boundaries to avoid panics on multi-byte characters
    fn truncate_error_body(body: String) -> String {
        if body.len() <= MAX_ERROR_BODY_SIZE {
            return body;
        }

        let truncate_at = body
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|i| *i <= MAX_ERROR_BODY_SIZE)
            .last()
            .unwrap_or(0);

        format!("{}... (truncated)", &body[..truncate_at])
    }

    /// Strip reasoning-model think tags from a response body
    fn strip_think_tags(text: &str) -> String {
        THINK_TAGS.replace_all(text, "").trim().to_string()
    }

    /// Check if Ollama is reachable
    pub async fn health_check(&self) -> OllamaResult<bool> {
        match self.http_client.get(self.config.tags_url()).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) if e.is_connect() => {
                Err(OllamaError::ConnectionRefused(self.config.url.clone()))
            }
            Err(e) => Err(OllamaError::HttpError(e)),
        }
    }

    /// List available models
    pub async fn list_models(&self) -> OllamaResult<Vec<String>> {
        let response = self
            .http_client
            .get(self.config.tags_url())
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    OllamaError::ConnectionRefused(self.config.url.clone())
                } else {
                    OllamaError::HttpError(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = Self::truncate_error_body(response.text().await.unwrap_or_default());
            return Err(OllamaError::ApiError(format!(
                "Status {}: {}",
                status, body
            )));
        }

        let list: ListModelsResponse = response.json().await?;
        Ok(list.models.into_iter().map(|m| m.name).collect())
    }

    /// Check if a model is available
    pub async fn has_model(&self, model: &str) -> OllamaResult<bool> {
        let models = self.list_models().await?;
        let model_base = model.split(':').next().unwrap_or(model);

        Ok(models.iter().any(|m| {
            let m_base = m.split(':').next().unwrap_or(m);
            m_base == model_base
        }))
    }

    /// Internal text generation (single request, no retry)
    async fn generate_internal(
        &self,
        prompt: &str,
        format: Option<serde_json::Value>,
    ) -> OllamaResult<String> {
        let request = GenerateRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            format,
            options: Some(GenerateOptions {
                temperature: Some(self.config.temperature),
                num_ctx: Some(self.config.num_ctx),
                ..Default::default()
            }),
        };

        let response = self
            .http_client
            .post(self.config.generate_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    OllamaError::ConnectionRefused(self.config.url.clone())
                } else if e.is_timeout() {
                    OllamaError::Timeout(self.config.timeout_secs)
                } else {
                    OllamaError::HttpError(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = Self::truncate_error_body(response.text().await.unwrap_or_default());

            if body.contains("model") && body.contains("not found") {
                return Err(OllamaError::ModelNotFound(self.config.model.clone()));
            }

            return Err(OllamaError::ApiError(format!(
                "Status {}: {}",
                status, body
            )));
        }

        let generate_response: GenerateResponse = response.json().await?;
        Ok(generate_response.response)
    }

    /// Generate free-form text from a prompt with retry logic
    pub async fn generate(&self, prompt: &str) -> OllamaResult<String> {
        let prompt = prompt.to_string();

        debug!(
            model = %self.config.model,
            prompt_len = prompt.len(),
            "Generating text"
        );

        let result = self
            .with_retry(|| {
                let prompt = prompt.clone();
                async move { self.generate_internal(&prompt, None).await }
            })
            .await?;

        debug!(response_len = result.len(), "Text generated");

        Ok(result)
    }

    /// Request track suggestions constrained to the suggestion JSON schema
    ///
    /// The response body is cleaned of think tags before parsing; a body
    /// that still fails to parse is an `InvalidResponse`, which callers
    /// treat as a failed round rather than a dead collaborator.
    pub async fn suggest_tracks(&self, prompt: &str) -> OllamaResult<Vec<SuggestedTrack>> {
        let prompt = prompt.to_string();

        debug!(
            model = %self.config.model,
            prompt_len = prompt.len(),
            "Requesting track suggestions"
        );

        let raw = self
            .with_retry(|| {
                let prompt = prompt.clone();
                async move {
                    self.generate_internal(&prompt, Some(suggestion_schema()))
                        .await
                }
            })
            .await?;

        let cleaned = Self::strip_think_tags(&raw);
        let batch: SuggestionBatch = serde_json::from_str(&cleaned)
            .map_err(|e| OllamaError::InvalidResponse(format!("{}: {}", e, cleaned)))?;

        debug!(count = batch.tracks.len(), "Suggestions received");

        Ok(batch.tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Helper to create a test config pointing to the mock server
    fn test_config(server_url: &str) -> OllamaConfig {
        OllamaConfig {
            url: server_url.to_string(),
            model: "test-model".to_string(),
            timeout_secs: 30,
            num_ctx: 4096,
            temperature: 0.7,
        }
    }

    fn suggestion_body(tracks_json: &str) -> String {
        serde_json::json!({
            "response": tracks_json,
            "done": true
        })
        .to_string()
    }

    #[test]
    fn test_client_creation() {
        let config = OllamaConfig::default();
        let client = OllamaClient::new(&config);
        assert!(client.is_ok());
    }

    #[test]
    fn test_with_retry_configuration() {
        let config = OllamaConfig::default();
        let client = OllamaClient::new(&config)
            .unwrap()
            .with_retry_config(5, 1000);
        assert_eq!(client.retry_attempts, 5);
        assert_eq!(client.retry_base_delay_ms, 1000);
    }

    #[test]
    fn test_truncate_error_body() {
        let short = "short error".to_string();
        assert_eq!(OllamaClient::truncate_error_body(short.clone()), short);

        let long = "x".repeat(2000);
        let truncated = OllamaClient::truncate_error_body(long);
        assert!(truncated.len() < 1100);
        assert!(truncated.ends_with("... (truncated)"));
    }

    #[test]
    fn test_truncate_error_body_utf8_boundary() {
        // '日' is 3 bytes in UTF-8
        let utf8_str = "日".repeat(500);
        let truncated = OllamaClient::truncate_error_body(utf8_str);
        assert!(truncated.ends_with("... (truncated)"));
        let _ = truncated.chars().count();
    }

    #[test]
    fn test_strip_think_tags() {
        let raw = "<think>mulling over the seed\ntrack...</think>{\"tracks\":[]}";
        assert_eq!(OllamaClient::strip_think_tags(raw), "{\"tracks\":[]}");

        let plain = "{\"tracks\":[]}";
        assert_eq!(OllamaClient::strip_think_tags(plain), plain);
    }

    #[test]
    fn test_strip_think_tags_multiple_blocks() {
        let raw = "<think>a</think>{\"tracks\":[]}<think>b</think>";
        assert_eq!(OllamaClient::strip_think_tags(raw), "{\"tracks\":[]}");
    }

    #[tokio::test]
    async fn test_suggest_tracks_parses_schema_response() {
        let server = MockServer::start().await;

        let tracks = r#"{"tracks":[{"title":"Glue","artist":"Bicep","album":"Bicep"}]}"#;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({"model": "test-model"})))
            .respond_with(ResponseTemplate::new(200).set_body_string(suggestion_body(tracks)))
            .mount(&server)
            .await;

        let config = test_config(&server.uri());
        let client = OllamaClient::new(&config).unwrap();

        let suggestions = client.suggest_tracks("similar to X").await.unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].title, "Glue");
        assert_eq!(suggestions[0].album.as_deref(), Some("Bicep"));
    }

    #[tokio::test]
    async fn test_suggest_tracks_strips_think_tags() {
        let server = MockServer::start().await;

        let tracks =
            "<think>the seed is ambient so...</think>{\"tracks\":[{\"title\":\"rausch\",\"artist\":\"GAS\"}]}";
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string(suggestion_body(tracks)))
            .mount(&server)
            .await;

        let config = test_config(&server.uri());
        let client = OllamaClient::new(&config).unwrap();

        let suggestions = client.suggest_tracks("similar to X").await.unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].artist, "GAS");
    }

    #[tokio::test]
    async fn test_suggest_tracks_invalid_json_is_invalid_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(suggestion_body("not json at all")),
            )
            .mount(&server)
            .await;

        let config = test_config(&server.uri());
        let client = OllamaClient::new(&config).unwrap();

        let result = client.suggest_tracks("similar to X").await;
        match result {
            Err(OllamaError::InvalidResponse(_)) => {}
            other => panic!("Expected InvalidResponse, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_suggest_tracks_model_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(404).set_body_string("model 'test-model' not found"),
            )
            .mount(&server)
            .await;

        let config = test_config(&server.uri());
        let client = OllamaClient::new(&config).unwrap();

        let result = client.suggest_tracks("similar to X").await;
        match result {
            Err(OllamaError::ModelNotFound(_)) => {}
            other => panic!("Expected ModelNotFound, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_retries_on_server_error_then_exhausts() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let config = test_config(&server.uri());
        let client = OllamaClient::new(&config).unwrap().with_retry_config(2, 1);

        // 500s map to ApiError, which is not retryable, so the first
        // attempt's error comes straight back
        let result = client.generate("hello").await;
        match result {
            Err(OllamaError::ApiError(msg)) => assert!(msg.contains("500")),
            other => panic!("Expected ApiError, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_models() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [
                    {"name": "mistral:latest", "size": 1},
                    {"name": "qwen3:8b", "size": 2}
                ]
            })))
            .mount(&server)
            .await;

        let config = test_config(&server.uri());
        let client = OllamaClient::new(&config).unwrap();

        let models = client.list_models().await.unwrap();
        assert_eq!(models, vec!["mistral:latest", "qwen3:8b"]);
        assert!(client.has_model("mistral").await.unwrap());
        assert!(!client.has_model("llama2").await.unwrap());
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"models": []})))
            .mount(&server)
            .await;

        let config = test_config(&server.uri());
        let client = OllamaClient::new(&config).unwrap();

        assert!(client.health_check().await.unwrap());
    }
}
