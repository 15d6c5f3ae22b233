//! Mock Ollama server for testing playlist suggestion
//!
//! Provides a [`MockOllamaServer`] that simulates Ollama API endpoints
//! for testing suggestion-driven functionality without a real Ollama
//! instance.

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock Ollama server for testing playlist suggestion
///
/// This struct wraps a [`wiremock::MockServer`] and provides convenience methods
/// for setting up common Ollama API responses.
///
/// # Example
///
/// ```rust,ignore
/// use tuneforge_test_utils::MockOllamaServer;
///
/// #[tokio::test]
/// async fn test_suggestions() {
///     let server = MockOllamaServer::start().await;
///     server
///         .mock_suggestions(&[("Teardrop", "Massive Attack", Some("Mezzanine"))])
///         .await;
///
///     // Configure your Ollama client with server.url()
///     let url = server.url();
///     // ... run your test
/// }
/// ```
pub struct MockOllamaServer {
    server: MockServer,
}

impl MockOllamaServer {
    /// Start a new mock Ollama server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Mount a mock for a successful suggestion batch
    ///
    /// Each entry is (title, artist, album).
    pub async fn mock_suggestions(&self, tracks: &[(&str, &str, Option<&str>)]) {
        let track_list: Vec<serde_json::Value> = tracks
            .iter()
            .map(|(title, artist, album)| {
                let mut entry = json!({"title": title, "artist": artist});
                if let Some(album) = album {
                    entry["album"] = json!(album);
                }
                entry
            })
            .collect();

        let body = serde_json::to_string(&json!({"tracks": track_list}))
            .unwrap_or_else(|_| "{\"tracks\":[]}".to_string());

        self.mock_generate_success(&body).await;
    }

    /// Mount a scoped mock for one suggestion batch, consumed after a single call
    ///
    /// Lets tests drive different responses per round: mount one per round
    /// with `expect(1)` so rounds consume them in order.
    pub async fn mock_suggestions_once(&self, tracks: &[(&str, &str, Option<&str>)]) {
        let track_list: Vec<serde_json::Value> = tracks
            .iter()
            .map(|(title, artist, album)| {
                let mut entry = json!({"title": title, "artist": artist});
                if let Some(album) = album {
                    entry["album"] = json!(album);
                }
                entry
            })
            .collect();

        let body = serde_json::to_string(&json!({"tracks": track_list}))
            .unwrap_or_else(|_| "{\"tracks\":[]}".to_string());

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "mistral",
                "response": body,
                "done": true
            })))
            .expect(1)
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for successful text generation with a raw response body
    pub async fn mock_generate_success(&self, response_text: &str) {
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "mistral",
                "response": response_text,
                "done": true
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock whose response wraps the suggestion JSON in think tags
    pub async fn mock_suggestions_with_think_tags(
        &self,
        thought: &str,
        tracks: &[(&str, &str, Option<&str>)],
    ) {
        let track_list: Vec<serde_json::Value> = tracks
            .iter()
            .map(|(title, artist, album)| {
                let mut entry = json!({"title": title, "artist": artist});
                if let Some(album) = album {
                    entry["album"] = json!(album);
                }
                entry
            })
            .collect();

        let body = format!(
            "<think>{}</think>{}",
            thought,
            serde_json::to_string(&json!({"tracks": track_list}))
                .unwrap_or_else(|_| "{\"tracks\":[]}".to_string())
        );

        self.mock_generate_success(&body).await;
    }

    /// Mount a mock for text generation failure
    pub async fn mock_generate_failure(&self, status_code: u16, error_message: &str) {
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(status_code).set_body_json(json!({
                    "error": error_message
                })),
            )
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for model not found error
    pub async fn mock_model_not_found(&self, model: &str) {
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": format!("model '{}' not found, try pulling it first", model)
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for the /api/tags endpoint (list models)
    pub async fn mock_list_models(&self, models: &[&str]) {
        let model_list: Vec<serde_json::Value> = models
            .iter()
            .map(|name| {
                json!({
                    "name": name,
                    "modified_at": "2024-01-01T00:00:00Z",
                    "size": 4_000_000_000_i64
                })
            })
            .collect();

        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": model_list
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for connection timeout (delayed response)
    pub async fn mock_timeout(&self, delay_ms: u64) {
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(std::time::Duration::from_millis(delay_ms))
                    .set_body_json(json!({"error": "timeout"})),
            )
            .mount(&self.server)
            .await;
    }

    /// Number of requests the server has received so far
    pub async fn request_count(&self) -> usize {
        self.server.received_requests().await.unwrap_or_default().len()
    }

    /// Get reference to the underlying mock server for custom mock setups
    pub fn inner(&self) -> &MockServer {
        &self.server
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_ollama_server_starts() {
        let server = MockOllamaServer::start().await;
        assert!(!server.url().is_empty());
        assert!(server.url().starts_with("http://"));
    }

    #[tokio::test]
    async fn test_mock_ollama_suggestions() {
        let server = MockOllamaServer::start().await;
        server
            .mock_suggestions(&[("Teardrop", "Massive Attack", Some("Mezzanine"))])
            .await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("{}/api/generate", server.url()))
            .json(&serde_json::json!({"model": "mistral", "prompt": "suggest"}))
            .send()
            .await
            .unwrap();

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.unwrap();
        let inner: serde_json::Value =
            serde_json::from_str(body["response"].as_str().unwrap()).unwrap();
        assert_eq!(inner["tracks"][0]["artist"], "Massive Attack");
    }

    #[tokio::test]
    async fn test_mock_ollama_generate_failure() {
        let server = MockOllamaServer::start().await;
        server.mock_generate_failure(500, "Internal error").await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("{}/api/generate", server.url()))
            .json(&serde_json::json!({"model": "mistral", "prompt": "suggest"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 500);
    }

    #[tokio::test]
    async fn test_mock_ollama_list_models() {
        let server = MockOllamaServer::start().await;
        server.mock_list_models(&["mistral", "llama2"]).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("{}/api/tags", server.url()))
            .send()
            .await
            .unwrap();

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.unwrap();
        let models = body["models"].as_array().unwrap();
        assert_eq!(models.len(), 2);
    }
}
