//! Request and response types for the Ollama generate API

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Request for text generation
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    /// Model to use
    pub model: String,
    /// Prompt text
    pub prompt: String,
    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
    /// Structured-output constraint: a JSON schema the response must satisfy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
    /// Generation options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerateOptions>,
}

/// Options for text generation
#[derive(Debug, Clone, Serialize, Default)]
pub struct GenerateOptions {
    /// Temperature (0.0 - 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Context window size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    /// Top-p sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

/// Response from text generation (non-streaming)
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    /// Generated text
    pub response: String,
    /// Whether generation is complete
    #[serde(default)]
    pub done: bool,
    /// Total duration in nanoseconds
    #[serde(default)]
    pub total_duration: Option<u64>,
    /// Tokens generated
    #[serde(default)]
    pub eval_count: Option<u32>,
}

/// Response from listing models
#[derive(Debug, Clone, Deserialize)]
pub struct ListModelsResponse {
    /// Available models
    pub models: Vec<ModelInfo>,
}

/// Information about a model
#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    /// Model name
    pub name: String,
    /// Model size in bytes
    #[serde(default)]
    pub size: u64,
    /// Model digest
    #[serde(default)]
    pub digest: Option<String>,
}

/// A single track suggested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuggestedTrack {
    /// Track title
    pub title: String,
    /// Artist name
    pub artist: String,
    /// Album name (models often omit this)
    #[serde(default)]
    pub album: Option<String>,
}

/// The structured suggestion payload the model is constrained to produce
#[derive(Debug, Clone, Deserialize)]
pub struct SuggestionBatch {
    /// Suggested tracks
    pub tracks: Vec<SuggestedTrack>,
}

/// JSON schema sent as the `format` constraint for suggestion requests
///
/// Ollama's structured-output mode guarantees the response body parses as
/// this shape, which makes the downstream parse failure path rare but still
/// handled (older servers ignore `format`).
pub fn suggestion_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "tracks": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "artist": { "type": "string" },
                        "album": { "type": "string" }
                    },
                    "required": ["title", "artist"]
                }
            }
        },
        "required": ["tracks"]
    })
}
