//! Ollama API client for TuneForge playlist suggestion
//!
//! This crate provides a client for the Ollama generate API, specialized for
//! requesting structured track suggestions during playlist generation.
//!
//! # Requirements
//!
//! - Ollama must be running and accessible at the configured URL
//! - The suggestion model must be pulled before use:
//!   ```bash
//!   ollama pull mistral
//!   ```
//!
//! # Thread Safety
//!
//! `OllamaClient` is `Clone + Send + Sync` and can be safely shared
//! across threads. It uses a shared HTTP client connection pool.
//!
//! # Example
//!
//! ```no_run
//! use tuneforge_ollama_client::OllamaClient;
//! use tuneforge_shared_config::OllamaConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OllamaConfig::default();
//! let client = OllamaClient::new(&config)?;
//!
//! // Structured suggestions for the feedback loop
//! let tracks = client
//!     .suggest_tracks("Suggest 5 songs similar to 'Teardrop' by Massive Attack")
//!     .await?;
//! for track in tracks {
//!     println!("{} - {}", track.artist, track.title);
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod models;

pub use client::OllamaClient;
pub use error::{OllamaError, OllamaResult};
pub use models::{
    suggestion_schema, GenerateOptions, GenerateRequest, GenerateResponse, ListModelsResponse,
    ModelInfo, SuggestedTrack, SuggestionBatch,
};
