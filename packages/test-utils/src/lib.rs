//! Shared test utilities for TuneForge workspace
//!
//! This crate provides mock implementations of external services for testing
//! without network dependencies. These mocks can be used across the worker
//! test suites.
//!
//! # Mock Services
//!
//! - [`MockOllamaServer`] - Mock Ollama LLM server for suggestion tests
//! - [`MockSubsonicServer`] - Mock Navidrome server for search and playlist tests
//!
//! # Example
//!
//! ```rust,ignore
//! use tuneforge_test_utils::{MockOllamaServer, MockSubsonicServer};
//!
//! #[tokio::test]
//! async fn test_with_mocks() {
//!     let ollama = MockOllamaServer::start().await;
//!     ollama
//!         .mock_suggestions(&[("Teardrop", "Massive Attack", None)])
//!         .await;
//!
//!     // Use ollama.url() to configure your client
//! }
//! ```

mod ollama;
mod subsonic;

pub use ollama::MockOllamaServer;
pub use subsonic::MockSubsonicServer;
