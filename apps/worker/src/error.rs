//! Error handling for the TuneForge worker
//!
//! This module provides a unified error type hierarchy using thiserror for
//! the scanner, the analysis queue, feature extraction, and playlist
//! generation. `is_retryable()` drives the queue's retry policy.

use thiserror::Error;

/// Main worker error type
#[derive(Error, Debug)]
pub enum WorkerError {
    // ========== File & Decode Errors ==========
    /// File could not be opened, read, or stat'd
    #[error("file access failed for '{path}': {reason}")]
    FileAccess { path: String, reason: String },

    /// Audio decoding failed (corrupt or unsupported stream)
    #[error("audio decoding failed for '{path}': {reason}")]
    Decode { path: String, reason: String },

    /// Per-file analysis exceeded its time budget
    #[error("analysis of '{path}' timed out after {seconds} seconds")]
    Timeout { path: String, seconds: u64 },

    /// Music library path not found or inaccessible
    #[error("music library path not found: {0}")]
    LibraryNotFound(String),

    // ========== Queue Errors ==========
    /// Queue entry stuck in processing beyond the stall threshold
    #[error("queue entry stalled: {0}")]
    Stall(String),

    /// Entry failed after maximum retry attempts
    #[error("analysis failed after {attempts} attempts: {reason}")]
    MaxAttemptsExceeded { attempts: u32, reason: String },

    // ========== Database Errors ==========
    /// Database query failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    // ========== Generation Errors ==========
    /// External collaborator (Ollama, Subsonic) failed
    #[error("collaborator error from {service}: {message}")]
    Collaborator { service: String, message: String },

    /// Seed track missing or lacks an analyzed feature vector
    #[error("seed track not usable: {0}")]
    SeedUnavailable(String),

    /// Export requested for a playlist with no accepted tracks
    #[error("playlist is empty, nothing to export")]
    EmptyPlaylist,

    /// Serialization of an export payload failed
    #[error("export serialization failed: {0}")]
    ExportSerialization(#[from] serde_json::Error),

    // ========== Configuration Errors ==========
    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    // ========== Internal Errors ==========
    /// Internal worker error (catch-all for unexpected errors)
    #[error("internal worker error: {0}")]
    Internal(String),
}

impl WorkerError {
    /// Check if this error is retryable
    ///
    /// Timeouts and transient infrastructure failures earn another attempt;
    /// decode failures and permission errors are deterministic and don't.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Database(_) | Self::Stall(_) => true,
            Self::Collaborator { message, .. } => {
                // Model/auth rejections repeat identically; network blips don't
                !message.contains("not found") && !message.contains("authentication")
            }
            _ => false,
        }
    }

    /// Get a severity level for logging
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Configuration(_) | Self::LibraryNotFound(_) | Self::MaxAttemptsExceeded { .. } => {
                ErrorSeverity::Critical
            }
            Self::Database(_) | Self::Internal(_) => ErrorSeverity::Error,
            Self::Timeout { .. } | Self::Stall(_) | Self::Collaborator { .. } => {
                ErrorSeverity::Warning
            }
            _ => ErrorSeverity::Info,
        }
    }

    /// Get the pipeline stage this error is related to, if applicable
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            Self::LibraryNotFound(_) | Self::FileAccess { .. } => Some("scan"),
            Self::Decode { .. } | Self::Timeout { .. } => Some("analysis"),
            Self::Stall(_) | Self::MaxAttemptsExceeded { .. } => Some("queue"),
            Self::Collaborator { .. } | Self::SeedUnavailable(_) => Some("generation"),
            Self::EmptyPlaylist | Self::ExportSerialization(_) => Some("export"),
            _ => None,
        }
    }

    /// Log the error with appropriate severity
    pub fn log(&self) {
        let stage = self.stage().unwrap_or("general");
        match self.severity() {
            ErrorSeverity::Critical => {
                tracing::error!(
                    error = %self,
                    stage = stage,
                    retryable = self.is_retryable(),
                    "Critical worker error"
                );
            }
            ErrorSeverity::Error => {
                tracing::error!(
                    error = %self,
                    stage = stage,
                    retryable = self.is_retryable(),
                    "Worker error"
                );
            }
            ErrorSeverity::Warning => {
                tracing::warn!(
                    error = %self,
                    stage = stage,
                    retryable = self.is_retryable(),
                    "Worker warning"
                );
            }
            ErrorSeverity::Info => {
                tracing::info!(
                    error = %self,
                    stage = stage,
                    retryable = self.is_retryable(),
                    "Worker info"
                );
            }
        }
    }

    /// Create a file access error
    pub fn file_access(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::FileAccess {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a decode error
    pub fn decode(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a collaborator error
    pub fn collaborator(service: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Collaborator {
            service: service.into(),
            message: message.to_string(),
        }
    }
}

/// Error severity levels for logging and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that should trigger alerts
    Critical,
    /// Standard errors
    Error,
    /// Warnings for expected failures
    Warning,
    /// Informational messages
    Info,
}

/// Result type alias for worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;

// ========== Conversion Implementations ==========

impl From<anyhow::Error> for WorkerError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<WorkerError>() {
            Ok(worker_err) => worker_err,
            Err(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<tuneforge_ollama_client::OllamaError> for WorkerError {
    fn from(err: tuneforge_ollama_client::OllamaError) -> Self {
        Self::collaborator("ollama", err)
    }
}

impl From<tuneforge_subsonic_client::SubsonicError> for WorkerError {
    fn from(err: tuneforge_subsonic_client::SubsonicError) -> Self {
        Self::collaborator("subsonic", err)
    }
}
