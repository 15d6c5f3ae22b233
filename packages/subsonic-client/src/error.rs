//! Subsonic API error types

use thiserror::Error;

/// Subsonic API client errors
#[derive(Error, Debug)]
pub enum SubsonicError {
    /// Invalid input provided to API method
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("Failed to parse Subsonic response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Subsonic API returned an error
    #[error("Subsonic API error {code}: {message}")]
    Api { code: i32, message: String },

    /// Credentials rejected by the server
    #[error("Subsonic authentication failed: {0}")]
    Unauthorized(String),

    /// Request timeout
    #[error("Request to Subsonic server timed out")]
    Timeout,
}

impl SubsonicError {
    /// Check if this error is retryable (transient failure)
    ///
    /// Retries on timeouts, transport errors, and server errors (5xx).
    /// Does NOT retry on authentication failures or client errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            SubsonicError::Timeout => true,
            SubsonicError::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                matches!(e.status(), Some(status) if status.is_server_error())
            }
            _ => false,
        }
    }
}

/// Result type for Subsonic operations
pub type SubsonicResult<T> = Result<T, SubsonicError>;
