//! Subsonic/Navidrome configuration types

use crate::{get_env_or_default, get_required_env, parse_env, ConfigResult};

/// Subsonic-compatible server configuration (Navidrome)
///
/// Optional: playlist save-to-server is only available when the server URL
/// and credentials are configured.
#[derive(Debug, Clone)]
pub struct SubsonicConfig {
    /// Server base URL (e.g., http://navidrome:4533)
    pub url: String,

    /// Username for authentication
    pub username: String,

    /// Password for authentication
    pub password: String,

    /// Client identifier sent with every request
    pub client_id: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl SubsonicConfig {
    /// Load Subsonic configuration from environment variables
    ///
    /// Fails when SUBSONIC_URL or credentials are absent, which callers
    /// treat as "integration not configured".
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            url: get_required_env("SUBSONIC_URL")?,
            username: get_required_env("SUBSONIC_USERNAME")?,
            password: get_required_env("SUBSONIC_PASSWORD")?,
            client_id: get_env_or_default("SUBSONIC_CLIENT_ID", "tuneforge"),
            timeout_secs: parse_env("SUBSONIC_TIMEOUT", 30)?,
        })
    }

    /// Create a configuration with a custom URL (useful for testing)
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: "admin".to_string(),
            password: "admin".to_string(),
            client_id: "tuneforge".to_string(),
            timeout_secs: 30,
        }
    }

    /// Get the full URL for a REST endpoint, e.g. `rest_url("search3")`
    pub fn rest_url(&self, endpoint: &str) -> String {
        format!("{}/rest/{}", self.url.trim_end_matches('/'), endpoint)
    }
}
