//! Database configuration types

use crate::{get_env_or_default, parse_env, ConfigResult};

/// SQLite database configuration
///
/// The store is a single local file; writes are serialized through one
/// connection-pool writer, so the pool stays small by default.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file (e.g., /data/tuneforge.db)
    pub path: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Connection acquire timeout in seconds
    pub connect_timeout_secs: u64,

    /// Busy timeout in milliseconds before a locked write fails
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    /// Load database configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            path: get_env_or_default("DATABASE_PATH", "tuneforge.db"),
            max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 5)?,
            connect_timeout_secs: parse_env("DATABASE_CONNECT_TIMEOUT", 30)?,
            busy_timeout_ms: parse_env("DATABASE_BUSY_TIMEOUT_MS", 5000)?,
        })
    }

    /// Create a configuration with a custom path (useful for testing)
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            max_connections: 5,
            connect_timeout_secs: 30,
            busy_timeout_ms: 5000,
        }
    }

    /// SQLite connection URL for the configured path
    pub fn url(&self) -> String {
        format!("sqlite://{}", self.path)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "tuneforge.db".to_string(),
            max_connections: 5,
            connect_timeout_secs: 30,
            busy_timeout_ms: 5000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DatabaseConfig::default();
        assert_eq!(config.path, "tuneforge.db");
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn test_with_path() {
        let config = DatabaseConfig::with_path("/tmp/test.db");
        assert_eq!(config.path, "/tmp/test.db");
        assert_eq!(config.url(), "sqlite:///tmp/test.db");
    }
}
