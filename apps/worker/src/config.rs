//! Worker configuration loaded from environment variables
//!
//! This module provides configuration management for the TuneForge worker.
//! Configuration is loaded from environment variables with sensible defaults
//! for development environments.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tuneforge_shared_config::{
    CommonConfig, DatabaseConfig, Environment, OllamaConfig, SubsonicConfig,
};

/// Worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Common configuration shared with other services
    pub common: CommonConfig,

    /// Queue polling interval in seconds
    pub poll_interval_secs: u64,

    /// Number of concurrent analysis workers
    pub worker_count: usize,

    /// Per-file analysis timeout in seconds
    pub analysis_timeout_secs: u64,

    /// Maximum analysis attempts before an entry is marked as error
    pub max_attempts: u32,

    /// Age in seconds after which a processing entry counts as stalled
    pub stall_threshold_secs: u64,

    /// Minimum audio file size accepted by the scanner, in bytes
    pub min_file_size_bytes: u64,

    /// Maximum audio file size accepted by the scanner, in bytes
    pub max_file_size_bytes: u64,

    /// Maximum path length accepted by the scanner
    pub max_path_length: usize,

    /// Maximum suggestion rounds per generation job
    pub round_budget: u32,

    /// Number of suggestions requested per round
    pub suggestion_batch_size: u32,

    /// Normalized distance threshold for accepting a suggestion
    pub distance_threshold: f64,

    /// Corpus statistics cache lifetime in seconds
    pub stats_ttl_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let common = CommonConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

        Ok(Self {
            common,

            poll_interval_secs: env::var("WORKER_POLL_INTERVAL")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid WORKER_POLL_INTERVAL value")?,

            worker_count: env::var("ANALYSIS_WORKERS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .context("Invalid ANALYSIS_WORKERS value")?,

            analysis_timeout_secs: env::var("ANALYSIS_TIMEOUT")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .context("Invalid ANALYSIS_TIMEOUT value")?,

            max_attempts: env::var("ANALYSIS_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("Invalid ANALYSIS_MAX_ATTEMPTS value")?,

            stall_threshold_secs: env::var("ANALYSIS_STALL_THRESHOLD_SECS")
                .unwrap_or_else(|_| "1800".to_string())
                .parse()
                .context("Invalid ANALYSIS_STALL_THRESHOLD_SECS value")?,

            min_file_size_bytes: env::var("SCAN_MIN_FILE_SIZE")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()
                .context("Invalid SCAN_MIN_FILE_SIZE value")?,

            max_file_size_bytes: env::var("SCAN_MAX_FILE_SIZE")
                .unwrap_or_else(|_| "524288000".to_string())
                .parse()
                .context("Invalid SCAN_MAX_FILE_SIZE value")?,

            max_path_length: env::var("SCAN_MAX_PATH_LENGTH")
                .unwrap_or_else(|_| "4096".to_string())
                .parse()
                .context("Invalid SCAN_MAX_PATH_LENGTH value")?,

            round_budget: env::var("GENERATION_MAX_ROUNDS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid GENERATION_MAX_ROUNDS value")?,

            suggestion_batch_size: env::var("GENERATION_BATCH_SIZE")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid GENERATION_BATCH_SIZE value")?,

            distance_threshold: env::var("GENERATION_DISTANCE_THRESHOLD")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()
                .context("Invalid GENERATION_DISTANCE_THRESHOLD value")?,

            stats_ttl_secs: env::var("SIMILARITY_STATS_TTL")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("Invalid SIMILARITY_STATS_TTL value")?,
        })
    }

    // Convenience accessors for common config fields

    /// Get the SQLite database URL
    pub fn database_url(&self) -> String {
        self.common.database.url()
    }

    /// Get music library path
    pub fn music_library_path(&self) -> &PathBuf {
        &self.common.music_library_path
    }

    /// Get database configuration
    pub fn database(&self) -> &DatabaseConfig {
        &self.common.database
    }

    /// Get Ollama configuration
    pub fn ollama(&self) -> &OllamaConfig {
        &self.common.ollama
    }

    /// Get Subsonic configuration (if configured)
    pub fn subsonic(&self) -> Option<&SubsonicConfig> {
        self.common.subsonic.as_ref()
    }

    /// Get environment mode
    pub fn environment(&self) -> Environment {
        self.common.environment
    }

    /// Check if a Subsonic server is configured for playlist saving
    pub fn has_subsonic(&self) -> bool {
        self.common.has_subsonic()
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.common.environment.is_production()
    }
}
