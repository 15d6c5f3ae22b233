//! Subsonic API client implementation

use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument, warn};
use tuneforge_shared_config::SubsonicConfig;

use crate::error::{SubsonicError, SubsonicResult};
use crate::models::{Envelope, Playlist, Song, SubsonicResponse};

/// Subsonic protocol version sent with every request
const PROTOCOL_VERSION: &str = "1.16.1";

/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Maximum search query length
const MAX_QUERY_LENGTH: usize = 512;

/// Default number of retry attempts for transient failures
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 100;

/// Subsonic-compatible server client (tested against Navidrome)
#[derive(Clone)]
pub struct SubsonicClient {
    http_client: Client,
    config: SubsonicConfig,
    max_retries: u32,
}

impl fmt::Debug for SubsonicClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubsonicClient")
            .field("url", &self.config.url)
            .field("username", &self.config.username)
            .field("password", &"[REDACTED]")
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl SubsonicClient {
    /// Create a new Subsonic client from configuration
    ///
    /// # Errors
    /// Returns `SubsonicError::InvalidInput` if credentials are empty
    pub fn new(config: &SubsonicConfig) -> SubsonicResult<Self> {
        if config.username.is_empty() || config.password.is_empty() {
            return Err(SubsonicError::InvalidInput(
                "Subsonic credentials cannot be empty".to_string(),
            ));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent("TuneForge/1.0")
            .build()?;

        Ok(Self {
            http_client,
            config: config.clone(),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Common query parameters for every Subsonic request
    fn auth_params(&self) -> Vec<(String, String)> {
        vec![
            ("u".to_string(), self.config.username.clone()),
            ("p".to_string(), self.config.password.clone()),
            ("v".to_string(), PROTOCOL_VERSION.to_string()),
            ("c".to_string(), self.config.client_id.clone()),
            ("f".to_string(), "json".to_string()),
        ]
    }

    /// Validate a search query
    fn validate_query(query: &str) -> SubsonicResult<&str> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(SubsonicError::InvalidInput(
                "search query cannot be empty".to_string(),
            ));
        }
        if trimmed.len() > MAX_QUERY_LENGTH {
            return Err(SubsonicError::InvalidInput(format!(
                "search query too long (max {} characters)",
                MAX_QUERY_LENGTH
            )));
        }
        Ok(trimmed)
    }

    /// Execute an operation with retry logic for transient failures
    async fn with_retry<T, F, Fut>(&self, operation: F) -> SubsonicResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = SubsonicResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay_ms = RETRY_BASE_DELAY_MS * 2u64.pow(attempt);
                    warn!(
                        attempt = attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay_ms,
                        error = %e,
                        "Subsonic request failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Issue a request and unwrap the subsonic-response envelope
    async fn make_request(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> SubsonicResult<SubsonicResponse> {
        let mut query = self.auth_params();
        query.extend_from_slice(params);

        let response = self
            .http_client
            .get(self.config.rest_url(endpoint))
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SubsonicError::Timeout
                } else {
                    SubsonicError::Http(e)
                }
            })?;

        let text = response.text().await.map_err(SubsonicError::Http)?;
        let envelope: Envelope = serde_json::from_str(&text)?;
        let inner = envelope.response;

        if inner.status != "ok" {
            if let Some(error) = inner.error {
                // Code 40 = wrong username or password
                if error.code == 40 {
                    return Err(SubsonicError::Unauthorized(error.message));
                }
                return Err(SubsonicError::Api {
                    code: error.code,
                    message: error.message,
                });
            }
            return Err(SubsonicError::Api {
                code: 0,
                message: format!("status {}", inner.status),
            });
        }

        Ok(inner)
    }

    /// Search for songs matching a free-text query
    ///
    /// Uses `search3` with artist and album counts pinned to zero; only song
    /// matches come back.
    #[instrument(skip(self))]
    pub async fn search_songs(&self, query: &str, limit: u32) -> SubsonicResult<Vec<Song>> {
        let query = Self::validate_query(query)?;

        debug!(query = %query, limit, "Searching Subsonic library");

        let response = self
            .with_retry(|| async {
                self.make_request(
                    "search3",
                    &[
                        ("query".to_string(), query.to_string()),
                        ("songCount".to_string(), limit.to_string()),
                        ("artistCount".to_string(), "0".to_string()),
                        ("albumCount".to_string(), "0".to_string()),
                    ],
                )
                .await
            })
            .await?;

        let songs = response.search_result3.unwrap_or_default().song;

        debug!(query = %query, result_count = songs.len(), "Search complete");

        Ok(songs)
    }

    /// Create a playlist on the server with the given songs, in order
    #[instrument(skip(self, song_ids))]
    pub async fn create_playlist(
        &self,
        name: &str,
        song_ids: &[String],
    ) -> SubsonicResult<Playlist> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SubsonicError::InvalidInput(
                "playlist name cannot be empty".to_string(),
            ));
        }
        if song_ids.is_empty() {
            return Err(SubsonicError::InvalidInput(
                "playlist must contain at least one song".to_string(),
            ));
        }

        debug!(name = %name, songs = song_ids.len(), "Creating playlist on server");

        let mut params = vec![("name".to_string(), name.to_string())];
        for id in song_ids {
            params.push(("songId".to_string(), id.clone()));
        }

        let response = self
            .with_retry(|| async { self.make_request("createPlaylist", &params).await })
            .await?;

        let playlist = response.playlist.ok_or_else(|| SubsonicError::Api {
            code: 0,
            message: "createPlaylist returned no playlist".to_string(),
        })?;

        debug!(id = %playlist.id, "Playlist created");

        Ok(playlist)
    }

    /// Check connectivity and credentials with a ping
    pub async fn ping(&self) -> SubsonicResult<bool> {
        let response = self.make_request("ping", &[]).await?;
        Ok(response.status == "ok")
    }
}
