//! Mock Subsonic server for testing library search and playlist saving

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock Subsonic-compatible server (Navidrome) for tests
///
/// Wraps a [`wiremock::MockServer`] with helpers for the two endpoints the
/// workspace uses: `search3` and `createPlaylist`.
pub struct MockSubsonicServer {
    server: MockServer,
}

impl MockSubsonicServer {
    /// Start a new mock Subsonic server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Mount a search3 mock returning the given songs for any query
    ///
    /// Each entry is (id, title, artist).
    pub async fn mock_search_hits(&self, songs: &[(&str, &str, &str)]) {
        let song_list: Vec<serde_json::Value> = songs
            .iter()
            .map(|(id, title, artist)| json!({"id": id, "title": title, "artist": artist}))
            .collect();

        Mock::given(method("GET"))
            .and(path("/rest/search3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "subsonic-response": {
                    "status": "ok",
                    "version": "1.16.1",
                    "searchResult3": {"song": song_list}
                }
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a search3 mock for a specific query string
    pub async fn mock_search_for_query(&self, query: &str, songs: &[(&str, &str, &str)]) {
        let song_list: Vec<serde_json::Value> = songs
            .iter()
            .map(|(id, title, artist)| json!({"id": id, "title": title, "artist": artist}))
            .collect();

        Mock::given(method("GET"))
            .and(path("/rest/search3"))
            .and(query_param("query", query))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "subsonic-response": {
                    "status": "ok",
                    "version": "1.16.1",
                    "searchResult3": {"song": song_list}
                }
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a search3 mock that never matches anything
    pub async fn mock_search_empty(&self) {
        Mock::given(method("GET"))
            .and(path("/rest/search3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "subsonic-response": {
                    "status": "ok",
                    "version": "1.16.1",
                    "searchResult3": {}
                }
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a createPlaylist mock returning the given playlist id
    pub async fn mock_create_playlist(&self, playlist_id: &str, name: &str, song_count: u32) {
        Mock::given(method("GET"))
            .and(path("/rest/createPlaylist"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "subsonic-response": {
                    "status": "ok",
                    "version": "1.16.1",
                    "playlist": {"id": playlist_id, "name": name, "songCount": song_count}
                }
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount an authentication-failure mock for every endpoint
    pub async fn mock_auth_failure(&self) {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "subsonic-response": {
                    "status": "failed",
                    "version": "1.16.1",
                    "error": {"code": 40, "message": "Wrong username or password"}
                }
            })))
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
