//! Subsonic API response types
//!
//! Every response arrives wrapped in a `subsonic-response` envelope carrying
//! the protocol status; the payload field varies per endpoint.

use serde::Deserialize;

/// Top-level response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "subsonic-response")]
    pub response: SubsonicResponse,
}

/// Inner response body shared by all endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct SubsonicResponse {
    /// "ok" or "failed"
    pub status: String,
    /// Protocol version
    #[serde(default)]
    pub version: Option<String>,
    /// Error details when status is "failed"
    #[serde(default)]
    pub error: Option<ApiError>,
    /// search3 payload
    #[serde(rename = "searchResult3", default)]
    pub search_result3: Option<SearchResult3>,
    /// createPlaylist payload
    #[serde(default)]
    pub playlist: Option<Playlist>,
}

/// Protocol-level error
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub code: i32,
    pub message: String,
}

/// search3 results (song matches only; artist/album counts are requested as 0)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResult3 {
    #[serde(default)]
    pub song: Vec<Song>,
}

/// A song entry as returned by the server
#[derive(Debug, Clone, Deserialize)]
pub struct Song {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    /// Library-relative file path
    #[serde(default)]
    pub path: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<u32>,
}

/// A playlist as returned by createPlaylist
#[derive(Debug, Clone, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(rename = "songCount", default)]
    pub song_count: u32,
}
