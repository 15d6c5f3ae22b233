//! Playlist export
//!
//! Renders a generated playlist as JSON or M3U, and optionally saves it to
//! a configured Subsonic server by resolving each entry through search3.

use serde::Serialize;
use tracing::{info, warn};
use tuneforge_subsonic_client::SubsonicClient;

use crate::error::{WorkerError, WorkerResult};

/// One accepted track in a generated playlist
#[derive(Debug, Clone, Serialize)]
pub struct PlaylistEntry {
    pub track_id: i64,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub file_path: String,
    /// Normalized distance from the seed at acceptance time
    pub distance: f64,
}

#[derive(Debug, Serialize)]
struct JsonPlaylist<'a> {
    name: &'a str,
    tracks: &'a [PlaylistEntry],
}

/// Render a playlist as pretty-printed JSON
pub fn export_json(name: &str, entries: &[PlaylistEntry]) -> WorkerResult<String> {
    if entries.is_empty() {
        return Err(WorkerError::EmptyPlaylist);
    }

    let playlist = JsonPlaylist { name, tracks: entries };
    Ok(serde_json::to_string_pretty(&playlist)?)
}

/// Render a playlist in extended M3U format
pub fn export_m3u(entries: &[PlaylistEntry]) -> WorkerResult<String> {
    if entries.is_empty() {
        return Err(WorkerError::EmptyPlaylist);
    }

    let mut out = String::from("#EXTM3U\n");
    for entry in entries {
        let artist = entry.artist.as_deref().unwrap_or("Unknown Artist");
        out.push_str(&format!("#EXTINF:-1,{} - {}\n", artist, entry.title));
        out.push_str(&entry.file_path);
        out.push('\n');
    }
    Ok(out)
}

/// Save a playlist to the configured Subsonic server
///
/// Each entry is resolved to a server song id via search; entries the
/// server doesn't know are skipped with a warning. Returns the server-side
/// playlist id.
pub async fn save_to_server(
    client: &SubsonicClient,
    name: &str,
    entries: &[PlaylistEntry],
) -> WorkerResult<String> {
    if entries.is_empty() {
        return Err(WorkerError::EmptyPlaylist);
    }

    let mut song_ids = Vec::with_capacity(entries.len());
    for entry in entries {
        let query = match &entry.artist {
            Some(artist) => format!("{} {}", entry.title, artist),
            None => entry.title.clone(),
        };

        match client.search_songs(&query, 5).await {
            Ok(songs) => {
                let matched = songs.iter().find(|song| {
                    song.title.eq_ignore_ascii_case(&entry.title)
                        && match (&song.artist, &entry.artist) {
                            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                            _ => true,
                        }
                });
                match matched.or_else(|| songs.first()) {
                    Some(song) => song_ids.push(song.id.clone()),
                    None => {
                        warn!(title = %entry.title, "Track not found on server, skipping");
                    }
                }
            }
            Err(e) => {
                warn!(title = %entry.title, error = %e, "Server search failed, skipping track");
            }
        }
    }

    if song_ids.is_empty() {
        return Err(WorkerError::collaborator(
            "subsonic",
            "no playlist tracks could be resolved on the server",
        ));
    }

    let playlist = client.create_playlist(name, &song_ids).await?;
    info!(
        playlist_id = %playlist.id,
        tracks = song_ids.len(),
        "Saved playlist to server"
    );

    Ok(playlist.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<PlaylistEntry> {
        vec![
            PlaylistEntry {
                track_id: 1,
                title: "Teardrop".to_string(),
                artist: Some("Massive Attack".to_string()),
                album: Some("Mezzanine".to_string()),
                file_path: "/music/massive_attack/teardrop.flac".to_string(),
                distance: 0.12,
            },
            PlaylistEntry {
                track_id: 2,
                title: "Untitled".to_string(),
                artist: None,
                album: None,
                file_path: "/music/misc/untitled.mp3".to_string(),
                distance: 0.3,
            },
        ]
    }

    #[test]
    fn test_export_json_structure() {
        let json = export_json("Chill Mix", &entries()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["name"], "Chill Mix");
        assert_eq!(parsed["tracks"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["tracks"][0]["title"], "Teardrop");
        assert_eq!(parsed["tracks"][1]["artist"], serde_json::Value::Null);
    }

    #[test]
    fn test_export_m3u_format() {
        let m3u = export_m3u(&entries()).unwrap();
        let lines: Vec<&str> = m3u.lines().collect();

        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(lines[1], "#EXTINF:-1,Massive Attack - Teardrop");
        assert_eq!(lines[2], "/music/massive_attack/teardrop.flac");
        assert_eq!(lines[3], "#EXTINF:-1,Unknown Artist - Untitled");
        assert_eq!(lines[4], "/music/misc/untitled.mp3");
    }

    #[test]
    fn test_export_empty_playlist_errors() {
        assert!(matches!(
            export_json("Empty", &[]).unwrap_err(),
            WorkerError::EmptyPlaylist
        ));
        assert!(matches!(
            export_m3u(&[]).unwrap_err(),
            WorkerError::EmptyPlaylist
        ));
    }
}
