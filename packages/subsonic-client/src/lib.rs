//! Subsonic API client for TuneForge
//!
//! This crate provides a client for Subsonic-compatible servers (Navidrome),
//! enabling:
//! - Song search for matching LLM suggestions against the library
//! - Playlist creation on the server
//!
//! # Example
//!
//! ```rust,no_run
//! use tuneforge_shared_config::SubsonicConfig;
//! use tuneforge_subsonic_client::SubsonicClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SubsonicConfig::with_url("http://navidrome:4533");
//! let client = SubsonicClient::new(&config)?;
//!
//! let songs = client.search_songs("Teardrop Massive Attack", 5).await?;
//! if let Some(song) = songs.first() {
//!     let playlist = client.create_playlist("My Mix", &[song.id.clone()]).await?;
//!     println!("created playlist {}", playlist.id);
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod models;

pub use client::SubsonicClient;
pub use error::{SubsonicError, SubsonicResult};
pub use models::{ApiError, Envelope, Playlist, SearchResult3, Song, SubsonicResponse};
