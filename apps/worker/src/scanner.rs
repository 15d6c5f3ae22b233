//! Library scanner
//!
//! Walks the music library, upserts track rows keyed by file path, and
//! enqueues new or changed files for analysis. File identity is the
//! (path, size, mtime) triple: an incremental scan skips files whose size
//! and mtime are unchanged. Files that disappeared from disk are removed
//! from the database along with their features and queue entries.
//!
//! Metadata read failures never block indexing; the filename stem stands
//! in for a missing title.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use lofty::{Accessor, Probe, TaggedFileExt};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;
use walkdir::WalkDir;

use crate::error::{WorkerError, WorkerResult};
use crate::queue::QueueManager;

/// File extensions treated as audio
pub const AUDIO_EXTENSIONS: [&str; 6] = ["mp3", "flac", "wav", "ogg", "m4a", "aac"];

/// Rows per chunked IN query, kept well under SQLite's bind limit
const LOOKUP_CHUNK_SIZE: usize = 500;

/// Full rescans revisit every file; incremental scans skip unchanged ones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Full,
    Incremental,
}

/// Per-file scan outcomes, emitted as they happen for live progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Inserted(String),
    Updated(String),
    Skipped(String),
    Removed(String),
    Error(String),
}

/// Outcome counters for one scan pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Audio files seen on disk
    pub scanned: u64,
    /// New tracks added
    pub inserted: u64,
    /// Existing tracks whose size or mtime changed
    pub updated: u64,
    /// Unchanged tracks left alone
    pub skipped: u64,
    /// Tracks removed because their files are gone
    pub removed: u64,
    /// Files rejected by the size or path filters, or that could not be stat'd
    pub errors: u64,
}

/// Tag metadata pulled from a file, with filename fallback
#[derive(Debug, Clone, Default)]
struct TrackMetadata {
    title: String,
    artist: Option<String>,
    album: Option<String>,
    genre: Option<String>,
    year: Option<i64>,
    track_number: Option<i64>,
    duration_secs: Option<f64>,
}

/// One file found on disk, identity fields resolved
struct DiscoveredFile {
    path: PathBuf,
    normalized_path: String,
    size: u64,
    mtime: i64,
}

pub struct Scanner {
    pool: SqlitePool,
    library_path: PathBuf,
    min_file_size: u64,
    max_file_size: u64,
    max_path_length: usize,
    cancel: CancellationToken,
    events: Option<mpsc::UnboundedSender<ScanEvent>>,
}

impl Scanner {
    pub fn new(
        pool: SqlitePool,
        library_path: PathBuf,
        min_file_size: u64,
        max_file_size: u64,
        max_path_length: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pool,
            library_path,
            min_file_size,
            max_file_size,
            max_path_length,
            cancel,
            events: None,
        }
    }

    /// Attach a channel that receives per-file [`ScanEvent`]s
    pub fn with_events(mut self, events: mpsc::UnboundedSender<ScanEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: ScanEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver just means nobody is watching
            let _ = events.send(event);
        }
    }

    /// Run one scan pass over the library
    pub async fn scan(&self, mode: ScanMode, queue: &QueueManager) -> WorkerResult<ScanSummary> {
        if !self.library_path.is_dir() {
            return Err(WorkerError::LibraryNotFound(
                self.library_path.display().to_string(),
            ));
        }

        info!(path = %self.library_path.display(), ?mode, "Starting library scan");

        let mut summary = ScanSummary::default();
        let discovered = self.discover_files(&mut summary)?;
        summary.scanned = discovered.len() as u64;

        // A cancelled walk saw only part of the library; removal decisions
        // would be wrong
        if self.cancel.is_cancelled() {
            info!("Scan cancelled during discovery");
            return Ok(summary);
        }

        // Existing identity triples, fetched in chunks
        let known = self.load_known(&discovered).await?;

        let mut seen_paths: Vec<String> = Vec::with_capacity(discovered.len());
        for file in &discovered {
            if self.cancel.is_cancelled() {
                info!("Scan cancelled");
                return Ok(summary);
            }
            seen_paths.push(file.normalized_path.clone());

            match known.get(&file.normalized_path) {
                Some(&(size, mtime))
                    if mode == ScanMode::Incremental
                        && size == file.size as i64
                        && mtime == file.mtime =>
                {
                    summary.skipped += 1;
                    self.emit(ScanEvent::Skipped(file.normalized_path.clone()));
                }
                Some(_) => {
                    if let Err(e) = self.upsert_track(file, queue).await {
                        warn!(file = %file.normalized_path, error = %e, "Failed to update track");
                        summary.errors += 1;
                        self.emit(ScanEvent::Error(file.normalized_path.clone()));
                    } else {
                        summary.updated += 1;
                        self.emit(ScanEvent::Updated(file.normalized_path.clone()));
                    }
                }
                None => {
                    if let Err(e) = self.upsert_track(file, queue).await {
                        warn!(file = %file.normalized_path, error = %e, "Failed to insert track");
                        summary.errors += 1;
                        self.emit(ScanEvent::Error(file.normalized_path.clone()));
                    } else {
                        summary.inserted += 1;
                        self.emit(ScanEvent::Inserted(file.normalized_path.clone()));
                    }
                }
            }
        }

        summary.removed = self.remove_missing(&seen_paths, queue).await?;

        info!(
            scanned = summary.scanned,
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = summary.skipped,
            removed = summary.removed,
            errors = summary.errors,
            "Library scan finished"
        );

        Ok(summary)
    }

    /// Walk the library collecting audio files that pass the filters
    fn discover_files(&self, summary: &mut ScanSummary) -> WorkerResult<Vec<DiscoveredFile>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.library_path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if self.cancel.is_cancelled() {
                break;
            }
            if !entry.file_type().is_file() || !is_audio_file(entry.path()) {
                continue;
            }

            let normalized_path: String = entry.path().display().to_string().nfc().collect();
            if normalized_path.len() > self.max_path_length {
                warn!(file = %normalized_path, "Rejecting over-long path");
                summary.errors += 1;
                self.emit(ScanEvent::Error(normalized_path));
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!(file = %normalized_path, error = %e, "Failed to stat file");
                    summary.errors += 1;
                    self.emit(ScanEvent::Error(normalized_path));
                    continue;
                }
            };

            let size = metadata.len();
            if size < self.min_file_size || size > self.max_file_size {
                warn!(file = %normalized_path, size, "Rejecting file outside size window");
                summary.errors += 1;
                self.emit(ScanEvent::Error(normalized_path));
                continue;
            }

            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            files.push(DiscoveredFile {
                path: entry.path().to_path_buf(),
                normalized_path,
                size,
                mtime,
            });
        }

        Ok(files)
    }

    /// Fetch known (size, mtime) identities for the discovered paths in chunks
    async fn load_known(
        &self,
        discovered: &[DiscoveredFile],
    ) -> WorkerResult<HashMap<String, (i64, i64)>> {
        let mut known = HashMap::new();

        for chunk in discovered.chunks(LOOKUP_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT file_path, file_size, last_modified FROM tracks WHERE file_path IN (");
            let mut separated = builder.separated(", ");
            for file in chunk {
                separated.push_bind(&file.normalized_path);
            }
            separated.push_unseparated(")");

            let rows = builder.build().fetch_all(&self.pool).await?;
            for row in rows {
                known.insert(
                    row.get::<String, _>("file_path"),
                    (row.get::<i64, _>("file_size"), row.get::<i64, _>("last_modified")),
                );
            }
        }

        Ok(known)
    }

    /// Insert or update one track row and enqueue it for analysis
    async fn upsert_track(&self, file: &DiscoveredFile, queue: &QueueManager) -> WorkerResult<()> {
        let metadata = read_metadata(&file.path);

        sqlx::query(
            r#"
            INSERT INTO tracks (file_path, title, artist, album, genre, year, track_number, duration_secs, file_size, last_modified, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))
            ON CONFLICT(file_path) DO UPDATE SET
                title = excluded.title,
                artist = excluded.artist,
                album = excluded.album,
                genre = excluded.genre,
                year = excluded.year,
                track_number = excluded.track_number,
                duration_secs = excluded.duration_secs,
                file_size = excluded.file_size,
                last_modified = excluded.last_modified,
                updated_at = datetime('now')
            "#,
        )
        .bind(&file.normalized_path)
        .bind(&metadata.title)
        .bind(&metadata.artist)
        .bind(&metadata.album)
        .bind(&metadata.genre)
        .bind(metadata.year)
        .bind(metadata.track_number)
        .bind(metadata.duration_secs)
        .bind(file.size as i64)
        .bind(file.mtime)
        .execute(&self.pool)
        .await?;

        queue.enqueue(&file.normalized_path).await?;
        Ok(())
    }

    /// Delete tracks whose files were not seen on disk
    async fn remove_missing(&self, seen: &[String], queue: &QueueManager) -> WorkerResult<u64> {
        let rows = sqlx::query("SELECT file_path FROM tracks")
            .fetch_all(&self.pool)
            .await?;

        let seen_set: std::collections::HashSet<&str> =
            seen.iter().map(|s| s.as_str()).collect();

        let mut removed = 0;
        for row in rows {
            let path: String = row.get("file_path");
            if seen_set.contains(path.as_str()) {
                continue;
            }

            // Features cascade from the tracks delete
            sqlx::query("DELETE FROM tracks WHERE file_path = ?")
                .bind(&path)
                .execute(&self.pool)
                .await?;
            queue.remove(&path).await?;

            debug!(file = %path, "Removed track for missing file");
            self.emit(ScanEvent::Removed(path));
            removed += 1;
        }

        Ok(removed)
    }
}

/// Check whether a path has a recognized audio extension
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let lower = ext.to_lowercase();
            AUDIO_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

/// Read tags with lofty, falling back to the filename stem for the title
fn read_metadata(path: &Path) -> TrackMetadata {
    let fallback_title = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Unknown")
        .to_string();

    let tagged = match Probe::open(path).and_then(|p| p.read()) {
        Ok(t) => t,
        Err(e) => {
            debug!(file = %path.display(), error = %e, "Failed to read tags, using filename");
            return TrackMetadata {
                title: fallback_title,
                ..Default::default()
            };
        }
    };

    let duration_secs = {
        use lofty::AudioFile;
        let duration = tagged.properties().duration();
        if duration.as_secs() > 0 || duration.subsec_millis() > 0 {
            Some(duration.as_secs_f64())
        } else {
            None
        }
    };

    let tag = tagged.primary_tag().or_else(|| tagged.first_tag());
    match tag {
        Some(tag) => TrackMetadata {
            title: tag
                .title()
                .map(|t| t.to_string())
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(fallback_title),
            artist: tag.artist().map(|a| a.to_string()),
            album: tag.album().map(|a| a.to_string()),
            genre: tag.genre().map(|g| g.to_string()),
            year: tag.year().map(|y| y as i64),
            track_number: tag.track().map(|t| t as i64),
            duration_secs,
        },
        None => TrackMetadata {
            title: fallback_title,
            duration_secs,
            ..Default::default()
        },
    }
}
