//! SQLite pool setup and embedded schema
//!
//! The worker owns its database file. The schema is applied on startup with
//! idempotent `CREATE TABLE IF NOT EXISTS` statements so a fresh database and
//! an existing one both come up ready.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;
use tuneforge_shared_config::DatabaseConfig;

use crate::error::WorkerResult;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tracks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    artist TEXT,
    album TEXT,
    genre TEXT,
    year INTEGER,
    track_number INTEGER,
    duration_secs REAL,
    file_size INTEGER NOT NULL,
    last_modified INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS audio_features (
    track_id INTEGER PRIMARY KEY REFERENCES tracks(id) ON DELETE CASCADE,
    energy REAL NOT NULL,
    valence REAL NOT NULL,
    danceability REAL NOT NULL,
    tempo REAL NOT NULL,
    acousticness REAL NOT NULL,
    instrumentalness REAL NOT NULL,
    loudness REAL NOT NULL,
    speechiness REAL NOT NULL,
    spectral_centroid REAL,
    spectral_rolloff REAL,
    spectral_bandwidth REAL,
    duration_secs REAL,
    sample_rate INTEGER,
    num_samples INTEGER,
    analysis_version INTEGER NOT NULL DEFAULT 1,
    analyzed_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS analysis_queue (
    file_path TEXT PRIMARY KEY,
    status TEXT NOT NULL DEFAULT 'pending',
    attempt_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    enqueued_at TEXT NOT NULL DEFAULT (datetime('now')),
    started_at TEXT,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_analysis_queue_status ON analysis_queue(status);
CREATE INDEX IF NOT EXISTS idx_tracks_artist ON tracks(artist);
"#;

/// Open the worker database and apply the schema
pub async fn connect(config: &DatabaseConfig) -> WorkerResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url())?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect_with(options)
        .await?;

    migrate(&pool).await?;

    info!(path = %config.path, "Database ready");
    Ok(pool)
}

/// Apply the embedded schema to an open pool
pub async fn migrate(pool: &SqlitePool) -> WorkerResult<()> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}
