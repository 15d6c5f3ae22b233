//! Common test utilities for worker integration tests
//!
//! Shared fixtures: an in-memory database with the worker schema applied,
//! track and feature row builders, and a minimal WAV writer for scan tests.

#![allow(unused_imports)]
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use sqlx::SqlitePool;
use tuneforge_worker::db;
use tuneforge_worker::features::TrackAnalysis;
use tuneforge_worker::similarity::FeatureVector;

/// Open a fresh in-memory database with the schema applied
pub async fn test_pool() -> SqlitePool {
    // A single connection keeps every query on the same in-memory database
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    db::migrate(&pool).await.expect("Failed to apply schema");
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .expect("Failed to enable foreign keys");
    pool
}

/// Insert a track row and return its id
pub async fn insert_track(pool: &SqlitePool, path: &str, title: &str, artist: &str) -> i64 {
    sqlx::query(
        "INSERT INTO tracks (file_path, title, artist, file_size, last_modified) VALUES (?, ?, ?, 4096, 0)",
    )
    .bind(path)
    .bind(title)
    .bind(artist)
    .execute(pool)
    .await
    .expect("Failed to insert track")
    .last_insert_rowid()
}

/// Insert a feature row for a track
pub async fn insert_features(pool: &SqlitePool, track_id: i64, vector: &FeatureVector) {
    sqlx::query(
        r#"
        INSERT INTO audio_features
            (track_id, energy, valence, danceability, tempo, acousticness, instrumentalness, loudness, speechiness)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(track_id)
    .bind(vector.energy)
    .bind(vector.valence)
    .bind(vector.danceability)
    .bind(vector.tempo)
    .bind(vector.acousticness)
    .bind(vector.instrumentalness)
    .bind(vector.loudness)
    .bind(vector.speechiness)
    .execute(pool)
    .await
    .expect("Failed to insert features");
}

/// A feature vector with the given energy and tempo, everything else fixed
pub fn vector(energy: f64, tempo: f64) -> FeatureVector {
    FeatureVector {
        energy,
        valence: 0.5,
        danceability: 0.5,
        tempo,
        acousticness: 0.4,
        instrumentalness: 0.6,
        loudness: -15.0,
        speechiness: 0.1,
    }
}

/// Write a valid mono 16-bit PCM WAV file with a sine tone
///
/// One second at 44.1 kHz, comfortably above the scanner's minimum size.
pub fn write_test_wav(path: &Path, freq: f64) {
    const SAMPLE_RATE: u32 = 44_100;
    let num_samples = SAMPLE_RATE as usize;
    let data_len = (num_samples * 2) as u32;

    let mut bytes: Vec<u8> = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    bytes.extend_from_slice(&(SAMPLE_RATE * 2).to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());

    for i in 0..num_samples {
        let t = i as f64 / SAMPLE_RATE as f64;
        let sample = (0.5 * (2.0 * std::f64::consts::PI * freq * t).sin() * i16::MAX as f64) as i16;
        bytes.extend_from_slice(&sample.to_le_bytes());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    std::fs::write(path, bytes).expect("Failed to write test WAV");
}
