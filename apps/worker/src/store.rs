//! Feature persistence and corpus statistics
//!
//! Writes extracted features, reads them back for the similarity engine,
//! and caches corpus min/max statistics with a TTL so generation jobs
//! don't recompute aggregates on every candidate.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::{WorkerError, WorkerResult};
use crate::features::TrackAnalysis;
use crate::similarity::{CorpusStats, FeatureVector, NUM_FEATURES};

/// Schema version written alongside each feature row
pub const ANALYSIS_VERSION: i64 = 1;

pub struct FeatureStore {
    pool: SqlitePool,
    stats_ttl: Duration,
    cached_stats: RwLock<Option<(Instant, CorpusStats)>>,
}

impl FeatureStore {
    pub fn new(pool: SqlitePool, stats_ttl: Duration) -> Self {
        Self {
            pool,
            stats_ttl,
            cached_stats: RwLock::new(None),
        }
    }

    /// Store analysis results for a track, replacing any prior row
    pub async fn upsert(&self, track_id: i64, analysis: &TrackAnalysis) -> WorkerResult<()> {
        let v = &analysis.vector;

        sqlx::query(
            r#"
            INSERT INTO audio_features (
                track_id, energy, valence, danceability, tempo,
                acousticness, instrumentalness, loudness, speechiness,
                spectral_centroid, spectral_rolloff, spectral_bandwidth,
                duration_secs, sample_rate, num_samples,
                analysis_version, analyzed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))
            ON CONFLICT(track_id) DO UPDATE SET
                energy = excluded.energy,
                valence = excluded.valence,
                danceability = excluded.danceability,
                tempo = excluded.tempo,
                acousticness = excluded.acousticness,
                instrumentalness = excluded.instrumentalness,
                loudness = excluded.loudness,
                speechiness = excluded.speechiness,
                spectral_centroid = excluded.spectral_centroid,
                spectral_rolloff = excluded.spectral_rolloff,
                spectral_bandwidth = excluded.spectral_bandwidth,
                duration_secs = excluded.duration_secs,
                sample_rate = excluded.sample_rate,
                num_samples = excluded.num_samples,
                analysis_version = excluded.analysis_version,
                analyzed_at = datetime('now')
            "#,
        )
        .bind(track_id)
        .bind(v.energy)
        .bind(v.valence)
        .bind(v.danceability)
        .bind(v.tempo)
        .bind(v.acousticness)
        .bind(v.instrumentalness)
        .bind(v.loudness)
        .bind(v.speechiness)
        .bind(analysis.spectral_centroid)
        .bind(analysis.spectral_rolloff)
        .bind(analysis.spectral_bandwidth)
        .bind(analysis.duration_secs)
        .bind(analysis.sample_rate as i64)
        .bind(analysis.num_samples as i64)
        .bind(ANALYSIS_VERSION)
        .execute(&self.pool)
        .await?;

        self.invalidate();
        Ok(())
    }

    /// Load the feature vector for one track, if analyzed
    pub async fn get_vector(&self, track_id: i64) -> WorkerResult<Option<FeatureVector>> {
        let row = sqlx::query(
            "SELECT energy, valence, danceability, tempo, acousticness, instrumentalness, loudness, speechiness FROM audio_features WHERE track_id = ?",
        )
        .bind(track_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row_to_vector(&row)))
    }

    /// Load feature vectors for a set of tracks; unanalyzed ids are absent
    pub async fn get_vectors(&self, track_ids: &[i64]) -> WorkerResult<Vec<(i64, FeatureVector)>> {
        if track_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = sqlx::QueryBuilder::new(
            "SELECT track_id, energy, valence, danceability, tempo, acousticness, instrumentalness, loudness, speechiness FROM audio_features WHERE track_id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in track_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY track_id");

        let rows = builder.build().fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(|row| (row.get::<i64, _>("track_id"), row_to_vector(row)))
            .collect())
    }

    /// Load all feature vectors with their track ids
    pub async fn all_vectors(&self) -> WorkerResult<Vec<(i64, FeatureVector)>> {
        let rows = sqlx::query(
            "SELECT track_id, energy, valence, danceability, tempo, acousticness, instrumentalness, loudness, speechiness FROM audio_features ORDER BY track_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get::<i64, _>("track_id"), row_to_vector(row)))
            .collect())
    }

    /// Number of analyzed tracks
    pub async fn count(&self) -> WorkerResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM audio_features")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Corpus min/max statistics, cached for the configured TTL
    pub async fn corpus_stats(&self) -> WorkerResult<CorpusStats> {
        if let Ok(guard) = self.cached_stats.read() {
            if let Some((at, stats)) = guard.as_ref() {
                if at.elapsed() < self.stats_ttl {
                    return Ok(*stats);
                }
            }
        }

        let stats = self.compute_stats().await?;

        if let Ok(mut guard) = self.cached_stats.write() {
            *guard = Some((Instant::now(), stats));
        }
        debug!("Refreshed corpus feature statistics");

        Ok(stats)
    }

    /// Drop the cached statistics so the next read recomputes
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.cached_stats.write() {
            *guard = None;
        }
    }

    async fn compute_stats(&self) -> WorkerResult<CorpusStats> {
        let row = sqlx::query(
            r#"
            SELECT
                MIN(energy), MAX(energy),
                MIN(valence), MAX(valence),
                MIN(danceability), MAX(danceability),
                MIN(tempo), MAX(tempo),
                MIN(acousticness), MAX(acousticness),
                MIN(instrumentalness), MAX(instrumentalness),
                MIN(loudness), MAX(loudness),
                MIN(speechiness), MAX(speechiness)
            FROM audio_features
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        // MIN/MAX come back NULL on an empty table
        let first: Option<f64> = row.try_get(0)?;
        if first.is_none() {
            return Err(WorkerError::SeedUnavailable(
                "no analyzed tracks in the library".to_string(),
            ));
        }

        let mut min = [0.0; NUM_FEATURES];
        let mut max = [0.0; NUM_FEATURES];
        for i in 0..NUM_FEATURES {
            min[i] = row.try_get(i * 2)?;
            max[i] = row.try_get(i * 2 + 1)?;
        }

        Ok(CorpusStats { min, max })
    }
}

fn row_to_vector(row: &sqlx::sqlite::SqliteRow) -> FeatureVector {
    FeatureVector {
        energy: row.get("energy"),
        valence: row.get("valence"),
        danceability: row.get("danceability"),
        tempo: row.get("tempo"),
        acousticness: row.get("acousticness"),
        instrumentalness: row.get("instrumentalness"),
        loudness: row.get("loudness"),
        speechiness: row.get("speechiness"),
    }
}
