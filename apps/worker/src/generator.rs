//! Feedback-loop playlist generation
//!
//! Given a seed track, repeatedly asks the suggestion service for candidate
//! tracks, matches them against the local library, and accepts those whose
//! weighted feature distance from the seed falls under the threshold.
//! Rejected and duplicate suggestions feed back into the next round's
//! prompt as negative context. The loop runs until the target length is
//! reached, the round budget is exhausted, or the job is cancelled.

use std::collections::HashSet;
use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};
use tuneforge_ollama_client::{OllamaClient, SuggestedTrack};

use crate::error::{WorkerError, WorkerResult};
use crate::export::PlaylistEntry;
use crate::jobs::{GenerationJob, JobStatus};
use crate::similarity::{self, CorpusStats, FeatureVector, DEFAULT_WEIGHTS, NUM_FEATURES};
use crate::store::FeatureStore;

/// How many accepted/rejected titles the prompt carries as context
const PROMPT_CONTEXT_LIMIT: usize = 10;

/// A local library track resolved from a suggestion
#[derive(Debug, Clone)]
pub struct LibraryTrack {
    pub id: i64,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub file_path: String,
}

/// Source of track suggestions, usually an LLM
pub trait SuggestionService: Send + Sync {
    fn suggest(
        &self,
        prompt: &str,
    ) -> impl std::future::Future<Output = WorkerResult<Vec<SuggestedTrack>>> + Send;
}

impl SuggestionService for OllamaClient {
    async fn suggest(&self, prompt: &str) -> WorkerResult<Vec<SuggestedTrack>> {
        Ok(self.suggest_tracks(prompt).await?)
    }
}

/// Lookup of suggested tracks in the local library
pub trait LibrarySearch: Send + Sync {
    fn find_track(
        &self,
        title: &str,
        artist: &str,
    ) -> impl std::future::Future<Output = WorkerResult<Option<LibraryTrack>>> + Send;
}

/// Library lookup backed by the tracks table
pub struct DbLibrarySearch {
    pool: SqlitePool,
}

impl DbLibrarySearch {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl LibrarySearch for DbLibrarySearch {
    async fn find_track(&self, title: &str, artist: &str) -> WorkerResult<Option<LibraryTrack>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, artist, album, file_path FROM tracks
            WHERE LOWER(title) = LOWER(?)
              AND LOWER(COALESCE(artist, '')) = LOWER(?)
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(title)
        .bind(artist)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| LibraryTrack {
            id: row.get("id"),
            title: row.get("title"),
            artist: row.get("artist"),
            album: row.get("album"),
            file_path: row.get("file_path"),
        }))
    }
}

/// Tunables for one generation run
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    /// Desired playlist length, seed excluded
    pub target_length: usize,
    /// Maximum suggestion rounds
    pub round_budget: u32,
    /// Suggestions requested per round
    pub batch_size: u32,
    /// Acceptance threshold on normalized weighted distance
    pub distance_threshold: f64,
    /// Per-dimension distance weights
    pub weights: [f64; NUM_FEATURES],
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            target_length: 20,
            round_budget: 10,
            batch_size: 5,
            distance_threshold: 0.5,
            weights: DEFAULT_WEIGHTS,
        }
    }
}

pub struct PlaylistGenerator<S, L> {
    pool: SqlitePool,
    store: Arc<FeatureStore>,
    suggester: S,
    library: L,
    settings: GenerationSettings,
}

impl<S: SuggestionService, L: LibrarySearch> PlaylistGenerator<S, L> {
    pub fn new(
        pool: SqlitePool,
        store: Arc<FeatureStore>,
        suggester: S,
        library: L,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            pool,
            store,
            suggester,
            library,
            settings,
        }
    }

    /// Run the feedback loop for one job
    ///
    /// Moves the job to a terminal state before returning. Returns the
    /// accepted entries, which may be shorter than the target if the round
    /// budget ran out or the job was stopped.
    pub async fn run(
        &self,
        seed_track_id: i64,
        job: &GenerationJob,
    ) -> WorkerResult<Vec<PlaylistEntry>> {
        let outcome = self.run_inner(seed_track_id, job).await;

        match &outcome {
            Ok(entries) => {
                if job.is_cancelled() {
                    job.set_status(JobStatus::Stopped);
                } else {
                    job.set_status(JobStatus::Completed);
                }
                info!(
                    job = %job.id(),
                    accepted = entries.len(),
                    status = ?job.status(),
                    "Generation finished"
                );
            }
            Err(e) => {
                job.fail(e.to_string());
            }
        }

        outcome
    }

    async fn run_inner(
        &self,
        seed_track_id: i64,
        job: &GenerationJob,
    ) -> WorkerResult<Vec<PlaylistEntry>> {
        let seed = self.load_seed(seed_track_id).await?;
        let seed_vector = self
            .store
            .get_vector(seed_track_id)
            .await?
            .ok_or_else(|| {
                WorkerError::SeedUnavailable(format!(
                    "track {} has not been analyzed yet",
                    seed_track_id
                ))
            })?;
        let stats = self.store.corpus_stats().await?;

        let mut accepted: Vec<PlaylistEntry> = Vec::new();
        let mut rejected: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(dedup_key(&seed.title, seed.artist.as_deref().unwrap_or("")));

        let mut rounds_used = 0;
        for round in 1..=self.settings.round_budget {
            if job.is_cancelled() {
                debug!(job = %job.id(), "Generation cancelled");
                break;
            }
            rounds_used = round;

            let prompt = self.build_prompt(&seed, &accepted, &rejected);
            let suggestions = match self.suggester.suggest(&prompt).await {
                Ok(suggestions) => suggestions,
                Err(e) => {
                    // A bad round costs budget but doesn't kill the job
                    warn!(job = %job.id(), round, error = %e, "Suggestion round failed");
                    job.update_progress(round, accepted.len(), rejected.len());
                    continue;
                }
            };

            for suggestion in suggestions {
                if accepted.len() >= self.settings.target_length {
                    break;
                }
                self.consider(
                    &suggestion,
                    &seed_vector,
                    &stats,
                    &mut accepted,
                    &mut rejected,
                    &mut seen,
                )
                .await?;
            }

            job.update_progress(round, accepted.len(), rejected.len());

            if accepted.len() >= self.settings.target_length {
                break;
            }
        }

        job.update_progress(rounds_used, accepted.len(), rejected.len());

        if accepted.is_empty() && !job.is_cancelled() {
            warn!(
                seed = seed_track_id,
                rounds = rounds_used,
                "No suggestions accepted, generation failed"
            );
            return Err(WorkerError::EmptyPlaylist);
        }

        Ok(accepted)
    }

    /// Evaluate one suggestion against the library and the seed
    async fn consider(
        &self,
        suggestion: &SuggestedTrack,
        seed_vector: &FeatureVector,
        stats: &CorpusStats,
        accepted: &mut Vec<PlaylistEntry>,
        rejected: &mut Vec<String>,
        seen: &mut HashSet<String>,
    ) -> WorkerResult<()> {
        let label = format!("{} - {}", suggestion.artist, suggestion.title);
        let key = dedup_key(&suggestion.title, &suggestion.artist);

        if !seen.insert(key.clone()) {
            debug!(track = %label, "Duplicate suggestion ignored");
            return Ok(());
        }

        let found = match self
            .library
            .find_track(&suggestion.title, &suggestion.artist)
            .await
        {
            Ok(found) => found,
            Err(e) => {
                // The suggestion stays eligible for a later round
                warn!(track = %label, error = %e, "Library search failed, skipping suggestion");
                seen.remove(&key);
                return Ok(());
            }
        };

        let Some(track) = found else {
            debug!(track = %label, "Suggestion not in library");
            rejected.push(label);
            return Ok(());
        };

        let Some(vector) = self.store.get_vector(track.id).await? else {
            debug!(track = %label, "Suggestion not yet analyzed");
            rejected.push(label);
            return Ok(());
        };

        let distance =
            similarity::similarity_distance(seed_vector, &vector, stats, &self.settings.weights);

        if distance <= self.settings.distance_threshold {
            debug!(track = %label, distance, "Accepted suggestion");
            accepted.push(PlaylistEntry {
                track_id: track.id,
                title: track.title,
                artist: track.artist,
                album: track.album,
                file_path: track.file_path,
                distance,
            });
        } else {
            debug!(track = %label, distance, "Rejected suggestion, too far from seed");
            rejected.push(label);
        }

        Ok(())
    }

    async fn load_seed(&self, track_id: i64) -> WorkerResult<LibraryTrack> {
        let row = sqlx::query("SELECT id, title, artist, album, file_path FROM tracks WHERE id = ?")
            .bind(track_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| LibraryTrack {
            id: row.get("id"),
            title: row.get("title"),
            artist: row.get("artist"),
            album: row.get("album"),
            file_path: row.get("file_path"),
        })
        .ok_or_else(|| WorkerError::SeedUnavailable(format!("track {} not found", track_id)))
    }

    /// Build one round's prompt with positive and negative context
    ///
    /// The random nonce keeps the model from returning identical batches
    /// when the rest of the prompt repeats across rounds.
    fn build_prompt(
        &self,
        seed: &LibraryTrack,
        accepted: &[PlaylistEntry],
        rejected: &[String],
    ) -> String {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();

        let remaining = self.settings.target_length.saturating_sub(accepted.len());
        let batch = (self.settings.batch_size as usize).min(remaining.max(1));

        let mut prompt = format!(
            "Suggest {} songs similar to \"{}\" by {}. \
             Only suggest real, well-known songs. Respond with JSON.\n",
            batch,
            seed.title,
            seed.artist.as_deref().unwrap_or("an unknown artist"),
        );

        if !accepted.is_empty() {
            prompt.push_str("\nAlready in the playlist (suggest songs that fit alongside these):\n");
            for entry in accepted.iter().rev().take(PROMPT_CONTEXT_LIMIT) {
                prompt.push_str(&format!(
                    "- {} - {}\n",
                    entry.artist.as_deref().unwrap_or("Unknown"),
                    entry.title
                ));
            }
        }

        if !rejected.is_empty() {
            prompt.push_str("\nDo not suggest these again:\n");
            for label in rejected.iter().rev().take(PROMPT_CONTEXT_LIMIT) {
                prompt.push_str(&format!("- {}\n", label));
            }
        }

        prompt.push_str(&format!("\nSession: {}\n", nonce));
        prompt
    }
}

fn dedup_key(title: &str, artist: &str) -> String {
    format!("{}|{}", title.trim().to_lowercase(), artist.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_key_normalizes_case_and_whitespace() {
        assert_eq!(
            dedup_key("Teardrop ", "Massive Attack"),
            dedup_key("teardrop", " MASSIVE ATTACK")
        );
        assert_ne!(dedup_key("Teardrop", "A"), dedup_key("Teardrop", "B"));
    }

    #[test]
    fn test_default_settings() {
        let settings = GenerationSettings::default();
        assert_eq!(settings.target_length, 20);
        assert_eq!(settings.round_budget, 10);
        assert!((settings.distance_threshold - 0.5).abs() < f64::EPSILON);
    }
}
