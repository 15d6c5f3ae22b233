//! Feature vectors, normalization, and weighted similarity
//!
//! Pure functions over the eight-dimensional feature space. Normalization is
//! corpus-relative min/max scaling; distance is weighted Euclidean over the
//! normalized space. Ranking is deterministic with ties keeping input order.

use serde::{Deserialize, Serialize};

/// Number of feature dimensions
pub const NUM_FEATURES: usize = 8;

/// Canonical feature order used everywhere arrays are indexed
pub const FEATURE_ORDER: [&str; NUM_FEATURES] = [
    "energy",
    "valence",
    "danceability",
    "tempo",
    "acousticness",
    "instrumentalness",
    "loudness",
    "speechiness",
];

/// Default per-dimension weights, aligned with [`FEATURE_ORDER`]
///
/// Energy, valence, and danceability dominate; speechiness barely matters.
pub const DEFAULT_WEIGHTS: [f64; NUM_FEATURES] = [1.0, 1.0, 1.0, 0.5, 0.5, 0.3, 0.3, 0.2];

/// One track's position in feature space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub energy: f64,
    pub valence: f64,
    pub danceability: f64,
    /// Tempo in BPM, the only unbounded-above dimension
    pub tempo: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    /// Loudness in dBFS, -60.0 to 0.0
    pub loudness: f64,
    pub speechiness: f64,
}

impl FeatureVector {
    /// View as an array in [`FEATURE_ORDER`]
    pub fn to_array(&self) -> [f64; NUM_FEATURES] {
        [
            self.energy,
            self.valence,
            self.danceability,
            self.tempo,
            self.acousticness,
            self.instrumentalness,
            self.loudness,
            self.speechiness,
        ]
    }

    /// Build from an array in [`FEATURE_ORDER`]
    pub fn from_array(values: [f64; NUM_FEATURES]) -> Self {
        Self {
            energy: values[0],
            valence: values[1],
            danceability: values[2],
            tempo: values[3],
            acousticness: values[4],
            instrumentalness: values[5],
            loudness: values[6],
            speechiness: values[7],
        }
    }
}

/// Per-dimension min/max over the analyzed corpus
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorpusStats {
    pub min: [f64; NUM_FEATURES],
    pub max: [f64; NUM_FEATURES],
}

impl CorpusStats {
    /// Compute stats over a set of vectors
    ///
    /// Returns `None` for an empty corpus.
    pub fn from_vectors<'a, I>(vectors: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a FeatureVector>,
    {
        let mut iter = vectors.into_iter();
        let first = iter.next()?.to_array();
        let mut min = first;
        let mut max = first;

        for vector in iter {
            let values = vector.to_array();
            for i in 0..NUM_FEATURES {
                min[i] = min[i].min(values[i]);
                max[i] = max[i].max(values[i]);
            }
        }

        Some(Self { min, max })
    }
}

/// Scale a vector into [0, 1] per dimension against corpus stats
///
/// Values outside the observed range are clamped first. A dimension with
/// zero spread maps to 0.5 so it contributes nothing to any distance.
pub fn normalize(vector: &FeatureVector, stats: &CorpusStats) -> [f64; NUM_FEATURES] {
    let values = vector.to_array();
    let mut normalized = [0.0; NUM_FEATURES];

    for i in 0..NUM_FEATURES {
        let spread = stats.max[i] - stats.min[i];
        normalized[i] = if spread <= f64::EPSILON {
            0.5
        } else {
            (values[i].clamp(stats.min[i], stats.max[i]) - stats.min[i]) / spread
        };
    }

    normalized
}

/// Weighted Euclidean distance between two normalized vectors
pub fn distance(a: &[f64; NUM_FEATURES], b: &[f64; NUM_FEATURES], weights: &[f64; NUM_FEATURES]) -> f64 {
    let sum: f64 = (0..NUM_FEATURES)
        .map(|i| {
            let delta = a[i] - b[i];
            weights[i] * delta * delta
        })
        .sum();
    sum.sqrt()
}

/// Distance from a seed to a candidate in raw feature space
pub fn similarity_distance(
    seed: &FeatureVector,
    candidate: &FeatureVector,
    stats: &CorpusStats,
    weights: &[f64; NUM_FEATURES],
) -> f64 {
    let seed_norm = normalize(seed, stats);
    let candidate_norm = normalize(candidate, stats);
    distance(&seed_norm, &candidate_norm, weights)
}

/// Rank candidates by ascending distance from the seed
///
/// The sort is stable, so equidistant candidates keep their input order.
pub fn rank(
    seed: &FeatureVector,
    candidates: &[(i64, FeatureVector)],
    stats: &CorpusStats,
    weights: &[f64; NUM_FEATURES],
) -> Vec<(i64, f64)> {
    let seed_norm = normalize(seed, stats);

    let mut ranked: Vec<(i64, f64)> = candidates
        .iter()
        .map(|(id, vector)| {
            let norm = normalize(vector, stats);
            (*id, distance(&seed_norm, &norm, weights))
        })
        .collect();

    ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    ranked
}
