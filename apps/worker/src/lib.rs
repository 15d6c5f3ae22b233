//! TuneForge worker library
//!
//! Indexes a local music library, extracts audio features, and generates
//! playlists by combining LLM suggestions with feature-space similarity.

pub mod analysis;
pub mod config;
pub mod db;
pub mod dsp;
pub mod error;
pub mod export;
pub mod features;
pub mod generator;
pub mod jobs;
pub mod queue;
pub mod scanner;
pub mod similarity;
pub mod store;
