//! Data types shared across the fitsongs crates

use serde::{Deserialize, Serialize};

/// One playlist entry extracted from a workout page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    /// Song title
    pub title: String,
    /// Artist display name
    pub artist: String,
    /// Apple Music link, when the page carried one
    pub apple_music_url: Option<String>,
}

/// Workout page metadata; every field is best-effort
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutMetadata {
    pub title: Option<String>,
    pub trainer: Option<String>,
    pub duration: Option<String>,
    pub genre: Option<String>,
    pub episode: Option<String>,
    pub workout_type: Option<String>,
    /// Derived from the canonical URL at store time, not extracted
    pub workout_category: Option<String>,
    pub date: Option<String>,
    pub datetime: Option<String>,
}

/// Extraction output: metadata plus the ordered playlist
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkoutData {
    pub metadata: WorkoutMetadata,
    pub songs: Vec<Song>,
}

/// Result of a pipeline call, from either the cache or a live fetch
#[derive(Debug, Clone, Serialize)]
pub struct WorkoutResult {
    pub metadata: WorkoutMetadata,
    pub songs: Vec<Song>,
    /// Resolved identity; None when a live extraction came back empty
    /// and was not cached
    pub canonical_url: Option<String>,
    /// True when served from the cache without touching the network
    pub from_cache: bool,
}

/// One row of the cache listing served by the web UI
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    /// Display URL: canonical when present, else the original input URL
    pub url: String,
    pub original_url: Option<String>,
    pub canonical_url: Option<String>,
    pub title: String,
    pub trainer: Option<String>,
    pub duration: Option<String>,
    /// Coarse duration class (5/10/20/30/45), None when unparseable
    pub duration_bucket: Option<u32>,
    pub genre: Option<String>,
    pub episode: Option<String>,
    pub workout_type: Option<String>,
    pub workout_category: Option<String>,
    pub date: Option<String>,
    pub datetime: Option<String>,
    pub cached_at: Option<String>,
    pub song_count: usize,
    pub songs: Vec<Song>,
    pub needs_update: bool,
}

/// Distinct values available for filtering the library view
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterOptions {
    pub trainers: Vec<String>,
    pub genres: Vec<String>,
    pub workout_categories: Vec<String>,
    pub durations: Vec<u32>,
}
