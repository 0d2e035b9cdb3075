//! Fetch-and-extract pipeline
//!
//! Orchestrates one workout lookup end to end: cache first, then
//! canonicalize, fetch, extract, write through. Every call either returns a
//! complete result from the cache or a live fetch, or a miss; the cache is
//! never partially mutated.

use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::canon;
use crate::config::Config;
use crate::db;
use crate::error::Result;
use crate::extract::{DefaultExtractor, WorkoutExtractor};
use crate::fetch::{HttpFetcher, PageFetcher};
use crate::model::WorkoutResult;

/// Workout scraper: cache store + canonicalizer + fetcher + extractor.
pub struct Scraper {
    pool: SqlitePool,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn WorkoutExtractor>,
}

impl Scraper {
    /// Scraper with the live HTTP fetcher and the default extractor.
    pub fn new(pool: SqlitePool, config: &Config) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.fetch_timeout)?;
        Ok(Self::with_parts(
            pool,
            Arc::new(fetcher),
            Arc::new(DefaultExtractor),
        ))
    }

    /// Scraper with injected fetcher/extractor capabilities.
    pub fn with_parts(
        pool: SqlitePool,
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn WorkoutExtractor>,
    ) -> Self {
        Self {
            pool,
            fetcher,
            extractor,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Cache-only lookup, no network under any circumstances.
    pub async fn cached(&self, url: &str) -> Result<Option<WorkoutResult>> {
        db::cache::lookup(&self.pool, url).await
    }

    /// Resolve a workout URL to its playlist.
    ///
    /// Cache hits return immediately. On a miss the URL is canonicalized and
    /// the canonical page fetched; a failed fetch is a miss (`Ok(None)`, no
    /// retry here). A non-empty extraction is written through under both the
    /// original and canonical keys; an empty one is returned uncached, since
    /// it may reflect a markup change rather than a truly empty playlist.
    pub async fn get_workout_songs(&self, url: &str) -> Result<Option<WorkoutResult>> {
        let cleaned = canon::strip_query(url);

        if let Some(hit) = db::cache::lookup(&self.pool, cleaned).await? {
            info!(url = %cleaned, "using cached result");
            return Ok(Some(hit));
        }

        info!(url = %cleaned, "cache miss; fetching from origin");

        let canonical = canon::canonicalize(self.fetcher.as_ref(), cleaned).await;
        info!(canonical_url = %canonical, "resolved canonical URL");

        let page = match self.fetcher.fetch(&canonical).await {
            Ok(page) => page,
            Err(e) => {
                warn!(url = %canonical, error = %e, "page fetch failed");
                return Ok(None);
            }
        };

        let mut data = self.extractor.extract(&page.body);

        if data.songs.is_empty() {
            // Not trusted as authoritative; do not cache.
            return Ok(Some(WorkoutResult {
                metadata: data.metadata,
                songs: Vec::new(),
                canonical_url: None,
                from_cache: false,
            }));
        }

        db::cache::store(&self.pool, cleaned, &canonical, &data.metadata, &data.songs).await?;

        data.metadata.workout_category = Some(canon::workout_category(&canonical));
        Ok(Some(WorkoutResult {
            metadata: data.metadata,
            songs: data.songs,
            canonical_url: Some(canonical),
            from_cache: false,
        }))
    }
}
