//! Shared test helpers: in-memory pools, a programmable fetcher, and
//! worker polling utilities.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use fitsongs_common::db::ensure_schema;
use fitsongs_common::error::{Error, Result};
use fitsongs_common::extract::DefaultExtractor;
use fitsongs_common::fetch::{FetchedPage, PageFetcher};
use fitsongs_common::pipeline::Scraper;
use fitsongs_web::worker::JobRunner;

/// Minimal page yielding one song through the markup fallback.
pub const SONG_PAGE: &str = r#"
    <h1 class="t-intro-elevated">Cycling with Emily</h1>
    <figure class="song-lockup">
      <a class="song-lockup__song-name" href="https://music.apple.com/song/1">First Song</a>
      <div class="song-lockup__artist-name">First Artist</div>
    </figure>"#;

pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    ensure_schema(&pool).await.unwrap();
    pool
}

/// Fetcher serving canned bodies per URL; unknown or failed URLs error.
#[derive(Default)]
pub struct MapFetcher {
    pages: HashMap<String, Option<String>>,
    delay: Duration,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    pub fn serve(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), Some(body.to_string()));
        self
    }

    /// Fail every fetch of `url`.
    pub fn fail(mut self, url: &str) -> Self {
        self.pages.insert(url.to_string(), None);
        self
    }

    /// Delay every fetch, to keep a job observably in-flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl PageFetcher for MapFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.pages.get(url) {
            Some(Some(body)) => Ok(FetchedPage {
                final_url: url.to_string(),
                body: body.clone(),
            }),
            _ => Err(Error::Internal(format!("stub fetch failure for {}", url))),
        }
    }
}

pub fn scraper_with(pool: SqlitePool, fetcher: MapFetcher) -> Arc<Scraper> {
    Arc::new(Scraper::with_parts(
        pool,
        Arc::new(fetcher),
        Arc::new(DefaultExtractor),
    ))
}

/// Poll until the worker reports a finished job, with a hard timeout.
pub async fn wait_until_idle(runner: &JobRunner) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let status = runner.status();
            if status.job_id.is_some() && !status.is_processing {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("worker did not finish in time");
}

/// Poll until the worker reports an in-flight job.
pub async fn wait_until_processing(runner: &JobRunner) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if runner.is_processing() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("worker did not start in time");
}
