//! Cache store and pipeline integration tests
//!
//! All tests run against single-connection in-memory SQLite pools, except
//! the init test which exercises a file-backed database.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use fitsongs_common::db::{self, cache, ensure_schema};
use fitsongs_common::error::{Error, Result};
use fitsongs_common::extract::DefaultExtractor;
use fitsongs_common::fetch::{FetchedPage, PageFetcher};
use fitsongs_common::model::{Song, WorkoutMetadata};
use fitsongs_common::pipeline::Scraper;

async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    ensure_schema(&pool).await.unwrap();
    pool
}

/// Pool with no schema applied, for migration scenarios.
async fn bare_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

fn sample_songs() -> Vec<Song> {
    vec![
        Song {
            title: "First Song".into(),
            artist: "First Artist".into(),
            apple_music_url: Some("https://music.apple.com/song/1".into()),
        },
        Song {
            title: "Second Song".into(),
            artist: "Second Artist".into(),
            apple_music_url: None,
        },
    ]
}

fn sample_metadata() -> WorkoutMetadata {
    WorkoutMetadata {
        title: Some("Cycling with Emily".into()),
        trainer: Some("Emily Fayette".into()),
        duration: Some("30min".into()),
        genre: Some("Upbeat Anthems".into()),
        ..Default::default()
    }
}

const CANONICAL: &str = "https://fitness.apple.com/us/workout/cycling-with-emily/1810544460";
const ORIGINAL: &str = "https://fitness.apple.com/de/workout/cycling-with-emily/1810544460";

// --- store / lookup ---------------------------------------------------------

#[tokio::test]
async fn store_then_lookup_round_trips() {
    let pool = memory_pool().await;
    cache::store(&pool, ORIGINAL, CANONICAL, &sample_metadata(), &sample_songs())
        .await
        .unwrap();

    // Hit through the original URL, even with tracking params attached.
    let hit = cache::lookup(&pool, &format!("{}?igndx=1", ORIGINAL))
        .await
        .unwrap()
        .expect("expected cache hit");

    assert!(hit.from_cache);
    assert_eq!(hit.canonical_url.as_deref(), Some(CANONICAL));
    assert_eq!(hit.songs, sample_songs());
    assert_eq!(hit.metadata.title.as_deref(), Some("Cycling with Emily"));
    // Category derived from the canonical URL at store time.
    assert_eq!(hit.metadata.workout_category.as_deref(), Some("Cycling"));

    // And through the canonical URL.
    assert!(cache::lookup(&pool, CANONICAL).await.unwrap().is_some());
}

#[tokio::test]
async fn stale_row_is_a_miss() {
    let pool = memory_pool().await;
    cache::store(&pool, ORIGINAL, CANONICAL, &sample_metadata(), &sample_songs())
        .await
        .unwrap();

    sqlx::query("UPDATE workout_cache SET needs_update = 1")
        .execute(&pool)
        .await
        .unwrap();

    assert!(cache::lookup(&pool, CANONICAL).await.unwrap().is_none());
}

#[tokio::test]
async fn row_without_songs_is_a_miss() {
    let pool = memory_pool().await;
    sqlx::query(
        "INSERT INTO workout_cache (canonical_url, original_url, songs_json, needs_update)
         VALUES (?, ?, '[]', 0)",
    )
    .bind(CANONICAL)
    .bind(ORIGINAL)
    .execute(&pool)
    .await
    .unwrap();

    assert!(cache::lookup(&pool, CANONICAL).await.unwrap().is_none());
}

#[tokio::test]
async fn store_collapses_duplicate_rows() {
    let pool = memory_pool().await;

    // Legacy row: no canonical identity, only the original URL.
    sqlx::query(
        "INSERT INTO workout_cache (original_url, needs_update) VALUES (?, 1)",
    )
    .bind(ORIGINAL)
    .execute(&pool)
    .await
    .unwrap();

    cache::store(&pool, ORIGINAL, CANONICAL, &sample_metadata(), &sample_songs())
        .await
        .unwrap();
    // Repeated store stays idempotent.
    cache::store(&pool, ORIGINAL, CANONICAL, &sample_metadata(), &sample_songs())
        .await
        .unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workout_cache")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

// --- stale listing / invalidation -------------------------------------------

#[tokio::test]
async fn stale_entries_prefer_original_url() {
    let pool = memory_pool().await;
    sqlx::query(
        "INSERT INTO workout_cache (canonical_url, original_url, needs_update)
         VALUES (?, ?, 1)",
    )
    .bind(CANONICAL)
    .bind(ORIGINAL)
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO workout_cache (canonical_url, needs_update) VALUES ('https://x/us/workout/a-with-b/1', 1)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let (count, urls) = cache::stale_entries(&pool).await.unwrap();
    assert_eq!(count, 2);
    assert!(urls.contains(&ORIGINAL.to_string()));
    assert!(urls.contains(&"https://x/us/workout/a-with-b/1".to_string()));
}

#[tokio::test]
async fn invalidate_all_flips_valid_rows() {
    let pool = memory_pool().await;
    cache::store(&pool, ORIGINAL, CANONICAL, &sample_metadata(), &sample_songs())
        .await
        .unwrap();

    assert_eq!(cache::invalidate_all(&pool).await.unwrap(), 1);
    // Second run is a no-op.
    assert_eq!(cache::invalidate_all(&pool).await.unwrap(), 0);
    assert!(cache::lookup(&pool, CANONICAL).await.unwrap().is_none());
}

// --- dedupe -----------------------------------------------------------------

#[tokio::test]
async fn dedupe_keeps_best_row_and_converges() {
    let pool = memory_pool().await;

    // Three rows for the same logical workout: one canonical + category,
    // one canonical without category, one legacy original-only.
    sqlx::query(
        "INSERT INTO workout_cache
             (canonical_url, original_url, workout_category, cached_at)
         VALUES (?, ?, 'Cycling', '2024-03-02 10:00:00')",
    )
    .bind(CANONICAL)
    .bind(ORIGINAL)
    .execute(&pool)
    .await
    .unwrap();
    // Same canonical key cannot repeat; a second surface form of the same
    // logical URL arrives as original_url-only rows.
    sqlx::query(
        "INSERT INTO workout_cache (original_url, cached_at)
         VALUES (?, '2024-03-01 10:00:00')",
    )
    .bind(CANONICAL)
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO workout_cache (original_url, cached_at)
         VALUES (?, '2024-02-01 10:00:00')",
    )
    .bind(CANONICAL)
    .execute(&pool)
    .await
    .unwrap();

    let report = cache::dedupe(&pool).await.unwrap();
    assert_eq!(report.duplicate_groups, 1);
    assert_eq!(report.rows_deleted, 2);

    let survivors: Vec<Option<String>> =
        sqlx::query_scalar("SELECT canonical_url FROM workout_cache")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(survivors.len(), 1);
    // The canonical-bearing row wins.
    assert_eq!(survivors[0].as_deref(), Some(CANONICAL));

    // Idempotent: a second pass finds nothing.
    let again = cache::dedupe(&pool).await.unwrap();
    assert_eq!(again, cache::DedupeReport::default());
}

// --- health -----------------------------------------------------------------

#[tokio::test]
async fn stats_count_rows_per_health_dimension() {
    let pool = memory_pool().await;

    // One valid canonical row, one stale legacy row, one duplicate of the
    // canonical row's logical URL.
    cache::store(&pool, ORIGINAL, CANONICAL, &sample_metadata(), &sample_songs())
        .await
        .unwrap();
    sqlx::query("INSERT INTO workout_cache (original_url, needs_update) VALUES ('https://a/b', 1)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO workout_cache (original_url, needs_update) VALUES (?, 0)")
        .bind(CANONICAL)
        .execute(&pool)
        .await
        .unwrap();

    let stats = cache::stats(&pool).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.stale, 1);
    assert_eq!(stats.with_canonical, 1);
    assert_eq!(stats.duplicate_groups, 1);

    // Empty table reports all zeroes.
    sqlx::query("DELETE FROM workout_cache")
        .execute(&pool)
        .await
        .unwrap();
    assert_eq!(cache::stats(&pool).await.unwrap(), cache::CacheStats::default());
}

#[tokio::test]
async fn table_columns_reflect_persisted_schema() {
    let pool = memory_pool().await;

    let columns = db::schema::table_columns(&pool).await.unwrap();
    assert_eq!(columns.first().map(String::as_str), Some("canonical_url"));
    assert!(columns.iter().any(|c| c == "needs_update"));
    assert!(columns.iter().any(|c| c == "cached_at"));
}

// --- schema migration -------------------------------------------------------

#[tokio::test]
async fn migration_preserves_row_count_and_flags_all_stale() {
    let pool = bare_pool().await;

    sqlx::query("CREATE TABLE workout_cache (url TEXT, title TEXT, trainer TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    for i in 0..3 {
        sqlx::query("INSERT INTO workout_cache (url, title, trainer) VALUES (?, ?, ?)")
            .bind(format!("https://fitness.apple.com/us/workout/x/{}?src=share", i))
            .bind(format!("Workout {}", i))
            .bind("Emily")
            .execute(&pool)
            .await
            .unwrap();
    }

    let report = ensure_schema(&pool).await.unwrap();
    assert!(!report.created);
    assert_eq!(report.rows_migrated, 3);
    assert_eq!(report.rows_flagged_stale, 3);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workout_cache")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 3);

    let stale: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM workout_cache WHERE needs_update = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(stale, 3);

    // The legacy `url` column became original_url, query-stripped; titles
    // survive; canonical identities are gone until re-validated.
    let originals: Vec<Option<String>> =
        sqlx::query_scalar("SELECT original_url FROM workout_cache ORDER BY original_url")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(
        originals[0].as_deref(),
        Some("https://fitness.apple.com/us/workout/x/0")
    );
    let canonicals: Vec<Option<String>> =
        sqlx::query_scalar("SELECT canonical_url FROM workout_cache")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert!(canonicals.iter().all(Option::is_none));

    // The migrated rows show up as pending updates.
    let (stale_count, _) = cache::stale_entries(&pool).await.unwrap();
    assert_eq!(stale_count, 3);
}

#[tokio::test]
async fn matching_schema_sweep_flags_rows_missing_canonical() {
    let pool = memory_pool().await;
    sqlx::query("INSERT INTO workout_cache (original_url, needs_update) VALUES ('https://a/b', 0)")
        .execute(&pool)
        .await
        .unwrap();

    let report = ensure_schema(&pool).await.unwrap();
    assert!(!report.created);
    assert_eq!(report.rows_migrated, 0);
    assert_eq!(report.rows_flagged_stale, 1);
}

#[tokio::test]
async fn init_pool_creates_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("cache.db");

    let pool = db::init_pool(&db_path).await.unwrap();
    cache::store(&pool, ORIGINAL, CANONICAL, &sample_metadata(), &sample_songs())
        .await
        .unwrap();
    drop(pool);

    assert!(db_path.exists());

    // Reopen: schema already matches, data intact.
    let pool = db::init_pool(&db_path).await.unwrap();
    assert!(cache::lookup(&pool, CANONICAL).await.unwrap().is_some());
}

// --- pipeline ---------------------------------------------------------------

const SONG_PAGE: &str = r#"
    <h1 class="t-intro-elevated">Cycling with Emily</h1>
    <figure class="song-lockup">
      <a class="song-lockup__song-name" href="https://music.apple.com/song/1">First Song</a>
      <div class="song-lockup__artist-name">First Artist</div>
    </figure>"#;

struct StubFetcher {
    body: Option<String>,
    calls: AtomicUsize,
}

impl StubFetcher {
    fn serving(body: &str) -> Self {
        Self {
            body: Some(body.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            body: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.body {
            Some(body) => Ok(FetchedPage {
                final_url: url.to_string(),
                body: body.clone(),
            }),
            None => Err(Error::Internal("stub fetch failure".into())),
        }
    }
}

fn scraper_with(pool: SqlitePool, fetcher: Arc<StubFetcher>) -> Scraper {
    Scraper::with_parts(pool, fetcher, Arc::new(DefaultExtractor))
}

#[tokio::test]
async fn pipeline_miss_fetches_and_caches() {
    let pool = memory_pool().await;
    let fetcher = Arc::new(StubFetcher::serving(SONG_PAGE));
    let scraper = scraper_with(pool.clone(), fetcher.clone());

    let result = scraper
        .get_workout_songs(&format!("{}?igndx=1", ORIGINAL))
        .await
        .unwrap()
        .expect("expected live result");

    assert!(!result.from_cache);
    assert_eq!(result.songs.len(), 1);
    // Locale-normalized before resolution; the stub echoes the request URL.
    assert_eq!(result.canonical_url.as_deref(), Some(CANONICAL));
    assert_eq!(result.metadata.workout_category.as_deref(), Some("Cycling"));

    // Second call is served from the cache, no further fetches.
    let calls_after_first = fetcher.call_count();
    let hit = scraper.get_workout_songs(ORIGINAL).await.unwrap().unwrap();
    assert!(hit.from_cache);
    assert_eq!(fetcher.call_count(), calls_after_first);
}

#[tokio::test]
async fn pipeline_cache_hit_never_touches_network() {
    let pool = memory_pool().await;
    cache::store(&pool, ORIGINAL, CANONICAL, &sample_metadata(), &sample_songs())
        .await
        .unwrap();

    let fetcher = Arc::new(StubFetcher::failing());
    let scraper = scraper_with(pool, fetcher.clone());

    let hit = scraper.get_workout_songs(ORIGINAL).await.unwrap().unwrap();
    assert!(hit.from_cache);
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn pipeline_fetch_failure_is_a_miss() {
    let pool = memory_pool().await;
    let scraper = scraper_with(pool, Arc::new(StubFetcher::failing()));

    assert!(scraper.get_workout_songs(ORIGINAL).await.unwrap().is_none());
}

#[tokio::test]
async fn pipeline_empty_extraction_is_not_cached() {
    let pool = memory_pool().await;
    let fetcher = Arc::new(StubFetcher::serving("<html><body>redesigned page</body></html>"));
    let scraper = scraper_with(pool.clone(), fetcher);

    let result = scraper
        .get_workout_songs(ORIGINAL)
        .await
        .unwrap()
        .expect("empty extraction still returns a result");
    assert!(result.songs.is_empty());
    assert!(result.canonical_url.is_none());

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workout_cache")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}
