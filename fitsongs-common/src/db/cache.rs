//! Workout cache operations
//!
//! Lookup centralizes the staleness rule: a row flagged `needs_update`, or
//! one with no song data, is a miss no matter who asks. Store collapses
//! duplicates with delete-then-insert under both keys.

use std::collections::BTreeSet;

use sqlx::{Row, SqlitePool};

use crate::canon::{duration_bucket, strip_query, workout_category};
use crate::error::{Error, Result};
use crate::model::{CacheEntry, FilterOptions, Song, WorkoutMetadata, WorkoutResult};

use super::schema::TABLE;

/// Look up a cached workout by any surface form of its URL.
///
/// Strips query parameters, matches `canonical_url` or `original_url`, and
/// treats stale or song-less rows as misses.
pub async fn lookup(pool: &SqlitePool, url: &str) -> Result<Option<WorkoutResult>> {
    let cleaned = strip_query(url);

    let row = sqlx::query(&format!(
        r#"
        SELECT title, trainer, duration, genre, episode, workout_type,
               workout_category, date, datetime, songs_json, needs_update,
               canonical_url
        FROM {}
        WHERE canonical_url = ? OR original_url = ?
        "#,
        TABLE
    ))
    .bind(cleaned)
    .bind(cleaned)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let needs_update: bool = row.get("needs_update");
    let songs_json: Option<String> = row.get("songs_json");

    let songs = match songs_json.as_deref() {
        Some(json) if !json.is_empty() => parse_songs(json)?,
        _ => Vec::new(),
    };
    if needs_update || songs.is_empty() {
        return Ok(None);
    }

    Ok(Some(WorkoutResult {
        metadata: metadata_from_row(&row),
        songs,
        canonical_url: row.get("canonical_url"),
        from_cache: true,
    }))
}

/// Write through a successful extraction under both keys.
///
/// Deletes any row matching the canonical or the query-stripped original URL
/// first, so repeated stores for the same logical workout leave exactly one
/// row. The category is derived from the canonical URL here.
pub async fn store(
    pool: &SqlitePool,
    original_url: &str,
    canonical_url: &str,
    metadata: &WorkoutMetadata,
    songs: &[Song],
) -> Result<()> {
    let cleaned_original = strip_query(original_url);
    let category = workout_category(canonical_url);
    let songs_json = serde_json::to_string(songs)
        .map_err(|e| Error::Internal(format!("Failed to serialize songs: {}", e)))?;

    let mut tx = pool.begin().await?;

    sqlx::query(&format!(
        "DELETE FROM {} WHERE canonical_url = ? OR original_url = ?",
        TABLE
    ))
    .bind(canonical_url)
    .bind(cleaned_original)
    .execute(&mut *tx)
    .await?;

    sqlx::query(&format!(
        r#"
        INSERT INTO {}
            (canonical_url, original_url, title, trainer, duration, genre,
             episode, workout_type, workout_category, date, datetime,
             songs_json, needs_update)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
        "#,
        TABLE
    ))
    .bind(canonical_url)
    .bind(cleaned_original)
    .bind(&metadata.title)
    .bind(&metadata.trainer)
    .bind(&metadata.duration)
    .bind(&metadata.genre)
    .bind(&metadata.episode)
    .bind(&metadata.workout_type)
    .bind(&category)
    .bind(&metadata.date)
    .bind(&metadata.datetime)
    .bind(&songs_json)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::debug!(canonical_url = %canonical_url, songs = songs.len(), "cached workout");
    Ok(())
}

/// Count and list every row pending re-validation.
///
/// Prefers the original input URL for re-scraping; falls back to the
/// canonical URL.
pub async fn stale_entries(pool: &SqlitePool) -> Result<(usize, Vec<String>)> {
    let urls: Vec<String> = sqlx::query_scalar(&format!(
        r#"
        SELECT COALESCE(original_url, canonical_url) FROM {}
        WHERE needs_update = 1
          AND (original_url IS NOT NULL OR canonical_url IS NOT NULL)
        "#,
        TABLE
    ))
    .fetch_all(pool)
    .await?;

    Ok((urls.len(), urls))
}

/// Mark every valid row as needing update. Returns the number flipped.
pub async fn invalidate_all(pool: &SqlitePool) -> Result<usize> {
    let flipped = sqlx::query(&format!(
        "UPDATE {} SET needs_update = 1 WHERE needs_update = 0",
        TABLE
    ))
    .execute(pool)
    .await?
    .rows_affected();

    Ok(flipped as usize)
}

/// Outcome of a deduplication pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupeReport {
    /// Logical URLs that had more than one row
    pub duplicate_groups: usize,
    /// Rows deleted
    pub rows_deleted: usize,
}

/// Collapse duplicate rows down to one per logical URL.
///
/// Groups by `COALESCE(canonical_url, original_url)` and keeps the best row
/// of each group: canonical identity present, then most recently cached,
/// then category present. Idempotent; re-running on a clean table is a no-op.
pub async fn dedupe(pool: &SqlitePool) -> Result<DedupeReport> {
    let duplicated: Vec<String> = sqlx::query_scalar(&format!(
        r#"
        SELECT url FROM (
            SELECT COALESCE(canonical_url, original_url) AS url FROM {}
        )
        WHERE url IS NOT NULL
        GROUP BY url
        HAVING COUNT(*) > 1
        "#,
        TABLE
    ))
    .fetch_all(pool)
    .await?;

    let mut report = DedupeReport {
        duplicate_groups: duplicated.len(),
        ..Default::default()
    };

    for url in &duplicated {
        let rowids: Vec<i64> = sqlx::query_scalar(&format!(
            r#"
            SELECT rowid FROM {}
            WHERE canonical_url = ? OR original_url = ?
            ORDER BY
                (canonical_url IS NOT NULL) DESC,
                cached_at DESC,
                (workout_category IS NOT NULL) DESC
            "#,
            TABLE
        ))
        .bind(url)
        .bind(url)
        .fetch_all(pool)
        .await?;

        for &rowid in rowids.iter().skip(1) {
            sqlx::query(&format!("DELETE FROM {} WHERE rowid = ?", TABLE))
                .bind(rowid)
                .execute(pool)
                .await?;
            report.rows_deleted += 1;
        }
    }

    Ok(report)
}

/// Row counts backing the health diagnostic
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total: usize,
    /// Rows flagged `needs_update`
    pub stale: usize,
    /// Rows carrying a canonical identity
    pub with_canonical: usize,
    /// Logical URLs with more than one row
    pub duplicate_groups: usize,
}

/// Count rows along the dimensions the health report cares about.
pub async fn stats(pool: &SqlitePool) -> Result<CacheStats> {
    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", TABLE))
        .fetch_one(pool)
        .await?;
    let stale: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} WHERE needs_update = 1",
        TABLE
    ))
    .fetch_one(pool)
    .await?;
    let with_canonical: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} WHERE canonical_url IS NOT NULL",
        TABLE
    ))
    .fetch_one(pool)
    .await?;
    let duplicate_groups: i64 = sqlx::query_scalar(&format!(
        r#"
        SELECT COUNT(*) FROM (
            SELECT url FROM (
                SELECT COALESCE(canonical_url, original_url) AS url FROM {}
            )
            WHERE url IS NOT NULL
            GROUP BY url
            HAVING COUNT(*) > 1
        )
        "#,
        TABLE
    ))
    .fetch_one(pool)
    .await?;

    Ok(CacheStats {
        total: total as usize,
        stale: stale as usize,
        with_canonical: with_canonical as usize,
        duplicate_groups: duplicate_groups as usize,
    })
}

/// Full cache listing, newest first, annotated with duration buckets.
pub async fn list_entries(pool: &SqlitePool) -> Result<Vec<CacheEntry>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT COALESCE(canonical_url, original_url) AS display_url,
               original_url, canonical_url, title, trainer, duration, genre,
               episode, workout_type, workout_category, date, datetime,
               cached_at, songs_json, needs_update
        FROM {}
        ORDER BY cached_at DESC
        "#,
        TABLE
    ))
    .fetch_all(pool)
    .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let songs_json: Option<String> = row.get("songs_json");
        let songs = match songs_json.as_deref() {
            Some(json) if !json.is_empty() => parse_songs(json)?,
            _ => Vec::new(),
        };

        let duration: Option<String> = row.get("duration");
        let title: Option<String> = row.get("title");

        entries.push(CacheEntry {
            url: row
                .get::<Option<String>, _>("display_url")
                .unwrap_or_default(),
            original_url: row.get("original_url"),
            canonical_url: row.get("canonical_url"),
            title: title.unwrap_or_else(|| "Unknown Workout".to_string()),
            trainer: row.get("trainer"),
            duration_bucket: duration.as_deref().and_then(duration_bucket),
            duration,
            genre: row.get("genre"),
            episode: row.get("episode"),
            workout_type: row.get("workout_type"),
            workout_category: row.get("workout_category"),
            date: row.get("date"),
            datetime: row.get("datetime"),
            cached_at: row.get("cached_at"),
            song_count: songs.len(),
            songs,
            needs_update: row.get("needs_update"),
        });
    }

    Ok(entries)
}

/// Distinct trainers, genres, categories and duration buckets in the cache.
pub async fn filter_options(pool: &SqlitePool) -> Result<FilterOptions> {
    let trainers = distinct(pool, "trainer").await?;
    let genres = distinct(pool, "genre").await?;
    let workout_categories = distinct(pool, "workout_category").await?;

    let durations_raw: Vec<String> = sqlx::query_scalar(&format!(
        "SELECT DISTINCT duration FROM {} WHERE duration IS NOT NULL",
        TABLE
    ))
    .fetch_all(pool)
    .await?;

    let buckets: BTreeSet<u32> = durations_raw
        .iter()
        .filter_map(|d| duration_bucket(d))
        .collect();

    Ok(FilterOptions {
        trainers,
        genres,
        workout_categories,
        durations: buckets.into_iter().collect(),
    })
}

async fn distinct(pool: &SqlitePool, column: &str) -> Result<Vec<String>> {
    let values = sqlx::query_scalar(&format!(
        "SELECT DISTINCT {col} FROM {} WHERE {col} IS NOT NULL ORDER BY {col}",
        TABLE,
        col = column
    ))
    .fetch_all(pool)
    .await?;
    Ok(values)
}

fn parse_songs(json: &str) -> Result<Vec<Song>> {
    serde_json::from_str(json)
        .map_err(|e| Error::Internal(format!("Failed to deserialize songs: {}", e)))
}

fn metadata_from_row(row: &sqlx::sqlite::SqliteRow) -> WorkoutMetadata {
    WorkoutMetadata {
        title: row.get("title"),
        trainer: row.get("trainer"),
        duration: row.get("duration"),
        genre: row.get("genre"),
        episode: row.get("episode"),
        workout_type: row.get("workout_type"),
        workout_category: row.get("workout_category"),
        date: row.get("date"),
        datetime: row.get("datetime"),
    }
}
