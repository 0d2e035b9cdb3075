//! SQLite cache database
//!
//! One table, one row per canonical workout. Every operation opens
//! short-lived statements against the shared pool; there are no long-held
//! transactions, so concurrent foreground reads and background writes rely
//! on SQLite's own locking.

pub mod cache;
pub mod schema;

pub use schema::{ensure_schema, MigrationReport};

use std::path::Path;

use sqlx::SqlitePool;

use crate::error::Result;

/// Open (or create) the cache database and bring its schema up to date.
pub async fn init_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    let report = schema::ensure_schema(&pool).await?;
    if report.created {
        tracing::info!("Created new cache database");
    }
    if report.rows_migrated > 0 {
        tracing::info!(
            rows = report.rows_migrated,
            "Migrated legacy cache rows; all flagged for re-validation"
        );
    }
    if report.rows_flagged_stale > 0 {
        tracing::info!(
            rows = report.rows_flagged_stale,
            "Flagged rows missing a canonical URL for update"
        );
    }

    Ok(pool)
}
