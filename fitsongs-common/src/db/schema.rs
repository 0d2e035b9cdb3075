//! Schema definition, introspection and migration for the workout cache
//!
//! The schema is additive-only at runtime. On startup there are three
//! outcomes: create the table from scratch, migrate a legacy table whose
//! column set has fallen behind, or sweep a matching table for rows missing
//! a canonical URL. Migration rewrites the whole table and flags every
//! pre-existing row `needs_update`: rows written before canonicalization
//! existed cannot be trusted to carry a correct identity.

use sqlx::{Row, SqlitePool};

use crate::canon::strip_query;
use crate::error::Result;

/// Cache table name
pub const TABLE: &str = "workout_cache";

/// Target schema, in column order. `canonical_url` is the primary identity.
const EXPECTED_COLUMNS: &[(&str, &str)] = &[
    ("canonical_url", "TEXT PRIMARY KEY"),
    ("original_url", "TEXT"),
    ("title", "TEXT"),
    ("trainer", "TEXT"),
    ("duration", "TEXT"),
    ("genre", "TEXT"),
    ("episode", "TEXT"),
    ("workout_type", "TEXT"),
    ("workout_category", "TEXT"),
    ("date", "TEXT"),
    ("datetime", "TEXT"),
    ("songs_json", "TEXT"),
    ("needs_update", "BOOLEAN DEFAULT 0"),
    ("cached_at", "TIMESTAMP DEFAULT CURRENT_TIMESTAMP"),
];

/// Outcome of `ensure_schema`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Table did not exist and was created fresh
    pub created: bool,
    /// Legacy rows carried across a table rewrite
    pub rows_migrated: usize,
    /// Rows flagged `needs_update` (by migration or the consistency sweep)
    pub rows_flagged_stale: usize,
}

/// One column from `PRAGMA table_info`
#[derive(Debug, Clone)]
struct ActualColumn {
    name: String,
    pk: bool,
}

async fn introspect(pool: &SqlitePool) -> Result<Vec<ActualColumn>> {
    let query = format!("PRAGMA table_info({})", TABLE);
    let rows = sqlx::query(&query).fetch_all(pool).await?;

    Ok(rows
        .iter()
        .map(|row| ActualColumn {
            name: row.get("name"),
            pk: row.get::<i32, _>("pk") != 0,
        })
        .collect())
}

/// Column names of the persisted cache table, in table order.
pub async fn table_columns(pool: &SqlitePool) -> Result<Vec<String>> {
    Ok(introspect(pool).await?.into_iter().map(|c| c.name).collect())
}

fn schema_matches(actual: &[ActualColumn]) -> bool {
    let has_all = EXPECTED_COLUMNS
        .iter()
        .all(|(name, _)| actual.iter().any(|c| c.name == *name));
    let canonical_is_pk = actual
        .iter()
        .any(|c| c.name == "canonical_url" && c.pk);
    has_all && canonical_is_pk
}

fn create_table_sql() -> String {
    let columns: Vec<String> = EXPECTED_COLUMNS
        .iter()
        .map(|(name, decl)| format!("{} {}", name, decl))
        .collect();
    format!("CREATE TABLE {} ({})", TABLE, columns.join(", "))
}

/// Compare the persisted column set against the target schema and reconcile.
///
/// Called on every store initialization. Returns a report instead of logging
/// so each surface can present the outcome its own way.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<MigrationReport> {
    let actual = introspect(pool).await?;

    if actual.is_empty() {
        sqlx::query(&create_table_sql()).execute(pool).await?;
        return Ok(MigrationReport {
            created: true,
            ..Default::default()
        });
    }

    if !schema_matches(&actual) {
        return migrate(pool, &actual).await;
    }

    // Self-healing sweep: a row without a canonical URL predates
    // canonicalization and must not be served as a hit.
    let flagged = sqlx::query(&format!(
        "UPDATE {} SET needs_update = 1 WHERE canonical_url IS NULL AND needs_update = 0",
        TABLE
    ))
    .execute(pool)
    .await?
    .rows_affected();

    Ok(MigrationReport {
        rows_flagged_stale: flagged as usize,
        ..Default::default()
    })
}

/// Full-table rewrite into the target schema.
///
/// Every legacy row survives: the first legacy column whose name contains
/// `url` stands in as `original_url` (query-stripped), same-named columns are
/// carried over, `canonical_url` is left unset and `needs_update` forced on.
async fn migrate(pool: &SqlitePool, actual: &[ActualColumn]) -> Result<MigrationReport> {
    tracing::warn!("Cache schema out of date; rewriting table and preserving rows");

    let existing = sqlx::query(&format!("SELECT * FROM {}", TABLE))
        .fetch_all(pool)
        .await?;

    let url_column = actual
        .iter()
        .map(|c| c.name.as_str())
        .find(|name| name.to_ascii_lowercase().contains("url"))
        .map(str::to_string);

    sqlx::query(&format!("DROP TABLE {}", TABLE))
        .execute(pool)
        .await?;
    sqlx::query(&create_table_sql()).execute(pool).await?;

    let mut rows_migrated = 0usize;
    for row in &existing {
        let mut columns: Vec<&str> = vec!["needs_update"];
        let mut values: Vec<Option<String>> = Vec::new();

        let original_url = url_column
            .as_deref()
            .and_then(|col| read_text(row, col))
            .map(|u| strip_query(&u).to_string());
        if let Some(url) = original_url {
            columns.push("original_url");
            values.push(Some(url));
        }

        for (name, _) in EXPECTED_COLUMNS {
            if matches!(*name, "canonical_url" | "original_url" | "needs_update") {
                continue;
            }
            if actual.iter().any(|c| c.name == *name) {
                columns.push(name);
                values.push(read_text(row, name));
            }
        }

        // needs_update is a literal; everything else binds in column order.
        let placeholders: Vec<&str> = std::iter::once("1")
            .chain(values.iter().map(|_| "?"))
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            TABLE,
            columns.join(", "),
            placeholders.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for value in values {
            query = query.bind(value);
        }
        query.execute(pool).await?;
        rows_migrated += 1;
    }

    Ok(MigrationReport {
        created: false,
        rows_migrated,
        rows_flagged_stale: rows_migrated,
    })
}

/// Best-effort text read of a dynamically-typed legacy column.
fn read_text(row: &sqlx::sqlite::SqliteRow, column: &str) -> Option<String> {
    row.try_get::<Option<String>, _>(column).ok().flatten()
}
