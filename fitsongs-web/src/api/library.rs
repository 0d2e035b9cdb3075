//! Library view handlers: cache listing and filter options

use axum::{extract::State, routing::get, Json, Router};

use fitsongs_common::db::cache;
use fitsongs_common::model::{CacheEntry, FilterOptions};

use crate::error::ApiResult;
use crate::AppState;

pub fn library_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_cache))
        .route("/filter-options", get(filter_options))
}

/// GET / - full cache listing, newest first, with duration buckets.
async fn list_cache(State(state): State<AppState>) -> ApiResult<Json<Vec<CacheEntry>>> {
    let entries = cache::list_entries(&state.db).await?;
    Ok(Json(entries))
}

/// GET /filter-options - distinct trainers, genres, categories and buckets.
async fn filter_options(State(state): State<AppState>) -> ApiResult<Json<FilterOptions>> {
    let options = cache::filter_options(&state.db).await?;
    Ok(Json(options))
}
