//! fitsongs-web - HTTP surface for the workout playlist cache
//!
//! Thin axum layer over the shared pipeline and cache store, plus the single
//! background scrape worker.

pub mod api;
pub mod error;
pub mod worker;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

use crate::worker::JobRunner;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Cache database pool
    pub db: SqlitePool,
    /// Handle to the background scrape worker
    pub runner: JobRunner,
}

impl AppState {
    pub fn new(db: SqlitePool, runner: JobRunner) -> Self {
        Self { db, runner }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::library_routes())
        .merge(api::job_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
