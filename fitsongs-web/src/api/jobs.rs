//! Job submission and progress handlers

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use fitsongs_common::db::cache;

use crate::error::{ApiError, ApiResult};
use crate::worker::{JobStatus, ScrapeJob};
use crate::AppState;

pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/process", post(process_urls))
        .route("/status", get(get_status))
        .route("/pending-updates", get(pending_updates))
        .route("/update-pending", post(update_pending))
        .route("/update-single", post(update_single))
}

/// POST /process request
#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    /// Newline-separated URLs
    #[serde(default)]
    pub urls: String,
    #[serde(default)]
    pub force_refresh: bool,
}

/// POST /update-single request
#[derive(Debug, Deserialize)]
pub struct UpdateSingleRequest {
    #[serde(default)]
    pub url: String,
}

/// GET /pending-updates response
#[derive(Debug, Serialize)]
pub struct PendingUpdatesResponse {
    pub count: usize,
    pub urls: Vec<String>,
}

/// POST /process - enqueue a batch of URLs.
///
/// 400 when no URLs parse out of the request or a job is already running.
async fn process_urls(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> ApiResult<Json<Value>> {
    let urls: Vec<String> = request
        .urls
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if urls.is_empty() {
        return Err(ApiError::BadRequest("No valid URLs provided".to_string()));
    }

    let count = urls.len();
    let job = ScrapeJob::new(urls, request.force_refresh);
    tracing::info!(job_id = %job.id, urls = count, "submitting batch job");
    state.runner.submit(job)?;

    Ok(Json(json!({
        "message": format!("Started processing {} URLs", count)
    })))
}

/// GET /status - latest worker progress snapshot.
async fn get_status(State(state): State<AppState>) -> Json<JobStatus> {
    Json(state.runner.status())
}

/// GET /pending-updates - stale rows awaiting re-validation.
async fn pending_updates(State(state): State<AppState>) -> ApiResult<Json<PendingUpdatesResponse>> {
    let (count, urls) = cache::stale_entries(&state.db).await?;
    Ok(Json(PendingUpdatesResponse { count, urls }))
}

/// POST /update-pending - enqueue every stale URL with forced refresh.
async fn update_pending(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let (count, urls) = cache::stale_entries(&state.db).await?;
    if urls.is_empty() {
        return Err(ApiError::BadRequest("No entries need updating".to_string()));
    }

    state.runner.submit(ScrapeJob::new(urls, true))?;

    Ok(Json(json!({
        "message": format!("Started updating {} pending entries", count)
    })))
}

/// POST /update-single - enqueue one URL with forced refresh.
async fn update_single(
    State(state): State<AppState>,
    Json(request): Json<UpdateSingleRequest>,
) -> ApiResult<Json<Value>> {
    let url = request.url.trim().to_string();
    if url.is_empty() {
        return Err(ApiError::BadRequest("No URL provided".to_string()));
    }

    state
        .runner
        .submit(ScrapeJob::new(vec![url.clone()], true))?;

    Ok(Json(json!({
        "message": format!("Started updating: {}", url)
    })))
}
