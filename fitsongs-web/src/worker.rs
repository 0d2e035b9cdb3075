//! Job queue and background worker
//!
//! One long-lived worker task drains a capacity-1 channel of batch jobs and
//! fully processes each before pulling the next. Progress is published as an
//! immutable `JobStatus` snapshot through a watch channel: the worker is the
//! only writer, pollers clone the latest snapshot. Submission while a job is
//! active is rejected with a busy error rather than queued.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use uuid::Uuid;

use fitsongs_common::pipeline::Scraper;

/// Fixed message for URLs that produced no data.
const NO_DATA_ERROR: &str = "No songs found or page unavailable";

/// A batch of URLs submitted together for scraping or refresh.
#[derive(Debug, Clone)]
pub struct ScrapeJob {
    pub id: Uuid,
    pub urls: Vec<String>,
    pub force_refresh: bool,
}

impl ScrapeJob {
    pub fn new(urls: Vec<String>, force_refresh: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            urls,
            force_refresh,
        }
    }
}

/// Per-URL success entry
#[derive(Debug, Clone, Serialize)]
pub struct UrlOutcome {
    pub url: String,
    /// `cached` or `success`
    pub status: &'static str,
    pub songs: usize,
    pub message: String,
}

/// Per-URL failure entry
#[derive(Debug, Clone, Serialize)]
pub struct UrlFailure {
    pub url: String,
    pub error: String,
}

/// Snapshot of the worker's progress on the current (or last) job.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobStatus {
    pub job_id: Option<Uuid>,
    pub is_processing: bool,
    pub current_url: String,
    pub completed: usize,
    pub total: usize,
    pub results: Vec<UrlOutcome>,
    pub errors: Vec<UrlFailure>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Submission rejected because a job is already active.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Already processing URLs. Please wait.")]
    Busy,
}

/// Handle for submitting jobs and polling progress.
#[derive(Clone)]
pub struct JobRunner {
    tx: mpsc::Sender<ScrapeJob>,
    status_rx: watch::Receiver<JobStatus>,
}

impl JobRunner {
    /// Submit a job; rejected when one is active or queued.
    pub fn submit(&self, job: ScrapeJob) -> Result<(), SubmitError> {
        if self.status_rx.borrow().is_processing {
            return Err(SubmitError::Busy);
        }
        self.tx.try_send(job).map_err(|_| SubmitError::Busy)
    }

    /// Latest progress snapshot.
    pub fn status(&self) -> JobStatus {
        self.status_rx.borrow().clone()
    }

    pub fn is_processing(&self) -> bool {
        self.status_rx.borrow().is_processing
    }
}

/// Spawn the single background worker and return its submission handle.
///
/// `rate_limit` is the pause applied after each URL that triggered a live
/// fetch, when more URLs remain in the job.
pub fn spawn_worker(scraper: Arc<Scraper>, rate_limit: Duration) -> JobRunner {
    let (tx, mut rx) = mpsc::channel::<ScrapeJob>(1);
    let (status_tx, status_rx) = watch::channel(JobStatus::default());

    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            run_job(&scraper, &status_tx, job, rate_limit).await;
        }
    });

    JobRunner { tx, status_rx }
}

async fn run_job(
    scraper: &Scraper,
    status_tx: &watch::Sender<JobStatus>,
    job: ScrapeJob,
    rate_limit: Duration,
) {
    info!(job_id = %job.id, urls = job.urls.len(), force_refresh = job.force_refresh, "job started");

    let total = job.urls.len();
    let mut status = JobStatus {
        job_id: Some(job.id),
        is_processing: true,
        total,
        started_at: Some(Utc::now()),
        ..Default::default()
    };
    status_tx.send_replace(status.clone());

    for (i, raw_url) in job.urls.iter().enumerate() {
        let url = raw_url.trim();
        if url.is_empty() {
            status.completed = i + 1;
            status_tx.send_replace(status.clone());
            continue;
        }

        status.current_url = url.to_string();
        status_tx.send_replace(status.clone());

        let mut made_server_request = false;
        match process_url(scraper, url, job.force_refresh, &mut made_server_request).await {
            Ok(Some(outcome)) => status.results.push(outcome),
            Ok(None) => status.errors.push(UrlFailure {
                url: url.to_string(),
                error: NO_DATA_ERROR.to_string(),
            }),
            // A single bad URL never aborts the rest of the batch.
            Err(e) => {
                error!(url = %url, error = %e, "URL failed");
                status.errors.push(UrlFailure {
                    url: url.to_string(),
                    error: e.to_string(),
                });
            }
        }

        status.completed = i + 1;
        status_tx.send_replace(status.clone());

        // Rate limiting: only after live fetches, never after cache hits,
        // and only while more URLs remain.
        if made_server_request && i < total - 1 {
            tokio::time::sleep(rate_limit).await;
        }
    }

    status.is_processing = false;
    status.current_url.clear();
    status_tx.send_replace(status.clone());

    info!(
        job_id = %job.id,
        results = status.results.len(),
        errors = status.errors.len(),
        "job finished"
    );
}

/// Handle one URL of a job. `Ok(None)` means no data was retrieved.
async fn process_url(
    scraper: &Scraper,
    url: &str,
    force_refresh: bool,
    made_server_request: &mut bool,
) -> fitsongs_common::Result<Option<UrlOutcome>> {
    if !force_refresh {
        if let Some(hit) = scraper.cached(url).await? {
            return Ok(Some(UrlOutcome {
                url: url.to_string(),
                status: "cached",
                songs: hit.songs.len(),
                message: "Found in cache".to_string(),
            }));
        }
    }

    *made_server_request = true;
    let result = scraper.get_workout_songs(url).await?;

    match result {
        Some(r) if !r.songs.is_empty() => {
            let verb = if force_refresh { "Refreshed" } else { "Scraped" };
            Ok(Some(UrlOutcome {
                url: url.to_string(),
                status: "success",
                songs: r.songs.len(),
                message: format!("{} {} songs", verb, r.songs.len()),
            }))
        }
        _ => Ok(None),
    }
}
