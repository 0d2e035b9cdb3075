//! Page fetching
//!
//! The pipeline and the canonicalizer both depend on an abstract fetcher so
//! tests can substitute canned pages and injected faults for live traffic.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, DNT};

use crate::config;
use crate::error::{Error, Result};

/// A fetched page: the redirect-resolved URL plus the response body.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after following any redirect chain
    pub final_url: String,
    /// Response body text
    pub body: String,
}

/// Capability to fetch a page, following redirects.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// GET `url`, following redirects. Returns the final URL and body text.
    /// Non-2xx statuses are errors.
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

/// reqwest-backed fetcher presenting as a desktop browser.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher with spoofed browser headers and a bounded timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(DNT, HeaderValue::from_static("1"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(
            "Upgrade-Insecure-Requests",
            HeaderValue::from_static("1"),
        );

        let client = reqwest::Client::builder()
            .user_agent(config::USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        tracing::debug!(url = %url, "fetching page");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Internal(format!(
                "fetch of {} returned status {}",
                url, status
            )));
        }

        let final_url = response.url().to_string();
        let body = response.text().await?;

        tracing::debug!(url = %url, final_url = %final_url, bytes = body.len(), "page fetched");

        Ok(FetchedPage { final_url, body })
    }
}
