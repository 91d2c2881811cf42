//! Transport for the curation API, with exponential backoff retry logic.
//!
//! # Architecture
//!
//! - [`PostAsync`]: core trait, sends a JSON body and returns the raw response text
//! - [`HttpPost`]: bearer-authenticated POST to the live endpoint
//! - [`FixturePost`]: replays a recorded response file
//! - [`RetryPost`]: decorator that retries transient failures of any [`PostAsync`]
//! - [`Transport`]: the live-or-fixture choice made at startup
//!
//! # Retry Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```
//!
//! Only network errors, `429` and `5xx` responses are retried. Anything else
//! (bad request, auth failure, missing fixture) is returned at once.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration as StdDuration, Instant};

use rand::{Rng, rng};
use reqwest::Client;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};
use url::Url;

use crate::error::ScrapeError;
use crate::utils::truncate_for_log;

/// Send a request body and receive the raw response text.
pub trait PostAsync {
    /// Send a serialized request to the endpoint.
    ///
    /// # Arguments
    ///
    /// * `body` - The JSON request body, already serialized
    ///
    /// # Returns
    ///
    /// The raw response text, or the error that ended the call.
    async fn post(&self, body: &str) -> Result<String, ScrapeError>;
}

/// Whether a failed call is worth repeating.
///
/// Network errors, 429 and 5xx are transient. Everything else, including
/// fixture read errors, is returned to the caller on the first attempt.
pub fn is_transient(e: &ScrapeError) -> bool {
    match e {
        ScrapeError::Network(_) => true,
        ScrapeError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`PostAsync`] implementation.
pub struct RetryPost<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T: PostAsync> RetryPost<T> {
    /// Create a new retry wrapper around an existing [`PostAsync`] implementation.
    ///
    /// # Arguments
    ///
    /// * `inner` - The underlying transport to wrap
    /// * `max_retries` - Maximum number of retry attempts (5 recommended)
    /// * `base_delay` - Initial delay between retries (1 second recommended)
    ///
    /// The delay doubles per attempt, is capped at 30 seconds and gets up to
    /// 250 ms of jitter.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let post = HttpPost::new(client, config.curation.api_uri()?, api_key);
    /// let transport = RetryPost::new(post, 5, Duration::from_secs(1));
    /// ```
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryPost<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPost")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T: PostAsync> PostAsync for RetryPost<T> {
    #[instrument(level = "info", skip_all)]
    async fn post(&self, body: &str) -> Result<String, ScrapeError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.post(body).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if !is_transient(&e) || attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "post() giving up"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "post() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Bearer-authenticated JSON POST.
#[derive(Clone)]
pub struct HttpPost {
    client: Client,
    uri: Url,
    api_key: String,
}

impl HttpPost {
    /// # Arguments
    ///
    /// * `client` - Shared client carrying the request timeout
    /// * `uri` - The chat completions endpoint
    /// * `api_key` - Sent as a bearer token
    pub fn new(client: Client, uri: Url, api_key: impl Into<String>) -> Self {
        Self {
            client,
            uri,
            api_key: api_key.into(),
        }
    }
}

impl fmt::Debug for HttpPost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPost").field("uri", &self.uri.as_str()).finish_non_exhaustive()
    }
}

impl PostAsync for HttpPost {
    #[instrument(level = "info", skip_all, fields(uri = %self.uri))]
    async fn post(&self, body: &str) -> Result<String, ScrapeError> {
        let t0 = Instant::now();
        let response = self
            .client
            .post(self.uri.clone())
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "application/json")
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let dt = t0.elapsed();

        if !status.is_success() {
            warn!(status = status.as_u16(), elapsed_ms = dt.as_millis() as u64, "Curation API call failed");
            return Err(ScrapeError::HttpStatus {
                status: status.as_u16(),
                uri: self.uri.to_string(),
                body: truncate_for_log(&text, 500),
            });
        }
        info!(elapsed_ms = dt.as_millis() as u64, bytes = text.len(), "Curation API call succeeded");
        Ok(text)
    }
}

/// Replays a recorded response; the request body is ignored.
#[derive(Debug, Clone)]
pub struct FixturePost {
    path: PathBuf,
}

impl FixturePost {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PostAsync for FixturePost {
    async fn post(&self, _body: &str) -> Result<String, ScrapeError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ScrapeError::Fixture {
                path: self.path.display().to_string(),
                source,
            })
    }
}

/// The transport a stage posts through: the live endpoint behind
/// [`RetryPost`], or a recorded reply.
#[derive(Debug)]
pub enum Transport {
    Live(RetryPost<HttpPost>),
    Fixture(FixturePost),
}

impl PostAsync for Transport {
    async fn post(&self, body: &str) -> Result<String, ScrapeError> {
        match self {
            Transport::Live(t) => t.post(body).await,
            Transport::Fixture(t) => t.post(body).await,
        }
    }
}
