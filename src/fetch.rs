//! Raw HTML retrieval, live or from recorded fixtures.
//!
//! Fixture mode replays pages saved to disk so a run is deterministic:
//!
//! - [`PageSource::FixtureFile`] always returns the same file (the landing page)
//! - [`PageSource::FixtureDir`] maps a URI to `{dir}/{last path segment}.html`
//!   (one file per article)

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{PipelineError, ScrapeError};
use crate::utils::truncate_for_log;

pub const USER_AGENT: &str = concat!("news_snapshot/", env!("CARGO_PKG_VERSION"));

/// Build the shared HTTP client. Every request through it carries `timeout`.
pub fn build_http_client(timeout: Duration) -> Result<Client, PipelineError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(PipelineError::HttpClient)
}

#[derive(Debug, Clone)]
pub enum PageSource {
    Live(Client),
    FixtureFile(PathBuf),
    FixtureDir(PathBuf),
}

#[derive(Debug, Clone)]
pub struct PageFetcher {
    source: PageSource,
}

impl PageFetcher {
    pub fn new(source: PageSource) -> Self {
        Self { source }
    }

    pub fn is_fixture(&self) -> bool {
        !matches!(self.source, PageSource::Live(_))
    }

    #[instrument(level = "debug", skip_all, fields(uri = %uri))]
    pub async fn fetch(&self, uri: &Url) -> Result<String, ScrapeError> {
        match &self.source {
            PageSource::Live(client) => fetch_live(client, uri).await,
            PageSource::FixtureFile(path) => read_fixture(path).await,
            PageSource::FixtureDir(dir) => read_fixture(&fixture_path(dir, uri)).await,
        }
    }
}

async fn fetch_live(client: &Client, uri: &Url) -> Result<String, ScrapeError> {
    let t0 = Instant::now();
    let response = client.get(uri.clone()).send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        warn!(status = status.as_u16(), elapsed_ms = t0.elapsed().as_millis() as u64, "Non-success status");
        return Err(ScrapeError::HttpStatus {
            status: status.as_u16(),
            uri: uri.to_string(),
            body: truncate_for_log(&body, 200),
        });
    }

    debug!(bytes = body.len(), elapsed_ms = t0.elapsed().as_millis() as u64, "Fetched page");
    Ok(body)
}

async fn read_fixture(path: &Path) -> Result<String, ScrapeError> {
    let body = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ScrapeError::Fixture {
            path: path.display().to_string(),
            source,
        })?;
    debug!(path = %path.display(), bytes = body.len(), "Read fixture");
    Ok(body)
}

/// `https://host/article/storm-abc?x=1` → `{dir}/storm-abc.html`.
pub fn fixture_path(dir: &Path, uri: &Url) -> PathBuf {
    let slug = uri
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .unwrap_or("index");
    dir.join(format!("{slug}.html"))
}
