//! Error taxonomy for a snapshot run.
//!
//! Two tiers exist:
//!
//! - [`ScrapeError`]: the cause of a failure scoped to one item (a section,
//!   a headline, an article or the curation call). These are wrapped in a
//!   [`JobFailure`] together with a source tag and attached to the item's
//!   result. They never abort the run.
//! - [`PipelineError`]: failure to acquire a shared resource at all. These
//!   abort the run, after the job row has been finalized.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Why one item failed.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// A mandatory node is absent from the page; the markup changed.
    #[error("structure changed: {0}")]
    StructureChanged(String),

    /// A mandatory node exists but holds no usable content.
    #[error("content missing: {0}")]
    ContentMissing(String),

    /// A CSS selector could not be compiled.
    #[error("invalid selector `{selector}`: {message}")]
    Selector { selector: String, message: String },

    /// A link could not be resolved against the page URI.
    #[error("invalid uri `{uri}`: {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("network failure: {0}")]
    Network(#[from] reqwest::Error),

    #[error("fixture unavailable: {path}: {source}")]
    Fixture {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http status {status} from {uri}: {body}")]
    HttpStatus {
        status: u16,
        uri: String,
        body: String,
    },

    #[error("persistence failure: {0}")]
    Persistence(#[from] sqlx::Error),

    /// The item has no stored parent row to attach to.
    #[error("persistence failure: {0}")]
    NotStored(String),

    /// The curation response matched neither accepted shape.
    #[error("schema parse failure: {0}")]
    SchemaParse(String),
}

/// Coarse classification used in summaries and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    StructureChanged,
    ContentMissing,
    NetworkFailure,
    PersistenceFailure,
    SchemaParseFailure,
}

impl ScrapeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ScrapeError::StructureChanged(_)
            | ScrapeError::Selector { .. }
            | ScrapeError::InvalidUri { .. } => FailureKind::StructureChanged,
            ScrapeError::ContentMissing(_) => FailureKind::ContentMissing,
            ScrapeError::Network(_) | ScrapeError::Fixture { .. } | ScrapeError::HttpStatus { .. } => {
                FailureKind::NetworkFailure
            }
            ScrapeError::Persistence(_) | ScrapeError::NotStored(_) => FailureKind::PersistenceFailure,
            ScrapeError::SchemaParse(_) => FailureKind::SchemaParseFailure,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::StructureChanged => "StructureChanged",
            FailureKind::ContentMissing => "ContentMissing",
            FailureKind::NetworkFailure => "NetworkFailure",
            FailureKind::PersistenceFailure => "PersistenceFailure",
            FailureKind::SchemaParseFailure => "SchemaParseFailure",
        };
        f.write_str(s)
    }
}

/// A per-item failure captured as data.
///
/// `source` names the stage that produced it, e.g.
/// `Scraping section Sports` or `ArticlePageScraper.scrape`.
#[derive(Debug, Clone, Serialize)]
pub struct JobFailure {
    pub source: String,
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(source: impl Into<String>, error: &ScrapeError) -> Self {
        Self {
            source: source.into(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}

/// Joins failures into the single text column stored on a row.
pub fn join_failures(failures: &[JobFailure]) -> Option<String> {
    if failures.is_empty() {
        return None;
    }
    Some(
        failures
            .iter()
            .map(JobFailure::to_string)
            .collect::<Vec<_>>()
            .join(" | "),
    )
}

/// A failure that aborts the whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot open job store at {path}: {source}")]
    StoreUnavailable {
        path: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("cannot record job run: {0}")]
    JobRun(#[source] sqlx::Error),

    #[error("cannot build http client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}
