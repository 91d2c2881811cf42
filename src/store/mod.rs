//! SQLite persistence for job runs, headlines, articles, article analyses
//! and the API-call audit.
//!
//! Rows are written stub-first: a headline or article row is inserted as
//! soon as the item is known and updated in place once its outcome is
//! final. Everything cascade-deletes with its job run.

mod analyses;
mod api_calls;
mod articles;
mod headlines;
mod job_runs;
mod schema;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

pub use analyses::AnalyzedArticleRecord;
pub use api_calls::ApiCallRecord;
pub use articles::ArticleRecord;
pub use job_runs::JobRunRecord;
pub use schema::SCHEMA_VERSION;

/// Handle to the snapshot database.
///
/// The pool holds a single connection, which serializes every write (SQLite
/// is single-writer) and keeps an in-memory database alive for the life of
/// the handle.
#[derive(Debug, Clone)]
pub struct JobStore {
    pub(crate) pool: SqlitePool,
}

impl JobStore {
    /// Open (creating if needed) the database file at `path`. The schema is
    /// not touched; call [`JobStore::create_schema`] or [`JobStore::recreate`].
    ///
    /// Foreign keys are enforced on every connection, so deleting a job run
    /// cascades to its rows.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = JobStore::open("news.db").await?;
    /// store.create_schema().await?;
    /// ```
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = format!("sqlite:{}?mode=rwc", path);
        let options = SqliteConnectOptions::from_str(&url)?
            .foreign_keys(true)
            .pragma("busy_timeout", "5000");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;
        info!(path, "Opened job store");
        Ok(Self { pool })
    }

    /// A private in-memory database. The pool holds a single connection, so
    /// every query sees the same database until the store is closed.
    pub async fn open_in_memory() -> Result<Self, sqlx::Error> {
        Self::open(":memory:").await
    }

    /// Wait for in-flight queries and close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
