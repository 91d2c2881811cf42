use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use tracing::debug;

use super::JobStore;
use crate::error::join_failures;
use crate::models::{Article, ArticleStub};

/// An `article` row as stored. `is_success` is `None` while the row is a stub.
#[derive(Debug, Clone, FromRow)]
pub struct ArticleRecord {
    pub id: i64,
    pub headline_id: i64,
    pub scraped_on: DateTime<Utc>,
    pub source_uri: String,
    pub headline: Option<String>,
    pub author: Option<String>,
    pub published_on: Option<DateTime<Utc>>,
    pub content_paragraphs: Option<Json<Vec<String>>>,
    pub is_success: Option<bool>,
    pub error: Option<String>,
}

impl ArticleRecord {
    pub fn paragraphs(&self) -> &[String] {
        self.content_paragraphs.as_ref().map(|p| p.0.as_slice()).unwrap_or(&[])
    }

    pub fn is_stub(&self) -> bool {
        self.is_success.is_none()
    }
}

impl JobStore {
    // ========================================================================
    // Article Operations
    // ========================================================================

    /// Insert the stub row that must exist before an article page is fetched.
    ///
    /// # Arguments
    ///
    /// * `headline_id` - Row id of the headline being followed
    /// * `source_uri` - The article page URI
    /// * `scraped_on` - When the scrape started
    ///
    /// # Returns
    ///
    /// The stored stub. Its id is what [`JobStore::update_article`] later writes to.
    pub async fn insert_article_stub(
        &self,
        headline_id: i64,
        source_uri: &str,
        scraped_on: DateTime<Utc>,
    ) -> Result<ArticleStub, sqlx::Error> {
        let id = sqlx::query("INSERT INTO article (headline_id, scraped_on, source_uri) VALUES (?, ?, ?)")
            .bind(headline_id)
            .bind(scraped_on)
            .bind(source_uri)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        debug!(article_id = id, uri = source_uri, "Inserted article stub");
        Ok(ArticleStub {
            id,
            headline_id,
            source_uri: source_uri.to_string(),
            scraped_on,
        })
    }

    /// Write an article's final state over its stub.
    ///
    /// # Returns
    ///
    /// Whether a stub row was updated. An article without an id was never
    /// stubbed and yields `false` without a query.
    pub async fn update_article(&self, article: &Article) -> Result<bool, sqlx::Error> {
        let Some(id) = article.id else {
            return Ok(false);
        };
        let result = sqlx::query(
            r#"
            UPDATE article SET
                headline = ?,
                author = ?,
                published_on = ?,
                content_paragraphs = ?,
                is_success = ?,
                error = ?
            WHERE id = ?
        "#,
        )
        .bind(&article.headline)
        .bind(&article.author)
        .bind(article.last_updated_on)
        .bind(Json(&article.content_paragraphs))
        .bind(article.is_success())
        .bind(join_failures(&article.failures))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Article rows for `job_id`, joined through their headlines.
    pub async fn articles_for_job(&self, job_id: i64) -> Result<Vec<ArticleRecord>, sqlx::Error> {
        sqlx::query_as::<_, ArticleRecord>(
            r#"
            SELECT a.id, a.headline_id, a.scraped_on, a.source_uri, a.headline, a.author,
                   a.published_on, a.content_paragraphs, a.is_success, a.error
            FROM article a
            JOIN headline h ON h.id = a.headline_id
            WHERE h.job_id = ?
            ORDER BY a.id
        "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn count_articles(&self) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM article")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
