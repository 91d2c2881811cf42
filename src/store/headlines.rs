use chrono::{DateTime, Utc};
use tracing::debug;

use super::JobStore;
use crate::models::Headline;

type HeadlineRow = (i64, String, String, String, Option<DateTime<Utc>>, bool);

impl JobStore {
    // ========================================================================
    // Headline Operations
    // ========================================================================

    /// Whether any run has already recorded this target URI.
    pub async fn headline_exists(&self, target_uri: &str) -> Result<bool, sqlx::Error> {
        let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM headline WHERE target_uri = ?)")
            .bind(target_uri)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Insert a headline stub for `job_id` and return its id.
    ///
    /// # Arguments
    ///
    /// * `headline` - The headline to record; its `id` is ignored
    /// * `job_id` - The run that scraped it
    ///
    /// # Returns
    ///
    /// The new row id. Fails if another run already recorded the target URI;
    /// check [`JobStore::headline_exists`] first.
    pub async fn insert_headline(&self, headline: &Headline, job_id: i64) -> Result<i64, sqlx::Error> {
        let id = sqlx::query(
            r#"
            INSERT INTO headline (job_id, section_name, title, target_uri, last_updated_on, most_read)
            VALUES (?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(job_id)
        .bind(&headline.section_name)
        .bind(&headline.title)
        .bind(&headline.target_uri)
        .bind(headline.last_updated_on)
        .bind(headline.most_read)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        debug!(headline_id = id, uri = %headline.target_uri, "Inserted headline");
        Ok(id)
    }

    /// Update a stubbed headline in place. A headline without an id was
    /// never stubbed and is left alone.
    pub async fn update_headline(&self, headline: &Headline) -> Result<bool, sqlx::Error> {
        let Some(id) = headline.id else {
            return Ok(false);
        };
        let result = sqlx::query(
            r#"
            UPDATE headline SET section_name = ?, title = ?, last_updated_on = ?, most_read = ?
            WHERE id = ?
        "#,
        )
        .bind(&headline.section_name)
        .bind(&headline.title)
        .bind(headline.last_updated_on)
        .bind(headline.most_read)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Headlines recorded by `job_id`, in insertion order.
    pub async fn headlines_for_job(&self, job_id: i64) -> Result<Vec<Headline>, sqlx::Error> {
        let rows: Vec<HeadlineRow> = sqlx::query_as(
            r#"
            SELECT id, section_name, title, target_uri, last_updated_on, most_read
            FROM headline WHERE job_id = ? ORDER BY id
        "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, section_name, title, target_uri, last_updated_on, most_read)| Headline {
                id: Some(id),
                most_read,
                ..Headline::new(section_name, title, target_uri, last_updated_on)
            })
            .collect())
    }

    pub async fn count_headlines(&self) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM headline")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
