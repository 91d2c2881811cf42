use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::{debug, instrument};

use super::JobStore;
use crate::error::join_failures;
use crate::models::JobRun;

/// A `job_run` row as stored.
#[derive(Debug, Clone, FromRow)]
pub struct JobRunRecord {
    pub id: i64,
    pub started_on: DateTime<Utc>,
    pub finished_on: Option<DateTime<Utc>>,
    pub run_time_in_seconds: Option<f64>,
    pub sections_scraped: i64,
    pub headlines_scraped: i64,
    pub articles_scraped: i64,
    pub is_success: Option<bool>,
    pub error: Option<String>,
}

impl JobStore {
    // ========================================================================
    // Job Run Operations
    // ========================================================================

    /// Insert the job-run stub and return its id.
    ///
    /// # Arguments
    ///
    /// * `started_on` - When the run began
    ///
    /// # Returns
    ///
    /// The new row id. Every headline, article and API call of the run
    /// references it.
    #[instrument(level = "info", skip_all)]
    pub async fn create_job_run(&self, started_on: DateTime<Utc>) -> Result<i64, sqlx::Error> {
        let id = sqlx::query("INSERT INTO job_run (started_on) VALUES (?)")
            .bind(started_on)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        debug!(job_id = id, "Created job run");
        Ok(id)
    }

    /// Write the final state of a job run.
    ///
    /// # Arguments
    ///
    /// * `run` - A finished run; its failures are joined into the `error` column
    #[instrument(level = "info", skip_all, fields(job_id = run.id))]
    pub async fn finish_job_run(&self, run: &JobRun) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE job_run SET
                finished_on = ?,
                run_time_in_seconds = ?,
                sections_scraped = ?,
                headlines_scraped = ?,
                articles_scraped = ?,
                is_success = ?,
                error = ?
            WHERE id = ?
        "#,
        )
        .bind(run.finished_on)
        .bind(run.run_time_in_seconds())
        .bind(run.sections_scraped as i64)
        .bind(run.headlines_scraped as i64)
        .bind(run.articles_scraped as i64)
        .bind(run.is_success)
        .bind(join_failures(&run.failures))
        .bind(run.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch a job run row, or `None` when no run has this id.
    pub async fn get_job_run(&self, id: i64) -> Result<Option<JobRunRecord>, sqlx::Error> {
        sqlx::query_as::<_, JobRunRecord>(
            r#"
            SELECT id, started_on, finished_on, run_time_in_seconds, sections_scraped,
                   headlines_scraped, articles_scraped, is_success, error
            FROM job_run WHERE id = ?
        "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete a job run and, by cascade, its headlines, articles, analyses
    /// and API calls.
    ///
    /// # Returns
    ///
    /// Whether a row was removed.
    #[instrument(level = "info", skip_all, fields(job_id = id))]
    pub async fn delete_job_run(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM job_run WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{JobFailure, ScrapeError};
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_job_run_round_trip() {
        let store = JobStore::open_in_memory().await.unwrap();
        store.create_schema().await.unwrap();

        let started = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let id = store.create_job_run(started).await.unwrap();

        let pending = store.get_job_run(id).await.unwrap().unwrap();
        assert_eq!(pending.finished_on, None);
        assert_eq!(pending.run_time_in_seconds, None);
        assert_eq!(pending.is_success, None);

        let mut run = JobRun::new(id, started);
        run.sections_scraped = 3;
        run.headlines_scraped = 12;
        run.record_failure(JobFailure::new(
            "Scraping section B1",
            &ScrapeError::StructureChanged("root missing".into()),
        ));
        run.finish(started + chrono::Duration::milliseconds(2500));
        store.finish_job_run(&run).await.unwrap();

        let done = store.get_job_run(id).await.unwrap().unwrap();
        assert_eq!(done.run_time_in_seconds, Some(2.5));
        assert_eq!(done.sections_scraped, 3);
        assert_eq!(done.headlines_scraped, 12);
        assert_eq!(done.is_success, Some(false));
        assert!(done.error.unwrap().starts_with("Scraping section B1: "));
    }
}
