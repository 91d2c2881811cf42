use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::types::Json;
use tracing::debug;

use super::JobStore;
use crate::models::ArticleAnalysis;

/// An `analyzed_article` row as stored.
#[derive(Debug, Clone, FromRow)]
pub struct AnalyzedArticleRecord {
    pub id: i64,
    pub article_id: i64,
    pub analyzed_on: DateTime<Utc>,
    pub custom_headline: String,
    pub summary: String,
    pub key_points: Json<Vec<String>>,
}

impl JobStore {
    // ========================================================================
    // Article Analysis Operations
    // ========================================================================

    /// Store one analysis against its article and return the new row id.
    ///
    /// # Arguments
    ///
    /// * `analysis` - A completed analysis; its `article_id` must name a stored article
    ///
    /// # Returns
    ///
    /// The row id, or the driver error (a foreign-key violation when the
    /// article does not exist).
    pub async fn insert_analysis(&self, analysis: &ArticleAnalysis) -> Result<i64, sqlx::Error> {
        let id = sqlx::query(
            r#"
            INSERT INTO analyzed_article (article_id, analyzed_on, custom_headline, summary, key_points)
            VALUES (?, ?, ?, ?, ?)
        "#,
        )
        .bind(analysis.article_id)
        .bind(analysis.analyzed_on)
        .bind(&analysis.custom_headline)
        .bind(&analysis.summary)
        .bind(Json(&analysis.key_points))
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        debug!(analysis_id = id, article_id = analysis.article_id, "Inserted article analysis");
        Ok(id)
    }

    /// Analyses of the articles recorded under `job_id`, oldest first.
    pub async fn analyses_for_job(&self, job_id: i64) -> Result<Vec<AnalyzedArticleRecord>, sqlx::Error> {
        sqlx::query_as::<_, AnalyzedArticleRecord>(
            r#"
            SELECT aa.id, aa.article_id, aa.analyzed_on, aa.custom_headline, aa.summary, aa.key_points
            FROM analyzed_article aa
            JOIN article a ON a.id = aa.article_id
            JOIN headline h ON h.id = a.headline_id
            WHERE h.job_id = ?
            ORDER BY aa.id
        "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
    }
}
