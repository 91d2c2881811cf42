use chrono::Utc;
use tracing::{info, instrument, warn};

use super::JobStore;

pub const SCHEMA_VERSION: &str = "1.2";

const ENTITIES: [&str; 5] = ["job_run", "headline", "article", "analyzed_article", "api_call"];

impl JobStore {
    /// Create any missing table. Running it against an existing schema is a
    /// no-op: every statement is `IF NOT EXISTS` or `OR IGNORE`.
    #[instrument(level = "info", skip_all)]
    pub async fn create_schema(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS database_info (
                entity TEXT PRIMARY KEY,
                version TEXT NOT NULL,
                created_on TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_run (
                id INTEGER PRIMARY KEY,
                started_on TEXT NOT NULL,
                finished_on TEXT,
                run_time_in_seconds REAL,
                sections_scraped INTEGER NOT NULL DEFAULT 0,
                headlines_scraped INTEGER NOT NULL DEFAULT 0,
                articles_scraped INTEGER NOT NULL DEFAULT 0,
                is_success INTEGER,
                error TEXT
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS headline (
                id INTEGER PRIMARY KEY,
                job_id INTEGER NOT NULL REFERENCES job_run(id) ON DELETE CASCADE,
                section_name TEXT NOT NULL,
                title TEXT NOT NULL,
                target_uri TEXT UNIQUE NOT NULL,
                last_updated_on TEXT,
                most_read INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // is_success stays NULL while the row is a stub
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS article (
                id INTEGER PRIMARY KEY,
                headline_id INTEGER NOT NULL REFERENCES headline(id) ON DELETE CASCADE,
                scraped_on TEXT NOT NULL,
                source_uri TEXT UNIQUE NOT NULL,
                headline TEXT,
                author TEXT,
                published_on TEXT,
                content_paragraphs TEXT,
                is_success INTEGER,
                error TEXT
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analyzed_article (
                id INTEGER PRIMARY KEY,
                article_id INTEGER NOT NULL REFERENCES article(id) ON DELETE CASCADE,
                analyzed_on TEXT NOT NULL,
                custom_headline TEXT NOT NULL,
                summary TEXT NOT NULL,
                key_points TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // article_id is NULL for top-story selection calls
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS api_call (
                id INTEGER PRIMARY KEY,
                job_id INTEGER NOT NULL REFERENCES job_run(id) ON DELETE CASCADE,
                article_id INTEGER REFERENCES article(id) ON DELETE SET NULL,
                purpose TEXT NOT NULL,
                created_on TEXT NOT NULL,
                prompt_tokens INTEGER NOT NULL DEFAULT 0,
                completion_tokens INTEGER NOT NULL DEFAULT 0,
                total_tokens INTEGER NOT NULL DEFAULT 0,
                input_tokens_cost REAL,
                output_tokens_cost REAL,
                request_cost REAL,
                total_cost REAL,
                request_body TEXT NOT NULL,
                response_string TEXT,
                error TEXT
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_headline_job ON headline(job_id)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_article_headline ON article(headline_id)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_analyzed_article_article ON analyzed_article(article_id)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_api_call_job ON api_call(job_id)")
            .execute(&mut *tx)
            .await?;

        let now = Utc::now();
        for entity in ENTITIES {
            sqlx::query("INSERT OR IGNORE INTO database_info (entity, version, created_on) VALUES (?, ?, ?)")
                .bind(entity)
                .bind(SCHEMA_VERSION)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!(version = SCHEMA_VERSION, "Schema ready");
        Ok(())
    }

    /// Drop every table and create the schema from scratch. Destroys all
    /// recorded runs; only invoked under an explicit configuration flag.
    #[instrument(level = "info", skip_all)]
    pub async fn recreate(&self) -> Result<(), sqlx::Error> {
        warn!("Deleting existing database contents");
        let mut tx = self.pool.begin().await?;
        for table in [
            "api_call",
            "analyzed_article",
            "article",
            "headline",
            "job_run",
            "database_info",
        ] {
            sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        self.create_schema().await
    }

    /// Schema version recorded for `entity`, if the entity exists.
    pub async fn schema_version(&self, entity: &str) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> = sqlx::query_as("SELECT version FROM database_info WHERE entity = ?")
            .bind(entity)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }
}
