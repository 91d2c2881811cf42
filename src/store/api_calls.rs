use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::debug;

use super::JobStore;
use crate::curation::ApiCall;

/// An `api_call` audit row as stored.
#[derive(Debug, Clone, FromRow)]
pub struct ApiCallRecord {
    pub id: i64,
    pub job_id: i64,
    pub article_id: Option<i64>,
    pub purpose: String,
    pub created_on: DateTime<Utc>,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub input_tokens_cost: Option<f64>,
    pub output_tokens_cost: Option<f64>,
    pub request_cost: Option<f64>,
    pub total_cost: Option<f64>,
    pub request_body: String,
    pub response_string: Option<String>,
    pub error: Option<String>,
}

impl JobStore {
    // ========================================================================
    // API Call Audit Operations
    // ========================================================================

    /// Record one API exchange under `job_id`, failed or not.
    ///
    /// Token counts default to zero and costs to `NULL` when the reply
    /// carried no usage block.
    pub async fn insert_api_call(&self, job_id: i64, call: &ApiCall) -> Result<i64, sqlx::Error> {
        let usage = call.usage.clone().unwrap_or_default();
        let cost = usage.cost.unwrap_or_default();
        let id = sqlx::query(
            r#"
            INSERT INTO api_call (
                job_id, article_id, purpose, created_on,
                prompt_tokens, completion_tokens, total_tokens,
                input_tokens_cost, output_tokens_cost, request_cost, total_cost,
                request_body, response_string, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(job_id)
        .bind(call.article_id)
        .bind(call.purpose.as_str())
        .bind(Utc::now())
        .bind(usage.prompt_tokens as i64)
        .bind(usage.completion_tokens as i64)
        .bind(usage.total_tokens as i64)
        .bind(cost.input_tokens_cost)
        .bind(cost.output_tokens_cost)
        .bind(cost.request_cost)
        .bind(cost.total_cost)
        .bind(&call.request_body)
        .bind(&call.response_string)
        .bind(&call.error)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        debug!(api_call_id = id, purpose = call.purpose.as_str(), "Recorded API call");
        Ok(id)
    }

    pub async fn api_calls_for_job(&self, job_id: i64) -> Result<Vec<ApiCallRecord>, sqlx::Error> {
        sqlx::query_as::<_, ApiCallRecord>(
            r#"
            SELECT id, job_id, article_id, purpose, created_on,
                   prompt_tokens, completion_tokens, total_tokens,
                   input_tokens_cost, output_tokens_cost, request_cost, total_cost,
                   request_body, response_string, error
            FROM api_call WHERE job_id = ? ORDER BY id
        "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curation::ApiCallPurpose;
    use crate::curation::response::{Usage, UsageCost};

    fn call(usage: Option<Usage>, error: Option<&str>) -> ApiCall {
        ApiCall {
            purpose: ApiCallPurpose::TopStories,
            article_id: None,
            request_body: "{\"model\":\"sonar\"}".into(),
            response_string: error.is_none().then(|| "{\"id\":\"r1\"}".to_string()),
            usage,
            error: error.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_usage_and_costs_recorded() {
        let store = JobStore::open_in_memory().await.unwrap();
        store.create_schema().await.unwrap();
        let job_id = store.create_job_run(Utc::now()).await.unwrap();

        let usage = Usage {
            prompt_tokens: 412,
            completion_tokens: 389,
            total_tokens: 801,
            search_context_size: None,
            cost: Some(UsageCost {
                total_cost: Some(0.0058),
                ..Default::default()
            }),
        };
        store.insert_api_call(job_id, &call(Some(usage), None)).await.unwrap();
        store
            .insert_api_call(job_id, &call(None, Some("network failure: timed out")))
            .await
            .unwrap();

        let rows = store.api_calls_for_job(job_id).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].purpose, "top_stories");
        assert_eq!(rows[0].total_tokens, 801);
        assert_eq!(rows[0].total_cost, Some(0.0058));
        assert_eq!(rows[0].input_tokens_cost, None);
        assert_eq!(rows[0].response_string.as_deref(), Some("{\"id\":\"r1\"}"));

        assert_eq!(rows[1].total_tokens, 0);
        assert_eq!(rows[1].response_string, None);
        assert_eq!(rows[1].error.as_deref(), Some("network failure: timed out"));
    }

    #[tokio::test]
    async fn test_cascade_delete_from_job() {
        let store = JobStore::open_in_memory().await.unwrap();
        store.create_schema().await.unwrap();
        let job_id = store.create_job_run(Utc::now()).await.unwrap();
        store.insert_api_call(job_id, &call(None, None)).await.unwrap();

        assert!(store.delete_job_run(job_id).await.unwrap());
        assert!(store.api_calls_for_job(job_id).await.unwrap().is_empty());
    }
}
