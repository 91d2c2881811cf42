//! Per-story analysis.
//!
//! Each curated story that maps to a successfully scraped article gets one
//! more API call. The reply must be an array of at most one object holding
//! `custom_headline`, `summary` and one to five `key_points`; a bare object
//! is accepted as well.

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument};

use super::request::{ChatRequest, Message, ResponseFormat, Role, WebSearchOptions};
use super::{ApiCallPurpose, Exchange, exchange, parse_choice};
use crate::api::Transport;
use crate::error::ScrapeError;
use crate::models::{Article, ArticleAnalysis};
use crate::utils::collapse_whitespace;

pub const DEFAULT_ANALYSIS_SYSTEM_PROMPT: &str = "You are a news editor writing for busy readers. \
Given the full text of one news article, write a neutral headline of your own, a brief summary of \
two or three sentences and up to five key points. Use only facts stated in the article. Answer only \
with JSON matching the schema.";

pub const DEFAULT_ANALYSIS_USER_PROMPT: &str = "Analyze this article:";

const MAX_KEY_POINTS: usize = 5;

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub search_context_size: String,
    pub system_prompt: String,
    pub user_prompt: String,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            model: "sonar".to_string(),
            max_tokens: 1800,
            temperature: 0.3,
            search_context_size: "low".to_string(),
            system_prompt: DEFAULT_ANALYSIS_SYSTEM_PROMPT.to_string(),
            user_prompt: DEFAULT_ANALYSIS_USER_PROMPT.to_string(),
        }
    }
}

/// The JSON object inside `message.content`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnalysisContent {
    pub custom_headline: String,
    pub summary: String,
    pub key_points: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AnalysisPayload {
    Many(Vec<AnalysisContent>),
    One(AnalysisContent),
}

/// Parse an analysis reply into whitespace-collapsed content.
///
/// An empty array, or an empty headline or summary, is `ContentMissing`.
/// Key points outside one to five are a `SchemaParse` failure.
pub fn parse_analysis(text: &str) -> Result<AnalysisContent, ScrapeError> {
    let (_, payload): (_, AnalysisPayload) = parse_choice(text)?;
    let raw = match payload {
        AnalysisPayload::Many(items) => items
            .into_iter()
            .next()
            .ok_or_else(|| ScrapeError::ContentMissing("model returned no analysis".to_string()))?,
        AnalysisPayload::One(content) => content,
    };

    let content = AnalysisContent {
        custom_headline: collapse_whitespace(&raw.custom_headline),
        summary: collapse_whitespace(&raw.summary),
        key_points: raw
            .key_points
            .iter()
            .map(|p| collapse_whitespace(p))
            .filter(|p| !p.is_empty())
            .collect(),
    };
    if content.custom_headline.is_empty() || content.summary.is_empty() {
        return Err(ScrapeError::ContentMissing("analysis has no headline or summary".to_string()));
    }
    if !(1..=MAX_KEY_POINTS).contains(&content.key_points.len()) {
        return Err(ScrapeError::SchemaParse(format!(
            "analysis has {} key points, expected 1 to {MAX_KEY_POINTS}",
            content.key_points.len()
        )));
    }
    Ok(content)
}

#[derive(Debug)]
pub struct ArticleAnalyzer {
    transport: Transport,
    options: AnalysisOptions,
}

impl ArticleAnalyzer {
    pub fn new(transport: Transport, options: AnalysisOptions) -> Self {
        Self { transport, options }
    }

    pub fn build_request(&self, article: &Article) -> ChatRequest {
        let body = article
            .content_paragraphs
            .iter()
            .map(|p| collapse_whitespace(p))
            .collect::<Vec<_>>()
            .join("\n\n");
        let headline = article.headline.as_deref().map(collapse_whitespace).unwrap_or_default();

        ChatRequest {
            model: self.options.model.clone(),
            messages: vec![
                Message {
                    role: Role::System,
                    content: collapse_whitespace(&self.options.system_prompt),
                },
                Message {
                    role: Role::User,
                    content: format!(
                        "{}\n\n{}\n\n{}",
                        collapse_whitespace(&self.options.user_prompt),
                        headline,
                        body
                    ),
                },
            ],
            max_tokens: self.options.max_tokens,
            temperature: Some(self.options.temperature),
            response_format: ResponseFormat::article_analysis(),
            web_search_options: WebSearchOptions {
                search_context_size: self.options.search_context_size.clone(),
            },
        }
    }

    /// Analyze one stored, successfully scraped article.
    #[instrument(level = "info", skip_all, fields(uri = %article.source_uri))]
    pub async fn analyze(&self, article: &Article) -> Exchange<ArticleAnalysis> {
        let Some(article_id) = article.id else {
            return Exchange::not_sent(ScrapeError::NotStored("article has no row id".to_string()));
        };
        if article.content_paragraphs.is_empty() {
            return Exchange::not_sent(ScrapeError::ContentMissing("article has no body to analyze".to_string()));
        }

        let request = self.build_request(article);
        let exchange = exchange(
            &self.transport,
            ApiCallPurpose::ArticleAnalysis,
            Some(article_id),
            &request,
            parse_analysis,
        )
        .await;

        let source_uri = article.source_uri.clone();
        exchange.map(|content| {
            info!(key_points = content.key_points.len(), "Analyzed article");
            ArticleAnalysis {
                id: None,
                article_id,
                source_uri,
                analyzed_on: Utc::now(),
                custom_headline: content.custom_headline,
                summary: content.summary,
                key_points: content.key_points,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FixturePost;
    use crate::error::FailureKind;
    use crate::models::{ArticleExtraction, ArticleStub};
    use pretty_assertions::assert_eq;

    fn envelope(content: &str) -> String {
        serde_json::json!({
            "id": "analysis-1",
            "model": "sonar",
            "usage": {
                "prompt_tokens": 900,
                "completion_tokens": 150,
                "total_tokens": 1050,
                "cost": {"total_cost": 0.0061}
            },
            "choices": [{"finish_reason": "stop", "message": {"role": "assistant", "content": content}}]
        })
        .to_string()
    }

    fn stored_article(id: Option<i64>, paragraphs: &[&str]) -> Article {
        let stub = ArticleStub {
            id: id.unwrap_or_default(),
            headline_id: 1,
            source_uri: "https://apnews.com/article/storm-surge".into(),
            scraped_on: Utc::now(),
        };
        let mut article = Article::complete(
            stub,
            ArticleExtraction {
                headline: Some("Storm surge floods  Gulf Coast towns".into()),
                content_paragraphs: paragraphs.iter().map(|p| p.to_string()).collect(),
                ..Default::default()
            },
            None,
        );
        article.id = id;
        article
    }

    fn analyzer(dir: &std::path::Path, reply: &str) -> ArticleAnalyzer {
        let path = dir.join("analysis.json");
        std::fs::write(&path, reply).unwrap();
        ArticleAnalyzer::new(Transport::Fixture(FixturePost::new(path)), AnalysisOptions::default())
    }

    #[test]
    fn test_parse_array_and_bare_object_alike() {
        let array = r#"[{"custom_headline": "Gulf towns  flooded", "summary": "Seawater surged in.", "key_points": ["Dozens rescued", " "]}]"#;
        let object = "```json\n{\"custom_headline\": \"Gulf towns flooded\", \"summary\": \"Seawater surged in.\", \"key_points\": [\"Dozens rescued\"]}\n```";

        let a = parse_analysis(&envelope(array)).unwrap();
        let b = parse_analysis(&envelope(object)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.custom_headline, "Gulf towns flooded");
        assert_eq!(a.key_points, vec!["Dozens rescued"]);
    }

    #[test]
    fn test_empty_array_is_content_missing() {
        let err = parse_analysis(&envelope("[]")).unwrap_err();
        assert_eq!(err.kind(), FailureKind::ContentMissing);
    }

    #[test]
    fn test_key_point_bounds() {
        let none = r#"[{"custom_headline": "h", "summary": "s", "key_points": []}]"#;
        assert_eq!(parse_analysis(&envelope(none)).unwrap_err().kind(), FailureKind::SchemaParseFailure);

        let six = r#"[{"custom_headline": "h", "summary": "s", "key_points": ["1","2","3","4","5","6"]}]"#;
        assert_eq!(parse_analysis(&envelope(six)).unwrap_err().kind(), FailureKind::SchemaParseFailure);
    }

    #[test]
    fn test_request_carries_article_text() {
        let tmp = tempfile::tempdir().unwrap();
        let a = analyzer(tmp.path(), "{}");
        let request = a.build_request(&stored_article(Some(3), &["First  paragraph.", "Second."]));
        let v = serde_json::to_value(&request).unwrap();

        assert_eq!(v["max_tokens"], 1800);
        assert!((v["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
        assert_eq!(v["response_format"]["json_schema"]["name"], "article_analysis");
        assert_eq!(
            v["messages"][1]["content"],
            "Analyze this article:\n\nStorm surge floods Gulf Coast towns\n\nFirst paragraph.\n\nSecond."
        );
    }

    #[tokio::test]
    async fn test_analyze_returns_analysis_and_audit() {
        let tmp = tempfile::tempdir().unwrap();
        let content = r#"[{"custom_headline": "Gulf towns flooded", "summary": "Seawater surged in.", "key_points": ["Dozens rescued", "Power out"]}]"#;
        let a = analyzer(tmp.path(), &envelope(content));

        let exchange = a.analyze(&stored_article(Some(7), &["Wind."])).await;
        let analysis = exchange.outcome.unwrap();
        assert_eq!(analysis.article_id, 7);
        assert_eq!(analysis.key_points.len(), 2);

        let call = exchange.call.unwrap();
        assert_eq!(call.purpose, ApiCallPurpose::ArticleAnalysis);
        assert_eq!(call.article_id, Some(7));
        assert_eq!(call.usage.unwrap().total_tokens, 1050);
        assert!(call.error.is_none());
    }

    #[tokio::test]
    async fn test_unstored_or_empty_article_is_not_sent() {
        let tmp = tempfile::tempdir().unwrap();
        let a = analyzer(tmp.path(), "{}");

        let unstored = a.analyze(&stored_article(None, &["Wind."])).await;
        assert!(unstored.call.is_none());
        assert_eq!(unstored.outcome.unwrap_err().kind(), FailureKind::PersistenceFailure);

        let empty = a.analyze(&stored_article(Some(2), &[])).await;
        assert!(empty.call.is_none());
        assert_eq!(empty.outcome.unwrap_err().kind(), FailureKind::ContentMissing);
    }

    #[tokio::test]
    async fn test_missing_fixture_is_audited_as_error() {
        let a = ArticleAnalyzer::new(
            Transport::Fixture(FixturePost::new("/nonexistent/analysis.json")),
            AnalysisOptions::default(),
        );
        let exchange = a.analyze(&stored_article(Some(2), &["Wind."])).await;
        assert_eq!(exchange.outcome.unwrap_err().kind(), FailureKind::NetworkFailure);
        let call = exchange.call.unwrap();
        assert!(call.response_string.is_none());
        assert!(call.error.unwrap().starts_with("fixture unavailable"));
    }
}
