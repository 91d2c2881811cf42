//! Top-story curation and per-story analysis through a Perplexity-style
//! chat completions API.
//!
//! [`CurationClient`] sends the most recent successfully scraped headlines
//! with a strict JSON-schema response format and parses the selected stories
//! out of `choices[0].message.content`. [`ArticleAnalyzer`] then makes one
//! call per selected story for a rewritten headline, a summary and key
//! points.
//!
//! Every call that reaches the transport yields an [`ApiCall`] audit record
//! alongside its outcome, successful or not.

pub mod analysis;
pub mod request;
pub mod response;

use std::cmp::Reverse;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::api::{PostAsync, Transport};
use crate::error::ScrapeError;
use crate::models::{Article, CuratedStory};
use crate::utils::{collapse_whitespace, looks_truncated, strip_code_fences, truncate_for_log};
use request::{ChatRequest, Message, ResponseFormat, Role, WebSearchOptions};
use response::{ChatResponse, SearchResult, TopStoriesContent, Usage};

pub use analysis::{AnalysisOptions, ArticleAnalyzer};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a news editor. From the candidate headlines you are given, \
select the most important stories of the day for a general national audience. Weigh national and \
international impact, immediacy, societal relevance and whether a story shapes upcoming events. \
Prefer hard news over entertainment, lifestyle and sports. Answer only with JSON matching the schema.";

pub const DEFAULT_USER_PROMPT: &str = "Select the top stories from these headlines. \
Each line is a headline followed by its URL; use the URL exactly as given.";

#[derive(Debug, Clone)]
pub struct CurationOptions {
    pub model: String,
    pub max_tokens: u32,
    /// Stories the model must select.
    pub top_n: usize,
    /// Most recent candidates sent to the model.
    pub max_candidates: usize,
    pub search_context_size: String,
    pub system_prompt: String,
    pub user_prompt: String,
}

impl Default for CurationOptions {
    fn default() -> Self {
        Self {
            model: "sonar".to_string(),
            max_tokens: 2000,
            top_n: 10,
            max_candidates: 20,
            search_context_size: "low".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            user_prompt: DEFAULT_USER_PROMPT.to_string(),
        }
    }
}

/// Parsed, normalized curation outcome.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CurationResult {
    pub stories: Vec<CuratedStory>,
    pub selection_criteria: String,
    pub excluded_categories: Vec<String>,
    pub citations: Vec<String>,
    pub search_results: Vec<SearchResult>,
    pub response_id: Option<String>,
    pub model: Option<String>,
    pub usage: Option<Usage>,
}

/// What an API call was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiCallPurpose {
    TopStories,
    ArticleAnalysis,
}

impl ApiCallPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiCallPurpose::TopStories => "top_stories",
            ApiCallPurpose::ArticleAnalysis => "article_analysis",
        }
    }
}

/// One request/response exchange, as written to the `api_call` table.
#[derive(Debug, Clone, Serialize)]
pub struct ApiCall {
    pub purpose: ApiCallPurpose,
    /// The analyzed article; `None` for top-story selection.
    pub article_id: Option<i64>,
    pub request_body: String,
    pub response_string: Option<String>,
    /// Token counts and costs from the envelope, when it parsed.
    pub usage: Option<Usage>,
    pub error: Option<String>,
}

/// The outcome of one API call plus its audit record.
#[derive(Debug)]
pub struct Exchange<T> {
    /// `None` when the request was never sent.
    pub call: Option<ApiCall>,
    pub outcome: Result<T, ScrapeError>,
}

impl<T> Exchange<T> {
    fn not_sent(error: ScrapeError) -> Self {
        Self {
            call: None,
            outcome: Err(error),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Exchange<U> {
        Exchange {
            call: self.call,
            outcome: self.outcome.map(f),
        }
    }
}

/// Serialize and post `request`, then parse the reply with `parse`.
///
/// The audit record carries the request body, the raw reply, the envelope
/// usage and the error, whichever of them exist.
async fn exchange<T>(
    transport: &Transport,
    purpose: ApiCallPurpose,
    article_id: Option<i64>,
    request: &ChatRequest,
    parse: impl FnOnce(&str) -> Result<T, ScrapeError>,
) -> Exchange<T> {
    let body = match serde_json::to_string(request) {
        Ok(body) => body,
        Err(e) => {
            return Exchange::not_sent(ScrapeError::SchemaParse(format!("cannot serialize request: {e}")));
        }
    };
    debug!(purpose = purpose.as_str(), request = %truncate_for_log(&body, 2000), "API request");

    let mut call = ApiCall {
        purpose,
        article_id,
        request_body: body,
        response_string: None,
        usage: None,
        error: None,
    };
    let outcome = match transport.post(&call.request_body).await {
        Ok(text) => {
            debug!(purpose = purpose.as_str(), response = %truncate_for_log(&text, 2000), "API response");
            call.usage = serde_json::from_str::<ChatResponse>(&text).ok().and_then(|e| e.usage);
            let parsed = parse(&text);
            call.response_string = Some(text);
            parsed
        }
        Err(e) => Err(e),
    };
    if let Err(e) = &outcome {
        call.error = Some(e.to_string());
    }
    Exchange {
        call: Some(call),
        outcome,
    }
}

/// Parse the envelope and deserialize the JSON inside its first choice.
fn parse_choice<T: DeserializeOwned>(text: &str) -> Result<(ChatResponse, T), ScrapeError> {
    let envelope: ChatResponse = serde_json::from_str(text)
        .map_err(|e| ScrapeError::SchemaParse(format!("response envelope: {e}")))?;

    let content = {
        let choice = envelope
            .choices
            .first()
            .ok_or_else(|| ScrapeError::SchemaParse("response contained no choices".to_string()))?;

        let inner = strip_code_fences(&choice.message.content);
        serde_json::from_str::<T>(&inner).map_err(|e| {
            let hint = if looks_truncated(&e) {
                format!(" (content looks truncated, finish_reason={:?})", choice.finish_reason)
            } else {
                String::new()
            };
            ScrapeError::SchemaParse(format!(
                "message content: {e}{hint}: {}",
                truncate_for_log(&inner, 300)
            ))
        })?
    };
    Ok((envelope, content))
}

#[derive(Debug)]
pub struct CurationClient {
    transport: Transport,
    options: CurationOptions,
}

impl CurationClient {
    pub fn new(transport: Transport, options: CurationOptions) -> Self {
        Self { transport, options }
    }

    pub fn options(&self) -> &CurationOptions {
        &self.options
    }

    /// Successful articles with a headline, newest first, capped at
    /// `max_candidates`. Articles without a timestamp sort last.
    pub fn select_candidates<'a>(&self, articles: &'a [Article]) -> Vec<&'a Article> {
        let mut candidates: Vec<&Article> = articles
            .iter()
            .filter(|a| a.is_success() && a.headline.as_deref().is_some_and(|h| !h.trim().is_empty()))
            .collect();
        candidates.sort_by_key(|a| Reverse(a.last_updated_on));
        candidates.truncate(self.options.max_candidates);
        candidates
    }

    pub fn build_request(&self, candidates: &[&Article]) -> ChatRequest {
        let lines = candidates
            .iter()
            .filter_map(|a| {
                a.headline
                    .as_deref()
                    .map(|h| format!("- {} | {}", collapse_whitespace(h), a.source_uri))
            })
            .collect::<Vec<_>>()
            .join("\n");

        ChatRequest {
            model: self.options.model.clone(),
            messages: vec![
                Message {
                    role: Role::System,
                    content: collapse_whitespace(&self.options.system_prompt),
                },
                Message {
                    role: Role::User,
                    content: format!("{}\n{}", collapse_whitespace(&self.options.user_prompt), lines),
                },
            ],
            max_tokens: self.options.max_tokens,
            temperature: None,
            response_format: ResponseFormat::top_stories(self.options.top_n),
            web_search_options: WebSearchOptions {
                search_context_size: self.options.search_context_size.clone(),
            },
        }
    }

    /// Ask the API to pick the top stories among `articles`.
    ///
    /// Nothing is sent, and no audit record is produced, when no article
    /// qualifies as a candidate.
    #[instrument(level = "info", skip_all, fields(articles = articles.len()))]
    pub async fn curate(&self, articles: &[Article]) -> Exchange<CurationResult> {
        let candidates = self.select_candidates(articles);
        if candidates.is_empty() {
            return Exchange::not_sent(ScrapeError::ContentMissing("no scraped articles to curate".to_string()));
        }
        info!(candidates = candidates.len(), top_n = self.options.top_n, "Requesting curation");

        let request = self.build_request(&candidates);
        let exchange = exchange(&self.transport, ApiCallPurpose::TopStories, None, &request, parse_response).await;

        if let Ok(result) = &exchange.outcome {
            if result.stories.len() != self.options.top_n {
                warn!(
                    expected = self.options.top_n,
                    got = result.stories.len(),
                    "Curation returned an unexpected number of stories"
                );
            }
            info!(stories = result.stories.len(), "Curation complete");
        }
        exchange
    }
}

/// Parse the API envelope and the top-stories JSON inside the first choice.
pub fn parse_response(text: &str) -> Result<CurationResult, ScrapeError> {
    let (envelope, content): (_, TopStoriesContent) = parse_choice(text)?;

    Ok(CurationResult {
        stories: content.top_stories,
        selection_criteria: content.selection_criteria.normalize()?,
        excluded_categories: content.excluded_categories.normalize()?,
        citations: envelope.citations,
        search_results: envelope.search_results,
        response_id: envelope.id,
        model: envelope.model,
        usage: envelope.usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FixturePost;
    use crate::models::{ArticleExtraction, ArticleStub};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn envelope(content: &str) -> String {
        serde_json::json!({
            "id": "resp-1",
            "model": "sonar",
            "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30},
            "citations": ["https://apnews.com/article/one"],
            "choices": [{"index": 0, "finish_reason": "stop", "message": {"role": "assistant", "content": content}}]
        })
        .to_string()
    }

    fn article(id: i64, headline: Option<&str>, minute: Option<u32>, ok: bool) -> Article {
        let stub = ArticleStub {
            id,
            headline_id: id,
            source_uri: format!("https://apnews.com/article/{id}"),
            scraped_on: Utc::now(),
        };
        let extraction = ArticleExtraction {
            headline: headline.map(str::to_string),
            last_updated_on: minute.map(|m| Utc.with_ymd_and_hms(2025, 6, 1, 12, m, 0).unwrap()),
            content_paragraphs: vec!["p".into()],
            ..Default::default()
        };
        let failure = (!ok).then(|| {
            crate::error::JobFailure::new("t", &ScrapeError::ContentMissing("x".into()))
        });
        Article::complete(stub, extraction, failure)
    }

    fn client(max_candidates: usize) -> CurationClient {
        CurationClient::new(
            Transport::Fixture(FixturePost::new("/unused")),
            CurationOptions {
                max_candidates,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_candidates_newest_first_and_capped() {
        let articles = vec![
            article(1, Some("Old"), Some(1), true),
            article(2, Some("New"), Some(30), true),
            article(3, None, Some(59), true),
            article(4, Some("Failed"), Some(58), false),
            article(5, Some("Undated"), None, true),
            article(6, Some("Mid"), Some(10), true),
        ];
        let picked: Vec<_> = client(3)
            .select_candidates(&articles)
            .iter()
            .map(|a| a.headline.clone().unwrap())
            .collect();
        assert_eq!(picked, vec!["New", "Mid", "Old"]);
    }

    #[test]
    fn test_request_carries_candidates() {
        let articles = vec![article(1, Some("Storm  hits"), Some(1), true)];
        let c = client(20);
        let request = c.build_request(&c.select_candidates(&articles));
        let v = serde_json::to_value(&request).unwrap();
        assert_eq!(v["max_tokens"], 2000);
        assert_eq!(v["web_search_options"]["search_context_size"], "low");
        assert_eq!(v["messages"][0]["role"], "system");
        assert!(v["messages"][1]["content"]
            .as_str()
            .unwrap()
            .ends_with("- Storm hits | https://apnews.com/article/1"));
    }

    #[test]
    fn test_parse_fenced_content() {
        let content = "```json\n{\"top_stories\":[{\"url\":\"u\",\"headline\":\"h\",\"category\":\"c\",\"highlights\":\"hl\",\"rationale\":\"r\"}],\"selection_criteria\":\"Impact.\",\"excluded_categories\":[\"Sports\"]}\n```";
        let result = parse_response(&envelope(content)).unwrap();
        assert_eq!(result.stories.len(), 1);
        assert_eq!(result.stories[0].headline, "h");
        assert_eq!(result.selection_criteria, "Impact.");
        assert_eq!(result.excluded_categories, vec!["Sports"]);
        assert_eq!(result.response_id.as_deref(), Some("resp-1"));
        assert_eq!(result.usage.unwrap().total_tokens, 30);
    }

    #[test]
    fn test_unparsable_content_is_schema_failure() {
        let err = parse_response(&envelope("{\"top_stories\": \"nope\"}")).unwrap_err();
        assert!(matches!(err, ScrapeError::SchemaParse(_)));

        let err = parse_response(&envelope("{\"top_stories\": [")).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_no_choices_is_schema_failure() {
        let err = parse_response(r#"{"id":"x","choices":[]}"#).unwrap_err();
        assert!(matches!(err, ScrapeError::SchemaParse(_)));
    }

    #[tokio::test]
    async fn test_curate_without_candidates_sends_nothing() {
        let exchange = client(20).curate(&[]).await;
        assert!(exchange.call.is_none());
        assert_eq!(exchange.outcome.unwrap_err().kind(), crate::error::FailureKind::ContentMissing);
    }

    #[tokio::test]
    async fn test_curate_audit_record_keeps_request_and_reply() {
        let tmp = tempfile::tempdir().unwrap();
        let reply = tmp.path().join("reply.json");
        let content = r#"{"top_stories":[],"selection_criteria":"Impact.","excluded_categories":[]}"#;
        std::fs::write(&reply, envelope(content)).unwrap();
        let c = CurationClient::new(Transport::Fixture(FixturePost::new(reply.clone())), CurationOptions::default());

        let articles = vec![article(1, Some("Storm"), Some(1), true)];
        let exchange = c.curate(&articles).await;
        assert!(exchange.outcome.is_ok());

        let call = exchange.call.unwrap();
        assert_eq!(call.purpose, ApiCallPurpose::TopStories);
        assert_eq!(call.article_id, None);
        assert!(call.request_body.contains("\"top_stories\""));
        assert!(call.response_string.unwrap().contains("resp-1"));
        assert_eq!(call.usage.unwrap().total_tokens, 30);
        assert!(call.error.is_none());
    }

    #[tokio::test]
    async fn test_curate_parse_failure_is_audited() {
        let tmp = tempfile::tempdir().unwrap();
        let reply = tmp.path().join("reply.json");
        std::fs::write(&reply, envelope("not json")).unwrap();
        let c = CurationClient::new(Transport::Fixture(FixturePost::new(reply.clone())), CurationOptions::default());

        let exchange = c.curate(&[article(1, Some("Storm"), Some(1), true)]).await;
        assert!(matches!(exchange.outcome, Err(ScrapeError::SchemaParse(_))));
        let call = exchange.call.unwrap();
        assert!(call.error.unwrap().starts_with("schema parse failure: "));
        assert!(call.response_string.is_some());
    }
}
