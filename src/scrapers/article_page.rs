//! Article page scraping with stub-then-update persistence.
//!
//! For each headline:
//!
//! 1. insert a stub `article` row, before any network I/O
//! 2. fetch the page and extract headline, author, timestamp and body
//! 3. update the stub with whatever was extracted, plus the failure if any
//!
//! Failures stay inside the returned [`Article`]; nothing here aborts the run.

use chrono::Utc;
use scraper::Html;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use super::section::compile;
use crate::error::{JobFailure, ScrapeError};
use crate::fetch::PageFetcher;
use crate::models::{Article, ArticleExtraction, Headline};
use crate::store::JobStore;
use crate::utils::{collapse_whitespace, parse_unix_millis, strip_byline};

const SCRAPE_SOURCE: &str = "ArticlePageScraper.scrape";
const STUB_SOURCE: &str = "ArticlePageScraper.insert_stub";

/// Selectors for the article template.
#[derive(Debug, Clone)]
pub struct ArticleLayout {
    pub headline: String,
    pub author: String,
    pub last_updated: String,
    pub last_updated_attr: String,
    pub body: String,
    pub paragraph: String,
}

impl Default for ArticleLayout {
    fn default() -> Self {
        Self {
            headline: "h1.Page-headline".to_string(),
            author: "div.Page-authors".to_string(),
            last_updated: "div.Page-dateModified bsp-timestamp[data-timestamp]".to_string(),
            last_updated_attr: "data-timestamp".to_string(),
            body: "div[class*='RichTextStoryBody']".to_string(),
            paragraph: "p".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArticlePageScraper {
    fetcher: PageFetcher,
    store: JobStore,
    layout: ArticleLayout,
}

impl ArticlePageScraper {
    pub fn new(fetcher: PageFetcher, store: JobStore) -> Self {
        Self {
            fetcher,
            store,
            layout: ArticleLayout::default(),
        }
    }

    pub fn with_layout(mut self, layout: ArticleLayout) -> Self {
        self.layout = layout;
        self
    }

    #[instrument(level = "info", skip_all, fields(uri = %headline.target_uri))]
    pub async fn scrape(&self, headline: &Headline) -> Article {
        let scraped_on = Utc::now();
        let stub = match headline.id {
            Some(headline_id) => self
                .store
                .insert_article_stub(headline_id, &headline.target_uri, scraped_on)
                .await
                .map_err(ScrapeError::Persistence),
            None => Err(ScrapeError::NotStored("headline has no row id".to_string())),
        };
        let stub = match stub {
            Ok(stub) => stub,
            Err(e) => {
                let failure = JobFailure::new(STUB_SOURCE, &e);
                error!(error = %failure.message, "Could not insert article stub; skipping fetch");
                return Article::unpersisted(
                    headline.id.unwrap_or_default(),
                    &headline.target_uri,
                    scraped_on,
                    failure,
                );
            }
        };

        let (extraction, error) = match Url::parse(&headline.target_uri) {
            Ok(uri) => match self.fetcher.fetch(&uri).await {
                Ok(html) => extract_article(&html, &self.layout),
                Err(e) => (ArticleExtraction::default(), Some(e)),
            },
            Err(source) => (
                ArticleExtraction::default(),
                Some(ScrapeError::InvalidUri {
                    uri: headline.target_uri.clone(),
                    source,
                }),
            ),
        };

        let failure = error.map(|e| {
            warn!(kind = %e.kind(), error = %e, "Article scrape failed");
            JobFailure::new(SCRAPE_SOURCE, &e)
        });
        let article = Article::complete(stub, extraction, failure);

        match self.store.update_article(&article).await {
            Ok(true) => {}
            Ok(false) => warn!(article_id = ?article.id, "Article stub vanished before update"),
            Err(e) => error!(article_id = ?article.id, error = %e, "Failed to update article row"),
        }

        if article.is_success() {
            info!(paragraphs = article.content_paragraphs.len(), "Scraped article");
        }
        article
    }
}

/// Extract an article page. Returns what was found plus the failure, if
/// any; optional fields found before a failure are kept.
pub fn extract_article(html: &str, layout: &ArticleLayout) -> (ArticleExtraction, Option<ScrapeError>) {
    let document = Html::parse_document(html);
    let mut extraction = ArticleExtraction::default();
    let error = extract_into(&document, layout, &mut extraction).err();
    (extraction, error)
}

fn extract_into(document: &Html, layout: &ArticleLayout, out: &mut ArticleExtraction) -> Result<(), ScrapeError> {
    let headline = compile(&layout.headline)?;
    let author = compile(&layout.author)?;
    let last_updated = compile(&layout.last_updated)?;
    let body = compile(&layout.body)?;
    let paragraph = compile(&layout.paragraph)?;

    out.headline = document
        .select(&headline)
        .next()
        .map(|h| collapse_whitespace(&h.text().collect::<String>()))
        .filter(|h| !h.is_empty());

    out.author = document
        .select(&author)
        .next()
        .map(|a| strip_byline(&a.text().collect::<String>()))
        .filter(|a| !a.is_empty());

    out.last_updated_on = document
        .select(&last_updated)
        .next()
        .and_then(|t| t.value().attr(&layout.last_updated_attr))
        .and_then(parse_unix_millis);

    let container = document
        .select(&body)
        .next()
        .ok_or_else(|| ScrapeError::StructureChanged(format!("article body `{}` not found", layout.body)))?;

    out.content_paragraphs = container
        .select(&paragraph)
        .map(|p| collapse_whitespace(&p.text().collect::<String>()))
        .filter(|p| !p.is_empty())
        .collect();

    if out.content_paragraphs.is_empty() {
        return Err(ScrapeError::ContentMissing("article body has no paragraphs".to_string()));
    }
    debug!(paragraphs = out.content_paragraphs.len(), "Extracted article body");
    Ok(())
}
