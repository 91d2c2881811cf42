//! Domain records for a snapshot run.
//!
//! - [`Headline`]: one article reference found on the landing page
//! - [`Article`]: the scraped content of one headline's target page
//! - [`JobRun`]: start/finish/success bookkeeping for one execution
//! - [`ScrapeSectionResult`]: the outcome of one section
//! - [`CuratedStory`]: one story selected by the curation API
//! - [`ArticleAnalysis`]: headline rewrite, summary and key points for one
//!   curated story
//!
//! Identity of headlines and articles is their normalized URI. Collections
//! dedupe through [`KeyedSet`], which is handed an explicit key function
//! instead of relying on `Eq`/`Hash` impls on the records themselves.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::JobFailure;

/// Insertion-ordered set keyed by a projection of its items.
///
/// The first item inserted under a key wins; later duplicates are dropped.
#[derive(Debug, Clone)]
pub struct KeyedSet<T> {
    key: fn(&T) -> &str,
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> KeyedSet<T> {
    pub fn new(key: fn(&T) -> &str) -> Self {
        Self {
            key,
            items: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Returns `false` when an item with the same key is already present.
    pub fn insert(&mut self, item: T) -> bool {
        let k = (self.key)(&item).to_string();
        if self.index.contains_key(&k) {
            return false;
        }
        self.index.insert(k, self.items.len());
        self.items.push(item);
        true
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.index.get(key).map(|&i| &self.items[i])
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }
}

impl<T> Extend<T> for KeyedSet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.insert(item);
        }
    }
}

impl<T> IntoIterator for KeyedSet<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// A reference to one article found on the landing page.
///
/// Identity is [`Headline::key`], the target URI alone. There is no
/// `PartialEq`: two headlines from different sections that point at the
/// same article are the same headline, which field-wise equality would deny.
#[derive(Debug, Clone, Serialize)]
pub struct Headline {
    /// Row id once the headline has been stubbed in the store.
    pub id: Option<i64>,
    pub section_name: String,
    pub title: String,
    /// Absolute URI with the fragment removed.
    pub target_uri: String,
    pub last_updated_on: Option<DateTime<Utc>>,
    pub most_read: bool,
    /// Set when an earlier run already recorded this target URI.
    pub already_in_database: bool,
}

impl Headline {
    pub fn new(
        section_name: impl Into<String>,
        title: impl Into<String>,
        target_uri: impl Into<String>,
        last_updated_on: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: None,
            section_name: section_name.into(),
            title: title.into(),
            target_uri: target_uri.into(),
            last_updated_on,
            most_read: false,
            already_in_database: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.target_uri
    }
}

pub type HeadlineSet = KeyedSet<Headline>;

impl Default for HeadlineSet {
    fn default() -> Self {
        KeyedSet::new(Headline::key)
    }
}

/// Persistence state of an article row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistState {
    /// Stub row written, extraction not finished.
    Pending,
    Succeeded,
    Failed,
}

/// A stub article row: durable id obtained before any network I/O.
#[derive(Debug, Clone)]
pub struct ArticleStub {
    pub id: i64,
    pub headline_id: i64,
    pub source_uri: String,
    pub scraped_on: DateTime<Utc>,
}

/// Fields pulled out of an article page. Every field is optional so that a
/// failed extraction can still carry whatever was found before the failure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleExtraction {
    pub headline: Option<String>,
    pub author: Option<String>,
    pub last_updated_on: Option<DateTime<Utc>>,
    pub content_paragraphs: Vec<String>,
}

/// The scraped content of one headline's target page.
#[derive(Debug, Clone, Serialize)]
pub struct Article {
    /// Row id; `None` only when the stub insert itself failed.
    pub id: Option<i64>,
    pub headline_id: i64,
    pub source_uri: String,
    pub scraped_on: DateTime<Utc>,
    pub headline: Option<String>,
    pub author: Option<String>,
    pub last_updated_on: Option<DateTime<Utc>>,
    pub content_paragraphs: Vec<String>,
    pub state: PersistState,
    pub failures: Vec<JobFailure>,
}

impl Article {
    /// Moves a stub to its terminal state.
    pub fn complete(stub: ArticleStub, extraction: ArticleExtraction, failure: Option<JobFailure>) -> Self {
        let state = if failure.is_some() {
            PersistState::Failed
        } else {
            PersistState::Succeeded
        };
        Self {
            id: Some(stub.id),
            headline_id: stub.headline_id,
            source_uri: stub.source_uri,
            scraped_on: stub.scraped_on,
            headline: extraction.headline,
            author: extraction.author,
            last_updated_on: extraction.last_updated_on,
            content_paragraphs: extraction.content_paragraphs,
            state,
            failures: failure.into_iter().collect(),
        }
    }

    /// An article whose stub could not be written.
    pub fn unpersisted(
        headline_id: i64,
        source_uri: impl Into<String>,
        scraped_on: DateTime<Utc>,
        failure: JobFailure,
    ) -> Self {
        Self {
            id: None,
            headline_id,
            source_uri: source_uri.into(),
            scraped_on,
            headline: None,
            author: None,
            last_updated_on: None,
            content_paragraphs: Vec::new(),
            state: PersistState::Failed,
            failures: vec![failure],
        }
    }

    pub fn key(&self) -> &str {
        &self.source_uri
    }

    pub fn is_success(&self) -> bool {
        self.state == PersistState::Succeeded
    }
}

pub type ArticleSet = KeyedSet<Article>;

impl Default for ArticleSet {
    fn default() -> Self {
        KeyedSet::new(Article::key)
    }
}

/// One execution of the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct JobRun {
    pub id: i64,
    pub started_on: DateTime<Utc>,
    pub finished_on: Option<DateTime<Utc>>,
    pub sections_scraped: usize,
    pub headlines_scraped: usize,
    pub articles_scraped: usize,
    pub is_success: bool,
    pub failures: Vec<JobFailure>,
}

impl JobRun {
    pub fn new(id: i64, started_on: DateTime<Utc>) -> Self {
        Self {
            id,
            started_on,
            finished_on: None,
            sections_scraped: 0,
            headlines_scraped: 0,
            articles_scraped: 0,
            is_success: false,
            failures: Vec::new(),
        }
    }

    pub fn record_failure(&mut self, failure: JobFailure) {
        self.failures.push(failure);
    }

    /// Sets the finish time and the success flag. Only the first call has
    /// any effect; returns whether this call finalized the run.
    pub fn finish(&mut self, finished_on: DateTime<Utc>) -> bool {
        if self.finished_on.is_some() {
            return false;
        }
        self.finished_on = Some(finished_on);
        self.is_success = self.failures.is_empty();
        true
    }

    /// Elapsed seconds, truncated to whole milliseconds first.
    pub fn run_time_in_seconds(&self) -> Option<f64> {
        let finished = self.finished_on?;
        let millis = (finished - self.started_on).num_milliseconds();
        Some(millis as f64 / 1000.0)
    }
}

/// Outcome of one section: its headlines, or the single failure that
/// emptied it.
#[derive(Debug, Clone)]
pub struct ScrapeSectionResult {
    pub section_name: String,
    pub headlines: HeadlineSet,
    pub failure: Option<JobFailure>,
}

impl ScrapeSectionResult {
    pub fn succeeded(section_name: impl Into<String>, headlines: HeadlineSet) -> Self {
        Self {
            section_name: section_name.into(),
            headlines,
            failure: None,
        }
    }

    pub fn failed(section_name: impl Into<String>, failure: JobFailure) -> Self {
        Self {
            section_name: section_name.into(),
            headlines: HeadlineSet::default(),
            failure: Some(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// One story chosen by the curation API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CuratedStory {
    pub url: String,
    pub headline: String,
    pub category: String,
    pub highlights: String,
    pub rationale: String,
}

/// Rewritten headline, summary and key points for one curated article.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleAnalysis {
    /// Row id once stored.
    pub id: Option<i64>,
    pub article_id: i64,
    pub source_uri: String,
    pub analyzed_on: DateTime<Utc>,
    pub custom_headline: String,
    pub summary: String,
    pub key_points: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScrapeError;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32, ms: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, h, m, s).unwrap() + chrono::Duration::milliseconds(ms as i64)
    }

    #[test]
    fn test_headlines_with_same_uri_share_identity() {
        let a = Headline::new("Top Stories", "Storm hits coast", "https://apnews.com/article/storm", None);
        let b = Headline::new("Sports", "A different title", "https://apnews.com/article/storm", None);
        assert_eq!(a.key(), b.key());

        let mut set = HeadlineSet::default();
        assert!(set.insert(a));
        assert!(!set.insert(b));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("https://apnews.com/article/storm").unwrap().section_name, "Top Stories");
    }

    #[test]
    fn test_headline_identity_ignores_every_field_but_uri() {
        let mut a = Headline::new("A", "Storm", "https://apnews.com/article/s", None);
        a.id = Some(4);
        a.most_read = true;
        let b = Headline::new("Sports", "Storm, again", "https://apnews.com/article/s", None);
        let c = Headline::new("A", "Storm", "https://apnews.com/article/other", None);

        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());

        let mut set = HeadlineSet::default();
        set.extend([b, c, a]);
        assert_eq!(set.len(), 2);
        assert!(set.contains_key("https://apnews.com/article/s"));
        // the first occurrence wins, whatever the other fields hold
        assert_eq!(set.get("https://apnews.com/article/s").unwrap().section_name, "Sports");
    }

    #[test]
    fn test_keyed_set_preserves_insertion_order() {
        let mut set = HeadlineSet::default();
        set.extend([
            Headline::new("A", "one", "https://x/article/1", None),
            Headline::new("A", "two", "https://x/article/2", None),
            Headline::new("B", "one again", "https://x/article/1", None),
            Headline::new("B", "three", "https://x/article/3", None),
        ]);
        let uris: Vec<_> = set.iter().map(|h| h.target_uri.as_str()).collect();
        assert_eq!(uris, vec!["https://x/article/1", "https://x/article/2", "https://x/article/3"]);
    }

    #[test]
    fn test_run_time_in_seconds() {
        let mut run = JobRun::new(1, at(0, 0, 0, 0));
        assert_eq!(run.run_time_in_seconds(), None);

        assert!(run.finish(at(0, 0, 2, 500)));
        assert_eq!(run.run_time_in_seconds(), Some(2.5));
    }

    #[test]
    fn test_run_time_truncates_sub_millisecond_precision() {
        let start = at(0, 0, 0, 0);
        let mut run = JobRun::new(1, start);
        run.finish(start + chrono::Duration::microseconds(1_234_567));
        assert_eq!(run.run_time_in_seconds(), Some(1.234));
    }

    #[test]
    fn test_job_run_finishes_once() {
        let mut run = JobRun::new(7, at(0, 0, 0, 0));
        run.record_failure(JobFailure::new(
            "Scraping section B1",
            &ScrapeError::StructureChanged("root missing".into()),
        ));
        assert!(run.finish(at(0, 0, 1, 0)));
        assert!(!run.is_success);

        assert!(!run.finish(at(0, 0, 9, 0)));
        assert_eq!(run.finished_on, Some(at(0, 0, 1, 0)));
    }

    #[test]
    fn test_article_completion_state() {
        let stub = ArticleStub {
            id: 3,
            headline_id: 9,
            source_uri: "https://x/article/3".into(),
            scraped_on: at(1, 0, 0, 0),
        };
        let ok = Article::complete(stub.clone(), ArticleExtraction::default(), None);
        assert!(ok.is_success());
        assert_eq!(ok.id, Some(3));

        let failure = JobFailure::new("ArticlePageScraper.scrape", &ScrapeError::ContentMissing("no paragraphs".into()));
        let failed = Article::complete(
            stub,
            ArticleExtraction {
                headline: Some("Kept".into()),
                ..Default::default()
            },
            Some(failure),
        );
        assert_eq!(failed.state, PersistState::Failed);
        assert_eq!(failed.headline.as_deref(), Some("Kept"));
        assert_eq!(failed.failures.len(), 1);
    }
}
