//! Landing-page orchestration: every section over one document, merged by
//! target URI, then recorded in the store.

use itertools::Itertools;
use scraper::Html;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::section::{SectionRole, SectionSpec};
use crate::error::{JobFailure, ScrapeError};
use crate::fetch::PageFetcher;
use crate::models::{Headline, HeadlineSet};
use crate::store::JobStore;

#[derive(Debug, Clone)]
pub struct MainPageOptions {
    pub base_uri: Url,
    /// Only headlines under this path are stored and scraped.
    pub article_path_prefix: String,
    /// Section names that are not run.
    pub skip_sections: Vec<String>,
}

/// Merged outcome of every section on the landing page.
#[derive(Debug, Default)]
pub struct MainPageResult {
    pub headlines: HeadlineSet,
    pub failures: Vec<JobFailure>,
}

impl MainPageResult {
    pub fn headlines_scraped(&self) -> usize {
        self.headlines.len()
    }

    /// Distinct sections that contributed at least one headline.
    pub fn sections_scraped(&self) -> usize {
        self.headlines.iter().map(|h| h.section_name.as_str()).unique().count()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct MainPageOrchestrator {
    fetcher: PageFetcher,
    sections: Vec<SectionSpec>,
    options: MainPageOptions,
}

impl MainPageOrchestrator {
    pub fn new(fetcher: PageFetcher, sections: Vec<SectionSpec>, options: MainPageOptions) -> Self {
        Self {
            fetcher,
            sections,
            options,
        }
    }

    /// Fetch the landing page and scrape it. A fetch failure is recorded as
    /// the result's only failure.
    #[instrument(level = "info", skip_all, fields(uri = %self.options.base_uri))]
    pub async fn scrape(&self) -> MainPageResult {
        match self.fetcher.fetch(&self.options.base_uri).await {
            Ok(html) => self.scrape_document(&html),
            Err(e) => {
                warn!(error = %e, "Could not load landing page");
                MainPageResult {
                    failures: vec![JobFailure::new("MainPageOrchestrator.scrape", &e)],
                    ..Default::default()
                }
            }
        }
    }

    /// Run every registered section over `html`.
    pub fn scrape_document(&self, html: &str) -> MainPageResult {
        let document = Html::parse_document(html);
        let mut result = MainPageResult::default();
        let mut most_read = HeadlineSet::default();

        for section in &self.sections {
            if self.options.skip_sections.iter().any(|s| s == &section.name) {
                debug!(section = %section.name, "Skipping section");
                continue;
            }
            let section_result = section.scrape(&document, &self.options.base_uri);
            if let Some(failure) = section_result.failure {
                result.failures.push(failure);
            }
            match section.role {
                SectionRole::Headlines => result.headlines.extend(section_result.headlines),
                SectionRole::MostRead => most_read.extend(section_result.headlines),
            }
        }

        for headline in result.headlines.iter_mut() {
            if most_read.contains_key(headline.key()) {
                headline.most_read = true;
            }
        }

        info!(
            headlines = result.headlines_scraped(),
            sections = result.sections_scraped(),
            failures = result.failures.len(),
            "Scraped landing page"
        );
        result
    }

    fn is_article(&self, headline: &Headline) -> bool {
        let prefix = format!(
            "{}/{}",
            self.options.base_uri.as_str().trim_end_matches('/'),
            self.options.article_path_prefix.trim_start_matches('/')
        );
        headline
            .target_uri
            .to_ascii_lowercase()
            .starts_with(&prefix.to_ascii_lowercase())
    }

    /// Record article headlines under `job_id`.
    ///
    /// Headlines outside the article path are left unstored. Headlines
    /// already recorded by an earlier run are flagged and not inserted
    /// again. A failure to save one headline is appended to
    /// `result.failures` and does not stop the others. Returns the
    /// headlines that were stubbed, ready for article scraping.
    #[instrument(level = "info", skip_all, fields(job_id = job_id))]
    pub async fn persist(&self, result: &mut MainPageResult, store: &JobStore, job_id: i64) -> Vec<Headline> {
        let mut stubbed = Vec::new();
        let mut skipped_non_article = 0usize;

        for headline in result.headlines.iter_mut() {
            if !self.is_article(headline) {
                skipped_non_article += 1;
                continue;
            }

            let saved = match store.headline_exists(&headline.target_uri).await {
                Ok(true) => {
                    headline.already_in_database = true;
                    continue;
                }
                Ok(false) => store.insert_headline(headline, job_id).await,
                Err(e) => Err(e),
            };

            match saved {
                Ok(id) => {
                    headline.id = Some(id);
                    stubbed.push(headline.clone());
                }
                Err(e) => {
                    let failure = JobFailure::new(
                        format!("Saving headline with target URI {}", headline.target_uri),
                        &ScrapeError::Persistence(e),
                    );
                    warn!(error = %failure.message, uri = %headline.target_uri, "Headline not saved");
                    result.failures.push(failure);
                }
            }
        }

        let already = result.headlines.iter().filter(|h| h.already_in_database).count();
        info!(
            stored = stubbed.len(),
            already_in_database = already,
            skipped_non_article,
            "Persisted headlines"
        );
        stubbed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::fetch::PageSource;
    use crate::scrapers::section::SectionRoot;
    use chrono::Utc;
    use std::path::PathBuf;

    const PAGE: &str = r#"
      <div id="a">
        <div class="Promo"><span class="PagePromoContentIcons-text">One</span><a href="/article/one">x</a></div>
        <div class="Promo"><span class="PagePromoContentIcons-text">Two</span><a href="/article/two">x</a></div>
        <div class="Promo"><span class="PagePromoContentIcons-text">Hub</span><a href="/hub/politics">x</a></div>
      </div>
      <ul id="most-read">
        <li><span class="PagePromoContentIcons-text">Two again</span><a href="/article/two">x</a></li>
        <li><span class="PagePromoContentIcons-text">Elsewhere</span><a href="/article/elsewhere">x</a></li>
      </ul>
    "#;

    fn orchestrator(skip_sections: Vec<String>) -> MainPageOrchestrator {
        let sections = vec![
            SectionSpec::css("A", "div#a", "div.Promo"),
            SectionSpec::new("Most Read", SectionRoot::Css("ul#most-read".into()), "li").most_read(),
            SectionSpec::css("Missing", "div#missing", "div.Promo"),
        ];
        MainPageOrchestrator::new(
            PageFetcher::new(PageSource::FixtureFile(PathBuf::from("/unused"))),
            sections,
            MainPageOptions {
                base_uri: Url::parse("https://apnews.com/").unwrap(),
                article_path_prefix: "/article/".into(),
                skip_sections,
            },
        )
    }

    #[test]
    fn test_most_read_marks_but_does_not_add() {
        let result = orchestrator(vec![]).scrape_document(PAGE);
        assert_eq!(result.headlines_scraped(), 3);
        assert!(result.headlines.get("https://apnews.com/article/two").unwrap().most_read);
        assert!(!result.headlines.get("https://apnews.com/article/one").unwrap().most_read);
        assert!(!result.headlines.contains_key("https://apnews.com/article/elsewhere"));
        assert_eq!(result.failures.len(), 1);
        assert!(!result.is_success());
        assert_eq!(result.sections_scraped(), 1);
    }

    #[test]
    fn test_skipped_section_is_not_run() {
        let result = orchestrator(vec!["Missing".into()]).scrape_document(PAGE);
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_fetch_failure_recorded() {
        let result = orchestrator(vec![]).scrape().await;
        assert_eq!(result.headlines_scraped(), 0);
        assert_eq!(result.failures[0].kind, FailureKind::NetworkFailure);
    }

    #[tokio::test]
    async fn test_persist_filters_and_flags_existing() {
        let store = JobStore::open_in_memory().await.unwrap();
        store.create_schema().await.unwrap();
        let earlier = store.create_job_run(Utc::now()).await.unwrap();
        store
            .insert_headline(&Headline::new("A", "One", "https://apnews.com/article/one", None), earlier)
            .await
            .unwrap();
        let job_id = store.create_job_run(Utc::now()).await.unwrap();

        let orch = orchestrator(vec!["Missing".into()]);
        let mut result = orch.scrape_document(PAGE);
        let stubbed = orch.persist(&mut result, &store, job_id).await;

        let uris: Vec<_> = stubbed.iter().map(|h| h.target_uri.as_str()).collect();
        assert_eq!(uris, vec!["https://apnews.com/article/two"]);
        assert!(stubbed[0].id.is_some());
        assert!(result.headlines.get("https://apnews.com/article/one").unwrap().already_in_database);
        assert_eq!(store.headlines_for_job(job_id).await.unwrap().len(), 1);
    }
}
