//! Job-level sequencing: landing page, then articles, then curation, then
//! analysis of each curated story.
//!
//! The job-run row is created before anything else and finished exactly
//! once at the end. Per-item failures never stop a stage; they are
//! collected on the [`JobRun`] and make the run unsuccessful. Every API call
//! that was actually sent leaves an audit row.

use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::curation::{ApiCall, ArticleAnalyzer, CurationClient, CurationResult};
use crate::error::{JobFailure, PipelineError, ScrapeError};
use crate::models::{Article, ArticleAnalysis, ArticleSet, Headline, JobRun};
use crate::scrapers::article_page::ArticlePageScraper;
use crate::scrapers::main_page::MainPageOrchestrator;
use crate::store::JobStore;

const CURATION_SOURCE: &str = "CurationClient.curate";
const ANALYSIS_SOURCE: &str = "ArticleAnalyzer.analyze";

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub skip_main_page_scrape: bool,
    pub skip_article_scrape: bool,
    pub skip_curation: bool,
    pub skip_analysis: bool,
    /// Article pages fetched at once.
    pub article_concurrency: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            skip_main_page_scrape: false,
            skip_article_scrape: false,
            skip_curation: false,
            skip_analysis: false,
            article_concurrency: 4,
        }
    }
}

/// What one run did, for the operator and for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub job_id: i64,
    pub started_on: DateTime<Utc>,
    pub finished_on: Option<DateTime<Utc>>,
    pub run_time_in_seconds: Option<f64>,
    pub is_success: bool,
    pub sections_scraped: usize,
    pub headlines_scraped: usize,
    pub headlines_already_recorded: usize,
    pub articles_attempted: usize,
    pub articles_scraped: usize,
    pub failures: Vec<JobFailure>,
    pub curation: Option<CurationResult>,
    pub analyses: Vec<ArticleAnalysis>,
}

impl RunSummary {
    fn from_run(run: &JobRun) -> Self {
        Self {
            job_id: run.id,
            started_on: run.started_on,
            finished_on: run.finished_on,
            run_time_in_seconds: run.run_time_in_seconds(),
            is_success: run.is_success,
            sections_scraped: run.sections_scraped,
            headlines_scraped: run.headlines_scraped,
            headlines_already_recorded: 0,
            articles_attempted: 0,
            articles_scraped: run.articles_scraped,
            failures: run.failures.clone(),
            curation: None,
            analyses: Vec::new(),
        }
    }

    /// Print the summary and the enumerated failures.
    pub fn log(&self) {
        info!(
            target: "summary",
            "Job {} {} in {:.3}s: {} sections, {} headlines ({} already recorded), {}/{} articles",
            self.job_id,
            if self.is_success { "succeeded" } else { "failed" },
            self.run_time_in_seconds.unwrap_or_default(),
            self.sections_scraped,
            self.headlines_scraped,
            self.headlines_already_recorded,
            self.articles_scraped,
            self.articles_attempted,
        );
        for (i, failure) in self.failures.iter().enumerate() {
            info!(target: "summary", "  {}. [{}] {}: {}", i + 1, failure.kind, failure.source, failure.message);
        }
        if let Some(curation) = &self.curation {
            for (i, story) in curation.stories.iter().enumerate() {
                info!(target: "summary", "  #{} {} ({}) {}", i + 1, story.headline, story.category, story.url);
            }
        }
        for analysis in &self.analyses {
            info!(
                target: "summary",
                "  {} | {} key points | {}",
                analysis.custom_headline,
                analysis.key_points.len(),
                analysis.source_uri
            );
        }
    }
}

#[derive(Debug)]
pub struct PipelineOrchestrator {
    store: JobStore,
    main_page: MainPageOrchestrator,
    articles: ArticlePageScraper,
    curation: Option<CurationClient>,
    analyzer: Option<ArticleAnalyzer>,
    options: PipelineOptions,
}

impl PipelineOrchestrator {
    pub fn new(
        store: JobStore,
        main_page: MainPageOrchestrator,
        articles: ArticlePageScraper,
        curation: Option<CurationClient>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            main_page,
            articles,
            curation,
            analyzer: None,
            options,
        }
    }

    /// Analyze each curated story after selection.
    pub fn with_analyzer(mut self, analyzer: ArticleAnalyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Run every enabled stage under a new job run.
    ///
    /// Fails only when the job-run row cannot be created or finalized.
    #[instrument(level = "info", skip_all)]
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let t0 = Instant::now();
        let started_on = Utc::now();
        let job_id = self
            .store
            .create_job_run(started_on)
            .await
            .map_err(PipelineError::JobRun)?;
        let mut run = JobRun::new(job_id, started_on);
        info!(job_id, "Job run started");

        let (stubbed, already_recorded) = self.scrape_main_page(&mut run).await;
        let articles = self.scrape_articles(&mut run, &stubbed).await;
        let curation = self.curate(&mut run, &articles).await;
        let analyses = self.analyze(&mut run, &articles, curation.as_ref()).await;

        run.finish(Utc::now());
        let finalized = self.store.finish_job_run(&run).await;

        let mut summary = RunSummary::from_run(&run);
        summary.headlines_already_recorded = already_recorded;
        summary.articles_attempted = articles.len();
        summary.curation = curation;
        summary.analyses = analyses;

        info!(
            job_id,
            is_success = run.is_success,
            failures = run.failures.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Job run finished"
        );

        if let Err(e) = finalized {
            error!(job_id, error = %e, "Could not record job run result");
            return Err(PipelineError::JobRun(e));
        }
        Ok(summary)
    }

    /// Returns the stubbed headlines and how many were already recorded.
    async fn scrape_main_page(&self, run: &mut JobRun) -> (Vec<Headline>, usize) {
        if self.options.skip_main_page_scrape {
            info!("Skipping landing page scrape");
            return (Vec::new(), 0);
        }

        let mut result = self.main_page.scrape().await;
        let stubbed = self.main_page.persist(&mut result, &self.store, run.id).await;

        run.sections_scraped = result.sections_scraped();
        run.headlines_scraped = result.headlines_scraped();
        let already = result.headlines.iter().filter(|h| h.already_in_database).count();
        for failure in result.failures {
            run.record_failure(failure);
        }
        (stubbed, already)
    }

    #[instrument(level = "info", skip_all, fields(headlines = headlines.len()))]
    async fn scrape_articles(&self, run: &mut JobRun, headlines: &[Headline]) -> ArticleSet {
        let mut articles = ArticleSet::default();
        if self.options.skip_article_scrape {
            info!("Skipping article scrape");
            return articles;
        }

        let concurrency = self.options.article_concurrency.max(1);
        let scraped: Vec<Article> = stream::iter(headlines)
            .map(|h| self.articles.scrape(h))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for article in scraped {
            for failure in &article.failures {
                run.record_failure(JobFailure {
                    source: format!("{} ({})", failure.source, article.source_uri),
                    ..failure.clone()
                });
            }
            if !articles.insert(article) {
                warn!("Duplicate article result dropped");
            }
        }
        run.articles_scraped = articles.iter().filter(|a| a.is_success()).count();
        info!(
            succeeded = run.articles_scraped,
            failed = articles.len() - run.articles_scraped,
            "Scraped articles"
        );
        articles
    }

    async fn curate(&self, run: &mut JobRun, articles: &ArticleSet) -> Option<CurationResult> {
        if self.options.skip_curation {
            info!("Skipping curation");
            return None;
        }
        let Some(client) = &self.curation else {
            warn!("No curation client configured; skipping curation");
            return None;
        };

        let succeeded: Vec<Article> = articles.iter().filter(|a| a.is_success()).cloned().collect();
        if succeeded.is_empty() {
            info!("No scraped articles to curate");
            return None;
        }

        let exchange = client.curate(&succeeded).await;
        self.record_api_call(run.id, exchange.call).await;
        match exchange.outcome {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(kind = %e.kind(), error = %e, "Curation failed");
                run.record_failure(JobFailure::new(CURATION_SOURCE, &e));
                None
            }
        }
    }

    /// One analysis call per curated story that maps to a successfully
    /// scraped article of this run. Stories that map to nothing are skipped
    /// with a warning.
    #[instrument(level = "info", skip_all)]
    async fn analyze(
        &self,
        run: &mut JobRun,
        articles: &ArticleSet,
        curation: Option<&CurationResult>,
    ) -> Vec<ArticleAnalysis> {
        let mut analyses = Vec::new();
        if self.options.skip_curation || self.options.skip_analysis {
            info!("Skipping article analysis");
            return analyses;
        }
        let (Some(analyzer), Some(curation)) = (&self.analyzer, curation) else {
            debug!("No analyzer or no curated stories; skipping analysis");
            return analyses;
        };

        for story in curation.stories.iter().unique_by(|s| s.url.clone()) {
            let Some(article) = articles.get(&story.url).filter(|a| a.is_success()) else {
                warn!(url = %story.url, "Curated story matches no scraped article; not analyzed");
                continue;
            };
            let source = format!("{ANALYSIS_SOURCE} ({})", article.source_uri);

            let exchange = analyzer.analyze(article).await;
            self.record_api_call(run.id, exchange.call).await;
            let mut analysis = match exchange.outcome {
                Ok(analysis) => analysis,
                Err(e) => {
                    warn!(kind = %e.kind(), error = %e, uri = %article.source_uri, "Article analysis failed");
                    run.record_failure(JobFailure::new(source, &e));
                    continue;
                }
            };
            match self.store.insert_analysis(&analysis).await {
                Ok(id) => {
                    analysis.id = Some(id);
                    analyses.push(analysis);
                }
                Err(e) => {
                    let e = ScrapeError::Persistence(e);
                    error!(error = %e, uri = %article.source_uri, "Could not store article analysis");
                    run.record_failure(JobFailure::new(source, &e));
                }
            }
        }
        info!(analyzed = analyses.len(), stories = curation.stories.len(), "Analyzed curated stories");
        analyses
    }

    /// Write the audit row for a call that was sent. A failed write is
    /// logged only.
    async fn record_api_call(&self, job_id: i64, call: Option<ApiCall>) {
        let Some(call) = call else {
            return;
        };
        if let Err(e) = self.store.insert_api_call(job_id, &call).await {
            error!(job_id, purpose = call.purpose.as_str(), error = %e, "Could not record API call");
        }
    }
}
