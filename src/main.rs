//! Command-line entry point.
//!
//! ```sh
//! news_snapshot -c config.yaml
//! ```
//!
//! Exits non-zero when the run recorded any failure.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

use news_snapshot::api::{FixturePost, HttpPost, RetryPost, Transport};
use news_snapshot::cli::Cli;
use news_snapshot::config::AppConfig;
use news_snapshot::curation::{ArticleAnalyzer, CurationClient};
use news_snapshot::error::PipelineError;
use news_snapshot::fetch::{PageFetcher, PageSource, build_http_client};
use news_snapshot::outputs::json;
use news_snapshot::pipeline::{PipelineOptions, PipelineOrchestrator};
use news_snapshot::scrapers::article_page::ArticlePageScraper;
use news_snapshot::scrapers::catalog::ap_news_sections;
use news_snapshot::scrapers::main_page::{MainPageOptions, MainPageOrchestrator};
use news_snapshot::store::JobStore;
use news_snapshot::utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_snapshot starting up");

    let args = Cli::parse();
    debug!(config = ?args.config, use_fixtures = args.use_fixtures, "Parsed CLI arguments");

    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate(args.perplexity_api_key.as_deref())?;

    // Early check: the summary must be writable before any scraping happens
    if let Some(dir) = &config.pipeline.json_output_dir {
        let dir = dir.display().to_string();
        if let Err(e) = ensure_writable_dir(&dir).await {
            error!(path = %dir, error = %e, "JSON output directory is not writable");
            anyhow::bail!("JSON output directory {dir} is not writable: {e}");
        }
    }

    // ---- Store ----
    let store = open_store(&config).await?;

    // ---- Scrapers ----
    let base_uri = config.scraping.base_uri()?;
    let (main_source, article_source) = if config.scraping.use_fixtures {
        info!("Using recorded fixtures for page fetches");
        (
            PageSource::FixtureFile(config.scraping.main_page_fixture.clone().unwrap_or_default()),
            PageSource::FixtureDir(config.scraping.article_fixture_dir.clone().unwrap_or_default()),
        )
    } else {
        let client = build_http_client(config.scraping.request_timeout())?;
        (PageSource::Live(client.clone()), PageSource::Live(client))
    };

    let main_page = MainPageOrchestrator::new(
        PageFetcher::new(main_source),
        ap_news_sections(),
        MainPageOptions {
            base_uri,
            article_path_prefix: config.scraping.article_path_prefix.clone(),
            skip_sections: config.scraping.skip_sections.clone(),
        },
    );
    let articles = ArticlePageScraper::new(PageFetcher::new(article_source), store.clone());

    // ---- Curation ----
    let api_key = args.perplexity_api_key.as_deref().unwrap_or_default();
    let curation = if config.pipeline.skip_curation {
        None
    } else {
        let transport = build_transport(&config, config.curation.response_fixture.as_deref(), api_key, "curation")?;
        Some(CurationClient::new(transport, config.curation.options()))
    };
    let analyzer = if config.analysis_enabled() {
        let transport = build_transport(&config, config.analysis.response_fixture.as_deref(), api_key, "analysis")?;
        Some(ArticleAnalyzer::new(transport, config.analysis.options(&config.curation)))
    } else {
        None
    };

    // ---- Run ----
    let mut pipeline = PipelineOrchestrator::new(
        store.clone(),
        main_page,
        articles,
        curation,
        PipelineOptions {
            skip_main_page_scrape: config.pipeline.skip_main_page_scrape,
            skip_article_scrape: config.pipeline.skip_article_scrape,
            skip_curation: config.pipeline.skip_curation,
            skip_analysis: config.pipeline.skip_analysis,
            article_concurrency: config.scraping.article_concurrency,
        },
    );
    if let Some(analyzer) = analyzer {
        pipeline = pipeline.with_analyzer(analyzer);
    }
    let summary = pipeline.run().await.context("job run could not be recorded")?;
    summary.log();

    if let Some(dir) = &config.pipeline.json_output_dir {
        if let Err(e) = json::write_run_summary(&summary, dir).await {
            warn!(error = %e, "Could not write JSON run summary");
        }
    }

    store.close().await;

    let elapsed = start_time.elapsed();
    info!(
        elapsed_secs = elapsed.as_secs_f64(),
        elapsed_human = %format!("{:.2?}", elapsed),
        job_id = summary.job_id,
        is_success = summary.is_success,
        "news_snapshot finished"
    );

    Ok(if summary.is_success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Recorded replies when a fixture is configured, otherwise the live
/// endpoint behind the retry decorator.
fn build_transport(
    config: &AppConfig,
    fixture: Option<&Path>,
    api_key: &str,
    stage: &str,
) -> Result<Transport, PipelineError> {
    if let Some(path) = fixture {
        info!(stage, path = %path.display(), "Using recorded API responses");
        return Ok(Transport::Fixture(FixturePost::new(path)));
    }
    let client = build_http_client(config.curation.request_timeout())?;
    let post = HttpPost::new(client, config.curation.api_uri()?, api_key);
    Ok(Transport::Live(RetryPost::new(
        post,
        config.curation.max_retries,
        Duration::from_secs(1),
    )))
}

async fn open_store(config: &AppConfig) -> Result<JobStore, PipelineError> {
    let path = config.database.path.clone();
    let unavailable = |source: sqlx::Error| PipelineError::StoreUnavailable {
        path: path.clone(),
        source,
    };

    let store = JobStore::open(&path).await.map_err(unavailable)?;
    if config.database.delete_existing {
        warn!(path = %path, "Dropping all tables before the run");
        store.recreate().await.map_err(unavailable)?;
    } else {
        store.create_schema().await.map_err(unavailable)?;
    }
    info!(path = %path, "Job store ready");
    Ok(store)
}
