use std::path::PathBuf;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use news_snapshot::error::FailureKind;
use news_snapshot::fetch::{PageFetcher, PageSource};
use news_snapshot::models::{Article, Headline, PersistState};
use news_snapshot::scrapers::article_page::ArticlePageScraper;
use news_snapshot::store::JobStore;
use pretty_assertions::assert_eq;

const SLUGS: [&str; 5] = ["storm-surge", "senate-vote", "broken-layout", "title-game", "markets-rally"];

fn article_fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/articles")
}

async fn stubbed_headlines(store: &JobStore) -> (i64, Vec<Headline>) {
    let job_id = store.create_job_run(Utc::now()).await.unwrap();
    let mut headlines = Vec::new();
    for slug in SLUGS {
        let mut h = Headline::new("Top Stories", slug, format!("https://apnews.com/article/{slug}"), None);
        h.id = Some(store.insert_headline(&h, job_id).await.unwrap());
        headlines.push(h);
    }
    (job_id, headlines)
}

#[tokio::test]
async fn malformed_article_fails_alone_and_every_row_is_kept() {
    let store = JobStore::open_in_memory().await.unwrap();
    store.create_schema().await.unwrap();
    let (job_id, headlines) = stubbed_headlines(&store).await;

    let scraper = ArticlePageScraper::new(
        PageFetcher::new(PageSource::FixtureDir(article_fixtures())),
        store.clone(),
    );
    let articles: Vec<Article> = stream::iter(&headlines)
        .map(|h| scraper.scrape(h))
        .buffer_unordered(4)
        .collect()
        .await;

    let succeeded = articles.iter().filter(|a| a.is_success()).count();
    assert_eq!(succeeded, 4);

    let failed: Vec<_> = articles.iter().filter(|a| !a.is_success()).collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].source_uri.ends_with("/broken-layout"));
    assert_eq!(failed[0].state, PersistState::Failed);
    assert_eq!(failed[0].failures[0].kind, FailureKind::StructureChanged);
    // fields found before the body failure are kept
    assert_eq!(failed[0].headline.as_deref(), Some("Museum reopens after renovation"));

    let rows = store.articles_for_job(job_id).await.unwrap();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| !r.is_stub()));
    assert_eq!(rows.iter().filter(|r| r.is_success == Some(true)).count(), 4);

    let broken = rows.iter().find(|r| r.source_uri.ends_with("/broken-layout")).unwrap();
    assert!(broken.error.as_deref().unwrap().starts_with("ArticlePageScraper.scrape: "));
    assert!(broken.paragraphs().is_empty());
}

#[tokio::test]
async fn successful_article_fields_are_stored() {
    let store = JobStore::open_in_memory().await.unwrap();
    store.create_schema().await.unwrap();
    let (job_id, headlines) = stubbed_headlines(&store).await;

    let scraper = ArticlePageScraper::new(
        PageFetcher::new(PageSource::FixtureDir(article_fixtures())),
        store.clone(),
    );
    let article = scraper.scrape(&headlines[1]).await;
    assert!(article.is_success());

    let rows = store.articles_for_job(job_id).await.unwrap();
    let row = &rows[0];
    assert_eq!(row.headline.as_deref(), Some("Senate passes spending bill after late-night vote"));
    assert_eq!(row.author.as_deref(), Some("JOHN ROE"));
    assert_eq!(row.published_on.unwrap().timestamp_millis(), 1748775600000);
    assert_eq!(
        row.paragraphs(),
        [
            "WASHINGTON (AP) — The Senate approved a sweeping spending package early Sunday.",
            "The measure now heads to the House, where its fate is uncertain.",
        ]
    );
}
