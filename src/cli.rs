//! Command-line interface.
//!
//! Flags override the matching keys of `config.yaml`. The curation API key is
//! read from `PERPLEXITY_API_KEY` when not passed explicitly.

use clap::Parser;

use crate::config::AppConfig;

/// Snapshot the AP News landing page and its articles into SQLite.
///
/// # Examples
///
/// ```sh
/// # Live run with config.yaml from the working directory
/// PERPLEXITY_API_KEY=... news_snapshot
///
/// # Offline run against recorded pages, fresh database, no curation
/// news_snapshot -c fixtures.yaml --use-fixtures --delete-existing-database --skip-curation
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to config.yaml (defaults to ./config.yaml when present)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Replay recorded pages instead of fetching live
    #[arg(long)]
    pub use_fixtures: bool,

    /// Drop all tables before running
    #[arg(long)]
    pub delete_existing_database: bool,

    /// Do not call the curation API (also skips analysis)
    #[arg(long)]
    pub skip_curation: bool,

    /// Curate top stories without analyzing each one
    #[arg(long)]
    pub skip_analysis: bool,

    /// SQLite database file
    #[arg(short, long)]
    pub database: Option<String>,

    /// Directory for the JSON run summary
    #[arg(short, long)]
    pub json_output_dir: Option<String>,

    /// Curation API key
    #[arg(long, env = "PERPLEXITY_API_KEY", hide_env_values = true)]
    pub perplexity_api_key: Option<String>,
}

impl Cli {
    /// Fold flags into `config`. Flags only ever switch things on.
    pub fn apply(&self, config: &mut AppConfig) {
        if self.use_fixtures {
            config.scraping.use_fixtures = true;
        }
        if self.delete_existing_database {
            config.database.delete_existing = true;
        }
        if self.skip_curation {
            config.pipeline.skip_curation = true;
        }
        if self.skip_analysis {
            config.pipeline.skip_analysis = true;
        }
        if let Some(path) = &self.database {
            config.database.path = path.clone();
        }
        if let Some(dir) = &self.json_output_dir {
            config.pipeline.json_output_dir = Some(dir.into());
        }
    }
}
