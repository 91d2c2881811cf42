//! YAML configuration.
//!
//! Every key is optional; missing keys take the defaults below. A minimal
//! file for a deterministic fixture run:
//!
//! ```yaml
//! scraping:
//!   use_fixtures: true
//!   main_page_fixture: tests/fixtures/apnews_main_page.html
//!   article_fixture_dir: tests/fixtures/articles
//! database:
//!   path: snapshot.db
//! curation:
//!   response_fixture: tests/fixtures/curation/string_shape.json
//! analysis:
//!   response_fixture: tests/fixtures/analysis/storm_surge.json
//! ```
//!
//! Analysis shares the curation endpoint, model, timeout, retry count and
//! API key; only its prompts, token budget and fixture are its own.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, instrument};
use url::Url;

use crate::curation::analysis::{DEFAULT_ANALYSIS_SYSTEM_PROMPT, DEFAULT_ANALYSIS_USER_PROMPT};
use crate::curation::{AnalysisOptions, CurationOptions, DEFAULT_SYSTEM_PROMPT, DEFAULT_USER_PROMPT};
use crate::error::PipelineError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scraping: ScrapingConfig,
    pub database: DatabaseConfig,
    pub curation: CurationConfig,
    pub analysis: AnalysisConfig,
    pub pipeline: PipelineConfig,
}

/// Stage switches and run output.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub skip_main_page_scrape: bool,
    pub skip_article_scrape: bool,
    pub skip_curation: bool,
    /// Curate without the per-story analysis calls.
    pub skip_analysis: bool,
    /// Write the run summary as JSON under this directory.
    pub json_output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    pub base_uri: String,
    pub article_path_prefix: String,
    /// Replay recorded pages instead of fetching live.
    pub use_fixtures: bool,
    pub main_page_fixture: Option<PathBuf>,
    pub article_fixture_dir: Option<PathBuf>,
    pub skip_sections: Vec<String>,
    pub article_concurrency: usize,
    pub request_timeout_secs: u64,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            base_uri: "https://apnews.com/".to_string(),
            article_path_prefix: "/article/".to_string(),
            use_fixtures: false,
            main_page_fixture: None,
            article_fixture_dir: None,
            skip_sections: Vec::new(),
            article_concurrency: 4,
            request_timeout_secs: 30,
        }
    }
}

impl ScrapingConfig {
    pub fn base_uri(&self) -> Result<Url, PipelineError> {
        Url::parse(&self.base_uri).map_err(|e| PipelineError::Config(format!("scraping.base_uri: {e}")))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    /// Drop every table before the run. Destroys all earlier runs.
    pub delete_existing: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "news_snapshot.db".to_string(),
            delete_existing: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CurationConfig {
    pub api_uri: String,
    pub model: String,
    pub max_tokens: u32,
    pub top_n: usize,
    pub max_candidates: usize,
    pub search_context_size: String,
    /// Replay this response instead of calling the API.
    pub response_fixture: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub max_retries: usize,
    pub system_prompt: Option<String>,
    pub user_prompt: Option<String>,
}

impl Default for CurationConfig {
    fn default() -> Self {
        let defaults = CurationOptions::default();
        Self {
            api_uri: "https://api.perplexity.ai/chat/completions".to_string(),
            model: defaults.model,
            max_tokens: defaults.max_tokens,
            top_n: defaults.top_n,
            max_candidates: defaults.max_candidates,
            search_context_size: defaults.search_context_size,
            response_fixture: None,
            request_timeout_secs: 120,
            max_retries: 5,
            system_prompt: None,
            user_prompt: None,
        }
    }
}

impl CurationConfig {
    pub fn api_uri(&self) -> Result<Url, PipelineError> {
        Url::parse(&self.api_uri).map_err(|e| PipelineError::Config(format!("curation.api_uri: {e}")))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn options(&self) -> CurationOptions {
        CurationOptions {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            top_n: self.top_n,
            max_candidates: self.max_candidates,
            search_context_size: self.search_context_size.clone(),
            system_prompt: self
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            user_prompt: self
                .user_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_PROMPT.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Replay this response for every analyzed story.
    pub response_fixture: Option<PathBuf>,
    pub system_prompt: Option<String>,
    pub user_prompt: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let defaults = AnalysisOptions::default();
        Self {
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            response_fixture: None,
            system_prompt: None,
            user_prompt: None,
        }
    }
}

impl AnalysisConfig {
    /// Options for the analyzer; model and search context come from `curation`.
    pub fn options(&self, curation: &CurationConfig) -> AnalysisOptions {
        AnalysisOptions {
            model: curation.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            search_context_size: curation.search_context_size.clone(),
            system_prompt: self
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_ANALYSIS_SYSTEM_PROMPT.to_string()),
            user_prompt: self
                .user_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_ANALYSIS_USER_PROMPT.to_string()),
        }
    }
}

impl AppConfig {
    /// Whether the analysis stage will run.
    pub fn analysis_enabled(&self) -> bool {
        !self.pipeline.skip_curation && !self.pipeline.skip_analysis
    }

    /// Load from `path`. When no path is given, `./config.yaml` is used if
    /// present, otherwise defaults.
    #[instrument(level = "info", skip_all)]
    pub fn load(path: Option<&str>) -> Result<Self, PipelineError> {
        let path = match path {
            Some(p) => PathBuf::from(p),
            None if Path::new("config.yaml").exists() => PathBuf::from("config.yaml"),
            None => {
                info!("No config.yaml found; using defaults");
                return Ok(Self::default());
            }
        };
        let text = std::fs::read_to_string(&path)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_yaml(&text)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, PipelineError> {
        serde_yaml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Check cross-field constraints. `api_key` is whatever the CLI or
    /// environment supplied.
    pub fn validate(&self, api_key: Option<&str>) -> Result<(), PipelineError> {
        self.scraping.base_uri()?;
        if self.scraping.article_concurrency == 0 {
            return Err(PipelineError::Config("scraping.article_concurrency must be at least 1".into()));
        }
        if self.scraping.request_timeout_secs == 0 {
            return Err(PipelineError::Config("scraping.request_timeout_secs must be at least 1".into()));
        }
        if self.scraping.use_fixtures {
            if self.scraping.main_page_fixture.is_none() && !self.pipeline.skip_main_page_scrape {
                return Err(PipelineError::Config(
                    "scraping.use_fixtures requires scraping.main_page_fixture".into(),
                ));
            }
            if self.scraping.article_fixture_dir.is_none() && !self.pipeline.skip_article_scrape {
                return Err(PipelineError::Config(
                    "scraping.use_fixtures requires scraping.article_fixture_dir".into(),
                ));
            }
        }
        if self.database.path.trim().is_empty() {
            return Err(PipelineError::Config("database.path is empty".into()));
        }
        if !self.pipeline.skip_curation {
            if self.curation.top_n == 0 {
                return Err(PipelineError::Config("curation.top_n must be at least 1".into()));
            }
            if self.curation.response_fixture.is_none() {
                self.require_live_api(api_key, "curation", "curation.response_fixture")?;
            }
        }
        if self.analysis_enabled() {
            if self.analysis.max_tokens == 0 {
                return Err(PipelineError::Config("analysis.max_tokens must be at least 1".into()));
            }
            if self.analysis.response_fixture.is_none() {
                self.require_live_api(api_key, "analysis", "analysis.response_fixture")?;
            }
        }
        Ok(())
    }

    fn require_live_api(&self, api_key: Option<&str>, stage: &str, fixture_key: &str) -> Result<(), PipelineError> {
        self.curation.api_uri()?;
        if api_key.is_none_or(|k| k.trim().is_empty()) {
            return Err(PipelineError::Config(format!(
                "{stage} needs an API key (PERPLEXITY_API_KEY) or {fixture_key}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(config.scraping.base_uri, "https://apnews.com/");
        assert_eq!(config.scraping.article_concurrency, 4);
        assert_eq!(config.scraping.request_timeout_secs, 30);
        assert_eq!(config.curation.max_tokens, 2000);
        assert_eq!(config.curation.top_n, 10);
        assert!(!config.database.delete_existing);
    }

    #[test]
    fn test_partial_yaml_overrides() {
        let yaml = r#"
scraping:
  use_fixtures: true
  main_page_fixture: fixtures/main.html
  article_fixture_dir: fixtures/articles
  skip_sections: ["Most Read"]
database:
  path: ":memory:"
  delete_existing: true
pipeline:
  skip_curation: true
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert!(config.scraping.use_fixtures);
        assert_eq!(config.scraping.skip_sections, vec!["Most Read"]);
        assert_eq!(config.database.path, ":memory:");
        assert!(config.database.delete_existing);
        assert!(config.pipeline.skip_curation);
        assert!(config.pipeline.json_output_dir.is_none());
        config.validate(None).unwrap();
    }

    #[test]
    fn test_live_curation_requires_key() {
        let config = AppConfig::default();
        assert!(config.validate(None).is_err());
        assert!(config.validate(Some("  ")).is_err());
        config.validate(Some("pplx-key")).unwrap();
    }

    #[test]
    fn test_fixture_mode_requires_paths() {
        let mut config = AppConfig::default();
        config.pipeline.skip_curation = true;
        config.scraping.use_fixtures = true;
        assert!(config.validate(None).is_err());
    }

    #[test]
    fn test_bad_base_uri_rejected() {
        let mut config = AppConfig::default();
        config.pipeline.skip_curation = true;
        config.scraping.base_uri = "not a uri".into();
        assert!(matches!(config.validate(None), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_curation_options_use_default_prompts() {
        let options = CurationConfig::default().options();
        assert_eq!(options.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(options.model, "sonar");
    }

    #[test]
    fn test_analysis_defaults_and_shared_model() {
        let config = AppConfig::from_yaml("curation:\n  model: sonar-pro\nanalysis:\n  max_tokens: 900\n").unwrap();
        let options = config.analysis.options(&config.curation);
        assert_eq!(options.model, "sonar-pro");
        assert_eq!(options.max_tokens, 900);
        assert!((options.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(options.system_prompt, DEFAULT_ANALYSIS_SYSTEM_PROMPT);
    }

    #[test]
    fn test_analysis_fixture_alone_still_needs_key_for_curation() {
        let mut config = AppConfig::default();
        config.analysis.response_fixture = Some("a.json".into());
        assert!(config.validate(None).is_err());

        config.curation.response_fixture = Some("c.json".into());
        config.validate(None).unwrap();
    }

    #[test]
    fn test_live_analysis_requires_key() {
        let mut config = AppConfig::default();
        config.curation.response_fixture = Some("c.json".into());
        let err = config.validate(None).unwrap_err();
        assert!(err.to_string().contains("analysis needs an API key"));

        config.pipeline.skip_analysis = true;
        config.validate(None).unwrap();
    }
}
