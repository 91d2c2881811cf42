//! Shared extraction engine for landing-page sections.
//!
//! A section is pure data ([`SectionSpec`]): where its root node is, which
//! nodes inside it are headline items, and how each item's "last updated"
//! timestamp is read. Sections whose template needs procedural handling
//! attach a [`SectionHook`], which runs once before the regular item sweep.
//!
//! Extraction is synchronous: `scraper::Html` is not `Send`, so callers
//! parse and scrape without holding the document across an `.await`.

use std::fmt;
use std::sync::Arc;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::error::{JobFailure, ScrapeError};
use crate::models::{Headline, HeadlineSet, ScrapeSectionResult};
use crate::utils::{collapse_whitespace, normalize_uri, parse_unix_millis};

pub const DEFAULT_TITLE_SELECTOR: &str = "span.PagePromoContentIcons-text";
pub const DEFAULT_LINK_SELECTOR: &str = "a[href]";
pub const DEFAULT_TIMESTAMP_SELECTOR: &str = "div.PagePromo";
pub const DEFAULT_TIMESTAMP_ATTR: &str = "data-updated-date-timestamp";

/// How to find a section's root node.
#[derive(Debug, Clone)]
pub enum SectionRoot {
    /// First node matching a CSS selector.
    Css(String),
    /// First `container` node holding a `heading` node whose text contains
    /// `text` (ASCII case-insensitive). Used for templates that differ only
    /// by their visible heading.
    Heading {
        container: String,
        heading: String,
        text: String,
    },
}

/// Where an item's Unix-millisecond timestamp lives.
#[derive(Debug, Clone)]
pub enum TimestampRule {
    /// Attribute on the item node itself.
    OwnAttr(String),
    /// Attribute on the first descendant matching `selector`.
    Nested { selector: String, attr: String },
}

impl Default for TimestampRule {
    fn default() -> Self {
        TimestampRule::Nested {
            selector: DEFAULT_TIMESTAMP_SELECTOR.to_string(),
            attr: DEFAULT_TIMESTAMP_ATTR.to_string(),
        }
    }
}

/// What the orchestrator does with a section's headlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionRole {
    Headlines,
    /// Headlines only flag matching ones from other sections as most-read.
    MostRead,
}

/// Procedural pre-processing for a section.
pub trait SectionHook: fmt::Debug + Send + Sync {
    fn pre_process(
        &self,
        section_name: &str,
        rules: &ItemRules,
        root: ElementRef<'_>,
        base: &Url,
        out: &mut HeadlineSet,
    ) -> Result<(), ScrapeError>;
}

/// Adds the lead story that sits outside the repeated item pattern.
///
/// The lead node is optional: a section without one is swept normally. A
/// lead that also matches the item selector is not counted twice because
/// the output set is keyed by target URI.
#[derive(Debug, Clone)]
pub struct LeadStory {
    pub container: String,
}

impl LeadStory {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
        }
    }
}

impl SectionHook for LeadStory {
    fn pre_process(
        &self,
        section_name: &str,
        rules: &ItemRules,
        root: ElementRef<'_>,
        base: &Url,
        out: &mut HeadlineSet,
    ) -> Result<(), ScrapeError> {
        let selector = compile(&self.container)?;
        match root.select(&selector).next() {
            Some(lead) => {
                if let Some(headline) = rules.extract(section_name, lead, base)? {
                    debug!(section = section_name, uri = %headline.target_uri, "Added lead story");
                    out.insert(headline);
                }
            }
            None => debug!(section = section_name, container = %self.container, "No lead story"),
        }
        Ok(())
    }
}

/// Declarative description of one landing-page section.
#[derive(Debug, Clone)]
pub struct SectionSpec {
    pub name: String,
    pub root: SectionRoot,
    pub items: String,
    pub title: String,
    pub link: String,
    pub timestamp: TimestampRule,
    pub hook: Option<Arc<dyn SectionHook>>,
    pub role: SectionRole,
}

impl SectionSpec {
    /// Create a section with the default title, link and timestamp rules.
    ///
    /// # Arguments
    ///
    /// * `name` - Section name recorded on every headline it yields
    /// * `root` - How to find the section's root node
    /// * `items` - CSS selector for headline items inside the root
    ///
    /// # Example
    ///
    /// ```ignore
    /// let sports = SectionSpec::new(
    ///     "Sports",
    ///     SectionRoot::Heading {
    ///         container: "div.PageList-items".into(),
    ///         heading: "h2".into(),
    ///         text: "Sports".into(),
    ///     },
    ///     "div.PageList-items-item",
    /// );
    /// ```
    pub fn new(name: impl Into<String>, root: SectionRoot, items: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root,
            items: items.into(),
            title: DEFAULT_TITLE_SELECTOR.to_string(),
            link: DEFAULT_LINK_SELECTOR.to_string(),
            timestamp: TimestampRule::default(),
            hook: None,
            role: SectionRole::Headlines,
        }
    }

    /// Shorthand for a section whose root is the first match of a CSS selector.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let spec = SectionSpec::css("Top Stories", "div.PageListStandardE", "div.PagePromo")
    ///     .with_own_timestamp("data-updated-date-timestamp");
    /// ```
    pub fn css(name: impl Into<String>, root: impl Into<String>, items: impl Into<String>) -> Self {
        Self::new(name, SectionRoot::Css(root.into()), items)
    }

    /// Replace the timestamp rule. Defaults to the nested `div.PagePromo` attribute.
    pub fn with_timestamp(mut self, rule: TimestampRule) -> Self {
        self.timestamp = rule;
        self
    }

    /// Read the timestamp from `attr` on the item node itself.
    pub fn with_own_timestamp(self, attr: impl Into<String>) -> Self {
        self.with_timestamp(TimestampRule::OwnAttr(attr.into()))
    }

    pub fn with_title(mut self, selector: impl Into<String>) -> Self {
        self.title = selector.into();
        self
    }

    /// Attach a hook that runs once before the item sweep.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let spec = SectionSpec::css("Lead", "div.PageListStandardB", "div.PagePromo")
    ///     .with_hook(LeadStory::new("div.PageList-items-first"));
    /// ```
    pub fn with_hook(mut self, hook: impl SectionHook + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Mark the section as the most-read list instead of a headline source.
    pub fn most_read(mut self) -> Self {
        self.role = SectionRole::MostRead;
        self
    }

    /// Source tag attached to this section's failure.
    pub fn failure_source(&self) -> String {
        format!("Scraping section {}", self.name)
    }

    /// Scrape this section. Never fails: any error becomes the result's
    /// single failure and the section contributes no headlines.
    pub fn scrape(&self, document: &Html, base: &Url) -> ScrapeSectionResult {
        match self.extract(document, base) {
            Ok(headlines) => {
                debug!(section = %self.name, count = headlines.len(), "Scraped section");
                ScrapeSectionResult::succeeded(&self.name, headlines)
            }
            Err(e) => {
                warn!(section = %self.name, error = %e, "Section scrape failed");
                ScrapeSectionResult::failed(&self.name, JobFailure::new(self.failure_source(), &e))
            }
        }
    }

    fn extract(&self, document: &Html, base: &Url) -> Result<HeadlineSet, ScrapeError> {
        let rules = ItemRules::compile(&self.title, &self.link, &self.timestamp)?;
        let items = compile(&self.items)?;
        let root = self.locate_root(document)?;

        let mut headlines = HeadlineSet::default();
        if let Some(hook) = &self.hook {
            hook.pre_process(&self.name, &rules, root, base, &mut headlines)?;
        }

        let nodes: Vec<ElementRef<'_>> = root.select(&items).collect();
        if nodes.is_empty() && headlines.is_empty() {
            return Err(ScrapeError::StructureChanged(format!(
                "no `{}` items in section root",
                self.items
            )));
        }

        for node in nodes {
            if let Some(headline) = rules.extract(&self.name, node, base)? {
                headlines.insert(headline);
            }
        }
        Ok(headlines)
    }

    fn locate_root<'a>(&self, document: &'a Html) -> Result<ElementRef<'a>, ScrapeError> {
        match &self.root {
            SectionRoot::Css(selector) => {
                let sel = compile(selector)?;
                document
                    .select(&sel)
                    .next()
                    .ok_or_else(|| ScrapeError::StructureChanged(format!("section root `{selector}` not found")))
            }
            SectionRoot::Heading {
                container,
                heading,
                text,
            } => {
                let container_sel = compile(container)?;
                let heading_sel = compile(heading)?;
                let needle = text.to_ascii_lowercase();
                document
                    .select(&container_sel)
                    .find(|c| {
                        c.select(&heading_sel).any(|h| {
                            collapse_whitespace(&h.text().collect::<String>())
                                .to_ascii_lowercase()
                                .contains(&needle)
                        })
                    })
                    .ok_or_else(|| {
                        ScrapeError::StructureChanged(format!(
                            "section root `{container}` with heading \"{text}\" not found"
                        ))
                    })
            }
        }
    }
}

/// Compiled per-item selectors.
#[derive(Debug)]
pub struct ItemRules {
    title: Selector,
    link: Selector,
    timestamp: CompiledTimestamp,
}

#[derive(Debug)]
enum CompiledTimestamp {
    OwnAttr(String),
    Nested(Selector, String),
}

impl ItemRules {
    pub fn compile(title: &str, link: &str, timestamp: &TimestampRule) -> Result<Self, ScrapeError> {
        let timestamp = match timestamp {
            TimestampRule::OwnAttr(attr) => CompiledTimestamp::OwnAttr(attr.clone()),
            TimestampRule::Nested { selector, attr } => CompiledTimestamp::Nested(compile(selector)?, attr.clone()),
        };
        Ok(Self {
            title: compile(title)?,
            link: compile(link)?,
            timestamp,
        })
    }

    /// `Ok(None)` when the item lacks a title or a link.
    pub fn extract(&self, section_name: &str, item: ElementRef<'_>, base: &Url) -> Result<Option<Headline>, ScrapeError> {
        let title = item
            .select(&self.title)
            .next()
            .map(|t| collapse_whitespace(&t.text().collect::<String>()))
            .filter(|t| !t.is_empty());
        let href = item
            .select(&self.link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::trim)
            .filter(|h| !h.is_empty());

        let (Some(title), Some(href)) = (title, href) else {
            debug!(section = section_name, "Skipping item without title or link");
            return Ok(None);
        };

        let uri = normalize_uri(base, href).map_err(|source| ScrapeError::InvalidUri {
            uri: href.to_string(),
            source,
        })?;

        let raw_timestamp = match &self.timestamp {
            CompiledTimestamp::OwnAttr(attr) => item.value().attr(attr),
            CompiledTimestamp::Nested(selector, attr) => {
                item.select(selector).next().and_then(|n| n.value().attr(attr))
            }
        };

        Ok(Some(Headline::new(
            section_name,
            title,
            uri.to_string(),
            raw_timestamp.and_then(parse_unix_millis),
        )))
    }
}

pub(crate) fn compile(selector: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(selector).map_err(|e| ScrapeError::Selector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}
