//! Response envelope of the chat completions API and the top-stories JSON
//! carried in `choices[0].message.content`.
//!
//! Two fields drift between shapes across responses:
//!
//! - `selection_criteria`: a string, or an object whose string values are
//!   the criteria (`{"immediacy": "...", "societal_relevance": "..."}`)
//! - `excluded_categories`: an array of strings, or an object whose values
//!   name the categories
//!
//! Both deserialize into untagged enums and normalize once, through
//! [`TextOrFields::normalize`] and [`ListOrFields::normalize`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ScrapeError;
use crate::models::CuratedStory;
use crate::utils::collapse_whitespace;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UsageCost {
    pub input_tokens_cost: Option<f64>,
    pub output_tokens_cost: Option<f64>,
    pub request_cost: Option<f64>,
    pub total_cost: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    pub search_context_size: Option<String>,
    pub cost: Option<UsageCost>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchResult {
    pub title: Option<String>,
    pub url: Option<String>,
    pub date: Option<String>,
    pub last_updated: Option<String>,
    pub snippet: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    pub role: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub finish_reason: Option<String>,
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub id: Option<String>,
    pub model: Option<String>,
    pub usage: Option<Usage>,
    #[serde(default)]
    pub citations: Vec<String>,
    #[serde(default)]
    pub search_results: Vec<SearchResult>,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

/// A field delivered either as plain text or as an object of text fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TextOrFields {
    Text(String),
    Fields(Map<String, Value>),
}

impl TextOrFields {
    /// Canonical form: whitespace-collapsed text; an object's string values
    /// are joined with a single space in document order.
    pub fn normalize(self) -> Result<String, ScrapeError> {
        match self {
            TextOrFields::Text(s) => Ok(collapse_whitespace(&s)),
            TextOrFields::Fields(fields) => {
                let mut parts = Vec::with_capacity(fields.len());
                for (name, value) in fields {
                    match value {
                        Value::String(s) => parts.push(collapse_whitespace(&s)),
                        other => {
                            return Err(ScrapeError::SchemaParse(format!(
                                "selection_criteria.{name} is not a string: {other}"
                            )));
                        }
                    }
                }
                Ok(parts.into_iter().filter(|p| !p.is_empty()).collect::<Vec<_>>().join(" "))
            }
        }
    }
}

/// A field delivered either as a list or as an object whose values form it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListOrFields {
    List(Vec<String>),
    Fields(Map<String, Value>),
}

impl ListOrFields {
    /// Canonical form: non-empty, whitespace-collapsed strings. Object
    /// values may be strings or arrays of strings.
    pub fn normalize(self) -> Result<Vec<String>, ScrapeError> {
        let raw = match self {
            ListOrFields::List(items) => items,
            ListOrFields::Fields(fields) => {
                let mut items = Vec::new();
                for (name, value) in fields {
                    match value {
                        Value::String(s) => items.push(s),
                        Value::Array(values) => {
                            for v in values {
                                match v {
                                    Value::String(s) => items.push(s),
                                    other => {
                                        return Err(ScrapeError::SchemaParse(format!(
                                            "excluded_categories.{name} holds a non-string: {other}"
                                        )));
                                    }
                                }
                            }
                        }
                        other => {
                            return Err(ScrapeError::SchemaParse(format!(
                                "excluded_categories.{name} is not a string or list: {other}"
                            )));
                        }
                    }
                }
                items
            }
        };
        Ok(raw
            .iter()
            .map(|s| collapse_whitespace(s))
            .filter(|s| !s.is_empty())
            .collect())
    }
}

/// The JSON inside `message.content`.
#[derive(Debug, Clone, Deserialize)]
pub struct TopStoriesContent {
    pub top_stories: Vec<CuratedStory>,
    pub selection_criteria: TextOrFields,
    pub excluded_categories: ListOrFields,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn content(selection: &str, excluded: &str) -> TopStoriesContent {
        let json = format!(
            r#"{{"top_stories": [], "selection_criteria": {selection}, "excluded_categories": {excluded}}}"#
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_selection_criteria_shapes_normalize_identically() {
        let text = content(
            r#""National impact.  Immediacy of events.""#,
            "[]",
        );
        let fields = content(
            r#"{"national_international_impact": "National impact.", "immediacy": "Immediacy\n of events."}"#,
            "[]",
        );
        assert_eq!(
            text.selection_criteria.normalize().unwrap(),
            fields.selection_criteria.normalize().unwrap()
        );
    }

    #[test]
    fn test_excluded_categories_shapes_normalize_identically() {
        let list = content(r#""x""#, r#"["Celebrity gossip", "Sports"]"#);
        let map = content(r#""x""#, r#"{"entertainment": "Celebrity gossip", "other": ["Sports"]}"#);
        assert_eq!(
            list.excluded_categories.normalize().unwrap(),
            map.excluded_categories.normalize().unwrap()
        );
    }

    #[test]
    fn test_non_text_criteria_is_schema_failure() {
        let c = content(r#"{"impact": 3}"#, "[]");
        let err = c.selection_criteria.normalize().unwrap_err();
        assert!(matches!(err, ScrapeError::SchemaParse(_)));
    }

    #[test]
    fn test_criteria_of_wrong_kind_fails_to_deserialize() {
        let json = r#"{"top_stories": [], "selection_criteria": 42, "excluded_categories": []}"#;
        assert!(serde_json::from_str::<TopStoriesContent>(json).is_err());
    }
}
