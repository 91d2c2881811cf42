//! Outbound chat request bodies: top-story selection and article analysis
//! share one shape and differ in prompt and response schema.

use serde::Serialize;
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub schema: Value,
    pub strict: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
    pub json_schema: JsonSchemaFormat,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebSearchOptions {
    pub search_context_size: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub response_format: ResponseFormat,
    pub web_search_options: WebSearchOptions,
}

/// Strict schema for the curated response: exactly `top_n` stories, no
/// extra properties anywhere.
pub fn top_stories_schema(top_n: usize) -> Value {
    json!({
        "type": "object",
        "required": ["top_stories", "selection_criteria", "excluded_categories"],
        "properties": {
            "top_stories": {
                "type": "array",
                "minItems": top_n,
                "maxItems": top_n,
                "items": {
                    "type": "object",
                    "required": ["url", "headline", "category", "highlights", "rationale"],
                    "properties": {
                        "url": { "type": "string" },
                        "headline": { "type": "string" },
                        "category": { "type": "string" },
                        "highlights": { "type": "string" },
                        "rationale": { "type": "string" }
                    },
                    "additionalProperties": false
                }
            },
            "selection_criteria": { "type": "string" },
            "excluded_categories": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "additionalProperties": false
    })
}

/// Strict schema for one article analysis: an array of at most one object
/// with a rewritten headline, a summary and one to five key points.
pub fn analysis_schema() -> Value {
    json!({
        "type": "array",
        "minItems": 0,
        "maxItems": 1,
        "items": {
            "type": "object",
            "required": ["custom_headline", "summary", "key_points"],
            "properties": {
                "custom_headline": { "type": "string", "description": "Custom headline" },
                "summary": { "type": "string", "description": "Brief summary" },
                "key_points": {
                    "type": "array",
                    "minItems": 1,
                    "maxItems": 5,
                    "items": { "type": "string" },
                    "description": "Up to 5 key points"
                }
            },
            "additionalProperties": false
        }
    })
}

impl ResponseFormat {
    fn json_schema(name: &str, schema: Value) -> Self {
        Self {
            kind: "json_schema".to_string(),
            json_schema: JsonSchemaFormat {
                name: name.to_string(),
                schema,
                strict: true,
            },
        }
    }

    pub fn top_stories(top_n: usize) -> Self {
        Self::json_schema("top_stories", top_stories_schema(top_n))
    }

    pub fn article_analysis() -> Self {
        Self::json_schema("article_analysis", analysis_schema())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_format_shape() {
        let v = serde_json::to_value(ResponseFormat::top_stories(10)).unwrap();
        assert_eq!(v["type"], "json_schema");
        assert_eq!(v["json_schema"]["strict"], true);
        assert_eq!(v["json_schema"]["name"], "top_stories");

        let schema = &v["json_schema"]["schema"];
        assert_eq!(schema["additionalProperties"], false);
        assert_eq!(
            schema["required"],
            json!(["top_stories", "selection_criteria", "excluded_categories"])
        );
        assert_eq!(schema["properties"]["top_stories"]["minItems"], 10);
        assert_eq!(schema["properties"]["top_stories"]["maxItems"], 10);
        assert_eq!(schema["properties"]["top_stories"]["items"]["additionalProperties"], false);
    }

    #[test]
    fn test_analysis_schema_bounds() {
        let v = serde_json::to_value(ResponseFormat::article_analysis()).unwrap();
        let schema = &v["json_schema"]["schema"];
        assert_eq!(schema["type"], "array");
        assert_eq!(schema["maxItems"], 1);
        let item = &schema["items"];
        assert_eq!(item["required"], json!(["custom_headline", "summary", "key_points"]));
        assert_eq!(item["properties"]["key_points"]["minItems"], 1);
        assert_eq!(item["properties"]["key_points"]["maxItems"], 5);
        assert_eq!(item["additionalProperties"], false);
    }

    #[test]
    fn test_roles_serialize_lowercase() {
        let m = Message {
            role: Role::System,
            content: "x".into(),
        };
        assert_eq!(serde_json::to_value(m).unwrap()["role"], "system");
    }
}
