//! # AI Extraction Oracle
//!
//! Contract for the external AI extraction call and an OpenAI-compatible
//! implementation. The oracle is an untrusted collaborator: its responses
//! are validated against a strict schema, and every failure is reported as
//! a [`PipelineError`] that the pipeline records and then ignores.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::item_model::ItemSource;
use crate::pipeline_config::OracleConfig;
use crate::pipeline_errors::PipelineError;

const SYSTEM_PROMPT: &str = "You are a food rescue intake extractor. Read the volunteer message \
(and any attached photos) and return JSON only. Report the pickup location, the drop-off location, \
a one-sentence summary and every food item with its quantity, unit, container, notes, your \
confidence between 0 and 1, and whether you saw it in the text, an image or both. Use null for \
anything the message does not say. Never invent items.";

/// An image attachment as sent to the oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleImage {
    pub mime: String,
    /// `data:` URL or a fetchable https URL
    pub data_or_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleRequest {
    pub text: String,
    pub images: Vec<OracleImage>,
}

/// One item as reported by the oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OracleItem {
    pub name: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub container: Option<String>,
    pub notes: Option<String>,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub sources: Vec<ItemSource>,
}

/// Full oracle response; unknown fields are rejected
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OracleResponse {
    pub location: Option<String>,
    pub drop_off_location: Option<String>,
    pub summary: Option<String>,
    pub items: Vec<OracleItem>,
    pub notes: Option<String>,
}

/// The external AI extraction service
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    async fn extract(&self, request: &OracleRequest) -> Result<OracleResponse, PipelineError>;

    /// Name used in logs
    fn name(&self) -> &str {
        "oracle"
    }
}

/// Parse and validate the JSON text returned by the oracle.
///
/// A surrounding Markdown code fence is tolerated; anything else that does
/// not match the schema is an [`PipelineError::OracleSchema`].
pub fn parse_oracle_payload(payload: &str) -> Result<OracleResponse, PipelineError> {
    let trimmed = payload.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let response: OracleResponse = serde_json::from_str(body)?;
    if let Some(bad) = response.items.iter().find(|item| item.name.trim().is_empty()) {
        return Err(PipelineError::OracleSchema(format!("item without a name: {bad:?}")));
    }
    Ok(response)
}

fn nullable(kind: &str) -> Value {
    json!({ "type": [kind, "null"] })
}

/// JSON schema sent with every request (strict mode: every field required,
/// nullable where optional, no additional properties)
pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["location", "drop_off_location", "summary", "items", "notes"],
        "properties": {
            "location": nullable("string"),
            "drop_off_location": nullable("string"),
            "summary": nullable("string"),
            "notes": nullable("string"),
            "items": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["name", "quantity", "unit", "container", "notes", "confidence", "sources"],
                    "properties": {
                        "name": { "type": "string" },
                        "quantity": nullable("number"),
                        "unit": nullable("string"),
                        "container": nullable("string"),
                        "notes": nullable("string"),
                        "confidence": nullable("number"),
                        "sources": {
                            "type": "array",
                            "items": { "type": "string", "enum": ["text", "image"] }
                        }
                    }
                }
            }
        }
    })
}

/// OpenAI-compatible chat completions oracle
pub struct OpenAiOracle {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl OpenAiOracle {
    /// Build an oracle from configuration; fails when no API key is configured
    pub fn new(config: &OracleConfig) -> Result<Self, PipelineError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| PipelineError::Validation("oracle API key is not configured".to_string()))?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PipelineError::Oracle(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
        })
    }

    /// Chat completion request body for one message
    pub fn request_body(&self, request: &OracleRequest) -> Value {
        let mut content = vec![json!({ "type": "text", "text": request.text })];
        content.extend(request.images.iter().map(|image| {
            json!({
                "type": "image_url",
                "image_url": { "url": image.data_or_url, "detail": "auto" }
            })
        }));

        json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": content }
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "rescue_extraction",
                    "strict": true,
                    "schema": response_schema()
                }
            }
        })
    }
}

#[async_trait]
impl ExtractionOracle for OpenAiOracle {
    async fn extract(&self, request: &OracleRequest) -> Result<OracleResponse, PipelineError> {
        debug!(
            model = %self.model,
            images = request.images.len(),
            text_len = request.text.len(),
            "Sending extraction request"
        );

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(300).collect();
            warn!(status = status.as_u16(), "Oracle returned an error status");
            return Err(PipelineError::Oracle(format!("HTTP {status}: {snippet}")));
        }

        let envelope: Value = response.json().await?;
        let content = envelope["choices"]
            .get(0)
            .and_then(|choice| choice["message"]["content"].as_str())
            .ok_or_else(|| PipelineError::OracleSchema("response has no message content".to_string()))?;

        parse_oracle_payload(content)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "location": "Aldi WP",
        "drop_off_location": "UC",
        "summary": "Produce run",
        "items": [
            {"name": "bananas", "quantity": 2, "unit": "cases", "container": null,
             "notes": null, "confidence": 0.9, "sources": ["text", "image"]}
        ],
        "notes": null
    }"#;

    #[test]
    fn test_parse_valid_payload() {
        let response = parse_oracle_payload(VALID).unwrap();
        assert_eq!(response.location.as_deref(), Some("Aldi WP"));
        assert_eq!(response.items.len(), 1);
        assert_eq!(response.items[0].quantity, Some(2.0));
        assert_eq!(response.items[0].sources, vec![ItemSource::Text, ItemSource::Image]);
    }

    #[test]
    fn test_parse_fenced_payload() {
        let fenced = format!("```json\n{VALID}\n```");
        assert!(parse_oracle_payload(&fenced).is_ok());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let extra_top = r#"{"location": null, "drop_off_location": null, "summary": null,
            "items": [], "notes": null, "direction": "inbound"}"#;
        assert!(matches!(parse_oracle_payload(extra_top), Err(PipelineError::OracleSchema(_))));

        let extra_item = r#"{"location": null, "drop_off_location": null, "summary": null, "notes": null,
            "items": [{"name": "x", "quantity": 1, "unit": null, "container": null, "notes": null,
                       "confidence": null, "sources": [], "estimated_lbs": 4}]}"#;
        assert!(matches!(parse_oracle_payload(extra_item), Err(PipelineError::OracleSchema(_))));
    }

    #[test]
    fn test_bad_shapes_rejected() {
        assert!(parse_oracle_payload("I could not find any items").is_err());
        assert!(parse_oracle_payload(r#"{"location": null}"#).is_err());
        let bad_source = r#"{"location": null, "drop_off_location": null, "summary": null, "notes": null,
            "items": [{"name": "x", "quantity": 1, "unit": null, "container": null, "notes": null,
                       "confidence": null, "sources": ["video"]}]}"#;
        assert!(parse_oracle_payload(bad_source).is_err());
        let blank_name = r#"{"location": null, "drop_off_location": null, "summary": null, "notes": null,
            "items": [{"name": " ", "quantity": 1, "unit": null, "container": null, "notes": null,
                       "confidence": null, "sources": []}]}"#;
        assert!(parse_oracle_payload(blank_name).is_err());
    }

    #[test]
    fn test_schema_is_strict() {
        let schema = response_schema();
        assert_eq!(schema["additionalProperties"], false);
        assert_eq!(schema["required"].as_array().unwrap().len(), 5);
        assert_eq!(schema["properties"]["items"]["items"]["required"].as_array().unwrap().len(), 7);
    }

    #[test]
    fn test_request_body_includes_images() {
        let config = OracleConfig {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        let oracle = OpenAiOracle::new(&config).unwrap();
        let body = oracle.request_body(&OracleRequest {
            text: "2 cases apples".to_string(),
            images: vec![OracleImage {
                mime: "image/png".to_string(),
                data_or_url: "data:image/png;base64,AAAA".to_string(),
            }],
        });
        let content = body["messages"][1]["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,AAAA");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
    }

    #[test]
    fn test_missing_key_is_rejected() {
        assert!(matches!(
            OpenAiOracle::new(&OracleConfig::default()),
            Err(PipelineError::Validation(_))
        ));
    }
}
