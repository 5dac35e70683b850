//! Google Gemini `generateContent` client with JSON response mode.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{LlmError, ModelClient};
use crate::config::ModelConfig;

/// Maximum length of an error body carried into `LlmError::Status`.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// JSON-Schema keywords the Gemini response schema dialect rejects.
const UNSUPPORTED_SCHEMA_KEYS: &[&str] = &[
    "$schema",
    "$id",
    "title",
    "additionalProperties",
    "minLength",
    "minimum",
];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

/// HTTP client for a Gemini model.
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: SecretString,
}

impl GeminiClient {
    pub fn new(config: &ModelConfig, api_key: SecretString) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.name.clone(),
            api_key,
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(
        &self,
        instruction: &str,
        prompt: &str,
        schema: &Value,
    ) -> Result<Value, LlmError> {
        let body = build_request(instruction, prompt, schema);

        log::debug!("Calling {} ({} prompt chars)", self.model, prompt.len());

        let response = self
            .http
            .post(self.url())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        let text = response_text(parsed)?;
        Ok(serde_json::from_str(strip_code_fence(&text))?)
    }
}

fn build_request<'a>(instruction: &'a str, prompt: &'a str, schema: &Value) -> GenerateRequest<'a> {
    GenerateRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part { text: instruction }],
        },
        contents: vec![Content {
            role: Some("user"),
            parts: vec![Part { text: prompt }],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema: to_response_schema(schema),
        },
    }
}

/// Concatenates the text parts of the first candidate.
fn response_text(response: GenerateResponse) -> Result<String, LlmError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(text)
}

/// Removes a surrounding Markdown code fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Rewrites a JSON Schema into the OpenAPI subset Gemini accepts:
/// `"type": [T, "null"]` becomes `"type": T, "nullable": true` and
/// unsupported keywords are dropped.
pub fn to_response_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                if UNSUPPORTED_SCHEMA_KEYS.contains(&key.as_str()) {
                    continue;
                }
                match key.as_str() {
                    "type" => match value {
                        Value::Array(types) => {
                            let concrete: Vec<&Value> =
                                types.iter().filter(|t| t.as_str() != Some("null")).collect();
                            if concrete.len() < types.len() {
                                out.insert("nullable".to_string(), Value::Bool(true));
                            }
                            if let Some(first) = concrete.first() {
                                out.insert("type".to_string(), (*first).clone());
                            }
                        }
                        other => {
                            out.insert("type".to_string(), other.clone());
                        }
                    },
                    "properties" => {
                        let props = match value {
                            Value::Object(props) => Value::Object(
                                props
                                    .iter()
                                    .map(|(name, sub)| (name.clone(), to_response_schema(sub)))
                                    .collect(),
                            ),
                            other => other.clone(),
                        };
                        out.insert(key.clone(), props);
                    }
                    "items" => {
                        out.insert(key.clone(), to_response_schema(value));
                    }
                    _ => {
                        out.insert(key.clone(), value.clone());
                    }
                }
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nullable_union_is_rewritten() {
        let schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": {
                "line": { "type": ["integer", "null"], "minimum": 1 },
                "tags": { "type": "array", "items": { "type": "string", "minLength": 1 } }
            },
            "required": ["line"]
        });

        let converted = to_response_schema(&schema);
        assert_eq!(
            converted,
            json!({
                "type": "object",
                "properties": {
                    "line": { "type": "integer", "nullable": true },
                    "tags": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["line"]
            })
        );
    }

    #[test]
    fn test_request_body_shape() {
        let schema = json!({ "type": "object" });
        let body = serde_json::to_value(build_request("be brief", "hello", &schema)).unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert!(body["systemInstruction"].get("role").is_none());
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn test_response_text_joins_parts_of_first_candidate() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] } },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        }))
        .unwrap();
        assert_eq!(response_text(response).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_response_without_candidates_is_empty() {
        let response: GenerateResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(
            response_text(response),
            Err(LlmError::EmptyResponse)
        ));
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        let config = ModelConfig {
            endpoint: "https://example.test/v1beta/".to_string(),
            ..ModelConfig::default()
        };
        let client = GeminiClient::new(&config, SecretString::from("k")).unwrap();
        assert_eq!(
            client.url(),
            format!("https://example.test/v1beta/models/{}:generateContent", config.name)
        );
    }
}
