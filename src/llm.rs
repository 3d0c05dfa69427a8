//! Hosted language model backends.
//!
//! Both providers implement [`ModelBackend`]. Free-form completions use
//! `answer_temperature`; structured completions use `decision_temperature`
//! and ask the provider to constrain output to the rendered [`OutputSchema`].
//!
//! | Provider | Endpoint | Auth | Structured output |
//! |----------|----------|------|-------------------|
//! | `openai` | `POST {base}/v1/chat/completions` | bearer `OPENAI_API_KEY` | `response_format.json_schema` (strict) |
//! | `gemini` | `POST {base}/v1beta/models/{model}:generateContent` | `x-goog-api-key: GOOGLE_API_KEY` | `responseMimeType` + `responseSchema` |

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use rag_router_core::backend::{FieldKind, ModelBackend, OutputSchema, PromptMessage, PromptRole};

use crate::config::ModelConfig;
use crate::http;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Build the configured backend, reading its API key from the environment.
pub fn create_backend(config: &ModelConfig) -> Result<Arc<dyn ModelBackend>> {
    let var = config.api_key_var();
    let api_key = std::env::var(var)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| anyhow!("{} environment variable not set", var))?;

    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiBackend::new(config, api_key)?)),
        "gemini" => Ok(Arc::new(GeminiBackend::new(config, api_key)?)),
        other => bail!("Unknown model provider: {}", other),
    }
}

fn base_url(config: &ModelConfig, default: &str) -> String {
    config
        .base_url
        .as_deref()
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

// ============ OpenAI ============

pub struct OpenAiBackend {
    model: String,
    api_key: String,
    url: String,
    answer_temperature: f32,
    decision_temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(config: &ModelConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            model: config.model_name().to_string(),
            api_key,
            url: format!("{}/v1/chat/completions", base_url(config, OPENAI_BASE_URL)),
            answer_temperature: config.answer_temperature,
            decision_temperature: config.decision_temperature,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }

    fn request_body(&self, messages: &[PromptMessage], schema: Option<&OutputSchema>) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({ "role": openai_role(m.role), "content": m.content }))
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });

        match schema {
            Some(schema) => {
                body["temperature"] = json!(self.decision_temperature);
                body["response_format"] = json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": schema.name,
                        "strict": true,
                        "schema": openai_schema(schema),
                    }
                });
            }
            None => body["temperature"] = json!(self.answer_temperature),
        }
        body
    }

    async fn send(&self, body: Value) -> Result<String> {
        let response = http::send_with_retry("OpenAI", self.max_retries, || {
            self.client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;
        let json: Value = response.json().await?;
        parse_openai_content(&json)
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn provider(&self) -> &str {
        "openai"
    }

    async fn complete(&self, messages: &[PromptMessage]) -> Result<String> {
        self.send(self.request_body(messages, None)).await
    }

    async fn complete_structured(
        &self,
        messages: &[PromptMessage],
        schema: &OutputSchema,
    ) -> Result<String> {
        self.send(self.request_body(messages, Some(schema))).await
    }
}

fn openai_role(role: PromptRole) -> &'static str {
    match role {
        PromptRole::System => "system",
        PromptRole::User => "user",
        PromptRole::Assistant => "assistant",
    }
}

/// Strict-mode JSON Schema: every property required, nullability via a
/// `null` type member, no additional properties.
pub fn openai_schema(schema: &OutputSchema) -> Value {
    let mut properties = Map::new();
    for field in &schema.fields {
        let base = match &field.kind {
            FieldKind::Boolean => "boolean",
            FieldKind::String | FieldKind::Enum(_) => "string",
        };
        let mut prop = Map::new();
        prop.insert(
            "type".to_string(),
            if field.nullable {
                json!([base, "null"])
            } else {
                json!(base)
            },
        );
        if let FieldKind::Enum(values) = &field.kind {
            prop.insert("enum".to_string(), json!(values));
        }
        if let Some(description) = &field.description {
            prop.insert("description".to_string(), json!(description));
        }
        properties.insert(field.name.clone(), Value::Object(prop));
    }

    let required: Vec<&str> = schema.fields.iter().map(|f| f.name.as_str()).collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn parse_openai_content(json: &Value) -> Result<String> {
    let choice = json
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices"))?;

    if let Some(refusal) = choice
        .pointer("/message/refusal")
        .and_then(|r| r.as_str())
    {
        bail!("model refused: {}", refusal);
    }

    choice
        .pointer("/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing message content"))
}

// ============ Gemini ============

pub struct GeminiBackend {
    api_key: String,
    url: String,
    answer_temperature: f32,
    decision_temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(config: &ModelConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            api_key,
            url: format!(
                "{}/v1beta/models/{}:generateContent",
                base_url(config, GEMINI_BASE_URL),
                config.model_name()
            ),
            answer_temperature: config.answer_temperature,
            decision_temperature: config.decision_temperature,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }

    fn request_body(&self, messages: &[PromptMessage], schema: Option<&OutputSchema>) -> Value {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == PromptRole::System)
            .map(|m| m.content.as_str())
            .collect();

        let contents: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != PromptRole::System)
            .map(|m| {
                let role = if m.role == PromptRole::Assistant {
                    "model"
                } else {
                    "user"
                };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut generation = Map::new();
        match schema {
            Some(schema) => {
                generation.insert("temperature".to_string(), json!(self.decision_temperature));
                generation.insert("responseMimeType".to_string(), json!("application/json"));
                generation.insert("responseSchema".to_string(), gemini_schema(schema));
            }
            None => {
                generation.insert("temperature".to_string(), json!(self.answer_temperature));
            }
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": Value::Object(generation),
        });
        if !system.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system.join("\n\n") }] });
        }
        body
    }

    async fn send(&self, body: Value) -> Result<String> {
        let response = http::send_with_retry("Gemini", self.max_retries, || {
            self.client
                .post(&self.url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
        })
        .await?;
        let json: Value = response.json().await?;
        parse_gemini_content(&json)
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn provider(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, messages: &[PromptMessage]) -> Result<String> {
        self.send(self.request_body(messages, None)).await
    }

    async fn complete_structured(
        &self,
        messages: &[PromptMessage],
        schema: &OutputSchema,
    ) -> Result<String> {
        self.send(self.request_body(messages, Some(schema))).await
    }
}

/// Gemini's OpenAPI-subset schema: upper-case types, `nullable` flag,
/// only non-nullable fields required.
pub fn gemini_schema(schema: &OutputSchema) -> Value {
    let mut properties = Map::new();
    for field in &schema.fields {
        let mut prop = Map::new();
        let ty = match &field.kind {
            FieldKind::Boolean => "BOOLEAN",
            FieldKind::String | FieldKind::Enum(_) => "STRING",
        };
        prop.insert("type".to_string(), json!(ty));
        if let FieldKind::Enum(values) = &field.kind {
            prop.insert("enum".to_string(), json!(values));
        }
        if field.nullable {
            prop.insert("nullable".to_string(), json!(true));
        }
        if let Some(description) = &field.description {
            prop.insert("description".to_string(), json!(description));
        }
        properties.insert(field.name.clone(), Value::Object(prop));
    }

    let required: Vec<&str> = schema
        .fields
        .iter()
        .filter(|f| !f.nullable)
        .map(|f| f.name.as_str())
        .collect();
    json!({
        "type": "OBJECT",
        "properties": properties,
        "required": required,
    })
}

fn parse_gemini_content(json: &Value) -> Result<String> {
    let candidate = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .ok_or_else(|| {
            let reason = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
                .unwrap_or("no candidates");
            anyhow!("Invalid Gemini response: {}", reason)
        })?;

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing content parts"))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    Ok(text)
}
