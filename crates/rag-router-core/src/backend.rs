//! Model-invocation boundary.
//!
//! The classifier, judge, and synthesizer all talk to a language model
//! through the [`ModelBackend`] trait. A backend offers two operations:
//!
//! - [`complete`](ModelBackend::complete): free-form text generation.
//! - [`complete_structured`](ModelBackend::complete_structured): JSON output
//!   constrained by an [`OutputSchema`].
//!
//! Provider choice (OpenAI, Gemini, test stubs) is a construction-time
//! decision; the routing logic only ever sees `&dyn ModelBackend`.
//!
//! Typed decoding of structured output happens here, in [`complete_as`], so
//! every backend shares the same distinction between a failed call and an
//! unparseable answer.

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Role of a prompt message sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

/// One message of a model prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }
}

/// Type of a single field in an [`OutputSchema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Boolean,
    String,
    /// A string restricted to the listed values.
    Enum(Vec<String>),
}

/// A top-level field of a structured output object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    pub kind: FieldKind,
    pub description: Option<String>,
    /// Nullable fields may be `null` or omitted.
    pub nullable: bool,
}

/// Provider-neutral description of a flat JSON object the model must return.
///
/// Backends render this into their own schema dialect (OpenAI JSON Schema,
/// Gemini OpenAPI subset).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSchema {
    /// Identifier sent to providers that require a schema name.
    pub name: String,
    pub fields: Vec<SchemaField>,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: &str, kind: FieldKind, description: Option<&str>) -> Self {
        self.fields.push(SchemaField {
            name: name.to_string(),
            kind,
            description: description.map(str::to_string),
            nullable: false,
        });
        self
    }

    pub fn nullable_field(mut self, name: &str, kind: FieldKind, description: Option<&str>) -> Self {
        self.fields.push(SchemaField {
            name: name.to_string(),
            kind,
            description: description.map(str::to_string),
            nullable: true,
        });
        self
    }
}

/// A language model provider.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Short provider name for logs and health output (e.g. `"openai"`).
    fn provider(&self) -> &str;

    /// Free-form completion.
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String>;

    /// Completion constrained to `schema`. Returns the raw JSON text.
    async fn complete_structured(
        &self,
        messages: &[PromptMessage],
        schema: &OutputSchema,
    ) -> Result<String>;
}

/// Failure modes of [`complete_as`].
#[derive(Debug, thiserror::Error)]
pub enum StructuredError {
    #[error("model call failed: {0:#}")]
    Call(anyhow::Error),

    #[error("unparseable structured output {raw:?}: {source}")]
    Parse {
        raw: String,
        source: serde_json::Error,
    },
}

/// Run a structured completion and decode it into `T`.
pub async fn complete_as<T: DeserializeOwned>(
    backend: &dyn ModelBackend,
    messages: &[PromptMessage],
    schema: &OutputSchema,
) -> std::result::Result<T, StructuredError> {
    let raw = backend
        .complete_structured(messages, schema)
        .await
        .map_err(StructuredError::Call)?;
    let body = strip_code_fence(&raw);
    serde_json::from_str(body).map_err(|source| StructuredError::Parse {
        raw: raw.clone(),
        source,
    })
}

/// Some models wrap JSON in a Markdown fence even in JSON mode.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn test_schema_builder() {
        let schema = OutputSchema::new("verdict")
            .field("ok", FieldKind::Boolean, None)
            .nullable_field("note", FieldKind::String, Some("optional note"));
        assert_eq!(schema.fields.len(), 2);
        assert!(!schema.fields[0].nullable);
        assert!(schema.fields[1].nullable);
        assert_eq!(schema.fields[1].description.as_deref(), Some("optional note"));
    }
}
