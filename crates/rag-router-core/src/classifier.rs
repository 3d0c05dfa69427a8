//! Route classification.
//!
//! Asks the model to pick one of three routes for the latest user query:
//! `end` (greeting / small talk, with a canned reply), `rag` (knowledge-base
//! lookup needed), or `answer` (answerable directly).

use serde::Deserialize;

use crate::backend::{complete_as, FieldKind, ModelBackend, OutputSchema, PromptMessage, StructuredError};
use crate::error::TurnError;
use crate::models::{RouteDecision, RouteTag};

/// Reply used when the model chooses `end` without providing one.
pub const FALLBACK_REPLY: &str = "Hello!";

const ROUTER_INSTRUCTIONS: &str = "You are a router that decides how to handle user queries:\n\
- Use 'end' for pure greetings/small-talk (also provide a 'reply')\n\
- Use 'rag' when knowledge base lookup is needed\n\
- Use 'answer' when you can answer directly without external info";

#[derive(Debug, Deserialize)]
struct RawDecision {
    route: String,
    #[serde(default)]
    reply: Option<String>,
}

/// Schema of the classifier's structured output.
pub fn schema() -> OutputSchema {
    OutputSchema::new("route_decision")
        .field(
            "route",
            FieldKind::Enum(
                RouteTag::ALL
                    .iter()
                    .map(|t| t.wire_name().to_string())
                    .collect(),
            ),
            None,
        )
        .nullable_field(
            "reply",
            FieldKind::String,
            Some("Filled only when route == 'end'"),
        )
}

/// Prompt sent to the classifier model.
pub fn prompt(query: &str) -> Vec<PromptMessage> {
    vec![
        PromptMessage::system(ROUTER_INSTRUCTIONS),
        PromptMessage::user(query),
    ]
}

/// Classify `query` into a [`RouteDecision`].
///
/// An unknown tag or malformed JSON is a [`TurnError::ClassificationParse`];
/// the route is never guessed.
pub async fn classify(backend: &dyn ModelBackend, query: &str) -> Result<RouteDecision, TurnError> {
    let raw: RawDecision = complete_as(backend, &prompt(query), &schema())
        .await
        .map_err(|e| match e {
            StructuredError::Call(err) => TurnError::Classification(err),
            parse @ StructuredError::Parse { .. } => {
                TurnError::ClassificationParse(parse.to_string())
            }
        })?;

    let tag = RouteTag::from_wire(&raw.route).ok_or_else(|| {
        TurnError::ClassificationParse(format!("unknown route tag {:?}", raw.route))
    })?;

    Ok(RouteDecision::new(tag, raw.reply, FALLBACK_REPLY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ModelBackend;
    use anyhow::Result;
    use async_trait::async_trait;

    struct Canned(&'static str);

    #[async_trait]
    impl ModelBackend for Canned {
        fn provider(&self) -> &str {
            "canned"
        }
        async fn complete(&self, _messages: &[PromptMessage]) -> Result<String> {
            anyhow::bail!("not used")
        }
        async fn complete_structured(
            &self,
            _messages: &[PromptMessage],
            _schema: &OutputSchema,
        ) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_classify_end_with_reply() {
        let d = classify(&Canned(r#"{"route":"end","reply":"Hi there!"}"#), "hey")
            .await
            .unwrap();
        assert_eq!(d.tag(), RouteTag::ConversationalEnd);
        assert_eq!(d.reply(), Some("Hi there!"));
    }

    #[tokio::test]
    async fn test_classify_end_without_reply_uses_fallback() {
        let d = classify(&Canned(r#"{"route":"end","reply":null}"#), "hey")
            .await
            .unwrap();
        assert_eq!(d.reply(), Some(FALLBACK_REPLY));
    }

    #[tokio::test]
    async fn test_classify_rag_drops_reply() {
        let d = classify(&Canned(r#"{"route":"rag","reply":"ignored"}"#), "refunds?")
            .await
            .unwrap();
        assert_eq!(d.tag(), RouteTag::NeedsKnowledgeBase);
        assert_eq!(d.reply(), None);
    }

    #[tokio::test]
    async fn test_unknown_tag_is_parse_error() {
        let err = classify(&Canned(r#"{"route":"web"}"#), "q").await.unwrap_err();
        assert!(matches!(err, TurnError::ClassificationParse(_)));
    }

    #[tokio::test]
    async fn test_malformed_json_is_parse_error() {
        let err = classify(&Canned("I think rag"), "q").await.unwrap_err();
        assert!(matches!(err, TurnError::ClassificationParse(_)));
    }

    #[test]
    fn test_prompt_carries_query() {
        let p = prompt("");
        assert_eq!(p.len(), 2);
        assert!(p[0].content.contains("'rag'"));
        assert_eq!(p[1].content, "");
    }

    #[test]
    fn test_schema_offers_all_tags() {
        let s = schema();
        assert_eq!(
            s.fields[0].kind,
            FieldKind::Enum(vec!["end".into(), "rag".into(), "answer".into()])
        );
        assert!(s.fields[1].nullable);
    }
}
