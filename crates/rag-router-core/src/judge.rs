//! Sufficiency judgement: is the retrieved knowledge enough to answer?

use serde::Deserialize;

use crate::backend::{complete_as, FieldKind, ModelBackend, OutputSchema, PromptMessage};
use crate::error::TurnError;
use crate::models::SufficiencyVerdict;

const JUDGE_INSTRUCTIONS: &str = "You are a judge evaluating if the retrieved information is sufficient \
to answer the user's question. Consider both relevance and completeness.";

/// Result of a knowledge-base lookup as seen by the judge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Passages<'a> {
    /// The retriever answered; the text may be empty.
    Found(&'a str),
    /// The retriever failed.
    Unavailable,
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    sufficient: bool,
}

pub fn schema() -> OutputSchema {
    OutputSchema::new("rag_judge").field("sufficient", FieldKind::Boolean, None)
}

pub fn prompt(query: &str, passages: &str) -> Vec<PromptMessage> {
    vec![
        PromptMessage::system(JUDGE_INSTRUCTIONS),
        PromptMessage::user(format!(
            "Question: {}\n\nRetrieved info: {}\n\nIs this sufficient to answer the question?",
            query, passages
        )),
    ]
}

/// Decide whether `passages` suffice to answer `query`.
///
/// Empty or unavailable passages are insufficient without a model call.
pub async fn judge(
    backend: &dyn ModelBackend,
    query: &str,
    passages: Passages<'_>,
) -> Result<SufficiencyVerdict, TurnError> {
    let text = match passages {
        Passages::Found(text) if !text.trim().is_empty() => text,
        _ => return Ok(SufficiencyVerdict { sufficient: false }),
    };

    let raw: RawVerdict = complete_as(backend, &prompt(query, text), &schema())
        .await
        .map_err(|e| TurnError::Judgement(e.into()))?;

    Ok(SufficiencyVerdict {
        sufficient: raw.sufficient,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        answer: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModelBackend for Counting {
        fn provider(&self) -> &str {
            "counting"
        }
        async fn complete(&self, _messages: &[PromptMessage]) -> Result<String> {
            anyhow::bail!("not used")
        }
        async fn complete_structured(
            &self,
            _messages: &[PromptMessage],
            _schema: &OutputSchema,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.to_string())
        }
    }

    fn backend(answer: &'static str) -> Counting {
        Counting {
            answer,
            calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_empty_passages_insufficient_without_call() {
        let b = backend(r#"{"sufficient":true}"#);
        let v = judge(&b, "q", Passages::Found("  \n")).await.unwrap();
        assert!(!v.sufficient);
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unavailable_insufficient_without_call() {
        let b = backend(r#"{"sufficient":true}"#);
        let v = judge(&b, "q", Passages::Unavailable).await.unwrap();
        assert!(!v.sufficient);
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_model_verdict_is_used() {
        let b = backend(r#"{"sufficient":true}"#);
        let v = judge(&b, "q", Passages::Found("policy text")).await.unwrap();
        assert!(v.sufficient);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unparseable_verdict_fails() {
        let b = backend(r#"{"sufficient":"maybe"}"#);
        let err = judge(&b, "q", Passages::Found("text")).await.unwrap_err();
        assert!(matches!(err, TurnError::Judgement(_)));
    }

    #[test]
    fn test_prompt_layout() {
        let p = prompt("What is X?", "X is a thing.");
        assert_eq!(
            p[1].content,
            "Question: What is X?\n\nRetrieved info: X is a thing.\n\nIs this sufficient to answer the question?"
        );
    }
}
