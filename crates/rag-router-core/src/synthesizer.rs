//! Final answer synthesis from labeled context blocks.

use serde::Serialize;

use crate::backend::{ModelBackend, PromptMessage};
use crate::error::TurnError;

/// Context section used when no block carries any text.
pub const NO_CONTEXT: &str = "No external context available.";

/// Where a context block came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextLabel {
    KnowledgeBase,
    Web,
}

impl ContextLabel {
    pub fn header(&self) -> &'static str {
        match self {
            ContextLabel::KnowledgeBase => "Knowledge Base Information:",
            ContextLabel::Web => "Web Search Results:",
        }
    }
}

/// A labeled chunk of text fed to the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextBlock {
    pub label: ContextLabel,
    pub text: String,
}

impl ContextBlock {
    pub fn new(label: ContextLabel, text: impl Into<String>) -> Self {
        Self {
            label,
            text: text.into(),
        }
    }
}

/// Collect the non-empty blocks, knowledge base first.
pub fn context_blocks(knowledge_base: Option<&str>, web: Option<&str>) -> Vec<ContextBlock> {
    [
        (ContextLabel::KnowledgeBase, knowledge_base),
        (ContextLabel::Web, web),
    ]
    .into_iter()
    .filter_map(|(label, text)| {
        text.filter(|t| !t.trim().is_empty())
            .map(|t| ContextBlock::new(label, t))
    })
    .collect()
}

/// Render blocks into the prompt's context section.
pub fn assemble_context(blocks: &[ContextBlock]) -> String {
    if blocks.is_empty() {
        return NO_CONTEXT.to_string();
    }
    blocks
        .iter()
        .map(|b| format!("{}\n{}", b.label.header(), b.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn prompt(query: &str, blocks: &[ContextBlock]) -> Vec<PromptMessage> {
    vec![PromptMessage::user(format!(
        "Please answer the user's question using the provided context.\n\n\
         Question: {}\n\n\
         Context:\n{}\n\n\
         Provide a helpful, accurate, and concise response based on the available information.",
        query,
        assemble_context(blocks)
    ))]
}

/// Produce the final answer text.
pub async fn synthesize(
    backend: &dyn ModelBackend,
    query: &str,
    blocks: &[ContextBlock],
) -> Result<String, TurnError> {
    backend
        .complete(&prompt(query, blocks))
        .await
        .map(|answer| answer.trim().to_string())
        .map_err(TurnError::SynthesisFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_skip_empty() {
        assert!(context_blocks(None, None).is_empty());
        assert!(context_blocks(Some(""), Some("  ")).is_empty());

        let blocks = context_blocks(Some(""), Some("web text"));
        assert_eq!(blocks, vec![ContextBlock::new(ContextLabel::Web, "web text")]);
    }

    #[test]
    fn test_assemble_both_blocks() {
        let blocks = context_blocks(Some("kb text"), Some("web text"));
        assert_eq!(
            assemble_context(&blocks),
            "Knowledge Base Information:\nkb text\n\nWeb Search Results:\nweb text"
        );
    }

    #[test]
    fn test_assemble_no_context() {
        assert_eq!(assemble_context(&[]), NO_CONTEXT);
    }

    #[test]
    fn test_prompt_layout() {
        let p = prompt("What is 2+2?", &[]);
        assert_eq!(p.len(), 1);
        assert!(p[0].content.starts_with(
            "Please answer the user's question using the provided context.\n\nQuestion: What is 2+2?\n\nContext:\nNo external context available.\n\n"
        ));
    }
}
