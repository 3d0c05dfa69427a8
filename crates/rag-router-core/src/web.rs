//! Web search boundary and result formatting.

use async_trait::async_trait;

/// Prefix marking a web search failure inside the returned text.
pub const WEB_ERROR_TAG: &str = "WEB_ERROR::";

/// Text returned when a search succeeds with zero hits.
pub const NO_RESULTS: &str = "No results found";

/// Live web search.
///
/// The signature is infallible on purpose: implementations must turn every
/// failure into [`error_text`] so the turn can continue with degraded
/// context.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> String;
}

/// One ranked search hit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebHit {
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub url: Option<String>,
}

/// Render ranked hits into the single text block handed to the synthesizer.
pub fn format_hits(hits: &[WebHit]) -> String {
    if hits.is_empty() {
        return NO_RESULTS.to_string();
    }
    hits.iter()
        .map(|hit| {
            format!(
                "Title: {}\nContent: {}\nURL: {}",
                hit.title.as_deref().unwrap_or("No title"),
                hit.snippet.as_deref().unwrap_or("No content"),
                hit.url.as_deref().unwrap_or("")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Error-tagged text for a failed search.
pub fn error_text(message: impl std::fmt::Display) -> String {
    format!("{}{}", WEB_ERROR_TAG, message)
}

/// Whether `text` is an error-tagged search result.
pub fn is_error_text(text: &str) -> bool {
    text.starts_with(WEB_ERROR_TAG)
}
