//! Live web search providers.
//!
//! Every failure is folded into a `WEB_ERROR::` string so a turn can still
//! be answered from whatever context is left.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use rag_router_core::web::{error_text, format_hits, WebHit, WebSearch};

use crate::config::WebSearchConfig;
use crate::http;

const TAVILY_BASE_URL: &str = "https://api.tavily.com";

/// Build the configured provider. Tavily requires `TAVILY_API_KEY`.
pub fn create_web_search(config: &WebSearchConfig) -> Result<Arc<dyn WebSearch>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledSearch)),
        "tavily" => {
            let api_key = std::env::var("TAVILY_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| anyhow!("TAVILY_API_KEY environment variable not set"))?;
            Ok(Arc::new(TavilySearch::new(config, api_key)?))
        }
        other => Err(anyhow!("Unknown web_search provider: {}", other)),
    }
}

/// Used when `[web_search] provider = "disabled"`.
pub struct DisabledSearch;

#[async_trait]
impl WebSearch for DisabledSearch {
    async fn search(&self, _query: &str) -> String {
        error_text("web search is disabled")
    }
}

pub struct TavilySearch {
    api_key: String,
    url: String,
    max_results: usize,
    topic: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    title: Option<String>,
    content: Option<String>,
    url: Option<String>,
}

impl TavilySearch {
    pub fn new(config: &WebSearchConfig, api_key: String) -> Result<Self> {
        let base = config
            .base_url
            .as_deref()
            .unwrap_or(TAVILY_BASE_URL)
            .trim_end_matches('/');
        Ok(Self {
            api_key,
            url: format!("{}/search", base),
            max_results: config.max_results,
            topic: config.topic.clone(),
            client: http::client(config.timeout_secs)?,
        })
    }

    async fn fetch(&self, query: &str) -> Result<Vec<WebHit>> {
        let body = serde_json::json!({
            "query": query,
            "max_results": self.max_results,
            "topic": self.topic,
        });

        // Search has its own small time budget; one attempt only.
        let response = http::send_with_retry("Tavily", 0, || {
            self.client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        let parsed: TavilyResponse = response.json().await?;
        Ok(parsed
            .results
            .into_iter()
            .take(self.max_results)
            .map(|r| WebHit {
                title: r.title,
                snippet: r.content,
                url: r.url,
            })
            .collect())
    }
}

#[async_trait]
impl WebSearch for TavilySearch {
    async fn search(&self, query: &str) -> String {
        match self.fetch(query).await {
            Ok(hits) => format_hits(&hits),
            Err(e) => {
                warn!(error = %format!("{:#}", e), "web search failed");
                error_text(format!("{:#}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_router_core::web::is_error_text;

    #[tokio::test]
    async fn test_disabled_returns_error_text() {
        let text = DisabledSearch.search("anything").await;
        assert_eq!(text, "WEB_ERROR::web search is disabled");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_error_text() {
        let cfg = WebSearchConfig {
            base_url: Some("http://127.0.0.1:9".to_string()),
            timeout_secs: 2,
            ..WebSearchConfig::default()
        };
        let search = TavilySearch::new(&cfg, "key".into()).unwrap();
        let text = search.search("rust").await;
        assert!(is_error_text(&text), "got {}", text);
    }

    #[test]
    fn test_response_tolerates_missing_fields() {
        let parsed: TavilyResponse =
            serde_json::from_str(r#"{"results":[{"url":"https://a"}]}"#).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert!(parsed.results[0].title.is_none());

        let empty: TavilyResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.results.is_empty());
    }
}
