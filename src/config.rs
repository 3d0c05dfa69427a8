//! TOML configuration.
//!
//! Only `[db]` is required; every other section falls back to defaults so a
//! two-line config is enough to run the CLI. API keys are never read from the
//! file, see [`ModelConfig::api_key_var`] and [`WebSearchConfig::api_key_var`].

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use rag_router_core::chunk::{DEFAULT_CHUNK_CHARS, DEFAULT_OVERLAP_CHARS};
use rag_router_core::retriever::DEFAULT_TOP_K;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub web_search: WebSearchConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    #[serde(default = "default_knowledge_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            root: default_knowledge_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            chunk_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_knowledge_root() -> PathBuf {
    PathBuf::from("./docs")
}
fn default_include_globs() -> Vec<String> {
    ["**/*.md", "**/*.txt", "**/*.pdf", "**/*.docx"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_chunk_chars() -> usize {
    DEFAULT_CHUNK_CHARS
}
fn default_overlap_chars() -> usize {
    DEFAULT_OVERLAP_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f64,
    #[serde(default = "default_candidate_k")]
    pub candidate_k: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            hybrid_alpha: default_hybrid_alpha(),
            candidate_k: default_candidate_k(),
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}
fn default_hybrid_alpha() -> f64 {
    0.6
}
fn default_candidate_k() -> i64 {
    40
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_retries() -> u32 {
    5
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_provider")]
    pub provider: String,
    /// Model name; when omitted the provider's default is used.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_answer_temperature")]
    pub answer_temperature: f32,
    #[serde(default)]
    pub decision_temperature: f32,
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_model_retries")]
    pub max_retries: u32,
    /// Override the provider's API origin (proxies, local gateways, tests).
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_model_provider(),
            model: None,
            answer_temperature: default_answer_temperature(),
            decision_temperature: 0.0,
            timeout_secs: default_model_timeout(),
            max_retries: default_model_retries(),
            base_url: None,
        }
    }
}

impl ModelConfig {
    /// Configured model, or the provider default.
    pub fn model_name(&self) -> &str {
        match (&self.model, self.provider.as_str()) {
            (Some(model), _) => model,
            (None, "gemini") => "gemini-2.5-flash",
            (None, _) => "gpt-4.1-mini",
        }
    }

    /// Environment variable holding the provider's API key.
    pub fn api_key_var(&self) -> &'static str {
        match self.provider.as_str() {
            "gemini" => "GOOGLE_API_KEY",
            _ => "OPENAI_API_KEY",
        }
    }
}

fn default_model_provider() -> String {
    "openai".to_string()
}
fn default_answer_temperature() -> f32 {
    0.7
}
fn default_model_timeout() -> u64 {
    60
}
fn default_model_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebSearchConfig {
    #[serde(default = "default_web_provider")]
    pub provider: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_web_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            provider: default_web_provider(),
            max_results: default_max_results(),
            topic: default_topic(),
            timeout_secs: default_web_timeout(),
            base_url: None,
        }
    }
}

impl WebSearchConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn api_key_var(&self) -> Option<&'static str> {
        match self.provider.as_str() {
            "tavily" => Some("TAVILY_API_KEY"),
            _ => None,
        }
    }
}

fn default_web_provider() -> String {
    "tavily".to_string()
}
fn default_max_results() -> usize {
    3
}
fn default_topic() -> String {
    "general".to_string()
}
fn default_web_timeout() -> u64 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_turn_timeout")]
    pub turn_timeout_secs: u64,
    #[serde(default = "default_conversation_store")]
    pub conversation_store: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            turn_timeout_secs: default_turn_timeout(),
            conversation_store: default_conversation_store(),
        }
    }
}

impl AgentConfig {
    /// Store for a CLI turn. A named `--thread` has to outlive the process,
    /// so the memory store is replaced by SQLite for it.
    pub fn store_for_cli(&self, named_thread: bool) -> &str {
        if named_thread && self.conversation_store == "memory" {
            "sqlite"
        } else {
            &self.conversation_store
        }
    }
}

fn default_turn_timeout() -> u64 {
    120
}
fn default_conversation_store() -> String {
    "memory".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:2024".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Knowledge
    if config.knowledge.chunk_chars == 0 {
        bail!("knowledge.chunk_chars must be > 0");
    }
    if config.knowledge.overlap_chars >= config.knowledge.chunk_chars {
        bail!("knowledge.overlap_chars must be < knowledge.chunk_chars");
    }

    // Retrieval
    if !(1..=10).contains(&config.retrieval.top_k) {
        bail!("retrieval.top_k must be in 1..=10");
    }
    if !(0.0..=1.0).contains(&config.retrieval.hybrid_alpha) {
        bail!("retrieval.hybrid_alpha must be in [0.0, 1.0]");
    }
    if config.retrieval.candidate_k < 1 {
        bail!("retrieval.candidate_k must be >= 1");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
    }

    // Model
    match config.model.provider.as_str() {
        "openai" | "gemini" => {}
        other => bail!(
            "Unknown model provider: '{}'. Must be openai or gemini.",
            other
        ),
    }
    for (name, value) in [
        ("model.answer_temperature", config.model.answer_temperature),
        ("model.decision_temperature", config.model.decision_temperature),
    ] {
        if !(0.0..=2.0).contains(&value) {
            bail!("{} must be in [0.0, 2.0]", name);
        }
    }

    // Web search
    match config.web_search.provider.as_str() {
        "tavily" | "disabled" => {}
        other => bail!(
            "Unknown web_search provider: '{}'. Must be tavily or disabled.",
            other
        ),
    }
    if config.web_search.max_results == 0 {
        bail!("web_search.max_results must be > 0");
    }

    // Agent
    if config.agent.turn_timeout_secs == 0 {
        bail!("agent.turn_timeout_secs must be > 0");
    }
    match config.agent.conversation_store.as_str() {
        "memory" | "sqlite" => {}
        other => bail!(
            "Unknown agent.conversation_store: '{}'. Must be memory or sqlite.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse_config("[db]\npath = \"./data/ragr.sqlite\"\n").unwrap();
        assert_eq!(cfg.retrieval.top_k, 2);
        assert_eq!(cfg.knowledge.chunk_chars, 1000);
        assert_eq!(cfg.knowledge.overlap_chars, 200);
        assert_eq!(cfg.model.provider, "openai");
        assert_eq!(cfg.model.model_name(), "gpt-4.1-mini");
        assert_eq!(cfg.model.answer_temperature, 0.7);
        assert_eq!(cfg.model.decision_temperature, 0.0);
        assert_eq!(cfg.web_search.max_results, 3);
        assert_eq!(cfg.web_search.topic, "general");
        assert_eq!(cfg.agent.turn_timeout_secs, 120);
        assert_eq!(cfg.agent.conversation_store, "memory");
        assert_eq!(cfg.server.bind, "0.0.0.0:2024");
        assert!(!cfg.embedding.is_enabled());
    }

    #[test]
    fn test_named_cli_thread_persists() {
        let cfg = parse_config("[db]\npath = \"x\"\n").unwrap();
        assert_eq!(cfg.agent.store_for_cli(true), "sqlite");
        assert_eq!(cfg.agent.store_for_cli(false), "memory");

        let cfg = parse_config("[db]\npath = \"x\"\n[agent]\nconversation_store = \"sqlite\"\n")
            .unwrap();
        assert_eq!(cfg.agent.store_for_cli(false), "sqlite");
    }

    #[test]
    fn test_gemini_default_model_and_key() {
        let cfg = parse_config("[db]\npath = \"x\"\n[model]\nprovider = \"gemini\"\n").unwrap();
        assert_eq!(cfg.model.model_name(), "gemini-2.5-flash");
        assert_eq!(cfg.model.api_key_var(), "GOOGLE_API_KEY");
    }

    #[test]
    fn test_missing_db_rejected() {
        assert!(parse_config("[retrieval]\ntop_k = 2\n").is_err());
    }

    #[test]
    fn test_top_k_bounds() {
        let err = parse_config("[db]\npath = \"x\"\n[retrieval]\ntop_k = 0\n").unwrap_err();
        assert!(err.to_string().contains("top_k"));
        assert!(parse_config("[db]\npath = \"x\"\n[retrieval]\ntop_k = 11\n").is_err());
        assert!(parse_config("[db]\npath = \"x\"\n[retrieval]\ntop_k = 10\n").is_ok());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let err = parse_config(
            "[db]\npath = \"x\"\n[knowledge]\nchunk_chars = 100\noverlap_chars = 100\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("overlap_chars"));
    }

    #[test]
    fn test_unknown_providers_rejected() {
        assert!(parse_config("[db]\npath = \"x\"\n[model]\nprovider = \"llama\"\n").is_err());
        assert!(parse_config("[db]\npath = \"x\"\n[web_search]\nprovider = \"bing\"\n").is_err());
        assert!(parse_config("[db]\npath = \"x\"\n[embedding]\nprovider = \"local\"\n").is_err());
        assert!(
            parse_config("[db]\npath = \"x\"\n[agent]\nconversation_store = \"redis\"\n").is_err()
        );
    }

    #[test]
    fn test_enabled_embedding_requires_model_and_dims() {
        let err = parse_config("[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));

        let ok = parse_config(
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n",
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_temperature_bounds() {
        assert!(
            parse_config("[db]\npath = \"x\"\n[model]\nanswer_temperature = 2.5\n").is_err()
        );
    }
}
