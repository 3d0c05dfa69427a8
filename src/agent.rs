//! Turn entry point.
//!
//! [`Agent`] ties the core [`Orchestrator`] to a [`ConversationStore`]:
//! look up (or create) the thread's state, run one turn, persist the result,
//! and return the new assistant message.
//!
//! Turns on the same thread are serialized by a per-thread async mutex held
//! across get → run → put, so concurrent requests never interleave or lose
//! an update. Different threads run independently. The state is written only
//! after a successful turn; failures and timeouts leave it untouched.

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};

use rag_router_core::orchestrator::{NoopObserver, Orchestrator, TurnObserver, TurnOutcome};
use rag_router_core::store::memory::InMemoryConversationStore;
use rag_router_core::store::ConversationStore;
use rag_router_core::{ConversationState, ThreadId, TurnError};

use crate::config::Config;
use crate::conversation_store::SqliteConversationStore;
use crate::db;
use crate::knowledge::SqliteRetriever;
use crate::llm;
use crate::web_search;

const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(120);

type ThreadLock = Arc<tokio::sync::Mutex<()>>;

pub struct Agent {
    orchestrator: Orchestrator,
    store: Arc<dyn ConversationStore>,
    locks: Mutex<HashMap<ThreadId, ThreadLock>>,
    turn_timeout: Duration,
}

impl Agent {
    pub fn new(orchestrator: Orchestrator, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            orchestrator,
            store,
            locks: Mutex::new(HashMap::new()),
            turn_timeout: DEFAULT_TURN_TIMEOUT,
        }
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    /// Assemble the agent described by `config`.
    ///
    /// Fails up front, naming every missing API key variable, rather than on
    /// the first turn.
    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::from_config_with_store(config, &config.agent.conversation_store).await
    }

    /// Like [`Agent::from_config`], but with the conversation store `kind`
    /// (`memory` or `sqlite`) chosen by the caller.
    pub async fn from_config_with_store(config: &Config, kind: &str) -> Result<Self> {
        let missing = missing_api_keys(config);
        if !missing.is_empty() {
            bail!(
                "missing environment variable(s): {}",
                missing.join(", ")
            );
        }

        let backend = llm::create_backend(&config.model)?;
        let web = web_search::create_web_search(&config.web_search)?;
        let retriever = SqliteRetriever::from_config(config).await?;

        let store = create_store(config, kind).await?;

        let orchestrator = Orchestrator::new(backend, Arc::new(retriever), web)
            .with_top_k(config.retrieval.top_k);

        info!(
            provider = orchestrator.backend().provider(),
            model = config.model.model_name(),
            web_search = %config.web_search.provider,
            store = kind,
            "agent ready"
        );

        Ok(Agent::new(orchestrator, store)
            .with_turn_timeout(Duration::from_secs(config.agent.turn_timeout_secs)))
    }

    /// Model provider name, for health output.
    pub fn provider(&self) -> &str {
        self.orchestrator.backend().provider()
    }

    /// Run one turn and return the new assistant message.
    pub async fn handle_turn(&self, thread: &ThreadId, user_text: &str) -> Result<String, TurnError> {
        self.handle_turn_observed(thread, user_text, &NoopObserver)
            .await
            .map(|outcome| outcome.answer)
    }

    /// Run one turn, reporting each visited state to `observer`.
    pub async fn handle_turn_observed(
        &self,
        thread: &ThreadId,
        user_text: &str,
        observer: &dyn TurnObserver,
    ) -> Result<TurnOutcome, TurnError> {
        let span = info_span!("turn", thread = %thread);
        async {
            let lease = self.lease_thread_lock(thread)?;
            let result = {
                let _guard = lease.lock.lock().await;
                self.locked_turn(thread, user_text, observer).await
            };

            match &result {
                Ok(outcome) => info!(path = ?outcome.path, "turn complete"),
                Err(e) => warn!(code = e.code(), error = %e, "turn failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Current state of a thread (empty if unseen).
    pub async fn history(&self, thread: &ThreadId) -> Result<ConversationState, TurnError> {
        Ok(self
            .store
            .get(thread)
            .await
            .map_err(TurnError::Store)?
            .unwrap_or_default())
    }

    async fn locked_turn(
        &self,
        thread: &ThreadId,
        user_text: &str,
        observer: &dyn TurnObserver,
    ) -> Result<TurnOutcome, TurnError> {
        let run = async {
            let previous = self
                .store
                .get(thread)
                .await
                .map_err(TurnError::Store)?
                .unwrap_or_default();
            self.orchestrator
                .run_turn_observed(&previous, user_text, observer)
                .await
        };

        let outcome = tokio::time::timeout(self.turn_timeout, run)
            .await
            .map_err(|_| TurnError::Timeout(self.turn_timeout))??;

        self.store
            .put(thread, &outcome.state)
            .await
            .map_err(TurnError::Store)?;
        Ok(outcome)
    }

    fn lease_thread_lock(&self, thread: &ThreadId) -> Result<ThreadLease<'_>, TurnError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| TurnError::Store(anyhow::anyhow!("thread lock table poisoned")))?;
        let lock = locks.entry(thread.clone()).or_default().clone();
        Ok(ThreadLease {
            agent: self,
            thread: thread.clone(),
            lock,
        })
    }

    #[cfg(test)]
    fn tracked_threads(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}

/// A turn's claim on its thread lock.
///
/// Dropping the lease, including when the turn future is cancelled, removes
/// the table entry once nobody else holds or awaits it.
struct ThreadLease<'a> {
    agent: &'a Agent,
    thread: ThreadId,
    lock: ThreadLock,
}

impl Drop for ThreadLease<'_> {
    fn drop(&mut self) {
        if let Ok(mut locks) = self.agent.locks.lock() {
            // One reference in the map, one here.
            let ours = locks
                .get(&self.thread)
                .is_some_and(|l| Arc::ptr_eq(l, &self.lock));
            if ours && Arc::strong_count(&self.lock) == 2 {
                locks.remove(&self.thread);
            }
        }
    }
}

/// Open the conversation store `kind` against the configured database.
pub async fn create_store(config: &Config, kind: &str) -> Result<Arc<dyn ConversationStore>> {
    match kind {
        "memory" => Ok(Arc::new(InMemoryConversationStore::new())),
        "sqlite" => Ok(Arc::new(
            SqliteConversationStore::new(db::connect(config).await?).await?,
        )),
        other => bail!("Unknown conversation store: {}", other),
    }
}

/// API key variables required by `config` that are unset or blank.
pub fn missing_api_keys(config: &Config) -> Vec<&'static str> {
    let mut required = vec![config.model.api_key_var()];
    if let Some(var) = config.web_search.api_key_var() {
        required.push(var);
    }
    if config.embedding.is_enabled() && !required.contains(&"OPENAI_API_KEY") {
        required.push("OPENAI_API_KEY");
    }
    required
        .into_iter()
        .filter(|var| {
            std::env::var(var)
                .map(|v| v.trim().is_empty())
                .unwrap_or(true)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rag_router_core::backend::{ModelBackend, OutputSchema, PromptMessage};
    use rag_router_core::retriever::Retriever;
    use rag_router_core::web::WebSearch;

    struct Direct;

    #[async_trait]
    impl ModelBackend for Direct {
        fn provider(&self) -> &str {
            "direct"
        }
        async fn complete(&self, _messages: &[PromptMessage]) -> Result<String> {
            Ok("answer".to_string())
        }
        async fn complete_structured(
            &self,
            _messages: &[PromptMessage],
            _schema: &OutputSchema,
        ) -> Result<String> {
            Ok(r#"{"route":"answer"}"#.to_string())
        }
    }

    struct Empty;

    #[async_trait]
    impl Retriever for Empty {
        async fn retrieve(&self, _query: &str, _k: usize) -> Result<String> {
            Ok(String::new())
        }
    }

    #[async_trait]
    impl WebSearch for Empty {
        async fn search(&self, _query: &str) -> String {
            String::new()
        }
    }

    struct Stalled;

    #[async_trait]
    impl ModelBackend for Stalled {
        fn provider(&self) -> &str {
            "stalled"
        }
        async fn complete(&self, _messages: &[PromptMessage]) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
        async fn complete_structured(
            &self,
            _messages: &[PromptMessage],
            _schema: &OutputSchema,
        ) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(r#"{"route":"answer"}"#.to_string())
        }
    }

    #[tokio::test]
    async fn test_cancelled_turns_release_thread_locks() {
        let orchestrator = Orchestrator::new(Arc::new(Stalled), Arc::new(Empty), Arc::new(Empty));
        let agent = Agent::new(orchestrator, Arc::new(InMemoryConversationStore::new()));

        for i in 0..50 {
            let thread = ThreadId::new(format!("abandoned-{}", i));
            let cancelled =
                tokio::time::timeout(Duration::from_millis(5), agent.handle_turn(&thread, "q"))
                    .await;
            assert!(cancelled.is_err());
        }
        assert_eq!(agent.tracked_threads(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_keeps_holder_entry() {
        let orchestrator = Orchestrator::new(Arc::new(Stalled), Arc::new(Empty), Arc::new(Empty));
        let agent = Arc::new(Agent::new(
            orchestrator,
            Arc::new(InMemoryConversationStore::new()),
        ));
        let thread = ThreadId::new("busy");

        let holder = {
            let agent = agent.clone();
            let thread = thread.clone();
            tokio::spawn(async move { agent.handle_turn(&thread, "first").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let waiter =
            tokio::time::timeout(Duration::from_millis(5), agent.handle_turn(&thread, "second"))
                .await;
        assert!(waiter.is_err());
        assert_eq!(agent.tracked_threads(), 1);

        holder.abort();
        let _ = holder.await;
        assert_eq!(agent.tracked_threads(), 0);
    }

    #[tokio::test]
    async fn test_unknown_store_kind_is_rejected() {
        let cfg = crate::config::parse_config("[db]\npath = \"unused.sqlite\"\n").unwrap();
        assert!(create_store(&cfg, "redis").await.is_err());
        assert!(create_store(&cfg, "memory").await.is_ok());
    }

    #[tokio::test]
    async fn test_thread_locks_are_pruned() {
        let orchestrator = Orchestrator::new(Arc::new(Direct), Arc::new(Empty), Arc::new(Empty));
        let agent = Agent::new(orchestrator, Arc::new(InMemoryConversationStore::new()));

        for i in 0..5 {
            let thread = ThreadId::new(format!("t{}", i));
            assert_eq!(agent.handle_turn(&thread, "q").await.unwrap(), "answer");
        }
        assert_eq!(agent.tracked_threads(), 0);
        assert_eq!(agent.provider(), "direct");
    }
}
