//! Conversation persistence abstraction.
//!
//! The orchestrator is stateless between turns; the [`ConversationStore`]
//! keeps one [`ConversationState`] per thread. The contract is a plain
//! keyed get/put with last-writer-wins semantics. Callers that need
//! read-modify-write atomicity (the turn entry point) serialize access per
//! thread themselves.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ConversationState, ThreadId};

/// Keyed storage for conversation state.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](ConversationStore::get) | Load a thread's state, `None` if unseen |
/// | [`put`](ConversationStore::put) | Replace a thread's state |
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get(&self, thread: &ThreadId) -> Result<Option<ConversationState>>;

    async fn put(&self, thread: &ThreadId, state: &ConversationState) -> Result<()>;
}
