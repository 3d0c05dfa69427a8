//! In-memory [`ConversationStore`] for tests and single-process use.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. State lives for the lifetime
//! of the process; nothing is ever evicted.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{ConversationState, ThreadId};

use super::ConversationStore;

#[derive(Default)]
pub struct InMemoryConversationStore {
    threads: RwLock<HashMap<ThreadId, ConversationState>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of threads seen so far.
    pub fn len(&self) -> usize {
        self.threads.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get(&self, thread: &ThreadId) -> Result<Option<ConversationState>> {
        let threads = self
            .threads
            .read()
            .map_err(|_| anyhow!("conversation store lock poisoned"))?;
        Ok(threads.get(thread).cloned())
    }

    async fn put(&self, thread: &ThreadId, state: &ConversationState) -> Result<()> {
        let mut threads = self
            .threads
            .write()
            .map_err(|_| anyhow!("conversation store lock poisoned"))?;
        threads.insert(thread.clone(), state.clone());
        Ok(())
    }
}
