//! SQLite-backed [`ConversationStore`].
//!
//! Each thread's [`ConversationState`] is stored as one JSON row in the
//! `conversations` table, so conversations survive restarts of `ragr serve`
//! and can be resumed from `ragr chat --thread`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;

use rag_router_core::models::{ConversationState, ThreadId};
use rag_router_core::store::ConversationStore;

use crate::migrate;

pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    /// Wrap a pool, creating the schema if needed.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        migrate::migrate_pool(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn get(&self, thread: &ThreadId) -> Result<Option<ConversationState>> {
        let row: Option<String> =
            sqlx::query_scalar("SELECT state_json FROM conversations WHERE thread_id = ?")
                .bind(thread.as_str())
                .fetch_optional(&self.pool)
                .await?;

        row.map(|json| {
            serde_json::from_str(&json)
                .with_context(|| format!("corrupt conversation state for thread {}", thread))
        })
        .transpose()
    }

    async fn put(&self, thread: &ThreadId, state: &ConversationState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        sqlx::query(
            r#"
            INSERT INTO conversations (thread_id, state_json, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(thread_id) DO UPDATE SET
                state_json = excluded.state_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(thread.as_str())
        .bind(json)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
