//! Ingestion-side data types.
//!
//! Conversation and routing types live in `rag_router_core::models`.

use chrono::{DateTime, Utc};

/// A file from the knowledge folder, read and converted to text.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Path relative to the knowledge root, `/`-separated.
    pub source_path: String,
    pub title: String,
    pub content_type: String,
    pub updated_at: DateTime<Utc>,
    pub body: String,
}

/// A file that was found but could not be turned into text.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub source_path: String,
    pub reason: String,
}
