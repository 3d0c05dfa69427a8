//! SQLite-backed knowledge base retrieval.
//!
//! [`SqliteRetriever`] implements the core [`Retriever`] boundary over the
//! tables written by [`ingest`](crate::ingest):
//!
//! 1. The query is tokenised into an FTS5 `OR` query of quoted terms, so user
//!    punctuation (`?`, `'`, `-`) can never produce an FTS syntax error.
//! 2. Keyword candidates come from `chunks_fts` ranked by BM25.
//! 3. With an embedding provider, vector candidates are scored by cosine
//!    similarity and merged: `score = (1-α)·keyword + α·semantic`, each
//!    channel min-max normalised to `[0, 1]`.
//! 4. The top-k chunk texts are joined with a blank line.
//!
//! No matches yield `""`; a missing schema or unreadable database is an error.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use rag_router_core::retriever::{join_passages, Retriever};

use crate::config::Config;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};

/// Longest query term kept; longer tokens are almost never useful matches.
const MAX_TERM_CHARS: usize = 64;
/// Terms beyond this count are dropped.
const MAX_TERMS: usize = 32;

pub struct SqliteRetriever {
    pool: SqlitePool,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    hybrid_alpha: f64,
    candidate_k: i64,
}

impl SqliteRetriever {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            embedder: None,
            hybrid_alpha: 0.0,
            candidate_k: 40,
        }
    }

    /// Enable hybrid scoring with `alpha` weight on the semantic channel.
    pub fn with_embeddings(mut self, embedder: Arc<dyn EmbeddingProvider>, alpha: f64) -> Self {
        self.embedder = Some(embedder);
        self.hybrid_alpha = alpha;
        self
    }

    pub fn with_candidate_k(mut self, candidate_k: i64) -> Self {
        self.candidate_k = candidate_k.max(1);
        self
    }

    /// Open the configured database and build a retriever from config.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        let mut retriever =
            SqliteRetriever::new(pool).with_candidate_k(config.retrieval.candidate_k);
        if let Some(embedder) = embedding::create_provider(&config.embedding)? {
            retriever = retriever.with_embeddings(embedder, config.retrieval.hybrid_alpha);
        }
        Ok(retriever)
    }

    /// Ranked chunk texts for `query`, best first.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let keyword = match build_fts_query(query) {
            Some(fts) => self.keyword_candidates(&fts).await?,
            None => {
                self.ensure_schema().await?;
                Vec::new()
            }
        };

        let vector = match &self.embedder {
            Some(embedder) if !query.trim().is_empty() => {
                match self.vector_candidates(embedder.as_ref(), query).await {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(error = %format!("{:#}", e), "semantic retrieval failed, using keyword only");
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        };

        let alpha = if self.embedder.is_some() {
            self.hybrid_alpha
        } else {
            0.0
        };
        let mut merged = merge_candidates(&keyword, &vector, alpha);
        merged.truncate(k);
        debug!(
            keyword = keyword.len(),
            vector = vector.len(),
            returned = merged.len(),
            "knowledge base searched"
        );
        Ok(merged)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query("SELECT 1 FROM chunks_fts LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .context("knowledge base is not initialised; run `ragr init` and `ragr ingest`")?;
        Ok(())
    }

    async fn keyword_candidates(&self, fts_query: &str) -> Result<Vec<Candidate>> {
        let rows = sqlx::query(
            r#"
            SELECT chunks_fts.chunk_id AS chunk_id, chunks_fts.rank AS rank,
                   chunks.chunk_index AS chunk_index, chunks.text AS text
            FROM chunks_fts
            JOIN chunks ON chunks.id = chunks_fts.chunk_id
            WHERE chunks_fts MATCH ?
            ORDER BY chunks_fts.rank
            LIMIT ?
            "#,
        )
        .bind(fts_query)
        .bind(self.candidate_k)
        .fetch_all(&self.pool)
        .await
        .context("knowledge base keyword query failed")?;

        Ok(rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                Candidate {
                    chunk_id: row.get("chunk_id"),
                    chunk_index: row.get("chunk_index"),
                    raw_score: -rank,
                    text: row.get("text"),
                }
            })
            .collect())
    }

    async fn vector_candidates(
        &self,
        embedder: &dyn EmbeddingProvider,
        query: &str,
    ) -> Result<Vec<Candidate>> {
        let query_vec = embedding::embed_query(embedder, query).await?;

        let rows = sqlx::query(
            r#"
            SELECT cv.chunk_id, cv.embedding, c.chunk_index, c.text
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<Candidate> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = embedding::blob_to_vec(&blob);
                Candidate {
                    chunk_id: row.get("chunk_id"),
                    chunk_index: row.get("chunk_index"),
                    raw_score: embedding::cosine_similarity(&query_vec, &vec) as f64,
                    text: row.get("text"),
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(self.candidate_k as usize);
        Ok(candidates)
    }
}

#[async_trait]
impl Retriever for SqliteRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<String> {
        let hits = self.search(query, k).await?;
        Ok(join_passages(hits.into_iter().map(|h| h.text)))
    }
}

/// A chunk with its merged score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub score: f64,
    pub text: String,
}

#[derive(Debug, Clone)]
struct Candidate {
    chunk_id: String,
    chunk_index: i64,
    raw_score: f64,
    text: String,
}

/// Turn free text into a safe FTS5 query: alphanumeric terms, each quoted,
/// joined with `OR`. `None` when the text has no searchable terms.
pub fn build_fts_query(query: &str) -> Option<String> {
    let mut terms: Vec<String> = Vec::new();
    for token in query.split(|c: char| !c.is_alphanumeric()) {
        if token.is_empty() {
            continue;
        }
        let term: String = token.chars().take(MAX_TERM_CHARS).collect::<String>().to_lowercase();
        if !terms.contains(&term) {
            terms.push(term);
        }
        if terms.len() == MAX_TERMS {
            break;
        }
    }

    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

/// Min-max normalise raw scores to `[0, 1]`; a flat set maps to `1.0`.
fn normalize_scores(candidates: &[Candidate]) -> HashMap<&str, f64> {
    if candidates.is_empty() {
        return HashMap::new();
    }

    let s_min = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::INFINITY, f64::min);
    let s_max = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::NEG_INFINITY, f64::max);

    candidates
        .iter()
        .map(|c| {
            let norm = if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (c.raw_score - s_min) / (s_max - s_min)
            };
            (c.chunk_id.as_str(), norm)
        })
        .collect()
}

/// Merge keyword and vector candidates into one ranking.
///
/// Ties break on chunk position then id so results are deterministic.
fn merge_candidates(keyword: &[Candidate], vector: &[Candidate], alpha: f64) -> Vec<ScoredChunk> {
    let kw = normalize_scores(keyword);
    let vec = normalize_scores(vector);

    let mut all: HashMap<&str, &Candidate> = HashMap::new();
    for c in keyword.iter().chain(vector.iter()) {
        all.entry(c.chunk_id.as_str()).or_insert(c);
    }

    let mut scored: Vec<(&Candidate, f64)> = all
        .into_values()
        .map(|c| {
            let k = kw.get(c.chunk_id.as_str()).copied().unwrap_or(0.0);
            let v = vec.get(c.chunk_id.as_str()).copied().unwrap_or(0.0);
            (c, (1.0 - alpha) * k + alpha * v)
        })
        .collect();

    scored.sort_by(|(a, sa), (b, sb)| {
        sb.partial_cmp(sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk_index.cmp(&b.chunk_index))
            .then(a.chunk_id.cmp(&b.chunk_id))
    });

    scored
        .into_iter()
        .map(|(c, score)| ScoredChunk {
            chunk_id: c.chunk_id.clone(),
            score,
            text: c.text.clone(),
        })
        .collect()
}
