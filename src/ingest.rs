//! Knowledge base ingestion.
//!
//! scan folder → extract text → chunk → write `chunks` + `chunks_fts` →
//! embed inline (optional, non-fatal). Documents whose content hash is
//! unchanged are skipped unless a full re-ingest is requested. Documents
//! whose file has disappeared from the folder are removed.

use anyhow::Result;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use rag_router_core::chunk::chunk_text;
use rag_router_core::models::Chunk;

use crate::config::Config;
use crate::connector_fs;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::migrate;
use crate::models::SourceDocument;

/// Counters reported after an ingest run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub scanned: usize,
    pub upserted: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub skipped: usize,
    pub chunks_written: usize,
    pub embeddings_written: usize,
    pub embeddings_pending: usize,
    pub created_root: bool,
}

/// `ragr ingest`: run ingestion and print a summary.
pub async fn run_ingest(config: &Config, full: bool) -> Result<()> {
    let report = ingest(config, full).await?;

    println!("ingest {}", config.knowledge.root.display());
    if report.created_root {
        println!(
            "  created empty folder {}; add .md, .txt, .pdf or .docx files and re-run",
            config.knowledge.root.display()
        );
    }
    println!("  scanned: {} files", report.scanned);
    println!("  upserted documents: {}", report.upserted);
    println!("  unchanged: {}", report.unchanged);
    println!("  removed: {}", report.removed);
    println!("  skipped: {}", report.skipped);
    println!("  chunks written: {}", report.chunks_written);
    if config.embedding.is_enabled() {
        println!("  embeddings written: {}", report.embeddings_written);
        println!("  embeddings pending: {}", report.embeddings_pending);
    }
    println!("ok");
    Ok(())
}

/// Ingest the configured knowledge folder into the database.
pub async fn ingest(config: &Config, full: bool) -> Result<IngestReport> {
    let scan = connector_fs::scan_knowledge(&config.knowledge)?;
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;

    let provider = match embedding::create_provider(&config.embedding) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "could not create embedding provider; ingesting without embeddings");
            None
        }
    };

    let mut report = IngestReport {
        scanned: scan.documents.len() + scan.skipped.len(),
        skipped: scan.skipped.len(),
        created_root: scan.created_root,
        ..Default::default()
    };

    for doc in &scan.documents {
        let content_hash = hash_text(&doc.body);
        let existing = find_document(&pool, &doc.source_path).await?;

        if let Some((_, ref hash)) = existing {
            if !full && hash == &content_hash {
                report.unchanged += 1;
                continue;
            }
        }

        let doc_id = existing
            .map(|(id, _)| id)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        upsert_document(&pool, &doc_id, doc, &content_hash).await?;

        let chunks = chunk_text(
            &doc_id,
            &doc.body,
            config.knowledge.chunk_chars,
            config.knowledge.overlap_chars,
        );
        replace_chunks(&pool, &doc_id, &chunks).await?;

        if config.embedding.is_enabled() {
            let (ok, pending) = match provider.as_deref() {
                Some(p) => embed_chunks_inline(&pool, p, config.embedding.batch_size, &chunks).await,
                None => (0, chunks.len()),
            };
            report.embeddings_written += ok;
            report.embeddings_pending += pending;
        }

        info!(path = %doc.source_path, chunks = chunks.len(), "document ingested");
        report.upserted += 1;
        report.chunks_written += chunks.len();
    }

    let present: Vec<&str> = scan
        .documents
        .iter()
        .map(|d| d.source_path.as_str())
        .chain(scan.skipped.iter().map(|s| s.source_path.as_str()))
        .collect();
    report.removed = remove_missing(&pool, &present).await?;

    pool.close().await;
    Ok(report)
}

fn hash_text(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

async fn find_document(pool: &SqlitePool, source_path: &str) -> Result<Option<(String, String)>> {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT id, content_hash FROM documents WHERE source_path = ?")
            .bind(source_path)
            .fetch_optional(pool)
            .await?;
    Ok(row)
}

async fn upsert_document(
    pool: &SqlitePool,
    doc_id: &str,
    doc: &SourceDocument,
    content_hash: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO documents (id, source_path, title, content_type, updated_at, body, content_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source_path) DO UPDATE SET
            title = excluded.title,
            content_type = excluded.content_type,
            updated_at = excluded.updated_at,
            body = excluded.body,
            content_hash = excluded.content_hash
        "#,
    )
    .bind(doc_id)
    .bind(&doc.source_path)
    .bind(&doc.title)
    .bind(&doc.content_type)
    .bind(doc.updated_at.timestamp())
    .bind(&doc.body)
    .bind(content_hash)
    .execute(pool)
    .await?;
    Ok(())
}

async fn replace_chunks(pool: &SqlitePool, document_id: &str, chunks: &[Chunk]) -> Result<()> {
    let mut tx = pool.begin().await?;

    delete_document_rows(&mut tx, document_id).await?;

    for chunk in chunks {
        sqlx::query(
            "INSERT INTO chunks (id, document_id, chunk_index, text, hash) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO chunks_fts (chunk_id, document_id, text) VALUES (?, ?, ?)")
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(&chunk.text)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn delete_document_rows(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    document_id: &str,
) -> Result<()> {
    sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM chunks_fts WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Drop documents whose files are no longer in the folder.
async fn remove_missing(pool: &SqlitePool, present: &[&str]) -> Result<usize> {
    let known: Vec<(String, String)> = sqlx::query_as("SELECT id, source_path FROM documents")
        .fetch_all(pool)
        .await?;

    let mut removed = 0;
    for (id, path) in known {
        if present.contains(&path.as_str()) {
            continue;
        }
        let mut tx = pool.begin().await?;
        delete_document_rows(&mut tx, &id).await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(path = %path, "document removed");
        removed += 1;
    }
    Ok(removed)
}

/// Embed freshly written chunks. Failures leave chunks keyword-searchable
/// and are counted as pending rather than failing the ingest.
async fn embed_chunks_inline(
    pool: &SqlitePool,
    provider: &dyn EmbeddingProvider,
    batch_size: usize,
    chunks: &[Chunk],
) -> (usize, usize) {
    let mut embedded = 0;
    let mut pending = 0;

    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = match provider.embed(&texts).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "embedding batch failed");
                pending += batch.len();
                continue;
            }
        };
        if vectors.len() != batch.len() {
            warn!(
                expected = batch.len(),
                got = vectors.len(),
                "embedding batch size mismatch"
            );
            pending += batch.len();
            continue;
        }

        for (chunk, vec) in batch.iter().zip(vectors.iter()) {
            match upsert_vector(pool, chunk, provider, vec).await {
                Ok(()) => embedded += 1,
                Err(e) => {
                    warn!(chunk = %chunk.id, error = %e, "failed to store embedding");
                    pending += 1;
                }
            }
        }
    }

    (embedded, pending)
}

async fn upsert_vector(
    pool: &SqlitePool,
    chunk: &Chunk,
    provider: &dyn EmbeddingProvider,
    vec: &[f32],
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO chunk_vectors (chunk_id, document_id, model, dims, hash, embedding)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(chunk_id) DO UPDATE SET
            model = excluded.model,
            dims = excluded.dims,
            hash = excluded.hash,
            embedding = excluded.embedding
        "#,
    )
    .bind(&chunk.id)
    .bind(&chunk.document_id)
    .bind(provider.model_name())
    .bind(provider.dims() as i64)
    .bind(&chunk.hash)
    .bind(embedding::vec_to_blob(vec))
    .execute(pool)
    .await?;
    Ok(())
}
