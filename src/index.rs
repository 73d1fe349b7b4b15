//! Indexing pipeline orchestration: chunk → embed → upsert.
//!
//! Walks every stored document (newest first), skips any that already owns
//! chunks, splits the rest into overlapping word windows, embeds all windows
//! of a document in one batched call, and upserts the chunk rows inside a
//! single transaction per document. Running it twice over an unchanged corpus
//! writes nothing the second time.
//!
//! Per-document failures are recorded as explicit outcomes and never abort
//! the run. Two things do abort it: a store failure, and an embedding
//! dimensionality that disagrees with what the corpus was indexed with.

use anyhow::{bail, Context, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::chunk;
use crate::config::{ChunkingConfig, Config};
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::models::Chunk;

/// Result of processing one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Chunks were written for this document.
    Indexed { chunks: usize },
    /// The document already owns at least one chunk.
    SkippedAlreadyIndexed,
    /// Body missing or under the minimum-length floor. Expected, silent.
    SkippedShortOrMissing,
    /// Embedding failed for this document; the run continued.
    Failed { reason: String },
}

/// Counters for one index run.
#[derive(Debug, Default)]
pub struct IndexSummary {
    pub documents: u64,
    pub indexed: u64,
    pub chunks_written: u64,
    pub skipped_already_indexed: u64,
    pub skipped_short_or_missing: u64,
    pub failed: u64,
}

impl IndexSummary {
    fn record(&mut self, outcome: &IndexOutcome) {
        match outcome {
            IndexOutcome::Indexed { chunks } => {
                self.indexed += 1;
                self.chunks_written += *chunks as u64;
            }
            IndexOutcome::SkippedAlreadyIndexed => self.skipped_already_indexed += 1,
            IndexOutcome::SkippedShortOrMissing => self.skipped_short_or_missing += 1,
            IndexOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// CLI entry point for `satsang index`.
pub async fn run_index(config: &Config, force: bool) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let pool = db::connect(config).await?;

    let summary = index_documents(
        &pool,
        provider.as_ref(),
        &config.chunking,
        config.ingest.min_doc_chars,
        force,
    )
    .await?;

    println!("index");
    println!("  documents: {}", summary.documents);
    println!("  indexed: {}", summary.indexed);
    println!("  chunks written: {}", summary.chunks_written);
    println!("  already indexed: {}", summary.skipped_already_indexed);
    println!("  short or missing: {}", summary.skipped_short_or_missing);
    println!("  failed: {}", summary.failed);
    println!("ok");

    pool.close().await;
    Ok(())
}

/// Index every unindexed document. With `force`, the already-indexed gate is
/// bypassed and existing chunk rows are overwritten in place via the
/// `(document_id, chunk_index)` conflict path.
pub async fn index_documents(
    pool: &SqlitePool,
    provider: &dyn EmbeddingProvider,
    chunking: &ChunkingConfig,
    min_doc_chars: usize,
    force: bool,
) -> Result<IndexSummary> {
    ensure_embedding_space(pool, provider.model_name(), provider.dims()).await?;

    // Newest first; id tie-break keeps run order reproducible
    let doc_ids: Vec<String> =
        sqlx::query_scalar("SELECT id FROM documents ORDER BY created_at DESC, id ASC")
            .fetch_all(pool)
            .await?;

    let mut summary = IndexSummary {
        documents: doc_ids.len() as u64,
        ..Default::default()
    };

    for doc_id in &doc_ids {
        let outcome =
            index_one_document(pool, provider, chunking, min_doc_chars, force, doc_id).await?;
        match &outcome {
            IndexOutcome::Indexed { chunks } => {
                tracing::info!(doc_id = %doc_id, chunks, "indexed document");
            }
            IndexOutcome::Failed { reason } => {
                tracing::warn!(doc_id = %doc_id, reason = %reason, "indexing failed, continuing");
            }
            _ => {}
        }
        summary.record(&outcome);
    }

    Ok(summary)
}

/// Process a single document. Store errors propagate; embedding errors become
/// a [`IndexOutcome::Failed`]; a dimension mismatch aborts.
async fn index_one_document(
    pool: &SqlitePool,
    provider: &dyn EmbeddingProvider,
    chunking: &ChunkingConfig,
    min_doc_chars: usize,
    force: bool,
    doc_id: &str,
) -> Result<IndexOutcome> {
    if !force && document_has_chunks(pool, doc_id).await? {
        return Ok(IndexOutcome::SkippedAlreadyIndexed);
    }

    let body: Option<String> = sqlx::query_scalar("SELECT body FROM documents WHERE id = ?")
        .bind(doc_id)
        .fetch_optional(pool)
        .await?;

    let body = match body {
        Some(b) => b,
        None => return Ok(IndexOutcome::SkippedShortOrMissing),
    };
    if body.chars().count() < min_doc_chars {
        return Ok(IndexOutcome::SkippedShortOrMissing);
    }

    let contents = chunk::split_words(&body, chunking.target_words, chunking.overlap_words);
    if contents.is_empty() {
        return Ok(IndexOutcome::SkippedShortOrMissing);
    }

    // One batched call per document
    let mut vectors = match provider.embed(&contents).await {
        Ok(v) => v,
        Err(e) => {
            return Ok(IndexOutcome::Failed {
                reason: format!("embedding failed: {:#}", e),
            });
        }
    };

    if vectors.len() != contents.len() {
        return Ok(IndexOutcome::Failed {
            reason: format!(
                "embedding returned {} vectors for {} chunks",
                vectors.len(),
                contents.len()
            ),
        });
    }

    // Dimensionality disagreement is a configuration error: storing these
    // vectors would silently poison the search space.
    for v in &vectors {
        if v.len() != provider.dims() {
            bail!(
                "embedding dimension mismatch: provider '{}' declared {} dims but returned {}",
                provider.model_name(),
                provider.dims(),
                v.len()
            );
        }
    }

    // Unit-normalize at write time; cosine and Euclidean ordering then agree
    for v in vectors.iter_mut() {
        embedding::normalize(v);
    }

    let chunks: Vec<Chunk> = contents
        .into_iter()
        .enumerate()
        .map(|(idx, content)| Chunk {
            id: Uuid::new_v4().to_string(),
            document_id: doc_id.to_string(),
            chunk_index: idx as i64,
            token_count: chunk::word_count(&content),
            content,
            section: None,
        })
        .collect();

    upsert_chunks(pool, &chunks, &vectors).await?;

    Ok(IndexOutcome::Indexed {
        chunks: chunks.len(),
    })
}

/// Whether the document already owns at least one chunk.
pub async fn document_has_chunks(pool: &SqlitePool, doc_id: &str) -> Result<bool> {
    let row: Option<i64> = sqlx::query_scalar("SELECT 1 FROM chunks WHERE document_id = ? LIMIT 1")
        .bind(doc_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Write one document's chunk set atomically. Existing rows for the same
/// `(document_id, chunk_index)` are overwritten (content + embedding); other
/// documents' chunks are untouched.
async fn upsert_chunks(pool: &SqlitePool, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
    let mut tx = pool.begin().await?;

    for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
        let blob = embedding::vec_to_blob(vector);
        sqlx::query(
            r#"
            INSERT INTO chunks
                (id, document_id, chunk_index, content, section, token_count, embedding, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, '{}')
            ON CONFLICT(document_id, chunk_index) DO UPDATE SET
                content = excluded.content,
                token_count = excluded.token_count,
                embedding = excluded.embedding
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.content)
        .bind(&chunk.section)
        .bind(chunk.token_count)
        .bind(&blob)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Pin the embedding space the corpus is indexed in.
///
/// The first index run records the provider's model and dimensionality in
/// `corpus_meta`. Later runs must match: a different dimensionality always
/// aborts; a different model aborts unless the chunk table is empty (the
/// legitimate re-embed flow is: clear chunks, switch provider, re-run).
pub async fn ensure_embedding_space(
    pool: &SqlitePool,
    model: &str,
    dims: usize,
) -> Result<()> {
    let stored_model: Option<String> =
        sqlx::query_scalar("SELECT value FROM corpus_meta WHERE key = 'embedding_model'")
            .fetch_optional(pool)
            .await?;
    let stored_dims: Option<String> =
        sqlx::query_scalar("SELECT value FROM corpus_meta WHERE key = 'embedding_dims'")
            .fetch_optional(pool)
            .await?;

    if let (Some(stored_model), Some(stored_dims)) = (&stored_model, &stored_dims) {
        let stored_dims: usize = stored_dims
            .parse()
            .with_context(|| format!("corrupt corpus_meta embedding_dims: {}", stored_dims))?;

        if stored_dims != dims {
            bail!(
                "corpus is indexed with {}-dimensional vectors but provider '{}' produces {}; \
                 clear the chunks table to re-embed",
                stored_dims,
                model,
                dims
            );
        }

        if stored_model != model {
            let chunk_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
                .fetch_one(pool)
                .await?;
            if chunk_count > 0 {
                bail!(
                    "corpus is indexed with model '{}' but provider is '{}'; \
                     clear the chunks table to re-embed",
                    stored_model,
                    model
                );
            }
            // Empty corpus: adopt the new model
        } else {
            return Ok(());
        }
    }

    set_meta(pool, "embedding_model", model).await?;
    set_meta(pool, "embedding_dims", &dims.to_string()).await?;
    Ok(())
}

async fn set_meta(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO corpus_meta (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}
