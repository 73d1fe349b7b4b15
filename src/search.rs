//! Nearest-neighbor retrieval over the chunk store.
//!
//! The query is embedded with the same provider used at index time,
//! unit-normalized, and compared against every stored chunk vector.
//! Candidates are ordered by Euclidean distance (over unit vectors this
//! ranks identically to cosine distance, so the substitution changes
//! performance, not results); the reported score is `1 − cosine_distance`
//! on a 0–1 scale. No threshold is applied — the top-k nearest always come
//! back, and relevance judgment belongs to the caller.

use anyhow::{bail, Result};
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;

use crate::config::Config;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::models::{SearchHit, SourceKind};

/// Top-k chunk retrieval, parent-document metadata joined in.
///
/// Returns at most `k` hits ordered by descending score; fewer when the
/// corpus is smaller; empty (never an error) when the corpus is empty. A
/// chunk whose parent document is missing means the ownership invariant was
/// violated and surfaces as an error.
pub async fn search_chunks(
    pool: &sqlx::SqlitePool,
    provider: &dyn EmbeddingProvider,
    query: &str,
    k: usize,
) -> Result<Vec<SearchHit>> {
    if query.trim().is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    let rows = sqlx::query("SELECT id, document_id, content, embedding FROM chunks")
        .fetch_all(pool)
        .await?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let mut query_vec = embedding::embed_query(provider, query).await?;
    embedding::normalize(&mut query_vec);
    if query_vec.len() != provider.dims() {
        bail!(
            "query embedding has {} dims but provider '{}' declares {}",
            query_vec.len(),
            provider.model_name(),
            provider.dims()
        );
    }

    struct Candidate {
        chunk_id: String,
        document_id: String,
        content: String,
        distance: f32,
        cosine_distance: f32,
    }

    let mut candidates: Vec<Candidate> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let vec = embedding::blob_to_vec(&blob);
            Candidate {
                chunk_id: row.get("id"),
                document_id: row.get("document_id"),
                content: row.get("content"),
                distance: embedding::l2_distance(&query_vec, &vec),
                cosine_distance: 1.0 - embedding::cosine_similarity(&query_vec, &vec),
            }
        })
        .collect();

    // Euclidean ordering, chunk-id tie-break for determinism
    candidates.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    candidates.truncate(k);

    // Join parent-document metadata
    struct DocMeta {
        title: String,
        source_kind: SourceKind,
        source_url: Option<String>,
    }

    let mut doc_meta: HashMap<String, DocMeta> = HashMap::new();
    for cand in &candidates {
        if doc_meta.contains_key(&cand.document_id) {
            continue;
        }
        let row =
            sqlx::query("SELECT title, source_kind, source_url FROM documents WHERE id = ?")
                .bind(&cand.document_id)
                .fetch_optional(pool)
                .await?;
        let row = match row {
            Some(row) => row,
            None => bail!(
                "consistency error: chunk {} references missing document {}",
                cand.chunk_id,
                cand.document_id
            ),
        };
        let kind: String = row.get("source_kind");
        doc_meta.insert(
            cand.document_id.clone(),
            DocMeta {
                title: row.get("title"),
                source_kind: SourceKind::from_str(&kind)?,
                source_url: row.get("source_url"),
            },
        );
    }

    let hits = candidates
        .into_iter()
        .map(|cand| {
            let meta = &doc_meta[&cand.document_id];
            SearchHit {
                content: cand.content,
                title: meta.title.clone(),
                source_kind: meta.source_kind,
                source_url: meta.source_url.clone(),
                score: 1.0 - cand.cosine_distance as f64,
            }
        })
        .collect();

    Ok(hits)
}

/// CLI entry point for `satsang search`.
pub async fn run_search(config: &Config, query: &str, k: usize) -> Result<()> {
    let provider = embedding::create_provider(&config.embedding)?;
    let pool = db::connect(config).await?;

    let hits = search_chunks(&pool, provider.as_ref(), query, k).await?;

    if hits.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.3}] {} ({})", i + 1, hit.score, hit.title, hit.source_kind);
        if let Some(ref url) = hit.source_url {
            println!("    url: {}", url);
        }
        println!("    excerpt: \"{}\"", excerpt(&hit.content, 140));
        println!();
    }

    pool.close().await;
    Ok(())
}

fn excerpt(content: &str, max_chars: usize) -> String {
    let flat = content.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}…", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_short_unchanged() {
        assert_eq!(excerpt("short text", 140), "short text");
    }

    #[test]
    fn test_excerpt_truncates_on_chars() {
        let long = "x".repeat(200);
        let out = excerpt(&long, 140);
        assert_eq!(out.chars().count(), 141);
        assert!(out.ends_with('…'));
    }
}
