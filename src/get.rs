//! Document retrieval by ID.
//!
//! Fetches a full document and its ordered chunks from the store. Used by the
//! `satsang get` CLI command.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::Row;

use crate::config::Config;
use crate::db;

#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    pub id: String,
    pub source_kind: String,
    pub title: String,
    pub author: Option<String>,
    pub source_url: Option<String>,
    pub source_path: Option<String>,
    pub published_at: Option<String>,
    pub content_hash: String,
    pub created_at: String, // ISO8601
    pub body: String,
    pub chunks: Vec<ChunkResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkResponse {
    pub index: i64,
    pub token_count: i64,
    pub content: String,
}

/// Core get function returning structured data.
pub async fn get_document(config: &Config, id: &str) -> Result<DocumentResponse> {
    let pool = db::connect(config).await?;

    let doc_row = sqlx::query(
        "SELECT id, source_kind, title, author, source_url, source_path, published_at, content_hash, created_at, body FROM documents WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?;

    let doc_row = match doc_row {
        Some(row) => row,
        None => {
            pool.close().await;
            bail!("document not found: {}", id);
        }
    };

    let created_at: i64 = doc_row.get("created_at");
    let published_at: Option<i64> = doc_row.get("published_at");

    let chunk_rows = sqlx::query(
        "SELECT chunk_index, token_count, content FROM chunks WHERE document_id = ? ORDER BY chunk_index ASC",
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let chunks: Vec<ChunkResponse> = chunk_rows
        .iter()
        .map(|row| ChunkResponse {
            index: row.get("chunk_index"),
            token_count: row.get("token_count"),
            content: row.get("content"),
        })
        .collect();

    pool.close().await;

    Ok(DocumentResponse {
        id: doc_row.get("id"),
        source_kind: doc_row.get("source_kind"),
        title: doc_row.get("title"),
        author: doc_row.get("author"),
        source_url: doc_row.get("source_url"),
        source_path: doc_row.get("source_path"),
        published_at: published_at.map(format_ts_iso),
        content_hash: doc_row.get("content_hash"),
        created_at: format_ts_iso(created_at),
        body: doc_row.get("body"),
        chunks,
    })
}

/// CLI entry point — calls get_document and prints to stdout.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let doc = get_document(config, id).await?;

    println!("--- Document ---");
    println!("id:           {}", doc.id);
    println!("title:        {}", doc.title);
    println!("source_kind:  {}", doc.source_kind);
    if let Some(ref auth) = doc.author {
        println!("author:       {}", auth);
    }
    if let Some(ref url) = doc.source_url {
        println!("source_url:   {}", url);
    }
    if let Some(ref path) = doc.source_path {
        println!("source_path:  {}", path);
    }
    if let Some(ref published) = doc.published_at {
        println!("published_at: {}", published);
    }
    println!("content_hash: {}", doc.content_hash);
    println!("created_at:   {}", doc.created_at);
    println!();

    println!("--- Body ---");
    println!("{}", doc.body);
    println!();

    println!("--- Chunks ({}) ---", doc.chunks.len());
    for chunk in &doc.chunks {
        println!("[chunk {} — {} words]", chunk.index, chunk.token_count);
        println!("{}", chunk.content);
        println!();
    }

    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
