//! Corpus statistics overview.
//!
//! A quick summary of what's ingested and indexed: document and chunk counts,
//! the pinned embedding space, and a per-source-kind breakdown. Used by
//! `satsang stats` to confirm that ingestion and indexing are doing what they
//! should.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

struct KindStats {
    source_kind: String,
    doc_count: i64,
    chunk_count: i64,
}

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await?;

    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await?;

    let unindexed_docs: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM documents d WHERE NOT EXISTS \
         (SELECT 1 FROM chunks c WHERE c.document_id = d.id)",
    )
    .fetch_one(&pool)
    .await?;

    let embedding_model: Option<String> =
        sqlx::query_scalar("SELECT value FROM corpus_meta WHERE key = 'embedding_model'")
            .fetch_optional(&pool)
            .await?;
    let embedding_dims: Option<String> =
        sqlx::query_scalar("SELECT value FROM corpus_meta WHERE key = 'embedding_dims'")
            .fetch_optional(&pool)
            .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Satsang — Corpus Stats");
    println!("======================");
    println!();
    println!("  Database:   {}", config.db.path.display());
    println!("  Size:       {}", format_bytes(db_size));
    println!();
    println!("  Documents:  {}", total_docs);
    println!("  Chunks:     {}", total_chunks);
    println!("  Unindexed:  {}", unindexed_docs);
    match (embedding_model, embedding_dims) {
        (Some(model), Some(dims)) => println!("  Embedding:  {} ({} dims)", model, dims),
        _ => println!("  Embedding:  (not yet indexed)"),
    }

    let kind_rows = sqlx::query(
        r#"
        SELECT
            d.source_kind,
            COUNT(DISTINCT d.id) AS doc_count,
            COUNT(c.id) AS chunk_count
        FROM documents d
        LEFT JOIN chunks c ON c.document_id = d.id
        GROUP BY d.source_kind
        ORDER BY doc_count DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let kind_stats: Vec<KindStats> = kind_rows
        .iter()
        .map(|row| KindStats {
            source_kind: row.get("source_kind"),
            doc_count: row.get("doc_count"),
            chunk_count: row.get("chunk_count"),
        })
        .collect();

    if !kind_stats.is_empty() {
        println!();
        println!("  By source kind:");
        println!("  {:<12} {:>6} {:>8}", "KIND", "DOCS", "CHUNKS");
        println!("  {}", "-".repeat(28));
        for s in &kind_stats {
            println!(
                "  {:<12} {:>6} {:>8}",
                s.source_kind, s.doc_count, s.chunk_count
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
