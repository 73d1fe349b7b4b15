//! Book connector: PDF and EPUB ingestion.
//!
//! Walks the configured directories, extracts plain text per file, and
//! funnels it through the content-hash upsert. A book that fails to extract
//! is logged and skipped; the run continues with the rest of the shelf.

use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::db;
use crate::extract;
use crate::ingest::{self, IngestStats};
use crate::models::{NewDocument, SourceKind};

pub async fn run_ingest_books(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let mut stats = IngestStats::default();

    for path in files_with_extension(&config.ingest.pdf_dir, "pdf") {
        ingest_book(&pool, config, &path, SourceKind::Pdf, &mut stats).await?;
    }
    for path in files_with_extension(&config.ingest.epub_dir, "epub") {
        ingest_book(&pool, config, &path, SourceKind::Epub, &mut stats).await?;
    }

    stats.print_summary("ingest-books");
    pool.close().await;
    Ok(())
}

async fn ingest_book(
    pool: &sqlx::SqlitePool,
    config: &Config,
    path: &Path,
    kind: SourceKind,
    stats: &mut IngestStats,
) -> Result<()> {
    stats.scanned += 1;

    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable file, skipping");
            stats.failed += 1;
            return Ok(());
        }
    };

    let text = match kind {
        SourceKind::Pdf => extract::pdf_to_text(&bytes),
        SourceKind::Epub => extract::epub_to_text(&bytes),
        _ => unreachable!("book connector only handles pdf and epub"),
    };
    let text = match text {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "extraction failed, skipping");
            stats.failed += 1;
            return Ok(());
        }
    };

    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Untitled".to_string());

    let doc = NewDocument {
        source_kind: kind,
        title,
        author: config.ingest.author.clone(),
        source_url: None,
        source_path: Some(path.display().to_string()),
        published_at: None,
        body: text,
    };
    let outcome = ingest::upsert_document(pool, &doc, config.ingest.min_doc_chars).await?;
    stats.record(&outcome);
    Ok(())
}

/// Files under `dir` (recursively) with the given extension, sorted for a
/// deterministic run order. A missing directory is an empty shelf, not an
/// error.
fn files_with_extension(dir: &Path, ext: &str) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut paths: Vec<_> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(ext))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    paths
}
