//! Audio connector: ingest transcripts produced by an external transcriber.
//!
//! Transcription itself (whisper or similar) runs outside this process and
//! leaves one `*.txt` file per recording in the configured directory. This
//! connector picks those up as `audio` documents, titled by file stem. The
//! content-hash upsert makes re-runs free: an unchanged transcript resolves
//! to its existing document.

use anyhow::{bail, Result};
use walkdir::WalkDir;

use crate::config::Config;
use crate::db;
use crate::ingest::{self, IngestStats};
use crate::models::{NewDocument, SourceKind};

pub async fn run_transcribe(config: &Config) -> Result<()> {
    let dir = &config.ingest.transcripts_dir;
    if !dir.exists() {
        bail!("transcripts directory does not exist: {}", dir.display());
    }

    let pool = db::connect(config).await?;
    let mut stats = IngestStats::default();

    let mut paths: Vec<_> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("txt"))
        .collect();
    paths.sort();

    for path in paths {
        stats.scanned += 1;
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable transcript, skipping");
                stats.failed += 1;
                continue;
            }
        };

        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Untitled".to_string());

        let doc = NewDocument {
            source_kind: SourceKind::Audio,
            title,
            author: config.ingest.author.clone(),
            source_url: None,
            source_path: Some(path.display().to_string()),
            published_at: None,
            body: text,
        };
        let outcome = ingest::upsert_document(&pool, &doc, config.ingest.min_doc_chars).await?;
        stats.record(&outcome);
    }

    stats.print_summary("transcribe");
    pool.close().await;
    Ok(())
}
