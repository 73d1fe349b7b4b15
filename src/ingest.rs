//! Document ingestion: content-hash dedup and the minimum-length floor.
//!
//! Every connector funnels through [`upsert_document`]. The SHA-256 of the
//! full extracted text is the dedup key: ingesting byte-identical text twice
//! — even from different paths — resolves to the one existing document row.
//! Texts under the configured floor are discarded before they ever reach the
//! store.

use anyhow::Result;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::NewDocument;

/// Per-document result of an ingest attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new document row was created.
    Created(String),
    /// Byte-identical text already exists; the existing id is returned and
    /// nothing is written.
    Duplicate(String),
    /// Extracted text is shorter than the configured floor; nothing stored.
    TooShort,
}

/// Counters for one connector run, printed as the command summary.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub scanned: u64,
    pub created: u64,
    pub duplicates: u64,
    pub too_short: u64,
    pub failed: u64,
}

impl IngestStats {
    pub fn record(&mut self, outcome: &IngestOutcome) {
        match outcome {
            IngestOutcome::Created(_) => self.created += 1,
            IngestOutcome::Duplicate(_) => self.duplicates += 1,
            IngestOutcome::TooShort => self.too_short += 1,
        }
    }

    pub fn print_summary(&self, label: &str) {
        println!("{}", label);
        println!("  scanned: {}", self.scanned);
        println!("  documents created: {}", self.created);
        println!("  duplicates skipped: {}", self.duplicates);
        println!("  too short: {}", self.too_short);
        println!("  failed: {}", self.failed);
        println!("ok");
    }
}

/// SHA-256 hex digest of a document's full extracted text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Insert a document unless byte-identical text is already stored.
///
/// Returns the outcome rather than an id so callers can report duplicate and
/// too-short counts instead of inferring them from logs.
pub async fn upsert_document(
    pool: &SqlitePool,
    doc: &NewDocument,
    min_doc_chars: usize,
) -> Result<IngestOutcome> {
    if doc.body.chars().count() < min_doc_chars {
        return Ok(IngestOutcome::TooShort);
    }

    let hash = content_hash(&doc.body);

    let existing: Option<String> =
        sqlx::query_scalar("SELECT id FROM documents WHERE content_hash = ?")
            .bind(&hash)
            .fetch_optional(pool)
            .await?;

    if let Some(id) = existing {
        return Ok(IngestOutcome::Duplicate(id));
    }

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO documents
            (id, source_kind, title, author, source_url, source_path, published_at, content_hash, created_at, body)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(doc.source_kind.as_str())
    .bind(&doc.title)
    .bind(&doc.author)
    .bind(&doc.source_url)
    .bind(&doc.source_path)
    .bind(doc.published_at)
    .bind(&hash)
    .bind(now)
    .bind(&doc.body)
    .execute(pool)
    .await?;

    Ok(IngestOutcome::Created(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_stable() {
        let a = content_hash("awareness");
        let b = content_hash("awareness");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_hash("thought"));
    }

    #[test]
    fn test_stats_record() {
        let mut stats = IngestStats::default();
        stats.record(&IngestOutcome::Created("x".into()));
        stats.record(&IngestOutcome::Duplicate("x".into()));
        stats.record(&IngestOutcome::TooShort);
        assert_eq!(stats.created, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.too_short, 1);
    }
}
