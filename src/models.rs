//! Core data models used throughout Satsang.
//!
//! These types represent the documents, chunks, and search hits that flow
//! through the ingestion and retrieval pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where a document's text came from. Closed set; stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Web,
    Audio,
    Pdf,
    Epub,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Web => "web",
            SourceKind::Audio => "audio",
            SourceKind::Pdf => "pdf",
            SourceKind::Epub => "epub",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(SourceKind::Web),
            "audio" => Ok(SourceKind::Audio),
            "pdf" => Ok(SourceKind::Pdf),
            "epub" => Ok(SourceKind::Epub),
            other => anyhow::bail!("unknown source kind: {}", other),
        }
    }
}

/// A source document before it has been written to the store.
///
/// Connectors produce these; [`crate::ingest::upsert_document`] deduplicates
/// them by content hash and assigns the stored identity.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub source_kind: SourceKind,
    pub title: String,
    pub author: Option<String>,
    pub source_url: Option<String>,
    pub source_path: Option<String>,
    pub published_at: Option<i64>,
    pub body: String,
}

/// Stored document row.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct Document {
    pub id: String,
    pub source_kind: SourceKind,
    pub title: String,
    pub author: Option<String>,
    pub source_url: Option<String>,
    pub source_path: Option<String>,
    pub published_at: Option<i64>,
    pub content_hash: String,
    pub created_at: i64,
    pub body: String,
}

/// A chunk of a document's body text.
///
/// The embedding vector travels separately (as `Vec<f32>`) until write time;
/// it is stored alongside the row as a little-endian f32 BLOB.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub section: Option<String>,
    pub token_count: i64,
}

/// A retrieval hit: chunk content joined with parent-document metadata.
///
/// `score` is `1 − cosine_distance` over unit-normalized vectors, so 1.0 is
/// most similar.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub content: String,
    pub title: String,
    pub source_kind: SourceKind,
    pub source_url: Option<String>,
    pub score: f64,
}
