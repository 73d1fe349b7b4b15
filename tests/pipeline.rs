//! In-process pipeline tests: ingest → index → search → respond against a
//! temporary SQLite store, with a deterministic stub embedder standing in
//! for the real provider.

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use satsang::config::{Config, DbConfig};
use satsang::embedding::EmbeddingProvider;
use satsang::index;
use satsang::ingest::{self, IngestOutcome};
use satsang::models::{NewDocument, SourceKind};
use satsang::responder::{self, ChatRequest, NO_CONTEXT_RESPONSE};
use satsang::{db, migrate, search};

const MIN_DOC_CHARS: usize = 10;

/// Deterministic bag-of-words embedder: each word hashes into one of `dims`
/// buckets. Overlapping vocabulary means high cosine similarity, and the same
/// text always embeds identically.
struct StubEmbedder {
    dims: usize,
    name: String,
}

impl StubEmbedder {
    fn new(dims: usize) -> Self {
        Self {
            dims,
            name: format!("stub-{}", dims),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dims];
        for word in text.split_whitespace() {
            vec[fnv1a(word) as usize % self.dims] += 1.0;
        }
        vec
    }
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Embedder that lies about its dimensionality relative to what it returns.
struct MismatchedEmbedder;

#[async_trait]
impl EmbeddingProvider for MismatchedEmbedder {
    fn model_name(&self) -> &str {
        "mismatched"
    }
    fn dims(&self) -> usize {
        8
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0f32; 16]).collect())
    }
}

fn test_config(tmp: &TempDir) -> Config {
    Config {
        db: DbConfig {
            path: tmp.path().join("satsang.sqlite"),
        },
        ingest: Default::default(),
        scrape: None,
        chunking: Default::default(),
        embedding: Default::default(),
        llm: Default::default(),
        server: Default::default(),
    }
}

async fn setup_store() -> (TempDir, sqlx::SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let pool = db::connect(&config).await.unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    (tmp, pool)
}

fn doc(title: &str, body: &str) -> NewDocument {
    NewDocument {
        source_kind: SourceKind::Web,
        title: title.to_string(),
        author: None,
        source_url: Some(format!("https://example.org/{}/", title)),
        source_path: None,
        published_at: None,
        body: body.to_string(),
    }
}

/// The 31-word awareness text: "Awareness is prior to thought." repeated with
/// a closing word, long enough to clear the floor.
fn awareness_text() -> String {
    let mut words = Vec::new();
    for _ in 0..6 {
        words.extend_from_slice(&["Awareness", "is", "prior", "to", "thought."]);
    }
    words.push("Rest.");
    words.join(" ")
}

fn chunking(target: usize, overlap: usize) -> satsang::config::ChunkingConfig {
    satsang::config::ChunkingConfig {
        target_words: target,
        overlap_words: overlap,
    }
}

async fn chunk_rows(pool: &sqlx::SqlitePool) -> Vec<(String, String, i64, String)> {
    sqlx::query_as::<_, (String, String, i64, String)>(
        "SELECT id, document_id, chunk_index, content FROM chunks ORDER BY document_id, chunk_index",
    )
    .fetch_all(pool)
    .await
    .unwrap()
}

// ============ Deduplication ============

#[tokio::test]
async fn ingesting_identical_text_twice_yields_one_document() {
    let (_tmp, pool) = setup_store().await;
    let body = awareness_text();

    let first = ingest::upsert_document(&pool, &doc("one", &body), MIN_DOC_CHARS)
        .await
        .unwrap();
    let id = match first {
        IngestOutcome::Created(id) => id,
        other => panic!("expected Created, got {:?}", other),
    };

    // Same text from a different path still resolves to the same document
    let mut from_elsewhere = doc("two", &body);
    from_elsewhere.source_kind = SourceKind::Pdf;
    from_elsewhere.source_url = None;
    from_elsewhere.source_path = Some("data/raw/pdfs/other.pdf".to_string());
    let second = ingest::upsert_document(&pool, &from_elsewhere, MIN_DOC_CHARS)
        .await
        .unwrap();
    assert_eq!(second, IngestOutcome::Duplicate(id));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn short_documents_are_never_stored() {
    let (_tmp, pool) = setup_store().await;

    let outcome = ingest::upsert_document(&pool, &doc("tiny", "too short"), 400)
        .await
        .unwrap();
    assert_eq!(outcome, IngestOutcome::TooShort);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

// ============ Indexing ============

#[tokio::test]
async fn indexing_twice_writes_identical_rows_once() {
    let (_tmp, pool) = setup_store().await;
    let embedder = StubEmbedder::new(16);

    ingest::upsert_document(&pool, &doc("awareness", &awareness_text()), MIN_DOC_CHARS)
        .await
        .unwrap();

    // target 10 / overlap 2 => step 8: 31 words make windows at 0, 8, 16, 24
    let summary = index::index_documents(&pool, &embedder, &chunking(10, 2), MIN_DOC_CHARS, false)
        .await
        .unwrap();
    assert_eq!(summary.indexed, 1);
    assert_eq!(summary.chunks_written, 4);

    let rows_first = chunk_rows(&pool).await;
    assert_eq!(rows_first.len(), 4);
    for (i, row) in rows_first.iter().enumerate() {
        assert_eq!(row.2, i as i64, "chunk indices must be contiguous from 0");
    }

    // Second run: the document already owns chunks, so nothing is written
    let summary = index::index_documents(&pool, &embedder, &chunking(10, 2), MIN_DOC_CHARS, false)
        .await
        .unwrap();
    assert_eq!(summary.indexed, 0);
    assert_eq!(summary.skipped_already_indexed, 1);

    let rows_second = chunk_rows(&pool).await;
    assert_eq!(rows_first, rows_second, "re-run must not change chunk rows");
}

#[tokio::test]
async fn stored_chunks_preserve_window_overlap() {
    let (_tmp, pool) = setup_store().await;
    let embedder = StubEmbedder::new(16);

    ingest::upsert_document(&pool, &doc("awareness", &awareness_text()), MIN_DOC_CHARS)
        .await
        .unwrap();
    index::index_documents(&pool, &embedder, &chunking(10, 2), MIN_DOC_CHARS, false)
        .await
        .unwrap();

    let rows = chunk_rows(&pool).await;
    for pair in rows.windows(2) {
        let prev: Vec<&str> = pair[0].3.split_whitespace().collect();
        let next: Vec<&str> = pair[1].3.split_whitespace().collect();
        if prev.len() == 10 {
            assert_eq!(&prev[prev.len() - 2..], &next[..2]);
        }
    }
}

#[tokio::test]
async fn forced_reindex_overwrites_in_place() {
    let (_tmp, pool) = setup_store().await;
    let embedder = StubEmbedder::new(16);

    ingest::upsert_document(&pool, &doc("awareness", &awareness_text()), MIN_DOC_CHARS)
        .await
        .unwrap();
    index::index_documents(&pool, &embedder, &chunking(10, 2), MIN_DOC_CHARS, false)
        .await
        .unwrap();
    let rows_first = chunk_rows(&pool).await;

    let summary = index::index_documents(&pool, &embedder, &chunking(10, 2), MIN_DOC_CHARS, true)
        .await
        .unwrap();
    assert_eq!(summary.indexed, 1);

    let rows_second = chunk_rows(&pool).await;
    assert_eq!(rows_first.len(), rows_second.len());
    // Conflict path keeps the existing row identity
    for (a, b) in rows_first.iter().zip(rows_second.iter()) {
        assert_eq!(a.0, b.0, "chunk ids must survive a forced re-embed");
        assert_eq!(a.3, b.3);
    }
}

#[tokio::test]
async fn too_short_documents_are_skipped_silently() {
    let (_tmp, pool) = setup_store().await;
    let embedder = StubEmbedder::new(16);

    ingest::upsert_document(&pool, &doc("short", "brief but stored"), MIN_DOC_CHARS)
        .await
        .unwrap();

    // Raise the floor between ingest and index: the document now reads as
    // too short and must be skipped without an error.
    let summary = index::index_documents(&pool, &embedder, &chunking(10, 2), 400, false)
        .await
        .unwrap();
    assert_eq!(summary.skipped_short_or_missing, 1);
    assert_eq!(summary.failed, 0);

    let rows = chunk_rows(&pool).await;
    assert!(rows.is_empty());
}

#[tokio::test]
async fn dimension_mismatch_aborts_the_run() {
    let (_tmp, pool) = setup_store().await;

    ingest::upsert_document(&pool, &doc("awareness", &awareness_text()), MIN_DOC_CHARS)
        .await
        .unwrap();

    let err = index::index_documents(&pool, &MismatchedEmbedder, &chunking(10, 2), MIN_DOC_CHARS, false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("dimension mismatch"));

    // Nothing may be stored from an aborted run
    assert!(chunk_rows(&pool).await.is_empty());
}

#[tokio::test]
async fn changing_dimensionality_after_indexing_is_fatal() {
    let (_tmp, pool) = setup_store().await;

    ingest::upsert_document(&pool, &doc("awareness", &awareness_text()), MIN_DOC_CHARS)
        .await
        .unwrap();
    index::index_documents(&pool, &StubEmbedder::new(16), &chunking(10, 2), MIN_DOC_CHARS, false)
        .await
        .unwrap();

    let err = index::index_documents(
        &pool,
        &StubEmbedder::new(32),
        &chunking(10, 2),
        MIN_DOC_CHARS,
        false,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("clear the chunks table"));
}

#[tokio::test]
async fn per_document_embed_failure_does_not_abort_the_run() {
    struct FlakyEmbedder {
        inner: StubEmbedder,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyEmbedder {
        fn model_name(&self) -> &str {
            self.inner.model_name()
        }
        fn dims(&self) -> usize {
            self.inner.dims()
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains("poison")) {
                anyhow::bail!("embedding backend refused the batch");
            }
            self.inner.embed(texts).await
        }
    }

    let (_tmp, pool) = setup_store().await;
    let embedder = FlakyEmbedder {
        inner: StubEmbedder::new(16),
    };

    ingest::upsert_document(
        &pool,
        &doc("bad", "poison poison poison poison poison poison poison"),
        MIN_DOC_CHARS,
    )
    .await
    .unwrap();
    ingest::upsert_document(&pool, &doc("good", &awareness_text()), MIN_DOC_CHARS)
        .await
        .unwrap();

    let summary = index::index_documents(&pool, &embedder, &chunking(10, 2), MIN_DOC_CHARS, false)
        .await
        .unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.indexed, 1);
}

// ============ Retrieval ============

async fn seed_corpus(pool: &sqlx::SqlitePool, embedder: &StubEmbedder) {
    let docs = [
        ("Awakening Talk", "awakening is the recognition of what you already are beyond the mind"),
        ("Stillness Essay", "stillness and silence reveal the ground beneath all experience"),
        ("Practice Notes", "practice posture breathing attention returning again and again daily"),
    ];
    for (title, body) in docs {
        ingest::upsert_document(pool, &doc(title, body), MIN_DOC_CHARS)
            .await
            .unwrap();
    }
    index::index_documents(pool, embedder, &chunking(10, 2), MIN_DOC_CHARS, false)
        .await
        .unwrap();
}

#[tokio::test]
async fn search_returns_exactly_k_sorted_descending() {
    let (_tmp, pool) = setup_store().await;
    let embedder = StubEmbedder::new(64);
    seed_corpus(&pool, &embedder).await;

    let hits = search::search_chunks(&pool, &embedder, "awakening beyond the mind", 2)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits[0].score >= hits[1].score);
    assert_eq!(hits[0].title, "Awakening Talk");
    assert!(hits[0].source_url.is_some());
}

#[tokio::test]
async fn search_with_k_beyond_corpus_returns_corpus_size() {
    let (_tmp, pool) = setup_store().await;
    let embedder = StubEmbedder::new(64);
    seed_corpus(&pool, &embedder).await;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await
        .unwrap();
    let hits = search::search_chunks(&pool, &embedder, "stillness", 100)
        .await
        .unwrap();
    assert_eq!(hits.len(), total as usize);
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score, "scores must be non-increasing");
    }
}

#[tokio::test]
async fn search_on_empty_corpus_returns_empty_not_error() {
    let (_tmp, pool) = setup_store().await;
    let embedder = StubEmbedder::new(64);

    let hits = search::search_chunks(&pool, &embedder, "anything at all", 5)
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn search_is_deterministic() {
    let (_tmp, pool) = setup_store().await;
    let embedder = StubEmbedder::new(64);
    seed_corpus(&pool, &embedder).await;

    let a = search::search_chunks(&pool, &embedder, "silence", 3).await.unwrap();
    let b = search::search_chunks(&pool, &embedder, "silence", 3).await.unwrap();
    let titles_a: Vec<_> = a.iter().map(|h| h.title.clone()).collect();
    let titles_b: Vec<_> = b.iter().map(|h| h.title.clone()).collect();
    assert_eq!(titles_a, titles_b);
}

// ============ Responder ============

#[tokio::test]
async fn chat_on_empty_corpus_uses_no_context_state() {
    let (_tmp, pool) = setup_store().await;
    let embedder = StubEmbedder::new(64);
    let llm = satsang::config::LlmConfig::default();

    let request = ChatRequest {
        message: "What is awakening?".to_string(),
        k: 3,
    };
    let response = responder::answer(&pool, &embedder, &llm, None, &request)
        .await
        .unwrap();

    assert_eq!(response.response, NO_CONTEXT_RESPONSE);
    assert!(response.sources.is_empty());
    assert!(!response.context_used);
}

#[tokio::test]
async fn chat_without_credential_degrades_to_passages() {
    let (_tmp, pool) = setup_store().await;
    let embedder = StubEmbedder::new(64);
    let llm = satsang::config::LlmConfig::default();

    // Corpus with a single matching chunk
    ingest::upsert_document(
        &pool,
        &doc("Awakening Talk", "awakening is the recognition of what you already are"),
        MIN_DOC_CHARS,
    )
    .await
    .unwrap();
    index::index_documents(&pool, &embedder, &chunking(10, 2), MIN_DOC_CHARS, false)
        .await
        .unwrap();

    let request = ChatRequest {
        message: "What is awakening?".to_string(),
        k: 3,
    };
    let response = responder::answer(&pool, &embedder, &llm, None, &request)
        .await
        .unwrap();

    assert_eq!(response.sources.len(), 1);
    assert!(response.context_used);
    assert!(response.response.contains("API key not configured"));
    assert!(response.response.contains("awakening"));
    assert_eq!(response.sources[0].source_type, "web");
}

#[tokio::test]
async fn chat_request_k_defaults_to_five() {
    let request: ChatRequest = serde_json::from_str(r#"{"message": "hello"}"#).unwrap();
    assert_eq!(request.k, 5);
    let request: ChatRequest = serde_json::from_str(r#"{"message": "hello", "k": 2}"#).unwrap();
    assert_eq!(request.k, 2);
}
