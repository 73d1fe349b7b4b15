//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]** — returns errors; used when embeddings are not
//!   configured.
//! - **`LocalProvider`** — fastembed ONNX models loaded once per process and
//!   reused for every call (feature `local-embeddings`).
//! - **[`OpenAiProvider`]** — calls the OpenAI embeddings API with batching,
//!   retry, and backoff.
//!
//! Every provider declares its model name and dimensionality up front; the
//! indexer pins both in `corpus_meta` and rejects any later disagreement,
//! because an index and a retriever in different embedding spaces return
//! meaningless results without any error.
//!
//! Also provides vector utilities for the store and the retriever:
//! [`normalize`], [`vec_to_blob`] / [`blob_to_vec`], [`cosine_similarity`],
//! and [`l2_distance`]. Vectors are unit-normalized before storage and before
//! querying, which makes Euclidean ordering and cosine ordering agree.
//!
//! # Retry Strategy (OpenAI)
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Trait for embedding backends.
///
/// Handed to the indexer and the retriever as an explicit
/// `Arc<dyn EmbeddingProvider>` so tests can substitute a stub of fixed
/// dimensionality.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"sentence-transformers/all-MiniLM-L6-v2"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    ///
    /// Vectors are expected to carry exactly [`dims`](Self::dims) components;
    /// the indexer verifies this and treats a mismatch as a fatal
    /// configuration error rather than a per-item failure.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let results = provider.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// | Config value | Provider |
/// |--------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"local"` | `LocalProvider` (requires the `local-embeddings` feature) |
/// | `"openai"` | [`OpenAiProvider`] |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAiProvider::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(local::LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!(
            "Embedding provider 'local' requires the local-embeddings feature; \
             rebuild with it or configure the openai provider"
        ),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.")
    }
}

// ============ Local Provider (fastembed) ============

#[cfg(feature = "local-embeddings")]
mod local {
    use super::*;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::collections::HashMap;
    use std::sync::{Mutex, OnceLock};

    /// Process-wide cache of loaded models. Loading an ONNX model takes
    /// seconds and tens of megabytes; every handle for the same model name
    /// shares one instance.
    static MODEL_CACHE: OnceLock<Mutex<HashMap<String, Arc<Mutex<TextEmbedding>>>>> =
        OnceLock::new();

    fn model_cache() -> &'static Mutex<HashMap<String, Arc<Mutex<TextEmbedding>>>> {
        MODEL_CACHE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    /// Map a configured model name onto a fastembed model and its
    /// dimensionality.
    fn resolve_model(name: &str) -> Result<(EmbeddingModel, usize)> {
        match name {
            "sentence-transformers/all-MiniLM-L6-v2" | "all-MiniLM-L6-v2" => {
                Ok((EmbeddingModel::AllMiniLML6V2, 384))
            }
            "BAAI/bge-small-en-v1.5" | "bge-small-en-v1.5" => {
                Ok((EmbeddingModel::BGESmallENV15, 384))
            }
            other => bail!(
                "Unsupported local embedding model: '{}'. \
                 Supported: sentence-transformers/all-MiniLM-L6-v2, BAAI/bge-small-en-v1.5",
                other
            ),
        }
    }

    /// Embedding provider backed by a lazily-initialized local fastembed
    /// model.
    ///
    /// The model is not loaded at construction time; the first
    /// [`embed`](EmbeddingProvider::embed) call initializes it and subsequent
    /// calls (from any handle) reuse the cached instance.
    pub struct LocalProvider {
        model_name: String,
        fastembed_model: EmbeddingModel,
        dims: usize,
    }

    impl LocalProvider {
        pub fn new(config: &EmbeddingConfig) -> Result<Self> {
            let model_name = config
                .model
                .clone()
                .unwrap_or_else(|| "sentence-transformers/all-MiniLM-L6-v2".to_string());
            let (fastembed_model, native_dims) = resolve_model(&model_name)?;
            let dims = config.dims.unwrap_or(native_dims);
            if dims != native_dims {
                bail!(
                    "embedding.dims = {} but model '{}' produces {}-dimensional vectors",
                    dims,
                    model_name,
                    native_dims
                );
            }
            Ok(Self {
                model_name,
                fastembed_model,
                dims,
            })
        }

        fn load_or_get(&self) -> Result<Arc<Mutex<TextEmbedding>>> {
            let mut cache = model_cache()
                .lock()
                .map_err(|_| anyhow::anyhow!("embedding model cache poisoned"))?;
            if let Some(model) = cache.get(&self.model_name) {
                return Ok(model.clone());
            }
            tracing::info!(model = %self.model_name, "loading local embedding model");
            let model =
                TextEmbedding::try_new(InitOptions::new(self.fastembed_model.clone()))?;
            let model = Arc::new(Mutex::new(model));
            cache.insert(self.model_name.clone(), model.clone());
            Ok(model)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LocalProvider {
        fn model_name(&self) -> &str {
            &self.model_name
        }

        fn dims(&self) -> usize {
            self.dims
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let model = self.load_or_get()?;
            let texts: Vec<String> = texts.to_vec();

            // ONNX inference is CPU-bound; keep it off the async runtime.
            let vectors = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut model = model
                    .lock()
                    .map_err(|_| anyhow::anyhow!("embedding model lock poisoned"))?;
                let out = model.embed(texts, None)?;
                Ok(out)
            })
            .await??;
            Ok(vectors)
        }
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST /v1/embeddings` with the configured model. Requires the
/// `OPENAI_API_KEY` environment variable.
pub struct OpenAiProvider {
    model: String,
    dims: usize,
    max_retries: u32,
    timeout_secs: u64,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `model` or `dims` is not set in config, or if
    /// `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        Ok(Self {
            model,
            dims,
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_openai_response(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

/// Parse the OpenAI embeddings API response JSON, returning vectors in input
/// order.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push(vec);
    }

    Ok(embeddings)
}

// ============ Vector utilities ============

/// Scale a vector to unit length in place. Zero vectors are left untouched.
///
/// Applied to every vector before storage and to every query vector before
/// search, so Euclidean ordering and cosine ordering agree over the stored
/// set.
pub fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors of
/// different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Euclidean distance between two vectors. Used as the nearest-neighbor
/// ordering metric; over unit-normalized vectors it ranks identically to
/// cosine distance.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
