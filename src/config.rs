use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub scrape: Option<ScrapeConfig>,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Documents with fewer extracted characters than this are discarded,
    /// never stored.
    #[serde(default = "default_min_doc_chars")]
    pub min_doc_chars: usize,
    /// Author attributed to every ingested document, if any.
    #[serde(default)]
    pub author: Option<String>,
    /// Directory of `*.txt` transcripts produced by the external
    /// transcription tool.
    #[serde(default = "default_transcripts_dir")]
    pub transcripts_dir: PathBuf,
    #[serde(default = "default_pdf_dir")]
    pub pdf_dir: PathBuf,
    #[serde(default = "default_epub_dir")]
    pub epub_dir: PathBuf,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_doc_chars: default_min_doc_chars(),
            author: None,
            transcripts_dir: default_transcripts_dir(),
            pdf_dir: default_pdf_dir(),
            epub_dir: default_epub_dir(),
        }
    }
}

fn default_min_doc_chars() -> usize {
    400
}
fn default_transcripts_dir() -> PathBuf {
    PathBuf::from("data/transcripts")
}
fn default_pdf_dir() -> PathBuf {
    PathBuf::from("data/raw/pdfs")
}
fn default_epub_dir() -> PathBuf {
    PathBuf::from("data/raw/epubs")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScrapeConfig {
    /// Crawl root; only URLs on this host are followed.
    pub base_url: String,
    /// Seed paths or absolute URLs to start from.
    pub seeds: Vec<String>,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Delay between page fetches.
    #[serde(default = "default_fetch_delay_ms")]
    pub fetch_delay_ms: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_max_pages() -> usize {
    500
}
fn default_fetch_delay_ms() -> u64 {
    500
}
fn default_fetch_timeout_secs() -> u64 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_words")]
    pub target_words: usize,
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_words: default_target_words(),
            overlap_words: default_overlap_words(),
        }
    }
}

fn default_target_words() -> usize {
    350
}
fn default_overlap_words() -> usize {
    40
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `local` (fastembed), `openai`, or `disabled`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Ordered model fallback chain: the first entry is attempted first, the
    /// rest only on an overloaded or not-found failure.
    #[serde(default = "default_models")]
    pub models: Vec<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            models: default_models(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_models() -> Vec<String> {
    vec![
        "claude-sonnet-4-20250514".to_string(),
        "claude-3-haiku-20240307".to_string(),
    ]
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f64 {
    0.7
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.target_words == 0 {
        anyhow::bail!("chunking.target_words must be > 0");
    }
    if config.chunking.overlap_words >= config.chunking.target_words {
        anyhow::bail!("chunking.overlap_words must be < chunking.target_words");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or local.",
            other
        ),
    }
    if config.embedding.provider == "openai" {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!("embedding.dims must be > 0 when provider is 'openai'");
        }
        if config.embedding.model.is_none() {
            anyhow::bail!("embedding.model must be specified when provider is 'openai'");
        }
    }

    // Validate llm
    if config.llm.models.is_empty() {
        anyhow::bail!("llm.models must list at least one model identifier");
    }

    // Validate scrape
    if let Some(ref scrape) = config.scrape {
        if scrape.seeds.is_empty() {
            anyhow::bail!("scrape.seeds must list at least one seed URL");
        }
    }

    Ok(config)
}
