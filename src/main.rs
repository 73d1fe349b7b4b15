//! # Satsang CLI
//!
//! The `satsang` binary drives every pipeline stage. Each subcommand is a
//! pass-through invocation of one stage; the interesting invariants live in
//! the library crate.
//!
//! ## Usage
//!
//! ```bash
//! satsang --config ./config/satsang.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `satsang init` | Create the SQLite database and run schema migrations |
//! | `satsang sources` | List ingestion sources and their status |
//! | `satsang scrape` | Crawl the configured site into the document store |
//! | `satsang transcribe` | Ingest audio transcripts from the external transcriber |
//! | `satsang ingest-books` | Ingest PDFs and EPUBs |
//! | `satsang index` | Chunk + embed every unindexed document |
//! | `satsang search "<query>"` | Nearest-neighbor search over the chunk store |
//! | `satsang get <id>` | Print a full document and its chunks |
//! | `satsang stats` | Corpus statistics |
//! | `satsang serve` | Start the chat HTTP server |
//! | `satsang env up\|down` | Bring supporting services up or down |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use satsang::{
    config, connector_audio, connector_books, connector_web, envcmd, get, index, migrate, search,
    server, sources, stats,
};

/// Satsang — a RAG ingestion and retrieval pipeline with a grounded chat
/// server for a teachings corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/satsang.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "satsang",
    about = "Satsang — RAG ingestion, retrieval, and grounded chat for a teachings corpus",
    version,
    long_about = "Satsang ingests source documents (web pages, audio transcripts, PDFs, EPUBs), \
    splits them into overlapping word-window chunks, embeds the chunks, and serves a chat \
    endpoint that grounds a language model in the top-k retrieved passages."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/satsang.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Idempotent —
    /// running it multiple times is safe.
    Init,

    /// List ingestion sources and their status.
    Sources,

    /// Crawl the configured site and ingest extracted page text.
    ///
    /// Follows same-host links breadth-first from the configured seeds, up to
    /// `scrape.max_pages`. Re-crawling unchanged pages writes nothing.
    Scrape,

    /// Ingest audio transcripts.
    ///
    /// Picks up `*.txt` transcripts left in `ingest.transcripts_dir` by the
    /// external transcription tool.
    Transcribe,

    /// Ingest PDFs and EPUBs from the configured directories.
    IngestBooks,

    /// Chunk and embed every document that has no chunks yet.
    ///
    /// Idempotent: documents that already own chunks are skipped. With
    /// `--force`, existing chunk rows are re-embedded and overwritten in
    /// place.
    Index {
        /// Re-embed documents that are already indexed.
        #[arg(long)]
        force: bool,
    },

    /// Search the chunk store.
    ///
    /// Embeds the query and returns the top-k chunks by cosine similarity,
    /// joined with their parent documents.
    Search {
        /// The search query string.
        query: String,

        /// Number of results to return.
        #[arg(long, default_value_t = 5)]
        k: usize,
    },

    /// Print a document and its chunks by UUID.
    Get {
        /// Document UUID.
        id: String,
    },

    /// Corpus statistics: document/chunk counts and the embedding space.
    Stats,

    /// Start the chat HTTP server.
    Serve,

    /// Bring supporting services up or down (docker compose passthrough).
    Env {
        #[command(subcommand)]
        action: EnvAction,
    },
}

#[derive(Subcommand)]
enum EnvAction {
    /// `docker compose up -d`
    Up,
    /// `docker compose down`
    Down,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("satsang=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Env passthrough needs no config
    if let Commands::Env { action } = &cli.command {
        return envcmd::run_env(matches!(action, EnvAction::Up));
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Scrape => {
            connector_web::run_scrape(&cfg).await?;
        }
        Commands::Transcribe => {
            connector_audio::run_transcribe(&cfg).await?;
        }
        Commands::IngestBooks => {
            connector_books::run_ingest_books(&cfg).await?;
        }
        Commands::Index { force } => {
            index::run_index(&cfg, force).await?;
        }
        Commands::Search { query, k } => {
            search::run_search(&cfg, &query, k).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Env { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
