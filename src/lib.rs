//! # Satsang
//!
//! A RAG ingestion and retrieval pipeline with a grounded chat server for a
//! teachings corpus.
//!
//! Satsang ingests source material (web pages, audio transcripts, PDFs and
//! EPUBs), splits it into overlapping word-window chunks, embeds the chunks,
//! and serves a chat endpoint that retrieves the top-k relevant chunks and
//! forwards them as grounding context to a language model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌───────────┐
//! │  Connectors  │──▶│   Pipeline    │──▶│  SQLite   │
//! │ web/audio/   │   │ chunk + embed │   │ documents │
//! │ pdf/epub     │   │  (idempotent) │   │  + chunks │
//! └──────────────┘   └───────────────┘   └─────┬─────┘
//!                                              │
//!                            ┌─────────────────┤
//!                            ▼                 ▼
//!                       ┌─────────┐      ┌───────────┐
//!                       │   CLI   │      │ HTTP chat │
//!                       │(satsang)│      │ (axum)    │
//!                       └─────────┘      └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! satsang init                  # create database
//! satsang scrape                # crawl the configured site
//! satsang ingest-books          # ingest PDFs and EPUBs
//! satsang transcribe            # ingest audio transcripts
//! satsang index                 # chunk + embed everything unindexed
//! satsang search "what is awakening?"
//! satsang serve                 # start the chat server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`ingest`] | Content-hash dedup upsert |
//! | [`connector_web`] | Same-host web crawl |
//! | [`connector_audio`] | Transcript ingestion |
//! | [`connector_books`] | PDF/EPUB ingestion |
//! | [`extract`] | HTML/PDF/EPUB text extraction |
//! | [`chunk`] | Overlapping word-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Idempotent chunk+embed pipeline |
//! | [`search`] | Nearest-neighbor retrieval |
//! | [`llm`] | Anthropic client + model-fallback chain |
//! | [`responder`] | Grounded chat responses |
//! | [`server`] | Chat HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod connector_audio;
pub mod connector_books;
pub mod connector_web;
pub mod db;
pub mod embedding;
pub mod envcmd;
pub mod extract;
pub mod get;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod responder;
pub mod search;
pub mod server;
pub mod sources;
pub mod stats;
