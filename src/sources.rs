use anyhow::Result;

use crate::config::Config;

/// List the configured ingestion sources and whether each looks usable.
pub fn list_sources(config: &Config) -> Result<()> {
    println!("{:<12} {:<40} READY", "SOURCE", "LOCATION");

    match &config.scrape {
        Some(scrape) => {
            println!("{:<12} {:<40} {}", "web", scrape.base_url, true);
        }
        None => {
            println!("{:<12} {:<40} {}", "web", "(not configured)", false);
        }
    }

    let transcripts = &config.ingest.transcripts_dir;
    println!(
        "{:<12} {:<40} {}",
        "audio",
        transcripts.display().to_string(),
        transcripts.is_dir()
    );

    let pdfs = &config.ingest.pdf_dir;
    println!(
        "{:<12} {:<40} {}",
        "pdf",
        pdfs.display().to_string(),
        pdfs.is_dir()
    );

    let epubs = &config.ingest.epub_dir;
    println!(
        "{:<12} {:<40} {}",
        "epub",
        epubs.display().to_string(),
        epubs.is_dir()
    );

    Ok(())
}
