//! Web connector: same-host crawl from seed URLs.
//!
//! Breadth-first over anchor links, bounded by `max_pages`, with a polite
//! delay between fetches. Each page is stripped to visible text and funneled
//! through the content-hash upsert, so re-crawling an unchanged site writes
//! nothing. Per-URL failures are logged and skipped; they never stop the
//! crawl.

use anyhow::{Context, Result};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use crate::config::Config;
use crate::db;
use crate::extract;
use crate::ingest::{self, IngestStats};
use crate::models::{NewDocument, SourceKind};

pub async fn run_scrape(config: &Config) -> Result<()> {
    let scrape = config
        .scrape
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("[scrape] section not configured"))?;

    let base = reqwest::Url::parse(&scrape.base_url)
        .with_context(|| format!("invalid scrape.base_url: {}", scrape.base_url))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(scrape.fetch_timeout_secs))
        .user_agent(concat!("satsang/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let pool = db::connect(config).await?;

    let mut frontier: VecDeque<reqwest::Url> = VecDeque::new();
    for seed in &scrape.seeds {
        let url = base
            .join(seed)
            .with_context(|| format!("invalid scrape seed: {}", seed))?;
        frontier.push_back(url);
    }

    let mut visited: HashSet<String> = HashSet::new();
    let mut stats = IngestStats::default();

    while let Some(mut url) = frontier.pop_front() {
        if visited.len() >= scrape.max_pages {
            tracing::info!(max_pages = scrape.max_pages, "crawl page limit reached");
            break;
        }
        url.set_fragment(None);
        if !visited.insert(url.to_string()) {
            continue;
        }

        let html = match fetch_page(&client, &url).await {
            Ok(Some(html)) => html,
            Ok(None) => continue, // non-HTML resource
            Err(e) => {
                tracing::warn!(url = %url, error = %format!("{:#}", e), "fetch failed, skipping");
                stats.failed += 1;
                continue;
            }
        };

        let page = extract::parse_html(&html);
        stats.scanned += 1;

        let doc = NewDocument {
            source_kind: SourceKind::Web,
            title: title_from_url(&url),
            author: config.ingest.author.clone(),
            source_url: Some(url.to_string()),
            source_path: None,
            published_at: None,
            body: page.text,
        };
        match ingest::upsert_document(&pool, &doc, config.ingest.min_doc_chars).await {
            Ok(outcome) => stats.record(&outcome),
            Err(e) => return Err(e),
        }

        for href in &page.links {
            if let Some(link) = resolve_link(&base, &url, href) {
                if !visited.contains(link.as_str()) {
                    frontier.push_back(link);
                }
            }
        }

        tokio::time::sleep(Duration::from_millis(scrape.fetch_delay_ms)).await;
    }

    stats.print_summary("scrape");
    pool.close().await;
    Ok(())
}

/// Fetch one page. Returns `None` for non-HTML responses.
async fn fetch_page(client: &reqwest::Client, url: &reqwest::Url) -> Result<Option<Vec<u8>>> {
    let resp = client.get(url.clone()).send().await?.error_for_status()?;

    let is_html = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("text/html") || ct.contains("application/xhtml"))
        .unwrap_or(true);
    if !is_html {
        return Ok(None);
    }

    Ok(Some(resp.bytes().await?.to_vec()))
}

/// Resolve an href against the page it appeared on; only same-host http(s)
/// links are followed.
fn resolve_link(
    base: &reqwest::Url,
    page: &reqwest::Url,
    href: &str,
) -> Option<reqwest::Url> {
    let trimmed = href.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("mailto:") {
        return None;
    }
    let mut url = page.join(trimmed).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    if url.host_str() != base.host_str() {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// Derive a display title from the last path segment:
/// `/teachings-articles/being-still/` → "Being Still".
fn title_from_url(url: &reqwest::Url) -> String {
    let segment = url
        .path_segments()
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .last()
        .unwrap_or_default()
        .to_string();

    if segment.is_empty() {
        return url.host_str().unwrap_or("Untitled").to_string();
    }

    segment
        .replace(['-', '_'], " ")
        .split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> reqwest::Url {
        reqwest::Url::parse(s).unwrap()
    }

    #[test]
    fn test_title_from_url_segments() {
        assert_eq!(
            title_from_url(&url("https://example.org/teachings/being-still/")),
            "Being Still"
        );
        assert_eq!(
            title_from_url(&url("https://example.org/silent_retreat")),
            "Silent Retreat"
        );
        assert_eq!(title_from_url(&url("https://example.org/")), "example.org");
    }

    #[test]
    fn test_resolve_link_same_host_only() {
        let base = url("https://example.org/");
        let page = url("https://example.org/a/");
        assert_eq!(
            resolve_link(&base, &page, "b/").unwrap().as_str(),
            "https://example.org/a/b/"
        );
        assert_eq!(
            resolve_link(&base, &page, "/c").unwrap().as_str(),
            "https://example.org/c"
        );
        assert!(resolve_link(&base, &page, "https://other.org/x").is_none());
        assert!(resolve_link(&base, &page, "#top").is_none());
        assert!(resolve_link(&base, &page, "mailto:x@example.org").is_none());
    }

    #[test]
    fn test_resolve_link_strips_fragment() {
        let base = url("https://example.org/");
        let page = url("https://example.org/a/");
        let link = resolve_link(&base, &page, "/page#section").unwrap();
        assert_eq!(link.as_str(), "https://example.org/page");
    }
}
