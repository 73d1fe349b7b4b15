//! Grounded chat responses over the retrieval pipeline.
//!
//! Retrieves the top-k chunks for a question, formats them into a context
//! block, and forwards context + question to the language model under a fixed
//! system instruction. Two degraded modes are deliberate, deterministic
//! response states rather than errors: an empty retrieval answers with a
//! fixed no-context message (`context_used = false`), and a missing API
//! credential answers with the raw top passages (`context_used = true`).

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::config::LlmConfig;
use crate::embedding::EmbeddingProvider;
use crate::llm::{self, AnthropicClient};
use crate::models::SearchHit;
use crate::search;

/// Fixed response when retrieval comes back empty. Never fabricate an answer.
pub const NO_CONTEXT_RESPONSE: &str = "I couldn't find any relevant teachings to answer your \
     question. Please try rephrasing or ask about a different topic.";

/// Fixed system instruction: answer only from supplied context, decline
/// ungrounded claims.
pub const SYSTEM_PROMPT: &str = "You are a study companion for a corpus of contemplative \
teachings.\n\n\
Your role is to:\n\
- Answer questions based ONLY on the provided context passages\n\
- Speak in a clear, compassionate, and direct tone\n\
- If the context doesn't contain enough information, acknowledge this honestly\n\
- Never make up teachings or attribute ideas that aren't in the context\n\
- When appropriate, ask questions that invite deeper inquiry\n\n\
The context provided comes from the corpus's books, talks, and writings.";

const SOURCE_CONTENT_MAX_CHARS: usize = 300;
const FALLBACK_PASSAGE_MAX_CHARS: usize = 200;
const FALLBACK_PASSAGE_COUNT: usize = 3;

pub const DEFAULT_K: usize = 5;

/// Inbound chat request body.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Number of chunks to retrieve.
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    DEFAULT_K
}

/// One retrieved source in the chat response, content capped at 300 chars.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub title: String,
    pub content: String,
    pub score: f64,
    pub source_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// Outbound chat response body.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub sources: Vec<Source>,
    pub context_used: bool,
}

/// Answer a chat request against the indexed corpus.
///
/// `client` is `None` when no LLM credential is configured; retrieval still
/// runs and the response degrades to the raw top passages.
pub async fn answer(
    pool: &SqlitePool,
    provider: &dyn EmbeddingProvider,
    llm_config: &LlmConfig,
    client: Option<&AnthropicClient>,
    request: &ChatRequest,
) -> Result<ChatResponse> {
    let hits = search_chunks_for(pool, provider, request).await?;

    if hits.is_empty() {
        return Ok(ChatResponse {
            response: NO_CONTEXT_RESPONSE.to_string(),
            sources: Vec::new(),
            context_used: false,
        });
    }

    let sources = to_sources(&hits);

    let client = match client {
        Some(c) => c,
        None => {
            return Ok(ChatResponse {
                response: unconfigured_response(&hits),
                sources,
                context_used: true,
            });
        }
    };

    let user_prompt = build_user_prompt(&hits, &request.message);
    let routes = llm::routes_from_models(&llm_config.models);
    let response = llm::complete_with_fallback(&routes, |model| {
        let user_prompt = user_prompt.clone();
        async move { client.complete(&model, SYSTEM_PROMPT, &user_prompt).await }
    })
    .await?;

    Ok(ChatResponse {
        response,
        sources,
        context_used: true,
    })
}

async fn search_chunks_for(
    pool: &SqlitePool,
    provider: &dyn EmbeddingProvider,
    request: &ChatRequest,
) -> Result<Vec<SearchHit>> {
    search::search_chunks(pool, provider, &request.message, request.k).await
}

/// Concatenate retrieved chunks into the grounding context block, each tagged
/// with its source title.
pub fn build_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| format!("[Source: {}]\n{}", display_title(&hit.title), hit.content))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

fn build_user_prompt(hits: &[SearchHit], question: &str) -> String {
    format!(
        "Context from the teachings:\n\n{}\n\n---\n\nQuestion: {}\n\n\
         Please provide a response based on the teachings in the context above. \
         If the context doesn't fully address the question, say so.",
        build_context(hits),
        question
    )
}

/// Deterministic degraded response when no LLM credential is configured.
fn unconfigured_response(hits: &[SearchHit]) -> String {
    let passages = hits
        .iter()
        .take(FALLBACK_PASSAGE_COUNT)
        .map(|hit| format!("• {}", truncate_chars(&hit.content, FALLBACK_PASSAGE_MAX_CHARS)))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Anthropic API key not configured. Here are the most relevant passages I found:\n\n{}",
        passages
    )
}

fn to_sources(hits: &[SearchHit]) -> Vec<Source> {
    hits.iter()
        .map(|hit| Source {
            title: display_title(&hit.title),
            content: truncate_chars(&hit.content, SOURCE_CONTENT_MAX_CHARS),
            score: hit.score,
            source_type: hit.source_kind.as_str().to_string(),
            source_url: hit.source_url.clone(),
        })
        .collect()
}

fn display_title(title: &str) -> String {
    if title.trim().is_empty() {
        "Untitled".to_string()
    } else {
        title.to_string()
    }
}

/// Cap a string at `max_chars` characters, appending an ellipsis when cut.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    fn hit(title: &str, content: &str, score: f64) -> SearchHit {
        SearchHit {
            content: content.to_string(),
            title: title.to_string(),
            source_kind: SourceKind::Web,
            source_url: Some("https://example.org/t/".to_string()),
            score,
        }
    }

    #[test]
    fn test_truncate_chars_boundary() {
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_chars("abcd", 3), "abc...");
        // multi-byte chars count as one
        assert_eq!(truncate_chars("ééé", 3), "ééé");
    }

    #[test]
    fn test_build_context_tags_sources() {
        let hits = vec![hit("Talk One", "First passage.", 0.9), hit("", "Second.", 0.8)];
        let ctx = build_context(&hits);
        assert!(ctx.contains("[Source: Talk One]\nFirst passage."));
        assert!(ctx.contains("[Source: Untitled]\nSecond."));
        assert!(ctx.contains("\n\n---\n\n"));
    }

    #[test]
    fn test_sources_truncated_to_300() {
        let long = "w".repeat(400);
        let sources = to_sources(&[hit("T", &long, 0.5)]);
        assert_eq!(sources[0].content.chars().count(), 303);
        assert!(sources[0].content.ends_with("..."));
        assert_eq!(sources[0].source_type, "web");
    }

    #[test]
    fn test_unconfigured_response_takes_top_three() {
        let hits: Vec<SearchHit> = (0..5)
            .map(|i| hit(&format!("T{}", i), &format!("passage {}", i), 1.0 - i as f64 * 0.1))
            .collect();
        let resp = unconfigured_response(&hits);
        assert!(resp.contains("passage 0"));
        assert!(resp.contains("passage 2"));
        assert!(!resp.contains("passage 3"));
        assert!(resp.starts_with("Anthropic API key not configured."));
    }
}
