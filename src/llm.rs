//! Language-model client with an explicit model-fallback chain.
//!
//! Chat completions go to the Anthropic messages API. Failures are classified
//! into a closed [`FailureClass`] set, and model fallback is driven by an
//! ordered list of [`ModelRoute`] entries: each names a model and the failure
//! classes that permit advancing to the next entry. An overloaded or
//! missing model falls through to the cheaper fallback; any other failure
//! (bad request, auth, rate limit, timeout) surfaces immediately. Exhausting
//! the chain yields one aggregated error naming every attempt.

use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::config::LlmConfig;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Closed classification of chat-completion failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The model is overloaded (HTTP 529 / `overloaded_error`).
    Overloaded,
    /// The model identifier does not exist (HTTP 404 / `not_found_error`).
    NotFound,
    /// HTTP 429 / `rate_limit_error`.
    RateLimited,
    /// The service did not answer within the bounded timeout, or the
    /// connection failed outright.
    Unavailable,
    /// Any other API failure (bad request, auth, server error, parse error).
    Api,
}

impl FailureClass {
    fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Overloaded => "overloaded",
            FailureClass::NotFound => "not found",
            FailureClass::RateLimited => "rate limited",
            FailureClass::Unavailable => "service unavailable",
            FailureClass::Api => "api error",
        }
    }
}

/// A classified chat-completion failure.
#[derive(Debug, Clone)]
pub struct LlmError {
    pub class: FailureClass,
    pub message: String,
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class.as_str(), self.message)
    }
}

impl std::error::Error for LlmError {}

impl LlmError {
    fn new(class: FailureClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }
}

/// One entry of the fallback chain: a model identifier plus the failure
/// classes that permit moving on to the next entry.
#[derive(Debug, Clone)]
pub struct ModelRoute {
    pub model: String,
    pub advance_on: Vec<FailureClass>,
}

/// Build the standard fallback chain from the configured model list: every
/// entry advances on overloaded or not-found, nothing else.
pub fn routes_from_models(models: &[String]) -> Vec<ModelRoute> {
    models
        .iter()
        .map(|m| ModelRoute {
            model: m.clone(),
            advance_on: vec![FailureClass::Overloaded, FailureClass::NotFound],
        })
        .collect()
}

/// Evaluate the fallback chain against a completion callable.
///
/// Tries each route in order. A success returns immediately. A failure whose
/// class is in the route's `advance_on` set moves to the next route; any
/// other failure is returned as-is. If every route is consumed, the result is
/// an aggregated error listing each attempt.
pub async fn complete_with_fallback<F, Fut>(
    routes: &[ModelRoute],
    mut call: F,
) -> Result<String, LlmError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<String, LlmError>>,
{
    let mut attempts: Vec<String> = Vec::new();

    for route in routes {
        match call(route.model.clone()).await {
            Ok(text) => return Ok(text),
            Err(e) => {
                tracing::warn!(model = %route.model, error = %e, "chat completion failed");
                if route.advance_on.contains(&e.class) {
                    attempts.push(format!("{}: {}", route.model, e));
                    continue;
                }
                return Err(e);
            }
        }
    }

    Err(LlmError::new(
        FailureClass::Api,
        format!("all models failed: {}", attempts.join("; ")),
    ))
}

/// Anthropic messages API client with a bounded request timeout.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Serialize)]
struct MessageParam<'a> {
    role: &'static str,
    content: &'a str,
}

impl AnthropicClient {
    /// Build a client from config and the `ANTHROPIC_API_KEY` environment
    /// variable. Returns `None` when the credential is absent — the caller
    /// degrades to the no-LLM response mode instead of erroring.
    pub fn from_env(config: &LlmConfig) -> Option<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").ok()?;
        if api_key.is_empty() {
            return None;
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .ok()?;
        Some(Self {
            http,
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// One completion attempt against one model. No retries here — the
    /// fallback chain owns that decision.
    pub async fn complete(
        &self,
        model: &str,
        system: &str,
        user: &str,
    ) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "system": system,
            "messages": [MessageParam { role: "user", content: user }],
        });

        let resp = self
            .http
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = resp.status();
        let json: serde_json::Value = resp.json().await.map_err(|e| {
            LlmError::new(FailureClass::Api, format!("invalid response body: {}", e))
        })?;

        if !status.is_success() {
            let error_type = json
                .pointer("/error/type")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            let message = json
                .pointer("/error/message")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            return Err(LlmError::new(
                classify_api_error(status.as_u16(), error_type),
                format!("HTTP {}: {}", status, message),
            ));
        }

        json.pointer("/content/0/text")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                LlmError::new(FailureClass::Api, "response contained no text content")
            })
    }
}

fn classify_transport_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() || e.is_connect() {
        LlmError::new(FailureClass::Unavailable, e.to_string())
    } else {
        LlmError::new(FailureClass::Api, e.to_string())
    }
}

fn classify_api_error(status: u16, error_type: &str) -> FailureClass {
    match (status, error_type) {
        (529, _) | (_, "overloaded_error") => FailureClass::Overloaded,
        (404, _) | (_, "not_found_error") => FailureClass::NotFound,
        (429, _) | (_, "rate_limit_error") => FailureClass::RateLimited,
        _ => FailureClass::Api,
    }
}
