//! Chat HTTP server.
//!
//! Exposes the RAG responder over a small JSON API:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/chat` | Answer a question grounded in retrieved chunks |
//! | `GET`  | `/api/health` | Configuration flags (no connectivity probe) |
//!
//! Request-time failures are converted into a structured error body
//! (`{ "error": { "code": ..., "message": ... } }`) at this boundary; the
//! process stays up for subsequent requests. All origins are permitted so a
//! static chat frontend can call the API directly.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::llm::AnthropicClient;
use crate::responder::{self, ChatRequest, ChatResponse};

/// Shared application state passed to all route handlers.
///
/// The embedding provider lives here for the whole process: it is created
/// once at startup and lazily loads its model on first use, so no request
/// pays the initialization cost twice.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
    provider: Arc<dyn EmbeddingProvider>,
    llm_client: Option<Arc<AnthropicClient>>,
}

/// Start the chat server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::connect(config).await?;
    let provider = embedding::create_provider(&config.embedding)?;
    let llm_client = AnthropicClient::from_env(&config.llm).map(Arc::new);

    if llm_client.is_none() {
        tracing::warn!(
            "ANTHROPIC_API_KEY not set; chat responses degrade to raw retrieved passages"
        );
    }

    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
        provider,
        llm_client,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/api/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("Chat server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET /api/health ============

/// Health response: whether the LLM credential and the store path are
/// configured. Flags only — neither service is contacted.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    anthropic_configured: bool,
    database_configured: bool,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let anthropic_configured = state.llm_client.is_some();
    let database_configured = !state.config.db.path.as_os_str().is_empty();
    Json(HealthResponse {
        status: "healthy".to_string(),
        anthropic_configured,
        database_configured,
    })
}

// ============ POST /api/chat ============

async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if request.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let response = responder::answer(
        &state.pool,
        state.provider.as_ref(),
        &state.config.llm,
        state.llm_client.as_deref(),
        &request,
    )
    .await
    .map_err(|e| {
        tracing::error!(error = %format!("{:#}", e), "chat request failed");
        internal_error(format!("Error processing chat request: {:#}", e))
    })?;

    Ok(Json(response))
}
