//! Backend HTTP server for `genterm serve`.
//!
//! Hosts the session and chat endpoints the console talks to, forwarding
//! chat turns to an upstream OpenAI-compatible model.
//!
//! # Endpoints
//!
//! | Method | Path           | Description                                  |
//! |--------|----------------|----------------------------------------------|
//! | `POST` | `/api/session` | `{"action":"create"}` or `{"action":"get","id":..}` |
//! | `POST` | `/api/chat`    | Answer a query within a session              |
//! | `GET`  | `/health`      | Health check                                 |
//!
//! # Errors
//!
//! Failures return a JSON body of the form `{"error": "<message>"}` with
//! 400 for bad input or unknown sessions, 404 for `get` on a missing
//! session, and 500 when the upstream model fails.
//!
//! # CORS
//!
//! Permissive, so browser-based clients can talk to a local backend.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::gateway::{ChatReply, ChatRequest, SessionRequest};
use crate::llm::{build_messages, LlmClient, MessageContent};
use crate::session::{SessionManager, StoredMessage};

/// Shared state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub llm: Arc<LlmClient>,
}

impl AppState {
    pub fn new(llm: LlmClient) -> Self {
        Self {
            sessions: Arc::new(SessionManager::new()),
            llm: Arc::new(llm),
        }
    }
}

/// Builds the router. Exposed so tests can serve it on an ephemeral port.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/session", post(handle_session))
        .route("/api/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Binds to `[server].bind` and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    if config.llm.api_key.is_none() {
        tracing::warn!("LLM_API_KEY is not set; upstream requests are sent without credentials");
    }

    let state = AppState::new(LlmClient::new(&config.llm)?);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, model = %config.llm.model, "server listening");
    eprintln!("genterm backend listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        message: message.into(),
    }
}

fn upstream_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection, "rejected request body");
        bad_request("Invalid request")
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/session ============

#[derive(Serialize)]
struct SessionResponse {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    messages: Option<Vec<StoredMessage>>,
}

async fn handle_session(
    State(state): State<AppState>,
    body: Result<Json<SessionRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, AppError> {
    let Json(request) = body?;
    tracing::debug!(action = %request.action, "session request");

    match request.action.as_str() {
        "create" => {
            let session = state.sessions.create().await;
            tracing::info!(session = %session.id, "session created");
            Ok(Json(SessionResponse {
                id: session.id,
                messages: None,
            }))
        }
        "get" => {
            let id = request.id.unwrap_or_default();
            let session = state
                .sessions
                .get(&id)
                .await
                .ok_or_else(|| not_found("Session not found"))?;
            Ok(Json(SessionResponse {
                id: session.id,
                messages: Some(session.messages),
            }))
        }
        other => Err(bad_request(format!("Invalid action: {}", other))),
    }
}

// ============ POST /api/chat ============

async fn handle_chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, AppError> {
    let Json(request) = body?;
    let session = state
        .sessions
        .get(&request.session_id)
        .await
        .ok_or_else(|| bad_request("Invalid session"))?;

    tracing::debug!(
        session = %session.id,
        context_entries = request.context.len(),
        image = request.has_image(),
        "chat request"
    );

    let (recorded, user_turn) = match request.message_content {
        Some(parts) if !parts.is_empty() => (
            format!("{} [with image]", request.query),
            MessageContent::Parts(parts),
        ),
        _ => (request.query.clone(), MessageContent::Text(request.query.clone())),
    };
    state.sessions.add_message(&session.id, "user", recorded).await;

    let messages = build_messages(
        state.llm.system_prompt(),
        &session.messages,
        &request.context,
        user_turn,
    );

    let response = state.llm.complete(&messages).await.map_err(|e| {
        tracing::error!(session = %session.id, error = %e, "upstream completion failed");
        upstream_error(format!("Error generating response: {}", e))
    })?;

    state
        .sessions
        .add_message(&session.id, "assistant", response.clone())
        .await;

    Ok(Json(ChatReply {
        session_id: Some(session.id),
        response,
    }))
}
