//! HTTP route handlers for the assistant API.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::errors::AgentError;
use crate::core::ids::{SessionId, UserId};
use crate::corpus::document::Document;
use crate::engine::ChatReply;
use crate::storage::records::AnalyticsEvent;

use super::state::AppState;
use super::ws::ws_chat;

const DEFAULT_HISTORY_LIMIT: usize = 50;
const DEFAULT_SEARCH_LIMIT: usize = 20;
const DEFAULT_SUMMARY_DAYS: u32 = 7;
const DEFAULT_POPULAR_LIMIT: usize = 10;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(health_check))
        .route("/api/chat", post(chat))
        .route("/ws/chat/{session_id}", get(ws_chat))
        .route("/api/knowledge-base/stats", get(knowledge_base_stats))
        .route("/api/knowledge-base/documents", post(add_document))
        .route("/api/scrape-website", post(scrape_website))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/stats", get(session_stats))
        .route(
            "/api/sessions/{session_id}",
            get(export_session).delete(end_session),
        )
        .route("/api/conversations/search", get(search_conversations))
        .route("/api/conversations/{session_id}", get(conversation_history))
        .route("/api/analytics/summary", get(analytics_summary))
        .route("/api/analytics/popular", get(popular_queries))
        .with_state(state)
}

/// JSON error body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        if err.is_client_error() {
            Self::bad_request(err.to_string())
        } else {
            Self::internal(err.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

/// Health report.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `healthy` while the process serves requests.
    pub status: &'static str,
    /// Report time.
    pub timestamp: chrono::DateTime<Utc>,
    /// Configured model.
    pub model: String,
    /// Whether the model backend is usable.
    pub ollama_status: bool,
    /// Corpus size.
    pub knowledge_base_size: usize,
    /// Sessions with a live connection.
    pub active_sessions: usize,
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let generator = state.engine.generator();
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        model: generator.model_name().to_string(),
        ollama_status: generator.is_model_available().await,
        knowledge_base_size: state.corpus().count().await,
        active_sessions: state.sessions().stats().active_connections,
    })
}

/// Chat request.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// The user's message.
    pub message: String,
    /// Optional user identifier.
    pub user_id: Option<String>,
    /// Existing session; a new one is generated when absent.
    pub session_id: Option<String>,
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let session_id = request
        .session_id
        .filter(|id| !id.trim().is_empty())
        .map_or_else(SessionId::generate, SessionId::new);
    let user_id = request.user_id.map(UserId::new);

    state
        .engine
        .handle_message(&session_id, user_id, &request.message)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::bad_request("message must not be empty"))
}

async fn knowledge_base_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.corpus().stats().await)
}

async fn add_document(
    State(state): State<Arc<AppState>>,
    Json(document): Json<Document>,
) -> Result<impl IntoResponse, ApiError> {
    let url = document.url.clone();
    let outcome = state.ingestor.ingest_document(document).await?;
    Ok(Json(serde_json::json!({ "status": outcome.as_str(), "url": url })))
}

async fn scrape_website(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.ingestor.refresh_website().await;
    Json(serde_json::json!({
        "message": "Website data scraped successfully",
        "report": report,
    }))
}

/// Session creation request.
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// Optional owning user.
    pub user_id: Option<String>,
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: CreateSessionRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSessionRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|err| ApiError::bad_request(err.to_string()))?
    };
    let user_id = request.user_id.map(UserId::new);
    let session_id = state.sessions().create_session(user_id.clone());
    state
        .logger()
        .log_event(AnalyticsEvent::new("session_created", Some(session_id.clone())).with_user(user_id))
        .await;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "session_id": session_id })),
    ))
}

async fn session_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.sessions().stats())
}

async fn export_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .sessions()
        .export(&SessionId::new(session_id))
        .map(Json)
        .ok_or_else(|| ApiError::not_found("session not found"))
}

async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let session_id = SessionId::new(session_id);
    state.sessions().end_session(&session_id);
    state
        .logger()
        .log_event(AnalyticsEvent::new("session_ended", Some(session_id.clone())))
        .await;
    info!(session_id = %session_id, "Session ended via API");
    Json(serde_json::json!({ "status": "ended", "session_id": session_id }))
}

/// Pagination for conversation history.
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    /// Maximum rows.
    pub limit: Option<usize>,
}

async fn conversation_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Json(
        state
            .logger()
            .session_history(&SessionId::new(session_id), limit)
            .await,
    )
}

/// Conversation search parameters.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Text to look for.
    pub q: String,
    /// Maximum rows.
    pub limit: Option<usize>,
}

async fn search_conversations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if query.q.trim().is_empty() {
        return Err(ApiError::bad_request("q must not be empty"));
    }
    let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    Ok(Json(state.logger().search(&query.q, limit).await))
}

/// Summary window.
#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    /// Trailing window in days.
    pub days: Option<u32>,
}

async fn analytics_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SummaryQuery>,
) -> impl IntoResponse {
    let days = query.days.unwrap_or(DEFAULT_SUMMARY_DAYS);
    Json(state.logger().summary(days).await)
}

async fn popular_queries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_POPULAR_LIMIT);
    Json(state.logger().popular_queries(limit).await)
}
