//! Error types for the support assistant.

use thiserror::Error;

/// Assistant error type.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Invalid inbound request payload.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// Upstream service answered with a non-success status.
    #[error("upstream http status not ok: {0}")]
    UpstreamStatus(u16),
    /// Upstream response could not be interpreted.
    #[error("upstream response malformed: {0}")]
    MalformedResponse(String),
    /// The configured model is not served by the upstream.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    /// Embedding error.
    #[error("embedding error: {0}")]
    Embedding(#[from] rig::embeddings::EmbeddingError),
    /// HTTP client error from Rig.
    #[error("http client error: {0}")]
    HttpClient(#[from] rig::http_client::Error),
    /// Content extraction failed.
    #[error("extraction failed: {0}")]
    Extraction(String),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// Regex compilation error.
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Whether the error was caused by the caller rather than the service.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }
}

/// Convenience result alias for assistant operations.
pub type AgentResult<T> = Result<T, AgentError>;
