//! Async Ollama client.
//!
//! Behaviour:
//! - Reachability via `GET /api/version`.
//! - Model presence via `GET /api/tags`; a bare name matches its `:latest` tag.
//! - Chat via `POST /api/chat` with bounded sampling options and `stream: false`.
//! - Warm-up via a one-token `POST /api/generate`.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::chat::message::PromptMessage;
use crate::core::config::LlmConfig;
use crate::core::errors::{AgentError, AgentResult};
use crate::llm::backend::{BackendFuture, ChatBackend};

/// Warm-up prompt: minimal non-empty prompt.
const WARMUP_PROMPT: &str = " ";
/// Warm-up token budget.
const WARMUP_NUM_PREDICT: u32 = 1;
/// Poll interval while waiting for the server.
const STARTUP_RETRY: Duration = Duration::from_millis(250);
/// Timeout of a single health check.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Sampling options sent with every chat request.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GenerationParams {
    /// Sampling temperature.
    pub temperature: f64,
    /// Nucleus sampling mass.
    pub top_p: f64,
    /// Top-k cutoff.
    pub top_k: u32,
    /// Maximum generated tokens.
    pub num_predict: u32,
    /// Repetition penalty.
    pub repeat_penalty: f64,
}

impl From<&LlmConfig> for GenerationParams {
    fn from(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            num_predict: config.num_predict,
            repeat_penalty: config.repeat_penalty,
        }
    }
}

/// A model listed by `GET /api/tags`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSummary {
    /// Model name with tag.
    pub name: String,
    /// Size on disk in bytes.
    #[serde(default)]
    pub size: Option<u64>,
    /// Last modification time as reported by Ollama.
    #[serde(default)]
    pub modified_at: Option<String>,
    /// Content digest.
    #[serde(default)]
    pub digest: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelSummary>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    stream: bool,
    keep_alive: &'a str,
    options: GenerationParams,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ChatResponseMessage>,
}

#[derive(Serialize)]
struct WarmupOptions {
    num_predict: u32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    keep_alive: &'a str,
    options: WarmupOptions,
}

/// HTTP client for one Ollama server and model.
#[derive(Clone, Debug)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    keep_alive: String,
    params: GenerationParams,
}

impl OllamaClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> AgentResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            keep_alive: config.keep_alive.clone(),
            params: GenerationParams::from(config),
        })
    }

    /// Base URL of the server.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether the server answers `GET /api/version`.
    pub async fn is_reachable(&self) -> bool {
        let url = format!("{}/api/version", self.base_url);
        match self.client.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!("Ollama not reachable at {}: {err}", self.base_url);
                false
            }
        }
    }

    /// Poll until the server is reachable or `timeout` elapses.
    pub async fn wait_until_reachable(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.is_reachable().await {
                return true;
            }
            sleep(STARTUP_RETRY).await;
        }
        false
    }

    /// Models resident on the server.
    ///
    /// # Errors
    /// Returns an error if the request fails or the body is malformed.
    pub async fn list_models(&self) -> AgentResult<Vec<ModelSummary>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).timeout(PROBE_TIMEOUT).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::UpstreamStatus(status.as_u16()));
        }
        Ok(response.json::<TagsResponse>().await?.models)
    }

    /// Listing entry of the configured model.
    ///
    /// # Errors
    /// Returns `ModelUnavailable` if the model is not installed, or the listing error.
    pub async fn model_info(&self) -> AgentResult<ModelSummary> {
        self.list_models()
            .await?
            .into_iter()
            .find(|model| model_matches(&self.model, &model.name))
            .ok_or_else(|| AgentError::ModelUnavailable(self.model.clone()))
    }

    /// Whether the configured model is installed.
    ///
    /// # Errors
    /// Returns an error if the listing fails.
    pub async fn has_model(&self) -> AgentResult<bool> {
        let models = self.list_models().await?;
        let present = models.iter().any(|m| model_matches(&self.model, &m.name));
        if !present {
            let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!("Model {} not found. Available models: {names:?}", self.model);
        }
        Ok(present)
    }

    /// Load the model into memory with a one-token generation.
    ///
    /// # Errors
    /// Returns an error if the warm-up request fails.
    pub async fn preload(&self) -> AgentResult<()> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: WARMUP_PROMPT,
            stream: false,
            keep_alive: &self.keep_alive,
            options: WarmupOptions {
                num_predict: WARMUP_NUM_PREDICT,
            },
        };
        let url = format!("{}/api/generate", self.base_url);
        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::UpstreamStatus(status.as_u16()));
        }
        info!("Model {} preloaded", self.model);
        Ok(())
    }

    async fn post_chat(&self, messages: &[PromptMessage]) -> AgentResult<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            keep_alive: &self.keep_alive,
            options: self.params,
        };
        let url = format!("{}/api/chat", self.base_url);
        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::UpstreamStatus(status.as_u16()));
        }

        response
            .json::<ChatResponse>()
            .await?
            .message
            .map(|message| message.content)
            .ok_or_else(|| AgentError::MalformedResponse("chat response without message".to_string()))
    }
}

impl ChatBackend for OllamaClient {
    fn is_available(&self) -> BackendFuture<'_, bool> {
        Box::pin(async move {
            match self.has_model().await {
                Ok(present) => present,
                Err(err) => {
                    warn!("Ollama health check failed: {err}");
                    false
                }
            }
        })
    }

    fn chat(&self, messages: Vec<PromptMessage>) -> BackendFuture<'_, AgentResult<String>> {
        Box::pin(async move { self.post_chat(&messages).await })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Whether an installed `installed` name satisfies the configured `wanted` name.
fn model_matches(wanted: &str, installed: &str) -> bool {
    fn untagged(name: &str) -> &str {
        name.strip_suffix(":latest").unwrap_or(name)
    }
    untagged(wanted) == untagged(installed)
}
