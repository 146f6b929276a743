//! Configuration for the support assistant.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::errors::{AgentError, AgentResult};

/// Environment variable naming an optional JSON configuration file.
pub const CONFIG_FILE_ENV: &str = "BLITZ_CONFIG";

/// Longest accepted session idle horizon (ten years).
pub const MAX_SESSION_IDLE_HOURS: u64 = 24 * 365 * 10;

/// Longest accepted log retention horizon (one hundred years).
pub const MAX_LOG_RETENTION_DAYS: u32 = 365 * 100;

/// Top-level configuration for the assistant.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Model-serving settings.
    pub llm: LlmConfig,
    /// Conversation settings.
    pub chat: ChatConfig,
    /// Corpus settings.
    pub corpus: CorpusConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Response cache settings.
    pub cache: CacheConfig,
    /// Retention sweep settings.
    pub retention: RetentionConfig,
    /// Website ingestion settings.
    pub scraping: ScrapingConfig,
}

impl AgentConfig {
    /// Load configuration from the optional JSON file and the process environment.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or validation fails.
    pub fn load() -> AgentResult<Self> {
        let mut config = match std::env::var(CONFIG_FILE_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file. Missing sections keep their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> AgentResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply `BLITZ_*` overrides using the given variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("BLITZ_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("BLITZ_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(origins) = lookup("BLITZ_ALLOWED_ORIGINS") {
            self.server.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        if let Some(url) = lookup("BLITZ_OLLAMA_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("BLITZ_MODEL") {
            self.llm.model = model;
        }
        if let Some(path) = lookup("BLITZ_CORPUS_PATH") {
            self.corpus.path = PathBuf::from(path);
        }
        if let Some(strategy) = lookup("BLITZ_SEARCH_STRATEGY") {
            match strategy.trim().to_ascii_lowercase().as_str() {
                "semantic" | "embedding" => self.corpus.strategy = SearchStrategy::Semantic,
                "substring" => self.corpus.strategy = SearchStrategy::Substring,
                other => tracing::warn!("Ignoring unknown search strategy: {other}"),
            }
        }
        if let Some(path) = lookup("BLITZ_DATABASE_PATH") {
            self.storage.sqlite_path = PathBuf::from(path);
        }
        if let Some(cap) = lookup("BLITZ_MAX_HISTORY").and_then(|v| v.parse().ok()) {
            self.chat.max_history_messages = cap;
        }
        if let Some(hours) = lookup("BLITZ_SESSION_IDLE_HOURS").and_then(|v| v.parse().ok()) {
            self.chat.session_idle_hours = hours;
        }
        if let Some(url) = lookup("BLITZ_WEBSITE_URL") {
            self.scraping.website_base_url = url;
        }
        if let Some(url) = lookup("BLITZ_BACKEND_URL") {
            self.scraping.backend_api_url = url;
        }
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> AgentResult<()> {
        if self.chat.max_history_messages == 0 {
            return Err(AgentError::InvalidConfig(
                "chat.max_history_messages must be > 0".to_string(),
            ));
        }

        if self.chat.prompt_history_messages > self.chat.max_history_messages {
            return Err(AgentError::InvalidConfig(
                "chat.prompt_history_messages must not exceed chat.max_history_messages"
                    .to_string(),
            ));
        }

        if self.chat.search_limit == 0 {
            return Err(AgentError::InvalidConfig(
                "chat.search_limit must be > 0".to_string(),
            ));
        }

        if self.chat.session_idle_hours == 0 {
            return Err(AgentError::InvalidConfig(
                "chat.session_idle_hours must be > 0".to_string(),
            ));
        }

        if self.chat.session_idle_hours > MAX_SESSION_IDLE_HOURS {
            return Err(AgentError::InvalidConfig(format!(
                "chat.session_idle_hours must be <= {MAX_SESSION_IDLE_HOURS}"
            )));
        }

        if self.llm.model.trim().is_empty() {
            return Err(AgentError::InvalidConfig("llm.model must not be empty".to_string()));
        }

        if self.cache.capacity == 0 {
            return Err(AgentError::InvalidConfig(
                "cache.capacity must be > 0".to_string(),
            ));
        }

        if self.corpus.embedding_ndims == 0 {
            return Err(AgentError::InvalidConfig(
                "corpus.embedding_ndims must be > 0".to_string(),
            ));
        }

        if self.retention.interval_seconds == 0 {
            return Err(AgentError::InvalidConfig(
                "retention.interval_seconds must be > 0".to_string(),
            ));
        }

        if self.retention.log_retention_days > MAX_LOG_RETENTION_DAYS {
            return Err(AgentError::InvalidConfig(format!(
                "retention.log_retention_days must be <= {MAX_LOG_RETENTION_DAYS}"
            )));
        }

        Url::parse(&self.llm.base_url)?;
        Url::parse(&self.scraping.website_base_url)?;
        Url::parse(&self.scraping.backend_api_url)?;

        Ok(())
    }
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// CORS allow-list; `*` allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
                "https://bigbikeblitz.com".to_string(),
            ],
        }
    }
}

/// Model-serving settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL.
    pub base_url: String,
    /// Ollama chat model name.
    pub model: String,
    /// Connect timeout in seconds.
    pub connect_timeout_seconds: u64,
    /// Whole-request timeout in seconds.
    pub request_timeout_seconds: u64,
    /// How long Ollama keeps the model resident after a call.
    pub keep_alive: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Nucleus sampling mass.
    pub top_p: f64,
    /// Top-k sampling cutoff.
    pub top_k: u32,
    /// Maximum generated tokens.
    pub num_predict: u32,
    /// Repetition penalty.
    pub repeat_penalty: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "llama3.2:1b".to_string(),
            connect_timeout_seconds: 5,
            request_timeout_seconds: 30,
            keep_alive: "1h".to_string(),
            temperature: 0.7,
            top_p: 0.9,
            top_k: 20,
            num_predict: 150,
            repeat_penalty: 1.1,
        }
    }
}

/// Conversation settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Messages kept per session; older ones are dropped first.
    pub max_history_messages: usize,
    /// History messages included in a composed prompt.
    pub prompt_history_messages: usize,
    /// Idle horizon after which disconnected sessions are evicted.
    pub session_idle_hours: u64,
    /// Documents retrieved per message.
    pub search_limit: usize,
    /// Characters of a document body rendered into the prompt.
    pub max_document_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_history_messages: 20,
            prompt_history_messages: 10,
            session_idle_hours: 24,
            search_limit: 5,
            max_document_chars: 1500,
        }
    }
}

/// Retrieval strategy selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Case-insensitive substring containment.
    #[default]
    Substring,
    /// Embedding nearest-neighbour search.
    Semantic,
}

/// Corpus settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// JSON file holding the corpus.
    pub path: PathBuf,
    /// Active retrieval strategy.
    pub strategy: SearchStrategy,
    /// Ollama embedding model for the semantic strategy.
    pub embedding_model: String,
    /// Embedding vector dimensions.
    pub embedding_ndims: usize,
    /// Minimum cosine similarity kept by the semantic strategy.
    pub min_similarity: f64,
    /// Seed the built-in product catalog when no product is present.
    pub seed_products: bool,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("knowledge_base/corpus.json"),
            strategy: SearchStrategy::Substring,
            embedding_model: "nomic-embed-text".to_string(),
            embedding_ndims: 768,
            min_similarity: 0.2,
            seed_products: true,
        }
    }
}

/// Storage configuration for the conversation log.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("ai_agent.db"),
        }
    }
}

/// Response cache settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether caching is enabled.
    pub enabled: bool,
    /// Maximum number of cached answers.
    pub capacity: usize,
    /// TTL for model-generated answers (seconds).
    pub ttl_seconds: u64,
    /// TTL for rule-based fallback answers (seconds).
    pub fallback_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 512,
            ttl_seconds: 60 * 60 * 24,
            fallback_ttl_seconds: 300,
        }
    }
}

/// Retention sweep settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Whether the background sweeper runs.
    pub enabled: bool,
    /// Interval between sweeps (seconds).
    pub interval_seconds: u64,
    /// Log rows older than this many days are deleted.
    pub log_retention_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 3600,
            log_retention_days: 30,
        }
    }
}

/// Website ingestion settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Storefront base URL.
    pub website_base_url: String,
    /// Page paths scraped below the base URL.
    pub pages: Vec<String>,
    /// Shop backend API base URL.
    pub backend_api_url: String,
    /// Request timeout (seconds).
    pub request_timeout_seconds: u64,
    /// Maximum page size to download (bytes).
    pub max_content_length: usize,
    /// User agents to rotate.
    pub user_agents: Vec<String>,
    /// Scrape the storefront when the corpus is empty at startup.
    pub scrape_on_startup: bool,
    /// Sitemap path below the base URL; `None` disables discovery.
    pub sitemap_path: Option<String>,
    /// Most pages taken from the sitemap per refresh.
    pub max_sitemap_urls: usize,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            website_base_url: "http://localhost:5173".to_string(),
            pages: vec![
                String::new(),
                "/categories".to_string(),
                "/about".to_string(),
                "/contact".to_string(),
                "/help".to_string(),
            ],
            backend_api_url: "http://localhost:8080".to_string(),
            request_timeout_seconds: 10,
            max_content_length: 5 * 1024 * 1024,
            user_agents: default_user_agents(),
            scrape_on_startup: true,
            sitemap_path: Some("/sitemap.xml".to_string()),
            max_sitemap_urls: 50,
        }
    }
}

impl ScrapingConfig {
    /// Full URLs of the configured storefront pages.
    #[must_use]
    pub fn page_urls(&self) -> Vec<String> {
        let base = self.website_base_url.trim_end_matches('/');
        self.pages
            .iter()
            .map(|path| format!("{base}{path}"))
            .collect()
    }

    /// Full sitemap URL, when discovery is enabled.
    #[must_use]
    pub fn sitemap_url(&self) -> Option<String> {
        let base = self.website_base_url.trim_end_matches('/');
        self.sitemap_path
            .as_deref()
            .filter(|path| !path.trim().is_empty())
            .map(|path| format!("{base}{path}"))
    }

    /// Pick a user agent from the rotation list.
    #[must_use]
    pub fn random_user_agent(&self) -> String {
        use rand::seq::SliceRandom;

        self.user_agents
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }
}

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

fn default_user_agents() -> Vec<String> {
    vec![
        DEFAULT_USER_AGENT.to_string(),
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15".to_string(),
        "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chat.max_history_messages, 20);
        assert_eq!(config.chat.prompt_history_messages, 10);
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("BLITZ_PORT", "9001"),
            ("BLITZ_MODEL", "mistral:7b"),
            ("BLITZ_ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
            ("BLITZ_SEARCH_STRATEGY", "semantic"),
            ("BLITZ_MAX_HISTORY", "30"),
        ]);
        let mut config = AgentConfig::default();
        config.apply_overrides(|key| vars.get(key).map(ToString::to_string));

        assert_eq!(config.server.port, 9001);
        assert_eq!(config.llm.model, "mistral:7b");
        assert_eq!(
            config.server.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(config.corpus.strategy, SearchStrategy::Semantic);
        assert_eq!(config.chat.max_history_messages, 30);
    }

    #[test]
    fn test_unparsable_port_is_ignored() {
        let mut config = AgentConfig::default();
        config.apply_overrides(|key| (key == "BLITZ_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_validate_rejects_window_above_cap() {
        let mut config = AgentConfig::default();
        config.chat.prompt_history_messages = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unbounded_horizons() {
        let mut config = AgentConfig::default();
        config.chat.session_idle_hours = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = AgentConfig::default();
        config.retention.log_retention_days = u32::MAX;
        assert!(config.validate().is_err());

        let mut config = AgentConfig::default();
        config.chat.session_idle_hours = MAX_SESSION_IDLE_HOURS;
        config.retention.log_retention_days = MAX_LOG_RETENTION_DAYS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = AgentConfig::default();
        config.llm.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: AgentConfig =
            serde_json::from_str(r#"{"llm": {"model": "phi3"}}"#).unwrap_or_default();
        assert_eq!(config.llm.model, "phi3");
        assert_eq!(config.llm.top_k, 20);
        assert_eq!(config.chat.search_limit, 5);
    }

    #[test]
    fn test_page_urls_join_base() {
        let config = ScrapingConfig::default();
        let urls = config.page_urls();
        assert_eq!(urls[0], "http://localhost:5173");
        assert_eq!(urls[1], "http://localhost:5173/categories");
    }
}
