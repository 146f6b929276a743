//! Core assistant types: configuration, errors and identifiers.

pub mod config;
pub mod errors;
pub mod ids;

pub use config::{
    AgentConfig, CacheConfig, ChatConfig, CorpusConfig, LlmConfig, RetentionConfig,
    ScrapingConfig, SearchStrategy, ServerConfig, StorageConfig,
};
pub use errors::{AgentError, AgentResult};
pub use ids::{SessionId, UserId};
