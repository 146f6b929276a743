//! Model access: Ollama client, response cache, rule-based fallback and the
//! response generator tying them together.

pub mod backend;
pub mod cache;
pub mod fallback;
pub mod generator;
pub mod ollama;

pub use backend::{BackendFuture, ChatBackend};
pub use cache::{CacheStats, CachedSource, ResponseCache, cache_key};
pub use fallback::{FallbackResponder, GREETING_REPLY};
pub use generator::{AnswerOrigin, GeneratedResponse, ResponseGenerator};
pub use ollama::{GenerationParams, ModelSummary, OllamaClient};
