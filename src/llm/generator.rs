//! Response generator: cache, model call and rule-based fallback.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chat::message::PromptMessage;
use crate::core::errors::AgentResult;
use crate::corpus::document::Document;
use crate::llm::backend::ChatBackend;
use crate::llm::cache::{CachedSource, ResponseCache, cache_key};
use crate::llm::fallback::FallbackResponder;
use crate::prompt::builder::{PromptBudget, build_prompt};

/// Where a reply came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOrigin {
    /// Fresh model output.
    Model,
    /// Fresh rule-based output.
    Fallback,
    /// Served from the response cache.
    Cache,
}

impl From<CachedSource> for AnswerOrigin {
    fn from(source: CachedSource) -> Self {
        match source {
            CachedSource::Model => Self::Model,
            CachedSource::Fallback => Self::Fallback,
        }
    }
}

/// Generated reply text and its origin.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GeneratedResponse {
    /// Reply text.
    pub text: String,
    /// Origin of the text.
    pub origin: AnswerOrigin,
}

/// Produces a reply for every query; failures degrade to the rule table.
pub struct ResponseGenerator {
    backend: Arc<dyn ChatBackend>,
    fallback: FallbackResponder,
    cache: Arc<ResponseCache>,
    budget: PromptBudget,
}

impl ResponseGenerator {
    /// Create a generator.
    ///
    /// # Errors
    /// Returns an error if the fallback rules fail to compile.
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        cache: Arc<ResponseCache>,
        budget: PromptBudget,
    ) -> AgentResult<Self> {
        Ok(Self {
            backend,
            fallback: FallbackResponder::new()?,
            cache,
            budget,
        })
    }

    /// Shared response cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Name of the configured model.
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Whether the model backend is currently usable.
    pub async fn is_model_available(&self) -> bool {
        self.backend.is_available().await
    }

    /// Reply to `query`. Never fails.
    ///
    /// The cache key is the normalized query alone; context and history do not take
    /// part, so a repeated question gets the same answer whatever the conversation.
    pub async fn generate(
        &self,
        query: &str,
        context: &[Document],
        history: &[PromptMessage],
    ) -> GeneratedResponse {
        if !self.cache.is_enabled() {
            let (text, source) = self.compute(query, context, history).await;
            return GeneratedResponse {
                text,
                origin: source.into(),
            };
        }

        let key = cache_key(query);
        if let Some(hit) = self.cache.get(&key).await {
            debug!("Using cached response");
            return cached(hit.text);
        }

        let _guard = self.cache.lock_key(&key).await;
        if let Some(hit) = self.cache.recheck(&key).await {
            debug!("Using response cached by a concurrent request");
            return cached(hit.text);
        }

        let (text, source) = self.compute(query, context, history).await;
        self.cache.insert(key, text.clone(), source).await;
        GeneratedResponse {
            text,
            origin: source.into(),
        }
    }

    async fn compute(
        &self,
        query: &str,
        context: &[Document],
        history: &[PromptMessage],
    ) -> (String, CachedSource) {
        if !self.backend.is_available().await {
            warn!("Model {} unavailable, using fallback reply", self.backend.model_name());
            return self.fallback_reply(query);
        }

        let messages = build_prompt(query, context, history, self.budget);
        match self.backend.chat(messages).await {
            Ok(text) if !text.trim().is_empty() => {
                info!("Generated reply with {} characters", text.len());
                (text, CachedSource::Model)
            }
            Ok(_) => {
                warn!("Model returned an empty reply, using fallback");
                self.fallback_reply(query)
            }
            Err(err) => {
                warn!("Error generating response: {err}");
                self.fallback_reply(query)
            }
        }
    }

    fn fallback_reply(&self, query: &str) -> (String, CachedSource) {
        (self.fallback.respond(query).to_string(), CachedSource::Fallback)
    }
}

fn cached(text: String) -> GeneratedResponse {
    GeneratedResponse {
        text,
        origin: AnswerOrigin::Cache,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::core::config::CacheConfig;
    use crate::core::errors::AgentError;
    use crate::llm::backend::BackendFuture;
    use crate::llm::fallback::GREETING_REPLY;

    /// Scripted backend counting its calls.
    pub(crate) struct MockBackend {
        pub available: AtomicBool,
        pub fail: bool,
        pub reply: String,
        pub delay: Duration,
        pub availability_calls: AtomicUsize,
        pub chat_calls: AtomicUsize,
    }

    impl MockBackend {
        pub(crate) fn available(reply: &str) -> Self {
            Self {
                available: AtomicBool::new(true),
                fail: false,
                reply: reply.to_string(),
                delay: Duration::ZERO,
                availability_calls: AtomicUsize::new(0),
                chat_calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn unavailable() -> Self {
            let backend = Self::available("");
            backend.available.store(false, Ordering::SeqCst);
            backend
        }

        pub(crate) fn calls(&self) -> usize {
            self.availability_calls.load(Ordering::SeqCst) + self.chat_calls.load(Ordering::SeqCst)
        }
    }

    impl ChatBackend for MockBackend {
        fn is_available(&self) -> BackendFuture<'_, bool> {
            self.availability_calls.fetch_add(1, Ordering::SeqCst);
            let available = self.available.load(Ordering::SeqCst);
            Box::pin(async move { available })
        }

        fn chat(&self, messages: Vec<PromptMessage>) -> BackendFuture<'_, AgentResult<String>> {
            self.chat_calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                if self.fail {
                    return Err(AgentError::UpstreamStatus(500));
                }
                Ok(format!("{} ({} messages)", self.reply, messages.len()))
            })
        }

        fn model_name(&self) -> &str {
            "mock"
        }
    }

    fn generator(backend: Arc<MockBackend>) -> ResponseGenerator {
        let cache = Arc::new(ResponseCache::new(&CacheConfig::default()));
        match ResponseGenerator::new(backend, cache, PromptBudget::default()) {
            Ok(g) => g,
            Err(err) => panic!("generator: {err}"),
        }
    }

    #[tokio::test]
    async fn test_unavailable_is_idempotent_and_cached() {
        let backend = Arc::new(MockBackend::unavailable());
        let generator = generator(Arc::clone(&backend));

        let first = generator.generate("hello", &[], &[]).await;
        let second = generator.generate("hello", &[], &[]).await;

        assert_eq!(first.text, GREETING_REPLY);
        assert_eq!(first.origin, AnswerOrigin::Fallback);
        assert_eq!(second.text, first.text);
        assert_eq!(second.origin, AnswerOrigin::Cache);
        assert_eq!(backend.availability_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.chat_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_model_answer_is_cached_by_normalized_query() {
        let backend = Arc::new(MockBackend::available("The R1 has 200 hp"));
        let generator = generator(Arc::clone(&backend));

        let first = generator.generate("R1 power?", &[], &[]).await;
        let history = vec![PromptMessage::user("earlier")];
        let second = generator.generate("  r1 POWER?  ", &[], &history).await;

        assert_eq!(first.origin, AnswerOrigin::Model);
        assert_eq!(second.origin, AnswerOrigin::Cache);
        assert_eq!(first.text, second.text);
        assert_eq!(backend.chat_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transport_error_degrades_to_fallback() {
        let mut backend = MockBackend::available("unused");
        backend.fail = true;
        let generator = generator(Arc::new(backend));

        let reply = generator.generate("hello", &[], &[]).await;
        assert_eq!(reply.text, GREETING_REPLY);
        assert_eq!(reply.origin, AnswerOrigin::Fallback);
    }

    #[tokio::test]
    async fn test_concurrent_identical_queries_compute_once() {
        let mut backend = MockBackend::available("Financing from 3.9% APR");
        backend.delay = Duration::from_millis(50);
        let backend = Arc::new(backend);
        let generator = Arc::new(generator(Arc::clone(&backend)));

        let a = {
            let generator = Arc::clone(&generator);
            tokio::spawn(async move { generator.generate("financing?", &[], &[]).await })
        };
        let b = {
            let generator = Arc::clone(&generator);
            tokio::spawn(async move { generator.generate("financing?", &[], &[]).await })
        };
        let (a, b) = (a.await, b.await);
        let (Ok(a), Ok(b)) = (a, b) else {
            panic!("generation task failed");
        };

        assert_eq!(a.text, b.text);
        assert_eq!(backend.chat_calls.load(Ordering::SeqCst), 1);
        assert!(a.origin == AnswerOrigin::Cache || b.origin == AnswerOrigin::Cache);
    }

    #[tokio::test]
    async fn test_disabled_cache_calls_backend_each_time() {
        let backend = Arc::new(MockBackend::available("ok"));
        let cache = Arc::new(ResponseCache::new(&CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        }));
        let Ok(generator) =
            ResponseGenerator::new(Arc::clone(&backend) as Arc<dyn ChatBackend>, cache, PromptBudget::default())
        else {
            panic!("generator");
        };

        let _ = generator.generate("q", &[], &[]).await;
        let _ = generator.generate("q", &[], &[]).await;
        assert_eq!(backend.chat_calls.load(Ordering::SeqCst), 2);
    }
}
