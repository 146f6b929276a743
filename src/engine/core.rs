//! Chat orchestration.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::chat::message::Role;
use crate::chat::session_store::SessionStore;
use crate::core::ids::{SessionId, UserId};
use crate::corpus::Corpus;
use crate::corpus::document::{Document, SourceRef};
use crate::llm::generator::ResponseGenerator;
use crate::storage::logger::ConversationLogger;
use crate::storage::records::{AnalyticsEvent, Exchange};

/// Reply body used when the pipeline fails unexpectedly.
pub const APOLOGY_REPLY: &str = "I apologize, but I'm having trouble processing your request right now. Please try again later.";

/// Reply to one user message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    /// Reply text.
    pub response: String,
    /// Session the reply belongs to.
    pub session_id: SessionId,
    /// Reply time.
    pub timestamp: DateTime<Utc>,
    /// Documents used as context.
    pub sources: Vec<SourceRef>,
}

/// Wires session history, retrieval, generation and logging per message.
pub struct ChatEngine {
    sessions: Arc<SessionStore>,
    corpus: Arc<dyn Corpus>,
    generator: Arc<ResponseGenerator>,
    logger: ConversationLogger,
    search_limit: usize,
}

impl ChatEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(
        sessions: Arc<SessionStore>,
        corpus: Arc<dyn Corpus>,
        generator: Arc<ResponseGenerator>,
        logger: ConversationLogger,
        search_limit: usize,
    ) -> Self {
        Self {
            sessions,
            corpus,
            generator,
            logger,
            search_limit,
        }
    }

    /// Session store.
    #[must_use]
    pub const fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Active corpus.
    #[must_use]
    pub const fn corpus(&self) -> &Arc<dyn Corpus> {
        &self.corpus
    }

    /// Response generator.
    #[must_use]
    pub const fn generator(&self) -> &Arc<ResponseGenerator> {
        &self.generator
    }

    /// Conversation logger.
    #[must_use]
    pub const fn logger(&self) -> &ConversationLogger {
        &self.logger
    }

    /// Answer `text` within `session_id`.
    ///
    /// Returns `None` without touching any state when `text` is blank. Otherwise a
    /// reply is always produced; unexpected failures yield [`APOLOGY_REPLY`].
    pub async fn handle_message(
        &self,
        session_id: &SessionId,
        user_id: Option<UserId>,
        text: &str,
    ) -> Option<ChatReply> {
        if text.trim().is_empty() {
            debug!(session_id = %session_id, "Ignoring empty message");
            return None;
        }

        self.sessions.ensure_session(session_id);
        if let Some(user_id) = user_id.clone() {
            self.sessions.attach_user(session_id, user_id);
        }

        let reply = match AssertUnwindSafe(self.answer(session_id, text))
            .catch_unwind()
            .await
        {
            Ok(reply) => reply,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<String>()
                    .map(String::as_str)
                    .or_else(|| panic.downcast_ref::<&str>().copied())
                    .unwrap_or("unknown panic");
                error!(session_id = %session_id, "Error generating AI response: {message}");
                ChatReply {
                    response: APOLOGY_REPLY.to_string(),
                    session_id: session_id.clone(),
                    timestamp: Utc::now(),
                    sources: Vec::new(),
                }
            }
        };

        self.spawn_log(user_id, text, &reply);
        Some(reply)
    }

    async fn answer(&self, session_id: &SessionId, text: &str) -> ChatReply {
        let history = self.sessions.history(session_id);
        let documents: Vec<Document> = self
            .corpus
            .search(text, self.search_limit)
            .await
            .into_iter()
            .map(|result| result.document)
            .collect();

        let generated = self.generator.generate(text, &documents, &history).await;
        info!(
            session_id = %session_id,
            origin = ?generated.origin,
            context_documents = documents.len(),
            "Generated reply"
        );

        self.sessions.append_message(session_id, Role::User, text);
        self.sessions
            .append_message(session_id, Role::Assistant, generated.text.clone());

        ChatReply {
            response: generated.text,
            session_id: session_id.clone(),
            timestamp: Utc::now(),
            sources: documents.iter().map(SourceRef::from).collect(),
        }
    }

    fn spawn_log(&self, user_id: Option<UserId>, text: &str, reply: &ChatReply) {
        let logger = self.logger.clone();
        let exchange = Exchange {
            session_id: reply.session_id.clone(),
            user_id: user_id.clone(),
            user_message: text.to_string(),
            ai_response: reply.response.clone(),
            sources: reply.sources.clone(),
            created_at: reply.timestamp,
        };
        let event = AnalyticsEvent::new("chat_message", Some(reply.session_id.clone()))
            .with_user(user_id)
            .with_data(serde_json::json!({
                "message_length": text.chars().count(),
                "sources": reply.sources.len(),
            }));
        tokio::spawn(async move {
            logger.log_conversation(exchange).await;
            logger.log_event(event).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::chat::message::PromptMessage;
    use crate::core::config::CacheConfig;
    use crate::core::errors::AgentResult;
    use crate::corpus::document::{CorpusStats, DocumentKind, SearchResult, UpsertOutcome};
    use crate::corpus::substring::JsonCorpus;
    use crate::corpus::CorpusFuture;
    use crate::llm::backend::ChatBackend;
    use crate::llm::cache::ResponseCache;
    use crate::llm::fallback::GREETING_REPLY;
    use crate::llm::generator::tests::MockBackend;
    use crate::prompt::builder::PromptBudget;
    use crate::storage::conversation_log::SqliteConversationLog;

    struct Fixture {
        engine: Arc<ChatEngine>,
        backend: Arc<MockBackend>,
        logger: ConversationLogger,
    }

    async fn fixture(backend: MockBackend, corpus: Arc<dyn Corpus>) -> Fixture {
        let backend = Arc::new(backend);
        let cache = Arc::new(ResponseCache::new(&CacheConfig::default()));
        let Ok(generator) = ResponseGenerator::new(
            Arc::clone(&backend) as Arc<dyn ChatBackend>,
            cache,
            PromptBudget::default(),
        ) else {
            panic!("generator");
        };
        let Ok(sqlite) = SqliteConversationLog::open_in_memory().await else {
            panic!("sqlite");
        };
        let logger = ConversationLogger::new(Arc::new(sqlite));
        let engine = Arc::new(ChatEngine::new(
            Arc::new(SessionStore::new(20)),
            corpus,
            Arc::new(generator),
            logger.clone(),
            5,
        ));
        Fixture {
            engine,
            backend,
            logger,
        }
    }

    async fn catalog_corpus() -> Arc<dyn Corpus> {
        let corpus = JsonCorpus::in_memory();
        let doc = Document::page(
            "https://bigbikeblitz.com/products/yamaha-r1",
            "Yamaha YZF-R1",
            "Crossplane superbike with 200 HP",
        )
        .with_kind(DocumentKind::Product);
        let _ = corpus.upsert(doc).await;
        Arc::new(corpus)
    }

    /// Corpus that panics on search.
    struct ExplodingCorpus;

    impl Corpus for ExplodingCorpus {
        fn search<'a>(&'a self, _: &'a str, _: usize) -> CorpusFuture<'a, Vec<SearchResult>> {
            panic!("index corrupted")
        }
        fn upsert(&self, _: Document) -> CorpusFuture<'_, AgentResult<UpsertOutcome>> {
            Box::pin(async { Ok(UpsertOutcome::Unchanged) })
        }
        fn count(&self) -> CorpusFuture<'_, usize> {
            Box::pin(async { 0 })
        }
        fn stats(&self) -> CorpusFuture<'_, CorpusStats> {
            Box::pin(async { CorpusStats::default() })
        }
        fn documents_by_kind(&self, _: DocumentKind) -> CorpusFuture<'_, Vec<Document>> {
            Box::pin(async { Vec::new() })
        }
        fn clear(&self) -> CorpusFuture<'_, AgentResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    async fn wait_for_log(logger: &ConversationLogger, session_id: &SessionId, expected: usize) -> usize {
        for _ in 0..50 {
            let found = logger.session_history(session_id, 10).await.len();
            if found >= expected {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        0
    }

    #[tokio::test]
    async fn test_greeting_with_unavailable_model() {
        let fx = fixture(MockBackend::unavailable(), catalog_corpus().await).await;
        let session = SessionId::new("s1");

        let Some(reply) = fx.engine.handle_message(&session, None, "hello").await else {
            panic!("expected a reply");
        };
        assert_eq!(reply.response, GREETING_REPLY);
        assert!(reply.sources.is_empty());
        assert_eq!(reply.session_id, session);
        assert_eq!(
            fx.engine.sessions().history(&session),
            vec![
                PromptMessage::user("hello"),
                PromptMessage::assistant(GREETING_REPLY)
            ]
        );
    }

    #[tokio::test]
    async fn test_blank_message_is_a_no_op() {
        let fx = fixture(MockBackend::available("unused"), catalog_corpus().await).await;
        let session = SessionId::new("s1");

        assert!(fx.engine.handle_message(&session, None, "   \n").await.is_none());
        assert_eq!(fx.backend.calls(), 0);
        assert!(!fx.engine.sessions().contains(&session));
    }

    #[tokio::test]
    async fn test_sources_come_from_search_and_exchange_is_logged() {
        let fx = fixture(MockBackend::available("The R1 makes 200 HP"), catalog_corpus().await).await;
        let session = SessionId::new("s2");

        let Some(reply) = fx
            .engine
            .handle_message(&session, Some(UserId::new("u1")), "superbike")
            .await
        else {
            panic!("expected a reply");
        };
        assert!(reply.response.starts_with("The R1 makes 200 HP"));
        assert_eq!(reply.sources.len(), 1);
        assert_eq!(reply.sources[0].title, "Yamaha YZF-R1");
        assert_eq!(
            fx.engine.sessions().session_for_user(&UserId::new("u1")),
            Some(session.clone())
        );

        assert_eq!(wait_for_log(&fx.logger, &session, 1).await, 1);
        let logged = fx.logger.session_history(&session, 1).await;
        assert_eq!(logged[0].exchange.user_message, "superbike");
        assert_eq!(logged[0].exchange.sources, reply.sources);
    }

    #[tokio::test]
    async fn test_pipeline_panic_yields_apology() {
        let fx = fixture(MockBackend::available("unused"), Arc::new(ExplodingCorpus)).await;
        let session = SessionId::new("s3");

        let Some(reply) = fx.engine.handle_message(&session, None, "price?").await else {
            panic!("expected a reply");
        };
        assert_eq!(reply.response, APOLOGY_REPLY);
        assert!(reply.sources.is_empty());
        assert!(fx.engine.sessions().history(&session).is_empty());
    }

    #[tokio::test]
    async fn test_same_query_from_two_sessions_hits_backend_once() {
        let mut backend = MockBackend::unavailable();
        backend.delay = Duration::from_millis(30);
        let fx = fixture(backend, catalog_corpus().await).await;

        let a = {
            let engine = Arc::clone(&fx.engine);
            tokio::spawn(async move { engine.handle_message(&SessionId::new("a"), None, "hello").await })
        };
        let b = {
            let engine = Arc::clone(&fx.engine);
            tokio::spawn(async move { engine.handle_message(&SessionId::new("b"), None, "hello").await })
        };
        let (Ok(Some(a)), Ok(Some(b))) = (a.await, b.await) else {
            panic!("handler failed");
        };

        assert_eq!(a.response, b.response);
        assert_eq!(fx.backend.availability_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fx.backend.chat_calls.load(Ordering::SeqCst), 0);
    }
}
