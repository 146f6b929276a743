//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::chat::session_store::SessionStore;
use crate::corpus::Corpus;
use crate::engine::ChatEngine;
use crate::ingest::KnowledgeIngestor;
use crate::storage::logger::ConversationLogger;

/// Shared application state.
pub struct AppState {
    /// Chat orchestrator.
    pub engine: Arc<ChatEngine>,
    /// Corpus ingestion.
    pub ingestor: Arc<KnowledgeIngestor>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(engine: Arc<ChatEngine>, ingestor: Arc<KnowledgeIngestor>) -> Arc<Self> {
        Arc::new(Self { engine, ingestor })
    }

    /// Session store.
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        self.engine.sessions()
    }

    /// Active corpus.
    #[must_use]
    pub fn corpus(&self) -> &dyn Corpus {
        self.engine.corpus().as_ref()
    }

    /// Conversation logger.
    #[must_use]
    pub fn logger(&self) -> &ConversationLogger {
        self.engine.logger()
    }
}
